//! Email composition through the platform mail client.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::platform::{PlatformError, UriOpener};

/// Errors composing an email.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("no recipients given")]
    NoRecipients,

    #[error("invalid email address: {0:?}")]
    InvalidAddress(String),

    #[error("no mail client is available")]
    NoMailClient,

    #[error("platform error: {0}")]
    Platform(PlatformError),
}

/// A message to open in the user's mail client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailDraft {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    /// File to attach. `mailto:` cannot carry one, so it is reported and dropped.
    pub attachment: Option<PathBuf>,
}

impl EmailDraft {
    /// Checks recipients: at least one, each `local@domain` without whitespace.
    pub fn validate(&self) -> Result<(), EmailError> {
        if self.to.is_empty() {
            return Err(EmailError::NoRecipients);
        }
        for address in self.to.iter().chain(&self.cc) {
            let valid = match address.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && !domain.is_empty()
                        && !domain.contains('@')
                        && !address.chars().any(char::is_whitespace)
                }
                None => false,
            };
            if !valid {
                return Err(EmailError::InvalidAddress(address.clone()));
            }
        }
        Ok(())
    }

    /// Builds the `mailto:` URI for this draft.
    pub fn to_mailto(&self) -> String {
        let to: Vec<String> = self.to.iter().map(|a| encode(a, b"@+")).collect();
        let mut uri = format!("mailto:{}", to.join(","));

        let mut params = Vec::new();
        if !self.cc.is_empty() {
            let cc: Vec<String> = self.cc.iter().map(|a| encode(a, b"@+")).collect();
            params.push(format!("cc={}", cc.join(",")));
        }
        if !self.subject.is_empty() {
            params.push(format!("subject={}", encode(&self.subject, b"")));
        }
        if !self.body.is_empty() {
            params.push(format!("body={}", encode(&self.body, b"")));
        }
        if !params.is_empty() {
            uri.push('?');
            uri.push_str(&params.join("&"));
        }
        uri
    }
}

/// Percent-encodes everything but RFC 3986 unreserved characters and `keep`.
fn encode(input: &str, keep: &[u8]) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) || keep.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Hands drafts to the platform mail client.
#[derive(Clone)]
pub struct EmailComposer {
    opener: Arc<dyn UriOpener>,
}

impl fmt::Debug for EmailComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailComposer").finish_non_exhaustive()
    }
}

impl EmailComposer {
    pub fn new(opener: Arc<dyn UriOpener>) -> Self {
        Self { opener }
    }

    pub fn compose(&self, draft: &EmailDraft) -> Result<(), EmailError> {
        draft.validate()?;
        if let Some(path) = &draft.attachment {
            warn!(path = %path.display(), "Mail client hand-off cannot attach files; attachment dropped");
        }
        let uri = draft.to_mailto();

        self.opener.open_uri(&uri).map_err(|e| match e {
            PlatformError::NoHandler(_) => EmailError::NoMailClient,
            other => EmailError::Platform(other),
        })?;

        info!(recipients = draft.to.len(), "Opened email draft");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeOpener;

    fn draft() -> EmailDraft {
        EmailDraft {
            to: vec!["principal@school.edu".to_string()],
            cc: vec![],
            subject: "Attendance report".to_string(),
            body: "Hi,\nsee attached & thanks".to_string(),
            attachment: None,
        }
    }

    #[test]
    fn mailto_encodes_subject_and_body() {
        assert_eq!(
            draft().to_mailto(),
            "mailto:principal@school.edu?subject=Attendance%20report&body=Hi%2C%0Asee%20attached%20%26%20thanks"
        );
    }

    #[test]
    fn mailto_with_cc_and_no_text() {
        let draft = EmailDraft {
            to: vec!["a@x.org".into(), "b+tag@x.org".into()],
            cc: vec!["c@x.org".into()],
            ..EmailDraft::default()
        };
        assert_eq!(draft.to_mailto(), "mailto:a@x.org,b+tag@x.org?cc=c@x.org");
    }

    #[test]
    fn validation() {
        assert!(matches!(
            EmailDraft::default().validate(),
            Err(EmailError::NoRecipients)
        ));

        for bad in ["nobody", "@x.org", "a@", "a b@x.org", "a@b@c"] {
            let draft = EmailDraft {
                to: vec![bad.to_string()],
                ..EmailDraft::default()
            };
            assert!(
                matches!(draft.validate(), Err(EmailError::InvalidAddress(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn compose_opens_mailto() {
        let opener = FakeOpener::new(true);
        EmailComposer::new(opener.clone()).compose(&draft()).unwrap();

        let opened = opener.opened();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].starts_with("mailto:principal@school.edu"));
    }

    #[test]
    fn no_mail_client() {
        let opener = FakeOpener::new(false);
        let err = EmailComposer::new(opener).compose(&draft()).unwrap_err();
        assert!(matches!(err, EmailError::NoMailClient));
    }
}
