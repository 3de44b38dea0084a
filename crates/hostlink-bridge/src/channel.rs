//! Method channels.
//!
//! A channel is a name (`<app id>/<capability>`) with one handler behind it.
//! Calls carry a method name and JSON arguments; every call gets exactly one
//! response.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A method invocation from the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// Deserializes the arguments, treating `null` as an empty object.
    pub fn arguments<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        let args = match &self.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(args).ok()
    }
}

/// Reply to a [`MethodCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodResponse {
    Success(Value),
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    NotImplemented,
}

impl MethodResponse {
    pub fn success(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => MethodResponse::Success(value),
            Err(e) => MethodResponse::Error {
                code: "INTERNAL".to_string(),
                message: e.to_string(),
                details: None,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success(_))
    }
}

/// Handles the calls of one channel.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, call: &MethodCall) -> MethodResponse;
}

/// Channel name to handler.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `channel`, replacing any previous one.
    pub fn register(&mut self, channel: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.handlers.insert(channel.into(), handler);
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Routes a call. Unknown channels reply `NotImplemented`.
    pub async fn dispatch(&self, channel: &str, call: &MethodCall) -> MethodResponse {
        match self.handlers.get(channel) {
            Some(handler) => handler.handle(call).await,
            None => {
                debug!(channel, method = %call.method, "No handler for channel");
                MethodResponse::NotImplemented
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl MethodHandler for Echo {
        async fn handle(&self, call: &MethodCall) -> MethodResponse {
            match call.method.as_str() {
                "echo" => MethodResponse::Success(call.arguments.clone()),
                _ => MethodResponse::NotImplemented,
            }
        }
    }

    #[test]
    fn dispatches_by_channel() {
        let mut registry = ChannelRegistry::new();
        registry.register("app/echo", Arc::new(Echo));

        let call = MethodCall::new("echo", json!({"a": 1}));
        assert_eq!(
            tokio_test::block_on(registry.dispatch("app/echo", &call)),
            MethodResponse::Success(json!({"a": 1}))
        );
        assert_eq!(
            tokio_test::block_on(registry.dispatch("app/other", &call)),
            MethodResponse::NotImplemented
        );
        assert_eq!(registry.channels(), vec!["app/echo".to_string()]);
    }

    #[test]
    fn response_wire_format() {
        assert_eq!(
            serde_json::to_value(MethodResponse::Success(json!(true))).unwrap(),
            json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(MethodResponse::NotImplemented).unwrap(),
            json!("not_implemented")
        );
        assert_eq!(
            serde_json::to_value(MethodResponse::Error {
                code: "INVALID_ARGUMENTS".into(),
                message: "Download URL is missing".into(),
                details: None,
            })
            .unwrap(),
            json!({"error": {"code": "INVALID_ARGUMENTS", "message": "Download URL is missing"}})
        );
    }

    #[test]
    fn null_arguments_read_as_empty_object() {
        #[derive(Deserialize)]
        struct Args {
            url: Option<String>,
        }

        let call = MethodCall::new("downloadAndInstall", Value::Null);
        let args: Args = call.arguments().unwrap();
        assert_eq!(args.url, None);
    }
}
