//! Desktop notification for finished downloads.

#[cfg(feature = "notifications")]
pub(crate) fn download_finished(title: &str, succeeded: bool) {
    use notify_rust::Notification;

    let body = if succeeded {
        "Download complete"
    } else {
        "Download failed"
    };

    if let Err(e) = Notification::new()
        .summary(title)
        .body(body)
        .appname("Hostlink")
        .timeout(notify_rust::Timeout::Milliseconds(5000))
        .show()
    {
        tracing::debug!(error = %e, "Failed to show download notification");
    }
}

#[cfg(not(feature = "notifications"))]
pub(crate) fn download_finished(_title: &str, _succeeded: bool) {}
