use std::time::Instant;

use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Success,
    Error,
    Info,
}

/// Fire and forget user notifications (fetch failures, finished exports ...).
pub trait Notifier {
    fn notify(&mut self, title: &str, message: &str, kind: NotifyKind);
}

/// The last notification, shown in the status line of the viewer.
#[derive(Debug, Clone)]
pub struct StatusLine {
    text: String,
    kind: NotifyKind,
    updated: Instant,
}

impl StatusLine {
    pub fn new(text: impl Into<String>) -> Self {
        StatusLine {
            text: text.into(),
            kind: NotifyKind::Info,
            updated: Instant::now(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> NotifyKind {
        self.kind
    }

    pub fn updated(&self) -> Instant {
        self.updated
    }
}

impl Notifier for StatusLine {
    fn notify(&mut self, title: &str, message: &str, kind: NotifyKind) {
        match kind {
            NotifyKind::Error => error!("{title}: {message}"),
            NotifyKind::Success | NotifyKind::Info => info!("{title}: {message}"),
        }
        self.text = if message.is_empty() {
            title.to_string()
        } else {
            format!("{title}: {message}")
        };
        self.kind = kind;
        self.updated = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_keeps_last_notification() {
        let mut status = StatusLine::new("Started");
        let before = status.updated();
        status.notify("Load failed", "file not found", NotifyKind::Error);
        assert_eq!(status.text(), "Load failed: file not found");
        assert_eq!(status.kind(), NotifyKind::Error);
        assert!(status.updated() >= before);

        status.notify("Copied row", "", NotifyKind::Success);
        assert_eq!(status.text(), "Copied row");
    }
}
