//! User-visible alerts: always logged, optionally shown as desktop notifications via notify-rust (D-Bus).

use notify_rust::Notification;
use tracing::{debug, warn};

/// Single channel for every user-facing error message.
pub trait Notify: Send + Sync {
    fn alert(&self, message: &str);
}

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notify for Notifier {
    fn alert(&self, message: &str) {
        warn!("{message}");

        if !self.enabled {
            return;
        }

        debug!("Notification: {message}");

        if let Err(e) = Notification::new()
            .summary("Announcer")
            .body(message)
            .icon("audio-speakers")
            .timeout(5000)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::Notify;

    /// Collects alerts for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub alerts: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<String> {
            self.alerts.lock().unwrap().clone()
        }
    }

    impl Notify for RecordingNotifier {
        fn alert(&self, message: &str) {
            self.alerts.lock().unwrap().push(message.to_string());
        }
    }
}
