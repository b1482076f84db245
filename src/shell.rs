use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Moves the user to another route.
pub trait Navigator: Send + Sync {
    fn navigate_to(&self, path: &str);
}

/// Shows a toast-style message to the user.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
    fn notify_success(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "message", rename_all = "snake_case")]
pub enum Notice {
    Error(String),
    Success(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShellLog {
    pub notices: Vec<Notice>,
    pub redirect: Option<String>,
}

/// Collects navigation and notifications so a request handler can return
/// them to the client in one response.
#[derive(Clone, Default)]
pub struct RecordingShell {
    log: Arc<Mutex<ShellLog>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ShellLog {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, update: impl FnOnce(&mut ShellLog)) {
        let mut guard = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut guard);
    }
}

impl Navigator for RecordingShell {
    fn navigate_to(&self, path: &str) {
        debug!(target = "listing_desk.form", path, "navigate");
        self.record(|log| log.redirect = Some(path.to_string()));
    }
}

impl Notifier for RecordingShell {
    fn notify_error(&self, message: &str) {
        self.record(|log| log.notices.push(Notice::Error(message.to_string())));
    }

    fn notify_success(&self, message: &str) {
        self.record(|log| log.notices.push(Notice::Success(message.to_string())));
    }
}
