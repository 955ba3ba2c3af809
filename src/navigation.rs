use std::sync::Mutex;

use crate::errors::SafeLock;

/// Sink for navigations forced by the session resolver.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Records the latest forced navigation until a request handler takes it.
#[derive(Debug, Default)]
pub struct PendingNavigation {
    target: Mutex<Option<String>>,
}

impl PendingNavigation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<String> {
        match self.target.safe_lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => {
                tracing::error!(error = %e, "pending navigation unavailable");
                None
            }
        }
    }
}

impl Navigator for PendingNavigation {
    fn navigate(&self, target: &str) {
        match self.target.safe_lock() {
            Ok(mut guard) => *guard = Some(target.to_string()),
            Err(e) => tracing::error!(error = %e, target, "dropping navigation"),
        }
    }
}
