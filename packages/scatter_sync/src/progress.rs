//! Progress reporting and cooperative cancellation.
//!
//! A synchronization pass reports what it is doing and polls for a cancel
//! request between its mesh and light passes. The cancel flag is atomic so a
//! UI thread can request cancellation while a pass runs elsewhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Sink for status messages plus the cancellation poll.
pub trait ProgressReporter {
    fn set_status(&self, title: &str, detail: &str);
    fn is_cancelled(&self) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub title: String,
    pub detail: String,
}

/// Thread-safe progress state.
#[derive(Debug, Default)]
pub struct Progress {
    cancelled: AtomicBool,
    status: Mutex<Status>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Observed at the next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Clear a previous cancel request, e.g. before the next frame.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    pub fn status(&self) -> Status {
        match self.status.lock() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressReporter for Progress {
    fn set_status(&self, title: &str, detail: &str) {
        log::info!("{}: {}", title, detail);
        let mut status = match self.status.lock() {
            Ok(status) => status,
            Err(poisoned) => poisoned.into_inner(),
        };
        status.title = title.to_string();
        status.detail = detail.to_string();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_recorded() {
        let progress = Progress::new();
        progress.set_status("Updating Objects", "Copying Transformations to server");
        assert_eq!(
            progress.status(),
            Status {
                title: "Updating Objects".to_string(),
                detail: "Copying Transformations to server".to_string(),
            }
        );
    }

    #[test]
    fn test_cancel_and_reset() {
        let progress = Progress::new();
        assert!(!progress.is_cancelled());
        progress.cancel();
        assert!(progress.is_cancelled());
        progress.reset();
        assert!(!progress.is_cancelled());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let progress = std::sync::Arc::new(Progress::new());
        let remote = std::sync::Arc::clone(&progress);
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(progress.is_cancelled());
    }
}
