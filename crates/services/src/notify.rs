//! Outcome notification capability.
//!
//! The core signals user-facing outcomes (reset confirmed, reset failed)
//! through this single-method interface; rendering is someone else's job.
//! Injecting [`NoopNotifier`] keeps every call site unconditional.

/// Receives one-line outcome messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Discards every message; the default when no presenter is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _message: &str) {}
}
