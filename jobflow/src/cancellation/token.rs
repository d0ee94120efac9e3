//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent; only the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<(u64, CancelCallback)>>,
    next_id: AtomicU64,
}

/// Keeps a callback registered until dropped.
#[must_use = "the callback is removed when the registration is dropped"]
pub struct CancelRegistration<'a> {
    token: &'a CancellationToken,
    id: u64,
}

impl Drop for CancelRegistration<'_> {
    fn drop(&mut self) {
        self.token.callbacks.write().retain(|(id, _)| *id != self.id);
    }
}

impl std::fmt::Debug for CancelRegistration<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelRegistration").field("id", &self.id).finish()
    }
}

fn invoke(callback: &(dyn Fn() + Send + Sync)) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Registered callbacks run immediately on the calling thread; panics in
    /// callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());

            for (_, callback) in self.callbacks.read().iter() {
                invoke(callback.as_ref());
            }
        }
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately. The
    /// callback stays registered until the returned guard is dropped.
    pub fn on_cancel<F>(&self, callback: F) -> CancelRegistration<'_>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut callbacks = self.callbacks.write();
        if self.is_cancelled() {
            drop(callbacks);
            invoke(&callback);
        } else {
            callbacks.push((id, Box::new(callback)));
        }
        CancelRegistration { token: self, id }
    }

    /// Cancels the token when the process receives Ctrl-C.
    pub fn cancel_on_interrupt(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let token = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, cancelling");
                    token.cancel("interrupted");
                }
                Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
            }
        })
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Number of callbacks currently registered.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.callbacks.read().len()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting<'a>(
        token: &'a CancellationToken,
        counter: &Arc<AtomicUsize>,
    ) -> CancelRegistration<'a> {
        let counter = Arc::clone(counter);
        token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("interrupted");
        token.cancel("again");
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("interrupted".to_string()));
    }

    #[test]
    fn test_on_cancel_before_cancellation() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _registration = counting(&token, &counter);

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        token.cancel("test");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_cancel_after_cancellation() {
        let token = CancellationToken::new();
        token.cancel("test");

        let counter = Arc::new(AtomicUsize::new(0));
        let _registration = counting(&token, &counter);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_registration_is_removed() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let first = counting(&token, &counter);
        let _second = counting(&token, &counter);
        assert_eq!(token.registered(), 2);

        drop(first);
        assert_eq!(token.registered(), 1);

        token.cancel("test");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_panic_suppressed() {
        let token = CancellationToken::new();
        let _registration = token.on_cancel(|| panic!("Intentional panic"));
        token.cancel("test");
        assert!(token.is_cancelled());
    }
}
