//! Cooperative interrupt flag
//!
//! External callers raise it; the decision loop checks it at iteration
//! boundaries, consumes the reason and skips one cycle. Raising it twice
//! before the loop looks keeps only the newest reason.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::info;

type InterruptCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
pub struct InterruptController {
    flag: AtomicBool,
    reason: Mutex<Option<String>>,
    callbacks: Mutex<Vec<InterruptCallback>>,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt and run registered callbacks on this thread
    pub fn interrupt(&self, reason: impl Into<String>) {
        let reason = reason.into();
        info!(%reason, "interrupt raised");
        *self.reason.lock() = Some(reason.clone());
        self.flag.store(true, Ordering::SeqCst);
        for callback in self.callbacks.lock().iter() {
            callback(&reason);
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consume a pending interrupt, returning its reason
    pub fn take(&self) -> Option<String> {
        if !self.flag.swap(false, Ordering::SeqCst) {
            return None;
        }
        self.reason.lock().take()
    }

    pub fn on_interrupt<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Box::new(callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_take_clears_the_flag() {
        let interrupts = InterruptController::new();
        assert!(!interrupts.is_interrupted());
        assert!(interrupts.take().is_none());

        interrupts.interrupt("operator stop");
        assert!(interrupts.is_interrupted());
        assert_eq!(interrupts.take().as_deref(), Some("operator stop"));
        assert!(!interrupts.is_interrupted());
        assert!(interrupts.take().is_none());
    }

    #[test]
    fn test_latest_reason_wins() {
        let interrupts = InterruptController::new();
        interrupts.interrupt("first");
        interrupts.interrupt("second");
        assert_eq!(interrupts.take().as_deref(), Some("second"));
    }

    #[test]
    fn test_callbacks_fan_out() {
        let interrupts = InterruptController::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            interrupts.on_interrupt(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        interrupts.interrupt("pause");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
