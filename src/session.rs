//! Cross-thread session signals
//!
//! A front-end that serves a listener next to the controller loop (a local
//! web page, an IPC socket) needs two things from the session: a way to know
//! when it ended and a way to ask it to stop. [`CompletionSignal`] covers the
//! first, [`CancelToken`] the second.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Default)]
struct Shared {
    outcome: Mutex<Option<SessionOutcome>>,
    cond: Condvar,
}

/// One-shot completion signal.
pub struct CompletionSignal;

impl CompletionSignal {
    /// Create a connected notifier/waiter pair.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (CompletionNotifier, CompletionWaiter) {
        let shared = Arc::new(Shared::default());
        (
            CompletionNotifier {
                shared: Arc::clone(&shared),
            },
            CompletionWaiter { shared },
        )
    }
}

/// Sending half. Only the first `notify` counts.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    shared: Arc<Shared>,
}

impl CompletionNotifier {
    /// Returns false if the signal had already fired.
    pub fn notify(&self, outcome: SessionOutcome) -> bool {
        let mut slot = self
            .shared
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.shared.cond.notify_all();
        true
    }
}

/// Receiving half. Clones wait on the same signal.
#[derive(Debug, Clone)]
pub struct CompletionWaiter {
    shared: Arc<Shared>,
}

impl CompletionWaiter {
    /// Block until the session ends.
    pub fn wait(&self) -> SessionOutcome {
        let mut slot = self
            .shared
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = *slot {
                return outcome;
            }
            slot = self
                .shared
                .cond
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SessionOutcome> {
        let slot = self
            .shared
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (slot, _) = self
            .shared
            .cond
            .wait_timeout_while(slot, timeout, |o| o.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *slot
    }

    pub fn try_get(&self) -> Option<SessionOutcome> {
        *self
            .shared
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cooperative cancellation flag, checked at state boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_waiter_sees_first_outcome_only() {
        let (notifier, waiter) = CompletionSignal::new();
        assert_eq!(waiter.try_get(), None);

        assert!(notifier.notify(SessionOutcome::Completed));
        assert!(!notifier.notify(SessionOutcome::Failed));
        assert_eq!(waiter.wait(), SessionOutcome::Completed);
    }

    #[test]
    fn test_listener_thread_wakes_up() {
        let (notifier, waiter) = CompletionSignal::new();
        let listener = {
            let waiter = waiter.clone();
            thread::spawn(move || waiter.wait())
        };

        notifier.notify(SessionOutcome::Cancelled);
        assert_eq!(listener.join().unwrap(), SessionOutcome::Cancelled);
    }

    #[test]
    fn test_wait_timeout_without_signal() {
        let (_notifier, waiter) = CompletionSignal::new();
        assert_eq!(waiter.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
