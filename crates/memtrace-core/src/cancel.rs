use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Process-wide registry of cooperative cancellation handles (spec.md §5,
/// §9: "Global signal/cancellation").
///
/// Long-running operations (searches, hex dumps, finds) register a
/// [`CancelToken`] when they start and poll `is_cancelled()` at coarse
/// intervals. `cancel_all()` flips every currently-registered token at
/// once — a stand-in for a process-wide signal handler broadcasting a
/// user interrupt. Tokens are tracked by `Weak` reference: once a token is
/// dropped its flag can no longer be upgraded, so `cancel_all`/`live_count`
/// silently skip it on every call, and the underlying vector is compacted
/// (dead entries dropped for good) the next time `register()` runs.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: RwLock<Vec<Weak<AtomicBool>>>,
}

impl CancelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new token and registers it for future `cancel_all()`
    /// broadcasts.
    pub fn register(&self) -> CancelToken {
        let flag = Arc::new(AtomicBool::new(false));
        let mut tokens = self.tokens.write().expect("cancel registry poisoned");
        tokens.retain(|w| w.strong_count() > 0);
        tokens.push(Arc::downgrade(&flag));
        CancelToken { flag }
    }

    /// Sets the cancelled flag on every token still alive. Idempotent: an
    /// already-cancelled token is simply set again.
    pub fn cancel_all(&self) {
        let tokens = self.tokens.read().expect("cancel registry poisoned");
        for weak in tokens.iter() {
            if let Some(flag) = weak.upgrade() {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        let tokens = self.tokens.read().expect("cancel registry poisoned");
        tokens.iter().filter(|w| w.strong_count() > 0).count()
    }
}

/// A single cooperative cancellation handle. Never blocks; `is_cancelled`
/// is a plain atomic load.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that can never be cancelled, for call sites that don't care
    /// about interruption (e.g. a test harness driving the engine directly).
    #[must_use]
    pub fn never_cancelled() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Only useful in tests: cancels this specific token without going
    /// through a registry broadcast.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_live_tokens() {
        let registry = CancelRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert!(!a.is_cancelled());
        assert!(!b.is_cancelled());

        registry.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn dropped_token_deregisters() {
        let registry = CancelRegistry::new();
        {
            let _a = registry.register();
            assert_eq!(registry.live_count(), 1);
        }
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::never_cancelled();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
