//! Two-state lifecycle of a patch registration.

use std::sync::atomic::{AtomicU8, Ordering};

/// State of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Hooks are linked and run on every call
    Active = 0,
    /// Hooks are unlinked; no transition leaves this state
    Retired = 1,
}

/// Tracks whether a registration's hooks are still live.
///
/// `Active → Retired` is the only transition. Retiring is idempotent and may happen from
/// inside one of the registration's own hooks: the dispatcher finishes the current call and
/// unlinks the hooks on the next invocation of the target.
///
/// ```rust
/// use ilweave::patching::{Lifecycle, LifecycleState};
///
/// let lifecycle = Lifecycle::new();
/// assert!(lifecycle.retire());
/// assert!(!lifecycle.retire());
/// assert_eq!(lifecycle.state(), LifecycleState::Retired);
/// ```
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    /// Creates an active lifecycle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        if self.state.load(Ordering::Acquire) == LifecycleState::Retired as u8 {
            LifecycleState::Retired
        } else {
            LifecycleState::Active
        }
    }

    /// Returns `true` while the hooks are live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// Moves to [`LifecycleState::Retired`].
    ///
    /// Returns `true` if this call performed the transition and `false` if the registration
    /// was already retired.
    pub fn retire(&self) -> bool {
        self.state
            .compare_exchange(
                LifecycleState::Active as u8,
                LifecycleState::Retired as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_retire_is_idempotent() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.is_active());
        assert!(lifecycle.retire());
        assert!(!lifecycle.is_active());
        for _ in 0..3 {
            assert!(!lifecycle.retire());
        }
    }

    #[test]
    fn test_single_winner_across_threads() {
        let lifecycle = Arc::new(Lifecycle::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                thread::spawn(move || lifecycle.retire())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
