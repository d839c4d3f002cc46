//! Run-scoped fatal condition flag.

use std::sync::OnceLock;

/// Observable state of a [`FatalGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Clear,
    Set,
    SetWithReason(String),
}

impl GuardState {
    pub fn is_set(&self) -> bool {
        !matches!(self, GuardState::Clear)
    }
}

/// Set-once flag that stops new dispatch to guarded stages.
///
/// The first caller of [`FatalGuard::trip`] wins; later reasons are ignored
/// and the guard never clears for the lifetime of the run.
#[derive(Debug, Default)]
pub struct FatalGuard {
    reason: OnceLock<Option<String>>,
}

impl FatalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the guard. Returns true only for the call that actually set it.
    pub fn trip(&self, reason: Option<String>) -> bool {
        self.reason.set(reason).is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().and_then(|r| r.as_deref())
    }

    pub fn state(&self) -> GuardState {
        match self.reason.get() {
            None => GuardState::Clear,
            Some(None) => GuardState::Set,
            Some(Some(reason)) => GuardState::SetWithReason(reason.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_clear() {
        let guard = FatalGuard::new();
        assert!(!guard.is_set());
        assert_eq!(guard.state(), GuardState::Clear);
        assert_eq!(guard.reason(), None);
    }

    #[test]
    fn test_first_reason_wins() {
        let guard = FatalGuard::new();
        assert!(guard.trip(Some("quotaExceeded".to_string())));
        assert!(!guard.trip(Some("rate limited".to_string())));
        assert_eq!(guard.reason(), Some("quotaExceeded"));
        assert_eq!(
            guard.state(),
            GuardState::SetWithReason("quotaExceeded".to_string())
        );
    }

    #[test]
    fn test_set_without_reason() {
        let guard = FatalGuard::new();
        assert!(guard.trip(None));
        assert!(guard.is_set());
        assert_eq!(guard.state(), GuardState::Set);
        assert!(!guard.trip(Some("late".to_string())));
        assert_eq!(guard.reason(), None);
    }

    #[test]
    fn test_concurrent_trip_sets_once() {
        let guard = Arc::new(FatalGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || guard.trip(Some(format!("worker {}", i))))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(guard.state().is_set());
    }
}
