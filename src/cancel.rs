use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the caller and a worker.
///
/// Set-once: there is deliberately no way to clear the flag. Long-running
/// loops poll `is_cancelled` between units of work (chunks, archive entries,
/// wait ticks) and unwind with `Outcome::Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
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

/// Result of a cancellable step. Cancellation is not an error: a step either
/// completes with a value, observes the token and stops, or fails with a
/// `LaunchError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }
}

pub type StepResult<T> = Result<Outcome<T>, crate::error::LaunchError>;

/// Returns `Ok(Outcome::Cancelled)` from the enclosing function when the
/// token has been cancelled.
#[macro_export]
macro_rules! check_cancelled {
    ($token:expr) => {
        if $token.is_cancelled() {
            return Ok($crate::cancel::Outcome::Cancelled);
        }
    };
}

/// Unwraps the completed value of a `StepResult`, propagating both errors
/// and cancellation to the enclosing function.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr? {
            $crate::cancel::Outcome::Completed(value) => value,
            $crate::cancel::Outcome::Cancelled => {
                return Ok($crate::cancel::Outcome::Cancelled)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_clear_and_stays_set() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn outcome_map_preserves_cancellation() {
        let done = Outcome::Completed(2).map(|n| n * 2);
        assert_eq!(done, Outcome::Completed(4));
        let cancelled: Outcome<i32> = Outcome::Cancelled;
        assert!(cancelled.map(|n| n * 2).is_cancelled());
    }
}
