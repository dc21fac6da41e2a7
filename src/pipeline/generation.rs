//! Run generations
//!
//! Each selection input owns a monotonically increasing generation counter.
//! A run takes a token when it starts; once a newer run has started (or the
//! input was invalidated) the token is stale and the run must not publish.

use crate::error::StaleRunDiscarded;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generation counter for one selection input
#[derive(Debug, Default)]
pub struct RunGenerations {
    current: AtomicU64,
}

impl RunGenerations {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start a new run, superseding every earlier one
    pub fn begin(self: &Arc<Self>) -> GenerationToken {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationToken {
            generation,
            counter: Arc::clone(self),
        }
    }

    /// Supersede in-flight runs without starting a new one
    pub fn invalidate(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Generation captured by a run at start
#[derive(Debug, Clone)]
pub struct GenerationToken {
    generation: u64,
    counter: Arc<RunGenerations>,
}

impl GenerationToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.counter.current() == self.generation
    }

    /// `Err` once a newer generation exists
    pub fn check(&self) -> Result<(), StaleRunDiscarded> {
        if self.is_current() {
            Ok(())
        } else {
            Err(self.discarded())
        }
    }

    pub fn discarded(&self) -> StaleRunDiscarded {
        StaleRunDiscarded {
            generation: self.generation,
            superseded_by: self.counter.current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_token_is_current() {
        let runs = RunGenerations::new();
        let first = runs.begin();
        assert!(first.is_current());
        assert_eq!(first.generation(), 1);

        let second = runs.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(
            first.check(),
            Err(StaleRunDiscarded {
                generation: 1,
                superseded_by: 2
            })
        );
        assert!(second.check().is_ok());
    }

    #[test]
    fn test_invalidate_supersedes_without_new_run() {
        let runs = RunGenerations::new();
        let token = runs.begin();
        assert_eq!(runs.invalidate(), 2);
        assert!(!token.is_current());
        assert_eq!(runs.current(), 2);
    }
}
