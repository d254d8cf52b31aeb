use anyhow::{Error, format_err};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts consecutive failures; `check` fails once `max_count` is reached.
#[derive(Debug)]
pub struct FailureCount {
    max_count: usize,
    counter: AtomicUsize,
}

impl FailureCount {
    pub fn new(max_count: usize) -> Self {
        Self {
            max_count,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// # Errors
    /// Returns error once `max_count` consecutive failures were recorded
    pub fn check(&self) -> Result<(), Error> {
        let count = self.count();
        if count >= self.max_count {
            Err(format_err!("giving up after {count} consecutive failures"))
        } else {
            Ok(())
        }
    }

    /// # Errors
    /// Never fails, returns `Result` to match `check`/`increment`
    pub fn reset(&self) -> Result<(), Error> {
        self.counter.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// # Errors
    /// Returns error if this failure reaches `max_count`
    pub fn increment(&self) -> Result<(), Error> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        self.check()
    }
}
