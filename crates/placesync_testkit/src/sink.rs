//! Completion sinks for assertions.

use parking_lot::Mutex;
use placesync_engine::{Completion, CompletionSink, Operation};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Keeps every completion it receives.
#[derive(Default)]
pub struct CollectingSink {
    completions: Mutex<Vec<Completion>>,
    counter: Option<Arc<AtomicUsize>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also bumps `counter` after storing each completion.
    pub fn with_counter(counter: Arc<AtomicUsize>) -> Self {
        Self {
            completions: Mutex::new(Vec::new()),
            counter: Some(counter),
        }
    }

    /// Everything received so far.
    pub fn completions(&self) -> Vec<Completion> {
        self.completions.lock().clone()
    }

    /// Number of completions received.
    pub fn len(&self) -> usize {
        self.completions.lock().len()
    }

    /// Returns true if nothing arrived.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completions that succeeded.
    pub fn successes(&self) -> usize {
        self.completions.lock().iter().filter(|c| c.is_success()).count()
    }

    /// Completions that did not succeed.
    pub fn failures(&self) -> Vec<Completion> {
        self.completions
            .lock()
            .iter()
            .filter(|c| !c.is_success())
            .cloned()
            .collect()
    }

    /// Completions for `operation`.
    pub fn for_operation(&self, operation: Operation) -> Vec<Completion> {
        self.completions
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }
}

impl CompletionSink for CollectingSink {
    fn on_complete(&self, completion: Completion) {
        self.completions.lock().push(completion);
        if let Some(counter) = &self.counter {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}
