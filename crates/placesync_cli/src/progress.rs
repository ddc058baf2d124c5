//! Console progress for dispatch runs.

use parking_lot::Mutex;
use placesync_engine::{Completion, CompletionSink};
use std::io::Write;

const SPINNER_FRAMES: [char; 4] = ['\\', '|', '/', '-'];

struct ProgressState<W> {
    out: W,
    succeeded: u64,
    failed: u64,
}

/// Rewrites one status line per success and prints a line per failure.
///
/// Output is serialized, so workers may report concurrently.
pub struct ProgressSink<W: Write + Send> {
    verb: &'static str,
    state: Mutex<ProgressState<W>>,
}

impl ProgressSink<std::io::Stderr> {
    /// Reports to standard error.
    pub fn stderr(verb: &'static str) -> Self {
        Self::new(verb, std::io::stderr())
    }
}

impl<W: Write + Send> ProgressSink<W> {
    /// Reports to `out`, describing successes with `verb` ("Saved", "Deleted").
    pub fn new(verb: &'static str, out: W) -> Self {
        Self {
            verb,
            state: Mutex::new(ProgressState {
                out,
                succeeded: 0,
                failed: 0,
            }),
        }
    }

    /// Successes so far.
    pub fn succeeded(&self) -> u64 {
        self.state.lock().succeeded
    }

    /// Failures so far.
    pub fn failed(&self) -> u64 {
        self.state.lock().failed
    }

    /// Ends the status line.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        let _ = writeln!(state.out);
        let _ = state.out.flush();
    }

    /// Consumes the sink, returning its writer.
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.state.into_inner().out
    }
}

impl<W: Write + Send> CompletionSink for ProgressSink<W> {
    fn on_complete(&self, completion: Completion) {
        let mut state = self.state.lock();
        // Console output is best effort.
        if completion.is_success() {
            let step = state.succeeded;
            let frame = SPINNER_FRAMES[(step % 4) as usize];
            let _ = write!(state.out, "\r{} - {} {}  ", step, self.verb, frame);
            state.succeeded += 1;
        } else {
            let _ = writeln!(state.out, "\n{}", completion.describe_failure());
            state.failed += 1;
        }
        let _ = state.out.flush();
    }
}
