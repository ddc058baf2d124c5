//! Per-record completion reporting.

use crate::http::HttpResponse;
use crossbeam_channel::{Receiver, Sender};
use placesync_model::Record;

/// The kind of write dispatched for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `POST` to the collection.
    Create,
    /// `PUT` to the record's endpoint.
    Update,
    /// `DELETE` of the record's endpoint.
    Delete,
}

impl Operation {
    /// Returns a lowercase name for messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    fn progressive(&self) -> &'static str {
        match self {
            Operation::Create => "creating",
            Operation::Update => "updating",
            Operation::Delete => "deleting",
        }
    }
}

/// How a dispatched record finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server answered; the status may still signal an error.
    Response(HttpResponse),
    /// No response was obtained: the attempt cap was hit, the run was
    /// cancelled, or the failure was not retryable.
    Abandoned {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        reason: String,
    },
}

/// A record's final result, delivered exactly once per dispatched record.
#[derive(Debug, Clone)]
pub struct Completion {
    /// What was attempted.
    pub operation: Operation,
    /// The record. After a successful create it carries its new remote identity.
    pub record: Record,
    /// How it finished.
    pub outcome: Outcome,
    /// Network attempts made.
    pub attempts: u32,
}

impl Completion {
    /// Returns the response, if one was obtained.
    pub fn response(&self) -> Option<&HttpResponse> {
        match &self.outcome {
            Outcome::Response(response) => Some(response),
            Outcome::Abandoned { .. } => None,
        }
    }

    /// Returns the response status, if one was obtained.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    /// Returns true if the operation succeeded: 2xx for writes, exactly 204
    /// for deletes.
    pub fn is_success(&self) -> bool {
        match (self.operation, self.status()) {
            (Operation::Delete, Some(status)) => status == 204,
            (_, Some(status)) => (200..300).contains(&status),
            (_, None) => false,
        }
    }

    /// Describes a failure for display.
    pub fn describe_failure(&self) -> String {
        match &self.outcome {
            Outcome::Response(response) => format!(
                "Error {} {}: {} ({})",
                self.operation.progressive(),
                self.record.label(),
                response.status,
                response.text()
            ),
            Outcome::Abandoned { attempts, reason } => format!(
                "Gave up on {} of {} after {} attempt(s): {}",
                self.operation.as_str(),
                self.record.label(),
                attempts,
                reason
            ),
        }
    }
}

/// Receives completions from worker threads.
///
/// Called concurrently from several workers, in no particular order.
pub trait CompletionSink: Send + Sync {
    /// Handles one completion.
    fn on_complete(&self, completion: Completion);
}

impl<F> CompletionSink for F
where
    F: Fn(Completion) + Send + Sync,
{
    fn on_complete(&self, completion: Completion) {
        self(completion)
    }
}

/// A sink that streams completions into a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Completion>,
}

impl ChannelSink {
    /// Creates an unbounded sink and its receiving end.
    pub fn unbounded() -> (Self, Receiver<Completion>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    /// Wraps an existing sender.
    pub fn new(sender: Sender<Completion>) -> Self {
        Self { sender }
    }
}

impl CompletionSink for ChannelSink {
    fn on_complete(&self, completion: Completion) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.sender.send(completion);
    }
}
