//! Console mode: a background consumer streams printer output into a bounded
//! ring buffer that the foreground viewer drains and renders.

pub mod buffer;
pub mod consumer;
pub mod status;
pub mod viewer;

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::ApiError;
use crate::model::EventKind;

pub use buffer::RingBuffer;
pub use consumer::ConsoleConsumer;
pub use viewer::{ConsoleViewer, InputEvent, InputSource};

/// One line of console output. Ordered by `(timestamp, seq)`; `seq` is unique
/// within a consumer, so it also serves as the identity.
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleEvent {
    /// Epoch seconds at capture.
    pub timestamp: f64,
    pub seq: u64,
    pub kind: EventKind,
    pub text: String,
}

impl PartialEq for ConsoleEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ConsoleEvent {}

impl PartialOrd for ConsoleEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConsoleEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Lifecycle of a console consumer. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum ConsumerState {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Closed,
    Failed(ApiError),
}

impl ConsumerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Closed => "closed",
            Self::Failed(_) => "failed",
        }
    }
}
