//! Progress events and broadcast channel for sync runs.
//!
//! The orchestrator emits a `ProgressEvent` for every partition state
//! transition. Events flow through a `tokio::sync::broadcast` channel to any
//! subscriber; with no subscriber they are dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job that emitted the event.
    pub job: String,
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// The portal session is open and its partitions are known.
    SessionOpened { partitions: u32 },
    /// A partition moved to a new state.
    StateChanged {
        partition: String,
        state: PartitionState,
    },
    /// A partition failed in the given stage; its stored rows are untouched
    /// unless the stage was `Writing`.
    PartitionFailed {
        partition: String,
        stage: PartitionState,
        reason: String,
    },
    /// Every partition has been handled.
    RunComplete {
        done: u32,
        failed: u32,
        skipped: u32,
        elapsed_ms: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Lifecycle of one partition within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionState {
    Pending,
    Fetching,
    Extracting,
    Resolving,
    Writing,
    Done,
    Failed,
    Skipped,
}

impl PartitionState {
    /// Whether no further transition can follow.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for PartitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetching => write!(f, "fetching"),
            Self::Extracting => write!(f, "extracting"),
            Self::Resolving => write!(f, "resolving"),
            Self::Writing => write!(f, "writing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a progress channel. Five events per partition fit a few hundred
/// partitions before a slow subscriber starts lagging.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(1024)
}

/// Emit a progress event, ignoring send errors (no receivers listening).
pub fn emit(tx: &Option<ProgressSender>, job: &str, seq: &mut u64, event: ProgressEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent {
            job: job.to_string(),
            seq: *seq,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_serialization() {
        let event = ProgressEvent {
            job: "exams".to_string(),
            seq: 3,
            event: ProgressEventKind::StateChanged {
                partition: "CENG".to_string(),
                state: PartitionState::Fetching,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StateChanged"));
        assert!(json.contains("Fetching"));

        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.job, "exams");
        assert_eq!(parsed.seq, 3);
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        let mut seq = 0;
        emit(
            &Some(tx),
            "calendar",
            &mut seq,
            ProgressEventKind::Warning {
                message: "no rows".to_string(),
            },
        );
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_emit_none_sender_keeps_seq() {
        let mut seq = 0;
        emit(
            &None,
            "schedule",
            &mut seq,
            ProgressEventKind::SessionOpened { partitions: 2 },
        );
        assert_eq!(seq, 0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(PartitionState::Done.is_terminal());
        assert!(PartitionState::Failed.is_terminal());
        assert!(PartitionState::Skipped.is_terminal());
        assert!(!PartitionState::Writing.is_terminal());
        assert_eq!(PartitionState::Resolving.to_string(), "resolving");
    }
}
