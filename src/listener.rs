//! Job lifecycle notifications
//!
//! Every job reports `on_started`, any number of `on_progress` calls and
//! exactly one of `on_completed`, `on_cancelled` or `on_error`.

use tokio::sync::mpsc;

use crate::error::TransformError;
use crate::stats::TrackTransformationInfo;

pub trait TransformationListener: Send + Sync {
    fn on_started(&self, job_id: &str);

    /// Aggregate progress in `[0, 1]`
    fn on_progress(&self, job_id: &str, progress: f32);

    fn on_completed(&self, job_id: &str, stats: Vec<TrackTransformationInfo>);

    fn on_cancelled(&self, job_id: &str, stats: Vec<TrackTransformationInfo>);

    fn on_error(&self, job_id: &str, error: TransformError, stats: Vec<TrackTransformationInfo>);
}

/// A listener callback captured as a value
#[derive(Debug)]
pub enum TransformationEvent {
    Started {
        job_id: String,
    },
    Progress {
        job_id: String,
        progress: f32,
    },
    Completed {
        job_id: String,
        stats: Vec<TrackTransformationInfo>,
    },
    Cancelled {
        job_id: String,
        stats: Vec<TrackTransformationInfo>,
    },
    Error {
        job_id: String,
        error: TransformError,
        stats: Vec<TrackTransformationInfo>,
    },
}

impl TransformationEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Started { job_id }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Cancelled { job_id, .. }
            | Self::Error { job_id, .. } => job_id,
        }
    }

    /// Whether this is the last event of its job
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Cancelled { .. } | Self::Error { .. }
        )
    }
}

/// Forwards callbacks from the worker thread into an unbounded channel.
///
/// Events sent after the receiver was dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<TransformationEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransformationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TransformationEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!(job_id = e.0.job_id(), "Dropping event, receiver is gone");
        }
    }
}

impl TransformationListener for ChannelListener {
    fn on_started(&self, job_id: &str) {
        self.send(TransformationEvent::Started {
            job_id: job_id.to_string(),
        });
    }

    fn on_progress(&self, job_id: &str, progress: f32) {
        self.send(TransformationEvent::Progress {
            job_id: job_id.to_string(),
            progress,
        });
    }

    fn on_completed(&self, job_id: &str, stats: Vec<TrackTransformationInfo>) {
        self.send(TransformationEvent::Completed {
            job_id: job_id.to_string(),
            stats,
        });
    }

    fn on_cancelled(&self, job_id: &str, stats: Vec<TrackTransformationInfo>) {
        self.send(TransformationEvent::Cancelled {
            job_id: job_id.to_string(),
            stats,
        });
    }

    fn on_error(&self, job_id: &str, error: TransformError, stats: Vec<TrackTransformationInfo>) {
        self.send(TransformationEvent::Error {
            job_id: job_id.to_string(),
            error,
            stats,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (listener, mut rx) = ChannelListener::new();
        listener.on_started("job");
        listener.on_progress("job", 0.5);
        listener.on_completed("job", Vec::new());

        assert!(matches!(rx.try_recv(), Ok(TransformationEvent::Started { .. })));
        match rx.try_recv() {
            Ok(TransformationEvent::Progress { job_id, progress }) => {
                assert_eq!(job_id, "job");
                assert_eq!(progress, 0.5);
            }
            other => panic!("unexpected event {:?}", other),
        }
        let last = rx.try_recv().unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.job_id(), "job");
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_error("job", TransformError::Interrupted("stop".into()), Vec::new());
    }
}
