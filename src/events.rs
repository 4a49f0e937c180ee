//! File events consumed by the pipeline and repository events emitted
//! back to subscribers
//!
//! Subscribers receive events over crossbeam channels. A disconnected
//! subscriber is pruned on the next emit; delivery problems are logged
//! and never re-raised into the pipeline.

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEventKind {
    Added,
    Changed,
    Deleted,
    Renamed,
}

impl FileEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileEventKind::Added => "added",
            FileEventKind::Changed => "changed",
            FileEventKind::Deleted => "deleted",
            FileEventKind::Renamed => "renamed",
        }
    }
}

impl std::fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A change to one file-unit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: String,
    /// The previous path, for renames
    pub old_path: Option<String>,
}

impl FileEvent {
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            kind: FileEventKind::Added,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn changed(path: impl Into<String>) -> Self {
        Self {
            kind: FileEventKind::Changed,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            kind: FileEventKind::Deleted,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn renamed(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: FileEventKind::Renamed,
            path: path.into(),
            old_path: Some(old_path.into()),
        }
    }
}

/// Events the repository emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoEvent {
    /// A file's parse-merge (or removal) completed
    FileProcessed { kind: FileEventKind, path: String },
    /// An expected, non-fatal error occurred and was recovered
    ErrorRaised { error: String },
    /// The readiness flag flipped
    IsReadyChanged { is_ready: bool },
}

/// Fan-out of repository events to any number of subscribers.
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<RepoEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<RepoEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber.
    pub fn emit(&self, event: RepoEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("dropping disconnected event subscriber");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_all_subscribers() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.emit(RepoEvent::IsReadyChanged { is_ready: true });

        for rx in [&rx1, &rx2] {
            assert_eq!(
                rx.try_recv().unwrap(),
                RepoEvent::IsReadyChanged { is_ready: true }
            );
        }
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        let live = bus.subscribe();

        bus.emit(RepoEvent::ErrorRaised {
            error: "boom".into(),
        });

        assert_eq!(bus.subscriber_count(), 1);
        assert!(live.try_recv().is_ok());
    }
}
