use crate::StageId;
use stagedsync_primitives::BlockNumber;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// An event emitted by a [`SyncManager`][crate::SyncManager].
///
/// It is possible for multiple of these events to be emitted over the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Emitted when a stage is about to be run forward.
    Running {
        /// The stage that is about to be run.
        stage_id: StageId,
        /// The progress of the stage before the run.
        progress: BlockNumber,
    },
    /// Emitted when a stage has run forward successfully.
    Ran {
        /// The stage that was run.
        stage_id: StageId,
        /// The progress of the stage after the run.
        progress: BlockNumber,
    },
    /// Emitted when a stage is about to be unwound.
    Unwinding {
        /// The stage that is about to be unwound.
        stage_id: StageId,
        /// The progress of the stage before the unwind.
        progress: BlockNumber,
        /// The height the stage unwinds to.
        target: BlockNumber,
    },
    /// Emitted when a stage has been unwound.
    Unwound {
        /// The stage that was unwound.
        stage_id: StageId,
        /// The progress of the stage after the unwind.
        progress: BlockNumber,
    },
    /// Emitted when a stage has pruned its data.
    Pruned {
        /// The stage that was pruned.
        stage_id: StageId,
        /// The prune progress of the stage after pruning.
        prune_progress: BlockNumber,
    },
    /// Emitted when a disabled stage is passed over.
    Skipped {
        /// The stage that was skipped.
        stage_id: StageId,
    },
    /// Emitted when a stage failed, halting the run.
    Error {
        /// The stage that failed.
        stage_id: StageId,
    },
}

impl SyncEvent {
    /// Returns the stage the event is about.
    pub const fn stage_id(&self) -> StageId {
        match self {
            Self::Running { stage_id, .. } |
            Self::Ran { stage_id, .. } |
            Self::Unwinding { stage_id, .. } |
            Self::Unwound { stage_id, .. } |
            Self::Pruned { stage_id, .. } |
            Self::Skipped { stage_id } |
            Self::Error { stage_id } => *stage_id,
        }
    }
}

/// Bundles all listeners for events of type `T`.
#[derive(Debug)]
pub(crate) struct EventListeners<T> {
    /// All listeners for an event
    listeners: Vec<UnboundedSender<T>>,
}

impl<T> Default for EventListeners<T> {
    fn default() -> Self {
        Self { listeners: Vec::new() }
    }
}

impl<T: Clone> EventListeners<T> {
    /// Sends the event to all listeners.
    ///
    /// Remove channels that got closed.
    pub(crate) fn notify(&mut self, event: T) {
        self.listeners.retain(|listener| {
            let open = listener.send(event.clone()).is_ok();
            if !open {
                trace!(target: "sync::manager", "event listener channel closed");
            }
            open
        });
    }

    /// Adds a new event listener.
    pub(crate) fn new_listener(&mut self) -> UnboundedReceiver<T> {
        let (sender, receiver) = unbounded_channel();
        self.listeners.push(sender);
        receiver
    }
}
