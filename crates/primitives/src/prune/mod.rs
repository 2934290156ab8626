mod mode;

pub use mode::PruneMode;
use serde::{Deserialize, Serialize};

/// Minimum distance from the tip necessary for the node to keep data that an unwind may need.
pub const MINIMUM_PRUNING_DISTANCE: u64 = 0;

/// Segment of the data that can be pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PruneSegment {
    /// Recovered transaction senders.
    SenderRecovery,
}

impl std::fmt::Display for PruneSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SenderRecovery => f.write_str("SenderRecovery"),
        }
    }
}

/// Prune segment error.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum PruneSegmentError {
    /// Invalid configuration of a prune segment.
    #[error("the configuration provided for {0} is invalid")]
    Configuration(PruneSegment),
}

/// Pruning configuration for every segment of the data that can be pruned.
#[derive(Debug, Clone, Default, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneModes {
    /// Sender recovery pruning configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub senders: Option<PruneMode>,
}

impl PruneModes {
    /// Sets pruning to no target.
    pub const fn none() -> Self {
        Self { senders: None }
    }

    /// Sets pruning to all targets.
    pub const fn all() -> Self {
        Self { senders: Some(PruneMode::Full) }
    }

    /// Returns whether any segment has pruning configured.
    pub const fn is_empty(&self) -> bool {
        self.senders.is_none()
    }
}
