use stagedsync_db::{DatabaseError, StageProgressReader, StageProgressWriter};
use stagedsync_primitives::BlockNumber;
use std::fmt::{Display, Formatter};

/// Stage IDs for all known stages.
///
/// For custom stages, use [`StageId::Other`]
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageId {
    Headers,
    BlockHashes,
    Bodies,
    Senders,
    Execution,
    HashState,
    IntermediateHashes,
    AccountHistoryIndex,
    StorageHistoryIndex,
    LogIndex,
    TxLookup,
    Finish,
    Other(&'static str),
}

impl StageId {
    /// All supported Stages, in forward order.
    pub const ALL: [Self; 12] = [
        Self::Headers,
        Self::BlockHashes,
        Self::Bodies,
        Self::Senders,
        Self::Execution,
        Self::HashState,
        Self::IntermediateHashes,
        Self::AccountHistoryIndex,
        Self::StorageHistoryIndex,
        Self::LogIndex,
        Self::TxLookup,
        Self::Finish,
    ];

    /// Return stage id formatted as string.
    ///
    /// This is the key the stage progress is persisted under.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Headers => "Headers",
            Self::BlockHashes => "BlockHashes",
            Self::Bodies => "Bodies",
            Self::Senders => "Senders",
            Self::Execution => "Execution",
            Self::HashState => "HashState",
            Self::IntermediateHashes => "IntermediateHashes",
            Self::AccountHistoryIndex => "AccountHistoryIndex",
            Self::StorageHistoryIndex => "StorageHistoryIndex",
            Self::LogIndex => "LogIndex",
            Self::TxLookup => "TxLookup",
            Self::Finish => "Finish",
            Self::Other(s) => *s,
        }
    }

    /// Returns true if it's a downloading stage [`StageId::Headers`] or [`StageId::Bodies`]
    pub const fn is_downloading_stage(&self) -> bool {
        matches!(self, Self::Headers | Self::Bodies)
    }

    /// Returns `true` if it's [`StageId::Finish`].
    pub const fn is_finish(&self) -> bool {
        matches!(self, Self::Finish)
    }

    /// Get the last committed progress of this stage.
    pub fn get_progress(
        &self,
        tx: &impl StageProgressReader,
    ) -> Result<Option<BlockNumber>, DatabaseError> {
        tx.stage_progress(self.as_str())
    }

    /// Save the progress of this stage.
    pub fn save_progress(
        &self,
        tx: &impl StageProgressWriter,
        block: BlockNumber,
    ) -> Result<(), DatabaseError> {
        tx.save_stage_progress(self.as_str(), block)
    }
}

impl Display for StageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
