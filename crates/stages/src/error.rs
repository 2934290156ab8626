use crate::StageId;
use stagedsync_db::DatabaseError;
use stagedsync_etl::EtlError;
use stagedsync_primitives::BlockNumber;
use thiserror::Error;

/// A stage execution error.
#[derive(Error, Debug)]
pub enum StageError {
    /// The configured chain is not known.
    #[error("Unknown chain id {0}.")]
    UnknownChainId(u64),
    /// The configured consensus engine is not supported.
    #[error("Unknown consensus engine {0}.")]
    UnknownConsensusEngine(String),
    /// A canonical hash record does not have the length of a hash.
    #[error("Bad block hash for block #{block}: expected 32 bytes, got {len}.")]
    BadBlockHash {
        /// The block the record belongs to.
        block: BlockNumber,
        /// The length of the stored record.
        len: usize,
    },
    /// Blocks were found out of sequence.
    #[error("Bad chain sequence: expected block #{expected}, got #{got}.")]
    BadChainSequence {
        /// The block number that was expected next.
        expected: BlockNumber,
        /// The block number that was found.
        got: BlockNumber,
    },
    /// The requested block range is empty or inverted.
    #[error("Invalid block range {from}..={to}.")]
    InvalidRange {
        /// First block of the range.
        from: BlockNumber,
        /// Last block of the range.
        to: BlockNumber,
    },
    /// The stage progress is ahead of the data it depends on.
    #[error("Invalid progress for stage {stage}: at #{progress}, upstream at #{upstream}.")]
    InvalidProgress {
        /// The stage whose progress is invalid.
        stage: StageId,
        /// The progress of the stage.
        progress: BlockNumber,
        /// The progress of the data the stage depends on.
        upstream: BlockNumber,
    },
    /// A block is missing or malformed.
    #[error("Invalid block #{block}.")]
    InvalidBlock {
        /// The block number.
        block: BlockNumber,
    },
    /// The sender of a transaction could not be recovered.
    #[error("Invalid transaction {tx_index} in block #{block}: sender recovery failed.")]
    InvalidTransaction {
        /// The block containing the transaction.
        block: BlockNumber,
        /// Index of the transaction inside its block.
        tx_index: u32,
    },
    /// Recovered senders are missing for a block.
    #[error("Missing senders for block #{block}.")]
    MissingSenders {
        /// The block number.
        block: BlockNumber,
    },
    /// Stored data could not be decoded.
    #[error("Decoding error: {0}")]
    Decoding(String),
    /// The stage encountered a database error.
    #[error("An internal database error occurred: {0}")]
    Database(#[from] DatabaseError),
    /// The stage was interrupted.
    #[error("Stage aborted.")]
    Aborted,
    /// The requested operation is not implemented by the stage.
    #[error("Not implemented.")]
    NotImplemented,
    /// An unexpected fault, such as a panic or an I/O error.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
    /// An unclassified fault.
    #[error("Unknown error.")]
    Unknown,
}

impl StageError {
    /// Returns the category of the error.
    pub const fn kind(&self) -> StageErrorKind {
        match self {
            Self::UnknownChainId(_) => StageErrorKind::UnknownChainId,
            Self::UnknownConsensusEngine(_) => StageErrorKind::UnknownConsensusEngine,
            Self::BadBlockHash { .. } => StageErrorKind::BadBlockHash,
            Self::BadChainSequence { .. } => StageErrorKind::BadChainSequence,
            Self::InvalidRange { .. } => StageErrorKind::InvalidRange,
            Self::InvalidProgress { .. } => StageErrorKind::InvalidProgress,
            Self::InvalidBlock { .. } => StageErrorKind::InvalidBlock,
            Self::InvalidTransaction { .. } => StageErrorKind::InvalidTransaction,
            Self::MissingSenders { .. } => StageErrorKind::MissingSenders,
            Self::Decoding(_) => StageErrorKind::Decoding,
            Self::Database(_) => StageErrorKind::Database,
            Self::Aborted => StageErrorKind::Aborted,
            Self::NotImplemented => StageErrorKind::NotImplemented,
            Self::Unexpected(_) => StageErrorKind::Unexpected,
            Self::Unknown => StageErrorKind::Unknown,
        }
    }

    /// Maps a payload caught from a panic to an unexpected error.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            Self::Unexpected((*message).to_string())
        } else if let Some(message) = payload.downcast_ref::<String>() {
            Self::Unexpected(message.clone())
        } else {
            Self::Unknown
        }
    }
}

impl From<EtlError> for StageError {
    fn from(error: EtlError) -> Self {
        match error {
            EtlError::Database(error) => Self::Database(error),
            EtlError::Io(error) => Self::Unexpected(error.to_string()),
        }
    }
}

impl From<std::io::Error> for StageError {
    fn from(error: std::io::Error) -> Self {
        Self::Unexpected(error.to_string())
    }
}

/// The category of a [`StageError`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageErrorKind {
    UnknownChainId,
    UnknownConsensusEngine,
    BadBlockHash,
    BadChainSequence,
    InvalidRange,
    InvalidProgress,
    InvalidBlock,
    InvalidTransaction,
    MissingSenders,
    Decoding,
    Database,
    Aborted,
    NotImplemented,
    Unexpected,
    Unknown,
}

impl StageErrorKind {
    /// The process exit status reported for this category.
    ///
    /// Every category maps to a distinct non-zero status.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Unknown => 1,
            Self::UnknownChainId => 2,
            Self::UnknownConsensusEngine => 3,
            Self::BadBlockHash => 4,
            Self::BadChainSequence => 5,
            Self::InvalidRange => 6,
            Self::InvalidProgress => 7,
            Self::InvalidBlock => 8,
            Self::InvalidTransaction => 9,
            Self::MissingSenders => 10,
            Self::Decoding => 11,
            Self::Database => 12,
            Self::Aborted => 13,
            Self::NotImplemented => 14,
            Self::Unexpected => 15,
        }
    }
}

/// A sync manager error.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A stage failed, which halts the run.
    #[error("Stage {stage} failed: {error}")]
    Stage {
        /// The failing stage.
        stage: StageId,
        /// The error reported by the stage.
        #[source]
        error: StageError,
    },
    /// The manager encountered a database error outside of a stage.
    #[error("A database error occurred: {0}")]
    Database(#[from] DatabaseError),
    /// The configured set of stages is not valid.
    #[error("Invalid stage set: {0}")]
    InvalidStageSet(String),
}

impl SyncError {
    /// Returns the category of the error.
    pub const fn kind(&self) -> StageErrorKind {
        match self {
            Self::Stage { error, .. } => error.kind(),
            Self::Database(_) => StageErrorKind::Database,
            Self::InvalidStageSet(_) => StageErrorKind::Unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let kinds = [
            StageErrorKind::UnknownChainId,
            StageErrorKind::UnknownConsensusEngine,
            StageErrorKind::BadBlockHash,
            StageErrorKind::BadChainSequence,
            StageErrorKind::InvalidRange,
            StageErrorKind::InvalidProgress,
            StageErrorKind::InvalidBlock,
            StageErrorKind::InvalidTransaction,
            StageErrorKind::MissingSenders,
            StageErrorKind::Decoding,
            StageErrorKind::Database,
            StageErrorKind::Aborted,
            StageErrorKind::NotImplemented,
            StageErrorKind::Unexpected,
            StageErrorKind::Unknown,
        ];
        let codes = kinds.iter().map(StageErrorKind::exit_code).collect::<HashSet<_>>();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn sync_error_reports_stage_kind() {
        let error = SyncError::Stage {
            stage: StageId::BlockHashes,
            error: StageError::BadChainSequence { expected: 3, got: 4 },
        };
        assert_eq!(error.kind(), StageErrorKind::BadChainSequence);
        assert_eq!(
            error.to_string(),
            "Stage BlockHashes failed: Bad chain sequence: expected block #3, got #4."
        );
    }

    #[test]
    fn panics_map_to_unexpected() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_matches::assert_matches!(
            StageError::from_panic(payload),
            StageError::Unexpected(message) if message == "boom"
        );
    }

    #[test]
    fn etl_io_errors_are_unexpected() {
        let error = StageError::from(EtlError::Io(std::io::Error::other("disk full")));
        assert_eq!(error.kind(), StageErrorKind::Unexpected);
    }
}
