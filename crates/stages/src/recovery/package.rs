use crate::StageError;
use stagedsync_primitives::{Address, BlockNumber, StoredBlockBody, TransactionSigned};

/// A canonical block of the recovery range and where its transactions are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderInfo {
    pub(crate) number: BlockNumber,
    pub(crate) body: StoredBlockBody,
}

/// A single transaction whose sender has to be recovered.
#[derive(Debug, Clone)]
pub struct RecoveryPackage {
    /// The block containing the transaction.
    pub block: BlockNumber,
    /// Index of the transaction inside its block.
    pub tx_index: u32,
    /// Whether this is the last transaction of its block.
    pub last_in_block: bool,
    /// The signed transaction.
    pub tx: TransactionSigned,
}

/// The recovered sender of a [`RecoveryPackage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecoveredSender {
    pub(crate) block: BlockNumber,
    pub(crate) tx_index: u32,
    pub(crate) last_in_block: bool,
    pub(crate) sender: Address,
}

/// A bounded group of packages handed to one worker.
#[derive(Debug)]
pub(crate) struct Batch {
    /// Batches are numbered in dispatch order, which is also the order they are persisted in.
    pub(crate) id: u64,
    pub(crate) packages: Vec<RecoveryPackage>,
}

impl Batch {
    pub(crate) const fn new(id: u64) -> Self {
        Self { id, packages: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.packages.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// The blocks covered by the batch.
    pub(crate) fn block_range(&self) -> Option<(BlockNumber, BlockNumber)> {
        Some((self.packages.first()?.block, self.packages.last()?.block))
    }
}

/// Completion notification a worker sends after it processed a batch.
#[derive(Debug)]
pub(crate) struct WorkerEvent {
    pub(crate) worker_id: usize,
    pub(crate) batch_id: u64,
    pub(crate) first_block: BlockNumber,
    pub(crate) last_block: BlockNumber,
    pub(crate) outcome: Result<Vec<RecoveredSender>, StageError>,
}
