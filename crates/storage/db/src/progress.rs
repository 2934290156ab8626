//! Persisted stage progress.

use crate::{
    tables::{SyncStage, SyncStagePrune},
    DatabaseError, DbTx, DbTxMut,
};
use stagedsync_primitives::BlockNumber;

/// Reads the persisted progress of stages.
pub trait StageProgressReader: DbTx {
    /// Returns the highest block the stage with the given key has fully processed.
    fn stage_progress(&self, key: &str) -> Result<Option<BlockNumber>, DatabaseError> {
        self.get::<SyncStage>(key.to_string())
    }

    /// Returns the highest block the stage with the given key has pruned.
    fn stage_prune_progress(&self, key: &str) -> Result<Option<BlockNumber>, DatabaseError> {
        self.get::<SyncStagePrune>(key.to_string())
    }
}

impl<TX: DbTx> StageProgressReader for TX {}

/// Persists the progress of stages.
pub trait StageProgressWriter: DbTxMut {
    /// Saves the highest block the stage with the given key has fully processed.
    fn save_stage_progress(&self, key: &str, progress: BlockNumber) -> Result<(), DatabaseError> {
        self.put::<SyncStage>(key.to_string(), progress)
    }

    /// Saves the highest block the stage with the given key has pruned.
    fn save_stage_prune_progress(
        &self,
        key: &str,
        progress: BlockNumber,
    ) -> Result<(), DatabaseError> {
        self.put::<SyncStagePrune>(key.to_string(), progress)
    }
}

impl<TX: DbTxMut> StageProgressWriter for TX {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_utils::create_test_db, Database};

    #[test]
    fn progress_round_trips_through_the_store() {
        let db = create_test_db();

        let tx = db.tx_mut().unwrap();
        assert_eq!(tx.stage_progress("Senders").unwrap(), None);
        tx.save_stage_progress("Senders", 42).unwrap();
        tx.save_stage_prune_progress("Senders", 10).unwrap();
        tx.commit().unwrap();

        let tx = db.tx().unwrap();
        assert_eq!(tx.stage_progress("Senders").unwrap(), Some(42));
        assert_eq!(tx.stage_prune_progress("Senders").unwrap(), Some(10));
        assert_eq!(tx.stage_prune_progress("BlockHashes").unwrap(), None);
    }
}
