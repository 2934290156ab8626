use crate::StageId;
use stagedsync_db::{
    tables, test_utils::create_test_db, Database, DatabaseError, DbCursorRO, DbTx, DbTxMut,
    MemDatabase, MemTx, MemTxMut, StageProgressReader, StageProgressWriter, Table,
};
use stagedsync_primitives::{BlockHash, BlockNumHash, BlockNumber, SealedBlock, StoredBlockBody};
use std::sync::Arc;

/// A database wrapper with helpers to seed and inspect stage data.
#[derive(Debug)]
pub struct TestStageDB {
    pub db: Arc<MemDatabase>,
}

impl Default for TestStageDB {
    /// Create a new instance of [TestStageDB]
    fn default() -> Self {
        Self { db: create_test_db() }
    }
}

impl TestStageDB {
    /// Return a database handle the stages can run on.
    pub fn factory(&self) -> Arc<MemDatabase> {
        self.db.clone()
    }

    /// Invoke a callback with transaction committing it afterwards
    pub fn commit<F>(&self, f: F) -> Result<(), DatabaseError>
    where
        F: FnOnce(&MemTxMut) -> Result<(), DatabaseError>,
    {
        let tx = self.db.tx_mut()?;
        f(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Invoke a callback with a read transaction
    pub fn query<F, Ok>(&self, f: F) -> Result<Ok, DatabaseError>
    where
        F: FnOnce(&MemTx) -> Result<Ok, DatabaseError>,
    {
        f(&self.db.tx()?)
    }

    /// Check if the table is empty
    pub fn table_is_empty<T: Table>(&self) -> Result<bool, DatabaseError> {
        self.query(|tx| Ok(tx.entries::<T>()? == 0))
    }

    /// Return full table as Vec
    pub fn table<T: Table>(&self) -> Result<Vec<(T::Key, T::Value)>, DatabaseError> {
        self.query(|tx| tx.cursor_read::<T>()?.walk(None)?.collect::<Result<Vec<_>, _>>())
    }

    /// Get the persisted progress of a stage.
    pub fn progress(&self, stage: StageId) -> Result<Option<BlockNumber>, DatabaseError> {
        self.query(|tx| tx.stage_progress(stage.as_str()))
    }

    /// Persist the progress of a stage.
    pub fn save_progress(
        &self,
        stage: StageId,
        progress: BlockNumber,
    ) -> Result<(), DatabaseError> {
        self.commit(|tx| tx.save_stage_progress(stage.as_str(), progress))
    }

    /// Check that there is no table entry above a given block number.
    pub fn ensure_no_entry_above<T, F>(
        &self,
        num: BlockNumber,
        mut selector: F,
    ) -> Result<(), DatabaseError>
    where
        T: Table,
        F: FnMut(T::Key) -> BlockNumber,
    {
        self.query(|tx| {
            let mut cursor = tx.cursor_read::<T>()?;
            if let Some((key, _)) = cursor.last()? {
                assert!(selector(key) <= num);
            }
            Ok(())
        })
    }

    /// Insert canonical hashes into [`tables::CanonicalHeaders`].
    pub fn insert_canonical_hashes<I>(&self, hashes: I) -> Result<(), DatabaseError>
    where
        I: IntoIterator<Item = (BlockNumber, BlockHash)>,
    {
        self.commit(|tx| {
            hashes.into_iter().try_for_each(|(number, hash)| {
                tx.put::<tables::CanonicalHeaders>(number, hash)
            })
        })
    }

    /// Insert ordered collection of [`SealedBlock`] into corresponding tables.
    ///
    /// Writes the canonical hash, the body indices and the transactions of every block. Global
    /// transaction numbers continue after the last stored transaction.
    pub fn insert_blocks<'a, I>(&self, blocks: I) -> Result<(), DatabaseError>
    where
        I: IntoIterator<Item = &'a SealedBlock>,
    {
        self.commit(|tx| {
            let mut next_tx_num = tx
                .cursor_read::<tables::Transactions>()?
                .last()?
                .map(|(number, _)| number + 1)
                .unwrap_or_default();

            for block in blocks {
                tx.put::<tables::CanonicalHeaders>(block.number(), block.hash())?;
                tx.put::<tables::BlockBodies>(
                    BlockNumHash::new(block.number(), block.hash()),
                    StoredBlockBody { start_tx_id: next_tx_num, tx_count: block.body.len() as u64 },
                )?;
                for transaction in &block.body {
                    tx.put::<tables::Transactions>(next_tx_num, transaction.clone())?;
                    next_tx_num += 1;
                }
            }
            Ok(())
        })
    }
}
