use crate::{Stage, StageDescriptor, StageError, StageId, SyncContext, TxnManager};
use stagedsync_config::BlockHashesConfig;
use stagedsync_db::{tables, Database, DbCursorRO, DbTx, DbTxMut, RawTable};
use stagedsync_etl::{Collector, LoadMode};
use stagedsync_primitives::{BlockHash, BlockNumber, HASH_LENGTH};
use tracing::*;

/// The block hashes stage.
///
/// Builds the reverse index of the canonical chain: for every canonical block number → hash
/// record above the stage progress, [`HeaderNumbers`][tables::HeaderNumbers] gets a hash → number
/// entry. The entries are sorted through an ETL collector before they are written, since hashes
/// arrive in random key order.
///
/// The stage runs after the bodies stage and must end exactly at its progress.
#[derive(Debug, Clone, Default)]
pub struct BlockHashesStage {
    config: BlockHashesConfig,
}

impl BlockHashesStage {
    /// Create a new block hashes stage.
    pub const fn new(config: BlockHashesConfig) -> Self {
        Self { config }
    }
}

impl<DB: Database> Stage<DB> for BlockHashesStage {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(StageId::BlockHashes, 2)
    }

    fn forward(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        let progress = ctx.get_progress(&**txn, StageId::BlockHashes)?;
        let bodies_progress = ctx.get_progress(&**txn, StageId::Bodies)?;
        let mut collector =
            Collector::<BlockHash, BlockNumber>::new(ctx.etl_dir()?, ctx.etl_file_size());

        info!(target: "sync::stages::block_hashes", from = progress + 1, to = bodies_progress, "Indexing canonical hashes");

        let mut last = progress;
        let mut cursor = txn.cursor_read::<RawTable<tables::CanonicalHeaders>>()?;
        for entry in cursor.walk(Some(progress + 1))? {
            let (number, raw_hash) = entry?;
            if number != last + 1 {
                return Err(StageError::BadChainSequence { expected: last + 1, got: number })
            }
            let len = raw_hash.raw_value().len();
            if len != HASH_LENGTH {
                return Err(StageError::BadBlockHash { block: number, len })
            }
            collector.insert(raw_hash.value()?, number)?;
            last = number;
        }

        if last != bodies_progress {
            return Err(StageError::BadChainSequence { expected: bodies_progress, got: last })
        }

        if !collector.is_empty() {
            // appending is only valid into an empty index
            let mode = if txn.entries::<tables::HeaderNumbers>()? == 0 {
                LoadMode::Append
            } else {
                LoadMode::Upsert
            };
            let loaded = collector.load::<tables::HeaderNumbers, _>(
                &**txn,
                mode,
                self.config.log_every_percent,
            )?;
            debug!(target: "sync::stages::block_hashes", loaded, ?mode, "Loaded hash index");
        }

        ctx.update_progress(&**txn, StageId::BlockHashes, last)?;
        txn.commit()?;

        info!(target: "sync::stages::block_hashes", progress = last, "Stage finished");
        Ok(())
    }

    fn unwind(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        let progress = ctx.get_progress(&**txn, StageId::BlockHashes)?;
        let Some(unwind_to) = ctx.needs_unwind(progress) else { return Ok(()) };
        info!(target: "sync::stages::block_hashes", progress, unwind_to, "Unwinding");

        let mut hashes = Vec::new();
        let mut expected = unwind_to + 1;
        let mut cursor = txn.cursor_read::<RawTable<tables::CanonicalHeaders>>()?;
        for entry in cursor.walk(Some(expected))? {
            let (number, raw_hash) = entry?;
            if number != expected {
                return Err(StageError::BadChainSequence { expected, got: number })
            }
            let len = raw_hash.raw_value().len();
            if len != HASH_LENGTH {
                return Err(StageError::BadBlockHash { block: number, len })
            }
            hashes.push((number, raw_hash.value()?));
            expected += 1;
        }

        for (number, hash) in hashes {
            if !txn.delete::<tables::HeaderNumbers>(hash, None)? {
                warn!(target: "sync::stages::block_hashes", block = number, %hash, "Missing hash index entry");
            }
        }

        ctx.update_progress(&**txn, StageId::BlockHashes, unwind_to)?;
        txn.commit()?;
        Ok(())
    }

    fn reset(&mut self, txn: &mut TxnManager<'_, DB>) -> Result<(), StageError> {
        txn.clear::<tables::HeaderNumbers>()?;
        Ok(())
    }
}
