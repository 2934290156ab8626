use crate::{
    recovery::{
        RecoveryConfig, RecoveryFarm, RecoveryOutcome, Secp256k1Recoverer, SenderRecoverer,
        StopHandle,
    },
    Stage, StageDescriptor, StageError, StageId, SyncContext, TxnManager,
};
use stagedsync_db::{
    tables::{self, models::BlockNumIndex},
    Database, DatabaseError, DbCursorRO, DbTx, DbTxMut,
};
use stagedsync_primitives::{BlockNumber, PruneSegment, MINIMUM_PRUNING_DISTANCE};
use std::{ops::RangeBounds, sync::Arc};
use tracing::*;

/// The senders stage recovers the signer of every canonical transaction and stores it in
/// [`TxSenders`][tables::TxSenders], keyed by block number and position in the block.
///
/// Recovery runs on a [`RecoveryFarm`]. A stopped run keeps the senders of the blocks that were
/// fully written and records them as progress before returning [`StageError::Aborted`].
#[derive(Debug)]
pub struct SendersStage<R = Secp256k1Recoverer> {
    config: RecoveryConfig,
    recoverer: Arc<R>,
    stop: StopHandle,
}

impl Default for SendersStage {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

impl SendersStage {
    /// Create a new senders stage recovering secp256k1 signatures.
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config, recoverer: Arc::new(Secp256k1Recoverer), stop: StopHandle::default() }
    }
}

impl<R> SendersStage<R> {
    /// Use a different signature recoverer.
    pub fn with_recoverer<T: SenderRecoverer>(self, recoverer: Arc<T>) -> SendersStage<T> {
        SendersStage { config: self.config, recoverer, stop: self.stop }
    }

    /// Share a stop handle with the caller.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Returns the handle that cancels a running recovery.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl<DB: Database, R: SenderRecoverer> Stage<DB> for SendersStage<R> {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(StageId::Senders, 4).with_pruning()
    }

    fn forward(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        let progress = ctx.get_progress(&**txn, StageId::Senders)?;
        let bodies_progress = ctx.get_progress(&**txn, StageId::Bodies)?;
        if progress > bodies_progress {
            return Err(StageError::InvalidProgress {
                stage: StageId::Senders,
                progress,
                upstream: bodies_progress,
            })
        }

        // a stopped run may have written part of the block after its progress
        let residue = delete_senders(&**txn, BlockNumIndex::block_start(progress + 1)..)?;
        if residue > 0 {
            debug!(target: "sync::stages::senders", residue, progress, "Removed senders above progress");
        }

        if progress == bodies_progress {
            info!(target: "sync::stages::senders", progress, "Target block already reached");
            txn.commit()?;
            return Ok(())
        }

        let farm = RecoveryFarm::new(self.config, self.recoverer.clone(), self.stop.clone());
        match farm.run(&**txn, progress + 1..=bodies_progress)? {
            RecoveryOutcome::Completed(stats) => {
                ctx.update_progress(&**txn, StageId::Senders, bodies_progress)?;
                txn.commit()?;
                info!(target: "sync::stages::senders", progress = bodies_progress, transactions = stats.transactions, "Stage finished");
                Ok(())
            }
            RecoveryOutcome::Aborted(stats) => {
                ctx.update_progress(&**txn, StageId::Senders, stats.highest_complete_block)?;
                txn.commit()?;
                Err(StageError::Aborted)
            }
        }
    }

    fn unwind(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        let progress = ctx.get_progress(&**txn, StageId::Senders)?;
        let Some(unwind_to) = ctx.needs_unwind(progress) else { return Ok(()) };
        info!(target: "sync::stages::senders", progress, unwind_to, "Unwinding");

        delete_senders(&**txn, BlockNumIndex::block_start(unwind_to + 1)..)?;
        ctx.update_progress(&**txn, StageId::Senders, unwind_to)?;
        txn.commit()?;
        Ok(())
    }

    fn prune(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        let Some(mode) = ctx.prune_modes().senders else { return Ok(()) };
        let progress = ctx.get_progress(&**txn, StageId::Senders)?;
        let target = mode
            .prune_target_block(progress, MINIMUM_PRUNING_DISTANCE, PruneSegment::SenderRecovery)
            .map_err(|error| StageError::Unexpected(error.to_string()))?;
        let Some((prune_to, _)) = target else { return Ok(()) };

        let pruned = delete_senders(&**txn, ..=BlockNumIndex::block_end(prune_to))?;
        let prune_progress = ctx.get_prune_progress(&**txn, StageId::Senders)?.max(prune_to);
        ctx.update_prune_progress(&**txn, StageId::Senders, prune_progress)?;
        txn.commit()?;

        debug!(target: "sync::stages::senders", ?mode, prune_to, pruned, "Pruned senders");
        Ok(())
    }

    fn reset(&mut self, txn: &mut TxnManager<'_, DB>) -> Result<(), StageError> {
        txn.clear::<tables::TxSenders>()?;
        Ok(())
    }
}

/// Deletes the senders in the key range, returning how many were removed.
fn delete_senders<TX: DbTx + DbTxMut>(
    tx: &TX,
    range: impl RangeBounds<BlockNumIndex>,
) -> Result<usize, DatabaseError> {
    let keys = tx
        .cursor_read::<tables::TxSenders>()?
        .walk_range(range)?
        .map(|entry| entry.map(|(key, _)| key))
        .collect::<Result<Vec<_>, _>>()?;
    for key in &keys {
        tx.delete::<tables::TxSenders>(*key, None)?;
    }
    Ok(keys.len())
}
