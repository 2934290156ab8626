//! Running a single stage outside of a [`SyncManager`](crate::SyncManager).

use crate::{manager::guarded, Stage, StageError, SyncContext, TxnManager};
use stagedsync_db::Database;
use stagedsync_primitives::BlockNumber;
use tracing::info;

/// Runs `forward` of a single stage inside one write transaction.
///
/// If `reset` is set, the data of the stage is cleared and its progress set to zero first. The
/// transaction is committed only if the stage succeeds; commits the stage requests along the way
/// are deferred to the end.
pub fn run_stage_forward<DB, S>(
    db: &DB,
    stage: &mut S,
    ctx: &mut SyncContext,
    reset: bool,
) -> Result<(), StageError>
where
    DB: Database,
    S: Stage<DB> + ?Sized,
{
    let stage_id = stage.id();
    let mut txn = TxnManager::external(db)?;

    let result = guarded(|| {
        if reset {
            info!(target: "sync::stages", stage = %stage_id, "Resetting stage");
            stage.reset(&mut txn)?;
            ctx.update_progress(&*txn, stage_id, 0)?;
        }
        stage.forward(&mut txn, ctx)
    });
    finish(txn, ctx, result)
}

/// Unwinds a single stage to `target` inside one write transaction.
///
/// The transaction is committed only if the stage succeeds.
pub fn run_stage_unwind<DB, S>(
    db: &DB,
    stage: &mut S,
    ctx: &mut SyncContext,
    target: BlockNumber,
) -> Result<(), StageError>
where
    DB: Database,
    S: Stage<DB> + ?Sized,
{
    let mut txn = TxnManager::external(db)?;
    ctx.set_unwind(target);

    let result = guarded(|| stage.unwind(&mut txn, ctx));
    ctx.clear_unwind();
    finish(txn, ctx, result)
}

fn finish<DB: Database>(
    txn: TxnManager<'_, DB>,
    ctx: &mut SyncContext,
    result: Result<(), StageError>,
) -> Result<(), StageError> {
    match result {
        Ok(()) => {
            txn.finish()?;
            Ok(())
        }
        Err(error) => {
            // the writes of the stage are dropped together with the transaction
            ctx.invalidate_progress();
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        stages::{BlockHashesStage, SendersStage},
        test_utils::TestStageDB,
        StageId,
    };
    use assert_matches::assert_matches;
    use stagedsync_db::{tables, DbTxMut};
    use stagedsync_primitives::{test_utils::generators::random_block_range, B256};

    fn seeded_db(blocks: u64) -> TestStageDB {
        let db = TestStageDB::default();
        let blocks = random_block_range(1..=blocks, B256::ZERO, 2);
        db.insert_blocks(blocks.iter()).unwrap();
        db.save_progress(StageId::Bodies, blocks.len() as u64).unwrap();
        db
    }

    #[test]
    fn forward_commits_on_success() {
        let db = seeded_db(6);
        let factory = db.factory();

        let mut stage = BlockHashesStage::default();
        run_stage_forward(&factory, &mut stage, &mut SyncContext::default(), false).unwrap();

        assert_eq!(db.progress(StageId::BlockHashes).unwrap(), Some(6));
        assert_eq!(db.table::<tables::HeaderNumbers>().unwrap().len(), 6);
    }

    #[test]
    fn forward_with_reset_rebuilds_from_zero() {
        let db = seeded_db(4);
        let factory = db.factory();
        let mut stage = BlockHashesStage::default();
        run_stage_forward(&factory, &mut stage, &mut SyncContext::default(), false).unwrap();

        // a stale entry only a rebuild removes
        db.commit(|tx| tx.put::<tables::HeaderNumbers>(B256::repeat_byte(0xee), 99)).unwrap();

        run_stage_forward(&factory, &mut stage, &mut SyncContext::default(), true).unwrap();
        let index = db.table::<tables::HeaderNumbers>().unwrap();
        assert_eq!(index.len(), 4);
        assert!(index.iter().all(|(_, number)| (1..=4).contains(number)));
        assert_eq!(db.progress(StageId::BlockHashes).unwrap(), Some(4));
    }

    #[test]
    fn failure_discards_all_writes() {
        let db = seeded_db(3);
        let factory = db.factory();
        // bodies claim more blocks than the canonical chain has
        db.save_progress(StageId::Bodies, 5).unwrap();
        db.commit(|tx| tx.put::<tables::HeaderNumbers>(B256::repeat_byte(0xee), 99)).unwrap();

        let mut ctx = SyncContext::default();
        let result = run_stage_forward(&factory, &mut BlockHashesStage::default(), &mut ctx, true);
        assert_matches!(result, Err(StageError::BadChainSequence { expected: 5, got: 3 }));

        // the reset was rolled back as well
        assert_eq!(
            db.table::<tables::HeaderNumbers>().unwrap(),
            vec![(B256::repeat_byte(0xee), 99)]
        );
        assert_eq!(db.progress(StageId::BlockHashes).unwrap(), None);
    }

    #[test]
    fn unwind_single_stage() {
        let db = seeded_db(8);
        let factory = db.factory();
        let mut stage = SendersStage::default();
        let mut ctx = SyncContext::default();
        run_stage_forward(&factory, &mut stage, &mut ctx, false).unwrap();

        run_stage_unwind(&factory, &mut stage, &mut ctx, 3).unwrap();

        assert_eq!(ctx.unwind_height(), None);
        assert_eq!(db.progress(StageId::Senders).unwrap(), Some(3));
        db.ensure_no_entry_above::<tables::TxSenders, _>(3, |key| key.number).unwrap();
    }

    #[test]
    fn unwind_above_progress_keeps_progress() {
        let db = seeded_db(3);
        let factory = db.factory();
        let mut ctx = SyncContext::default();
        let mut hashes = BlockHashesStage::default();
        let mut senders = SendersStage::default();
        run_stage_forward(&factory, &mut hashes, &mut ctx, false).unwrap();
        run_stage_forward(&factory, &mut senders, &mut ctx, false).unwrap();
        let index = db.table::<tables::HeaderNumbers>().unwrap();

        run_stage_unwind(&factory, &mut hashes, &mut ctx, 10).unwrap();
        run_stage_unwind(&factory, &mut senders, &mut ctx, 10).unwrap();

        assert_eq!(db.progress(StageId::BlockHashes).unwrap(), Some(3));
        assert_eq!(db.progress(StageId::Senders).unwrap(), Some(3));
        assert_eq!(db.table::<tables::HeaderNumbers>().unwrap(), index);

        // both stages are still consistent with bodies
        run_stage_forward(&factory, &mut hashes, &mut ctx, false).unwrap();
        run_stage_forward(&factory, &mut senders, &mut ctx, false).unwrap();
        assert_eq!(db.progress(StageId::BlockHashes).unwrap(), Some(3));
        assert_eq!(db.progress(StageId::Senders).unwrap(), Some(3));
    }
}
