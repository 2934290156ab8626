use crate::{
    error::{StageError, SyncError},
    stage::BoxedStage,
    StageId, SyncContext, TxnManager,
};
use stagedsync_db::{Database, DbTx};
use stagedsync_primitives::BlockNumber;
use std::{
    collections::BTreeMap,
    panic::{catch_unwind, AssertUnwindSafe},
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::*;

mod builder;
mod event;

pub use builder::SyncManagerBuilder;
pub(crate) use event::EventListeners;
pub use event::SyncEvent;

/// A staged sync manager.
///
/// The manager executes queued [stages][crate::Stage] serially. An external component determines
/// the tip of the chain and the manager then executes each stage in order from the current local
/// chain tip and the external chain tip. When a stage is executed, it will run until it reaches
/// the chain tip.
///
/// After the entire set of stages has run forward, the stages that can prune are pruned, and the
/// manager starts over, until a cycle makes no progress on any stage.
///
/// ```mermaid
/// graph TB
///   Start[Start]
///   Done[Done]
///   Error[Error]
///   subgraph Unwind
///     StartUnwind(Unwind in reverse order of execution)
///     UnwindStage(Unwind stage)
///     NextStageToUnwind(Next stage)
///   end
///   subgraph Single loop
///     RunLoop(Run loop)
///     NextStage(Next stage)
///     LoopDone(Loop done)
///     subgraph Stage Execution
///       Execute(Execute stage)
///     end
///   end
///   Start --> RunLoop --> NextStage
///   NextStage --> |No stages left| LoopDone
///   NextStage --> |Next stage| Execute
///   Execute --> |Unwind requested| StartUnwind
///   Execute --> |Error| Error
///   Execute --> |Ok| NextStage
///   LoopDone --> |Made progress| RunLoop
///   LoopDone --> |No progress| Done
///   StartUnwind --> NextStageToUnwind
///   NextStageToUnwind --> |Next stage| UnwindStage
///   NextStageToUnwind --> |No stages left| RunLoop
///   UnwindStage --> |Error| Error
///   UnwindStage --> |Unwound| NextStageToUnwind
/// ```
///
/// # Unwinding
///
/// An unwind is requested either through [`SyncManager::unwind`] or by a stage recording an
/// unwind height in the [`SyncContext`]. A pending unwind stops the forward pass; the next cycle
/// unwinds every stage above the height, in reverse ordinal order.
///
/// # Failures
///
/// The first stage that fails halts the run. Its uncommitted writes are dropped and the error is
/// returned to the caller; no further stage runs in that cycle. Panics inside a stage are caught
/// and reported as [`StageError::Unexpected`].
pub struct SyncManager<DB: Database> {
    /// The database
    db: DB,
    /// All configured stages keyed by their ordinal.
    stages: BTreeMap<u32, BoxedStage<DB>>,
    /// State shared by the stages during the run.
    ctx: SyncContext,
    listeners: EventListeners<SyncEvent>,
}

impl<DB: Database> SyncManager<DB> {
    /// Construct a sync manager using a [`SyncManagerBuilder`].
    pub fn builder() -> SyncManagerBuilder<DB> {
        SyncManagerBuilder::default()
    }

    /// Listen for events on the sync manager.
    pub fn events(&mut self) -> UnboundedReceiver<SyncEvent> {
        self.listeners.new_listener()
    }

    /// The shared context of the run.
    pub const fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Mutable access to the shared context of the run.
    pub fn context_mut(&mut self) -> &mut SyncContext {
        &mut self.ctx
    }

    /// The database the stages work on.
    pub const fn db(&self) -> &DB {
        &self.db
    }

    /// The IDs of the configured stages, in forward order.
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.stages.values().map(|stage| stage.id()).collect()
    }

    /// Clears the context and loads the persisted progress of every stage into it.
    pub(crate) fn prime(&mut self) -> Result<(), SyncError> {
        self.ctx.clear();
        let tx = self.db.tx()?;
        for stage in self.stages.values() {
            let stage_id = stage.id();
            let progress = self.ctx.get_progress(&tx, stage_id)?;
            let prune_progress = self.ctx.get_prune_progress(&tx, stage_id)?;
            debug!(target: "sync::manager", stage = %stage_id, progress, prune_progress, "Loaded stage progress");
        }
        tx.commit()?;
        Ok(())
    }

    /// Run cycles until a cycle makes no progress on any stage.
    pub fn run(&mut self) -> Result<(), SyncError> {
        info!(target: "sync::manager", stages = ?self.stage_ids(), "Starting sync");
        while !self.ctx.is_done() {
            self.run_cycle()?;
        }
        info!(target: "sync::manager", "Sync done");
        Ok(())
    }

    /// Unwind every stage above `target` down to `target`.
    pub fn unwind(&mut self, target: BlockNumber) -> Result<(), SyncError> {
        self.ctx.set_unwind(target);
        self.run_cycle()
    }

    /// Run a single cycle.
    ///
    /// If an unwind is pending, the cycle unwinds the stages in reverse order. Otherwise every
    /// stage runs forward in order, followed by pruning. A forward cycle that makes no progress
    /// marks the run as done.
    pub fn run_cycle(&mut self) -> Result<(), SyncError> {
        let Self { db, stages, ctx, listeners } = self;
        let mut txn = TxnManager::new(&*db)?;

        let result = match ctx.unwind_height() {
            Some(target) => Self::unwind_stages(&mut txn, stages, ctx, listeners, target),
            None => Self::forward_stages(&mut txn, stages, ctx, listeners),
        };
        ctx.set_first_cycle(false);

        if result.is_err() {
            // cached progress may reflect writes that were never committed
            ctx.invalidate_progress();
        }
        result
    }

    fn forward_stages(
        txn: &mut TxnManager<'_, DB>,
        stages: &mut BTreeMap<u32, BoxedStage<DB>>,
        ctx: &mut SyncContext,
        listeners: &mut EventListeners<SyncEvent>,
    ) -> Result<(), SyncError> {
        let mut made_progress = false;

        for stage in stages.values_mut() {
            let descriptor = stage.descriptor();
            let stage_id = descriptor.id;
            if descriptor.disabled {
                trace!(target: "sync::manager", stage = %stage_id, "Stage disabled");
                listeners.notify(SyncEvent::Skipped { stage_id });
                continue
            }

            let progress = ctx.get_progress(&**txn, stage_id)?;
            listeners.notify(SyncEvent::Running { stage_id, progress });
            debug!(target: "sync::manager", stage = %stage_id, progress, "Running stage");

            if let Err(error) = guarded(|| stage.forward(txn, ctx)) {
                return Err(Self::stage_failed(listeners, stage_id, error))
            }
            txn.commit()?;

            let new_progress = ctx.get_progress(&**txn, stage_id)?;
            made_progress |= new_progress != progress;
            info!(target: "sync::manager", stage = %stage_id, progress = new_progress, "Stage ran");
            listeners.notify(SyncEvent::Ran { stage_id, progress: new_progress });

            if let Some(unwind_to) = ctx.unwind_height() {
                warn!(target: "sync::manager", stage = %stage_id, unwind_to, "Stage requested an unwind");
                return Ok(())
            }
        }

        for stage in stages.values_mut() {
            let descriptor = stage.descriptor();
            if descriptor.disabled || !descriptor.has_pruning {
                continue
            }
            let stage_id = descriptor.id;

            if let Err(error) = guarded(|| stage.prune(txn, ctx)) {
                return Err(Self::stage_failed(listeners, stage_id, error))
            }
            txn.commit()?;

            let prune_progress = ctx.get_prune_progress(&**txn, stage_id)?;
            debug!(target: "sync::manager", stage = %stage_id, prune_progress, "Stage pruned");
            listeners.notify(SyncEvent::Pruned { stage_id, prune_progress });
        }

        if !made_progress {
            ctx.set_done(true);
        }
        Ok(())
    }

    fn unwind_stages(
        txn: &mut TxnManager<'_, DB>,
        stages: &mut BTreeMap<u32, BoxedStage<DB>>,
        ctx: &mut SyncContext,
        listeners: &mut EventListeners<SyncEvent>,
        target: BlockNumber,
    ) -> Result<(), SyncError> {
        let span = info_span!("Unwinding", unwind_to = target);
        let _enter = span.enter();

        for stage in stages.values_mut().rev() {
            let descriptor = stage.descriptor();
            let stage_id = descriptor.id;
            if descriptor.disabled {
                listeners.notify(SyncEvent::Skipped { stage_id });
                continue
            }

            let progress = ctx.get_progress(&**txn, stage_id)?;
            if ctx.needs_unwind(progress).is_none() {
                trace!(target: "sync::manager", stage = %stage_id, progress, "Stage already at or below unwind target");
                continue
            }

            info!(target: "sync::manager", stage = %stage_id, progress, "Unwinding stage");
            listeners.notify(SyncEvent::Unwinding { stage_id, progress, target });

            if let Err(error) = guarded(|| stage.unwind(txn, ctx)) {
                return Err(Self::stage_failed(listeners, stage_id, error))
            }

            let new_progress = ctx.get_progress(&**txn, stage_id)?;
            if new_progress > target {
                let error = StageError::InvalidProgress {
                    stage: stage_id,
                    progress: new_progress,
                    upstream: target,
                };
                return Err(Self::stage_failed(listeners, stage_id, error))
            }
            txn.commit()?;

            info!(target: "sync::manager", stage = %stage_id, progress = new_progress, "Stage unwound");
            listeners.notify(SyncEvent::Unwound { stage_id, progress: new_progress });
        }

        ctx.clear_unwind();
        // the stages have to be driven forward again
        ctx.set_done(false);
        Ok(())
    }

    fn stage_failed(
        listeners: &mut EventListeners<SyncEvent>,
        stage_id: StageId,
        error: StageError,
    ) -> SyncError {
        error!(target: "sync::manager", stage = %stage_id, %error, "Stage encountered an error");
        listeners.notify(SyncEvent::Error { stage_id });
        SyncError::Stage { stage: stage_id, error }
    }
}

/// Runs a stage operation, mapping a panic to [`StageError::Unexpected`].
pub(crate) fn guarded(f: impl FnOnce() -> Result<(), StageError>) -> Result<(), StageError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(StageError::from_panic(payload)))
}

impl<DB: Database> std::fmt::Debug for SyncManager<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("stages", &self.stage_ids())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{TestStage, TestStageDB},
        Stage, StageDescriptor,
    };
    use assert_matches::assert_matches;
    use tokio::sync::mpsc::error::TryRecvError;

    fn drain(events: &mut UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut collected = Vec::new();
        loop {
            match events.try_recv() {
                Ok(event) => collected.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return collected,
            }
        }
    }

    const A: StageId = StageId::Other("A");
    const B: StageId = StageId::Other("B");
    const C: StageId = StageId::Other("C");

    /// Runs a simple set of stages until no stage makes progress.
    #[test]
    fn run_forward_in_ordinal_order() {
        let db = TestStageDB::default();
        let mut manager = SyncManager::builder()
            // registered out of order on purpose
            .add_stage(TestStage::new(B, 2).add_exec(Ok(10)))
            .add_stage(TestStage::new(A, 1).add_exec(Ok(20)))
            .build(db.factory(), SyncContext::default())
            .unwrap();
        let mut events = manager.events();

        manager.run().unwrap();

        assert_eq!(
            drain(&mut events),
            vec![
                SyncEvent::Running { stage_id: A, progress: 0 },
                SyncEvent::Ran { stage_id: A, progress: 20 },
                SyncEvent::Running { stage_id: B, progress: 0 },
                SyncEvent::Ran { stage_id: B, progress: 10 },
                // second cycle makes no progress
                SyncEvent::Running { stage_id: A, progress: 20 },
                SyncEvent::Ran { stage_id: A, progress: 20 },
                SyncEvent::Running { stage_id: B, progress: 10 },
                SyncEvent::Ran { stage_id: B, progress: 10 },
            ]
        );
        assert!(manager.context().is_done());
        assert!(!manager.context().is_first_cycle());
        assert_eq!(db.progress(A).unwrap(), Some(20));
        assert_eq!(db.progress(B).unwrap(), Some(10));
    }

    /// Unwinds a simple set of stages in reverse order.
    #[test]
    fn unwind_in_reverse_order() {
        let db = TestStageDB::default();
        let mut manager = SyncManager::builder()
            .add_stage(TestStage::new(A, 1).add_exec(Ok(100)))
            .add_stage(TestStage::new(B, 2).add_exec(Ok(10)))
            .add_stage(TestStage::new(C, 3).add_exec(Ok(20)))
            .add_stage(TestStage::new(StageId::Finish, 4))
            .build(db.factory(), SyncContext::default())
            .unwrap();
        manager.run().unwrap();
        let mut events = manager.events();

        manager.unwind(1).unwrap();

        // the finish stage never moved and is left alone
        assert_eq!(
            drain(&mut events),
            vec![
                SyncEvent::Unwinding { stage_id: C, progress: 20, target: 1 },
                SyncEvent::Unwound { stage_id: C, progress: 1 },
                SyncEvent::Unwinding { stage_id: B, progress: 10, target: 1 },
                SyncEvent::Unwound { stage_id: B, progress: 1 },
                SyncEvent::Unwinding { stage_id: A, progress: 100, target: 1 },
                SyncEvent::Unwound { stage_id: A, progress: 1 },
            ]
        );
        assert_eq!(manager.context().unwind_height(), None);
        assert!(!manager.context().is_done());
        for stage in [A, B, C] {
            assert_eq!(db.progress(stage).unwrap(), Some(1));
        }
    }

    /// Stages at or below the unwind target are not unwound.
    #[test]
    fn unwind_skips_stages_below_target() {
        let db = TestStageDB::default();
        let mut manager = SyncManager::builder()
            .add_stage(TestStage::new(A, 1).add_exec(Ok(100)))
            .add_stage(TestStage::new(B, 2).add_exec(Ok(50)))
            .build(db.factory(), SyncContext::default())
            .unwrap();
        manager.run().unwrap();
        let mut events = manager.events();

        manager.unwind(50).unwrap();

        assert_eq!(
            drain(&mut events),
            vec![
                SyncEvent::Unwinding { stage_id: A, progress: 100, target: 50 },
                SyncEvent::Unwound { stage_id: A, progress: 50 },
            ]
        );
    }

    /// The first failing stage halts the run and its writes are rolled back.
    #[test]
    fn failing_stage_halts_run() {
        let db = TestStageDB::default();
        let mut manager = SyncManager::builder()
            .add_stage(TestStage::new(A, 1).add_exec(Ok(10)))
            .add_stage(
                TestStage::new(B, 2)
                    .add_exec(Err(StageError::BadChainSequence { expected: 3, got: 4 })),
            )
            .add_stage(TestStage::new(C, 3).add_exec(Ok(10)))
            .build(db.factory(), SyncContext::default())
            .unwrap();
        let mut events = manager.events();

        let result = manager.run();
        assert_matches!(
            result,
            Err(SyncError::Stage { stage, error: StageError::BadChainSequence { expected: 3, got: 4 } })
                if stage == B
        );

        assert_eq!(
            drain(&mut events),
            vec![
                SyncEvent::Running { stage_id: A, progress: 0 },
                SyncEvent::Ran { stage_id: A, progress: 10 },
                SyncEvent::Running { stage_id: B, progress: 0 },
                SyncEvent::Error { stage_id: B },
            ]
        );
        assert_eq!(db.progress(A).unwrap(), Some(10));
        assert_eq!(db.progress(B).unwrap(), None);
        assert_eq!(db.progress(C).unwrap(), None);
    }

    /// A failing stage leaves no partial writes behind.
    #[test]
    fn failing_stage_writes_are_dropped() {
        let db = TestStageDB::default();
        // records progress before failing
        let stage = TestStage::new(A, 1).add_exec(Ok(5)).add_exec_after_progress(
            7,
            Err(StageError::Unexpected("late failure".to_string())),
        );
        let mut manager = SyncManager::builder()
            .add_stage(stage)
            .build(db.factory(), SyncContext::default())
            .unwrap();

        assert_matches!(manager.run(), Err(SyncError::Stage { .. }));
        assert_eq!(db.progress(A).unwrap(), Some(5));

        // the cached progress was dropped together with the writes
        let tx = db.factory().tx().unwrap();
        assert_eq!(manager.context_mut().get_progress(&tx, A).unwrap(), 5);
    }

    #[test]
    fn disabled_stages_are_skipped() {
        let db = TestStageDB::default();
        let mut manager = SyncManager::builder()
            .add_stage(TestStage::new(A, 1).add_exec(Ok(10)).with_disabled(true))
            .add_stage(TestStage::new(B, 2).add_exec(Ok(10)))
            .build(db.factory(), SyncContext::default())
            .unwrap();
        let mut events = manager.events();

        manager.run_cycle().unwrap();

        assert_eq!(
            drain(&mut events),
            vec![
                SyncEvent::Skipped { stage_id: A },
                SyncEvent::Running { stage_id: B, progress: 0 },
                SyncEvent::Ran { stage_id: B, progress: 10 },
            ]
        );
        assert_eq!(db.progress(A).unwrap(), None);
    }

    #[test]
    fn pruning_stages_are_pruned_after_forward_pass() {
        let db = TestStageDB::default();
        let mut manager = SyncManager::builder()
            .add_stage(TestStage::new(A, 1).add_exec(Ok(10)).with_pruning())
            .add_stage(TestStage::new(B, 2).add_exec(Ok(10)))
            .build(db.factory(), SyncContext::default())
            .unwrap();
        let mut events = manager.events();

        manager.run_cycle().unwrap();

        assert_eq!(
            drain(&mut events).last(),
            Some(&SyncEvent::Pruned { stage_id: A, prune_progress: 10 })
        );
        let prune_progress =
            db.query(|tx| tx.get::<stagedsync_db::SyncStagePrune>(A.to_string())).unwrap();
        assert_eq!(prune_progress, Some(10));
    }

    #[test]
    fn panicking_stage_is_classified() {
        #[derive(Debug)]
        struct PanickingStage;

        impl<DB: Database> Stage<DB> for PanickingStage {
            fn descriptor(&self) -> StageDescriptor {
                StageDescriptor::new(A, 1)
            }

            fn forward(
                &mut self,
                _: &mut TxnManager<'_, DB>,
                _: &mut SyncContext,
            ) -> Result<(), StageError> {
                panic!("stage blew up")
            }

            fn unwind(
                &mut self,
                _: &mut TxnManager<'_, DB>,
                _: &mut SyncContext,
            ) -> Result<(), StageError> {
                Ok(())
            }
        }

        let db = TestStageDB::default();
        let mut manager = SyncManager::builder()
            .add_stage(PanickingStage)
            .build(db.factory(), SyncContext::default())
            .unwrap();

        assert_matches!(
            manager.run(),
            Err(SyncError::Stage { error: StageError::Unexpected(message), .. })
                if message == "stage blew up"
        );
        // the write transaction was released
        assert!(db.factory().tx_mut().is_ok());
    }

    #[test]
    fn stage_requested_unwind_stops_forward_pass() {
        #[derive(Debug)]
        struct BadBlockStage;

        impl<DB: Database> Stage<DB> for BadBlockStage {
            fn descriptor(&self) -> StageDescriptor {
                StageDescriptor::new(B, 2)
            }

            fn forward(
                &mut self,
                _: &mut TxnManager<'_, DB>,
                ctx: &mut SyncContext,
            ) -> Result<(), StageError> {
                ctx.set_unwind(4);
                Ok(())
            }

            fn unwind(
                &mut self,
                _: &mut TxnManager<'_, DB>,
                _: &mut SyncContext,
            ) -> Result<(), StageError> {
                Ok(())
            }
        }

        let db = TestStageDB::default();
        let mut manager = SyncManager::builder()
            .add_stage(TestStage::new(A, 1).add_exec(Ok(10)))
            .add_stage(BadBlockStage)
            .add_stage(TestStage::new(C, 3).add_exec(Ok(10)))
            .build(db.factory(), SyncContext::default())
            .unwrap();
        let mut events = manager.events();

        manager.run_cycle().unwrap();
        assert_eq!(manager.context().unwind_height(), Some(4));
        assert!(!manager.context().is_done());

        manager.run_cycle().unwrap();
        assert_eq!(manager.context().unwind_height(), None);

        assert_eq!(
            drain(&mut events),
            vec![
                SyncEvent::Running { stage_id: A, progress: 0 },
                SyncEvent::Ran { stage_id: A, progress: 10 },
                SyncEvent::Running { stage_id: B, progress: 0 },
                SyncEvent::Ran { stage_id: B, progress: 0 },
                SyncEvent::Unwinding { stage_id: A, progress: 10, target: 4 },
                SyncEvent::Unwound { stage_id: A, progress: 4 },
            ]
        );
        assert_eq!(db.progress(A).unwrap(), Some(4));
        assert_eq!(db.progress(C).unwrap(), None);
    }

    #[test]
    fn build_primes_progress_from_store() {
        let db = TestStageDB::default();
        db.save_progress(A, 42).unwrap();

        let mut manager = SyncManager::builder()
            .add_stage(TestStage::new(A, 1))
            .build(db.factory(), SyncContext::default())
            .unwrap();
        let mut events = manager.events();
        manager.run().unwrap();

        assert_eq!(
            drain(&mut events),
            vec![
                SyncEvent::Running { stage_id: A, progress: 42 },
                SyncEvent::Ran { stage_id: A, progress: 42 },
            ]
        );
    }

    #[test]
    fn build_rejects_invalid_stage_sets() {
        let db = TestStageDB::default();

        let result = SyncManager::builder()
            .add_stage(TestStage::new(A, 0))
            .build(db.factory(), SyncContext::default());
        assert_matches!(result, Err(SyncError::InvalidStageSet(_)));

        let result = SyncManager::builder()
            .add_stage(TestStage::new(A, 1))
            .add_stage(TestStage::new(B, 1))
            .build(db.factory(), SyncContext::default());
        assert_matches!(result, Err(SyncError::InvalidStageSet(_)));

        let result = SyncManager::builder()
            .add_stage(TestStage::new(A, 1))
            .add_stage(TestStage::new(A, 2))
            .build(db.factory(), SyncContext::default());
        assert_matches!(result, Err(SyncError::InvalidStageSet(_)));
    }
}
