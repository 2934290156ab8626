use super::TestStageDB;
use crate::{Stage, StageError, SyncContext, TxnManager};
use stagedsync_db::{DatabaseError, MemDatabase};
use stagedsync_primitives::BlockNumber;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub(crate) enum TestRunnerError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Internal(#[from] Box<dyn std::error::Error>),
}

/// Where a stage starts and how far the data it depends on reaches.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub(crate) struct ExecInput {
    /// The progress of the stage before the run.
    pub(crate) stage_progress: BlockNumber,
    /// The progress of the data the stage depends on.
    pub(crate) target: BlockNumber,
}

/// Stage unwind input.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub(crate) struct UnwindInput {
    /// The progress of the stage before the unwind.
    pub(crate) stage_progress: BlockNumber,
    /// The block to unwind to.
    pub(crate) unwind_to: BlockNumber,
}

/// A generic test runner for stages.
pub(crate) trait StageTestRunner {
    type S: Stage<Arc<MemDatabase>> + 'static;

    /// Return a reference to the database.
    fn db(&self) -> &TestStageDB;

    /// Return an instance of a Stage.
    fn stage(&self) -> Self::S;
}

pub(crate) trait ExecuteStageTestRunner: StageTestRunner {
    type Seed;

    /// Seed database for stage execution
    fn seed_execution(&mut self, input: ExecInput) -> Result<Self::Seed, TestRunnerError>;

    /// Validate stage execution
    fn validate_execution(
        &self,
        input: ExecInput,
        output: Option<BlockNumber>,
    ) -> Result<(), TestRunnerError>;

    /// Run [`Stage::forward`] in its own transaction and return the new stage progress.
    fn execute(&self, _input: ExecInput) -> Result<BlockNumber, StageError> {
        let (db, mut stage) = (self.db().factory(), self.stage());
        let mut ctx = SyncContext::default();
        let mut txn = TxnManager::new(&db)?;
        stage.forward(&mut txn, &mut ctx)?;
        txn.commit()?;
        Ok(ctx.get_progress(&*txn, stage.id())?)
    }
}

pub(crate) trait UnwindStageTestRunner: StageTestRunner {
    /// Validate the unwind
    fn validate_unwind(&self, input: UnwindInput) -> Result<(), TestRunnerError>;

    /// Run [`Stage::unwind`] in its own transaction and return the new stage progress.
    fn unwind(&self, input: UnwindInput) -> Result<BlockNumber, StageError> {
        let (db, mut stage) = (self.db().factory(), self.stage());
        let mut ctx = SyncContext::default();
        ctx.set_unwind(input.unwind_to);
        let mut txn = TxnManager::new(&db)?;
        stage.unwind(&mut txn, &mut ctx)?;
        txn.commit()?;
        Ok(ctx.get_progress(&*txn, stage.id())?)
    }
}
