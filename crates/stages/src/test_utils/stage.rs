use crate::{Stage, StageDescriptor, StageError, StageId, SyncContext, TxnManager};
use stagedsync_db::Database;
use stagedsync_primitives::BlockNumber;
use std::collections::VecDeque;

/// A scripted forward step: the progress to record, then the result to return.
#[derive(Debug)]
struct ExecStep {
    progress: Option<BlockNumber>,
    result: Result<(), StageError>,
}

/// A test stage that can be used for testing.
///
/// This can be used to mock expected outcomes of [`Stage::forward`] and [`Stage::unwind`]. Once
/// the scripted outcomes are used up, `forward` keeps the progress as is and `unwind` moves the
/// progress to the unwind height.
#[derive(Debug)]
pub struct TestStage {
    descriptor: StageDescriptor,
    exec_outputs: VecDeque<ExecStep>,
    unwind_outputs: VecDeque<Result<(), StageError>>,
}

impl TestStage {
    pub const fn new(id: StageId, ordinal: u32) -> Self {
        Self {
            descriptor: StageDescriptor::new(id, ordinal),
            exec_outputs: VecDeque::new(),
            unwind_outputs: VecDeque::new(),
        }
    }

    pub fn with_pruning(mut self) -> Self {
        self.descriptor = self.descriptor.with_pruning();
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.descriptor = self.descriptor.with_disabled(disabled);
        self
    }

    /// Queue a forward outcome: `Ok(progress)` records the progress, `Err` fails the stage.
    pub fn add_exec(mut self, output: Result<BlockNumber, StageError>) -> Self {
        self.exec_outputs.push_back(match output {
            Ok(progress) => ExecStep { progress: Some(progress), result: Ok(()) },
            Err(error) => ExecStep { progress: None, result: Err(error) },
        });
        self
    }

    /// Queue a forward outcome that records `progress` before returning `result`.
    pub fn add_exec_after_progress(
        mut self,
        progress: BlockNumber,
        result: Result<(), StageError>,
    ) -> Self {
        self.exec_outputs.push_back(ExecStep { progress: Some(progress), result });
        self
    }

    /// Queue an unwind outcome. A successful unwind moves the progress to the unwind height.
    pub fn add_unwind(mut self, output: Result<(), StageError>) -> Self {
        self.unwind_outputs.push_back(output);
        self
    }
}

impl<DB: Database> Stage<DB> for TestStage {
    fn descriptor(&self) -> StageDescriptor {
        self.descriptor
    }

    fn forward(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        let Some(step) = self.exec_outputs.pop_front() else { return Ok(()) };
        if let Some(progress) = step.progress {
            ctx.update_progress(&**txn, self.descriptor.id, progress)?;
        }
        step.result
    }

    fn unwind(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        self.unwind_outputs.pop_front().unwrap_or(Ok(()))?;
        let progress = ctx.get_progress(&**txn, self.descriptor.id)?;
        if let Some(target) = ctx.needs_unwind(progress) {
            ctx.update_progress(&**txn, self.descriptor.id, target)?;
        }
        Ok(())
    }

    fn prune(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        let progress = ctx.get_progress(&**txn, self.descriptor.id)?;
        ctx.update_prune_progress(&**txn, self.descriptor.id, progress)?;
        Ok(())
    }
}
