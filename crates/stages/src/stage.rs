use crate::{context::SyncContext, error::StageError, id::StageId, txn::TxnManager};
use stagedsync_db::Database;
use tracing::warn;

/// Static description of a stage.
///
/// The ordinal defines the position of the stage in a forward cycle; unwinding runs the stages in
/// the exact reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    /// The unique ID of the stage.
    pub id: StageId,
    /// Position of the stage in a forward cycle. Must be positive and unique.
    pub ordinal: u32,
    /// Whether the stage implements [`Stage::prune`].
    pub has_pruning: bool,
    /// Disabled stages are skipped by the sync manager.
    pub disabled: bool,
}

impl StageDescriptor {
    /// Creates an enabled descriptor without pruning support.
    pub const fn new(id: StageId, ordinal: u32) -> Self {
        Self { id, ordinal, has_pruning: false, disabled: false }
    }

    /// Marks the stage as able to prune its data.
    pub const fn with_pruning(mut self) -> Self {
        self.has_pruning = true;
        self
    }

    /// Sets whether the stage is disabled.
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// A stage is a segmented part of the syncing process of the node.
///
/// Each stage takes care of a well-defined task, such as indexing block hashes or recovering
/// transaction senders, and persists its results to the database.
///
/// Stages must have a unique [ID][StageId] and ordinal, and implement a way to "roll forwards"
/// ([`Stage::forward`]) and a way to "roll back" ([`Stage::unwind`]).
///
/// Stages are executed serially by the [`SyncManager`](crate::SyncManager). They receive a
/// [`TxnManager`] holding the active write transaction and the shared [`SyncContext`], through
/// which they read and record their progress. A stage that fails must leave its writes
/// uncommitted; the caller decides whether to commit or roll back.
pub trait Stage<DB: Database>: Send + Sync {
    /// Get the static description of the stage.
    fn descriptor(&self) -> StageDescriptor;

    /// Get the ID of the stage.
    fn id(&self) -> StageId {
        self.descriptor().id
    }

    /// Advance the stage up to the data available from the stages it depends on.
    fn forward(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError>;

    /// Roll the stage back to the unwind height recorded in the context.
    ///
    /// Does nothing if the stage is not above that height.
    fn unwind(
        &mut self,
        txn: &mut TxnManager<'_, DB>,
        ctx: &mut SyncContext,
    ) -> Result<(), StageError>;

    /// Delete stage data older than the retention boundary.
    fn prune(
        &mut self,
        _txn: &mut TxnManager<'_, DB>,
        _ctx: &mut SyncContext,
    ) -> Result<(), StageError> {
        warn!(target: "sync::stages", stage = %self.id(), "Pruning is not implemented");
        Ok(())
    }

    /// Clear the data written by the stage so it can be rebuilt from scratch.
    fn reset(&mut self, _txn: &mut TxnManager<'_, DB>) -> Result<(), StageError> {
        Ok(())
    }
}

/// A boxed [`Stage`].
pub type BoxedStage<DB> = Box<dyn Stage<DB>>;
