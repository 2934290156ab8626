use crate::{
    error::SyncError, sets::StageSet, stage::BoxedStage, Stage, StageId, SyncContext, SyncManager,
};
use stagedsync_db::Database;
use std::collections::{BTreeMap, HashSet};

/// Builds a [`SyncManager`].
#[must_use = "call `build` to construct the sync manager"]
pub struct SyncManagerBuilder<DB>
where
    DB: Database,
{
    /// All configured stages, ordered by ordinal once built.
    stages: Vec<BoxedStage<DB>>,
}

impl<DB> SyncManagerBuilder<DB>
where
    DB: Database,
{
    /// Add a stage to the sync manager.
    pub fn add_stage<S>(mut self, stage: S) -> Self
    where
        S: Stage<DB> + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    /// Add a set of stages to the sync manager.
    pub fn add_stages<Set: StageSet<DB>>(mut self, set: Set) -> Self {
        self.stages.extend(set.stages());
        self
    }

    /// Builds the final [`SyncManager`] using the given database and context.
    ///
    /// Fails if two stages share an ID or an ordinal, or if an ordinal is zero. The context is
    /// cleared and primed with the persisted progress of every stage.
    pub fn build(self, db: DB, ctx: SyncContext) -> Result<SyncManager<DB>, SyncError> {
        let mut ids = HashSet::new();
        let mut stages = BTreeMap::new();
        for stage in self.stages {
            let descriptor = stage.descriptor();
            if descriptor.ordinal == 0 {
                return Err(SyncError::InvalidStageSet(format!(
                    "stage {} has ordinal 0",
                    descriptor.id
                )))
            }
            if !ids.insert(descriptor.id) {
                return Err(SyncError::InvalidStageSet(format!(
                    "stage {} is registered twice",
                    descriptor.id
                )))
            }
            if let Some(existing) = stages.insert(descriptor.ordinal, stage) {
                return Err(SyncError::InvalidStageSet(format!(
                    "stages {} and {} share ordinal {}",
                    existing.id(),
                    descriptor.id,
                    descriptor.ordinal
                )))
            }
        }

        let mut manager = SyncManager { db, stages, ctx, listeners: Default::default() };
        manager.prime()?;
        Ok(manager)
    }
}

impl<DB: Database> Default for SyncManagerBuilder<DB> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<DB: Database> std::fmt::Debug for SyncManagerBuilder<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManagerBuilder")
            .field("stages", &self.stages.iter().map(|stage| stage.id()).collect::<Vec<StageId>>())
            .finish()
    }
}
