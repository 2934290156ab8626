use crate::StageId;
use stagedsync_config::EtlConfig;
use stagedsync_db::{DatabaseError, StageProgressReader, StageProgressWriter};
use stagedsync_primitives::{BlockNumber, PruneModes};
use std::{collections::HashMap, sync::Arc};
use tempfile::TempDir;
use tracing::debug;

/// State shared by all stages during a sync run.
///
/// Caches the progress of every stage, falling back to the progress store on first access, and
/// carries the unwind request and the run flags. Owned by the [`SyncManager`](crate::SyncManager)
/// and handed to one stage at a time.
#[derive(Debug)]
pub struct SyncContext {
    progress: HashMap<StageId, BlockNumber>,
    prune_progress: HashMap<StageId, BlockNumber>,
    /// The height stages above it must unwind to.
    unwind_height: Option<BlockNumber>,
    first_cycle: bool,
    is_done: bool,
    etl: EtlConfig,
    /// Scratch directory for ETL collectors, created on first use.
    etl_dir: Option<Arc<TempDir>>,
    prune_modes: PruneModes,
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new(EtlConfig::default(), PruneModes::none())
    }
}

impl SyncContext {
    /// Creates a context for a new sync run.
    pub fn new(etl: EtlConfig, prune_modes: PruneModes) -> Self {
        Self {
            progress: HashMap::new(),
            prune_progress: HashMap::new(),
            unwind_height: None,
            first_cycle: true,
            is_done: false,
            etl,
            etl_dir: None,
            prune_modes,
        }
    }

    /// Returns the progress of the stage, loading it from the progress store if it is not cached.
    ///
    /// A stage that never ran is at block 0.
    pub fn get_progress<TX: StageProgressReader>(
        &mut self,
        tx: &TX,
        stage: StageId,
    ) -> Result<BlockNumber, DatabaseError> {
        if let Some(progress) = self.progress.get(&stage) {
            return Ok(*progress)
        }
        let progress = tx.stage_progress(stage.as_str())?.unwrap_or_default();
        self.progress.insert(stage, progress);
        Ok(progress)
    }

    /// Records the progress of the stage in the cache and the progress store.
    pub fn update_progress<TX: StageProgressWriter>(
        &mut self,
        tx: &TX,
        stage: StageId,
        progress: BlockNumber,
    ) -> Result<(), DatabaseError> {
        tx.save_stage_progress(stage.as_str(), progress)?;
        self.progress.insert(stage, progress);
        Ok(())
    }

    /// Returns the prune progress of the stage, loading it from the progress store if it is not
    /// cached.
    pub fn get_prune_progress<TX: StageProgressReader>(
        &mut self,
        tx: &TX,
        stage: StageId,
    ) -> Result<BlockNumber, DatabaseError> {
        if let Some(progress) = self.prune_progress.get(&stage) {
            return Ok(*progress)
        }
        let progress = tx.stage_prune_progress(stage.as_str())?.unwrap_or_default();
        self.prune_progress.insert(stage, progress);
        Ok(progress)
    }

    /// Records the prune progress of the stage in the cache and the progress store.
    pub fn update_prune_progress<TX: StageProgressWriter>(
        &mut self,
        tx: &TX,
        stage: StageId,
        progress: BlockNumber,
    ) -> Result<(), DatabaseError> {
        tx.save_stage_prune_progress(stage.as_str(), progress)?;
        self.prune_progress.insert(stage, progress);
        Ok(())
    }

    /// Drops the cached progress so the next access reads the progress store again.
    ///
    /// Called after uncommitted writes were rolled back.
    pub fn invalidate_progress(&mut self) {
        self.progress.clear();
        self.prune_progress.clear();
    }

    /// Returns the height a stage at `current_progress` has to unwind to, if any.
    pub fn needs_unwind(&self, current_progress: BlockNumber) -> Option<BlockNumber> {
        self.unwind_height.filter(|height| *height < current_progress)
    }

    /// Returns the requested unwind height.
    pub const fn unwind_height(&self) -> Option<BlockNumber> {
        self.unwind_height
    }

    /// Requests an unwind to `height`.
    ///
    /// If an unwind is already pending, the lower of the two heights is kept.
    pub fn set_unwind(&mut self, height: BlockNumber) {
        let height = self.unwind_height.map_or(height, |pending| pending.min(height));
        debug!(target: "sync::context", height, "Unwind requested");
        self.unwind_height = Some(height);
    }

    /// Clears the unwind request.
    pub fn clear_unwind(&mut self) {
        self.unwind_height = None;
    }

    /// Whether the current cycle is the first one of the run.
    pub const fn is_first_cycle(&self) -> bool {
        self.first_cycle
    }

    /// Sets whether the current cycle is the first one of the run.
    pub fn set_first_cycle(&mut self, first_cycle: bool) {
        self.first_cycle = first_cycle;
    }

    /// Whether the run has nothing left to do.
    pub const fn is_done(&self) -> bool {
        self.is_done
    }

    /// Sets the terminal flag of the run loop.
    pub fn set_done(&mut self, done: bool) {
        self.is_done = done;
    }

    /// Returns the scratch directory for ETL collectors, creating it on first use.
    pub fn etl_dir(&mut self) -> std::io::Result<Arc<TempDir>> {
        if let Some(dir) = &self.etl_dir {
            return Ok(dir.clone())
        }
        let dir = Arc::new(match &self.etl.dir {
            Some(path) => {
                std::fs::create_dir_all(path)?;
                TempDir::new_in(path)?
            }
            None => TempDir::new()?,
        });
        self.etl_dir = Some(dir.clone());
        Ok(dir)
    }

    /// The size in bytes an ETL collector buffers before spilling to disk.
    pub const fn etl_file_size(&self) -> usize {
        self.etl.file_size
    }

    /// The configured prune modes.
    pub const fn prune_modes(&self) -> &PruneModes {
        &self.prune_modes
    }

    /// Resets the caches and flags and discards the scratch directory.
    pub fn clear(&mut self) {
        self.invalidate_progress();
        self.unwind_height = None;
        self.first_cycle = true;
        self.is_done = false;
        // the directory is removed once the last collector using it is dropped
        self.etl_dir = None;
    }
}
