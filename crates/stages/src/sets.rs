//! Built-in [`StageSet`]s.
//!
//! The stages that need no external input beyond the database are bundled in [`DefaultStages`]:
//!
//! - [`BlockHashesStage`]
//! - [`SendersStage`]
//!
//! # Examples
//!
//! ```no_run
//! # use stagedsync_stages::{sets::DefaultStages, SyncContext, SyncManager};
//! # use stagedsync_config::StageConfig;
//! # use stagedsync_db::test_utils::create_test_db;
//! let manager = SyncManager::builder()
//!     .add_stages(DefaultStages::new(&StageConfig::default()))
//!     .build(create_test_db(), SyncContext::default())
//!     .unwrap();
//! ```
use crate::{
    recovery::RecoveryConfig,
    stage::BoxedStage,
    stages::{BlockHashesStage, SendersStage},
};
use stagedsync_config::StageConfig;
use stagedsync_db::Database;

/// A set of stages that are registered together.
pub trait StageSet<DB: Database> {
    /// The stages of the set.
    fn stages(self) -> Vec<BoxedStage<DB>>;
}

/// The stages that derive their data from the headers and bodies in the database.
#[derive(Debug)]
pub struct DefaultStages {
    block_hashes: BlockHashesStage,
    senders: SendersStage,
}

impl DefaultStages {
    /// Create the default stages from the stage configuration.
    pub fn new(config: &StageConfig) -> Self {
        Self {
            block_hashes: BlockHashesStage::new(config.block_hashes),
            senders: SendersStage::new(RecoveryConfig::from(config.senders)),
        }
    }
}

impl<DB: Database> StageSet<DB> for DefaultStages {
    fn stages(self) -> Vec<BoxedStage<DB>> {
        vec![Box::new(self.block_hashes), Box::new(self.senders)]
    }
}

impl<DB: Database> StageSet<DB> for Vec<BoxedStage<DB>> {
    fn stages(self) -> Vec<BoxedStage<DB>> {
        self
    }
}
