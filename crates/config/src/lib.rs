//! Standalone crate for the staged sync engine configuration types.

#![doc(issue_tracker_base_url = "https://github.com/stagedsync/stagedsync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;
pub use config::{
    BlockHashesConfig, Config, EtlConfig, PruneConfig, SenderRecoveryConfig, StageConfig,
};
