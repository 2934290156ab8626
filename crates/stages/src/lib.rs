//! Staged sync engine.
//!
//! The engine drives a fixed, ordered list of [`Stage`]s. Each stage derives one kind of data from
//! the data of the stages before it and records how far it got as its progress. A [`SyncManager`]
//! runs cycles over the stages:
//!
//! 1. If an unwind was requested, every stage whose progress is above the unwind height is unwound,
//!    in reverse order.
//! 2. Every stage is run forward, in order.
//! 3. Stages that support pruning are pruned.
//!
//! Cycles repeat until a whole cycle makes no progress. All work of a cycle happens in write
//! transactions handed out by a [`TxnManager`]; stages decide when to commit.
//!
//! Stage state that lives between stages and cycles, such as the cached progress of every stage and
//! the requested unwind height, is kept in a [`SyncContext`].
//!
//! # Built-in stages
//!
//! - [`BlockHashesStage`] builds the hash to number index of the canonical chain.
//! - [`SendersStage`] recovers the sender of every transaction on a pool of worker threads, see
//!   [`recovery`].
//!
//! [`DefaultStages`] registers both in order.
//!
//! # Feature Flags
//!
//! - `test-utils`: Export utilities for testing

#![doc(issue_tracker_base_url = "https://github.com/stagedsync/stagedsync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod context;
mod entry;
mod error;
mod id;
mod manager;
mod stage;
mod txn;

pub mod recovery;
pub mod sets;

/// The built-in stages.
pub mod stages;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use context::SyncContext;
pub use entry::{run_stage_forward, run_stage_unwind};
pub use error::{StageError, StageErrorKind, SyncError};
pub use id::StageId;
pub use manager::{SyncEvent, SyncManager, SyncManagerBuilder};
pub use recovery::{
    RecoveryConfig, RecoveryFarm, RecoveryOutcome, RecoveryStats, Secp256k1Recoverer,
    SenderRecoverer, StopHandle,
};
pub use sets::{DefaultStages, StageSet};
pub use stage::{BoxedStage, Stage, StageDescriptor};
pub use stages::{BlockHashesStage, SendersStage};
pub use txn::{TxnManager, TxnMode};
