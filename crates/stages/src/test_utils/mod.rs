//! Utilities for testing stages.
#![allow(missing_docs, unreachable_pub)]

mod stage;
mod test_db;

pub use stage::TestStage;
pub use test_db::TestStageDB;

#[cfg(test)]
mod macros;
#[cfg(test)]
pub(crate) use macros::*;

#[cfg(test)]
mod recoverer;
#[cfg(test)]
pub(crate) use recoverer::StopAtTransaction;

#[cfg(test)]
mod runner;
#[cfg(test)]
pub(crate) use runner::{
    ExecInput, ExecuteStageTestRunner, StageTestRunner, TestRunnerError, UnwindInput,
    UnwindStageTestRunner,
};
