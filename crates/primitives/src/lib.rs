//! Commonly used types in stagedsync.
//!
//! This crate contains the block and transaction types the staged sync pipeline reads from
//! storage, the secp256k1 helpers used to recover transaction senders, and the prune modes
//! stages consult when deleting old data.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export random block and transaction generators for testing.

#![doc(issue_tracker_base_url = "https://github.com/stagedsync/stagedsync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod block;
mod prune;
mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use block::{BlockNumHash, Header, SealedBlock, SealedHeader, StoredBlockBody};
pub use prune::{PruneMode, PruneModes, PruneSegment, PruneSegmentError, MINIMUM_PRUNING_DISTANCE};
pub use transaction::{
    util::secp256k1::{public_key_to_address, recover_signer, sign_message},
    Signature, Transaction, TransactionSigned,
};

pub use alloy_primitives::{keccak256, Address, BlockHash, BlockNumber, Bytes, TxHash, B256, U256};

/// Transaction number, the position of a transaction across the whole canonical chain.
pub type TxNumber = u64;

/// Length in bytes of a block hash.
pub const HASH_LENGTH: usize = 32;
