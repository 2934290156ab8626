//! Tables and data models.
//!
//! # Overview
//!
//! This module defines the tables the staged sync engine reads and writes, as well as some table
//! related abstractions:
//!
//! - [`codecs`] integrates the key and value types with the database.
//! - [`models`] defines the composite keys used by the tables.
//! - [`raw`] exposes tables whose values are not decoded.

pub mod codecs;
pub mod models;
pub mod raw;

pub use raw::{RawTable, RawValue};

use crate::tables::models::BlockNumIndex;
use stagedsync_primitives::{
    Address, BlockHash, BlockNumHash, BlockNumber, StoredBlockBody, TransactionSigned, TxNumber,
};

/// Default tables that should be present inside database.
pub const TABLES: [&str; 7] = [
    CanonicalHeaders::const_name(),
    HeaderNumbers::const_name(),
    BlockBodies::const_name(),
    Transactions::const_name(),
    TxSenders::const_name(),
    SyncStage::const_name(),
    SyncStagePrune::const_name(),
];

#[macro_export]
/// Macro to declare key value table.
macro_rules! table {
    ($(#[$docs:meta])+ ( $table_name:ident ) $key:ty | $value:ty) => {
        $(#[$docs])+
        ///
        #[doc = concat!("Takes [`", stringify!($key), "`] as a key and returns [`", stringify!($value), "`]")]
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $table_name;

        impl $crate::abstraction::table::Table for $table_name {
            const NAME: &'static str = $table_name::const_name();
            type Key = $key;
            type Value = $value;
        }

        impl $table_name {
            #[doc = concat!("Return ", stringify!($table_name), " as it is present inside the database.")]
            pub const fn const_name() -> &'static str {
                stringify!($table_name)
            }
        }

        impl std::fmt::Display for $table_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", stringify!($table_name))
            }
        }
    };
}

//
//  TABLE DEFINITIONS
//

table!(
    /// Stores the header hashes belonging to the canonical chain.
    ( CanonicalHeaders ) BlockNumber | BlockHash
);

table!(
    /// Stores the block number corresponding to a header.
    ( HeaderNumbers ) BlockHash | BlockNumber
);

table!(
    /// Stores block body indices: the first transaction number of the block and its transaction
    /// count.
    ( BlockBodies ) BlockNumHash | StoredBlockBody
);

table!(
    /// Stores the transactions of the canonical chain, keyed by their global transaction number.
    ( Transactions ) TxNumber | TransactionSigned
);

table!(
    /// Stores the recovered sender of each transaction, keyed by block number and the index of
    /// the transaction inside the block.
    ( TxSenders ) BlockNumIndex | Address
);

table!(
    /// Stores the highest synced block number of each stage.
    ( SyncStage ) StageKey | BlockNumber
);

table!(
    /// Stores the highest pruned block number of each stage.
    ( SyncStagePrune ) StageKey | BlockNumber
);

/// Alias type for the stage identifier key of [`SyncStage`] and [`SyncStagePrune`].
pub type StageKey = String;
