//! Database abstraction layer of the staged sync engine, with an in-memory implementation.
//!
//! The database abstraction assumes that the underlying store is a KV store subdivided into tables.
//!
//! One or more changes are tied to a transaction that is atomically committed to the data store at
//! the same time. It is not possible to write data to the database outside of a transaction, and
//! only one read-write transaction may be open at any time.
//!
//! Good starting points for this crate are:
//!
//! - [`Database`] for the main database abstraction
//! - [`DbTx`] (RO) and [`DbTxMut`] (RW) for the transaction abstractions.
//! - [`DbCursorRO`] (RO) and [`DbCursorRW`] (RW) for the cursor abstractions (see below).
//!
//! # Cursors and Walkers
//!
//! - **Cursors** ([`DbCursorRO`] / [`DbCursorRW`]) iterate data in a table in ascending key order.
//! - **Walkers** ([`Walker`] / [`RangeWalker`] / [`ReverseWalker`]) use cursors to walk the entries
//!   in a table, either fully from a specific point, or over a range.
//!
//! # Tables
//!
//! Keys are de/serialized using the [`Encode`] and [`Decode`] traits, and values are de/serialized
//! ("compressed") using the [`Compress`] and [`Decompress`] traits. The encoding of a key must
//! preserve its ordering, since the store sorts entries by their encoded bytes.
//!
//! An overview of the data model can be found in the [`tables`] module.
//!
//! [`Database`]: crate::abstraction::database::Database
//! [`DbTx`]: crate::abstraction::transaction::DbTx
//! [`DbTxMut`]: crate::abstraction::transaction::DbTxMut
//! [`DbCursorRO`]: crate::abstraction::cursor::DbCursorRO
//! [`DbCursorRW`]: crate::abstraction::cursor::DbCursorRW
//! [`Walker`]: crate::abstraction::cursor::Walker
//! [`RangeWalker`]: crate::abstraction::cursor::RangeWalker
//! [`ReverseWalker`]: crate::abstraction::cursor::ReverseWalker
//! [`Encode`]: crate::abstraction::table::Encode
//! [`Decode`]: crate::abstraction::table::Decode
//! [`Compress`]: crate::abstraction::table::Compress
//! [`Decompress`]: crate::abstraction::table::Decompress

#![doc(issue_tracker_base_url = "https://github.com/stagedsync/stagedsync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

/// Traits defining the database abstractions, such as cursors and transactions.
pub mod abstraction;

mod error;
mod implementation;
pub mod progress;
pub mod tables;

pub use abstraction::*;
pub use error::{DatabaseError, DatabaseErrorInfo, DatabaseWriteError, DatabaseWriteOperation};
pub use implementation::mem::{MemCursor, MemDatabase, MemTx, MemTxMut};
pub use progress::{StageProgressReader, StageProgressWriter};
pub use tables::*;

/// Utilities for tests.
pub mod test_utils {
    use super::MemDatabase;
    use std::sync::Arc;

    /// Create an empty in-memory database for testing.
    pub fn create_test_db() -> Arc<MemDatabase> {
        Arc::new(MemDatabase::new())
    }
}
