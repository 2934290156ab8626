/// Common types used throughout the abstraction.
pub mod common;
/// Cursor database traits.
pub mod cursor;
/// Database traits.
pub mod database;
/// Table traits
pub mod table;
/// Transaction database traits.
pub mod transaction;

pub use common::*;
pub use cursor::*;
pub use database::*;
pub use table::*;
pub use transaction::*;
