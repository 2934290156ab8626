//! Composite keys stored in the database.

use crate::{
    abstraction::table::{Decode, Encode},
    DatabaseError,
};
use stagedsync_primitives::BlockNumber;

/// Block number and the position of a transaction inside that block.
///
/// Encoded as the big-endian block number followed by the big-endian index, so entries sort by
/// block first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockNumIndex {
    /// Block number.
    pub number: BlockNumber,
    /// Index of the transaction inside the block.
    pub index: u32,
}

impl BlockNumIndex {
    /// Creates a new key from a block number and an in-block transaction index.
    pub const fn new(number: BlockNumber, index: u32) -> Self {
        Self { number, index }
    }

    /// First key of the given block.
    pub const fn block_start(number: BlockNumber) -> Self {
        Self { number, index: 0 }
    }

    /// Last possible key of the given block.
    pub const fn block_end(number: BlockNumber) -> Self {
        Self { number, index: u32::MAX }
    }
}

impl From<(BlockNumber, u32)> for BlockNumIndex {
    fn from((number, index): (BlockNumber, u32)) -> Self {
        Self { number, index }
    }
}

impl Encode for BlockNumIndex {
    type Encoded = [u8; 12];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; 12];
        buf[..8].copy_from_slice(&self.number.to_be_bytes());
        buf[8..].copy_from_slice(&self.index.to_be_bytes());
        buf
    }
}

impl Decode for BlockNumIndex {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        let bytes: [u8; 12] = value.try_into().map_err(|_| DatabaseError::Decode)?;
        let mut number = [0u8; 8];
        number.copy_from_slice(&bytes[..8]);
        let mut index = [0u8; 4];
        index.copy_from_slice(&bytes[8..]);
        Ok(Self { number: u64::from_be_bytes(number), index: u32::from_be_bytes(index) })
    }
}
