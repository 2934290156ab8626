use crate::{keccak256, BlockHash, BlockNumber, TransactionSigned, TxNumber, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use std::ops::Range;

/// A block header, reduced to the fields the sync stages need to link and identify blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
pub struct Header {
    /// The hash of the parent block.
    pub parent_hash: B256,
    /// The block number.
    pub number: BlockNumber,
    /// Block timestamp.
    pub timestamp: u64,
    /// Root of the transactions included in the block.
    pub transactions_root: B256,
}

impl Header {
    /// Heavy function that hashes the RLP encoded header.
    pub fn hash_slow(&self) -> BlockHash {
        keccak256(alloy_rlp::encode(self))
    }

    /// Calculate the hash and seal the header so that it can't be changed.
    pub fn seal_slow(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }
}

/// A [`Header`] that is sealed at a precalculated hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SealedHeader {
    /// Locked header fields.
    pub header: Header,
    /// Locked header hash.
    pub hash: BlockHash,
}

impl SealedHeader {
    /// Return the block number.
    pub const fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// Return the number and hash of the header.
    pub const fn num_hash(&self) -> BlockNumHash {
        BlockNumHash { number: self.header.number, hash: self.hash }
    }
}

/// A sealed header together with its transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealedBlock {
    /// Locked block header.
    pub header: SealedHeader,
    /// Transactions with signatures.
    pub body: Vec<TransactionSigned>,
}

impl SealedBlock {
    /// Return the block number.
    pub const fn number(&self) -> BlockNumber {
        self.header.header.number
    }

    /// Return the block hash.
    pub const fn hash(&self) -> BlockHash {
        self.header.hash
    }

    /// Return the number and hash of the block.
    pub const fn num_hash(&self) -> BlockNumHash {
        self.header.num_hash()
    }
}

/// Block number and hash pair, used as the key of per-block tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockNumHash {
    /// Block number
    pub number: BlockNumber,
    /// Block hash
    pub hash: BlockHash,
}

impl BlockNumHash {
    /// Creates a new `BlockNumHash` from a block number and hash.
    pub const fn new(number: BlockNumber, hash: BlockHash) -> Self {
        Self { number, hash }
    }
}

impl From<(BlockNumber, BlockHash)> for BlockNumHash {
    fn from((number, hash): (BlockNumber, BlockHash)) -> Self {
        Self { number, hash }
    }
}

/// The storage representation of a block body: a pointer into the flat transactions table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredBlockBody {
    /// The number of the first transaction in this block.
    pub start_tx_id: TxNumber,
    /// The total number of transactions in the block.
    pub tx_count: u64,
}

impl StoredBlockBody {
    /// Return the range of transaction ids for this body.
    pub const fn tx_id_range(&self) -> Range<TxNumber> {
        self.start_tx_id..self.start_tx_id + self.tx_count
    }

    /// Return the index of the last transaction in this block.
    ///
    /// Equals `start_tx_id - 1` for empty blocks; callers must check [`Self::is_empty`] first.
    pub const fn last_tx_index(&self) -> TxNumber {
        self.start_tx_id.saturating_add(self.tx_count).saturating_sub(1)
    }

    /// Return the id of the first transaction of the next block.
    pub const fn next_tx_id(&self) -> TxNumber {
        self.start_tx_id + self.tx_count
    }

    /// Return a flag whether the block is empty.
    pub const fn is_empty(&self) -> bool {
        self.tx_count == 0
    }
}
