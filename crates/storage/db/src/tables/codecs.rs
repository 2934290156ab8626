//! Integrates the primitive types with the database codec traits.

use crate::{
    abstraction::table::{Compress, Decode, Decompress, Encode},
    DatabaseError,
};
use stagedsync_primitives::{Address, BlockNumHash, StoredBlockBody, TransactionSigned, B256};

macro_rules! impl_uints {
    ($($name:tt),+) => {
        $(
            impl Encode for $name {
                type Encoded = [u8; std::mem::size_of::<$name>()];

                fn encode(self) -> Self::Encoded {
                    self.to_be_bytes()
                }
            }

            impl Decode for $name {
                fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
                    Ok($name::from_be_bytes(value.try_into().map_err(|_| DatabaseError::Decode)?))
                }
            }

            impl Compress for $name {
                type Compressed = [u8; std::mem::size_of::<$name>()];

                fn compress(self) -> Self::Compressed {
                    self.to_be_bytes()
                }
            }

            impl Decompress for $name {
                fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
                    <Self as Decode>::decode(value)
                }
            }
        )+
    };
}

impl_uints!(u32, u64);

impl Encode for B256 {
    type Encoded = [u8; 32];

    fn encode(self) -> Self::Encoded {
        self.0
    }
}

impl Decode for B256 {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 32 {
            return Err(DatabaseError::Decode)
        }
        Ok(Self::from_slice(value))
    }
}

impl Compress for B256 {
    type Compressed = [u8; 32];

    fn compress(self) -> Self::Compressed {
        self.0
    }
}

impl Decompress for B256 {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        <Self as Decode>::decode(value)
    }
}

impl Compress for Address {
    type Compressed = [u8; 20];

    fn compress(self) -> Self::Compressed {
        self.0 .0
    }
}

impl Decompress for Address {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 20 {
            return Err(DatabaseError::Decode)
        }
        Ok(Self::from_slice(value))
    }
}

impl Encode for String {
    type Encoded = Vec<u8>;

    fn encode(self) -> Self::Encoded {
        self.into_bytes()
    }
}

impl Decode for String {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        Self::from_utf8(value.to_vec()).map_err(|_| DatabaseError::Decode)
    }
}

impl Encode for BlockNumHash {
    type Encoded = [u8; 40];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; 40];
        buf[..8].copy_from_slice(&self.number.to_be_bytes());
        buf[8..].copy_from_slice(self.hash.as_slice());
        buf
    }
}

impl Decode for BlockNumHash {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 40 {
            return Err(DatabaseError::Decode)
        }
        let number = u64::decode(&value[..8])?;
        let hash = <B256 as Decode>::decode(&value[8..])?;
        Ok(Self { number, hash })
    }
}

impl Compress for StoredBlockBody {
    type Compressed = [u8; 16];

    fn compress(self) -> Self::Compressed {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.start_tx_id.to_be_bytes());
        buf[8..].copy_from_slice(&self.tx_count.to_be_bytes());
        buf
    }
}

impl Decompress for StoredBlockBody {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != 16 {
            return Err(DatabaseError::Decode)
        }
        Ok(Self { start_tx_id: u64::decode(&value[..8])?, tx_count: u64::decode(&value[8..])? })
    }
}

impl Compress for TransactionSigned {
    type Compressed = Vec<u8>;

    fn compress(self) -> Self::Compressed {
        alloy_rlp::encode(&self)
    }
}

impl Decompress for TransactionSigned {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        let mut buf = value;
        <Self as alloy_rlp::Decodable>::decode(&mut buf).map_err(|_| DatabaseError::Decode)
    }
}
