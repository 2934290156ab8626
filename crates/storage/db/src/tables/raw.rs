use crate::{
    abstraction::table::{Compress, Decompress, Table, Value},
    DatabaseError,
};
use std::{fmt, marker::PhantomData};

/// Table that exposes its values undecoded.
///
/// Reads and writes the same entries as `T`, which lets a caller validate the raw value bytes
/// before decoding them.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawTable<T: Table> {
    phantom: PhantomData<T>,
}

impl<T: Table> Table for RawTable<T> {
    const NAME: &'static str = T::NAME;

    type Key = T::Key;
    type Value = RawValue<T::Value>;
}

/// Raw table value.
pub struct RawValue<V: Value> {
    value: Vec<u8>,
    _phantom: PhantomData<V>,
}

impl<V: Value> RawValue<V> {
    /// Create new raw value.
    pub fn new(value: V) -> Self {
        Self { value: value.compress().as_ref().to_vec(), _phantom: PhantomData }
    }

    /// Create new raw value from bytes.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self { value: vec, _phantom: PhantomData }
    }

    /// Returns the decompressed value.
    pub fn value(&self) -> Result<V, DatabaseError> {
        V::decompress(&self.value)
    }

    /// Returns the raw value as seen on the database.
    pub fn raw_value(&self) -> &[u8] {
        &self.value
    }

    /// Consumes [`Self`] and returns the inner raw value.
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }
}

impl<V: Value> Clone for RawValue<V> {
    fn clone(&self) -> Self {
        Self::from_vec(self.value.clone())
    }
}

impl<V: Value> PartialEq for RawValue<V> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<V: Value> Eq for RawValue<V> {}

impl<V: Value> fmt::Debug for RawValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawValue").field("value", &self.value).finish()
    }
}

impl<V: Value> Compress for RawValue<V> {
    type Compressed = Vec<u8>;

    fn compress(self) -> Self::Compressed {
        self.value
    }
}

impl<V: Value> Decompress for RawValue<V> {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        Ok(Self::from_vec(value.to_vec()))
    }
}
