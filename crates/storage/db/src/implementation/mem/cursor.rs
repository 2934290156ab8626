//! Cursor over an in-memory table.

use super::tx::TablesHandle;
use crate::{
    abstraction::{
        common::{KeyValue, PairResult},
        table::{Compress, Decode, Decompress, Encode, Table},
    },
    DatabaseError, DatabaseErrorInfo, DatabaseWriteError, DatabaseWriteOperation, DbCursorRO,
    DbCursorRW,
};
use std::{fmt, marker::PhantomData, ops::Bound};

/// Error code reported when inserting a key that already exists.
const KEY_EXISTS: i32 = -30_799;
/// Error code reported when appending a key that does not sort after the last key.
const KEY_MISMATCH: i32 = -30_418;

type RawEntry = (Vec<u8>, Vec<u8>);

/// Cursor over table `T` of an in-memory transaction.
///
/// The cursor remembers the encoded key it is positioned at, so it stays valid while the table is
/// modified through the same transaction.
pub struct MemCursor<T: Table> {
    handle: TablesHandle,
    /// Encoded key of the current position, `None` if unpositioned.
    current: Option<Vec<u8>>,
    _table: PhantomData<T>,
}

impl<T: Table> fmt::Debug for MemCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemCursor")
            .field("table", &T::NAME)
            .field("handle", &self.handle)
            .field("current", &self.current)
            .finish()
    }
}

fn decode_entry<T: Table>((key, value): RawEntry) -> Result<KeyValue<T>, DatabaseError> {
    Ok((T::Key::decode(&key)?, T::Value::decompress(&value)?))
}

impl<T: Table> MemCursor<T> {
    pub(crate) const fn new(handle: TablesHandle) -> Self {
        Self { handle, current: None, _table: PhantomData }
    }

    fn lookup(&self, f: impl FnOnce(&super::TableEntries) -> Option<(&Vec<u8>, &Vec<u8>)>) -> Option<RawEntry> {
        self.handle.read(T::NAME, |entries| {
            entries.and_then(f).map(|(key, value)| (key.clone(), value.clone()))
        })
    }

    /// Moves the cursor to `entry` if it exists and decodes it.
    fn move_to(&mut self, entry: Option<RawEntry>) -> PairResult<T> {
        match entry {
            Some(entry) => {
                self.current = Some(entry.0.clone());
                decode_entry::<T>(entry).map(Some)
            }
            None => Ok(None),
        }
    }

    fn write_error(
        operation: DatabaseWriteOperation,
        key: Vec<u8>,
        message: &str,
        code: i32,
    ) -> DatabaseError {
        DatabaseWriteError {
            info: DatabaseErrorInfo::new(message, code),
            operation,
            table_name: T::NAME,
            key,
        }
        .into()
    }
}

impl<T: Table> DbCursorRO<T> for MemCursor<T> {
    fn first(&mut self) -> PairResult<T> {
        let entry = self.lookup(|entries| entries.iter().next());
        self.move_to(entry)
    }

    fn seek_exact(&mut self, key: T::Key) -> PairResult<T> {
        let key = key.encode();
        let entry = self.lookup(|entries| entries.get_key_value(key.as_ref()));
        if entry.is_none() {
            self.current = None;
        }
        self.move_to(entry)
    }

    fn seek(&mut self, key: T::Key) -> PairResult<T> {
        let key = key.encode();
        let entry = self.lookup(|entries| {
            entries.range::<[u8], _>((Bound::Included(key.as_ref()), Bound::Unbounded)).next()
        });
        self.move_to(entry)
    }

    fn next(&mut self) -> PairResult<T> {
        let Some(current) = self.current.clone() else { return self.first() };
        let entry = self.lookup(|entries| {
            entries.range::<[u8], _>((Bound::Excluded(current.as_slice()), Bound::Unbounded)).next()
        });
        self.move_to(entry)
    }

    fn prev(&mut self) -> PairResult<T> {
        let Some(current) = self.current.clone() else { return self.last() };
        let entry = self.lookup(|entries| {
            entries
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(current.as_slice())))
                .next_back()
        });
        self.move_to(entry)
    }

    fn last(&mut self) -> PairResult<T> {
        let entry = self.lookup(|entries| entries.iter().next_back());
        self.move_to(entry)
    }

    fn current(&mut self) -> PairResult<T> {
        let Some(current) = self.current.clone() else { return Ok(None) };
        let entry = self.lookup(|entries| entries.get_key_value(current.as_slice()));
        entry.map(decode_entry::<T>).transpose()
    }
}

impl<T: Table> DbCursorRW<T> for MemCursor<T> {
    fn upsert(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        let key = key.encode().as_ref().to_vec();
        let value = value.compress().as_ref().to_vec();
        self.handle.write(T::NAME, |entries| {
            entries.insert(key.clone(), value);
        })?;
        self.current = Some(key);
        Ok(())
    }

    fn insert(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        let key = key.encode().as_ref().to_vec();
        let value = value.compress().as_ref().to_vec();
        let inserted = self.handle.write(T::NAME, |entries| {
            if entries.contains_key(&key) {
                return false
            }
            entries.insert(key.clone(), value);
            true
        })?;
        if !inserted {
            return Err(Self::write_error(
                DatabaseWriteOperation::CursorInsert,
                key,
                "key already exists",
                KEY_EXISTS,
            ))
        }
        self.current = Some(key);
        Ok(())
    }

    fn append(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        let key = key.encode().as_ref().to_vec();
        let value = value.compress().as_ref().to_vec();
        let appended = self.handle.write(T::NAME, |entries| {
            if entries.last_key_value().is_some_and(|(last, _)| *last >= key) {
                return false
            }
            entries.insert(key.clone(), value);
            true
        })?;
        if !appended {
            return Err(Self::write_error(
                DatabaseWriteOperation::CursorAppend,
                key,
                "key does not sort after the last key of the table",
                KEY_MISMATCH,
            ))
        }
        self.current = Some(key);
        Ok(())
    }

    fn delete_current(&mut self) -> Result<(), DatabaseError> {
        if let Some(current) = self.current.clone() {
            self.handle.write(T::NAME, |entries| {
                entries.remove(&current);
            })?;
        }
        Ok(())
    }
}
