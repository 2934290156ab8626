//! Transaction wrappers over the in-memory tables.

use super::{cursor::MemCursor, TableEntries, Tables};
use crate::{
    abstraction::table::{Compress, Decompress, Encode, Table},
    DatabaseError, DbTx, DbTxMut,
};
use parking_lot::{Mutex, RwLock};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Handle to the tables a transaction or cursor operates on.
#[derive(Clone)]
pub(crate) enum TablesHandle {
    /// Immutable committed snapshot.
    Snapshot(Arc<Tables>),
    /// Staged copy owned by the read-write transaction.
    Staged(Arc<Mutex<Tables>>),
}

impl TablesHandle {
    /// Runs `f` over the entries of `table`, or `None` if the table does not exist yet.
    pub(crate) fn read<R>(&self, table: &str, f: impl FnOnce(Option<&TableEntries>) -> R) -> R {
        match self {
            Self::Snapshot(tables) => f(tables.get(table).map(|entries| entries.as_ref())),
            Self::Staged(tables) => f(tables.lock().get(table).map(|entries| entries.as_ref())),
        }
    }

    /// Runs `f` over a mutable copy of the entries of `table`, creating the table if needed.
    pub(crate) fn write<R>(
        &self,
        table: &'static str,
        f: impl FnOnce(&mut TableEntries) -> R,
    ) -> Result<R, DatabaseError> {
        match self {
            Self::Snapshot(_) => {
                Err(DatabaseError::Other(format!("write to table {table} in a read-only transaction")))
            }
            Self::Staged(tables) => {
                let mut tables = tables.lock();
                Ok(f(Arc::make_mut(tables.entry(table).or_default())))
            }
        }
    }
}

impl fmt::Debug for TablesHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot(_) => f.write_str("Snapshot"),
            Self::Staged(_) => f.write_str("Staged"),
        }
    }
}

fn get<T: Table>(handle: &TablesHandle, key: T::Key) -> Result<Option<T::Value>, DatabaseError> {
    let key = key.encode();
    handle
        .read(T::NAME, |entries| entries.and_then(|entries| entries.get(key.as_ref()).cloned()))
        .map(|value| T::Value::decompress(&value))
        .transpose()
}

fn entries<T: Table>(handle: &TablesHandle) -> usize {
    handle.read(T::NAME, |entries| entries.map_or(0, |entries| entries.len()))
}

/// Read-only transaction over a committed snapshot.
#[derive(Debug)]
pub struct MemTx {
    handle: TablesHandle,
}

impl MemTx {
    pub(crate) fn new(snapshot: Arc<Tables>) -> Self {
        Self { handle: TablesHandle::Snapshot(snapshot) }
    }
}

impl DbTx for MemTx {
    type Cursor<T: Table> = MemCursor<T>;

    fn get<T: Table>(&self, key: T::Key) -> Result<Option<T::Value>, DatabaseError> {
        get::<T>(&self.handle, key)
    }

    fn commit(self) -> Result<bool, DatabaseError> {
        Ok(true)
    }

    fn abort(self) {}

    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<T>, DatabaseError> {
        Ok(MemCursor::new(self.handle.clone()))
    }

    fn entries<T: Table>(&self) -> Result<usize, DatabaseError> {
        Ok(entries::<T>(&self.handle))
    }
}

/// Read-write transaction.
///
/// Writes are staged on a copy of the snapshot that was committed when the transaction was
/// opened and become visible to new transactions only on [`DbTx::commit`]. Dropping the
/// transaction without committing discards them.
pub struct MemTxMut {
    staged: Arc<Mutex<Tables>>,
    committed: Arc<RwLock<Arc<Tables>>>,
    writer: Arc<AtomicBool>,
}

impl MemTxMut {
    pub(crate) fn new(
        staged: Tables,
        committed: Arc<RwLock<Arc<Tables>>>,
        writer: Arc<AtomicBool>,
    ) -> Self {
        Self { staged: Arc::new(Mutex::new(staged)), committed, writer }
    }

    fn handle(&self) -> TablesHandle {
        TablesHandle::Staged(self.staged.clone())
    }
}

impl fmt::Debug for MemTxMut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTxMut").field("tables", &self.staged.lock().len()).finish()
    }
}

impl Drop for MemTxMut {
    fn drop(&mut self) {
        self.writer.store(false, Ordering::Release);
    }
}

impl DbTx for MemTxMut {
    type Cursor<T: Table> = MemCursor<T>;

    fn get<T: Table>(&self, key: T::Key) -> Result<Option<T::Value>, DatabaseError> {
        get::<T>(&self.handle(), key)
    }

    fn commit(self) -> Result<bool, DatabaseError> {
        let staged = std::mem::take(&mut *self.staged.lock());
        *self.committed.write() = Arc::new(staged);
        Ok(true)
    }

    fn abort(self) {}

    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<T>, DatabaseError> {
        Ok(MemCursor::new(self.handle()))
    }

    fn entries<T: Table>(&self) -> Result<usize, DatabaseError> {
        Ok(entries::<T>(&self.handle()))
    }
}

impl DbTxMut for MemTxMut {
    type CursorMut<T: Table> = MemCursor<T>;

    fn put<T: Table>(&self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        let key = key.encode().as_ref().to_vec();
        let value = value.compress().as_ref().to_vec();
        self.handle().write(T::NAME, |entries| {
            entries.insert(key, value);
        })
    }

    fn delete<T: Table>(
        &self,
        key: T::Key,
        value: Option<T::Value>,
    ) -> Result<bool, DatabaseError> {
        let key = key.encode();
        let expected = value.map(|value| value.compress().as_ref().to_vec());
        let handle = self.handle();

        let matches = handle.read(T::NAME, |entries| {
            entries.and_then(|entries| entries.get(key.as_ref())).is_some_and(|stored| {
                expected.as_ref().map_or(true, |expected| expected == stored)
            })
        });
        if !matches {
            return Ok(false)
        }

        handle.write(T::NAME, |entries| entries.remove(key.as_ref()).is_some())
    }

    fn clear<T: Table>(&self) -> Result<(), DatabaseError> {
        self.handle().write(T::NAME, |entries| entries.clear())
    }

    fn cursor_write<T: Table>(&self) -> Result<Self::CursorMut<T>, DatabaseError> {
        Ok(MemCursor::new(self.handle()))
    }
}
