//! In-memory database engine.
//!
//! Every table is an ordered map from encoded key to compressed value. Committed state is an
//! immutable snapshot: read transactions hold on to the snapshot that was current when they
//! were opened, and the single read-write transaction stages its writes on a copy of it. Tables
//! are shared between snapshots and only copied when a transaction first writes to them.

mod cursor;
mod tx;

pub use cursor::MemCursor;
pub use tx::{MemTx, MemTxMut};

use crate::{tables::TABLES, Database, DatabaseError, DatabaseErrorInfo};
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Entries of a single table, sorted by encoded key.
pub(crate) type TableEntries = BTreeMap<Vec<u8>, Vec<u8>>;

/// All tables of one snapshot, keyed by table name.
pub(crate) type Tables = BTreeMap<&'static str, Arc<TableEntries>>;

/// Error code reported when a second read-write transaction is requested.
const WRITER_BUSY: i32 = -30_778;

/// In-memory database with snapshot reads and a single writer.
#[derive(Debug)]
pub struct MemDatabase {
    /// Latest committed snapshot.
    committed: Arc<RwLock<Arc<Tables>>>,
    /// Set while a read-write transaction is open.
    writer: Arc<AtomicBool>,
}

impl MemDatabase {
    /// Creates an empty database with all default tables.
    pub fn new() -> Self {
        let tables = TABLES.iter().map(|name| (*name, Arc::default())).collect();
        Self {
            committed: Arc::new(RwLock::new(Arc::new(tables))),
            writer: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the currently committed snapshot.
    fn snapshot(&self) -> Arc<Tables> {
        self.committed.read().clone()
    }
}

impl Default for MemDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for MemDatabase {
    type TX = MemTx;
    type TXMut = MemTxMut;

    fn tx(&self) -> Result<Self::TX, DatabaseError> {
        Ok(MemTx::new(self.snapshot()))
    }

    fn tx_mut(&self) -> Result<Self::TXMut, DatabaseError> {
        if self.writer.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(DatabaseError::InitTx(DatabaseErrorInfo::new(
                "a read-write transaction is already open",
                WRITER_BUSY,
            )))
        }
        let staged = (*self.snapshot()).clone();
        Ok(MemTxMut::new(staged, self.committed.clone(), self.writer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        tables::{models::BlockNumIndex, CanonicalHeaders, HeaderNumbers, RawTable, TxSenders},
        DatabaseWriteOperation, DbCursorRO, DbCursorRW, DbTx, DbTxMut,
    };
    use assert_matches::assert_matches;
    use stagedsync_primitives::{Address, B256};

    #[test]
    fn db_manual_put_get() {
        let db = MemDatabase::new();

        let value = B256::repeat_byte(0x11);
        let key = 1u64;

        // PUT
        let tx = db.tx_mut().expect("tx_mut");
        tx.put::<CanonicalHeaders>(key, value).expect("put");
        tx.commit().expect("commit");

        // GET
        let tx = db.tx().expect("tx");
        let result = tx.get::<CanonicalHeaders>(key).expect("get");
        assert_eq!(result, Some(value));
        assert_eq!(tx.entries::<CanonicalHeaders>().unwrap(), 1);
    }

    #[test]
    fn uncommitted_writes_are_invisible() {
        let db = MemDatabase::new();

        let tx = db.tx_mut().unwrap();
        tx.put::<HeaderNumbers>(B256::repeat_byte(1), 1).unwrap();
        assert_eq!(tx.get::<HeaderNumbers>(B256::repeat_byte(1)).unwrap(), Some(1));

        let reader = db.tx().unwrap();
        assert_eq!(reader.get::<HeaderNumbers>(B256::repeat_byte(1)).unwrap(), None);

        tx.abort();
        assert_eq!(db.tx().unwrap().get::<HeaderNumbers>(B256::repeat_byte(1)).unwrap(), None);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let db = MemDatabase::new();
        let reader = db.tx().unwrap();

        db.update(|tx| tx.put::<CanonicalHeaders>(0, B256::ZERO)).unwrap().unwrap();

        assert_eq!(reader.entries::<CanonicalHeaders>().unwrap(), 0);
        assert_eq!(db.tx().unwrap().entries::<CanonicalHeaders>().unwrap(), 1);
    }

    #[test]
    fn single_writer() {
        let db = MemDatabase::new();
        let tx = db.tx_mut().unwrap();
        assert_matches!(db.tx_mut(), Err(DatabaseError::InitTx(_)));

        tx.commit().unwrap();
        let tx = db.tx_mut().unwrap();
        drop(tx);
        assert!(db.tx_mut().is_ok());
    }

    #[test]
    fn db_cursor_walk_and_range() {
        let db = MemDatabase::new();
        db.update(|tx| {
            for number in 0..10u64 {
                tx.put::<CanonicalHeaders>(number, B256::with_last_byte(number as u8)).unwrap();
            }
        })
        .unwrap();

        let tx = db.tx().unwrap();
        let mut cursor = tx.cursor_read::<CanonicalHeaders>().unwrap();

        let keys = cursor
            .walk(Some(7))
            .unwrap()
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(keys, vec![7, 8, 9]);

        let keys = cursor
            .walk_range(2..5)
            .unwrap()
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(keys, vec![2, 3, 4]);

        let keys = cursor
            .walk_range(8..)
            .unwrap()
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(keys, vec![8, 9]);

        assert_eq!(cursor.walk_range(20..=30).unwrap().count(), 0);

        let keys = cursor
            .walk_back(Some(2))
            .unwrap()
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(keys, vec![2, 1, 0]);
    }

    #[test]
    fn db_cursor_seek_and_positioning() {
        let db = MemDatabase::new();
        db.update(|tx| {
            for number in [1u64, 3, 5] {
                tx.put::<CanonicalHeaders>(number, B256::ZERO).unwrap();
            }
        })
        .unwrap();

        let tx = db.tx().unwrap();
        let mut cursor = tx.cursor_read::<CanonicalHeaders>().unwrap();
        assert_eq!(cursor.seek(2).unwrap().map(|(k, _)| k), Some(3));
        assert_eq!(cursor.current().unwrap().map(|(k, _)| k), Some(3));
        assert_eq!(cursor.next().unwrap().map(|(k, _)| k), Some(5));
        assert_eq!(cursor.next().unwrap(), None);
        assert_eq!(cursor.prev().unwrap().map(|(k, _)| k), Some(3));
        assert_eq!(cursor.seek_exact(2).unwrap(), None);
        assert_eq!(cursor.next().unwrap().map(|(k, _)| k), Some(1));
        assert_eq!(cursor.last().unwrap().map(|(k, _)| k), Some(5));
        assert_eq!(cursor.first().unwrap().map(|(k, _)| k), Some(1));
    }

    #[test]
    fn db_cursor_append_rejects_unsorted_keys() {
        let db = MemDatabase::new();
        let tx = db.tx_mut().unwrap();
        let mut cursor = tx.cursor_write::<TxSenders>().unwrap();

        cursor.append(BlockNumIndex::new(1, 0), Address::ZERO).unwrap();
        cursor.append(BlockNumIndex::new(1, 1), Address::ZERO).unwrap();
        let err = cursor.append(BlockNumIndex::new(0, 5), Address::ZERO).unwrap_err();
        assert_matches!(err, DatabaseError::Write(err) if err.operation == DatabaseWriteOperation::CursorAppend);

        let err = cursor.insert(BlockNumIndex::new(1, 1), Address::ZERO).unwrap_err();
        assert_matches!(err, DatabaseError::Write(err) if err.operation == DatabaseWriteOperation::CursorInsert);

        cursor.upsert(BlockNumIndex::new(1, 1), Address::with_last_byte(1)).unwrap();
        assert_eq!(
            tx.get::<TxSenders>(BlockNumIndex::new(1, 1)).unwrap(),
            Some(Address::with_last_byte(1))
        );
        assert_eq!(tx.entries::<TxSenders>().unwrap(), 2);
    }

    #[test]
    fn db_walker_delete_current() {
        let db = MemDatabase::new();
        db.update(|tx| {
            for number in 0..6u64 {
                tx.put::<CanonicalHeaders>(number, B256::ZERO).unwrap();
            }
        })
        .unwrap();

        let tx = db.tx_mut().unwrap();
        let mut cursor = tx.cursor_write::<CanonicalHeaders>().unwrap();
        let mut walker = cursor.walk(Some(3)).unwrap();
        while let Some(entry) = walker.next() {
            entry.unwrap();
            walker.delete_current().unwrap();
        }
        tx.commit().unwrap();

        let tx = db.tx().unwrap();
        let mut cursor = tx.cursor_read::<CanonicalHeaders>().unwrap();
        assert_eq!(cursor.last().unwrap().map(|(k, _)| k), Some(2));
        assert_eq!(tx.entries::<CanonicalHeaders>().unwrap(), 3);
    }

    #[test]
    fn db_walker_past_last_key_is_empty() {
        let db = MemDatabase::new();
        db.update(|tx| {
            for number in 1..=3u64 {
                tx.put::<CanonicalHeaders>(number, B256::ZERO).unwrap();
            }
        })
        .unwrap();

        let tx = db.tx().unwrap();
        let mut cursor = tx.cursor_read::<CanonicalHeaders>().unwrap();
        assert_eq!(cursor.walk(Some(4)).unwrap().count(), 0);

        let mut walker = cursor.walk(Some(3)).unwrap();
        assert_eq!(walker.next().map(|entry| entry.unwrap().0), Some(3));
        assert!(walker.next().is_none());
        assert!(walker.next().is_none());

        let mut cursor = tx.cursor_read::<RawTable<CanonicalHeaders>>().unwrap();
        assert!(cursor.walk(Some(10)).unwrap().next().is_none());
    }

    #[test]
    fn raw_table_exposes_value_bytes() {
        let db = MemDatabase::new();
        db.update(|tx| tx.put::<CanonicalHeaders>(1, B256::repeat_byte(7))).unwrap().unwrap();

        let tx = db.tx().unwrap();
        let raw = tx.get::<RawTable<CanonicalHeaders>>(1).unwrap().unwrap();
        assert_eq!(raw.raw_value(), &[7u8; 32]);
        assert_eq!(raw.value().unwrap(), B256::repeat_byte(7));
    }

    #[test]
    fn delete_and_clear() {
        let db = MemDatabase::new();
        let tx = db.tx_mut().unwrap();
        tx.put::<HeaderNumbers>(B256::repeat_byte(1), 1).unwrap();
        tx.put::<HeaderNumbers>(B256::repeat_byte(2), 2).unwrap();

        assert!(!tx.delete::<HeaderNumbers>(B256::repeat_byte(1), Some(5)).unwrap());
        assert!(tx.delete::<HeaderNumbers>(B256::repeat_byte(1), Some(1)).unwrap());
        assert!(!tx.delete::<HeaderNumbers>(B256::repeat_byte(1), None).unwrap());
        assert_eq!(tx.entries::<HeaderNumbers>().unwrap(), 1);

        tx.clear::<HeaderNumbers>().unwrap();
        assert_eq!(tx.entries::<HeaderNumbers>().unwrap(), 0);
    }
}
