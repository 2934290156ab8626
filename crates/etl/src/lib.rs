//! ETL data collector.
//!
//! This crate is useful for dumping unsorted data into temporary files and iterating on their
//! sorted representation later on.
//!
//! This has multiple uses, such as optimizing database inserts (for Btree based databases) and
//! memory management (as it moves the buffer to disk instead of memory).

#![doc(issue_tracker_base_url = "https://github.com/stagedsync/stagedsync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Arc,
};

use stagedsync_db::{Compress, DatabaseError, DbCursorRW, DbTxMut, Encode, Key, Table, Value};
use tempfile::{NamedTempFile, TempDir};
use tracing::info;

/// Errors raised while collecting or loading data.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// Failed to write or read a temporary file.
    #[error("etl file i/o: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to decode a collected entry or to write it into the destination table.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// How collected entries are written into the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Append every entry after the last key of the table.
    ///
    /// Only valid when all collected keys sort after the existing keys, which always holds for an
    /// empty table.
    Append,
    /// Insert or overwrite every entry.
    Upsert,
}

/// An ETL (extract, transform, load) data collector.
///
/// Data is pushed (extract) to the collector which internally flushes the data in a sorted
/// (transform) manner to files of some specified capacity.
///
/// The data can later be iterated over or loaded into a table (load) in a sorted manner.
#[derive(Debug)]
pub struct Collector<K, V>
where
    K: Encode + Ord,
    V: Compress,
    <K as Encode>::Encoded: std::fmt::Debug,
    <V as Compress>::Compressed: std::fmt::Debug,
{
    /// Directory for temporary file storage
    dir: Arc<TempDir>,
    /// Collection of temporary ETL files
    files: Vec<EtlFile>,
    /// Current buffer size in bytes
    buffer_size_bytes: usize,
    /// Maximum buffer capacity in bytes, triggers flush when reached
    buffer_capacity_bytes: usize,
    /// In-memory buffer storing encoded and compressed key-value pairs
    buffer: Vec<(<K as Encode>::Encoded, <V as Compress>::Compressed)>,
    /// Total number of elements in the collector, including all files
    len: usize,
}

impl<K, V> Collector<K, V>
where
    K: Key,
    V: Value,
    <K as Encode>::Encoded: Ord + std::fmt::Debug,
    <V as Compress>::Compressed: std::fmt::Debug,
{
    /// Create a new collector in a specific temporary directory with some capacity.
    ///
    /// Once the capacity (in bytes) is reached, the data is sorted and flushed to disk.
    pub fn new(dir: Arc<TempDir>, buffer_capacity_bytes: usize) -> Self {
        Self {
            dir,
            buffer_size_bytes: 0,
            files: Vec::new(),
            buffer_capacity_bytes,
            buffer: Vec::new(),
            len: 0,
        }
    }

    /// Returns number of elements currently in the collector.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are currently no elements in the collector.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of files the collector has spilled to disk so far.
    pub fn spilled_files(&self) -> usize {
        self.files.len()
    }

    /// Insert an entry into the collector.
    pub fn insert(&mut self, key: K, value: V) -> std::io::Result<()> {
        let key = key.encode();
        let value = value.compress();
        self.buffer_size_bytes += key.as_ref().len() + value.as_ref().len();
        self.buffer.push((key, value));
        if self.buffer_size_bytes > self.buffer_capacity_bytes {
            self.flush()?;
        }
        self.len += 1;

        Ok(())
    }

    /// Clears the collector, removing all data, including the temporary files.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.files.clear();
        self.buffer_size_bytes = 0;
        self.len = 0;
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.buffer_size_bytes = 0;
        self.buffer.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let mut buf = Vec::with_capacity(self.buffer.len());
        std::mem::swap(&mut buf, &mut self.buffer);
        self.files.push(EtlFile::new(self.dir.path(), buf)?);
        Ok(())
    }

    /// Returns an iterator over the collector data.
    ///
    /// The items of the iterator are sorted across all underlying files.
    ///
    /// # Note
    ///
    /// The keys and values have been pre-encoded, meaning they *SHOULD NOT* be encoded or
    /// compressed again.
    pub fn iter(&mut self) -> std::io::Result<EtlIter<'_>> {
        // Flush the remaining items to disk
        if !self.buffer.is_empty() {
            self.flush()?;
        }

        let mut heap = BinaryHeap::new();
        for (current_id, file) in self.files.iter_mut().enumerate() {
            file.rewind()?;
            if let Some((current_key, current_value)) = file.read_next()? {
                heap.push((Reverse((current_key, current_value)), current_id));
            }
        }

        Ok(EtlIter { heap, files: &mut self.files })
    }

    /// Writes all collected entries into table `T` in ascending key order.
    ///
    /// Logs the loading progress every `log_every_percent` percent of the entries. Returns the
    /// number of entries written.
    pub fn load<T, TX>(
        &mut self,
        tx: &TX,
        mode: LoadMode,
        log_every_percent: u64,
    ) -> Result<usize, EtlError>
    where
        T: Table<Key = K, Value = V>,
        TX: DbTxMut,
    {
        let total = self.len;
        let interval = (total as u64 * log_every_percent.clamp(1, 100) / 100).max(1) as usize;
        let mut cursor = tx.cursor_write::<T>()?;

        for (index, entry) in self.iter()?.enumerate() {
            let (key, value) = entry?;
            if index > 0 && index % interval == 0 {
                info!(
                    target: "etl",
                    table = T::NAME,
                    ?mode,
                    progress = %format!("{:.2}%", (index as f64 / total as f64) * 100.0),
                    "Loading entries"
                );
            }

            let key = K::decode(&key)?;
            let value = V::decompress(&value)?;
            match mode {
                LoadMode::Append => cursor.append(key, value)?,
                LoadMode::Upsert => cursor.upsert(key, value)?,
            }
        }

        Ok(total)
    }
}

/// An iterator over sorted data in a collection of ETL files.
#[derive(Debug)]
pub struct EtlIter<'a> {
    /// Heap managing the next items to be iterated.
    #[allow(clippy::type_complexity)]
    heap: BinaryHeap<(Reverse<(Vec<u8>, Vec<u8>)>, usize)>,
    /// Reference to the vector of ETL files being iterated over.
    files: &'a mut Vec<EtlFile>,
}

impl EtlIter<'_> {
    /// Peeks into the next element
    pub fn peek(&self) -> Option<&(Vec<u8>, Vec<u8>)> {
        self.heap.peek().map(|(Reverse(entry), _)| entry)
    }
}

impl Iterator for EtlIter<'_> {
    type Item = std::io::Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Get the next sorted entry from the heap
        let (Reverse(entry), id) = self.heap.pop()?;

        // Populate the heap with the next entry from the same file
        match self.files[id].read_next() {
            Ok(Some((key, value))) => {
                self.heap.push((Reverse((key, value)), id));
                Some(Ok(entry))
            }
            Ok(None) => Some(Ok(entry)),
            err => err.transpose(),
        }
    }
}

/// A temporary ETL file.
#[derive(Debug)]
struct EtlFile {
    file: BufReader<NamedTempFile>,
    /// Number of entries in the file.
    len: usize,
    /// Number of entries not read yet.
    remaining: usize,
}

impl EtlFile {
    /// Create a new file with the given data (which should be pre-sorted) at the given path.
    ///
    /// The file will be a temporary file.
    fn new<K, V>(dir: &Path, buffer: Vec<(K, V)>) -> std::io::Result<Self>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let file = NamedTempFile::new_in(dir)?;
        let mut w = BufWriter::new(file);
        for entry in &buffer {
            let k = entry.0.as_ref();
            let v = entry.1.as_ref();

            w.write_all(&k.len().to_be_bytes())?;
            w.write_all(&v.len().to_be_bytes())?;
            w.write_all(k)?;
            w.write_all(v)?;
        }

        let mut file = BufReader::new(w.into_inner().map_err(|err| err.into_error())?);
        file.seek(SeekFrom::Start(0))?;
        let len = buffer.len();
        Ok(Self { file, len, remaining: len })
    }

    /// Moves back to the first entry of the file.
    fn rewind(&mut self) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.remaining = self.len;
        Ok(())
    }

    /// Read the next entry in the file.
    fn read_next(&mut self) -> std::io::Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.remaining == 0 {
            return Ok(None)
        }

        let mut buffer_key_length = [0; 8];
        let mut buffer_value_length = [0; 8];

        self.file.read_exact(&mut buffer_key_length)?;
        self.file.read_exact(&mut buffer_value_length)?;

        let key_length = usize::from_be_bytes(buffer_key_length);
        let value_length = usize::from_be_bytes(buffer_value_length);
        let mut key = vec![0; key_length];
        let mut value = vec![0; value_length];

        self.file.read_exact(&mut key)?;
        self.file.read_exact(&mut value)?;

        self.remaining -= 1;

        Ok(Some((key, value)))
    }
}
