use stagedsync_db::{Database, DatabaseError, DbTx};
use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
};

/// Who commits the transaction held by a [`TxnManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    /// Every [`TxnManager::commit`] publishes the writes and opens a fresh transaction.
    Managed,
    /// [`TxnManager::commit`] is deferred; only [`TxnManager::finish`] publishes the writes.
    External,
}

/// A container for the write transaction a stage works on, that opens a new inner transaction
/// when the current one is committed.
///
/// Committing consumes a database transaction, so stages that only hold a reference go through
/// this container to commit and continue working.
pub struct TxnManager<'db, DB: Database> {
    /// A handle to the DB.
    db: &'db DB,
    tx: Option<DB::TXMut>,
    mode: TxnMode,
}

impl<DB: Database> Debug for TxnManager<'_, DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnManager").field("mode", &self.mode).finish_non_exhaustive()
    }
}

impl<DB: Database> Deref for TxnManager<'_, DB> {
    type Target = DB::TXMut;

    /// Dereference as the inner transaction.
    ///
    /// # Panics
    ///
    /// Panics if an inner transaction does not exist. This is only the case after reopening a
    /// transaction failed, in which case the error was already returned to the caller.
    fn deref(&self) -> &Self::Target {
        self.tx.as_ref().expect("Tried getting a reference to a non-existent transaction")
    }
}

impl<DB: Database> DerefMut for TxnManager<'_, DB> {
    /// Dereference as a mutable reference to the inner transaction.
    ///
    /// # Panics
    ///
    /// Panics if an inner transaction does not exist. This is only the case after reopening a
    /// transaction failed, in which case the error was already returned to the caller.
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tx.as_mut().expect("Tried getting a mutable reference to a non-existent transaction")
    }
}

impl<'db, DB: Database> TxnManager<'db, DB> {
    /// Create a managed container, opening a new inner transaction.
    pub fn new(db: &'db DB) -> Result<Self, DatabaseError> {
        Ok(Self { db, tx: Some(db.tx_mut()?), mode: TxnMode::Managed })
    }

    /// Create an external container, opening a new inner transaction that is only committed by
    /// [`TxnManager::finish`].
    pub fn external(db: &'db DB) -> Result<Self, DatabaseError> {
        Ok(Self { db, tx: Some(db.tx_mut()?), mode: TxnMode::External })
    }

    /// Returns the commit mode of the container.
    pub const fn mode(&self) -> TxnMode {
        self.mode
    }

    /// Accessor to the internal Database
    pub const fn db(&self) -> &'db DB {
        self.db
    }

    /// Commit the current inner transaction and open a new one.
    ///
    /// In [`TxnMode::External`] mode this does nothing and returns `false`.
    pub fn commit(&mut self) -> Result<bool, DatabaseError> {
        if self.mode == TxnMode::External {
            return Ok(false)
        }
        let success = if let Some(tx) = self.tx.take() { tx.commit()? } else { false };
        self.tx = Some(self.db.tx_mut()?);
        Ok(success)
    }

    /// Drops the uncommitted writes of the current inner transaction and opens a new one.
    pub fn abort(&mut self) -> Result<(), DatabaseError> {
        if let Some(tx) = self.tx.take() {
            tx.abort();
        }
        self.tx = Some(self.db.tx_mut()?);
        Ok(())
    }

    /// Commits the inner transaction regardless of the mode, consuming the container.
    pub fn finish(mut self) -> Result<bool, DatabaseError> {
        match self.tx.take() {
            Some(tx) => tx.commit(),
            None => Ok(false),
        }
    }
}
