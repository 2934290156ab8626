//! Concurrent recovery of transaction senders.
//!
//! The [`RecoveryFarm`] splits the transactions of a block range into batches and hands them to a
//! bounded pool of worker threads. Workers may finish in any order; the farm holds a finished
//! batch until every batch dispatched before it has been written, so senders are always persisted
//! in ascending (block, index) order.
//!
//! Cancellation is cooperative through a [`StopHandle`]. Batches that were already written stay
//! written; the rest are dropped as a whole.

use crate::StageError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use stagedsync_config::SenderRecoveryConfig;
use stagedsync_db::{
    tables::{self, models::BlockNumIndex},
    DbCursorRW, DbTx, DbTxMut,
};
use stagedsync_primitives::{Address, BlockNumHash, BlockNumber, TransactionSigned};
use std::{
    collections::BTreeMap,
    ops::RangeInclusive,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::*;

mod package;
mod worker;

pub use package::RecoveryPackage;
use package::{Batch, HeaderInfo, WorkerEvent};
use worker::Worker;

/// Recovers the signer of a transaction.
pub trait SenderRecoverer: Send + Sync + 'static {
    /// Returns the sender of the transaction, or `None` if the signature is invalid.
    fn recover(&self, tx: &TransactionSigned) -> Option<Address>;
}

/// Recovers senders from secp256k1 signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Recoverer;

impl SenderRecoverer for Secp256k1Recoverer {
    fn recover(&self, tx: &TransactionSigned) -> Option<Address> {
        tx.recover_signer()
    }
}

/// A cooperative cancellation flag shared by the farm, its workers and the caller.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the recovery to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous stop request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sizing of a [`RecoveryFarm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// The maximum number of packages in a batch.
    pub batch_size: usize,
    /// The maximum number of worker threads.
    pub workers: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        SenderRecoveryConfig::default().into()
    }
}

impl From<SenderRecoveryConfig> for RecoveryConfig {
    fn from(config: SenderRecoveryConfig) -> Self {
        Self { batch_size: config.batch_size.max(1), workers: config.workers() }
    }
}

/// Counters of a recovery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Number of batches handed to workers.
    pub batches_dispatched: u64,
    /// Number of batches whose senders were written.
    pub batches_harvested: u64,
    /// Number of senders written.
    pub transactions: u64,
    /// The highest block whose senders are all written.
    pub highest_complete_block: BlockNumber,
}

/// How a recovery run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Every sender of the range was written.
    Completed(RecoveryStats),
    /// The run was stopped; only the senders up to the reported block are written.
    Aborted(RecoveryStats),
}

impl RecoveryOutcome {
    /// The counters of the run.
    pub const fn stats(&self) -> &RecoveryStats {
        match self {
            Self::Completed(stats) | Self::Aborted(stats) => stats,
        }
    }
}

/// Recovers transaction senders with a pool of worker threads.
#[derive(Debug)]
pub struct RecoveryFarm<R = Secp256k1Recoverer> {
    config: RecoveryConfig,
    recoverer: Arc<R>,
    stop: StopHandle,
}

impl<R: SenderRecoverer> RecoveryFarm<R> {
    /// Creates a new farm.
    ///
    /// Both the batch size and the worker count are raised to at least one.
    pub fn new(config: RecoveryConfig, recoverer: Arc<R>, stop: StopHandle) -> Self {
        let config =
            RecoveryConfig { batch_size: config.batch_size.max(1), workers: config.workers.max(1) };
        Self { config, recoverer, stop }
    }

    /// Returns the handle that cancels the farm.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Recovers the senders of all transactions of the blocks in `range` and writes them to
    /// [`TxSenders`][tables::TxSenders].
    ///
    /// The senders are appended, so the table must not hold entries at or above the start of the
    /// range.
    pub fn run<TX>(
        &self,
        tx: &TX,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<RecoveryOutcome, StageError>
    where
        TX: DbTx + DbTxMut,
    {
        let (start, end) = range.clone().into_inner();
        if start > end {
            return Err(StageError::InvalidRange { from: start, to: end })
        }

        let headers = scan_headers(tx, range)?;
        let mut run = FarmRun::new(self, start.saturating_sub(1));

        info!(
            target: "sync::recovery",
            start,
            end,
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            "Recovering senders"
        );

        match run.process(tx, headers) {
            Ok(()) => {
                run.stats.highest_complete_block = end;
                info!(
                    target: "sync::recovery",
                    batches = run.stats.batches_harvested,
                    transactions = run.stats.transactions,
                    "Senders recovered"
                );
                Ok(RecoveryOutcome::Completed(run.stats))
            }
            Err(StageError::Aborted) => {
                warn!(
                    target: "sync::recovery",
                    harvested = run.stats.batches_harvested,
                    dispatched = run.stats.batches_dispatched,
                    highest_complete_block = run.stats.highest_complete_block,
                    "Sender recovery aborted"
                );
                Ok(RecoveryOutcome::Aborted(run.stats))
            }
            Err(error) => Err(error),
        }
    }
}

/// Collects the canonical blocks of the range together with their body indices.
fn scan_headers<TX: DbTx>(
    tx: &TX,
    range: RangeInclusive<BlockNumber>,
) -> Result<Vec<HeaderInfo>, StageError> {
    range
        .map(|number| {
            let hash = tx
                .get::<tables::CanonicalHeaders>(number)?
                .ok_or(StageError::InvalidBlock { block: number })?;
            let body = tx
                .get::<tables::BlockBodies>(BlockNumHash::new(number, hash))?
                .ok_or(StageError::InvalidBlock { block: number })?;
            Ok(HeaderInfo { number, body })
        })
        .collect()
}

/// The state of a single [`RecoveryFarm::run`].
struct FarmRun<'a, R> {
    farm: &'a RecoveryFarm<R>,
    workers: Vec<Worker>,
    idle: Vec<usize>,
    in_flight: usize,
    events: Sender<WorkerEvent>,
    completions: Receiver<WorkerEvent>,
    /// Finished batches waiting for the batches before them.
    finished: BTreeMap<u64, WorkerEvent>,
    next_harvest: u64,
    stats: RecoveryStats,
}

impl<'a, R: SenderRecoverer> FarmRun<'a, R> {
    fn new(farm: &'a RecoveryFarm<R>, progress: BlockNumber) -> Self {
        let (events, completions) = unbounded();
        Self {
            farm,
            workers: Vec::new(),
            idle: Vec::new(),
            in_flight: 0,
            events,
            completions,
            finished: BTreeMap::new(),
            next_harvest: 0,
            stats: RecoveryStats { highest_complete_block: progress, ..Default::default() },
        }
    }

    /// Packs the transactions of the blocks into batches, dispatches them and waits for all of
    /// them to be written.
    ///
    /// Returns [`StageError::Aborted`] once a stop is observed.
    fn process<TX: DbTx + DbTxMut>(
        &mut self,
        tx: &TX,
        headers: Vec<HeaderInfo>,
    ) -> Result<(), StageError> {
        let batch_size = self.farm.config.batch_size;
        let mut batch = Batch::new(0);

        for header in headers {
            self.check_stop()?;

            let count = header.body.tx_count;
            for (index, tx_number) in header.body.tx_id_range().enumerate() {
                let transaction = tx
                    .get::<tables::Transactions>(tx_number)?
                    .ok_or(StageError::InvalidBlock { block: header.number })?;
                batch.packages.push(RecoveryPackage {
                    block: header.number,
                    tx_index: index as u32,
                    last_in_block: index as u64 + 1 == count,
                    tx: transaction,
                });

                if batch.len() >= batch_size {
                    let next = Batch::new(batch.id + 1);
                    self.dispatch(tx, std::mem::replace(&mut batch, next))?;
                    self.check_stop()?;
                }
            }
        }
        if !batch.is_empty() {
            self.dispatch(tx, batch)?;
        }

        self.drain(tx)
    }

    fn check_stop(&self) -> Result<(), StageError> {
        if self.farm.stop.is_stopped() {
            return Err(StageError::Aborted)
        }
        Ok(())
    }

    /// Hands the batch to an idle worker, spawning one if the pool is not full. Otherwise waits
    /// for a worker to finish first.
    fn dispatch<TX: DbTxMut>(&mut self, tx: &TX, batch: Batch) -> Result<(), StageError> {
        let worker = loop {
            if let Some(worker) = self.idle.pop() {
                break worker
            }
            if self.workers.len() < self.farm.config.workers {
                let id = self.workers.len();
                self.workers.push(Worker::spawn(
                    id,
                    self.farm.recoverer.clone(),
                    self.farm.stop.clone(),
                    self.events.clone(),
                )?);
                debug!(target: "sync::recovery", worker = id, "Spawned recovery worker");
                break id
            }
            self.wait(tx)?;
        };

        trace!(
            target: "sync::recovery",
            worker = self.workers[worker].id(),
            batch = batch.id,
            "Dispatching batch"
        );
        self.workers[worker].dispatch(batch)?;
        self.in_flight += 1;
        self.stats.batches_dispatched += 1;
        Ok(())
    }

    /// Waits for all dispatched batches.
    fn drain<TX: DbTxMut>(&mut self, tx: &TX) -> Result<(), StageError> {
        while self.in_flight > 0 {
            self.wait(tx)?;
        }
        Ok(())
    }

    /// Blocks until a worker finishes a batch, then writes every batch whose turn has come.
    fn wait<TX: DbTxMut>(&mut self, tx: &TX) -> Result<(), StageError> {
        let event = self
            .completions
            .recv()
            .map_err(|_| StageError::Unexpected("recovery workers are gone".to_string()))?;
        self.in_flight -= 1;
        self.idle.push(event.worker_id);

        if let Err(error) = &event.outcome {
            debug!(
                target: "sync::recovery",
                batch = event.batch_id,
                first_block = event.first_block,
                last_block = event.last_block,
                %error,
                "Batch failed"
            );
        }
        self.finished.insert(event.batch_id, event);
        self.harvest(tx)
    }

    /// Writes finished batches in dispatch order.
    fn harvest<TX: DbTxMut>(&mut self, tx: &TX) -> Result<(), StageError> {
        // an aborted batch stops the harvest but does not hide a failure behind it
        while self
            .finished
            .get(&self.next_harvest)
            .is_some_and(|event| !matches!(event.outcome, Err(StageError::Aborted)))
        {
            let Some(event) = self.finished.remove(&self.next_harvest) else { break };
            let senders = event.outcome?;
            let mut cursor = tx.cursor_write::<tables::TxSenders>()?;
            for recovered in &senders {
                let key = BlockNumIndex::new(recovered.block, recovered.tx_index);
                cursor.append(key, recovered.sender)?;
            }
            if let Some(last) = senders.last() {
                self.stats.highest_complete_block =
                    if last.last_in_block { last.block } else { last.block.saturating_sub(1) };
            }

            self.stats.transactions += senders.len() as u64;
            self.stats.batches_harvested += 1;
            self.next_harvest += 1;
            debug!(
                target: "sync::recovery",
                batch = event.batch_id,
                highest_complete_block = self.stats.highest_complete_block,
                transactions = self.stats.transactions,
                workers = self.workers.len(),
                "Harvested batch"
            );
        }

        // a failed batch fails the run even when batches ahead of it are still pending
        let failed = self.finished.iter().find_map(|(id, event)| match &event.outcome {
            Ok(_) | Err(StageError::Aborted) => None,
            Err(_) => Some(*id),
        });
        if let Some(event) = failed.and_then(|id| self.finished.remove(&id)) {
            return event.outcome.map(drop)
        }
        if self.finished.values().any(|event| matches!(event.outcome, Err(StageError::Aborted))) {
            return Err(StageError::Aborted)
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StopAtTransaction, TestStageDB};
    use assert_matches::assert_matches;
    use stagedsync_db::{Database, MemDatabase};
    use stagedsync_primitives::{
        test_utils::generators::{
            random_block, random_block_range, random_invalid_signed_tx, random_signed_tx,
        },
        SealedBlock, B256,
    };

    fn run_farm<R: SenderRecoverer>(
        db: &TestStageDB,
        farm: &RecoveryFarm<R>,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<RecoveryOutcome, StageError> {
        let factory: Arc<MemDatabase> = db.factory();
        let tx = factory.tx_mut()?;
        let outcome = farm.run(&tx, range);
        // aborted runs keep what was harvested
        if outcome.is_ok() {
            tx.commit()?;
        }
        outcome
    }

    fn serial_senders(blocks: &[SealedBlock]) -> Vec<(BlockNumIndex, Address)> {
        blocks
            .iter()
            .flat_map(|block| {
                block.body.iter().enumerate().map(move |(index, tx)| {
                    (BlockNumIndex::new(block.number(), index as u32), tx.recover_signer().unwrap())
                })
            })
            .collect()
    }

    fn farm(batch_size: usize, workers: usize) -> RecoveryFarm {
        RecoveryFarm::new(
            RecoveryConfig { batch_size, workers },
            Arc::new(Secp256k1Recoverer),
            StopHandle::default(),
        )
    }

    #[test]
    fn dispatches_ceil_of_transactions_over_batch_size() {
        let db = TestStageDB::default();
        let blocks = random_block_range(1..=20, B256::ZERO, 4);
        db.insert_blocks(blocks.iter()).unwrap();
        let transactions = blocks.iter().map(|block| block.body.len()).sum::<usize>() as u64;

        for (batch_size, workers) in [(1, 1), (3, 2), (7, 4), (1000, 3)] {
            db.commit(|tx| tx.clear::<tables::TxSenders>()).unwrap();
            let outcome = run_farm(&db, &farm(batch_size, workers), 1..=20).unwrap();

            let stats = *outcome.stats();
            assert_matches!(outcome, RecoveryOutcome::Completed(_));
            assert_eq!(stats.batches_dispatched, transactions.div_ceil(batch_size as u64));
            assert_eq!(stats.batches_harvested, stats.batches_dispatched);
            assert_eq!(stats.transactions, transactions);
            assert_eq!(stats.highest_complete_block, 20);
        }
    }

    #[test]
    fn matches_serial_recovery() {
        stagedsync_tracing::init_test_tracing();
        let db = TestStageDB::default();
        let blocks = random_block_range(1..=30, B256::ZERO, 6);
        db.insert_blocks(blocks.iter()).unwrap();

        run_farm(&db, &farm(5, 4), 1..=30).unwrap();

        assert_eq!(db.table::<tables::TxSenders>().unwrap(), serial_senders(&blocks));
    }

    #[test]
    fn empty_range_of_blocks_completes() {
        let db = TestStageDB::default();
        let blocks = (1..=3).map(|n| random_block(n, None, Some(0), 0)).collect::<Vec<_>>();
        db.insert_blocks(blocks.iter()).unwrap();

        let outcome = run_farm(&db, &farm(2, 2), 1..=3).unwrap();
        assert_eq!(
            outcome,
            RecoveryOutcome::Completed(RecoveryStats {
                highest_complete_block: 3,
                ..Default::default()
            })
        );
        assert!(db.table_is_empty::<tables::TxSenders>().unwrap());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let db = TestStageDB::default();
        assert_matches!(
            run_farm(&db, &farm(2, 2), 5..=4),
            Err(StageError::InvalidRange { from: 5, to: 4 })
        );
    }

    #[test]
    fn missing_block_is_reported() {
        let db = TestStageDB::default();
        db.insert_blocks(random_block_range(1..=2, B256::ZERO, 2).iter()).unwrap();

        assert_matches!(
            run_farm(&db, &farm(2, 2), 1..=3),
            Err(StageError::InvalidBlock { block: 3 })
        );
    }

    #[test]
    fn invalid_signature_fails_the_run() {
        let db = TestStageDB::default();
        let mut blocks = random_block_range(1..=4, B256::ZERO, 0);
        for block in &mut blocks {
            block.body = (0..3).map(|_| random_signed_tx().0).collect();
        }
        blocks[2].body[1] = random_invalid_signed_tx();
        db.insert_blocks(blocks.iter()).unwrap();

        assert_matches!(
            run_farm(&db, &farm(2, 3), 1..=4),
            Err(StageError::InvalidTransaction { block: 3, tx_index: 1 })
        );
        assert!(db.table_is_empty::<tables::TxSenders>().unwrap());
    }

    #[test]
    fn stop_keeps_harvested_batches_only() {
        let db = TestStageDB::default();
        let blocks = (1..=3).map(|n| random_block(n, None, Some(2), 2)).collect::<Vec<_>>();
        db.insert_blocks(blocks.iter()).unwrap();

        let stop = StopHandle::default();
        let recoverer = StopAtTransaction { target: blocks[1].body[0].hash(), stop: stop.clone() };
        let config = RecoveryConfig { batch_size: 2, workers: 1 };
        let farm = RecoveryFarm::new(config, Arc::new(recoverer), stop);

        let outcome = run_farm(&db, &farm, 1..=3).unwrap();
        assert_matches!(outcome, RecoveryOutcome::Aborted(_));
        assert_eq!(outcome.stats().batches_harvested, 1);
        assert_eq!(outcome.stats().highest_complete_block, 1);
        assert_eq!(db.table::<tables::TxSenders>().unwrap(), serial_senders(&blocks[..1]));
        assert!(farm.stop_handle().is_stopped());
    }

    #[test]
    fn stop_before_run_writes_nothing() {
        let db = TestStageDB::default();
        db.insert_blocks(random_block_range(1..=3, B256::ZERO, 2).iter()).unwrap();
        let farm = farm(2, 2);
        farm.stop_handle().stop();

        let outcome = run_farm(&db, &farm, 1..=3).unwrap();
        assert_eq!(
            outcome,
            RecoveryOutcome::Aborted(RecoveryStats {
                highest_complete_block: 0,
                ..Default::default()
            })
        );
        assert!(db.table_is_empty::<tables::TxSenders>().unwrap());
    }

    #[test]
    fn zero_sized_config_still_recovers() {
        let db = TestStageDB::default();
        let blocks = (1..=2).map(|n| random_block(n, None, Some(2), 2)).collect::<Vec<_>>();
        db.insert_blocks(blocks.iter()).unwrap();

        let outcome = run_farm(&db, &farm(0, 0), 1..=2).unwrap();

        let stats = *outcome.stats();
        assert_matches!(outcome, RecoveryOutcome::Completed(_));
        assert_eq!(stats.batches_dispatched, 4);
        assert_eq!(stats.highest_complete_block, 2);
        assert_eq!(db.table::<tables::TxSenders>().unwrap(), serial_senders(&blocks));
    }

    #[test]
    fn config_from_stage_config() {
        let config =
            RecoveryConfig::from(SenderRecoveryConfig { batch_size: 0, max_workers: Some(3) });
        assert_eq!(config, RecoveryConfig { batch_size: 1, workers: 3 });
    }
}
