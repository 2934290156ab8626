use super::{
    package::{Batch, RecoveredSender, WorkerEvent},
    SenderRecoverer, StopHandle,
};
use crate::StageError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::trace;

/// A recovery thread owned by the farm.
///
/// The worker receives batches over its own job channel and reports every processed batch on the
/// completion channel shared by all workers of the farm. Dropping the worker closes its job
/// channel and joins the thread.
#[derive(Debug)]
pub(crate) struct Worker {
    id: usize,
    jobs: Option<Sender<Batch>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a new worker thread.
    pub(crate) fn spawn<R: SenderRecoverer>(
        id: usize,
        recoverer: Arc<R>,
        stop: StopHandle,
        events: Sender<WorkerEvent>,
    ) -> std::io::Result<Self> {
        let (jobs, job_rx) = unbounded();
        let handle = thread::Builder::new()
            .name(format!("sender-recovery-{id}"))
            .spawn(move || run(id, &*recoverer, &stop, job_rx, events))?;
        Ok(Self { id, jobs: Some(jobs), handle: Some(handle) })
    }

    pub(crate) const fn id(&self) -> usize {
        self.id
    }

    /// Hands a batch to the worker.
    pub(crate) fn dispatch(&self, batch: Batch) -> Result<(), StageError> {
        let sent = self.jobs.as_ref().map(|jobs| jobs.send(batch).is_ok()).unwrap_or_default();
        if sent {
            Ok(())
        } else {
            Err(StageError::Unexpected(format!("recovery worker {} is gone", self.id)))
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // closing the job channel ends the worker loop
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<R: SenderRecoverer>(
    id: usize,
    recoverer: &R,
    stop: &StopHandle,
    jobs: Receiver<Batch>,
    events: Sender<WorkerEvent>,
) {
    while let Ok(batch) = jobs.recv() {
        let (first_block, last_block) = batch.block_range().unwrap_or_default();
        trace!(target: "sync::recovery", worker = id, batch = batch.id, first_block, last_block, "Recovering batch");

        let outcome = catch_unwind(AssertUnwindSafe(|| recover_batch(recoverer, stop, &batch)))
            .unwrap_or_else(|payload| Err(StageError::from_panic(payload)));

        let event =
            WorkerEvent { worker_id: id, batch_id: batch.id, first_block, last_block, outcome };
        if events.send(event).is_err() {
            // the farm is gone
            break
        }
    }
}

/// Recovers the sender of every package of the batch, stopping at the first failure.
fn recover_batch<R: SenderRecoverer>(
    recoverer: &R,
    stop: &StopHandle,
    batch: &Batch,
) -> Result<Vec<RecoveredSender>, StageError> {
    let mut senders = Vec::with_capacity(batch.len());
    for package in &batch.packages {
        if stop.is_stopped() {
            return Err(StageError::Aborted)
        }
        let sender = recoverer.recover(&package.tx).ok_or(StageError::InvalidTransaction {
            block: package.block,
            tx_index: package.tx_index,
        })?;
        senders.push(RecoveredSender {
            block: package.block,
            tx_index: package.tx_index,
            last_in_block: package.last_in_block,
            sender,
        });
    }
    Ok(senders)
}
