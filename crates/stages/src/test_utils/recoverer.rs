use crate::recovery::{SenderRecoverer, StopHandle};
use stagedsync_primitives::{Address, TransactionSigned, TxHash};

/// A recoverer that requests a stop while recovering a specific transaction.
///
/// The transaction itself is still recovered.
#[derive(Debug)]
pub(crate) struct StopAtTransaction {
    pub(crate) target: TxHash,
    pub(crate) stop: StopHandle,
}

impl SenderRecoverer for StopAtTransaction {
    fn recover(&self, tx: &TransactionSigned) -> Option<Address> {
        if tx.hash() == self.target {
            self.stop.stop();
        }
        tx.recover_signer()
    }
}
