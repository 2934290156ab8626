/// The block hashes stage.
mod block_hashes;
/// The sender recovery stage.
mod senders;

pub use block_hashes::BlockHashesStage;
pub use senders::SendersStage;
