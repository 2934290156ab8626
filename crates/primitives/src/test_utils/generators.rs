use crate::{
    public_key_to_address, sign_message, Address, BlockHash, Bytes, Header, SealedBlock,
    SealedHeader, Transaction, TransactionSigned, B256, U256,
};
use rand::{thread_rng, Rng};
use secp256k1::{KeyPair, SECP256K1};
use std::ops::RangeInclusive;

/// Generates a range of random [`SealedHeader`]s.
///
/// The parent hash of the first header in the result will be equal to `head`.
pub fn random_header_range(range: RangeInclusive<u64>, head: B256) -> Vec<SealedHeader> {
    let mut headers: Vec<SealedHeader> = Vec::with_capacity(range.clone().count());
    for number in range {
        let parent = headers.last().map(|h| h.hash).unwrap_or(head);
        headers.push(random_header(number, Some(parent)));
    }
    headers
}

/// Generate a random [`SealedHeader`].
pub fn random_header(number: u64, parent: Option<B256>) -> SealedHeader {
    Header {
        number,
        parent_hash: parent.unwrap_or_default(),
        timestamp: thread_rng().gen(),
        transactions_root: B256::random(),
    }
    .seal_slow()
}

/// Generates a random legacy [`Transaction`].
pub fn random_tx() -> Transaction {
    let mut rng = thread_rng();
    Transaction {
        chain_id: 1,
        nonce: rng.gen::<u16>().into(),
        gas_price: rng.gen::<u16>().into(),
        gas_limit: rng.gen::<u16>().into(),
        to: Address::random(),
        value: U256::from(rng.gen::<u16>()),
        input: Bytes::default(),
    }
}

/// Generates a random legacy [`Transaction`] that is signed by a fresh key pair.
///
/// Returns the signed transaction together with the address of the signer.
pub fn random_signed_tx() -> (TransactionSigned, Address) {
    let key_pair = KeyPair::new(SECP256K1, &mut thread_rng());
    let signer = public_key_to_address(key_pair.public_key());
    let tx = random_tx();
    let signature = sign_message(B256::from_slice(&key_pair.secret_bytes()), tx.signature_hash())
        .expect("fresh key pair signs");
    (TransactionSigned::from_transaction_and_signature(tx, signature), signer)
}

/// Generates a signed transaction whose signature does not recover to any public key.
pub fn random_invalid_signed_tx() -> TransactionSigned {
    TransactionSigned::from_transaction_and_signature(random_tx(), Default::default())
}

/// Generate a random block filled with signed transactions.
///
/// The number of transactions is random in `0..=max_tx` unless `tx_count` is provided.
pub fn random_block(
    number: u64,
    parent: Option<BlockHash>,
    tx_count: Option<u8>,
    max_tx: u8,
) -> SealedBlock {
    let count = tx_count.unwrap_or_else(|| thread_rng().gen_range(0..=max_tx));
    let body = (0..count).map(|_| random_signed_tx().0).collect();
    SealedBlock { header: random_header(number, parent), body }
}

/// Generate a range of random blocks.
///
/// The parent hash of the first block in the result will be equal to `head`, and every later
/// block links to the hash of the one before it.
pub fn random_block_range(range: RangeInclusive<u64>, head: B256, max_tx: u8) -> Vec<SealedBlock> {
    let mut blocks: Vec<SealedBlock> = Vec::with_capacity(range.clone().count());
    for number in range {
        let parent = blocks.last().map(|b| b.hash()).unwrap_or(head);
        blocks.push(random_block(number, Some(parent), None, max_tx));
    }
    blocks
}
