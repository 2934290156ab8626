use crate::{keccak256, Address, Bytes, TxHash, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

pub(crate) mod util;

/// An unsigned legacy transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
pub struct Transaction {
    /// Chain id the transaction is bound to.
    pub chain_id: u64,
    /// A scalar value equal to the number of transactions sent by the sender.
    pub nonce: u64,
    /// Price paid per unit of gas.
    pub gas_price: u128,
    /// Maximum amount of gas the transaction may use.
    pub gas_limit: u64,
    /// Recipient of the transaction.
    pub to: Address,
    /// Value transferred to the recipient.
    pub value: U256,
    /// Call input.
    pub input: Bytes,
}

impl Transaction {
    /// Calculate the hash that is signed by the sender.
    pub fn signature_hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }
}

/// The r, s values and parity of an ECDSA signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
pub struct Signature {
    /// The R field of the signature; the point on the curve.
    pub r: U256,
    /// The S field of the signature; the point on the curve.
    pub s: U256,
    /// yParity: Signature Y parity.
    pub odd_y_parity: bool,
}

impl Signature {
    /// Returns the signature as a 65 byte compact array: `r || s || recovery id`.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut sig = [0u8; 65];
        sig[0..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        sig[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        sig[64] = self.odd_y_parity as u8;
        sig
    }

    /// Recover signer address from message hash.
    ///
    /// Returns `None` if the signature is malformed or does not recover to a public key.
    pub fn recover_signer(&self, hash: B256) -> Option<Address> {
        util::secp256k1::recover_signer(&self.to_bytes(), &hash.0).ok()
    }
}

/// A transaction together with its signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
pub struct TransactionSigned {
    /// Raw transaction info
    pub transaction: Transaction,
    /// The transaction signature values
    pub signature: Signature,
}

impl TransactionSigned {
    /// Create a new signed transaction from a transaction and its signature.
    pub const fn from_transaction_and_signature(
        transaction: Transaction,
        signature: Signature,
    ) -> Self {
        Self { transaction, signature }
    }

    /// Transaction hash, calculated over the whole signed envelope.
    pub fn hash(&self) -> TxHash {
        keccak256(alloy_rlp::encode(self))
    }

    /// Recover signer from signature and hash.
    ///
    /// Returns `None` if the transaction's signature is invalid.
    pub fn recover_signer(&self) -> Option<Address> {
        self.signature.recover_signer(self.transaction.signature_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{public_key_to_address, sign_message};
    use alloy_rlp::Decodable;
    use secp256k1::{KeyPair, SECP256K1};

    #[test]
    fn sign_and_recover() {
        let key_pair = KeyPair::new(SECP256K1, &mut rand::thread_rng());
        let signer = public_key_to_address(key_pair.public_key());

        let transaction = Transaction {
            chain_id: 1,
            nonce: 3,
            gas_price: 1_000,
            gas_limit: 21_000,
            to: Address::with_last_byte(0x42),
            value: U256::from(10u64),
            input: Bytes::default(),
        };
        let signature =
            sign_message(B256::from_slice(&key_pair.secret_bytes()), transaction.signature_hash())
                .unwrap();
        let signed = TransactionSigned::from_transaction_and_signature(transaction, signature);

        assert_eq!(signed.recover_signer(), Some(signer));

        let encoded = alloy_rlp::encode(&signed);
        let decoded = TransactionSigned::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, signed);
        assert_eq!(decoded.hash(), signed.hash());
    }

    #[test]
    fn tampered_signature_does_not_recover_signer() {
        let key_pair = KeyPair::new(SECP256K1, &mut rand::thread_rng());
        let signer = public_key_to_address(key_pair.public_key());

        let transaction = Transaction { nonce: 1, ..Default::default() };
        let signature =
            sign_message(B256::from_slice(&key_pair.secret_bytes()), transaction.signature_hash())
                .unwrap();
        let mut signed = TransactionSigned::from_transaction_and_signature(transaction, signature);
        signed.transaction.nonce = 2;

        assert_ne!(signed.recover_signer(), Some(signer));

        signed.signature = Signature::default();
        assert_eq!(signed.recover_signer(), None);
    }
}
