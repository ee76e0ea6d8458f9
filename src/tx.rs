//! Legacy transaction encoding and EIP-155 signing
//!
//! Only the legacy (pre-typed-envelope) transaction format is produced:
//! every target network accepts it, and the original product never set
//! EIP-1559 fee fields. The RLP encoder below covers exactly what a legacy
//! transaction needs: byte strings, minimal big-endian integers, and lists.

use sha3::{Digest, Keccak256};

use crate::error::Result;
use crate::keys::KeyMaterial;

/// A caller-supplied transfer request before validation and fee resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    /// Recipient address string, validated by the session
    pub to: String,
    /// Decimal amount in whole currency units ("1.5")
    pub amount: String,
}

/// A fully resolved transaction, ready to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: [u8; 20],
    /// Value in wei
    pub value: u128,
    pub nonce: u64,
    /// Gas price in wei
    pub gas_price: u128,
    pub gas_limit: u64,
    pub data: Vec<u8>,
    /// Replay-protection chain id (EIP-155)
    pub chain_id: u64,
}

impl TransactionRequest {
    /// The digest a signature commits to: Keccak-256 over the RLP of
    /// `[nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]`
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut payload = Vec::new();
        self.encode_fields(&mut payload);
        rlp::encode_uint(self.chain_id as u128, &mut payload);
        rlp::encode_bytes(&[], &mut payload);
        rlp::encode_bytes(&[], &mut payload);
        Keccak256::digest(rlp::encode_list(&payload)).into()
    }

    /// RLP-encode the signed transaction with its signature components
    fn rlp_signed(&self, v: u64, r: &[u8], s: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        self.encode_fields(&mut payload);
        rlp::encode_uint(v as u128, &mut payload);
        rlp::encode_bytes(strip_leading_zeros(r), &mut payload);
        rlp::encode_bytes(strip_leading_zeros(s), &mut payload);
        rlp::encode_list(&payload)
    }

    fn encode_fields(&self, out: &mut Vec<u8>) {
        rlp::encode_uint(self.nonce as u128, out);
        rlp::encode_uint(self.gas_price, out);
        rlp::encode_uint(self.gas_limit as u128, out);
        rlp::encode_bytes(&self.to, out);
        rlp::encode_uint(self.value, out);
        rlp::encode_bytes(&self.data, out);
    }
}

/// Sign a transaction with EIP-155 replay protection and return the raw
/// bytes ready for `eth_sendRawTransaction`.
pub fn sign(key: &KeyMaterial, request: &TransactionRequest) -> Result<Vec<u8>> {
    let digest = request.signing_hash();
    let (signature, recovery_id) = key.sign_prehash(&digest)?;
    let v = request.chain_id * 2 + 35 + u64::from(recovery_id.to_byte());
    let bytes = signature.to_bytes();
    let (r, s) = bytes.as_slice().split_at(32);
    Ok(request.rlp_signed(v, r, s))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

mod rlp {
    /// Encode a byte string. A single byte below 0x80 is its own encoding.
    pub fn encode_bytes(payload: &[u8], out: &mut Vec<u8>) {
        if payload.len() == 1 && payload[0] < 0x80 {
            out.push(payload[0]);
        } else {
            encode_header(payload.len(), 0x80, out);
            out.extend_from_slice(payload);
        }
    }

    /// Encode an unsigned integer as its minimal big-endian byte string
    pub fn encode_uint(value: u128, out: &mut Vec<u8>) {
        let bytes = value.to_be_bytes();
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        encode_bytes(&bytes[start..], out);
    }

    /// Wrap an already-encoded payload as a list
    pub fn encode_list(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 9);
        encode_header(payload.len(), 0xc0, &mut out);
        out.extend_from_slice(payload);
        out
    }

    fn encode_header(len: usize, offset: u8, out: &mut Vec<u8>) {
        if len <= 55 {
            out.push(offset + len as u8);
        } else {
            let len_bytes = len.to_be_bytes();
            let start = len_bytes.iter().position(|&b| b != 0).unwrap_or(0);
            out.push(offset + 55 + (len_bytes.len() - start) as u8);
            out.extend_from_slice(&len_bytes[start..]);
        }
    }
}
