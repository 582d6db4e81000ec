//! Deterministic binary encoding for transactions, headers and account
//! commitments.
//!
//! All numeric values are little-endian.
//!
//! Encoding format:
//! - Fixed-size fields (Hash, Address, u64, u128) are written directly
//! - Variable-length fields (`Vec<u8>`) are length-prefixed (u64 LE)
//! - Optional Address: 1-byte flag (0=None, 1=Some) followed by 20 bytes if Some

use crate::block::{BlockHeader, SignedTransaction};
use crate::error::CodecError;
use crate::types::{Address, Hash, Wei};

/// Domain tag prefixed to every signing payload.
const SIGNING_DOMAIN: &[u8] = b"corevm-tx";

/// A cursor for reading bytes during decoding.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::UnexpectedEnd);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_u128(&mut self) -> Result<u128, CodecError> {
        Ok(u128::from_le_bytes(self.read_array()?))
    }

    fn read_optional_address(&mut self) -> Result<Option<Address>, CodecError> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.read_array()?)),
            value => Err(CodecError::InvalidFlag { field: "to", value }),
        }
    }

    fn read_var_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u64()?;
        let len = usize::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

// ── Encoding helpers ──

fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u128(buf: &mut Vec<u8>, v: u128) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_optional_address(buf: &mut Vec<u8>, addr: &Option<Address>) {
    match addr {
        None => buf.push(0),
        Some(addr) => {
            buf.push(1);
            buf.extend_from_slice(addr);
        }
    }
}

fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    // usize is at most 64 bits on every supported target
    write_u64(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

fn write_tx_body(buf: &mut Vec<u8>, tx: &SignedTransaction) {
    write_u64(buf, tx.nonce);
    write_u128(buf, tx.gas_price);
    write_u64(buf, tx.gas_limit);
    write_optional_address(buf, &tx.to);
    write_u128(buf, tx.value);
    write_var_bytes(buf, &tx.data);
}

// ── Transactions ──

/// Bytes covered by a transaction signature.
///
/// `"corevm-tx" || chain_id || nonce || gas_price || gas_limit || to || value || data`
pub fn encode_signing_payload(tx: &SignedTransaction, chain_id: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SIGNING_DOMAIN.len() + 8 + 84 + tx.data.len());
    buf.extend_from_slice(SIGNING_DOMAIN);
    write_u64(&mut buf, chain_id);
    write_tx_body(&mut buf, tx);
    buf
}

/// Encode a signed transaction to its wire form.
///
/// `body || public_key (32) || signature (64)`
pub fn encode_transaction(tx: &SignedTransaction) -> Vec<u8> {
    let mut buf = Vec::with_capacity(84 + tx.data.len() + 96);
    write_tx_body(&mut buf, tx);
    buf.extend_from_slice(&tx.public_key);
    buf.extend_from_slice(&tx.signature);
    buf
}

/// Decode a signed transaction from its wire form.
pub fn decode_transaction(data: &[u8]) -> Result<SignedTransaction, CodecError> {
    let mut r = Reader::new(data);

    let nonce = r.read_u64()?;
    let gas_price: Wei = r.read_u128()?;
    let gas_limit = r.read_u64()?;
    let to = r.read_optional_address()?;
    let value: Wei = r.read_u128()?;
    let payload = r.read_var_bytes()?;
    let public_key = r.read_array()?;
    let signature = r.read_array()?;
    r.finish()?;

    Ok(SignedTransaction {
        nonce,
        gas_price,
        gas_limit,
        to,
        value,
        data: payload,
        public_key,
        signature,
    })
}

// ── Headers and accounts ──

/// Encode a block header for hashing.
pub fn encode_header(header: &BlockHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 8 + 20 + 8 * 3 + 16 + 32 + 256);
    buf.extend_from_slice(&header.parent_hash);
    write_u64(&mut buf, header.number);
    buf.extend_from_slice(&header.coinbase);
    write_u64(&mut buf, header.gas_limit);
    write_u64(&mut buf, header.gas_used);
    write_u64(&mut buf, header.timestamp);
    write_u128(&mut buf, header.difficulty);
    buf.extend_from_slice(&header.state_root);
    buf.extend_from_slice(&header.bloom.0);
    buf
}

/// Encode an account's committed fields as a state-tree leaf value.
///
/// `nonce (8) || balance (16) || code_hash (32) || storage_root (32)`
pub fn encode_account_leaf(
    nonce: u64,
    balance: Wei,
    code_hash: &Hash,
    storage_root: &Hash,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 16 + 32 + 32);
    write_u64(&mut buf, nonce);
    write_u128(&mut buf, balance);
    buf.extend_from_slice(code_hash);
    buf.extend_from_slice(storage_root);
    buf
}
