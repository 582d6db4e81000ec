//! Core type aliases and constants for the corevm execution layer.
//!
//! These types are shared by the dispatcher, the transaction pipeline and
//! the block executor.

/// 32-byte hash used for block hashes, state roots, code hashes and
/// storage slots.
pub type Hash = [u8; 32];

/// 20-byte account address.
pub type Address = [u8; 20];

/// Balance and value unit. Non-negative by construction.
pub type Wei = u128;

/// Block number (monotonically increasing).
pub type BlockNumber = u64;

/// A zero-valued hash (32 zero bytes).
pub const ZERO_HASH: Hash = [0u8; 32];

/// A zero-valued address (20 zero bytes).
pub const ZERO_ADDRESS: Address = [0u8; 20];

/// Keccak-256 of the empty byte string, the code hash of an account with
/// no code.
pub const EMPTY_CODE_HASH: Hash = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
];

/// Build an address whose low eight bytes hold `v` (big-endian).
///
/// Precompiled contracts live at such addresses (`0x…01`, `0x…02`, …).
pub fn address_from_low_u64(v: u64) -> Address {
    let mut addr = ZERO_ADDRESS;
    addr[12..].copy_from_slice(&v.to_be_bytes());
    addr
}

/// Render bytes as a `0x`-prefixed lowercase hex string for display.
pub fn to_hex(bytes: &[u8]) -> String {
    use core::fmt::Write;
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("0x");
    for byte in bytes {
        let _ = write!(s, "{:02x}", byte);
    }
    s
}

/// Convert a `Hash` to a hex string for display purposes.
pub fn hash_to_hex(hash: &Hash) -> String {
    to_hex(hash)
}
