//! Deterministic entity ids.
//!
//! - Stream: `"{sender}-{receiver}-{token}-{revisionIndex}"`
//! - StreamRevision: `keccak256(abi.encode(sender, receiver))` as `0x` hex,
//!   then `"-{token}"`
//!
//! Addresses are rendered as lower-case `0x` hex in both.

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::Address;
use tiny_keccak::{Hasher, Keccak};

/// Lower-case `0x`-prefixed rendering used for all stored addresses.
pub fn address_hex(address: &Address) -> String {
    format!("{address:#x}")
}

/// Id of the stream record for a triple at `revision_index`.
pub fn stream_id(sender: &Address, receiver: &Address, token: &Address, revision_index: u32) -> String {
    format!(
        "{}-{}-{}-{}",
        address_hex(sender),
        address_hex(receiver),
        address_hex(token),
        revision_index
    )
}

/// Id of the revision cursor for a triple.
pub fn revision_id(sender: &Address, receiver: &Address, token: &Address) -> String {
    let pair = keccak256(&encode_pair(sender, receiver));
    format!("0x{}-{}", hex::encode(pair), address_hex(token))
}

/// `abi.encode(sender, receiver)`.
fn encode_pair(sender: &Address, receiver: &Address) -> Vec<u8> {
    DynSolValue::Tuple(vec![DynSolValue::Address(*sender), DynSolValue::Address(*receiver)])
        .abi_encode_params()
}

/// keccak256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}
