//! Call encoding and return decoding on top of `alloy-dyn-abi`.
//!
//! Function signatures are parsed with `alloy-json-abi`; every argument is
//! checked against the resolved parameter type before the tuple is encoded.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_dyn_abi::Specifier;
use alloy_json_abi::Function;
use alloy_primitives::{B256, I256, U256};
use thiserror::Error;

use flowindex_core::ids::keccak256;
use flowindex_core::FlowRate;

use crate::error::SubmissionError;

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("invalid signature '{signature}': {reason}")]
    Signature { signature: String, reason: String },

    #[error("'{signature}' takes {expected} arguments, got {got}")]
    Arity {
        signature: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} of '{signature}' is not a {expected}")]
    Mismatch {
        signature: String,
        index: usize,
        expected: String,
    },

    #[error("value out of range: {0}")]
    Range(String),

    #[error("ABI decode failed: {0}")]
    Decode(String),
}

impl From<AbiError> for SubmissionError {
    fn from(e: AbiError) -> Self {
        match e {
            AbiError::Decode(reason) => Self::Rpc(reason),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

/// Parse `name(type,...)` into a function description.
pub fn function(signature: &str) -> Result<Function, AbiError> {
    Function::parse(signature).map_err(|e| AbiError::Signature {
        signature: signature.to_string(),
        reason: e.to_string(),
    })
}

/// The 4-byte selector of `signature`.
pub fn selector(signature: &str) -> Result<[u8; 4], AbiError> {
    Ok(function(signature)?.selector().0)
}

/// `keccak256(signature)`, i.e. an event's topic0.
pub fn event_topic(signature: &str) -> B256 {
    B256::from(keccak256(signature.as_bytes()))
}

/// `selector ‖ abi_encode_params(args)`.
pub fn encode_call(signature: &str, args: Vec<DynSolValue>) -> Result<Vec<u8>, AbiError> {
    let func = function(signature)?;
    if args.len() != func.inputs.len() {
        return Err(AbiError::Arity {
            signature: signature.to_string(),
            expected: func.inputs.len(),
            got: args.len(),
        });
    }
    for (index, (param, arg)) in func.inputs.iter().zip(&args).enumerate() {
        let ty: DynSolType = param.resolve().map_err(|e| AbiError::Signature {
            signature: signature.to_string(),
            reason: format!("param {index}: {e}"),
        })?;
        if !ty.matches(arg) {
            return Err(AbiError::Mismatch {
                signature: signature.to_string(),
                index,
                expected: ty.sol_type_name().into_owned(),
            });
        }
    }

    let mut calldata = func.selector().to_vec();
    calldata.extend(DynSolValue::Tuple(args).abi_encode_params());
    Ok(calldata)
}

/// A flow rate as an `int96` argument.
pub fn int96(rate: FlowRate) -> Result<DynSolValue, AbiError> {
    let value = I256::try_from(rate.value()).map_err(|e| AbiError::Range(e.to_string()))?;
    Ok(DynSolValue::Int(value, 96))
}

/// Decode a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<U256, AbiError> {
    match DynSolType::Uint(256).abi_decode(data) {
        Ok(DynSolValue::Uint(value, _)) => Ok(value),
        Ok(other) => Err(AbiError::Decode(format!("expected uint256, got {other:?}"))),
        Err(e) => Err(AbiError::Decode(format!("{e} ({} bytes)", data.len()))),
    }
}

/// Decode `0x`-prefixed hex.
pub fn from_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
}

pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    #[test]
    fn known_selectors() {
        assert_eq!(hex::encode(selector("balanceOf(address)").unwrap()), "70a08231");
        assert_eq!(hex::encode(selector("transfer(address,uint256)").unwrap()), "a9059cbb");
    }

    #[test]
    fn erc20_transfer_topic() {
        assert_eq!(
            to_hex(event_topic("Transfer(address,address,uint256)").as_slice()),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn dynamic_bytes_goes_to_the_tail() {
        let call = encode_call(
            "f(address,bytes,int96)",
            vec![
                DynSolValue::Address(Address::repeat_byte(0x11)),
                DynSolValue::Bytes(vec![]),
                int96(FlowRate::new(-7)).unwrap(),
            ],
        )
        .unwrap();
        let body = &call[4..];
        // three head words, then the empty bytes length word
        assert_eq!(body.len(), 4 * 32);
        assert_eq!(U256::from_be_slice(&body[32..64]), U256::from(96u64));
        assert_eq!(&body[12..32], Address::repeat_byte(0x11).as_slice());
        let mut minus_seven = [0xff; 32];
        minus_seven[31] = 0xf9;
        assert_eq!(&body[64..96], &minus_seven);
    }

    #[test]
    fn arguments_are_type_checked() {
        let err = encode_call("balanceOf(address)", vec![DynSolValue::Uint(U256::from(1u64), 256)])
            .unwrap_err();
        assert!(matches!(err, AbiError::Mismatch { index: 0, .. }));

        let err = encode_call("balanceOf(address)", vec![]).unwrap_err();
        assert!(matches!(err, AbiError::Arity { expected: 1, got: 0, .. }));
        assert!(matches!(SubmissionError::from(err), SubmissionError::InvalidInput(_)));
    }

    #[test]
    fn uint_return_value() {
        let word = DynSolValue::Uint(U256::from(42u64), 256).abi_encode();
        assert_eq!(decode_uint(&word).unwrap(), U256::from(42u64));
        assert!(decode_uint(&[0u8; 3]).is_err());
        assert_eq!(from_hex(&to_hex(&word)).unwrap(), word);
    }
}
