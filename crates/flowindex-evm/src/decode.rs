//! `FlowUpdated` log decoding.
//!
//! ```text
//! event FlowUpdated(
//!     address indexed token, address indexed sender, address indexed receiver,
//!     int96 flowRate, int256 totalSenderFlowRate, int256 totalReceiverFlowRate,
//!     bytes userData)
//! ```
//!
//! Indexed addresses come from topics 1..3, the rest from the data payload.
//! Only `flowRate` is kept; the totals and user data are ignored.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::B256;
use serde_json::json;

use flowindex_core::entity::FlowRate;
use flowindex_core::error::FlowIndexError;
use flowindex_core::event::{FLOW_UPDATED, FLOW_UPDATED_SIGNATURE};
use flowindex_core::handler::DecodedEvent;
use flowindex_core::ids::address_hex;
use flowindex_rpc::abi;

use crate::fetcher::RawLog;

/// `topic0` of `FlowUpdated` logs.
pub fn flow_updated_topic() -> String {
    abi::to_hex(abi::event_topic(FLOW_UPDATED_SIGNATURE).as_slice())
}

/// Non-indexed `FlowUpdated` parameters, in declaration order.
fn flow_updated_body() -> DynSolType {
    DynSolType::Tuple(vec![
        DynSolType::Int(96),
        DynSolType::Int(256),
        DynSolType::Int(256),
        DynSolType::Bytes,
    ])
}

/// Decode a `FlowUpdated` log into a registry event. The block timestamp is
/// not part of the log; handlers take it from the block context.
pub fn decode_flow_updated(log: &RawLog) -> Result<DecodedEvent, FlowIndexError> {
    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| FlowIndexError::invalid("topics", "is empty"))?;
    if !topic0.eq_ignore_ascii_case(&flow_updated_topic()) {
        return Err(FlowIndexError::invalid("topics", format!("{topic0} is not FlowUpdated")));
    }
    if log.topics.len() != 4 {
        return Err(FlowIndexError::invalid(
            "topics",
            format!("expected 4 topics, got {}", log.topics.len()),
        ));
    }

    let token = topic_address("token", &log.topics[1])?;
    let sender = topic_address("sender", &log.topics[2])?;
    let receiver = topic_address("receiver", &log.topics[3])?;

    let data = abi::from_hex(&log.data)
        .map_err(|e| FlowIndexError::invalid("data", format!("is not hex ({e})")))?;
    let body = flow_updated_body()
        .abi_decode_params(&data)
        .map_err(|e| FlowIndexError::invalid("flowRate", format!("undecodable data ({e})")))?;
    let flow_rate = match body {
        DynSolValue::Tuple(values) => match values.first() {
            Some(DynSolValue::Int(value, 96)) => i128::try_from(*value)
                .ok()
                .map(FlowRate::new)
                .filter(|rate| rate.fits_int96()),
            _ => None,
        },
        _ => None,
    }
    .ok_or_else(|| FlowIndexError::invalid("flowRate", "is not an int96"))?;

    Ok(DecodedEvent {
        schema: FLOW_UPDATED.to_string(),
        address: log.address.to_lowercase(),
        tx_hash: log.tx_hash.to_lowercase(),
        block_number: log.block_number_u64()?,
        log_index: log.log_index_u32()?,
        fields_json: json!({
            "token": token,
            "sender": sender,
            "receiver": receiver,
            "flowRate": flow_rate.value().to_string(),
        }),
    })
}

/// An indexed address topic, decoded as a 32-byte `address` word.
fn topic_address(field: &'static str, topic: &str) -> Result<String, FlowIndexError> {
    let not_an_address = || FlowIndexError::invalid(field, format!("topic {topic} is not an address"));
    let word: B256 = topic.parse().map_err(|_| not_an_address())?;
    match DynSolType::Address.abi_decode(word.as_slice()) {
        Ok(DynSolValue::Address(address)) if word.as_slice()[..12].iter().all(|b| *b == 0) => {
            Ok(address_hex(&address))
        }
        _ => Err(not_an_address()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::{Address, I256};
    use flowindex_core::event::FlowUpdated;
    use flowindex_core::types::{BlockSummary, IndexContext, IndexPhase};

    /// A well-formed `FlowUpdated` log, as a node would return it.
    pub(crate) fn flow_log(
        token: u8,
        sender: u8,
        receiver: u8,
        rate: i128,
        block: u64,
        index: u32,
    ) -> RawLog {
        let topic = |b: u8| abi::to_hex(&DynSolValue::Address(Address::repeat_byte(b)).abi_encode());
        let int = |v: i128, bits| DynSolValue::Int(I256::try_from(v).unwrap(), bits);
        let data = DynSolValue::Tuple(vec![
            int(rate, 96),
            int(-rate, 256),
            int(rate, 256),
            DynSolValue::Bytes(vec![]),
        ])
        .abi_encode_params();
        RawLog {
            address: "0xcfa0000000000000000000000000000000000000".into(),
            topics: vec![flow_updated_topic(), topic(token), topic(sender), topic(receiver)],
            data: abi::to_hex(&data),
            block_number: format!("{block:#x}"),
            block_hash: format!("0x{block:064x}"),
            tx_hash: format!("0x{:064x}", block * 1000 + u64::from(index)),
            log_index: format!("{index:#x}"),
            removed: None,
        }
    }

    #[test]
    fn decodes_topics_and_rate() {
        let log = flow_log(0x33, 0x11, 0x22, 385_802_469_135, 7, 2);
        let event = decode_flow_updated(&log).unwrap();
        assert_eq!(event.schema, FLOW_UPDATED);
        assert_eq!(event.block_number, 7);
        assert_eq!(event.log_index, 2);
        assert_eq!(event.fields_json["sender"], "0x1111111111111111111111111111111111111111");
        assert_eq!(event.fields_json["token"], "0x3333333333333333333333333333333333333333");

        let ctx = IndexContext {
            block: BlockSummary {
                number: 7,
                hash: log.block_hash.clone(),
                parent_hash: "0x06".into(),
                timestamp: 1_700_000_000,
            },
            phase: IndexPhase::Backfill,
            chain: "local".into(),
        };
        let flow = FlowUpdated::from_decoded(&event, &ctx).unwrap();
        assert_eq!(flow.flow_rate, FlowRate::new(385_802_469_135));
        assert_eq!(flow.timestamp, 1_700_000_000);
        assert_eq!(flow.transaction_id, log.tx_hash);
    }

    #[test]
    fn zero_rate_decodes() {
        let event = decode_flow_updated(&flow_log(0x33, 0x11, 0x22, 0, 1, 0)).unwrap();
        assert_eq!(event.fields_json["flowRate"], "0");
    }

    #[test]
    fn foreign_or_truncated_logs_are_rejected() {
        let mut other = flow_log(0x33, 0x11, 0x22, 1, 1, 0);
        other.topics[0] = abi::to_hex(abi::event_topic("Transfer(address,address,uint256)").as_slice());
        assert!(decode_flow_updated(&other).unwrap_err().is_rejection());

        let mut short = flow_log(0x33, 0x11, 0x22, 1, 1, 0);
        short.topics.pop();
        assert!(decode_flow_updated(&short).unwrap_err().is_rejection());

        let mut empty = flow_log(0x33, 0x11, 0x22, 1, 1, 0);
        empty.data = "0x".into();
        assert!(matches!(
            decode_flow_updated(&empty).unwrap_err(),
            FlowIndexError::InvalidEvent { field: "flowRate", .. }
        ));

        let wide = flow_log(0x33, 0x11, 0x22, 1i128 << 100, 1, 0);
        assert!(matches!(
            decode_flow_updated(&wide).unwrap_err(),
            FlowIndexError::InvalidEvent { field: "flowRate", .. }
        ));

        let mut dirty = flow_log(0x33, 0x11, 0x22, 1, 1, 0);
        dirty.topics[2] = format!("0x01{}", &dirty.topics[2][4..]);
        assert!(decode_flow_updated(&dirty).unwrap_err().is_rejection());
    }
}
