//! The `FlowUpdated` event consumed by the reconciler.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::entity::FlowRate;
use crate::error::FlowIndexError;
use crate::handler::DecodedEvent;
use crate::ids;
use crate::types::IndexContext;

/// Schema name under which the reconciler registers.
pub const FLOW_UPDATED: &str = "FlowUpdated";

/// Canonical ABI signature of the agreement's `FlowUpdated` event.
pub const FLOW_UPDATED_SIGNATURE: &str =
    "FlowUpdated(address,address,address,int96,int256,int256,bytes)";

/// A flow event as it arrives on the wire (JSON lines, decoded log fields).
/// Every field is optional here; [`RawFlowUpdated::validate`] enforces presence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFlowUpdated {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub flow_rate: Option<FlowRate>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl RawFlowUpdated {
    /// Check every required field and produce a typed event.
    pub fn validate(&self) -> Result<FlowUpdated, FlowIndexError> {
        let sender = parse_address("sender", self.sender.as_deref())?;
        let receiver = parse_address("receiver", self.receiver.as_deref())?;
        let token = parse_address("token", self.token.as_deref())?;

        let flow_rate = self
            .flow_rate
            .ok_or_else(|| FlowIndexError::invalid("flowRate", "is missing"))?;
        if !flow_rate.fits_int96() {
            return Err(FlowIndexError::invalid("flowRate", "does not fit in int96"));
        }

        let timestamp = self
            .timestamp
            .ok_or_else(|| FlowIndexError::invalid("timestamp", "is missing"))?;
        if timestamp < 0 {
            return Err(FlowIndexError::invalid("timestamp", "is negative"));
        }

        let transaction_id = match self.transaction_id.as_deref().map(str::trim) {
            Some(tx) if !tx.is_empty() => tx.to_lowercase(),
            _ => return Err(FlowIndexError::invalid("transactionId", "is missing")),
        };

        Ok(FlowUpdated {
            sender,
            receiver,
            token,
            flow_rate,
            timestamp,
            transaction_id,
        })
    }
}

fn parse_address(field: &'static str, value: Option<&str>) -> Result<Address, FlowIndexError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FlowIndexError::invalid(field, "is missing"))?;
    value
        .parse::<Address>()
        .map_err(|e| FlowIndexError::invalid(field, format!("is not an address ({e})")))
}

/// A validated flow-rate change for one (sender, receiver, token) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowUpdated {
    pub sender: Address,
    pub receiver: Address,
    pub token: Address,
    pub flow_rate: FlowRate,
    /// Block timestamp, seconds since epoch.
    pub timestamp: i64,
    /// Hash of the transaction that emitted the event.
    pub transaction_id: String,
}

impl FlowUpdated {
    /// Build an event from a registry-dispatched decoded event. Fields come
    /// from `fields_json`; the timestamp and transaction fall back to the
    /// block context and the log's transaction hash.
    pub fn from_decoded(event: &DecodedEvent, ctx: &IndexContext) -> Result<Self, FlowIndexError> {
        let mut raw: RawFlowUpdated = serde_json::from_value(event.fields_json.clone())
            .map_err(|e| FlowIndexError::invalid("fields", e.to_string()))?;
        raw.timestamp.get_or_insert(ctx.block.timestamp);
        if raw.transaction_id.is_none() && !event.tx_hash.is_empty() {
            raw.transaction_id = Some(event.tx_hash.clone());
        }
        raw.validate()
    }

    /// Id of the revision cursor this event belongs to. Also the ordering key:
    /// events sharing it must be applied in arrival order.
    pub fn revision_id(&self) -> String {
        ids::revision_id(&self.sender, &self.receiver, &self.token)
    }

    pub fn to_raw(&self) -> RawFlowUpdated {
        RawFlowUpdated {
            sender: Some(ids::address_hex(&self.sender)),
            receiver: Some(ids::address_hex(&self.receiver)),
            token: Some(ids::address_hex(&self.token)),
            flow_rate: Some(self.flow_rate),
            timestamp: Some(self.timestamp),
            transaction_id: Some(self.transaction_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockSummary, IndexPhase};

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";
    const T: &str = "0x3333333333333333333333333333333333333333";

    fn raw() -> RawFlowUpdated {
        RawFlowUpdated {
            sender: Some(A.into()),
            receiver: Some(B.into()),
            token: Some(T.into()),
            flow_rate: Some(FlowRate::new(100)),
            timestamp: Some(1_700_000_000),
            transaction_id: Some("0xABC".into()),
        }
    }

    #[test]
    fn validate_ok() {
        let ev = raw().validate().unwrap();
        assert_eq!(ev.flow_rate.value(), 100);
        assert_eq!(ev.transaction_id, "0xabc");
        assert_eq!(ids::address_hex(&ev.sender), A);
    }

    #[test]
    fn validate_missing_fields() {
        let mut r = raw();
        r.receiver = None;
        let err = r.validate().unwrap_err();
        assert!(matches!(err, FlowIndexError::InvalidEvent { field: "receiver", .. }));

        let mut r = raw();
        r.flow_rate = None;
        assert!(r.validate().unwrap_err().is_rejection());

        let mut r = raw();
        r.transaction_id = Some("  ".into());
        assert!(matches!(
            r.validate().unwrap_err(),
            FlowIndexError::InvalidEvent { field: "transactionId", .. }
        ));
    }

    #[test]
    fn validate_bad_address() {
        let mut r = raw();
        r.token = Some("0x1234".into());
        assert!(matches!(
            r.validate().unwrap_err(),
            FlowIndexError::InvalidEvent { field: "token", .. }
        ));
    }

    #[test]
    fn json_line_roundtrip() {
        let line = format!(
            r#"{{"sender":"{A}","receiver":"{B}","token":"{T}","flowRate":"385802469135","timestamp":10,"transactionId":"0x01"}}"#
        );
        let parsed: RawFlowUpdated = serde_json::from_str(&line).unwrap();
        let ev = parsed.validate().unwrap();
        assert_eq!(ev.flow_rate.value(), 385_802_469_135);
        assert_eq!(ev.to_raw().validate().unwrap(), ev);
    }

    #[test]
    fn from_decoded_uses_block_context() {
        let decoded = DecodedEvent {
            schema: FLOW_UPDATED.into(),
            address: "0xcfa".into(),
            tx_hash: "0xfeed".into(),
            block_number: 7,
            log_index: 0,
            fields_json: serde_json::json!({
                "sender": A, "receiver": B, "token": T, "flowRate": "5"
            }),
        };
        let ctx = IndexContext {
            block: BlockSummary {
                number: 7,
                hash: "0x07".into(),
                parent_hash: "0x06".into(),
                timestamp: 1234,
            },
            phase: IndexPhase::Live,
            chain: "local".into(),
        };
        let ev = FlowUpdated::from_decoded(&decoded, &ctx).unwrap();
        assert_eq!(ev.timestamp, 1234);
        assert_eq!(ev.transaction_id, "0xfeed");
    }
}
