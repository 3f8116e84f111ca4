//! Dashboard rows: how a stream is presented to one connected account.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::entity::Stream;
use crate::error::FlowIndexError;

/// Symbol shown for tokens missing from the registry.
pub const UNKNOWN_SYMBOL: &str = "Unknown";

const DATE_FORMAT: &str = "%d %b %Y";

// ─── Contract addresses ──────────────────────────────────────────────────────

/// Addresses written by the deployment script (`contractAddresses.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub fdaix: Option<String>,
    pub fdai: Option<String>,
    pub fusdcx: Option<String>,
    pub fusdc: Option<String>,
    pub ftusdx: Option<String>,
    pub ftusd: Option<String>,
    pub host: Option<String>,
    pub cfa: Option<String>,
    pub resolver: Option<String>,
    #[serde(rename = "cfav1Forwarder")]
    pub cfav1_forwarder: Option<String>,
}

impl ContractAddresses {
    pub fn from_json(json: &str) -> Result<Self, FlowIndexError> {
        serde_json::from_str(json)
            .map_err(|e| FlowIndexError::Config(format!("contract addresses: {e}")))
    }

    /// The three wrapped test tokens that have an address.
    pub fn tokens(&self) -> Vec<TokenInfo> {
        [
            ("fDAIx", &self.fdaix),
            ("fUSDCx", &self.fusdcx),
            ("fTUSDx", &self.ftusdx),
        ]
        .into_iter()
        .filter_map(|(symbol, address)| {
            address.as_ref().map(|a| TokenInfo::new(symbol, a.clone()))
        })
        .collect()
    }
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
}

impl TokenInfo {
    pub fn new(symbol: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            address: address.into(),
        }
    }
}

/// Tokens known to the dashboard, keyed by lowercase address.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_address: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    pub fn new(tokens: impl IntoIterator<Item = TokenInfo>) -> Self {
        let by_address = tokens
            .into_iter()
            .map(|t| (t.address.to_lowercase(), t))
            .collect();
        Self { by_address }
    }

    pub fn get(&self, address: &str) -> Option<&TokenInfo> {
        self.by_address.get(&address.to_lowercase())
    }

    pub fn symbol(&self, address: &str) -> &str {
        self.get(address).map_or(UNKNOWN_SYMBOL, |t| t.symbol.as_str())
    }

    /// Look a token up by symbol, ignoring case.
    pub fn by_symbol(&self, symbol: &str) -> Option<&TokenInfo> {
        self.by_address
            .values()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.by_address.values()
    }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Outgoing => "OUTGOING",
            Self::Incoming => "INCOMING",
        })
    }
}

/// One dashboard table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamRow {
    pub id: String,
    pub symbol: String,
    pub sender: String,
    pub receiver: String,
    pub direction: Direction,
    /// `"{rate} {symbol}/mo"`.
    pub monthly: String,
    pub created: String,
    pub updated: String,
    /// Flow rate is zero.
    pub terminated: bool,
    /// The account is the sender and the stream still flows, so it may be
    /// updated or deleted.
    pub actionable: bool,
}

impl StreamRow {
    pub fn from_stream(stream: &Stream, account: &str, tokens: &TokenRegistry) -> Self {
        let outgoing = stream.sender.eq_ignore_ascii_case(account);
        let terminated = !stream.is_active();
        let symbol = tokens.symbol(&stream.token).to_string();
        Self {
            id: stream.id.clone(),
            monthly: format!("{} {}/mo", stream.flow_rate.to_monthly(), symbol),
            symbol,
            sender: stream.sender.clone(),
            receiver: stream.receiver.clone(),
            direction: if outgoing {
                Direction::Outgoing
            } else {
                Direction::Incoming
            },
            created: format_date(stream.created_at),
            updated: format_date(stream.updated_at),
            terminated,
            actionable: outgoing && !terminated,
        }
    }
}

/// `DD Mon YYYY` in UTC; `-` for timestamps chrono cannot represent.
pub fn format_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| "-".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FlowRate, StreamStatus};

    const ME: &str = "0x1111111111111111111111111111111111111111";
    const YOU: &str = "0x2222222222222222222222222222222222222222";
    const DAIX: &str = "0x3333333333333333333333333333333333333333";

    fn stream(sender: &str, receiver: &str, rate: i128) -> Stream {
        Stream {
            id: "s".into(),
            sender: sender.into(),
            receiver: receiver.into(),
            token: DAIX.into(),
            flow_rate: FlowRate::new(rate),
            status: StreamStatus::Created,
            created_at: 1_700_000_000,
            updated_at: 1_700_086_400,
            tx_hash: "0x1".into(),
        }
    }

    fn registry() -> TokenRegistry {
        TokenRegistry::new([TokenInfo::new("fDAIx", DAIX)])
    }

    #[test]
    fn outgoing_row() {
        let row = StreamRow::from_stream(&stream(ME, YOU, 578_703_703_703), ME, &registry());
        assert_eq!(row.direction, Direction::Outgoing);
        assert_eq!(row.monthly, "1.5 fDAIx/mo");
        assert_eq!(row.created, "14 Nov 2023");
        assert_eq!(row.updated, "15 Nov 2023");
        assert!(row.actionable);
        assert!(!row.terminated);
    }

    #[test]
    fn incoming_terminated_row() {
        let row = StreamRow::from_stream(&stream(YOU, ME, 0), ME, &registry());
        assert_eq!(row.direction, Direction::Incoming);
        assert!(row.terminated);
        assert!(!row.actionable);
        assert_eq!(row.monthly, "0 fDAIx/mo");
    }

    #[test]
    fn unknown_token() {
        let row = StreamRow::from_stream(&stream(ME, YOU, 1), ME, &TokenRegistry::default());
        assert_eq!(row.symbol, UNKNOWN_SYMBOL);
        assert!(row.monthly.ends_with("Unknown/mo"));
    }

    #[test]
    fn contract_addresses_file() {
        let json = r#"{"fdaix":"0xaa","fusdcx":"0xbb","cfa":"0xcc","cfav1Forwarder":"0xdd"}"#;
        let addrs = ContractAddresses::from_json(json).unwrap();
        assert_eq!(addrs.cfav1_forwarder.as_deref(), Some("0xdd"));
        let tokens = addrs.tokens();
        assert_eq!(tokens.len(), 2);
        let reg = TokenRegistry::new(tokens);
        assert_eq!(reg.symbol("0xAA"), "fDAIx");
        assert_eq!(reg.by_symbol("fusdcx").unwrap().address, "0xbb");
    }
}
