//! Persisted entities: `Stream` and `StreamRevision`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConversionError;
use crate::units;

// ─── FlowRate ─────────────────────────────────────────────────────────────────

/// A signed flow rate in the token's smallest unit per second.
///
/// On chain this is an `int96`; `0` means the stream is closed. Serialized as
/// a decimal string (the indexer's `BigInt` wire form), and also accepted as a
/// JSON integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "FlowRateRepr", into = "String")]
pub struct FlowRate(i128);

impl FlowRate {
    pub const ZERO: FlowRate = FlowRate(0);
    pub const INT96_MAX: i128 = (1i128 << 95) - 1;
    pub const INT96_MIN: i128 = -(1i128 << 95);

    pub const fn new(value: i128) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the rate is representable as an on-chain `int96`.
    pub fn fits_int96(self) -> bool {
        (Self::INT96_MIN..=Self::INT96_MAX).contains(&self.0)
    }

    /// Build the native rate for a human per-month amount (floor division).
    pub fn from_monthly(amount: &str) -> Result<Self, ConversionError> {
        let native = units::to_native_rate_per_second(amount)?;
        let rate: FlowRate = native.parse()?;
        if !rate.fits_int96() {
            return Err(ConversionError::Overflow(amount.to_string()));
        }
        Ok(rate)
    }

    /// Per-month display string (see [`units::to_monthly_rate`]).
    pub fn to_monthly(self) -> String {
        units::to_monthly_rate(&self.0.to_string())
    }
}

impl fmt::Display for FlowRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowRate {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() {
            return Err(ConversionError::Empty);
        }
        t.parse::<i128>().map(FlowRate).map_err(|e| match e.kind() {
            std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
                ConversionError::Overflow(s.to_string())
            }
            _ => ConversionError::NotANumber(s.to_string()),
        })
    }
}

impl From<i128> for FlowRate {
    fn from(v: i128) -> Self {
        Self(v)
    }
}

impl From<FlowRate> for String {
    fn from(r: FlowRate) -> Self {
        r.0.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlowRateRepr {
    Text(String),
    Int(i64),
}

impl TryFrom<FlowRateRepr> for FlowRate {
    type Error = ConversionError;

    fn try_from(r: FlowRateRepr) -> Result<Self, Self::Error> {
        match r {
            FlowRateRepr::Text(s) => s.parse(),
            FlowRateRepr::Int(i) => Ok(FlowRate(i128::from(i))),
        }
    }
}

// ─── StreamStatus ─────────────────────────────────────────────────────────────

/// Lifecycle status of one stream revision. Derived by the reconciler only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    Created,
    Updated,
    Terminated,
}

impl StreamStatus {
    /// Status after a rate change on an already existing stream.
    pub fn after_update(rate: FlowRate) -> Self {
        if rate.is_zero() {
            Self::Terminated
        } else {
            Self::Updated
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "UPDATED" => Ok(Self::Updated),
            "TERMINATED" => Ok(Self::Terminated),
            other => Err(format!("unknown stream status '{other}'")),
        }
    }
}

// ─── Stream ───────────────────────────────────────────────────────────────────

/// One continuous transfer between `sender` and `receiver` of `token`, at a
/// given revision.
///
/// `sender`, `receiver`, `token`, `created_at` and `tx_hash` never change once
/// the record exists. Addresses are lower-case `0x` hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub token: String,
    pub flow_rate: FlowRate,
    pub status: StreamStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub tx_hash: String,
}

impl Stream {
    /// Returns `true` while the stream is still moving funds.
    pub fn is_active(&self) -> bool {
        !self.flow_rate.is_zero()
    }

    /// Returns `true` if `account` (any case) is the sender or the receiver.
    pub fn involves(&self, account: &str) -> bool {
        self.sender.eq_ignore_ascii_case(account) || self.receiver.eq_ignore_ascii_case(account)
    }
}

// ─── StreamRevision ───────────────────────────────────────────────────────────

/// Cursor for a (sender, receiver, token) triple, pointing at the stream
/// revision currently considered live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRevision {
    pub id: String,
    pub revision_index: u32,
    pub period_revision_index: u32,
    pub most_recent_stream: Option<String>,
}

impl StreamRevision {
    /// A fresh cursor, as created on the first event for a triple.
    pub fn initial(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision_index: 0,
            period_revision_index: 0,
            most_recent_stream: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_rate_serde_as_string() {
        let json = serde_json::to_string(&FlowRate::new(385_802_469_135)).unwrap();
        assert_eq!(json, "\"385802469135\"");
        let back: FlowRate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), 385_802_469_135);
        let from_int: FlowRate = serde_json::from_str("-42").unwrap();
        assert_eq!(from_int.value(), -42);
        assert!(serde_json::from_str::<FlowRate>("\"1.5\"").is_err());
    }

    #[test]
    fn flow_rate_int96_bounds() {
        assert!(FlowRate::new(FlowRate::INT96_MAX).fits_int96());
        assert!(!FlowRate::new(FlowRate::INT96_MAX + 1).fits_int96());
        assert!(FlowRate::new(FlowRate::INT96_MIN).fits_int96());
    }

    #[test]
    fn flow_rate_from_monthly() {
        assert_eq!(FlowRate::from_monthly("1").unwrap().value(), 385_802_469_135);
        assert!(FlowRate::from_monthly("nope").is_err());
    }

    #[test]
    fn status_after_update() {
        assert_eq!(StreamStatus::after_update(FlowRate::ZERO), StreamStatus::Terminated);
        assert_eq!(StreamStatus::after_update(FlowRate::new(5)), StreamStatus::Updated);
        assert_eq!("TERMINATED".parse::<StreamStatus>().unwrap(), StreamStatus::Terminated);
        assert_eq!(
            serde_json::to_string(&StreamStatus::Created).unwrap(),
            "\"CREATED\""
        );
    }
}
