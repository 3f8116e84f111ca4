//! Stream queries: predicate trees, account-centric composition, ordering and
//! pagination.
//!
//! A [`Predicate`] mirrors the `where` input of the dashboard's streams query
//! (`and`, `or`, equality, `_contains_nocase`). Every storage backend must
//! return the same rows for the same predicate: the in-memory store evaluates
//! it with [`Predicate::matches`], the SQL store renders it with
//! [`Predicate::to_sql`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entity::{FlowRate, Stream};

/// Page size used by the dashboard.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// A filterable stream column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Sender,
    Receiver,
    Token,
    FlowRate,
}

impl Field {
    /// Column name in the SQL schema.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
            Self::Token => "token",
            Self::FlowRate => "flow_rate",
        }
    }

    fn value_of(&self, stream: &Stream) -> String {
        match self {
            Self::Sender => stream.sender.clone(),
            Self::Receiver => stream.receiver.clone(),
            Self::Token => stream.token.clone(),
            Self::FlowRate => stream.flow_rate.to_string(),
        }
    }

    /// Addresses compare case-insensitively; flow rates numerically.
    fn normalize(&self, value: &str) -> String {
        match self {
            Self::FlowRate => value
                .parse::<FlowRate>()
                .map(|r| r.to_string())
                .unwrap_or_else(|_| value.trim().to_string()),
            _ => value.trim().to_lowercase(),
        }
    }
}

/// Boolean filter over stream fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    /// Matches every stream.
    All,
    Eq(Field, String),
    ContainsNoCase(Field, String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn equals(field: Field, value: impl Into<String>) -> Self {
        Self::Eq(field, value.into())
    }

    pub fn contains(field: Field, needle: impl Into<String>) -> Self {
        Self::ContainsNoCase(field, needle.into())
    }

    /// Evaluate against a stream. An empty `And` is true, an empty `Or` false.
    pub fn matches(&self, stream: &Stream) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => field.value_of(stream) == field.normalize(value),
            Self::ContainsNoCase(field, needle) => field
                .value_of(stream)
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Self::And(parts) => parts.iter().all(|p| p.matches(stream)),
            Self::Or(parts) => parts.iter().any(|p| p.matches(stream)),
        }
    }

    /// Render as a SQL boolean expression, pushing bind values onto `binds`
    /// in placeholder order.
    pub fn to_sql(&self, binds: &mut Vec<String>) -> String {
        match self {
            Self::All => "1 = 1".to_string(),
            Self::Eq(field, value) => {
                binds.push(field.normalize(value));
                format!("{} = ?", field.column())
            }
            Self::ContainsNoCase(field, needle) => {
                binds.push(needle.to_lowercase());
                format!("instr(lower({}), ?) > 0", field.column())
            }
            Self::And(parts) => join_sql(parts, " AND ", "1 = 1", binds),
            Self::Or(parts) => join_sql(parts, " OR ", "1 = 0", binds),
        }
    }
}

fn join_sql(parts: &[Predicate], sep: &str, empty: &str, binds: &mut Vec<String>) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let rendered: Vec<String> = parts.iter().map(|p| format!("({})", p.to_sql(binds))).collect();
    rendered.join(sep)
}

// ─── StreamType ───────────────────────────────────────────────────────────────

/// The dashboard's "stream type" selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    #[default]
    All,
    Incoming,
    Outgoing,
    Terminated,
}

impl FromStr for StreamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "" | "ALL" => Ok(Self::All),
            "INCOMING" => Ok(Self::Incoming),
            "OUTGOING" => Ok(Self::Outgoing),
            "TERMINATED" => Ok(Self::Terminated),
            other => Err(format!("unknown stream type '{other}'")),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "ALL",
            Self::Incoming => "INCOMING",
            Self::Outgoing => "OUTGOING",
            Self::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

// ─── StreamQuery ──────────────────────────────────────────────────────────────

/// A filtered, ordered, paginated stream listing. Results are always ordered
/// by `createdAt` descending, ties broken by `id` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamQuery {
    pub filter: Predicate,
    pub skip: u32,
    pub first: u32,
}

impl Default for StreamQuery {
    fn default() -> Self {
        Self {
            filter: Predicate::All,
            skip: 0,
            first: DEFAULT_PAGE_SIZE,
        }
    }
}

impl StreamQuery {
    pub fn new(filter: Predicate) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// The dashboard listing for `account`:
    ///
    /// `AND(explicit, OR(sender = account, receiver = account), [OR(sender ~ q, receiver ~ q, token ~ q)])`
    ///
    /// where `explicit` holds the token filter plus the stream-type filter.
    pub fn for_account(
        account: &str,
        stream_type: StreamType,
        token: Option<&str>,
        search: Option<&str>,
    ) -> Self {
        let account = account.trim().to_lowercase();

        let mut explicit = Vec::new();
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            explicit.push(Predicate::equals(Field::Token, token));
        }
        match stream_type {
            StreamType::All => {}
            StreamType::Incoming => explicit.push(Predicate::equals(Field::Receiver, account.clone())),
            StreamType::Outgoing => explicit.push(Predicate::equals(Field::Sender, account.clone())),
            StreamType::Terminated => explicit.push(Predicate::equals(Field::FlowRate, "0")),
        }

        let mut clauses = vec![
            Predicate::And(explicit),
            Predicate::Or(vec![
                Predicate::equals(Field::Sender, account.clone()),
                Predicate::equals(Field::Receiver, account),
            ]),
        ];
        if let Some(q) = search.map(str::trim).filter(|q| !q.is_empty()) {
            clauses.push(Predicate::Or(vec![
                Predicate::contains(Field::Sender, q),
                Predicate::contains(Field::Receiver, q),
                Predicate::contains(Field::Token, q),
            ]));
        }

        Self::new(Predicate::And(clauses))
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    pub fn first(mut self, first: u32) -> Self {
        self.first = first;
        self
    }

    /// Apply filter, ordering and pagination to an in-memory row set.
    pub fn apply<'a, I>(&self, streams: I) -> Vec<Stream>
    where
        I: IntoIterator<Item = &'a Stream>,
    {
        let mut rows: Vec<Stream> = streams
            .into_iter()
            .filter(|s| self.filter.matches(s))
            .cloned()
            .collect();
        sort_streams(&mut rows);
        rows.into_iter()
            .skip(self.skip as usize)
            .take(self.first as usize)
            .collect()
    }
}

/// Canonical listing order: newest first, then by id.
pub fn sort_streams(rows: &mut [Stream]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::StreamStatus;

    const ME: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";
    const CAROL: &str = "0x3333333333333333333333333333333333333333";
    const DAI: &str = "0xdddddddddddddddddddddddddddddddddddddddd";
    const USDC: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    fn stream(sender: &str, receiver: &str, token: &str, rate: i128, created: i64) -> Stream {
        Stream {
            id: format!("{sender}-{receiver}-{token}-0"),
            sender: sender.into(),
            receiver: receiver.into(),
            token: token.into(),
            flow_rate: FlowRate::new(rate),
            status: if rate == 0 { StreamStatus::Terminated } else { StreamStatus::Created },
            created_at: created,
            updated_at: created,
            tx_hash: "0x0".into(),
        }
    }

    fn fixture() -> Vec<Stream> {
        vec![
            stream(ME, BOB, DAI, 100, 10),
            stream(BOB, ME, USDC, 50, 20),
            stream(ME, CAROL, USDC, 0, 30),
            stream(BOB, CAROL, DAI, 7, 40),
        ]
    }

    #[test]
    fn account_scope_excludes_strangers() {
        let rows = StreamQuery::for_account(ME, StreamType::All, None, None).apply(&fixture());
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|s| s.involves(ME)));
        // createdAt descending
        assert_eq!(rows[0].created_at, 30);
        assert_eq!(rows[2].created_at, 10);
    }

    #[test]
    fn stream_type_filters() {
        let data = fixture();
        let incoming = StreamQuery::for_account(ME, StreamType::Incoming, None, None).apply(&data);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].sender, BOB);

        let outgoing = StreamQuery::for_account(ME, StreamType::Outgoing, None, None).apply(&data);
        assert_eq!(outgoing.len(), 2);

        let terminated =
            StreamQuery::for_account(ME, StreamType::Terminated, None, None).apply(&data);
        assert_eq!(terminated.len(), 1);
        assert_eq!(terminated[0].receiver, CAROL);
    }

    #[test]
    fn token_and_search_compose() {
        let data = fixture();
        let usdc = StreamQuery::for_account(ME, StreamType::All, Some(USDC), None).apply(&data);
        assert_eq!(usdc.len(), 2);

        let search = StreamQuery::for_account(ME, StreamType::All, None, Some("3333")).apply(&data);
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].receiver, CAROL);

        let search_token =
            StreamQuery::for_account(ME, StreamType::All, None, Some("DDDD")).apply(&data);
        assert_eq!(search_token.len(), 1);
    }

    #[test]
    fn pagination() {
        let data = fixture();
        let q = StreamQuery::default().skip(1).first(2);
        let rows = q.apply(&data);
        assert_eq!(rows.iter().map(|s| s.created_at).collect::<Vec<_>>(), vec![30, 20]);
    }

    #[test]
    fn sql_rendering_binds_in_order() {
        let q = StreamQuery::for_account(ME, StreamType::Terminated, Some(DAI), Some("ab"));
        let mut binds = Vec::new();
        let sql = q.filter.to_sql(&mut binds);
        assert_eq!(sql.matches('?').count(), binds.len());
        assert_eq!(binds[0], DAI);
        assert_eq!(binds[1], "0");
        assert_eq!(binds[2], ME);
        assert!(sql.contains("instr(lower(sender), ?) > 0"));
    }

    #[test]
    fn empty_groups() {
        let s = stream(ME, BOB, DAI, 1, 1);
        assert!(Predicate::And(vec![]).matches(&s));
        assert!(!Predicate::Or(vec![]).matches(&s));
        assert!(Predicate::equals(Field::FlowRate, " 1 ").matches(&s));
    }
}
