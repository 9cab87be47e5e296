//! Product records and earnings-per-click normalization
//!
//! The raw catalog value for EPC fields is dynamically typed: a plain number,
//! a currency-formatted string ("$1.23 USD"), or absent. The store keeps the
//! raw value untouched; normalization happens only at query time through
//! [`normalize_epc`].

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};

/// Raw earnings-per-click value as it appears in the catalog source.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawEpc {
    /// A plain numeric value
    Number(f64),
    /// A textual value, typically currency-formatted ("$1.23 USD")
    Text(String),
    /// No value in the source
    #[default]
    Absent,
}

impl RawEpc {
    /// Build a raw EPC from a source cell.
    ///
    /// Empty cells are absent. Cells that parse as a number arrive as
    /// [`RawEpc::Number`]; everything else is kept verbatim as text.
    pub fn from_source(value: Option<String>) -> Self {
        match value {
            None => RawEpc::Absent,
            Some(s) if s.trim().is_empty() => RawEpc::Absent,
            Some(s) => match s.trim().parse::<f64>() {
                Ok(n) => RawEpc::Number(n),
                Err(_) => RawEpc::Text(s),
            },
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RawEpc::Absent)
    }
}

impl ToSql for RawEpc {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            RawEpc::Number(n) => ToSqlOutput::Owned(Value::Real(*n)),
            RawEpc::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            RawEpc::Absent => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl FromSql for RawEpc {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(RawEpc::Absent),
            ValueRef::Integer(i) => Ok(RawEpc::Number(i as f64)),
            ValueRef::Real(f) => Ok(RawEpc::Number(f)),
            ValueRef::Text(t) => String::from_utf8(t.to_vec())
                .map(RawEpc::Text)
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// Normalize a raw EPC value to a plain number.
///
/// Currency-formatted text drops one leading `$` and one trailing ` USD`.
/// Absent or unparseable values yield `0.0`. This is the only place EPC
/// normalization lives; every surfaced `epc` goes through it.
pub fn normalize_epc(raw: &RawEpc) -> f64 {
    match raw {
        RawEpc::Number(n) => *n,
        RawEpc::Absent => 0.0,
        RawEpc::Text(s) => {
            let stripped = s.trim();
            let stripped = stripped.strip_prefix('$').unwrap_or(stripped);
            let stripped = stripped.strip_suffix(" USD").unwrap_or(stripped);
            stripped.trim().parse::<f64>().unwrap_or(0.0)
        }
    }
}

/// One catalog entry, keyed by the stable external link identifier.
///
/// All text attributes may be absent. `click_url` is never generated or
/// rewritten; only the ingested value is ever returned to a caller.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub link_id: i64,
    pub advertiser: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub category: Option<String>,
    pub promotion_type: Option<String>,
    pub epc_7day: RawEpc,
    pub epc_3month: RawEpc,
    pub click_url: Option<String>,
    pub coupon_code: Option<String>,
    /// The exact text that was embedded for this record
    pub embedding_text: String,
}

impl ProductRecord {
    /// Re-derive the embedding text from the record's fields.
    ///
    /// Deterministic concatenation of the labeled fields, each included only
    /// if its source field is non-null, joined with `" | "`. Must reproduce
    /// `embedding_text` exactly so re-embedding is idempotent and auditable.
    pub fn derive_embedding_text(&self) -> String {
        let parts = [
            ("Product", self.name.as_deref()),
            ("Description", self.description.as_deref()),
            ("Keywords", self.keywords.as_deref()),
            ("Category", self.category.as_deref()),
            ("Type", self.promotion_type.as_deref()),
        ];

        parts
            .iter()
            .filter_map(|(label, value)| value.map(|v| format!("{}: {}", label, v)))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
