//! Compiled filters and their two backends.
//!
//! A [`Filter`] is evaluated either in memory against an [`EmailRecord`] or
//! rendered to an SQL fragment for the store. Both backends go through
//! [`fold_case`] and compare canonical timestamp text, so they agree on every
//! record.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::{canonical_timestamp, EmailRecord, Field};

/// Name under which [`fold_case`] is registered as an SQLite function.
pub const FOLD_CASE_SQL_FN: &str = "fold_case";

/// Case folding shared by the in-memory matcher and the store.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Text column a condition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextColumn {
    From,
    To,
    Subject,
    Body,
}

impl TextColumn {
    /// Maps a rule field to its column; `None` for non-text fields.
    pub fn for_field(field: &Field) -> Option<Self> {
        match field {
            Field::From => Some(TextColumn::From),
            Field::To => Some(TextColumn::To),
            Field::Subject => Some(TextColumn::Subject),
            Field::Message => Some(TextColumn::Body),
            Field::ReceivedDate | Field::Unknown(_) => None,
        }
    }

    /// Column name in the `emails` table.
    pub fn sql_column(self) -> &'static str {
        match self {
            TextColumn::From => "from_address",
            TextColumn::To => "to_address",
            TextColumn::Subject => "subject",
            TextColumn::Body => "message_body",
        }
    }

    fn value(self, record: &EmailRecord) -> &str {
        match self {
            TextColumn::From => &record.from,
            TextColumn::To => &record.to,
            TextColumn::Subject => &record.subject,
            TextColumn::Body => &record.body,
        }
    }
}

/// How a text filter compares the folded column with its needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextMatch {
    Contains,
    Equals,
}

/// One compiled condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Matches nothing. Unknown fields, unknown predicates and bad thresholds
    /// compile to this.
    Never,
    /// Text test on one column. `needle` is already folded.
    Text {
        column: TextColumn,
        matching: TextMatch,
        negated: bool,
        needle: String,
    },
    /// Received strictly after the canonical timestamp.
    ReceivedAfter(String),
    /// Received strictly before the canonical timestamp.
    ReceivedBefore(String),
}

impl Filter {
    pub fn text(column: TextColumn, matching: TextMatch, negated: bool, value: &str) -> Self {
        Filter::Text {
            column,
            matching,
            negated,
            needle: fold_case(value),
        }
    }

    pub fn received_after(threshold: &DateTime<Utc>) -> Self {
        Filter::ReceivedAfter(canonical_timestamp(threshold))
    }

    pub fn received_before(threshold: &DateTime<Utc>) -> Self {
        Filter::ReceivedBefore(canonical_timestamp(threshold))
    }

    /// In-memory backend.
    pub fn matches(&self, record: &EmailRecord) -> bool {
        match self {
            Filter::Never => false,
            Filter::Text {
                column,
                matching,
                negated,
                needle,
            } => {
                let haystack = fold_case(column.value(record));
                let hit = match matching {
                    TextMatch::Contains => haystack.contains(needle.as_str()),
                    TextMatch::Equals => haystack == *needle,
                };
                hit != *negated
            }
            Filter::ReceivedAfter(threshold) => {
                canonical_timestamp(&record.received_at).as_str() > threshold.as_str()
            }
            Filter::ReceivedBefore(threshold) => {
                canonical_timestamp(&record.received_at).as_str() < threshold.as_str()
            }
        }
    }

    /// SQL backend. Values are always bound, never spliced into the text.
    pub fn to_sql(&self) -> SqlFragment {
        match self {
            Filter::Never => SqlFragment::new("1 = 0", Vec::new()),
            Filter::Text {
                column,
                matching,
                negated,
                needle,
            } => {
                let col = column.sql_column();
                let sql = match (matching, negated) {
                    (TextMatch::Contains, false) => {
                        format!("instr({FOLD_CASE_SQL_FN}({col}), ?) > 0")
                    }
                    (TextMatch::Contains, true) => {
                        format!("instr({FOLD_CASE_SQL_FN}({col}), ?) = 0")
                    }
                    (TextMatch::Equals, false) => format!("{FOLD_CASE_SQL_FN}({col}) = ?"),
                    (TextMatch::Equals, true) => format!("{FOLD_CASE_SQL_FN}({col}) <> ?"),
                };
                SqlFragment::new(sql, vec![needle.clone()])
            }
            Filter::ReceivedAfter(threshold) => {
                SqlFragment::new("received_at > ?", vec![threshold.clone()])
            }
            Filter::ReceivedBefore(threshold) => {
                SqlFragment::new("received_at < ?", vec![threshold.clone()])
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Never => f.write_str("never"),
            Filter::Text {
                column,
                matching,
                negated,
                needle,
            } => {
                let op = match (matching, negated) {
                    (TextMatch::Contains, false) => "contains",
                    (TextMatch::Contains, true) => "does not contain",
                    (TextMatch::Equals, false) => "equals",
                    (TextMatch::Equals, true) => "does not equal",
                };
                write!(f, "{} {} {:?}", column.sql_column(), op, needle)
            }
            Filter::ReceivedAfter(threshold) => write!(f, "received after {threshold}"),
            Filter::ReceivedBefore(threshold) => write!(f, "received before {threshold}"),
        }
    }
}

/// A parameterized SQL boolean expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<String>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Joins filters with `separator`, parenthesizing each part.
    pub fn join(filters: &[Filter], separator: &str) -> Self {
        let mut parts = Vec::with_capacity(filters.len());
        let mut params = Vec::new();
        for filter in filters {
            let fragment = filter.to_sql();
            parts.push(format!("({})", fragment.sql));
            params.extend(fragment.params);
        }
        Self {
            sql: parts.join(separator),
            params,
        }
    }
}
