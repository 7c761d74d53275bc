//! Email record domain type.
//!
//! An [`EmailRecord`] is the local mirror of one remote message, flattened to
//! the handful of fields rules can match on.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{EmailId, LabelId, ThreadId};

/// Local mirror of one remote message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Provider message id. Primary key, never changes.
    pub id: EmailId,
    /// Conversation this message belongs to.
    pub thread_id: ThreadId,
    /// Raw `From` header text.
    pub from: String,
    /// Raw `To` header text.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Decoded body text.
    pub body: String,
    /// When the provider received the message.
    pub received_at: DateTime<Utc>,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Labels in provider order.
    pub labels: Vec<LabelId>,
    /// Provider payload, kept verbatim for diagnostics.
    pub raw: serde_json::Value,
    /// Set by the store on first insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the store on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl EmailRecord {
    /// Creates an unread record with empty text fields.
    pub fn new(id: impl Into<EmailId>, received_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            thread_id: ThreadId::default(),
            from: String::new(),
            to: String::new(),
            subject: String::new(),
            body: String::new(),
            received_at,
            is_read: false,
            labels: Vec::new(),
            raw: serde_json::Value::Null,
            created_at: None,
            updated_at: None,
        }
    }

    /// Returns true if the record carries the given label.
    pub fn has_label(&self, label: &LabelId) -> bool {
        self.labels.contains(label)
    }

    /// Subject truncated for console output.
    pub fn short_subject(&self) -> String {
        const MAX: usize = 50;
        if self.subject.chars().count() <= MAX {
            self.subject.clone()
        } else {
            let head: String = self.subject.chars().take(MAX).collect();
            format!("{head}...")
        }
    }
}

/// Formats a timestamp in the store's canonical form.
///
/// UTC, fixed width, microsecond precision: `2024-01-05T10:00:00.000000Z`.
/// Lexical order of these strings equals chronological order, which the SQL
/// date comparisons rely on.
pub fn canonical_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// True when the timestamp formats to the fixed-width canonical form, i.e. its
/// year has exactly four digits.
pub fn is_canonical_range(at: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&at.year())
}

/// Parses a timestamp written by [`canonical_timestamp`] (or any RFC 3339 text).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
