//! Mail provider trait definition.
//!
//! [`MailProvider`] is the narrow slice of a remote mailbox that ingestion and
//! the action dispatcher need: list inbox ids, fetch one message, change its
//! labels. Read state and moves are both label changes underneath.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    is_canonical_range, system_labels, EmailId, EmailRecord, LabelChange, LabelId, ThreadId,
};

/// Result type alias for mail provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network, timeout or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider-specific error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Internal error, including undecodable responses.
    #[error("internal error: {0}")]
    Internal(String),
}

/// One message as the provider returns it, already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: EmailId,
    pub thread_id: ThreadId,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body_text: String,
    /// Provider receive time in epoch milliseconds, when reported.
    pub received_at_ms: Option<i64>,
    pub labels: Vec<LabelId>,
    pub is_unread: bool,
    /// Provider payload exactly as received.
    pub raw: serde_json::Value,
}

impl RemoteMessage {
    /// Flattens into a store record. `fallback` stands in for a missing or
    /// out-of-range receive time.
    pub fn into_record(self, fallback: DateTime<Utc>) -> EmailRecord {
        let received_at = self
            .received_at_ms
            .and_then(DateTime::from_timestamp_millis)
            .filter(is_canonical_range)
            .unwrap_or(fallback);

        EmailRecord {
            id: self.id,
            thread_id: self.thread_id,
            from: self.from,
            to: self.to,
            subject: self.subject,
            body: self.body_text,
            received_at,
            is_read: !self.is_unread,
            labels: self.labels,
            raw: self.raw,
            created_at: None,
            updated_at: None,
        }
    }

    /// Whether the label list marks this message unread.
    pub fn unread_from_labels(labels: &[LabelId]) -> bool {
        labels.contains(&system_labels::unread())
    }
}

/// Remote mailbox operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Lists ids of messages in the inbox, newest first, at most `limit`.
    async fn list_inbox_message_ids(&self, limit: usize) -> Result<Vec<EmailId>>;

    /// Fetches and decodes one message.
    async fn fetch_message(&self, id: &EmailId) -> Result<RemoteMessage>;

    /// Adds and removes labels on one message.
    async fn set_labels(&self, id: &EmailId, change: &LabelChange) -> Result<()>;
}

#[async_trait]
impl<T: MailProvider + ?Sized> MailProvider for Arc<T> {
    async fn list_inbox_message_ids(&self, limit: usize) -> Result<Vec<EmailId>> {
        (**self).list_inbox_message_ids(limit).await
    }

    async fn fetch_message(&self, id: &EmailId) -> Result<RemoteMessage> {
        (**self).fetch_message(id).await
    }

    async fn set_labels(&self, id: &EmailId, change: &LabelChange) -> Result<()> {
        (**self).set_labels(id, change).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message() -> RemoteMessage {
        RemoteMessage {
            id: EmailId::from("m1"),
            thread_id: ThreadId::from("t1"),
            from: "a@example.com".to_string(),
            to: "b@example.com".to_string(),
            subject: "Hello".to_string(),
            body_text: "Body".to_string(),
            received_at_ms: Some(1_704_448_800_000),
            labels: vec![system_labels::inbox(), system_labels::unread()],
            is_unread: true,
            raw: serde_json::json!({"id": "m1"}),
        }
    }

    #[test]
    fn into_record_converts_millis() {
        let record = message().into_record(Utc::now());
        assert_eq!(
            record.received_at,
            Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap()
        );
        assert!(!record.is_read);
        assert_eq!(record.body, "Body");
        assert_eq!(record.raw, serde_json::json!({"id": "m1"}));
    }

    #[test]
    fn into_record_falls_back_when_time_missing() {
        let fallback = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut msg = message();
        msg.received_at_ms = None;
        msg.is_unread = false;

        let record = msg.into_record(fallback);
        assert_eq!(record.received_at, fallback);
        assert!(record.is_read);
    }

    #[test]
    fn into_record_falls_back_when_time_out_of_range() {
        let fallback = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        for millis in [253_402_300_800_000, -62_198_755_200_000] {
            let mut msg = message();
            msg.received_at_ms = Some(millis);
            assert_eq!(msg.into_record(fallback).received_at, fallback, "{millis}");
        }
    }

    #[test]
    fn unread_is_derived_from_labels() {
        assert!(RemoteMessage::unread_from_labels(&[system_labels::unread()]));
        assert!(!RemoteMessage::unread_from_labels(&[system_labels::inbox()]));
    }

    #[tokio::test]
    async fn arc_provider_delegates() {
        let mut mock = MockMailProvider::new();
        mock.expect_list_inbox_message_ids()
            .withf(|limit| *limit == 2)
            .returning(|_| Ok(vec![EmailId::from("a"), EmailId::from("b")]));

        let provider = Arc::new(mock);
        let ids = provider.list_inbox_message_ids(2).await.unwrap();
        assert_eq!(ids, vec![EmailId::from("a"), EmailId::from("b")]);
    }
}
