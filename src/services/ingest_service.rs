//! Inbox ingestion.
//!
//! The [`IngestService`] lists inbox message ids, fetches each message and
//! upserts it into the local store. One bad message does not stop the rest.

use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::providers::email::MailProvider;
use crate::storage::{queries, Database};

/// Outcome of one fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    /// Ids the provider listed.
    pub listed: usize,
    /// Records written to the store.
    pub stored: usize,
    /// Per-message failures (non-fatal).
    pub errors: Vec<String>,
    /// Duration of the fetch.
    pub duration_ms: u64,
}

impl IngestResult {
    /// Returns true if every listed message was stored.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Pulls inbox messages from a provider into the store.
pub struct IngestService<P> {
    provider: P,
    db: Database,
}

impl<P: MailProvider> IngestService<P> {
    pub fn new(provider: P, db: Database) -> Self {
        Self { provider, db }
    }

    /// Fetches up to `limit` inbox messages.
    ///
    /// Fails only if the inbox cannot be listed.
    pub async fn fetch_inbox(&self, limit: usize) -> Result<IngestResult> {
        let start = Instant::now();
        info!(limit, "Fetching inbox");

        let ids = self
            .provider
            .list_inbox_message_ids(limit)
            .await
            .context("failed to list inbox messages")?;

        let mut result = IngestResult {
            listed: ids.len(),
            ..Default::default()
        };

        for id in &ids {
            let message = match self.provider.fetch_message(id).await {
                Ok(message) => message,
                Err(e) => {
                    warn!(email_id = %id, error = %e, "Failed to fetch message, skipping");
                    result.errors.push(format!("fetch {}: {}", id, e));
                    continue;
                }
            };

            let record = message.into_record(Utc::now());
            match queries::emails::upsert(&self.db, &record).await {
                Ok(()) => {
                    debug!(email_id = %id, subject = %record.short_subject(), "Stored message");
                    result.stored += 1;
                }
                Err(e) => {
                    error!(email_id = %id, error = %e, "Failed to store message");
                    result.errors.push(format!("store {}: {}", id, e));
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            listed = result.listed,
            stored = result.stored,
            failed = result.errors.len(),
            "Fetch complete"
        );

        Ok(result)
    }
}
