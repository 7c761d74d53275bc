//! Email record operations.
//!
//! Every write stamps `updated_at` so that it strictly increases per row,
//! even when two writes land in the same microsecond.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::domain::{
    canonical_timestamp, is_canonical_range, parse_timestamp, EmailId, EmailRecord, LabelId, Rule,
    ThreadId,
};
use crate::engine::CompiledRule;
use crate::storage::database::{Database, DatabaseError, Result};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, thread_id, from_address, to_address, subject, message_body,
        received_at, is_read, labels, raw_data, created_at, updated_at
    FROM emails
"#;

const ORDER_NEWEST_FIRST: &str = "ORDER BY received_at DESC, id ASC";

/// Inserts a record or replaces every content field of an existing one.
///
/// `created_at` survives replacement.
pub async fn upsert(db: &Database, record: &EmailRecord) -> Result<()> {
    if record.id.as_str().trim().is_empty() {
        return Err(DatabaseError::InvalidRecord(
            "email id must not be empty".to_string(),
        ));
    }
    if !is_canonical_range(&record.received_at) {
        return Err(DatabaseError::InvalidRecord(format!(
            "received_at {} is outside years 0000-9999",
            record.received_at
        )));
    }

    let record = record.clone();

    db.transaction(move |tx| {
        let stamp = next_write_stamp(tx, &record.id)?;
        let labels_json = serde_json::to_string(&record.labels)?;
        let raw_json = serde_json::to_string(&record.raw)?;

        tx.execute(
            r#"
            INSERT INTO emails (
                id, thread_id, from_address, to_address, subject, message_body,
                received_at, is_read, labels, raw_data, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11, ?11
            )
            ON CONFLICT(id) DO UPDATE SET
                thread_id = excluded.thread_id,
                from_address = excluded.from_address,
                to_address = excluded.to_address,
                subject = excluded.subject,
                message_body = excluded.message_body,
                received_at = excluded.received_at,
                is_read = excluded.is_read,
                labels = excluded.labels,
                raw_data = excluded.raw_data,
                updated_at = excluded.updated_at
            "#,
            params![
                record.id.0,
                record.thread_id.0,
                record.from,
                record.to,
                record.subject,
                record.body,
                canonical_timestamp(&record.received_at),
                record.is_read as i32,
                labels_json,
                raw_json,
                stamp,
            ],
        )?;

        Ok(())
    })
    .await
}

/// Retrieves every record, newest first, ties broken by id.
pub async fn get_all(db: &Database) -> Result<Vec<EmailRecord>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} {ORDER_NEWEST_FIRST}"))?;
        let rows = stmt.query_map([], row_to_record)?;
        let records: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(records?)
    })
    .await
}

/// Retrieves a record by its id.
pub async fn get_by_id(db: &Database, email_id: &EmailId) -> Result<Option<EmailRecord>> {
    let email_id = email_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
        let result = stmt.query_row([&email_id.0], row_to_record).optional()?;
        Ok(result)
    })
    .await
}

/// Updates the read status of a record.
pub async fn set_read(db: &Database, email_id: &EmailId, is_read: bool) -> Result<()> {
    let email_id = email_id.clone();

    db.transaction(move |tx| {
        let stamp = next_write_stamp(tx, &email_id)?;
        let changed = tx.execute(
            "UPDATE emails SET is_read = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_read as i32, stamp, email_id.0],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(email_id.0));
        }
        Ok(())
    })
    .await
}

/// Replaces the label list of a record.
pub async fn set_labels(db: &Database, email_id: &EmailId, labels: &[LabelId]) -> Result<()> {
    let email_id = email_id.clone();
    let labels_json = serde_json::to_string(labels)?;

    db.transaction(move |tx| {
        let stamp = next_write_stamp(tx, &email_id)?;
        let changed = tx.execute(
            "UPDATE emails SET labels = ?1, updated_at = ?2 WHERE id = ?3",
            params![labels_json, stamp, email_id.0],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(email_id.0));
        }
        Ok(())
    })
    .await
}

/// Deletes every record and returns how many were removed.
pub async fn clear(db: &Database) -> Result<usize> {
    db.with_conn(|conn| Ok(conn.execute("DELETE FROM emails", [])?))
        .await
}

/// Counts stored records.
pub async fn count(db: &Database) -> Result<u64> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
        Ok(count)
    })
    .await
}

/// Retrieves every record a rule selects, resolving relative dates against now.
pub async fn query_by_rule(db: &Database, rule: &Rule) -> Result<Vec<EmailRecord>> {
    query_compiled(db, &CompiledRule::compile(rule)).await
}

/// Retrieves every record an already compiled rule selects, newest first.
pub async fn query_compiled(db: &Database, rule: &CompiledRule) -> Result<Vec<EmailRecord>> {
    let Some(fragment) = rule.to_sql() else {
        debug!(rule = %rule.name(), "Rule selects nothing, skipping query");
        return Ok(Vec::new());
    };

    let sql = format!("{SELECT_COLUMNS} WHERE {} {ORDER_NEWEST_FIRST}", fragment.sql);
    debug!(rule = %rule.name(), sql = %fragment.sql, params = ?fragment.params, "Querying by rule");

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(fragment.params.iter()), row_to_record)?;
        let records: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(records?)
    })
    .await
}

/// Timestamp for the next write to `email_id`, strictly after its previous one.
fn next_write_stamp(conn: &Connection, email_id: &EmailId) -> Result<String> {
    let previous: Option<String> = conn
        .query_row(
            "SELECT updated_at FROM emails WHERE id = ?1",
            [&email_id.0],
            |row| row.get(0),
        )
        .optional()?;

    let now = Utc::now().trunc_subsecs(6);
    let stamp = match previous.as_deref().and_then(parse_timestamp) {
        Some(previous) if now <= previous => previous + Duration::microseconds(1),
        _ => now,
    };

    Ok(canonical_timestamp(&stamp))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp {text:?}").into(),
        )
    })
}

/// Decodes a JSON column, logging and substituting the default when the
/// stored text is corrupt so one bad row does not fail a whole query.
fn json_column<T>(id: &str, column: &str, text: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!(email_id = %id, column, error = %e, "Corrupt JSON column, using empty value");
        T::default()
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EmailRecord> {
    let id: String = row.get(0)?;
    let labels_json: String = row.get(8)?;
    let raw_json: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    let labels: Vec<LabelId> = json_column(&id, "labels", &labels_json);
    let raw: serde_json::Value = json_column(&id, "raw_data", &raw_json);

    Ok(EmailRecord {
        id: EmailId(id),
        thread_id: ThreadId(row.get(1)?),
        from: row.get(2)?,
        to: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        received_at: timestamp_column(row, 6)?,
        is_read: row.get::<_, i32>(7)? != 0,
        labels,
        raw,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}
