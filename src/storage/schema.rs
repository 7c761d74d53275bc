//! SQL schema definitions as const strings.
//!
//! Timestamps are stored as canonical UTC text (see
//! [`crate::domain::canonical_timestamp`]) so they sort lexically.

/// SQL to create the emails table.
pub const CREATE_EMAILS: &str = r#"
CREATE TABLE IF NOT EXISTS emails (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL DEFAULT '',
    from_address TEXT NOT NULL DEFAULT '',
    to_address TEXT NOT NULL DEFAULT '',
    subject TEXT NOT NULL DEFAULT '',
    message_body TEXT NOT NULL DEFAULT '',
    received_at TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    labels TEXT NOT NULL DEFAULT '[]',
    raw_data TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create email indexes on every column rules filter by.
pub const CREATE_EMAIL_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_emails_from ON emails(from_address);
CREATE INDEX IF NOT EXISTS idx_emails_to ON emails(to_address);
CREATE INDEX IF NOT EXISTS idx_emails_subject ON emails(subject);
CREATE INDEX IF NOT EXISTS idx_emails_received ON emails(received_at DESC);
CREATE INDEX IF NOT EXISTS idx_emails_read ON emails(is_read)
"#;

/// Returns all schema creation statements in order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![CREATE_EMAILS, CREATE_EMAIL_INDEXES]
}
