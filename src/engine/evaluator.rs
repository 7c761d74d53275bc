//! Entry points for evaluating rules against records and the store.

use chrono::{DateTime, Utc};

use super::compiler::CompiledRule;
use crate::domain::{EmailRecord, Rule};
use crate::storage::{queries, Database, Result};

/// Tests one record against a rule, resolving relative dates against now.
pub fn evaluate(record: &EmailRecord, rule: &Rule) -> bool {
    CompiledRule::compile(rule).matches(record)
}

/// Like [`evaluate`] with an explicit clock.
pub fn evaluate_at(record: &EmailRecord, rule: &Rule, now: DateTime<Utc>) -> bool {
    CompiledRule::compile_at(rule, now).matches(record)
}

/// Filters records in memory with an already compiled rule.
pub fn filter_records<'a>(
    records: &'a [EmailRecord],
    rule: &'a CompiledRule,
) -> impl Iterator<Item = &'a EmailRecord> + 'a {
    records.iter().filter(move |r| rule.matches(r))
}

/// Returns every stored record the rule selects.
pub async fn select_matches(db: &Database, rule: &Rule) -> Result<Vec<EmailRecord>> {
    queries::emails::query_by_rule(db, rule).await
}
