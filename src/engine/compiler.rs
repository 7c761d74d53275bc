//! Rule compilation.
//!
//! A [`Rule`] is compiled once into a [`CompiledRule`]; the same compiled form
//! drives both the in-memory matcher and the SQL query. Relative date
//! thresholds are resolved against a single `now` taken at compile time.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::filter::{Filter, SqlFragment, TextColumn, TextMatch};
use super::threshold::parse_threshold;
use crate::domain::{Combinator, Condition, EmailRecord, Field, Predicate, Rule};

/// Compiles one condition. Anything that cannot be understood compiles to
/// [`Filter::Never`].
pub fn compile_condition(condition: &Condition, now: DateTime<Utc>) -> Filter {
    if let Field::Unknown(name) = &condition.field {
        warn!(field = %name, "Unknown condition field, condition never matches");
        return Filter::Never;
    }

    if let Some(column) = TextColumn::for_field(&condition.field) {
        let (matching, negated) = match &condition.predicate {
            Predicate::Contains => (TextMatch::Contains, false),
            Predicate::DoesNotContain => (TextMatch::Contains, true),
            Predicate::Equals => (TextMatch::Equals, false),
            Predicate::DoesNotEqual => (TextMatch::Equals, true),
            other => {
                warn!(
                    field = %condition.field,
                    predicate = %other,
                    "Predicate not supported for text field, condition never matches"
                );
                return Filter::Never;
            }
        };
        return Filter::text(column, matching, negated, &condition.value);
    }

    match &condition.predicate {
        Predicate::LessThan | Predicate::GreaterThan => {
            match parse_threshold(&condition.value, now) {
                // Less than N days old: newer than the threshold.
                Ok(threshold) if condition.predicate == Predicate::LessThan => {
                    Filter::received_after(&threshold)
                }
                Ok(threshold) => Filter::received_before(&threshold),
                Err(e) => {
                    warn!(value = %condition.value, error = %e, "Bad date threshold, condition never matches");
                    Filter::Never
                }
            }
        }
        other => {
            warn!(
                field = %condition.field,
                predicate = %other,
                "Predicate not supported for date field, condition never matches"
            );
            Filter::Never
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    Nothing,
    All(Vec<Filter>),
    Any(Vec<Filter>),
}

/// A rule's conditions in executable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    name: String,
    selection: Selection,
}

impl CompiledRule {
    /// Compiles against the current time.
    pub fn compile(rule: &Rule) -> Self {
        Self::compile_at(rule, Utc::now())
    }

    pub fn compile_at(rule: &Rule, now: DateTime<Utc>) -> Self {
        let selection = if rule.conditions.is_empty() {
            debug!(rule = %rule.name, "Rule has no conditions, selects nothing");
            Selection::Nothing
        } else {
            let filters = || {
                rule.conditions
                    .iter()
                    .map(|c| compile_condition(c, now))
                    .collect()
            };
            match &rule.combinator {
                Combinator::All => Selection::All(filters()),
                Combinator::Any => Selection::Any(filters()),
                Combinator::Unknown(name) => {
                    warn!(rule = %rule.name, combinator = %name, "Unknown rule predicate, rule selects nothing");
                    Selection::Nothing
                }
            }
        };

        Self {
            name: rule.name.clone(),
            selection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when no record can ever match.
    pub fn selects_nothing(&self) -> bool {
        matches!(self.selection, Selection::Nothing)
    }

    pub fn filters(&self) -> &[Filter] {
        match &self.selection {
            Selection::Nothing => &[],
            Selection::All(filters) | Selection::Any(filters) => filters,
        }
    }

    pub fn matches(&self, record: &EmailRecord) -> bool {
        match &self.selection {
            Selection::Nothing => false,
            Selection::All(filters) => filters.iter().all(|f| f.matches(record)),
            Selection::Any(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }

    /// WHERE clause for the store, or `None` when the rule selects nothing.
    pub fn to_sql(&self) -> Option<SqlFragment> {
        match &self.selection {
            Selection::Nothing => None,
            Selection::All(filters) => Some(SqlFragment::join(filters, " AND ")),
            Selection::Any(filters) => Some(SqlFragment::join(filters, " OR ")),
        }
    }
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, filters) = match &self.selection {
            Selection::Nothing => return f.write_str("nothing"),
            Selection::All(filters) => ("all", filters),
            Selection::Any(filters) => ("any", filters),
        };
        write!(f, "{label}(")?;
        for (i, filter) in filters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{filter}")?;
        }
        f.write_str(")")
    }
}
