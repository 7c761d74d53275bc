//! Rule engine.
//!
//! Rules compile to [`Filter`]s that run either in memory or as SQL against
//! the local store. The two backends must agree on every record.

mod compiler;
mod evaluator;
mod filter;
mod threshold;

pub use compiler::{compile_condition, CompiledRule};
pub use evaluator::{evaluate, evaluate_at, filter_records, select_matches};
pub use filter::{fold_case, Filter, SqlFragment, TextColumn, TextMatch, FOLD_CASE_SQL_FN};
pub use threshold::{parse_threshold, ThresholdError, DAYS_PER_MONTH};
