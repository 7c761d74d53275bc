//! Domain types for gmail-actions.
//!
//! Plain data: mirrored email records, identifiers, labels and the rule
//! model loaded from the rules file. No I/O happens in this module.

mod email;
mod label;
mod rule;
mod types;

pub use email::{canonical_timestamp, is_canonical_range, parse_timestamp, EmailRecord};
pub use label::{system_labels, LabelChange};
pub use rule::{Action, ActionKind, Combinator, Condition, Field, Predicate, Rule};
pub use types::{EmailId, LabelId, ThreadId};
