//! Label helpers.
//!
//! Gmail expresses read state and inbox membership as system labels; rule
//! actions are label changes underneath.

use serde::{Deserialize, Serialize};

use super::LabelId;

/// Well-known system label IDs.
pub mod system_labels {
    use super::LabelId;

    /// Returns the inbox label ID.
    pub fn inbox() -> LabelId {
        LabelId::from("INBOX")
    }

    /// Returns the unread marker label ID.
    pub fn unread() -> LabelId {
        LabelId::from("UNREAD")
    }
}

/// A set of labels to add to and remove from one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelChange {
    /// Labels to add.
    pub add: Vec<LabelId>,
    /// Labels to remove.
    pub remove: Vec<LabelId>,
}

impl LabelChange {
    /// Change that marks a message read.
    pub fn mark_read() -> Self {
        Self {
            add: vec![],
            remove: vec![system_labels::unread()],
        }
    }

    /// Change that marks a message unread.
    pub fn mark_unread() -> Self {
        Self {
            add: vec![system_labels::unread()],
            remove: vec![],
        }
    }

    /// Change that moves a message out of the inbox into `destination`.
    pub fn move_to(destination: impl Into<LabelId>) -> Self {
        Self {
            add: vec![destination.into()],
            remove: vec![system_labels::inbox()],
        }
    }

    /// Applies this change to a local label list, keeping existing order.
    pub fn apply_to(&self, labels: &[LabelId]) -> Vec<LabelId> {
        let mut result: Vec<LabelId> = labels
            .iter()
            .filter(|l| !self.remove.contains(l))
            .cloned()
            .collect();
        for label in &self.add {
            if !result.contains(label) {
                result.push(label.clone());
            }
        }
        result
    }
}
