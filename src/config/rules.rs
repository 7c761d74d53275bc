//! Rules file loading.
//!
//! The rules file is user-edited JSON of the form `{"rules": [...]}`. Loading
//! never fails: a missing or malformed file yields an empty rule set and a log
//! line. A single rule that does not fit the rule shape is skipped on its own.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::Rule;

/// Ordered list of rules from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<serde_json::Value>,
}

impl RuleSet {
    /// Parses rules from JSON text.
    ///
    /// Fails only when the text is not a JSON object with an optional `rules`
    /// array. Entries of that array that cannot be read as a rule are logged
    /// and left out.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let file: RulesFile = serde_json::from_str(text)?;

        let rules = file
            .rules
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<Rule>(entry) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(index, error = %e, "Skipping unreadable rule");
                    None
                }
            })
            .collect();

        Ok(Self { rules })
    }

    /// Loads rules from `path`, falling back to an empty set.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Rules file not found, no rules loaded");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read rules file, no rules loaded");
                return Self::default();
            }
        };

        match Self::from_json(&text) {
            Ok(set) => {
                info!(path = %path.display(), count = set.rules.len(), "Loaded rules");
                set
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed rules file, no rules loaded");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Combinator, Condition, Field};
    use crate::engine::{compile_condition, Filter};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RuleSet::load(&dir.path().join("rules.json")).is_empty());
    }

    #[test]
    fn malformed_file_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rules": [{{"name": "x",}}]}}"#).unwrap();
        assert!(RuleSet::load(file.path()).is_empty());
    }

    #[test]
    fn missing_rules_key_is_empty() {
        assert_eq!(RuleSet::from_json("{}").unwrap(), RuleSet::default());
    }

    #[test]
    fn bad_entries_do_not_discard_good_rules() {
        let set = RuleSet::from_json(
            r#"{
                "rules": [
                    {"name": "Good", "conditions": [{"field": "from", "predicate": "contains", "value": "boss"}]},
                    {"name": "No field", "conditions": [{"predicate": "contains", "value": "x"}]},
                    {"name": "Numeric", "conditions": [{"field": "receivedDate", "predicate": "less-than", "value": 30}]},
                    {"name": "Broken", "conditions": "oops"},
                    "not a rule"
                ]
            }"#,
        )
        .unwrap();

        let names: Vec<&str> = set.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Good", "No field", "Numeric"]);
        assert_eq!(
            set.rules[0].conditions[0],
            Condition::new("from", "contains", "boss")
        );
        assert_eq!(set.rules[1].conditions[0].field, Field::Unknown(String::new()));
        assert_eq!(
            compile_condition(&set.rules[1].conditions[0], Utc::now()),
            Filter::Never
        );
        assert_eq!(set.rules[2].conditions[0].value, "30");
    }

    #[test]
    fn rules_that_are_not_an_array_fail_the_file() {
        assert!(RuleSet::from_json(r#"{"rules": 5}"#).is_err());
    }

    #[test]
    fn loads_rules_in_file_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "rules": [
                    {{
                        "name": "Old newsletters",
                        "conditions": [
                            {{"field": "subject", "predicate": "contains", "value": "newsletter"}},
                            {{"field": "receivedDate", "predicate": "greater-than", "value": "30 days"}}
                        ],
                        "actions": [{{"action": "markRead"}}]
                    }},
                    {{
                        "name": "Boss",
                        "predicate": "any",
                        "conditions": [
                            {{"field": "from", "predicate": "contains", "value": "boss"}}
                        ],
                        "actions": [{{"action": "move", "destination": "Priority"}}]
                    }}
                ]
            }}"#
        )
        .unwrap();

        let set = RuleSet::load(file.path());
        assert_eq!(set.len(), 2);
        assert_eq!(set.rules[0].name, "Old newsletters");
        assert_eq!(set.rules[0].combinator, Combinator::All);
        assert_eq!(
            set.rules[0].conditions[1],
            Condition::new("receivedDate", "greater-than", "30 days")
        );
        assert_eq!(set.rules[1].combinator, Combinator::Any);
        assert_eq!(set.rules[1].actions, vec![Action::move_to("Priority")]);
    }
}
