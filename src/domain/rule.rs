//! Rule domain types.
//!
//! Rules come from a user-edited JSON file, so every enum here keeps an
//! `Unknown` variant carrying the original text. Unknown values are never an
//! error at load time; they compile to filters that match nothing.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Lower-cases and drops everything except letters and digits, so that
/// `"Does not Contain"`, `"does-not-contain"` and `"doesNotContain"` compare equal.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Reads a JSON scalar as text. Numbers and booleans keep their JSON
/// spelling and null reads as empty, so `"value": 30` means `"30"`.
fn loose_text<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let text = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };
    Ok(T::from(text))
}

/// Email field a condition tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Field {
    From,
    To,
    Subject,
    Message,
    ReceivedDate,
    Unknown(String),
}

impl Default for Field {
    fn default() -> Self {
        Field::Unknown(String::new())
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        match normalize(&name).as_str() {
            "from" => Field::From,
            "to" => Field::To,
            "subject" => Field::Subject,
            "message" | "body" | "messagebody" => Field::Message,
            "receiveddate" | "receiveddatetime" | "datereceived" | "received" => {
                Field::ReceivedDate
            }
            _ => Field::Unknown(name),
        }
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.to_string()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::From => f.write_str("from"),
            Field::To => f.write_str("to"),
            Field::Subject => f.write_str("subject"),
            Field::Message => f.write_str("message"),
            Field::ReceivedDate => f.write_str("receivedDate"),
            Field::Unknown(name) => f.write_str(name),
        }
    }
}

/// Comparison a condition applies to its field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Predicate {
    Contains,
    DoesNotContain,
    Equals,
    DoesNotEqual,
    /// Received more recently than the threshold.
    LessThan,
    /// Received before the threshold.
    GreaterThan,
    Unknown(String),
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::Unknown(String::new())
    }
}

impl From<String> for Predicate {
    fn from(name: String) -> Self {
        match normalize(&name).as_str() {
            "contains" => Predicate::Contains,
            "doesnotcontain" | "notcontains" => Predicate::DoesNotContain,
            "equals" | "equal" => Predicate::Equals,
            "doesnotequal" | "notequals" | "notequal" => Predicate::DoesNotEqual,
            "lessthan" => Predicate::LessThan,
            "greaterthan" => Predicate::GreaterThan,
            _ => Predicate::Unknown(name),
        }
    }
}

impl From<Predicate> for String {
    fn from(predicate: Predicate) -> Self {
        predicate.to_string()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Contains => f.write_str("contains"),
            Predicate::DoesNotContain => f.write_str("does-not-contain"),
            Predicate::Equals => f.write_str("equals"),
            Predicate::DoesNotEqual => f.write_str("does-not-equal"),
            Predicate::LessThan => f.write_str("less-than"),
            Predicate::GreaterThan => f.write_str("greater-than"),
            Predicate::Unknown(name) => f.write_str(name),
        }
    }
}

/// How a rule combines its conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Combinator {
    #[default]
    All,
    Any,
    Unknown(String),
}

impl From<String> for Combinator {
    fn from(name: String) -> Self {
        match normalize(&name).as_str() {
            "all" => Combinator::All,
            "any" => Combinator::Any,
            _ => Combinator::Unknown(name),
        }
    }
}

impl From<Combinator> for String {
    fn from(combinator: Combinator) -> Self {
        combinator.to_string()
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::All => f.write_str("all"),
            Combinator::Any => f.write_str("any"),
            Combinator::Unknown(name) => f.write_str(name),
        }
    }
}

/// Kind of mutation an action performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    MarkRead,
    MarkUnread,
    Move,
    Unknown(String),
}

impl Default for ActionKind {
    fn default() -> Self {
        ActionKind::Unknown(String::new())
    }
}

impl From<String> for ActionKind {
    fn from(name: String) -> Self {
        match normalize(&name).as_str() {
            "markread" | "markasread" => ActionKind::MarkRead,
            "markunread" | "markasunread" => ActionKind::MarkUnread,
            "move" | "movemessage" | "moveto" => ActionKind::Move,
            _ => ActionKind::Unknown(name),
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::MarkRead => f.write_str("markRead"),
            ActionKind::MarkUnread => f.write_str("markUnread"),
            ActionKind::Move => f.write_str("move"),
            ActionKind::Unknown(name) => f.write_str(name),
        }
    }
}

/// One field/predicate/value test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, deserialize_with = "loose_text")]
    pub field: Field,
    #[serde(default, deserialize_with = "loose_text")]
    pub predicate: Predicate,
    #[serde(default, deserialize_with = "loose_text")]
    pub value: String,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        predicate: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: Field::from(field.into()),
            predicate: Predicate::from(predicate.into()),
            value: value.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.field, self.predicate, self.value)
    }
}

/// One mutation applied to every record a rule selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action", default)]
    pub kind: ActionKind,
    /// Target label, required by [`ActionKind::Move`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl Action {
    pub fn mark_read() -> Self {
        Self {
            kind: ActionKind::MarkRead,
            destination: None,
        }
    }

    pub fn mark_unread() -> Self {
        Self {
            kind: ActionKind::MarkUnread,
            destination: None,
        }
    }

    pub fn move_to(destination: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Move,
            destination: Some(destination.into()),
        }
    }

    /// The destination, if present and not blank.
    pub fn destination(&self) -> Option<&str> {
        self.destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.destination {
            Some(destination) => write!(f, "{} -> {}", self.kind, destination),
            None => write!(f, "{}", self.kind),
        }
    }
}

fn default_rule_name() -> String {
    "Unnamed Rule".to_string()
}

/// A named set of conditions and the actions to run on matching email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "default_rule_name")]
    pub name: String,
    #[serde(rename = "predicate", default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    /// Rule whose conditions must all hold.
    pub fn all(name: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.into(),
            combinator: Combinator::All,
            conditions,
            actions: Vec::new(),
        }
    }

    /// Rule where any single condition suffices.
    pub fn any(name: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.into(),
            combinator: Combinator::Any,
            conditions,
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn field_accepts_both_spellings() {
        assert_eq!(Field::from("Received Date".to_string()), Field::ReceivedDate);
        assert_eq!(Field::from("receivedDate".to_string()), Field::ReceivedDate);
        assert_eq!(Field::from("date received".to_string()), Field::ReceivedDate);
        assert_eq!(
            Field::from("Received Date/Time".to_string()),
            Field::ReceivedDate
        );
        assert_eq!(Field::from("FROM".to_string()), Field::From);
        assert_eq!(
            Field::from("cc".to_string()),
            Field::Unknown("cc".to_string())
        );
    }

    #[test]
    fn predicate_accepts_both_spellings() {
        assert_eq!(
            Predicate::from("Does not Contain".to_string()),
            Predicate::DoesNotContain
        );
        assert_eq!(
            Predicate::from("does-not-equal".to_string()),
            Predicate::DoesNotEqual
        );
        assert_eq!(Predicate::from("Less than".to_string()), Predicate::LessThan);
        assert_eq!(
            Predicate::from("greater-than".to_string()),
            Predicate::GreaterThan
        );
        assert!(matches!(
            Predicate::from("matches".to_string()),
            Predicate::Unknown(_)
        ));
    }

    #[test]
    fn action_kind_accepts_both_spellings() {
        assert_eq!(ActionKind::from("Mark as Read".to_string()), ActionKind::MarkRead);
        assert_eq!(ActionKind::from("markUnread".to_string()), ActionKind::MarkUnread);
        assert_eq!(ActionKind::from("Move Message".to_string()), ActionKind::Move);
        assert_eq!(
            ActionKind::from("delete".to_string()),
            ActionKind::Unknown("delete".to_string())
        );
    }

    #[test]
    fn incomplete_condition_reads_as_unknown() {
        let condition: Condition =
            serde_json::from_str(r#"{"predicate": "contains", "value": "x"}"#).unwrap();
        assert_eq!(condition.field, Field::Unknown(String::new()));

        let condition: Condition = serde_json::from_str(r#"{"field": "subject"}"#).unwrap();
        assert_eq!(condition.predicate, Predicate::Unknown(String::new()));
        assert_eq!(condition.value, "");
    }

    #[test]
    fn scalar_values_read_as_text() {
        let condition: Condition = serde_json::from_str(
            r#"{"field": "receivedDate", "predicate": "less-than", "value": 30}"#,
        )
        .unwrap();
        assert_eq!(condition.value, "30");

        let condition: Condition =
            serde_json::from_str(r#"{"field": "subject", "predicate": "equals", "value": null}"#)
                .unwrap();
        assert_eq!(condition.value, "");
    }

    #[test]
    fn rule_deserializes_from_rules_file_shape() {
        let json = r#"{
            "name": "Newsletters",
            "predicate": "All",
            "conditions": [
                {"field": "Subject", "predicate": "Contains", "value": "newsletter"},
                {"field": "Received Date", "predicate": "Greater than", "value": "30 days"}
            ],
            "actions": [
                {"action": "Mark as Read"},
                {"action": "Move Message", "destination": "Archive"}
            ]
        }"#;

        let rule: Rule = serde_json::from_str(json).unwrap();

        assert_eq!(rule.name, "Newsletters");
        assert_eq!(rule.combinator, Combinator::All);
        assert_eq!(
            rule.conditions,
            vec![
                Condition::new("subject", "contains", "newsletter"),
                Condition::new("receivedDate", "greater-than", "30 days"),
            ]
        );
        assert_eq!(
            rule.actions,
            vec![Action::mark_read(), Action::move_to("Archive")]
        );
    }

    #[test]
    fn rule_defaults_fill_missing_keys() {
        let rule: Rule = serde_json::from_str("{}").unwrap();
        assert_eq!(rule.name, "Unnamed Rule");
        assert_eq!(rule.combinator, Combinator::All);
        assert!(rule.conditions.is_empty());
        assert!(rule.actions.is_empty());
    }

    #[test]
    fn unknown_values_survive_round_trip() {
        let rule = Rule {
            name: "odd".to_string(),
            combinator: Combinator::Unknown("most".to_string()),
            conditions: vec![Condition::new("cc", "contains", "x")],
            actions: vec![Action {
                kind: ActionKind::Unknown("delete".to_string()),
                destination: None,
            }],
        };

        let json = serde_json::to_string(&rule).unwrap();
        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn blank_destination_is_absent() {
        let action = Action {
            kind: ActionKind::Move,
            destination: Some("   ".to_string()),
        };
        assert_eq!(action.destination(), None);
        assert_eq!(Action::move_to("Work").destination(), Some("Work"));
    }

    #[test]
    fn display_uses_canonical_names() {
        let condition = Condition::new("Received Date", "Less than", "2 days");
        assert_eq!(condition.to_string(), r#"receivedDate less-than "2 days""#);
        assert_eq!(Action::move_to("Work").to_string(), "move -> Work");
    }
}
