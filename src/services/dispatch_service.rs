//! Rule action dispatch.
//!
//! The [`ActionDispatcher`] runs rules in order: select matching records from
//! the store, then apply each action to each record. Every (record, action)
//! pair is attempted once and reported on its own; a failure never stops the
//! batch.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Action, ActionKind, EmailId, EmailRecord, LabelChange, Rule};
use crate::engine::CompiledRule;
use crate::providers::email::{MailProvider, ProviderError};
use crate::storage::{queries, Database, DatabaseError};

/// Why one action on one record did not complete.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The rule itself is unusable; nothing was sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote change failed; the local mirror was left alone.
    #[error("remote update failed: {0}")]
    Remote(#[from] ProviderError),

    /// The remote change succeeded but the local mirror did not follow.
    #[error("local update failed: {0}")]
    Local(#[from] DatabaseError),
}

/// Outcome of one action on one record.
#[derive(Debug)]
pub struct ActionReport {
    pub email_id: EmailId,
    pub action: Action,
    pub result: Result<(), ActionError>,
}

impl ActionReport {
    pub fn is_applied(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of one rule.
#[derive(Debug)]
pub struct RuleReport {
    pub rule: String,
    /// Records the rule selected.
    pub matched: usize,
    pub actions: Vec<ActionReport>,
    /// Set when the store query failed; `matched` is then zero.
    pub query_error: Option<String>,
}

impl RuleReport {
    fn new(rule: &Rule) -> Self {
        Self {
            rule: rule.name.clone(),
            matched: 0,
            actions: Vec::new(),
            query_error: None,
        }
    }

    pub fn applied(&self) -> usize {
        self.actions.iter().filter(|a| a.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.actions.len() - self.applied()
    }
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub rules: Vec<RuleReport>,
    /// Sum of matches over all processed rules.
    pub records_processed: usize,
    /// True if the stop signal ended the run early.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn applied(&self) -> usize {
        self.rules.iter().map(RuleReport::applied).sum()
    }

    pub fn failed(&self) -> usize {
        self.rules.iter().map(RuleReport::failed).sum()
    }

    pub fn rule(&self, name: &str) -> Option<&RuleReport> {
        self.rules.iter().find(|r| r.rule == name)
    }
}

/// Applies rule actions to the remote mailbox and the local mirror.
pub struct ActionDispatcher<P> {
    provider: P,
    db: Database,
    dry_run: bool,
}

impl<P: MailProvider> ActionDispatcher<P> {
    pub fn new(provider: P, db: Database) -> Self {
        Self {
            provider,
            db,
            dry_run: false,
        }
    }

    /// In dry-run mode rules are matched and reported but no action runs.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Processes rules in order, checking `stop` before each rule.
    pub async fn process_all(&self, rules: &[Rule], stop: &CancellationToken) -> RunSummary {
        let mut summary = RunSummary {
            run_id: Uuid::new_v4(),
            rules: Vec::with_capacity(rules.len()),
            records_processed: 0,
            cancelled: false,
        };

        info!(run_id = %summary.run_id, rules = rules.len(), dry_run = self.dry_run, "Starting rule run");

        for rule in rules {
            if stop.is_cancelled() {
                warn!(run_id = %summary.run_id, rule = %rule.name, "Run cancelled before rule");
                summary.cancelled = true;
                break;
            }

            let report = self.process_rule(rule).await;
            summary.records_processed += report.matched;
            summary.rules.push(report);
        }

        info!(
            run_id = %summary.run_id,
            rules = summary.rules.len(),
            records = summary.records_processed,
            applied = summary.applied(),
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "Rule run complete"
        );

        summary
    }

    /// Selects a rule's matches and applies its actions to each of them.
    pub async fn process_rule(&self, rule: &Rule) -> RuleReport {
        let mut report = RuleReport::new(rule);
        let compiled = CompiledRule::compile(rule);

        let matches = match queries::emails::query_compiled(&self.db, &compiled).await {
            Ok(matches) => matches,
            Err(e) => {
                error!(rule = %rule.name, error = %e, "Failed to query matches");
                report.query_error = Some(e.to_string());
                return report;
            }
        };

        report.matched = matches.len();
        info!(rule = %rule.name, matched = report.matched, "Rule matched");

        if rule.actions.is_empty() {
            debug!(rule = %rule.name, "Rule has no actions");
            return report;
        }

        if self.dry_run {
            for record in &matches {
                info!(rule = %rule.name, email_id = %record.id, subject = %record.short_subject(), "Would apply actions");
            }
            return report;
        }

        for record in &matches {
            for action in &rule.actions {
                let result = self.apply_action(record, action).await;
                match &result {
                    Ok(()) => {
                        info!(rule = %rule.name, email_id = %record.id, action = %action, "Action applied")
                    }
                    Err(e) => {
                        warn!(rule = %rule.name, email_id = %record.id, action = %action, error = %e, "Action failed")
                    }
                }
                report.actions.push(ActionReport {
                    email_id: record.id.clone(),
                    action: action.clone(),
                    result,
                });
            }
        }

        report
    }

    /// Applies one action to one record: remote first, then the local mirror.
    pub async fn apply_action(
        &self,
        record: &EmailRecord,
        action: &Action,
    ) -> Result<(), ActionError> {
        match &action.kind {
            ActionKind::MarkRead => self.set_read_state(record, true).await,
            ActionKind::MarkUnread => self.set_read_state(record, false).await,
            ActionKind::Move => {
                let destination = action.destination().ok_or_else(|| {
                    ActionError::Configuration("move action has no destination".to_string())
                })?;
                self.move_to(record, destination).await
            }
            ActionKind::Unknown(name) => Err(ActionError::Configuration(format!(
                "unknown action {:?}",
                name
            ))),
        }
    }

    async fn set_read_state(&self, record: &EmailRecord, is_read: bool) -> Result<(), ActionError> {
        let change = if is_read {
            LabelChange::mark_read()
        } else {
            LabelChange::mark_unread()
        };

        self.provider.set_labels(&record.id, &change).await?;
        queries::emails::set_read(&self.db, &record.id, is_read).await?;
        self.mirror_labels(record, &change).await;
        Ok(())
    }

    async fn move_to(&self, record: &EmailRecord, destination: &str) -> Result<(), ActionError> {
        let change = LabelChange::move_to(destination);
        self.provider.set_labels(&record.id, &change).await?;
        self.mirror_labels(record, &change).await;
        Ok(())
    }

    /// Applies a remote label change to the stored label list. Failures are
    /// only logged; the remote change already happened.
    async fn mirror_labels(&self, record: &EmailRecord, change: &LabelChange) {
        let current = match queries::emails::get_by_id(&self.db, &record.id).await {
            Ok(Some(stored)) => stored.labels,
            _ => record.labels.clone(),
        };
        let labels = change.apply_to(&current);
        if let Err(e) = queries::emails::set_labels(&self.db, &record.id, &labels).await {
            warn!(email_id = %record.id, error = %e, "Failed to mirror labels locally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{system_labels, Condition, LabelId};
    use crate::providers::email::MockMailProvider;
    use chrono::{Duration, Utc};

    async fn seeded_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        for (id, subject) in [("e1", "Weekly newsletter"), ("e2", "Newsletter digest")] {
            let mut record = EmailRecord::new(id, Utc::now() - Duration::days(2));
            record.subject = subject.to_string();
            record.labels = vec![system_labels::inbox(), system_labels::unread()];
            queries::emails::upsert(&db, &record).await.unwrap();
        }
        db
    }

    fn newsletter_rule(actions: Vec<Action>) -> Rule {
        Rule::all(
            "newsletters",
            vec![Condition::new("subject", "contains", "newsletter")],
        )
        .with_actions(actions)
    }

    async fn is_read(db: &Database, id: &str) -> bool {
        queries::emails::get_by_id(db, &EmailId::from(id))
            .await
            .unwrap()
            .unwrap()
            .is_read
    }

    #[tokio::test]
    async fn remote_failure_leaves_local_state_and_continues() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider
            .expect_set_labels()
            .withf(|id, change| *change == LabelChange::mark_read() && id.as_str() == "e2")
            .times(1)
            .returning(|_, _| Err(ProviderError::Connection("reset".to_string())));
        provider
            .expect_set_labels()
            .withf(|id, change| *change == LabelChange::mark_read() && id.as_str() == "e1")
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = ActionDispatcher::new(provider, db.clone());
        let summary = dispatcher
            .process_all(
                &[newsletter_rule(vec![Action::mark_read()])],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.records_processed, 2);
        assert_eq!(summary.applied(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(is_read(&db, "e1").await);
        assert!(!is_read(&db, "e2").await);

        let failure = summary.rules[0]
            .actions
            .iter()
            .find(|a| !a.is_applied())
            .unwrap();
        assert_eq!(failure.email_id, EmailId::from("e2"));
        assert!(matches!(failure.result, Err(ActionError::Remote(_))));
    }

    #[tokio::test]
    async fn move_without_destination_never_calls_remote() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider.expect_set_labels().never();

        let dispatcher = ActionDispatcher::new(provider, db);
        let action = Action {
            kind: ActionKind::Move,
            destination: Some("  ".to_string()),
        };
        let report = dispatcher.process_rule(&newsletter_rule(vec![action])).await;

        assert_eq!(report.matched, 2);
        assert_eq!(report.failed(), 2);
        assert!(report
            .actions
            .iter()
            .all(|a| matches!(a.result, Err(ActionError::Configuration(_)))));
    }

    #[tokio::test]
    async fn unknown_action_is_configuration_error() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider.expect_set_labels().never();

        let dispatcher = ActionDispatcher::new(provider, db);
        let record = EmailRecord::new("e1", Utc::now());
        let action = Action {
            kind: ActionKind::Unknown("delete".to_string()),
            destination: None,
        };

        let err = dispatcher.apply_action(&record, &action).await.unwrap_err();
        assert!(matches!(err, ActionError::Configuration(msg) if msg.contains("delete")));
    }

    #[tokio::test]
    async fn move_mirrors_labels_locally() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider
            .expect_set_labels()
            .withf(|_, change| *change == LabelChange::move_to("Archive"))
            .times(2)
            .returning(|_, _| Ok(()));

        let dispatcher = ActionDispatcher::new(provider, db.clone());
        let report = dispatcher
            .process_rule(&newsletter_rule(vec![Action::move_to("Archive")]))
            .await;

        assert_eq!(report.applied(), 2);
        let stored = queries::emails::get_by_id(&db, &EmailId::from("e1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.labels,
            vec![system_labels::unread(), LabelId::from("Archive")]
        );
    }

    #[tokio::test]
    async fn read_state_keeps_unread_label_in_step() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider.expect_set_labels().times(2).returning(|_, _| Ok(()));

        let dispatcher = ActionDispatcher::new(provider, db.clone());
        let record = queries::emails::get_by_id(&db, &EmailId::from("e1"))
            .await
            .unwrap()
            .unwrap();

        dispatcher.apply_action(&record, &Action::mark_read()).await.unwrap();
        let read = queries::emails::get_by_id(&db, &record.id).await.unwrap().unwrap();
        assert!(read.is_read);
        assert_eq!(read.labels, vec![system_labels::inbox()]);

        dispatcher.apply_action(&record, &Action::mark_unread()).await.unwrap();
        let unread = queries::emails::get_by_id(&db, &record.id).await.unwrap().unwrap();
        assert!(!unread.is_read);
        assert_eq!(
            unread.labels,
            vec![system_labels::inbox(), system_labels::unread()]
        );
    }

    #[tokio::test]
    async fn local_failure_after_remote_success_is_reported() {
        let db = Database::open_in_memory().await.unwrap();
        let mut provider = MockMailProvider::new();
        provider.expect_set_labels().times(1).returning(|_, _| Ok(()));

        let dispatcher = ActionDispatcher::new(provider, db);
        let ghost = EmailRecord::new("ghost", Utc::now());

        let err = dispatcher
            .apply_action(&ghost, &Action::mark_unread())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Local(DatabaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn rule_without_actions_only_reports_matches() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider.expect_set_labels().never();

        let dispatcher = ActionDispatcher::new(provider, db);
        let report = dispatcher.process_rule(&newsletter_rule(vec![])).await;

        assert_eq!(report.matched, 2);
        assert!(report.actions.is_empty());
    }

    #[tokio::test]
    async fn dry_run_performs_no_actions() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider.expect_set_labels().never();

        let dispatcher = ActionDispatcher::new(provider, db.clone()).with_dry_run(true);
        let report = dispatcher
            .process_rule(&newsletter_rule(vec![Action::mark_read()]))
            .await;

        assert_eq!(report.matched, 2);
        assert!(report.actions.is_empty());
        assert!(!is_read(&db, "e1").await);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_next_rule() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider.expect_set_labels().never();

        let stop = CancellationToken::new();
        stop.cancel();

        let dispatcher = ActionDispatcher::new(provider, db);
        let summary = dispatcher
            .process_all(&[newsletter_rule(vec![Action::mark_read()])], &stop)
            .await;

        assert!(summary.cancelled);
        assert!(summary.rules.is_empty());
    }

    #[tokio::test]
    async fn rules_run_in_order_and_share_records() {
        let db = seeded_db().await;
        let mut provider = MockMailProvider::new();
        provider.expect_set_labels().times(4).returning(|_, _| Ok(()));

        let dispatcher = ActionDispatcher::new(provider, db.clone());
        let rules = vec![
            newsletter_rule(vec![Action::mark_read()]),
            Rule::any("digest", vec![Condition::new("subject", "contains", "digest")])
                .with_actions(vec![Action::mark_unread()]),
            Rule::all("weekly", vec![Condition::new("subject", "equals", "weekly newsletter")])
                .with_actions(vec![Action::mark_unread()]),
        ];

        let summary = dispatcher.process_all(&rules, &CancellationToken::new()).await;

        let names: Vec<&str> = summary.rules.iter().map(|r| r.rule.as_str()).collect();
        assert_eq!(names, vec!["newsletters", "digest", "weekly"]);
        assert_eq!(summary.rule("digest").unwrap().matched, 1);
        assert_eq!(summary.records_processed, 4);
        assert!(!is_read(&db, "e1").await);
        assert!(!is_read(&db, "e2").await);
    }
}
