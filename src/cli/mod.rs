//! Command-line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{RuleSet, Settings};
use crate::engine::CompiledRule;
use crate::providers::email::GmailProvider;
use crate::services::{ActionDispatcher, IngestService, RunSummary};
use crate::storage::{queries, KeychainAccess, StorageLayer};

#[derive(Subcommand)]
enum Command {
    /// Fetch inbox messages into the local store
    Fetch {
        /// Most messages to fetch (defaults to fetch.max_emails)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run the rules against the local store and apply their actions
    Process {
        /// Rules file (defaults to rules.path)
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Report matches without changing anything
        #[arg(long, action, default_value = "false")]
        dry_run: bool,
    },
    /// Show the rules as they will be evaluated
    Rules {
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// List stored emails, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Delete every stored email
    Clear {},
    /// Store Gmail OAuth credentials in the OS keychain
    Credentials {
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        client_secret: String,
        #[arg(long)]
        refresh_token: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (defaults to settings.json in the config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;

    match args.command {
        Command::Fetch { limit } => fetch(&settings, limit).await,
        Command::Process { rules, dry_run } => process(&settings, rules, dry_run).await,
        Command::Rules { rules } => show_rules(&settings, rules),
        Command::List { limit } => list(&settings, limit).await,
        Command::Clear {} => clear(&settings).await,
        Command::Credentials {
            client_id,
            client_secret,
            refresh_token,
        } => store_credentials(client_id, client_secret, refresh_token).await,
    }
}

async fn open_storage(settings: &Settings) -> Result<StorageLayer> {
    let path = &settings.storage.database_path;
    StorageLayer::new(path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))
}

async fn gmail_provider(settings: &Settings, storage: &StorageLayer) -> Result<Arc<GmailProvider>> {
    let credentials = settings
        .gmail
        .resolve_credentials(storage.keychain())
        .await?;
    let provider = GmailProvider::new(credentials, settings.gmail.options())?;
    provider
        .authenticate()
        .await
        .context("Gmail authentication failed")?;
    Ok(Arc::new(provider))
}

fn load_rules(settings: &Settings, path: Option<PathBuf>) -> RuleSet {
    let path = path.unwrap_or_else(|| settings.rules.path.clone());
    RuleSet::load(&path)
}

async fn fetch(settings: &Settings, limit: Option<usize>) -> Result<()> {
    let storage = open_storage(settings).await?;
    let provider = gmail_provider(settings, &storage).await?;
    let limit = limit.unwrap_or(settings.fetch.max_emails);

    let service = IngestService::new(provider, storage.db().clone());
    let result = service.fetch_inbox(limit).await?;

    println!(
        "Fetched {} of {} listed messages ({} ms)",
        result.stored, result.listed, result.duration_ms
    );
    for error in &result.errors {
        println!("  failed: {error}");
    }
    Ok(())
}

async fn process(settings: &Settings, rules: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let rule_set = load_rules(settings, rules);
    if rule_set.is_empty() {
        println!("No rules to process");
        return Ok(());
    }

    let storage = open_storage(settings).await?;
    let provider = gmail_provider(settings, &storage).await?;
    let dispatcher = ActionDispatcher::new(provider, storage.db().clone()).with_dry_run(dry_run);

    let stop = CancellationToken::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current rule");
            ctrl_c.cancel();
        }
    });

    let summary = dispatcher.process_all(&rule_set.rules, &stop).await;
    print_summary(&summary, dry_run);
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    for rule in &summary.rules {
        match &rule.query_error {
            Some(error) => println!("{}: query failed: {}", rule.rule, error),
            None if dry_run => println!("{}: {} matched", rule.rule, rule.matched),
            None => println!(
                "{}: {} matched, {} applied, {} failed",
                rule.rule,
                rule.matched,
                rule.applied(),
                rule.failed()
            ),
        }
        for action in rule.actions.iter().filter(|a| !a.is_applied()) {
            if let Err(e) = &action.result {
                println!("  {} {}: {}", action.action, action.email_id, e);
            }
        }
    }

    println!(
        "Run {}: {} rules, {} records, {} actions applied, {} failed{}",
        summary.run_id,
        summary.rules.len(),
        summary.records_processed,
        summary.applied(),
        summary.failed(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
}

fn show_rules(settings: &Settings, rules: Option<PathBuf>) -> Result<()> {
    let rule_set = load_rules(settings, rules);
    if rule_set.is_empty() {
        println!("No rules");
        return Ok(());
    }

    for rule in &rule_set.rules {
        let compiled = CompiledRule::compile(rule);
        println!("{} [{}]", rule.name, rule.combinator);
        for condition in &rule.conditions {
            println!("  if   {condition}");
        }
        for action in &rule.actions {
            println!("  then {action}");
        }
        println!("  filter: {compiled}");
        match compiled.to_sql() {
            Some(fragment) => println!("  sql:    {}  {:?}", fragment.sql, fragment.params),
            None => println!("  sql:    (selects nothing)"),
        }
    }
    Ok(())
}

async fn list(settings: &Settings, limit: usize) -> Result<()> {
    let storage = open_storage(settings).await?;
    let records = queries::emails::get_all(storage.db()).await?;
    let total = records.len();

    for record in records.iter().take(limit) {
        println!(
            "{}  {}  {:<4}  {:<30}  {}",
            record.received_at.format("%Y-%m-%d %H:%M"),
            record.id,
            if record.is_read { "" } else { "new" },
            truncate(&record.from, 30),
            record.short_subject()
        );
    }
    println!("{} of {} stored emails", total.min(limit), total);
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

async fn clear(settings: &Settings) -> Result<()> {
    let storage = open_storage(settings).await?;
    let removed = queries::emails::clear(storage.db()).await?;
    info!(removed, "Cleared local store");
    println!("Removed {removed} stored emails");
    Ok(())
}

async fn store_credentials(client_id: String, client_secret: String, refresh_token: String) -> Result<()> {
    let keychain = KeychainAccess::new();
    for (key, value) in [
        (KeychainAccess::GMAIL_CLIENT_ID, client_id),
        (KeychainAccess::GMAIL_CLIENT_SECRET, client_secret),
        (KeychainAccess::GMAIL_REFRESH_TOKEN, refresh_token),
    ] {
        keychain
            .store(key, value.trim())
            .await
            .with_context(|| format!("failed to store {key}"))?;
    }
    println!("Stored Gmail credentials in the keychain");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_process_with_global_config() {
        let cli = Cli::try_parse_from([
            "gmail-actions",
            "process",
            "--dry-run",
            "--rules",
            "my-rules.json",
            "--config",
            "settings.json",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("settings.json")));
        match cli.command {
            Command::Process { rules, dry_run } => {
                assert_eq!(rules, Some(PathBuf::from("my-rules.json")));
                assert!(dry_run);
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn credentials_require_all_fields() {
        assert!(Cli::try_parse_from(["gmail-actions", "credentials", "--client-id", "x"]).is_err());
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("äöü-long", 3), "äöü");
    }
}
