//! Configuration and settings management.
//!
//! Settings are stored in the user's config directory as JSON; rules live in
//! their own JSON file.

mod rules;
mod settings;

pub use rules::RuleSet;
pub use settings::{
    ConfigError, FetchSettings, GmailSettings, Result, RulesSettings, Settings, StorageSettings,
    ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_DATABASE_PATH, ENV_REFRESH_TOKEN, ENV_RULES_PATH,
};
