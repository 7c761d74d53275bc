//! Mail provider implementations.
//!
//! - [`MailProvider`] - the operations ingestion and rule actions need
//! - [`GmailProvider`] - Gmail REST API with OAuth 2.0 refresh tokens

mod gmail;
mod traits;

pub use gmail::{GmailCredentials, GmailOptions, GmailProvider, DEFAULT_API_BASE, DEFAULT_TOKEN_URL};
#[cfg(test)]
pub use traits::MockMailProvider;
pub use traits::{MailProvider, ProviderError, RemoteMessage, Result};
