//! External service providers.
//!
//! - [`email`] - remote mailbox access (Gmail API)

pub mod email;
