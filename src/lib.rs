//! gmail-actions - Rule-driven actions on a Gmail inbox
//!
//! Fetches inbox messages into a local SQLite mirror, evaluates declarative
//! rules against it and applies their actions (mark read, mark unread, move)
//! back to Gmail.

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod providers;
pub mod services;
pub mod storage;
