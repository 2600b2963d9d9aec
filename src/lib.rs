//! library-rs: backend for a small online library.
//!
//! Readers register, log in with a session cookie, browse the catalog and
//! track what they read. Administrators manage roles and triage feedback.
//!
//! # Features
//!
//! - Cookie sessions backed by memory or SQLite
//! - Book catalog with category filtering
//! - Reading lifecycle: start, progress, pause, complete, remove
//! - Profile page read-model and reading-time ranking
//! - Feedback intake with an admin triage panel

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// HTTP server.
pub mod server;
/// Session storage.
pub mod session;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
