//! Data models: attendance entries and stored credentials.

pub mod entry;

pub use entry::{Entry, EntryType};

use serde::{Deserialize, Serialize};

/// Username/password pair for one portal host, stored as
/// `{"user": "...", "pass": "..."}` in the `host-credentials` file.
/// Passwords are kept in clear text on disk; the store relies on the
/// single-user config directory, not on encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub user: String,
    pub pass: String,
}
