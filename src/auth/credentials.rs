//! Credential storage
//!
//! Built-in accounts used when the configuration defines no users.

use std::collections::HashMap;

use crate::config::UserEntry;

pub(crate) fn default_users() -> HashMap<String, UserEntry> {
    [("alice", "alice123"), ("bob", "bob123"), ("admin", "admin123")]
        .into_iter()
        .map(|(name, password)| {
            (
                name.to_string(),
                UserEntry {
                    password: password.to_string(),
                    account: None,
                },
            )
        })
        .collect()
}
