//! Authentication validator
//!
//! Implements FTP user authentication logic: the `Authenticator` seam and a
//! static credential store built from configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::credentials::default_users;
use crate::config::{StartupConfig, UserEntry};
use crate::error::AuthError;

/// What the client has to send next to complete login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    NeedPassword,
    NeedAccount,
    LoggedIn,
}

/// Login policy consulted by USER, PASS and ACCT.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn user(&self, username: &str) -> Result<LoginStep, AuthError>;

    async fn pass(&self, username: &str, password: &str) -> Result<LoginStep, AuthError>;

    async fn acct(&self, username: &str, account: &str) -> Result<LoginStep, AuthError>;
}

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
fn is_valid_input(input: &str, max_length: usize) -> bool {
    !input.trim().is_empty() && input.len() <= max_length && !input.contains(['\r', '\n', '\0'])
}

/// Credentials held in memory, taken from the `users` table of the configuration.
pub struct StaticAuthenticator {
    users: HashMap<String, UserEntry>,
    max_length: usize,
}

impl StaticAuthenticator {
    pub fn new(users: HashMap<String, UserEntry>, max_length: usize) -> Self {
        Self { users, max_length }
    }

    /// Configured users, or the built-in demo users when none are configured.
    pub fn from_config(config: &StartupConfig) -> Self {
        let users = if config.users.is_empty() {
            info!("No users configured, using built-in accounts");
            default_users()
        } else {
            config.users.clone()
        };
        Self::new(users, config.max_username_length)
    }

    fn lookup(&self, username: &str) -> Result<&UserEntry, AuthError> {
        self.users
            .get(username)
            .ok_or_else(|| AuthError::UserNotFound(username.to_string()))
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn user(&self, username: &str) -> Result<LoginStep, AuthError> {
        // Check for invalid username characters/format
        if username.contains(['@', '#', ',', '%']) || username.starts_with(char::is_numeric) {
            return Err(AuthError::InvalidUsername(username.to_string()));
        }

        if !is_valid_input(username, self.max_length) {
            return Err(AuthError::MalformedInput("Invalid username format".into()));
        }

        // Unknown users are only rejected at PASS so USER does not reveal them.
        debug!("USER accepted for {username}");
        Ok(LoginStep::NeedPassword)
    }

    async fn pass(&self, username: &str, password: &str) -> Result<LoginStep, AuthError> {
        if !is_valid_input(password, self.max_length) {
            return Err(AuthError::MalformedInput("Invalid password format".into()));
        }

        let entry = self.lookup(username)?;
        if entry.password != password {
            warn!("Wrong password for {username}");
            return Err(AuthError::InvalidPassword(username.to_string()));
        }

        if entry.account.is_some() {
            Ok(LoginStep::NeedAccount)
        } else {
            Ok(LoginStep::LoggedIn)
        }
    }

    async fn acct(&self, username: &str, account: &str) -> Result<LoginStep, AuthError> {
        if !is_valid_input(account, self.max_length) {
            return Err(AuthError::MalformedInput("Invalid account format".into()));
        }

        match &self.lookup(username)?.account {
            Some(expected) if expected == account => Ok(LoginStep::LoggedIn),
            Some(_) => Err(AuthError::InvalidAccount(username.to_string())),
            None => Ok(LoginStep::LoggedIn),
        }
    }
}
