//! RAX FTP engine
//!
//! Session protocol and transfer orchestration for an FTP server: control
//! channel framing and sequencing, data connection matching for active and
//! passive mode, transfer execution, and explicit TLS.

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod middleware;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod tls;
pub mod transfer;

pub use config::ServerConfig;
pub use server::{Server, ServerContext};
