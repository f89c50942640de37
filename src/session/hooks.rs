//! Business hooks
//!
//! Extension points invoked by the control loop and the transfer executor.
//! Every method has a default, so an implementation only overrides what it
//! cares about.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::{FtpError, SessionError};
use crate::protocol::commands::Command;
use crate::protocol::responses::Reply;
use crate::session::state::ExitReason;
use crate::transfer::results::TransferReport;

/// Snapshot of a session handed to hooks.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: u64,
    pub peer: SocketAddr,
    pub local: SocketAddr,
    pub user: Option<String>,
    pub secure: bool,
}

#[async_trait]
pub trait BusinessHooks: Send + Sync {
    /// Runs before the greeting; an error reply replaces `220`.
    async fn after_connect(&self, _session: &SessionInfo) -> Result<(), FtpError> {
        Ok(())
    }

    /// Runs before dispatch; an error reply is sent instead of executing the command.
    async fn before_command(
        &self,
        _session: &SessionInfo,
        _command: &Command,
    ) -> Result<(), FtpError> {
        Ok(())
    }

    async fn after_command_ok(&self, _session: &SessionInfo, _command: &Command, _reply: &Reply) {}

    async fn after_command_error(
        &self,
        _session: &SessionInfo,
        _command: &Command,
        _error: &FtpError,
    ) {
    }

    /// Called once per finished RETR/STOR/APPE, whether it succeeded or not.
    async fn after_transfer(&self, _session: &SessionInfo, _report: &TransferReport) {}

    async fn on_data_connected(&self, _session: &SessionInfo, _local: SocketAddr, _peer: SocketAddr) {
    }

    async fn on_closed(&self, _session: &SessionInfo, _reason: &ExitReason) {}

    async fn on_local_exception(&self, _session: &SessionInfo, _error: &SessionError) {}
}

/// Hooks that do nothing.
pub struct NoopHooks;

impl BusinessHooks for NoopHooks {}
