//! Logging middleware
//!
//! Default `BusinessHooks` implementation that records session activity
//! through the `log` facade.

use std::net::SocketAddr;

use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::error::{FtpError, SessionError};
use crate::protocol::commands::Command;
use crate::protocol::responses::Reply;
use crate::session::hooks::{BusinessHooks, SessionInfo};
use crate::session::state::ExitReason;
use crate::transfer::results::TransferReport;

pub struct LoggingHooks;

fn who(session: &SessionInfo) -> String {
    match &session.user {
        Some(user) => format!("#{} {} ({user})", session.id, session.peer),
        None => format!("#{} {}", session.id, session.peer),
    }
}

#[async_trait]
impl BusinessHooks for LoggingHooks {
    async fn after_connect(&self, session: &SessionInfo) -> Result<(), FtpError> {
        info!("Client connected: {}", who(session));
        Ok(())
    }

    async fn before_command(&self, session: &SessionInfo, command: &Command) -> Result<(), FtpError> {
        debug!("Client {} executing: {command}", who(session));
        Ok(())
    }

    async fn after_command_ok(&self, session: &SessionInfo, command: &Command, reply: &Reply) {
        debug!("Client {} {} -> {}", who(session), command.verb, reply.code());
    }

    async fn after_command_error(&self, session: &SessionInfo, command: &Command, error: &FtpError) {
        info!("Client {} {} failed: {error}", who(session), command.verb);
    }

    async fn after_transfer(&self, session: &SessionInfo, report: &TransferReport) {
        if report.success {
            info!(
                "Client {} {} {} completed, {} bytes",
                who(session),
                report.code,
                report.path,
                report.bytes
            );
        } else {
            warn!(
                "Client {} {} {} aborted after {} bytes",
                who(session),
                report.code,
                report.path,
                report.bytes
            );
        }
    }

    async fn on_data_connected(&self, session: &SessionInfo, local: SocketAddr, peer: SocketAddr) {
        debug!("Client {} data connection {peer} -> {local}", who(session));
    }

    async fn on_closed(&self, session: &SessionInfo, reason: &ExitReason) {
        info!("Client {} disconnected: {reason}", who(session));
    }

    async fn on_local_exception(&self, session: &SessionInfo, err: &SessionError) {
        error!("Client {} local error: {err}", who(session));
    }
}
