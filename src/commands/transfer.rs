//! RETR, STOR, APPE, LIST, NLST, REST and ABOR.
//!
//! Transfer verbs only validate and open their target. The transfer itself
//! is handed to the executor by the control loop once the preliminary reply
//! is on the wire, so the final reply can never overtake it.

use std::sync::Arc;

use log::{debug, info};

use super::CommandResult;
use super::utils::{require_arg, resolve};
use crate::error::{CommandError, FtpError, TransferError};
use crate::protocol::commands::{Command, CommandCode};
use crate::protocol::responses::{Reply, ReplyCode};
use crate::session::Session;
use crate::transfer::{OpenStatus, Transfer};

/// Checks the data channel can carry a new transfer.
async fn channel_status(session: &mut Session) -> Result<OpenStatus, CommandError> {
    match session.data.open_status().await {
        Ok(status) => Ok(status),
        Err(TransferError::ChannelStillOpen) => {
            // A stream-mode channel must close between transfers.
            session.data.close_channel().await;
            Err(FtpError::aborted("Data connection was still open; closed, retry the transfer").into())
        }
        Err(e) => Err(e.into()),
    }
}

fn preliminary(session: &Session, status: OpenStatus, path: &str) -> Reply {
    match status {
        OpenStatus::Opened => Reply::new(
            ReplyCode::FileStatusOkay,
            format!(
                "Opening {} mode data connection for {path}",
                session.data.params().data_type
            ),
        ),
        OpenStatus::AlreadyOpen => Reply::new(
            ReplyCode::DataConnectionAlreadyOpen,
            format!("Data connection already open; transfer starting for {path}"),
        ),
    }
}

pub async fn retr(session: &mut Session, command: &Command) -> CommandResult {
    let offset = session.take_restart();
    let path = resolve(session, require_arg(command)?)?;
    let status = channel_status(session).await?;

    let filesystem = Arc::clone(&session.ctx.filesystem);
    let file = filesystem.open_read(&path, offset).await?;
    info!("Session {} RETR {path} from offset {offset}", session.id);

    let reply = preliminary(session, status, &path);
    session.pending_transfer = Some(Transfer::file(command.code, path, file));
    Ok(reply)
}

/// STOR and APPE.
pub async fn stor(session: &mut Session, command: &Command) -> CommandResult {
    let offset = session.take_restart();
    let path = resolve(session, require_arg(command)?)?;
    let status = channel_status(session).await?;

    let append = command.code == CommandCode::Appe;
    let filesystem = Arc::clone(&session.ctx.filesystem);
    let file = filesystem.open_write(&path, append, offset).await?;
    info!(
        "Session {} {} {path} (offset {offset})",
        session.id, command.verb
    );

    let reply = preliminary(session, status, &path);
    session.pending_transfer = Some(Transfer::file(command.code, path, file));
    Ok(reply)
}

/// The path operand of LIST/NLST, ignoring `ls`-style options.
fn list_target(arg: &str) -> Option<&str> {
    arg.split_whitespace().find(|part| !part.starts_with('-'))
}

/// LIST and NLST.
pub async fn list(session: &mut Session, command: &Command) -> CommandResult {
    let path = match list_target(&command.arg) {
        Some(target) => resolve(session, target)?,
        None => session.cwd.clone(),
    };
    let status = channel_status(session).await?;

    let names_only = command.code == CommandCode::Nlst;
    let filesystem = Arc::clone(&session.ctx.filesystem);
    let listing = filesystem.list(&path, names_only).await?;
    debug!(
        "Session {} listing {path}: {} entries",
        session.id,
        listing.lines.len()
    );

    let reply = preliminary(session, status, &path);
    session.pending_transfer = Some(Transfer::listing(command.code, listing));
    Ok(reply)
}

pub fn rest(session: &mut Session, command: &Command) -> CommandResult {
    let arg = require_arg(command)?;
    let offset: u64 = arg
        .trim()
        .parse()
        .map_err(|_| FtpError::bad_arguments(format!("Invalid restart offset: {arg}")))?;
    session.restart_offset = offset;
    Ok(Reply::new(
        ReplyCode::FileActionPending,
        format!("Restarting at {offset}. Send STORE or RETRIEVE to initiate transfer"),
    ))
}

/// The aborted transfer's 426 is queued first, so the client sees it ahead
/// of the 226 acknowledging ABOR.
pub async fn abor(session: &mut Session) -> CommandResult {
    if session.executor.abort_from_internal(true).await {
        info!("Session {} aborted its transfer", session.id);
        return Ok(Reply::new(
            ReplyCode::ClosingDataConnection,
            "ABOR command successful",
        ));
    }
    if !session.executor.is_busy() {
        session.data.close_channel().await;
    }
    Ok(Reply::new(
        ReplyCode::ClosingDataConnection,
        "No transfer to abort",
    ))
}
