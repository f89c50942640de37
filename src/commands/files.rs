//! Navigation and file management verbs.

use std::sync::Arc;

use log::info;

use super::CommandResult;
use super::utils::{quote_path, require_arg, resolve};
use crate::error::{FtpError, StorageError};
use crate::protocol::commands::Command;
use crate::protocol::responses::{Reply, ReplyCode};
use crate::session::Session;
use crate::storage::validation::parent_virtual_path;

pub fn pwd(session: &Session) -> CommandResult {
    Ok(Reply::new(
        ReplyCode::PathCreated,
        format!("{} is the current directory", quote_path(&session.cwd)),
    ))
}

async fn change_to(session: &mut Session, path: String) -> CommandResult {
    let filesystem = Arc::clone(&session.ctx.filesystem);
    filesystem.change_dir(&path).await?;
    let reply = Reply::new(
        ReplyCode::FileActionOkay,
        format!("Directory changed to {path}"),
    );
    session.cwd = path;
    Ok(reply)
}

pub async fn cwd(session: &mut Session, command: &Command) -> CommandResult {
    let path = resolve(session, require_arg(command)?)?;
    change_to(session, path).await
}

/// CDUP at the root stays at the root.
pub async fn cdup(session: &mut Session) -> CommandResult {
    let parent = parent_virtual_path(&session.cwd);
    change_to(session, parent).await
}

pub async fn mkd(session: &mut Session, command: &Command) -> CommandResult {
    let path = resolve(session, require_arg(command)?)?;
    let filesystem = Arc::clone(&session.ctx.filesystem);
    filesystem.make_dir(&path).await?;
    info!("Session {} created directory {path}", session.id);
    Ok(Reply::new(
        ReplyCode::PathCreated,
        format!("{} created", quote_path(&path)),
    ))
}

pub async fn rmd(session: &mut Session, command: &Command) -> CommandResult {
    let path = resolve(session, require_arg(command)?)?;
    if path == "/" {
        return Err(FtpError::new(ReplyCode::FileUnavailable, "Cannot remove the root directory").into());
    }
    let filesystem = Arc::clone(&session.ctx.filesystem);
    filesystem.remove_dir(&path).await?;
    info!("Session {} removed directory {path}", session.id);
    Ok(Reply::new(ReplyCode::FileActionOkay, "Directory removed"))
}

pub async fn dele(session: &mut Session, command: &Command) -> CommandResult {
    let path = resolve(session, require_arg(command)?)?;
    let filesystem = Arc::clone(&session.ctx.filesystem);
    filesystem.delete(&path).await?;
    info!("Session {} deleted {path}", session.id);
    Ok(Reply::new(ReplyCode::FileActionOkay, "File deleted"))
}

/// Remembers the rename source; the sequencer then only admits RNTO.
pub async fn rnfr(session: &mut Session, command: &Command) -> CommandResult {
    session.rename_from = None;
    let path = resolve(session, require_arg(command)?)?;
    let filesystem = Arc::clone(&session.ctx.filesystem);
    if !filesystem.exists(&path).await {
        return Err(StorageError::FileNotFound(path).into());
    }
    session.rename_from = Some(path);
    Ok(Reply::new(
        ReplyCode::FileActionPending,
        "File exists, ready for destination name",
    ))
}

pub async fn rnto(session: &mut Session, command: &Command) -> CommandResult {
    let Some(from) = session.rename_from.take() else {
        return Err(FtpError::bad_sequence("RNFR required first").into());
    };
    let to = resolve(session, require_arg(command)?)?;
    let filesystem = Arc::clone(&session.ctx.filesystem);
    filesystem.rename(&from, &to).await?;
    info!("Session {} renamed {from} to {to}", session.id);
    Ok(Reply::new(ReplyCode::FileActionOkay, "Rename successful"))
}

pub async fn size(session: &mut Session, command: &Command) -> CommandResult {
    let path = resolve(session, require_arg(command)?)?;
    let filesystem = Arc::clone(&session.ctx.filesystem);
    let size = filesystem.size(&path).await?;
    Ok(Reply::new(ReplyCode::FileStatus, size.to_string()))
}
