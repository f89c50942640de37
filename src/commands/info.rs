//! FEAT, OPTS, HELP and STAT.

use std::sync::Arc;

use super::CommandResult;
use super::utils::resolve;
use crate::error::FtpError;
use crate::protocol::commands::Command;
use crate::protocol::responses::{Reply, ReplyCode};
use crate::session::Session;

const FEATURES: &[&str] = &[
    "AUTH TLS",
    "PBSZ",
    "PROT",
    "CCC",
    "EPRT",
    "EPSV",
    "MODE B",
    "REST STREAM",
    "SIZE",
    "UTF8",
];

const HELP_VERBS: &[&str] = &[
    "USER PASS ACCT REIN QUIT PORT EPRT PASV EPSV",
    "TYPE MODE STRU RETR STOR APPE LIST NLST REST",
    "ABOR PWD CWD CDUP MKD RMD DELE RNFR RNTO",
    "SIZE AUTH CCC PBSZ PROT NOOP SYST FEAT OPTS",
    "HELP STAT",
];

/// AUTH TLS is only advertised when a certificate is loaded.
pub fn feat(session: &Session) -> Reply {
    let tls = session.ctx.tls.is_some();
    let mut lines = vec!["Extensions supported:".to_string()];
    lines.extend(
        FEATURES
            .iter()
            .filter(|f| tls || !matches!(**f, "AUTH TLS" | "PBSZ" | "PROT" | "CCC"))
            .map(|f| format!(" {f}")),
    );
    lines.push("End".to_string());
    Reply::multiline(ReplyCode::SystemStatus, lines)
}

pub fn opts(command: &Command) -> CommandResult {
    let option = command.arg.trim().to_ascii_uppercase();
    match option.as_str() {
        "UTF8 ON" | "UTF8" => Ok(Reply::new(ReplyCode::CommandOkay, "UTF8 mode enabled")),
        "" => Err(FtpError::bad_arguments("OPTS requires an argument").into()),
        _ => Err(FtpError::not_implemented(format!("Option {option} not supported")).into()),
    }
}

pub fn help(command: &Command) -> Reply {
    if command.has_arg() {
        return Reply::new(
            ReplyCode::HelpMessage,
            format!("Syntax: {} <arguments>", command.arg.trim().to_ascii_uppercase()),
        );
    }
    let mut lines = vec!["The following commands are recognized:".to_string()];
    lines.extend(HELP_VERBS.iter().map(|l| format!(" {l}")));
    lines.push("Help OK".to_string());
    Reply::multiline(ReplyCode::HelpMessage, lines)
}

/// Without an argument reports the session; with one lists a path over the
/// control channel.
pub async fn stat(session: &mut Session, command: &Command) -> CommandResult {
    if command.has_arg() {
        if !session.is_logged_in() {
            return Err(FtpError::not_logged_in().into());
        }
        let path = resolve(session, &command.arg)?;
        let filesystem = Arc::clone(&session.ctx.filesystem);
        let listing = filesystem.list(&path, false).await?;

        let mut lines = vec![format!("Status of {path}:")];
        lines.extend(listing.lines);
        lines.push("End of status".to_string());
        return Ok(Reply::multiline(ReplyCode::FileStatus, lines));
    }

    let params = session.data.params();
    let mut lines = vec![
        "RAX FTP server status:".to_string(),
        format!(" Connected to {}", session.peer),
        match &session.username {
            Some(user) if session.is_logged_in() => format!(" Logged in as {user}"),
            _ => " Not logged in".to_string(),
        },
        format!(" TYPE: {}, MODE: {}", params.data_type, params.mode),
        format!(
            " Control channel {}, data protection {}",
            if session.secure { "secure" } else { "clear" },
            if session.protect_data { "private" } else { "clear" }
        ),
    ];
    lines.push(match session.executor.progress() {
        Some((code, path, bytes)) => format!(" {code} {path}: {bytes} bytes transferred"),
        None => " No transfer in progress".to_string(),
    });
    lines.push("End of status".to_string());
    Ok(Reply::multiline(ReplyCode::SystemStatus, lines))
}
