//! AUTH, CCC, PBSZ and PROT.
//!
//! AUTH and CCC only record the requested change. The control loop swaps the
//! transport after the reply has been flushed in the current mode.

use log::info;

use super::CommandResult;
use super::utils::require_arg;
use crate::error::FtpError;
use crate::protocol::commands::Command;
use crate::protocol::responses::{Reply, ReplyCode};
use crate::session::{SecurityChange, Session};

pub fn auth(session: &mut Session, command: &Command) -> CommandResult {
    let mechanism = require_arg(command)?.trim().to_ascii_uppercase();
    if !matches!(mechanism.as_str(), "TLS" | "TLS-C" | "SSL") {
        return Err(FtpError::not_implemented(format!("AUTH {mechanism} not supported")).into());
    }
    if session.secure {
        return Err(FtpError::bad_sequence("Control channel already secure").into());
    }
    if session.ctx.tls.is_none() {
        return Err(
            FtpError::new(ReplyCode::SecurityResourceUnavailable, "TLS not available").into(),
        );
    }

    info!("Session {} upgrading control channel ({mechanism})", session.id);
    session.security_change = Some(SecurityChange::Upgrade);
    Ok(Reply::new(
        ReplyCode::AuthOkay,
        format!("AUTH {mechanism} successful"),
    ))
}

pub fn ccc(session: &mut Session) -> CommandResult {
    if !session.secure {
        return Err(FtpError::bad_sequence("Control channel not secure").into());
    }
    info!("Session {} clearing control channel", session.id);
    session.security_change = Some(SecurityChange::Downgrade);
    Ok(Reply::new(ReplyCode::CommandOkay, "CCC command successful"))
}

pub fn pbsz(session: &mut Session, command: &Command) -> CommandResult {
    let arg = require_arg(command)?;
    if !session.secure {
        return Err(FtpError::bad_sequence("PBSZ requires AUTH first").into());
    }
    if arg.trim().parse::<u64>().is_err() {
        return Err(FtpError::bad_arguments(format!("Invalid buffer size: {arg}")).into());
    }
    session.pbsz_set = true;
    // Stream-oriented TLS never needs a protection buffer.
    Ok(Reply::new(ReplyCode::CommandOkay, "PBSZ=0"))
}

pub async fn prot(session: &mut Session, command: &Command) -> CommandResult {
    let level = require_arg(command)?.trim().to_ascii_uppercase();
    if !session.secure || !session.pbsz_set {
        return Err(FtpError::bad_sequence("PBSZ required first").into());
    }

    let protect = match level.as_str() {
        "C" => false,
        "P" if session.ctx.tls.is_some() => true,
        "P" => {
            return Err(
                FtpError::new(ReplyCode::SecurityResourceUnavailable, "TLS not available").into(),
            );
        }
        "S" | "E" => {
            return Err(
                FtpError::not_implemented(format!("Protection level {level} not supported"))
                    .into(),
            );
        }
        _ => return Err(FtpError::bad_arguments(format!("Unknown protection level {level}")).into()),
    };

    // A block-mode channel left open was set up at the old level.
    if session.protect_data != protect {
        session.data.close_channel().await;
    }
    session.protect_data = protect;
    session.data.set_protected(protect);
    Ok(Reply::new(
        ReplyCode::CommandOkay,
        if protect {
            "Protection level set to Private"
        } else {
            "Protection level set to Clear"
        },
    ))
}
