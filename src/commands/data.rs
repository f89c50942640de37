//! Data connection setup: PORT, EPRT, PASV, EPSV, TYPE, MODE and STRU.

use std::net::{IpAddr, SocketAddr};

use log::{debug, warn};

use super::CommandResult;
use super::utils::require_arg;
use crate::error::{AddressError, FtpError};
use crate::protocol::address::{decode_extended, decode_host_port, epsv_reply_text, pasv_reply_text};
use crate::protocol::commands::Command;
use crate::protocol::responses::{Reply, ReplyCode};
use crate::session::Session;
use crate::transfer::modes::{DataType, Structure, TransmissionMode};

/// Lowest port an active-mode client may ask the server to connect to.
const MIN_ACTIVE_PORT: u16 = 1024;

fn same_host(a: IpAddr, b: IpAddr) -> bool {
    a.to_canonical() == b.to_canonical()
}

pub async fn port(session: &mut Session, command: &Command) -> CommandResult {
    let remote = decode_host_port(require_arg(command)?)?;
    activate(session, command, remote).await
}

pub async fn eprt(session: &mut Session, command: &Command) -> CommandResult {
    let remote = decode_extended(require_arg(command)?)?;
    activate(session, command, remote).await
}

async fn activate(session: &mut Session, command: &Command, remote: SocketAddr) -> CommandResult {
    // Refuse to connect anywhere but back to the client.
    if !same_host(remote.ip(), session.peer.ip()) {
        warn!(
            "Session {} asked for data connection to foreign host {remote}",
            session.id
        );
        return Err(FtpError::bad_arguments("Data address must match the control connection").into());
    }
    if remote.port() < MIN_ACTIVE_PORT {
        return Err(FtpError::bad_arguments("Privileged data port refused").into());
    }

    session.data.close_channel().await;
    session.data.set_active(remote).await;
    Ok(Reply::new(
        ReplyCode::CommandOkay,
        format!("{} command successful", command.verb),
    ))
}

pub async fn pasv(session: &mut Session) -> CommandResult {
    session.data.close_channel().await;
    let announced = session.data.enter_passive().await?;
    match announced {
        SocketAddr::V4(v4) => Ok(Reply::new(
            ReplyCode::EnteringPassiveMode,
            pasv_reply_text(v4),
        )),
        SocketAddr::V6(_) => {
            if let Some(local) = session.data.state().local {
                session.data.unbind_passive(local).await;
            }
            Err(FtpError::cant_open_data("PASV needs IPv4, use EPSV").into())
        }
    }
}

pub async fn epsv(session: &mut Session, command: &Command) -> CommandResult {
    let arg = command.arg.trim();
    if arg.eq_ignore_ascii_case("ALL") {
        return Ok(Reply::new(ReplyCode::CommandOkay, "EPSV ALL command successful"));
    }
    match arg {
        "" | "1" | "2" => {}
        other => return Err(AddressError::UnsupportedFamily(other.to_string()).into()),
    }

    session.data.close_channel().await;
    let announced = session.data.enter_passive().await?;
    Ok(Reply::new(
        ReplyCode::EnteringExtendedPassiveMode,
        epsv_reply_text(announced.port()),
    ))
}

pub async fn type_(session: &mut Session, command: &Command) -> CommandResult {
    let arg = require_arg(command)?;
    let Some(data_type) = DataType::from_arg(arg) else {
        return Err(FtpError::not_implemented(format!("Type {arg} not implemented")).into());
    };
    let mut params = session.data.params();
    params.data_type = data_type;
    session.data.reconfigure(params).await;
    debug!("Session {} type {data_type}", session.id);
    Ok(Reply::new(
        ReplyCode::CommandOkay,
        format!("Type set to {data_type}"),
    ))
}

pub async fn mode(session: &mut Session, command: &Command) -> CommandResult {
    let arg = require_arg(command)?;
    let Some(mode) = TransmissionMode::from_arg(arg) else {
        return Err(FtpError::not_implemented(format!("Mode {arg} not implemented")).into());
    };
    let mut params = session.data.params();
    params.mode = mode;
    session.data.reconfigure(params).await;
    Ok(Reply::new(ReplyCode::CommandOkay, format!("Mode set to {mode}")))
}

pub async fn stru(session: &mut Session, command: &Command) -> CommandResult {
    let arg = require_arg(command)?;
    let Some(structure) = Structure::from_arg(arg) else {
        return Err(
            FtpError::not_implemented(format!("Structure {arg} not implemented")).into(),
        );
    };
    let mut params = session.data.params();
    params.structure = structure;
    session.data.reconfigure(params).await;
    Ok(Reply::new(
        ReplyCode::CommandOkay,
        format!("Structure set to {}", arg.trim().to_ascii_uppercase()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_ipv4_counts_as_same_host() {
        let v4: IpAddr = "127.0.0.1".parse().unwrap();
        let mapped: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(same_host(v4, mapped));
        assert!(!same_host(v4, "10.0.0.1".parse().unwrap()));
    }
}
