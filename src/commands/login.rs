//! USER, PASS, ACCT, REIN and QUIT.

use std::sync::Arc;

use log::{info, warn};

use super::CommandResult;
use super::utils::require_arg;
use crate::auth::LoginStep;
use crate::error::FtpError;
use crate::protocol::commands::{Command, CommandCode};
use crate::protocol::responses::{Reply, ReplyCode};
use crate::session::{LoginState, Session};

fn step_reply(session: &mut Session, step: LoginStep, username: &str) -> Reply {
    match step {
        LoginStep::NeedPassword => {
            session.login = LoginState::NeedPassword;
            Reply::new(
                ReplyCode::NeedPassword,
                format!("User {username} OK. Password required"),
            )
        }
        LoginStep::NeedAccount => {
            session.login = LoginState::NeedAccount;
            // Widen the sequencer so ACCT may follow PASS.
            session.extra_next = Some(CommandCode::Acct);
            Reply::new(ReplyCode::NeedAccount, "Need account for login")
        }
        LoginStep::LoggedIn => {
            session.login = LoginState::LoggedIn;
            info!("Session {} logged in as {username}", session.id);
            Reply::new(ReplyCode::UserLoggedIn, format!("User {username} logged in"))
        }
    }
}

pub async fn user(session: &mut Session, command: &Command) -> CommandResult {
    let username = require_arg(command)?.to_string();
    session.reset_login();

    let authenticator = Arc::clone(&session.ctx.authenticator);
    match authenticator.user(&username).await {
        Ok(step) => {
            session.username = Some(username.clone());
            Ok(step_reply(session, step, &username))
        }
        Err(e) => {
            warn!("Session {} rejected username: {e}", session.id);
            // USER only admits PASS next; let the client try another name.
            session.extra_next = Some(CommandCode::User);
            Err(e.into())
        }
    }
}

pub async fn pass(session: &mut Session, command: &Command) -> CommandResult {
    if session.is_logged_in() {
        return Ok(Reply::new(ReplyCode::CommandSuperfluous, "Already logged in"));
    }
    let Some(username) = session.username.clone() else {
        return Err(FtpError::bad_sequence("Login with USER first").into());
    };
    if session.login != LoginState::NeedPassword {
        return Err(FtpError::bad_sequence("Password not expected now").into());
    }

    let authenticator = Arc::clone(&session.ctx.authenticator);
    match authenticator.pass(&username, &command.arg).await {
        Ok(step) => Ok(step_reply(session, step, &username)),
        Err(e) => {
            warn!("Session {} failed login for {username}: {e}", session.id);
            session.reset_login();
            Err(e.into())
        }
    }
}

pub async fn acct(session: &mut Session, command: &Command) -> CommandResult {
    let account = require_arg(command)?;
    match session.login {
        LoginState::LoggedIn => Ok(Reply::new(
            ReplyCode::CommandSuperfluous,
            "Account not necessary",
        )),
        LoginState::NeedAccount => {
            let username = session.username.clone().unwrap_or_default();
            let authenticator = Arc::clone(&session.ctx.authenticator);
            match authenticator.acct(&username, account).await {
                Ok(step) => Ok(step_reply(session, step, &username)),
                Err(e) => {
                    warn!("Session {} rejected account for {username}: {e}", session.id);
                    session.reset_login();
                    Err(e.into())
                }
            }
        }
        _ => Err(FtpError::bad_sequence("Login with USER and PASS first").into()),
    }
}

/// Logs the user out and drops the data connection setup; the control
/// channel and its security state stay as they are.
pub async fn rein(session: &mut Session) -> CommandResult {
    info!("Session {} reinitialized", session.id);
    session.reset_login();
    session.data.clear().await;
    session.data.set_protected(session.protect_data);
    Ok(Reply::new(ReplyCode::ServiceReady, "Service ready for new user"))
}

pub fn quit(session: &Session) -> CommandResult {
    info!(
        "Session {} quitting (user {})",
        session.id,
        session.username.as_deref().unwrap_or("-")
    );
    Ok(Reply::new(ReplyCode::ClosingControlConnection, "Goodbye"))
}
