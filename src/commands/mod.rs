//! FTP verb handlers
//!
//! Each handler is a plain async function over the session. `dispatch` picks
//! the handler by command code after the login check; the control loop has
//! already applied the busy and sequencing rules.

mod data;
mod files;
mod info;
mod login;
mod security;
mod transfer;
pub mod utils;

use crate::error::{CommandError, FtpError};
use crate::protocol::commands::{Command, CommandCode as C};
use crate::protocol::responses::{Reply, ReplyCode};
use crate::session::Session;

pub type CommandResult = Result<Reply, CommandError>;

/// Verbs usable before login completes.
fn requires_login(code: C) -> bool {
    !matches!(
        code,
        C::Connection
            | C::IncorrectSequence
            | C::Unknown
            | C::User
            | C::Pass
            | C::Acct
            | C::Rein
            | C::Quit
            | C::Auth
            | C::Ccc
            | C::Pbsz
            | C::Prot
            | C::Noop
            | C::Syst
            | C::Feat
            | C::Opts
            | C::Help
            | C::Stat
    )
}

/// Runs the handler for `command` and returns its reply.
pub async fn dispatch(session: &mut Session, command: &Command) -> CommandResult {
    if requires_login(command.code) && !session.is_logged_in() {
        return Err(FtpError::not_logged_in().into());
    }

    match command.code {
        C::Connection => Ok(Reply::new(ReplyCode::ServiceReady, "Welcome to RAX FTP Server")),
        C::IncorrectSequence => Err(FtpError::bad_sequence("Bad sequence of commands").into()),
        C::Unknown => Err(FtpError::new(
            ReplyCode::CommandNotImplemented,
            format!("Command {} not implemented", command.verb),
        )
        .into()),

        C::User => login::user(session, command).await,
        C::Pass => login::pass(session, command).await,
        C::Acct => login::acct(session, command).await,
        C::Rein => login::rein(session).await,
        C::Quit => login::quit(session),

        C::Port => data::port(session, command).await,
        C::Eprt => data::eprt(session, command).await,
        C::Pasv => data::pasv(session).await,
        C::Epsv => data::epsv(session, command).await,
        C::Type => data::type_(session, command).await,
        C::Mode => data::mode(session, command).await,
        C::Stru => data::stru(session, command).await,

        C::Retr => transfer::retr(session, command).await,
        C::Stor | C::Appe => transfer::stor(session, command).await,
        C::List | C::Nlst => transfer::list(session, command).await,
        C::Rest => transfer::rest(session, command),
        C::Abor => transfer::abor(session).await,

        C::Pwd => files::pwd(session),
        C::Cwd => files::cwd(session, command).await,
        C::Cdup => files::cdup(session).await,
        C::Mkd => files::mkd(session, command).await,
        C::Rmd => files::rmd(session, command).await,
        C::Dele => files::dele(session, command).await,
        C::Rnfr => files::rnfr(session, command).await,
        C::Rnto => files::rnto(session, command).await,
        C::Size => files::size(session, command).await,

        C::Auth => security::auth(session, command),
        C::Ccc => security::ccc(session),
        C::Pbsz => security::pbsz(session, command),
        C::Prot => security::prot(session, command).await,

        C::Noop => Ok(Reply::new(ReplyCode::CommandOkay, "NOOP ok")),
        C::Syst => Ok(Reply::new(ReplyCode::SystemType, "UNIX Type: L8")),
        C::Feat => Ok(info::feat(session)),
        C::Opts => info::opts(command),
        C::Help => Ok(info::help(command)),
        C::Stat => info::stat(session, command).await,
    }
}
