//! Session state
//!
//! Everything the control loop and the verb handlers know about one client.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::protocol::commands::{Command, CommandCode};
use crate::server::context::ServerContext;
use crate::session::hooks::SessionInfo;
use crate::transfer::data_channel::DataConnectionManager;
use crate::transfer::executor::{Transfer, TransferExecutor};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    ClientClosed,
    Shutdown,
    /// A hook or the server refused the session with a terminating reply.
    Refused(String),
    /// The client broke the protocol (overlong line, bad TLS splice).
    Protocol(String),
    Transport(String),
    Internal(String),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Quit => f.write_str("client quit"),
            ExitReason::ClientClosed => f.write_str("connection closed by client"),
            ExitReason::Shutdown => f.write_str("server shutting down"),
            ExitReason::Refused(msg) => write!(f, "refused: {msg}"),
            ExitReason::Protocol(msg) => write!(f, "protocol violation: {msg}"),
            ExitReason::Transport(msg) => write!(f, "transport error: {msg}"),
            ExitReason::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

/// Login progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginState {
    #[default]
    NeedUser,
    NeedPassword,
    NeedAccount,
    LoggedIn,
}

/// A control channel security change requested by AUTH or CCC, carried out
/// by the control loop after the reply is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityChange {
    Upgrade,
    Downgrade,
}

pub struct Session {
    pub id: u64,
    pub peer: SocketAddr,
    pub local: SocketAddr,
    pub ctx: Arc<ServerContext>,

    pub current: Command,
    pub previous: Command,
    /// Set by a handler to admit one more verb after the current one.
    pub extra_next: Option<CommandCode>,
    pub ready: bool,

    pub username: Option<String>,
    pub login: LoginState,
    pub cwd: String,
    pub rename_from: Option<String>,
    pub restart_offset: u64,

    pub secure: bool,
    pub pbsz_set: bool,
    pub protect_data: bool,
    pub security_change: Option<SecurityChange>,

    pub exit: Option<ExitReason>,

    /// Transfer accepted by a handler, started once its preliminary reply is on the wire.
    pub pending_transfer: Option<Transfer>,

    pub data: DataConnectionManager,
    pub executor: TransferExecutor,
}

impl Session {
    pub fn new(
        id: u64,
        peer: SocketAddr,
        local: SocketAddr,
        ctx: Arc<ServerContext>,
        data: DataConnectionManager,
        executor: TransferExecutor,
    ) -> Self {
        Self {
            id,
            peer,
            local,
            ctx,
            current: Command::connection(),
            previous: Command::connection(),
            extra_next: None,
            ready: false,
            username: None,
            login: LoginState::NeedUser,
            cwd: "/".to_string(),
            rename_from: None,
            restart_offset: 0,
            secure: false,
            pbsz_set: false,
            protect_data: false,
            security_change: None,
            exit: None,
            pending_transfer: None,
            data,
            executor,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.login == LoginState::LoggedIn
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            peer: self.peer,
            local: self.local,
            user: self.username.clone(),
            secure: self.secure,
        }
    }

    /// Forgets login and navigation state (REIN); security state is kept.
    pub fn reset_login(&mut self) {
        self.username = None;
        self.login = LoginState::NeedUser;
        self.cwd = "/".to_string();
        self.rename_from = None;
        self.restart_offset = 0;
        self.extra_next = None;
    }

    /// Takes the REST offset, which applies to one transfer only.
    pub fn take_restart(&mut self) -> u64 {
        std::mem::take(&mut self.restart_offset)
    }

    /// Records the first reason only; later failures during teardown are noise.
    pub fn set_exit(&mut self, reason: ExitReason) {
        if self.exit.is_none() {
            self.exit = Some(reason);
        }
    }
}
