//! Module `commands`
//!
//! Defines the FTP verb space, the static per-verb descriptors used by the
//! sequencer, and the parsing of raw control lines into `Command` values.

use std::fmt;

/// Every verb the engine knows about, plus the synthetic codes the control
/// loop injects on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// Synthetic: the "command" that precedes everything after accept.
    Connection,
    /// Synthetic: substituted for a command rejected by the sequencer.
    IncorrectSequence,
    Unknown,
    User,
    Pass,
    Acct,
    Rein,
    Quit,
    Port,
    Eprt,
    Pasv,
    Epsv,
    Type,
    Mode,
    Stru,
    Retr,
    Stor,
    Appe,
    List,
    Nlst,
    Rest,
    Abor,
    Pwd,
    Cwd,
    Cdup,
    Mkd,
    Rmd,
    Dele,
    Rnfr,
    Rnto,
    Size,
    Auth,
    Ccc,
    Pbsz,
    Prot,
    Noop,
    Syst,
    Feat,
    Opts,
    Help,
    Stat,
}

/// What a transfer-class verb does with the data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Retrieve,
    Store,
    List,
}

/// Static sequencing metadata for one verb.
#[derive(Debug)]
pub struct CommandDescriptor {
    pub code: CommandCode,
    /// Verbs allowed to follow this one; empty means unrestricted.
    pub next: &'static [CommandCode],
    /// Abort/quit/status-class verbs bypass sequencing and busy checks.
    pub special: bool,
    /// Security-context verbs bypass the sequencer but not the busy check.
    pub security: bool,
}

impl CommandDescriptor {
    const fn plain(code: CommandCode) -> Self {
        Self {
            code,
            next: &[],
            special: false,
            security: false,
        }
    }

    const fn with_next(code: CommandCode, next: &'static [CommandCode]) -> Self {
        Self {
            code,
            next,
            special: false,
            security: false,
        }
    }

    const fn special(code: CommandCode) -> Self {
        Self {
            code,
            next: &[],
            special: true,
            security: false,
        }
    }

    const fn security(code: CommandCode) -> Self {
        Self {
            code,
            next: &[],
            special: false,
            security: true,
        }
    }

    pub fn allows(&self, code: CommandCode) -> bool {
        self.next.contains(&code)
    }
}

use CommandCode as C;

const AFTER_CONNECTION: &[CommandCode] = &[
    C::User,
    C::Auth,
    C::Feat,
    C::Syst,
    C::Opts,
    C::Help,
    C::Noop,
    C::Pbsz,
    C::Prot,
    C::Quit,
    C::Stat,
];

static DESCRIPTORS: &[CommandDescriptor] = &[
    CommandDescriptor::with_next(C::Connection, AFTER_CONNECTION),
    CommandDescriptor::plain(C::IncorrectSequence),
    CommandDescriptor::plain(C::Unknown),
    CommandDescriptor::with_next(C::User, &[C::Pass]),
    CommandDescriptor::plain(C::Pass),
    CommandDescriptor::plain(C::Acct),
    CommandDescriptor::plain(C::Rein),
    CommandDescriptor::special(C::Quit),
    CommandDescriptor::plain(C::Port),
    CommandDescriptor::plain(C::Eprt),
    CommandDescriptor::plain(C::Pasv),
    CommandDescriptor::plain(C::Epsv),
    CommandDescriptor::plain(C::Type),
    CommandDescriptor::plain(C::Mode),
    CommandDescriptor::plain(C::Stru),
    CommandDescriptor::plain(C::Retr),
    CommandDescriptor::plain(C::Stor),
    CommandDescriptor::plain(C::Appe),
    CommandDescriptor::plain(C::List),
    CommandDescriptor::plain(C::Nlst),
    CommandDescriptor::with_next(C::Rest, &[C::Retr, C::Stor, C::Appe]),
    CommandDescriptor::special(C::Abor),
    CommandDescriptor::plain(C::Pwd),
    CommandDescriptor::plain(C::Cwd),
    CommandDescriptor::plain(C::Cdup),
    CommandDescriptor::plain(C::Mkd),
    CommandDescriptor::plain(C::Rmd),
    CommandDescriptor::plain(C::Dele),
    CommandDescriptor::with_next(C::Rnfr, &[C::Rnto]),
    CommandDescriptor::plain(C::Rnto),
    CommandDescriptor::plain(C::Size),
    CommandDescriptor::security(C::Auth),
    CommandDescriptor::security(C::Ccc),
    CommandDescriptor::security(C::Pbsz),
    CommandDescriptor::security(C::Prot),
    CommandDescriptor::special(C::Noop),
    CommandDescriptor::plain(C::Syst),
    CommandDescriptor::plain(C::Feat),
    CommandDescriptor::plain(C::Opts),
    CommandDescriptor::plain(C::Help),
    CommandDescriptor::special(C::Stat),
];

impl CommandCode {
    /// All codes, in descriptor table order.
    pub fn all() -> impl Iterator<Item = CommandCode> {
        DESCRIPTORS.iter().map(|d| d.code)
    }

    pub fn descriptor(self) -> &'static CommandDescriptor {
        DESCRIPTORS
            .iter()
            .find(|d| d.code == self)
            .unwrap_or(&DESCRIPTORS[2])
    }

    pub fn is_special(self) -> bool {
        self.descriptor().special
    }

    pub fn is_security(self) -> bool {
        self.descriptor().security
    }

    pub fn transfer_kind(self) -> Option<TransferKind> {
        match self {
            C::Retr => Some(TransferKind::Retrieve),
            C::Stor | C::Appe => Some(TransferKind::Store),
            C::List | C::Nlst => Some(TransferKind::List),
            _ => None,
        }
    }

    fn from_verb(verb: &str) -> CommandCode {
        match verb {
            "USER" => C::User,
            "PASS" => C::Pass,
            "ACCT" => C::Acct,
            "REIN" => C::Rein,
            "QUIT" => C::Quit,
            "PORT" => C::Port,
            "EPRT" => C::Eprt,
            "PASV" => C::Pasv,
            "EPSV" => C::Epsv,
            "TYPE" => C::Type,
            "MODE" => C::Mode,
            "STRU" => C::Stru,
            "RETR" => C::Retr,
            "STOR" => C::Stor,
            "APPE" => C::Appe,
            "LIST" => C::List,
            "NLST" => C::Nlst,
            "REST" => C::Rest,
            "ABOR" => C::Abor,
            "PWD" | "XPWD" => C::Pwd,
            "CWD" | "XCWD" => C::Cwd,
            "CDUP" | "XCUP" => C::Cdup,
            "MKD" | "XMKD" => C::Mkd,
            "RMD" | "XRMD" => C::Rmd,
            "DELE" => C::Dele,
            "RNFR" => C::Rnfr,
            "RNTO" => C::Rnto,
            "SIZE" => C::Size,
            "AUTH" => C::Auth,
            "CCC" => C::Ccc,
            "PBSZ" => C::Pbsz,
            "PROT" => C::Prot,
            "NOOP" => C::Noop,
            "SYST" => C::Syst,
            "FEAT" => C::Feat,
            "OPTS" => C::Opts,
            "HELP" => C::Help,
            "STAT" => C::Stat,
            _ => C::Unknown,
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}").to_ascii_uppercase();
        f.write_str(&name)
    }
}

/// A parsed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: CommandCode,
    pub verb: String,
    pub arg: String,
}

impl Command {
    pub fn new(code: CommandCode, arg: impl Into<String>) -> Self {
        Self {
            code,
            verb: code.to_string(),
            arg: arg.into(),
        }
    }

    /// The synthetic command executed right after the control connection is accepted.
    pub fn connection() -> Self {
        Self::new(C::Connection, "")
    }

    /// Replaces a command refused by the sequencer, keeping its verb for the reply.
    pub fn incorrect_sequence(rejected: &Command) -> Self {
        Self {
            code: C::IncorrectSequence,
            verb: rejected.verb.clone(),
            arg: String::new(),
        }
    }

    pub fn descriptor(&self) -> &'static CommandDescriptor {
        self.code.descriptor()
    }

    pub fn has_arg(&self) -> bool {
        !self.arg.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            // Never echo credentials into logs.
            C::Pass => write!(f, "PASS ****"),
            _ if self.arg.is_empty() => write!(f, "{}", self.verb),
            _ => write!(f, "{} {}", self.verb, self.arg),
        }
    }
}

/// Parses a raw control line (terminator already stripped) into a `Command`.
///
/// The verb is case-insensitive; the argument is kept verbatim apart from
/// surrounding whitespace, since paths may legitimately contain spaces.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim_start();
    let mut parts = trimmed.splitn(2, ' ');
    let verb = parts.next().unwrap_or("").trim().to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim_end_matches([' ', '\t']).to_string();

    Command {
        code: CommandCode::from_verb(&verb),
        verb,
        arg,
    }
}
