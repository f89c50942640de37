//! FTP Response handling
//!
//! Defines FTP reply codes and the single/multi-line reply wire format.

use std::fmt;

/// Standard FTP reply codes used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ReplyCode {
    RestartMarker = 110,
    DataConnectionAlreadyOpen = 125,
    FileStatusOkay = 150,
    CommandOkay = 200,
    CommandSuperfluous = 202,
    SystemStatus = 211,
    FileStatus = 213,
    HelpMessage = 214,
    SystemType = 215,
    ServiceReady = 220,
    ClosingControlConnection = 221,
    ClosingDataConnection = 226,
    EnteringPassiveMode = 227,
    EnteringExtendedPassiveMode = 229,
    UserLoggedIn = 230,
    AuthOkay = 234,
    FileActionOkay = 250,
    PathCreated = 257,
    NeedPassword = 331,
    NeedAccount = 332,
    FileActionPending = 350,
    ServiceNotAvailable = 421,
    CantOpenDataConnection = 425,
    ConnectionClosedTransferAborted = 426,
    FileActionNotTaken = 450,
    LocalError = 451,
    InsufficientStorage = 452,
    CommandSyntaxError = 500,
    ParameterSyntaxError = 501,
    CommandNotImplemented = 502,
    BadCommandSequence = 503,
    ParameterNotImplemented = 504,
    NotLoggedIn = 530,
    SecurityResourceUnavailable = 534,
    FileUnavailable = 550,
    ExceededStorageAllocation = 552,
    FileNameNotAllowed = 553,
}

impl ReplyCode {
    /// Numeric value written on the wire.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Replies after which the control connection must be closed.
    pub fn is_terminating(self) -> bool {
        matches!(
            self,
            ReplyCode::ServiceNotAvailable | ReplyCode::ClosingControlConnection
        )
    }

    pub fn is_positive(self) -> bool {
        self.code() < 400
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A complete reply, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: ReplyCode,
    lines: Vec<String>,
}

impl Reply {
    pub fn new(code: ReplyCode, message: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![message.into()],
        }
    }

    /// Builds a multi-line reply; an empty line list degrades to a bare code.
    pub fn multiline<I, S>(code: ReplyCode, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        Self { code, lines }
    }

    pub fn code(&self) -> ReplyCode {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// First line of the reply text, used for logging.
    pub fn message(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or("")
    }

    /// Renders the reply exactly as it goes on the wire.
    ///
    /// Continuation lines that begin with a numeric token get two leading
    /// spaces so clients cannot mistake them for the terminating line.
    pub fn to_wire(&self) -> String {
        let code = self.code.code();
        if self.lines.len() == 1 {
            return format_response(code, &self.lines[0]);
        }

        let last = self.lines.len() - 1;
        let mut out = String::new();
        for (index, line) in self.lines.iter().enumerate() {
            if index == 0 {
                out.push_str(&format!("{code}-{line}\r\n"));
            } else if index == last {
                out.push_str(&format_response(code, line));
            } else if starts_with_number(line) {
                out.push_str(&format!("  {line}\r\n"));
            } else {
                out.push_str(&format!("{line}\r\n"));
            }
        }
        out
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" | "))
    }
}

fn starts_with_number(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|token| token.parse::<i64>().is_ok())
}

/// Format a single-line FTP response message
pub fn format_response(code: u16, message: &str) -> String {
    format!("{code} {message}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_reply() {
        let reply = Reply::new(ReplyCode::CommandOkay, "NOOP ok");
        assert_eq!(reply.to_wire(), "200 NOOP ok\r\n");
    }

    #[test]
    fn multiline_reply_pads_numeric_continuations() {
        let reply = Reply::multiline(
            ReplyCode::SystemStatus,
            ["Status follows", "Connected", "226 files sent", "End"],
        );
        assert_eq!(
            reply.to_wire(),
            "211-Status follows\r\nConnected\r\n  226 files sent\r\n211 End\r\n"
        );
    }

    #[test]
    fn terminating_codes() {
        assert!(ReplyCode::ServiceNotAvailable.is_terminating());
        assert!(ReplyCode::ClosingControlConnection.is_terminating());
        assert!(!ReplyCode::ConnectionClosedTransferAborted.is_terminating());
    }

    #[test]
    fn passive_reply_codes_are_distinct() {
        assert_eq!(ReplyCode::EnteringPassiveMode.code(), 227);
        assert_eq!(ReplyCode::EnteringExtendedPassiveMode.code(), 229);
    }
}
