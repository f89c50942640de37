//! Helpers shared by the verb handlers.

use crate::error::FtpError;
use crate::protocol::commands::Command;
use crate::session::Session;
use crate::storage::validation::resolve_virtual_path;

/// The command's argument, or `501` when it has none.
pub fn require_arg(command: &Command) -> Result<&str, FtpError> {
    if command.has_arg() {
        Ok(command.arg.as_str())
    } else {
        Err(FtpError::bad_arguments(format!(
            "{} requires an argument",
            command.verb
        )))
    }
}

/// Resolves a client path against the session's working directory.
pub fn resolve(session: &Session, target: &str) -> Result<String, FtpError> {
    resolve_virtual_path(&session.cwd, target).map_err(FtpError::from)
}

/// Quotes a path for a 257 reply, doubling embedded quotes.
pub fn quote_path(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands::parse_command;
    use crate::protocol::responses::ReplyCode;

    #[test]
    fn missing_argument_is_a_syntax_error() {
        let err = require_arg(&parse_command("CWD")).unwrap_err();
        assert_eq!(err.code, ReplyCode::ParameterSyntaxError);
        assert_eq!(require_arg(&parse_command("CWD docs")).unwrap(), "docs");
    }

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(quote_path("/a\"b"), "\"/a\"\"b\"");
    }
}
