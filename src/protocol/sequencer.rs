//! Command sequencing
//!
//! Decides whether a newly parsed verb may legally follow the previously
//! accepted one.

use crate::protocol::commands::{CommandCode, CommandDescriptor};

/// Returns whether `candidate` may follow `previous`.
///
/// `extra_next` is the follow-up verb a handler forced for this step (for
/// example ACCT after a PASS that needs an account). It widens the static
/// next-set of `previous` instead of replacing it.
pub fn validate(
    previous: &CommandDescriptor,
    candidate: &CommandDescriptor,
    extra_next: Option<CommandCode>,
) -> bool {
    if candidate.special {
        return true;
    }

    match extra_next {
        Some(forced) => candidate.code == forced || previous.allows(candidate.code),
        None if previous.next.is_empty() => true,
        None => previous.allows(candidate.code),
    }
}
