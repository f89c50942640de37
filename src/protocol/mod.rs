//! FTP Protocol implementation
//!
//! Handles FTP command parsing, sequencing, framing, address encoding and
//! response generation.

pub mod address;
pub mod codec;
pub mod commands;
pub mod responses;
pub mod sequencer;

pub use codec::ControlCodec;
pub use commands::{Command, CommandCode, CommandDescriptor, TransferKind, parse_command};
pub use responses::{Reply, ReplyCode};
pub use sequencer::validate;
