//! Transfer result types
//!
//! Defines result structures returned by data connection and transfer operations.

use crate::protocol::commands::{CommandCode, TransferKind};

/// Outcome of preparing the data channel for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStatus {
    /// A new data connection was established.
    Opened,
    /// A block-mode channel from a previous transfer is reused.
    AlreadyOpen,
}

/// Summary of a finished transfer passed to `after_transfer`.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub code: CommandCode,
    pub kind: TransferKind,
    pub path: String,
    pub bytes: u64,
    pub success: bool,
}
