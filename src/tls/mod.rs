//! TLS support
//!
//! Certificate loading and the upgradable stream used by both the control
//! and the data channel.

pub mod config;
pub mod stream;

pub use config::{acceptor_from_pem, load_acceptor};
pub use stream::SecureStream;
