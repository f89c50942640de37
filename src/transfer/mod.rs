//! Transfer module for the FTP engine
//!
//! Data connection lifecycle, shared passive listeners, data-socket matching,
//! the data channel codec and the background transfer executor.

pub mod bind_registry;
pub mod block;
pub mod data_channel;
pub mod executor;
pub mod modes;
pub mod results;
pub mod session_directory;

// Re-export key types
pub use bind_registry::BindRegistry;
pub use block::{DataBlock, DataCodec};
pub use data_channel::{DataConnectionManager, DataConnector, DataSettings};
pub use executor::{Transfer, TransferExecutor, TransferState, TransferTarget};
pub use modes::{CodecParams, ConnectionMode, DataType, Structure, TransmissionMode};
pub use results::{OpenStatus, TransferReport};
pub use session_directory::{DataKey, SessionDirectory};
