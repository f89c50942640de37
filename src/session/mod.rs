//! Client sessions
//!
//! One session per control connection: its state, the control loop and the
//! hooks it reports to.

pub mod control;
pub mod hooks;
pub mod state;

use std::sync::Arc;

use log::warn;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::protocol::codec::ControlCodec;
use crate::server::context::ServerContext;
use crate::tls::SecureStream;
use crate::transfer::data_channel::{DataConnectionManager, canonical};
use crate::transfer::executor::TransferExecutor;

pub use hooks::{BusinessHooks, NoopHooks, SessionInfo};
pub use state::{ExitReason, LoginState, SecurityChange, Session};

/// Serves one accepted control connection until it closes.
pub async fn handle_client(ctx: Arc<ServerContext>, stream: TcpStream) {
    let (peer, local) = match (stream.peer_addr(), stream.local_addr()) {
        (Ok(peer), Ok(local)) => (canonical(peer), canonical(local)),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Dropping control connection with unreadable address: {e}");
            return;
        }
    };

    let id = ctx.next_session_id();
    let data = DataConnectionManager::new(id, local, peer, ctx.data_settings());
    let (executor, transfer_replies) = TransferExecutor::new(
        data.channel_slot(),
        Arc::clone(&ctx.hooks),
        ctx.rate_limit().await,
        ctx.startup.block_size,
    );
    let framed = Framed::new(
        SecureStream::Plain(stream),
        ControlCodec::new(ctx.startup.max_command_length),
    );
    let session = Session::new(id, peer, local, Arc::clone(&ctx), data, executor);

    control::run(session, framed, transfer_replies).await;
}
