use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::SinkExt;
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::protocol::codec::ControlCodec;
use crate::protocol::responses::{Reply, ReplyCode};
use crate::server::context::ServerContext;
use crate::session::handle_client;

pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Binds the control socket with the default collaborators.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let ctx = ServerContext::new(config)?;
        Self::with_context(ctx).await
    }

    /// Binds the control socket for a customized context.
    pub async fn with_context(ctx: ServerContext) -> Result<Self, ServerError> {
        let address = ctx.startup.control_socket();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::Bind(address.clone(), e))?;
        info!("Server bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the accept loop and every session when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.ctx.shutdown.clone()
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    pub async fn start(&self) {
        let max_clients = self.ctx.runtime.read().await.max_clients;
        info!(
            "Starting RAX FTP engine on {} (max {} clients)",
            self.ctx.startup.control_socket(),
            max_clients
        );

        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.dispatch(stream, addr).await,
                    Err(e) => error!("Error accepting connection: {e}"),
                },
            }
        }
    }

    async fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        let max_clients = self.ctx.runtime.read().await.max_clients;
        let Some(slot) = self.ctx.try_enter(max_clients) else {
            warn!("Rejecting {addr}: {max_clients} clients already connected");
            tokio::spawn(refuse(stream, self.ctx.startup.max_command_length));
            return;
        };

        let ctx = Arc::clone(&self.ctx);
        // Spawn a task for each client so the accept loop doesn't block
        tokio::spawn(async move {
            let _slot = slot;
            handle_client(ctx, stream).await;
        });
    }
}

async fn refuse(stream: TcpStream, max_length: usize) {
    let mut framed = Framed::new(stream, ControlCodec::new(max_length));
    let reply = Reply::new(
        ReplyCode::ServiceNotAvailable,
        "Too many connections. Try again later.",
    );
    if let Err(e) = framed.send(reply).await {
        warn!("Failed to send refusal: {e}");
    }
}
