//! RAX FTP Server - Entry Point
//!
//! Loads `config.toml` (plus `RAX_FTP__*` environment overrides), binds the
//! control socket and serves until Ctrl-C.

use env_logger::Env;
use log::{error, info};

use rax_ftp_engine::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default filter
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Launching FTP server...");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {e}"),
        }
        shutdown.cancel();
    });

    server.start().await;

    // Give sessions a moment to send their 421 and release data sockets.
    let ctx = server.context();
    let deadline = tokio::time::Instant::now() + ctx.startup.close_wait();
    while ctx.active_sessions() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    info!("Server stopped");
}
