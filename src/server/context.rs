//! Server context
//!
//! Process-wide state shared by every session: configuration, the passive
//! listener registry, the data-socket directory and the collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use log::{info, warn};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, StaticAuthenticator};
use crate::config::{ServerConfig, SharedRuntimeConfig, StartupConfig};
use crate::error::ServerError;
use crate::middleware::logging::LoggingHooks;
use crate::middleware::rate_limit::{BandwidthLimiter, RateLimit};
use crate::session::hooks::BusinessHooks;
use crate::storage::{FileSystem, LocalFileSystem};
use crate::tls;
use crate::transfer::bind_registry::BindRegistry;
use crate::transfer::data_channel::DataSettings;
use crate::transfer::session_directory::SessionDirectory;

pub struct ServerContext {
    pub startup: StartupConfig,
    pub runtime: SharedRuntimeConfig,
    pub directory: Arc<SessionDirectory>,
    pub binds: Arc<BindRegistry>,
    pub filesystem: Arc<dyn FileSystem>,
    pub authenticator: Arc<dyn Authenticator>,
    pub hooks: Arc<dyn BusinessHooks>,
    pub tls: Option<TlsAcceptor>,
    pub global_limiter: Arc<BandwidthLimiter>,
    pub shutdown: CancellationToken,
    next_session_id: AtomicU64,
    active_sessions: AtomicUsize,
}

impl ServerContext {
    /// Builds the context with the local file system, the configured users
    /// and logging hooks.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let global_bps = config.runtime.global_rate_limit_bps;
        let (startup, runtime) = config.split();

        let root = startup.server_root_path();
        if let Err(e) = std::fs::create_dir_all(&root) {
            warn!("Failed to create server root directory: {e}");
        } else {
            info!("Server root directory: {}", root.display());
        }

        let tls = match startup.tls_files() {
            Some((cert, key)) => Some(tls::load_acceptor(&cert, &key)?),
            None => None,
        };

        let directory = Arc::new(SessionDirectory::new());
        let binds = Arc::new(BindRegistry::new(
            Arc::clone(&directory),
            startup.data_port_range(),
            startup.data_connect_timeout(),
        ));

        Ok(Self {
            filesystem: Arc::new(LocalFileSystem::new(root)),
            authenticator: Arc::new(StaticAuthenticator::from_config(&startup)),
            hooks: Arc::new(LoggingHooks),
            global_limiter: Arc::new(BandwidthLimiter::new(global_bps)),
            shutdown: CancellationToken::new(),
            next_session_id: AtomicU64::new(1),
            active_sessions: AtomicUsize::new(0),
            startup,
            runtime,
            directory,
            binds,
            tls,
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn BusinessHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_filesystem(mut self, filesystem: Arc<dyn FileSystem>) -> Self {
        self.filesystem = filesystem;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Claims a session slot; `None` when `max_clients` is reached.
    pub fn try_enter(self: &Arc<Self>, max_clients: usize) -> Option<SessionSlot> {
        let claimed = self
            .active_sessions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max_clients).then_some(n + 1)
            })
            .is_ok();
        claimed.then(|| SessionSlot {
            ctx: Arc::clone(self),
        })
    }

    pub fn data_settings(&self) -> DataSettings {
        DataSettings {
            directory: Arc::clone(&self.directory),
            binds: Arc::clone(&self.binds),
            passive_ip: self.startup.passive_ip(),
            connect_timeout: self.startup.data_connect_timeout(),
            tls: self.tls.clone(),
        }
    }

    pub async fn rate_limit(&self) -> RateLimit {
        let session_bps = self.runtime.read().await.session_rate_limit_bps;
        RateLimit::new(Arc::clone(&self.global_limiter), session_bps)
    }
}

/// Held by a session for its lifetime; frees the slot on drop.
pub struct SessionSlot {
    ctx: Arc<ServerContext>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.ctx.active_sessions.fetch_sub(1, Ordering::AcqRel);
    }
}
