//! Module `data_channel`
//!
//! Per-session data connection lifecycle: records the PORT/PASV setup, opens
//! the data connection when a transfer starts (through the shared
//! `SessionDirectory` in both directions), optionally wraps it in TLS and
//! keeps the framed channel in a slot shared with the transfer executor.
//!
//! A passive match is published as soon as PASV/EPSV binds the listener, so a
//! client that connects before sending the transfer verb is parked until the
//! transfer asks for it.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;

use crate::error::{TlsError, TransferError};
use crate::tls::SecureStream;
use crate::transfer::bind_registry::BindRegistry;
use crate::transfer::block::DataCodec;
use crate::transfer::modes::{CodecParams, ConnectionMode};
use crate::transfer::results::OpenStatus;
use crate::transfer::session_directory::{DataKey, Registration, SessionDirectory};

/// Slack added to the connect timeout while waiting for the matched socket.
const MATCH_GRACE: Duration = Duration::from_secs(2);

/// A live data connection.
pub type DataChannel = Framed<SecureStream, DataCodec>;

/// Slot holding the session's data channel, shared with the executor.
pub type ChannelSlot = Arc<Mutex<Option<DataChannel>>>;

/// Process-wide pieces a session's data connections are built from.
#[derive(Clone)]
pub struct DataSettings {
    pub directory: Arc<SessionDirectory>,
    pub binds: Arc<BindRegistry>,
    /// Address announced in PASV/EPSV; the control connection's local IP when unset.
    pub passive_ip: Option<IpAddr>,
    pub connect_timeout: Duration,
    pub tls: Option<TlsAcceptor>,
}

/// Negotiated data connection setup.
#[derive(Debug, Clone, Default)]
pub struct DataConnectionState {
    pub mode: ConnectionMode,
    /// Passive listener address while in passive mode.
    pub local: Option<SocketAddr>,
    /// Client address announced by PORT/EPRT while in active mode.
    pub remote: Option<SocketAddr>,
    pub params: CodecParams,
    /// PROT P: data connections are wrapped in TLS.
    pub protected: bool,
}

/// Mapped IPv4 addresses (`::ffff:a.b.c.d`) seen on a dual-stack listener
/// are treated as the plain IPv4 address.
pub fn canonical(addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(addr.ip().to_canonical(), addr.port())
}

pub struct DataConnectionManager {
    session_id: u64,
    control_local: SocketAddr,
    control_peer: SocketAddr,
    settings: DataSettings,
    state: DataConnectionState,
    /// Match armed by PASV/EPSV, handed to the next connector.
    passive_match: Option<Registration>,
    channel: ChannelSlot,
}

impl DataConnectionManager {
    pub fn new(
        session_id: u64,
        control_local: SocketAddr,
        control_peer: SocketAddr,
        settings: DataSettings,
    ) -> Self {
        Self {
            session_id,
            control_local: canonical(control_local),
            control_peer: canonical(control_peer),
            settings,
            state: DataConnectionState::default(),
            passive_match: None,
            channel: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> &DataConnectionState {
        &self.state
    }

    pub fn params(&self) -> CodecParams {
        self.state.params
    }

    pub fn channel_slot(&self) -> ChannelSlot {
        Arc::clone(&self.channel)
    }

    pub fn set_protected(&mut self, protected: bool) {
        self.state.protected = protected;
    }

    pub fn is_configured(&self) -> bool {
        self.state.mode != ConnectionMode::Unset
    }

    /// References the passive listener on `local`, records it as this
    /// session's and arms the match for the client's data connection.
    pub async fn bind_passive(&mut self, local: SocketAddr) -> Result<SocketAddr, TransferError> {
        self.release_passive().await;
        let bound = self.settings.binds.bind(local).await?;
        self.arm_passive(bound).await?;
        Ok(bound)
    }

    /// Drops this session's reference to the passive listener on `local`.
    pub async fn unbind_passive(&mut self, local: SocketAddr) {
        if self.state.local == Some(local) && self.state.mode == ConnectionMode::Passive {
            self.passive_match = None;
            self.state.local = None;
            self.state.mode = ConnectionMode::Unset;
        }
        self.settings.binds.unbind(local).await;
    }

    async fn arm_passive(&mut self, bound: SocketAddr) -> Result<(), TransferError> {
        let key = DataKey::new(self.control_peer.ip(), bound);
        match self.settings.directory.register(key, self.session_id) {
            Ok(registration) => {
                self.passive_match = Some(registration);
                self.state.mode = ConnectionMode::Passive;
                self.state.local = Some(bound);
                self.state.remote = None;
                Ok(())
            }
            Err(e) => {
                self.settings.binds.unbind(bound).await;
                Err(e)
            }
        }
    }

    async fn release_passive(&mut self) {
        self.passive_match = None;
        if self.state.mode == ConnectionMode::Passive {
            if let Some(local) = self.state.local.take() {
                self.settings.binds.unbind(local).await;
            }
        }
    }

    /// Switches to passive mode on a fresh (or shared) listener and returns the
    /// address to announce to the client.
    pub async fn enter_passive(&mut self) -> Result<SocketAddr, TransferError> {
        self.release_passive().await;
        let bound = self
            .settings
            .binds
            .allocate(self.control_local.ip())
            .await?;
        self.arm_passive(bound).await?;

        let announced_ip = self.settings.passive_ip.unwrap_or(bound.ip());
        debug!("Session {} passive on {bound}, announcing {announced_ip}", self.session_id);
        Ok(SocketAddr::new(announced_ip, bound.port()))
    }

    /// Records the client address for active mode.
    pub async fn set_active(&mut self, remote: SocketAddr) {
        self.release_passive().await;
        let remote = canonical(remote);
        self.state.mode = ConnectionMode::Active;
        self.state.remote = Some(remote);
        debug!("Session {} active towards {remote}", self.session_id);
    }

    /// Checks whether a transfer can use the current channel.
    ///
    /// A block-mode channel left open by the previous transfer is reused; a
    /// stream-mode channel must have been closed by now.
    pub async fn open_status(&self) -> Result<OpenStatus, TransferError> {
        if self.channel.lock().await.is_some() {
            return if self.state.params.is_stream() {
                Err(TransferError::ChannelStillOpen)
            } else {
                Ok(OpenStatus::AlreadyOpen)
            };
        }
        if !self.is_configured() {
            return Err(TransferError::NotConfigured);
        }
        Ok(OpenStatus::Opened)
    }

    /// Captures what is needed to open the data connection from another task.
    /// The armed passive match moves into the connector.
    pub fn connector(&mut self) -> DataConnector {
        let pending = if self.state.mode == ConnectionMode::Passive {
            self.passive_match.take()
        } else {
            None
        };
        DataConnector {
            session_id: self.session_id,
            mode: self.state.mode,
            control_local: self.control_local,
            control_peer: self.control_peer,
            passive_local: self.state.local,
            remote: self.state.remote,
            params: self.state.params,
            tls: if self.state.protected {
                self.settings.tls.clone()
            } else {
                None
            },
            protected: self.state.protected,
            pending,
            directory: Arc::clone(&self.settings.directory),
            connect_timeout: self.settings.connect_timeout,
            channel: Arc::clone(&self.channel),
        }
    }

    /// Makes sure a data channel is present in the slot.
    pub async fn open_data_connection(&mut self) -> Result<OpenStatus, TransferError> {
        self.connector().open().await
    }

    /// Applies renegotiated MODE/STRU/TYPE to future and live channels.
    pub async fn reconfigure(&mut self, params: CodecParams) {
        self.state.params = params;
        if let Some(channel) = self.channel.lock().await.as_mut() {
            channel.codec_mut().set_params(params);
        }
    }

    pub async fn close_channel(&self) {
        close_slot(&self.channel).await;
    }

    /// Releases every resource held for the session.
    pub async fn clear(&mut self) {
        self.close_channel().await;
        self.release_passive().await;
        self.state = DataConnectionState::default();
    }
}

/// Takes the channel out of the slot and shuts it down.
pub async fn close_slot(slot: &ChannelSlot) {
    let channel = slot.lock().await.take();
    if let Some(channel) = channel {
        channel.into_inner().shutdown_quietly().await;
    }
}

/// Opens a data connection on behalf of a session.
pub struct DataConnector {
    session_id: u64,
    mode: ConnectionMode,
    control_local: SocketAddr,
    control_peer: SocketAddr,
    passive_local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
    params: CodecParams,
    tls: Option<TlsAcceptor>,
    protected: bool,
    pending: Option<Registration>,
    directory: Arc<SessionDirectory>,
    connect_timeout: Duration,
    channel: ChannelSlot,
}

impl DataConnector {
    pub fn channel_slot(&self) -> ChannelSlot {
        Arc::clone(&self.channel)
    }

    pub fn is_stream(&self) -> bool {
        self.params.is_stream()
    }

    /// Establishes the data connection unless a reusable one is already open.
    ///
    /// Dropping the returned future withdraws any pending match.
    pub async fn open(mut self) -> Result<OpenStatus, TransferError> {
        let channel = Arc::clone(&self.channel);
        let mut slot = channel.lock().await;
        if slot.is_some() {
            if self.params.is_stream() {
                return Err(TransferError::ChannelStillOpen);
            }
            return Ok(OpenStatus::AlreadyOpen);
        }

        let tcp = match self.mode {
            ConnectionMode::Passive => self.await_passive().await?,
            ConnectionMode::Active => self.connect_active().await?,
            ConnectionMode::Unset => return Err(TransferError::NotConfigured),
        };

        let stream = if self.protected {
            let acceptor = self
                .tls
                .as_ref()
                .ok_or(TransferError::Tls(TlsError::NotConfigured))?;
            SecureStream::Plain(tcp).upgrade(acceptor).await?
        } else {
            SecureStream::Plain(tcp)
        };

        info!(
            "Session {} data connection established ({:?}, {})",
            self.session_id,
            self.mode,
            if stream.is_secure() { "TLS" } else { "clear" }
        );
        *slot = Some(Framed::new(stream, DataCodec::new(self.params)));
        Ok(OpenStatus::Opened)
    }

    async fn await_passive(&mut self) -> Result<TcpStream, TransferError> {
        let local = self.passive_local.ok_or(TransferError::NotConfigured)?;
        let registration = match self.pending.take() {
            Some(registration) => registration,
            // The armed match was used by an earlier transfer on this listener.
            None => self
                .directory
                .register(DataKey::new(self.control_peer.ip(), local), self.session_id)?,
        };
        self.await_match(registration, local).await
    }

    async fn connect_active(&self) -> Result<TcpStream, TransferError> {
        let remote = self.remote.ok_or(TransferError::NotConfigured)?;
        let socket = match self.control_local {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.bind(SocketAddr::new(self.control_local.ip(), 0))?;
        let local = socket.local_addr()?;

        let registration = self
            .directory
            .register(DataKey::new(remote.ip(), local), self.session_id)?;
        let (key, ticket) = (registration.key(), registration.ticket());

        let directory = Arc::clone(&self.directory);
        let timeout = self.connect_timeout;
        let session_id = self.session_id;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, socket.connect(remote)).await {
                Ok(Ok(stream)) => {
                    directory.deliver(stream).await;
                }
                Ok(Err(e)) => {
                    warn!("Session {session_id} active connect to {remote} failed: {e}");
                    directory.withdraw(&key, ticket);
                }
                Err(_) => {
                    warn!("Session {session_id} active connect to {remote} timed out");
                    directory.withdraw(&key, ticket);
                }
            }
        });

        self.await_match(registration, remote).await
    }

    /// Waits for the matched socket; the registration is withdrawn on return.
    async fn await_match(
        &self,
        mut registration: Registration,
        target: SocketAddr,
    ) -> Result<TcpStream, TransferError> {
        match tokio::time::timeout(self.connect_timeout + MATCH_GRACE, registration.matched()).await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(_)) => Err(TransferError::MatchCancelled),
            Err(_) => Err(TransferError::ConnectTimeout(target)),
        }
    }
}
