//! Transfer executor
//!
//! Runs one RETR/STOR/APPE/LIST/NLST at a time on a background task so the
//! control loop keeps reading commands (ABOR, STAT, NOOP) while data moves.
//! Final replies are queued on a channel the control loop drains in order.
//!
//! State machine: Idle -> Opening -> Running -> {Closing | Aborting} -> Idle.
//! Whichever of normal completion and `abort_from_internal` observes the
//! running state first finalizes the transfer; the other one is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{FtpError, TransferError};
use crate::middleware::rate_limit::RateLimit;
use crate::protocol::commands::{CommandCode, TransferKind};
use crate::protocol::responses::{Reply, ReplyCode};
use crate::session::hooks::{BusinessHooks, SessionInfo};
use crate::storage::filesystem::{FtpFile, Listing};
use crate::transfer::block::DataBlock;
use crate::transfer::data_channel::{ChannelSlot, DataConnector, close_slot};
use crate::transfer::results::TransferReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Opening,
    Running,
    Closing,
    Aborting,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the transfer reads from or writes to.
pub enum TransferTarget {
    File(Box<dyn FtpFile>),
    Listing(Listing),
}

/// One data transfer request.
pub struct Transfer {
    pub code: CommandCode,
    pub kind: TransferKind,
    pub path: String,
    pub target: TransferTarget,
}

impl Transfer {
    pub fn file(code: CommandCode, path: impl Into<String>, file: Box<dyn FtpFile>) -> Self {
        Self {
            code,
            kind: code.transfer_kind().unwrap_or(TransferKind::Retrieve),
            path: path.into(),
            target: TransferTarget::File(file),
        }
    }

    pub fn listing(code: CommandCode, listing: Listing) -> Self {
        Self {
            code,
            kind: TransferKind::List,
            path: listing.path.clone(),
            target: TransferTarget::Listing(listing),
        }
    }
}

/// Bookkeeping for the transfer in flight.
struct Active {
    code: CommandCode,
    kind: TransferKind,
    path: String,
    session: SessionInfo,
    bytes: Arc<AtomicU64>,
}

impl Active {
    fn report(&self, success: bool) -> TransferReport {
        TransferReport {
            code: self.code,
            kind: self.kind,
            path: self.path.clone(),
            bytes: self.bytes.load(Ordering::Relaxed),
            success,
        }
    }
}

struct Inner {
    state: TransferState,
    active: Option<Active>,
    cancel: Option<CancellationToken>,
    stream_mode: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    replies: mpsc::UnboundedSender<Reply>,
    idle: watch::Sender<bool>,
    hooks: Arc<dyn BusinessHooks>,
    channel: ChannelSlot,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn queue_reply(&self, reply: Reply) {
        if self.replies.send(reply).is_err() {
            debug!("Control loop gone, dropping transfer reply");
        }
    }

    /// Opening -> Running. False if the transfer was aborted meanwhile.
    fn mark_running(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == TransferState::Opening {
            inner.state = TransferState::Running;
            true
        } else {
            false
        }
    }

    /// Normal end of the body: classify and finalize, unless aborted first.
    async fn complete(&self, success: bool) {
        let (active, stream_mode) = {
            let mut inner = self.lock();
            if inner.state != TransferState::Running {
                return;
            }
            inner.state = if success {
                TransferState::Closing
            } else {
                TransferState::Aborting
            };
            inner.cancel = None;
            (inner.active.take(), inner.stream_mode)
        };

        let reply = if success {
            if stream_mode {
                close_slot(&self.channel).await;
                Reply::new(ReplyCode::ClosingDataConnection, "Closing data connection")
            } else {
                Reply::new(ReplyCode::FileActionOkay, "Transfer complete")
            }
        } else {
            close_slot(&self.channel).await;
            FtpError::aborted("Connection closed; transfer aborted").to_reply()
        };
        self.finalize(active, success, Some(reply)).await;
    }

    /// The data connection could not be opened.
    async fn fail_open(&self, err: TransferError) {
        let active = {
            let mut inner = self.lock();
            if inner.state != TransferState::Opening {
                return;
            }
            inner.state = TransferState::Aborting;
            inner.cancel = None;
            inner.active.take()
        };
        warn!("Data connection failed: {err}");
        self.finalize(active, false, Some(FtpError::from(err).to_reply()))
            .await;
    }

    /// Runs the transfer hook, then returns to Idle and queues the final
    /// reply under one lock, so a client reacting to the reply never finds
    /// the executor still busy.
    async fn finalize(&self, active: Option<Active>, success: bool, reply: Option<Reply>) {
        if let Some(active) = active {
            if active.kind != TransferKind::List {
                self.hooks
                    .after_transfer(&active.session, &active.report(success))
                    .await;
            }
        }
        {
            let mut inner = self.lock();
            inner.state = TransferState::Idle;
            if let Some(reply) = reply {
                self.queue_reply(reply);
            }
        }
        self.idle.send_replace(true);
    }
}

/// Per-session transfer runner.
pub struct TransferExecutor {
    shared: Arc<Shared>,
    idle: watch::Receiver<bool>,
    rate: RateLimit,
    block_size: usize,
}

impl TransferExecutor {
    /// Returns the executor and the receiver the control loop drains for final replies.
    pub fn new(
        channel: ChannelSlot,
        hooks: Arc<dyn BusinessHooks>,
        rate: RateLimit,
        block_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<Reply>) {
        let (replies, rx) = mpsc::unbounded_channel();
        let (idle_tx, idle_rx) = watch::channel(true);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: TransferState::Idle,
                active: None,
                cancel: None,
                stream_mode: true,
            }),
            replies,
            idle: idle_tx,
            hooks,
            channel,
        });
        let executor = Self {
            shared,
            idle: idle_rx,
            rate,
            block_size: block_size.max(1),
        };
        (executor, rx)
    }

    pub fn state(&self) -> TransferState {
        self.shared.lock().state
    }

    pub fn is_busy(&self) -> bool {
        self.state() != TransferState::Idle
    }

    /// Path and byte count of the transfer in flight, for STAT.
    pub fn progress(&self) -> Option<(CommandCode, String, u64)> {
        let inner = self.shared.lock();
        inner
            .active
            .as_ref()
            .map(|a| (a.code, a.path.clone(), a.bytes.load(Ordering::Relaxed)))
    }

    /// Starts `transfer` over the connection `connector` opens.
    pub fn start(
        &self,
        transfer: Transfer,
        connector: DataConnector,
        session: SessionInfo,
    ) -> Result<(), TransferError> {
        let token = CancellationToken::new();
        let bytes = Arc::new(AtomicU64::new(0));
        {
            let mut inner = self.shared.lock();
            if inner.state != TransferState::Idle {
                return Err(TransferError::Busy);
            }
            inner.state = TransferState::Opening;
            inner.stream_mode = connector.is_stream();
            inner.cancel = Some(token.clone());
            inner.active = Some(Active {
                code: transfer.code,
                kind: transfer.kind,
                path: transfer.path.clone(),
                session: session.clone(),
                bytes: Arc::clone(&bytes),
            });
        }
        self.shared.idle.send_replace(false);
        debug!(
            "Session {} starting {} {}",
            session.id, transfer.code, transfer.path
        );

        let shared = Arc::clone(&self.shared);
        let rate = self.rate.clone();
        let block_size = self.block_size;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Session {} transfer task cancelled", session.id);
                }
                _ = run(shared, transfer, connector, session.clone(), rate, block_size, bytes) => {}
            }
        });
        Ok(())
    }

    /// Stops the transfer in flight.
    ///
    /// No-op unless Opening or Running. The channel is always closed; with
    /// `write_reply` exactly one `426` is queued.
    pub async fn abort_from_internal(&self, write_reply: bool) -> bool {
        let (token, active) = {
            let mut inner = self.shared.lock();
            match inner.state {
                TransferState::Opening | TransferState::Running => {}
                _ => return false,
            }
            inner.state = TransferState::Aborting;
            (inner.cancel.take(), inner.active.take())
        };
        if let Some(token) = token {
            token.cancel();
        }
        close_slot(&self.shared.channel).await;
        let reply = write_reply
            .then(|| FtpError::aborted("Connection closed; transfer aborted").to_reply());
        self.shared.finalize(active, false, reply).await;
        true
    }

    /// Waits until the executor is idle, up to `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut idle = self.idle.clone();
        tokio::time::timeout(timeout, idle.wait_for(|idle| *idle))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    /// Forces the executor back to Idle, aborting silently if needed.
    pub async fn clear(&self) {
        if !self.abort_from_internal(false).await {
            let mut inner = self.shared.lock();
            inner.active = None;
            inner.cancel = None;
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    transfer: Transfer,
    connector: DataConnector,
    session: SessionInfo,
    rate: RateLimit,
    block_size: usize,
    bytes: Arc<AtomicU64>,
) {
    if let Err(e) = connector.open().await {
        shared.fail_open(e).await;
        return;
    }
    if !shared.mark_running() {
        return;
    }

    {
        let guard = shared.channel.lock().await;
        if let Some(channel) = guard.as_ref() {
            let stream = channel.get_ref();
            if let (Ok(local), Ok(peer)) = (stream.local_addr(), stream.peer_addr()) {
                shared.hooks.on_data_connected(&session, local, peer).await;
            }
        }
    }

    let outcome = match transfer.target {
        TransferTarget::File(mut file) => {
            let result = match transfer.kind {
                TransferKind::Store => store(&shared, file.as_mut(), &rate, &bytes).await,
                _ => retrieve(&shared, file.as_mut(), &rate, block_size, &bytes).await,
            };
            let closed = file.close().await;
            result.and_then(|success| closed.map(|()| success).map_err(TransferError::from))
        }
        TransferTarget::Listing(listing) => {
            send_listing(&shared, &listing, &rate, block_size, &bytes).await
        }
    };

    match outcome {
        Ok(success) => shared.complete(success).await,
        Err(e) => {
            error!("Session {} transfer {} failed: {e}", session.id, transfer.path);
            shared.complete(false).await;
        }
    }
}

/// Consumes inbound blocks until end of stream or an EOF block.
async fn store(
    shared: &Shared,
    file: &mut dyn FtpFile,
    rate: &RateLimit,
    bytes: &AtomicU64,
) -> Result<bool, TransferError> {
    let mut guard = shared.channel.lock().await;
    let channel = guard.as_mut().ok_or(TransferError::ChannelMissing)?;
    let stream_mode = channel.codec().params().is_stream();

    while let Some(block) = channel.next().await {
        let block = block?;
        let content = block.content();
        if !content.is_empty() {
            rate.acquire(content.len()).await;
            file.write_block(content).await?;
            bytes.fetch_add(content.len() as u64, Ordering::Relaxed);
        }
        if block.is_eof() {
            return Ok(true);
        }
    }

    if stream_mode {
        Ok(true)
    } else {
        Err(TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "data connection closed before EOF block",
        )))
    }
}

/// Sends file blocks, waiting for writability on each send.
async fn retrieve(
    shared: &Shared,
    file: &mut dyn FtpFile,
    rate: &RateLimit,
    block_size: usize,
    bytes: &AtomicU64,
) -> Result<bool, TransferError> {
    let mut guard = shared.channel.lock().await;
    let channel = guard.as_mut().ok_or(TransferError::ChannelMissing)?;

    while let Some(chunk) = file.read_block(block_size).await? {
        rate.acquire(chunk.len()).await;
        let len = chunk.len() as u64;
        channel.send(DataBlock::data(chunk)).await?;
        bytes.fetch_add(len, Ordering::Relaxed);
    }
    if !channel.codec().params().is_stream() {
        channel.send(DataBlock::eof()).await?;
    }
    Ok(!file.is_reading())
}

async fn send_listing(
    shared: &Shared,
    listing: &Listing,
    rate: &RateLimit,
    block_size: usize,
    bytes: &AtomicU64,
) -> Result<bool, TransferError> {
    let mut guard = shared.channel.lock().await;
    let channel = guard.as_mut().ok_or(TransferError::ChannelMissing)?;

    let mut buf = BytesMut::with_capacity(block_size);
    for line in &listing.lines {
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        if buf.len() >= block_size {
            let chunk = buf.split().freeze();
            rate.acquire(chunk.len()).await;
            bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            channel.send(DataBlock::data(chunk)).await?;
        }
    }
    if !buf.is_empty() {
        let chunk = buf.freeze();
        rate.acquire(chunk.len()).await;
        bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        channel.send(DataBlock::data(chunk)).await?;
    }
    if !channel.codec().params().is_stream() {
        channel.send(DataBlock::eof()).await?;
    }
    Ok(listing.complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::error::StorageError;
    use crate::transfer::bind_registry::BindRegistry;
    use crate::transfer::data_channel::{DataConnectionManager, DataSettings};
    use crate::transfer::session_directory::SessionDirectory;

    #[derive(Default)]
    struct RecordingHooks {
        transfers: AtomicUsize,
        successes: AtomicUsize,
    }

    #[async_trait]
    impl BusinessHooks for RecordingHooks {
        async fn after_transfer(&self, _session: &SessionInfo, report: &TransferReport) {
            self.transfers.fetch_add(1, Ordering::SeqCst);
            if report.success {
                self.successes.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// In-memory file. `stuck` keeps `is_reading` true after the last block.
    struct MemoryFile {
        chunks: Vec<Bytes>,
        written: Arc<Mutex<Vec<u8>>>,
        reading: bool,
        stuck: bool,
    }

    impl MemoryFile {
        fn reader(chunks: &[&'static [u8]], stuck: bool) -> Self {
            Self {
                chunks: chunks.iter().rev().map(|c| Bytes::from_static(c)).collect(),
                written: Arc::default(),
                reading: true,
                stuck,
            }
        }

        fn writer(written: Arc<Mutex<Vec<u8>>>) -> Self {
            Self {
                chunks: Vec::new(),
                written,
                reading: false,
                stuck: false,
            }
        }
    }

    #[async_trait]
    impl FtpFile for MemoryFile {
        async fn read_block(&mut self, _max: usize) -> Result<Option<Bytes>, StorageError> {
            let next = self.chunks.pop();
            if next.is_none() && !self.stuck {
                self.reading = false;
            }
            Ok(next)
        }

        async fn write_block(&mut self, data: &[u8]) -> Result<(), StorageError> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), StorageError> {
            Ok(())
        }

        fn is_reading(&self) -> bool {
            self.reading
        }

        fn path(&self) -> &str {
            "/mem"
        }

        fn bytes_transferred(&self) -> u64 {
            0
        }
    }

    struct Fixture {
        manager: DataConnectionManager,
        executor: TransferExecutor,
        replies: mpsc::UnboundedReceiver<Reply>,
        hooks: Arc<RecordingHooks>,
        listener: TcpListener,
        directory: Arc<SessionDirectory>,
    }

    async fn fixture() -> Fixture {
        let directory = Arc::new(SessionDirectory::new());
        let settings = DataSettings {
            binds: Arc::new(BindRegistry::new(
                Arc::clone(&directory),
                0..=0,
                Duration::from_secs(1),
            )),
            directory: Arc::clone(&directory),
            passive_ip: None,
            connect_timeout: Duration::from_secs(2),
            tls: None,
        };
        let local: SocketAddr = "127.0.0.1:21".parse().unwrap();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let mut manager = DataConnectionManager::new(9, local, peer, settings);

        // The test plays the client side of an active-mode connection.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        manager.set_active(listener.local_addr().unwrap()).await;

        let hooks = Arc::new(RecordingHooks::default());
        let (executor, replies) = TransferExecutor::new(
            manager.channel_slot(),
            hooks.clone(),
            RateLimit::unlimited(),
            4096,
        );
        Fixture {
            manager,
            executor,
            replies,
            hooks,
            listener,
            directory,
        }
    }

    fn session() -> SessionInfo {
        SessionInfo {
            id: 9,
            peer: "127.0.0.1:40000".parse().unwrap(),
            local: "127.0.0.1:21".parse().unwrap(),
            user: Some("alice".into()),
            secure: false,
        }
    }

    async fn accept(listener: &TcpListener) -> TcpStream {
        listener.accept().await.unwrap().0
    }

    #[tokio::test]
    async fn clean_store_replies_226_and_reports_success() {
        let mut fx = fixture().await;
        let written = Arc::new(Mutex::new(Vec::new()));
        let transfer = Transfer::file(
            CommandCode::Stor,
            "/up.txt",
            Box::new(MemoryFile::writer(Arc::clone(&written))),
        );
        fx.executor
            .start(transfer, fx.manager.connector(), session())
            .unwrap();
        assert!(fx.executor.is_busy());

        let mut client = accept(&fx.listener).await;
        client.write_all(b"line one\r\nline two\r\n").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let reply = fx.replies.recv().await.unwrap();
        assert_eq!(reply.code(), ReplyCode::ClosingDataConnection);
        assert!(fx.executor.wait_idle(Duration::from_secs(1)).await);
        assert_eq!(written.lock().unwrap().as_slice(), b"line one\nline two\n");
        assert_eq!(fx.hooks.transfers.load(Ordering::SeqCst), 1);
        assert_eq!(fx.hooks.successes.load(Ordering::SeqCst), 1);
        assert!(fx.manager.channel_slot().lock().await.is_none());
    }

    #[tokio::test]
    async fn retrieve_still_reading_replies_426() {
        let mut fx = fixture().await;
        let transfer = Transfer::file(
            CommandCode::Retr,
            "/down.bin",
            Box::new(MemoryFile::reader(&[b"abc", b"def"], true)),
        );
        fx.executor
            .start(transfer, fx.manager.connector(), session())
            .unwrap();

        let mut client = accept(&fx.listener).await;
        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"abcdef");

        let reply = fx.replies.recv().await.unwrap();
        assert_eq!(reply.code(), ReplyCode::ConnectionClosedTransferAborted);
        assert!(fx.executor.wait_idle(Duration::from_secs(1)).await);
        assert_eq!(fx.hooks.transfers.load(Ordering::SeqCst), 1);
        assert_eq!(fx.hooks.successes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn complete_retrieve_replies_226() {
        let mut fx = fixture().await;
        let transfer = Transfer::file(
            CommandCode::Retr,
            "/down.bin",
            Box::new(MemoryFile::reader(&[b"payload"], false)),
        );
        fx.executor
            .start(transfer, fx.manager.connector(), session())
            .unwrap();

        let mut client = accept(&fx.listener).await;
        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"payload");
        let reply = fx.replies.recv().await.unwrap();
        assert_eq!(reply.code(), ReplyCode::ClosingDataConnection);
        assert_eq!(fx.hooks.successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn incomplete_listing_replies_426_without_hook() {
        let mut fx = fixture().await;
        let listing = Listing {
            path: "/".into(),
            lines: vec!["a.txt".into(), "b.txt".into()],
            complete: false,
        };
        fx.executor
            .start(
                Transfer::listing(CommandCode::Nlst, listing),
                fx.manager.connector(),
                session(),
            )
            .unwrap();

        let mut client = accept(&fx.listener).await;
        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"a.txt\r\nb.txt\r\n");

        let reply = fx.replies.recv().await.unwrap();
        assert_eq!(reply.code(), ReplyCode::ConnectionClosedTransferAborted);
        assert!(fx.executor.wait_idle(Duration::from_secs(1)).await);
        assert_eq!(fx.hooks.transfers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn double_abort_queues_one_426() {
        let mut fx = fixture().await;
        let written = Arc::new(Mutex::new(Vec::new()));
        let transfer = Transfer::file(
            CommandCode::Stor,
            "/slow.bin",
            Box::new(MemoryFile::writer(written)),
        );
        fx.executor
            .start(transfer, fx.manager.connector(), session())
            .unwrap();
        let mut client = accept(&fx.listener).await;
        client.write_all(b"partial").await.unwrap();

        assert!(fx.executor.abort_from_internal(true).await);
        assert!(!fx.executor.abort_from_internal(true).await);
        assert_eq!(fx.executor.state(), TransferState::Idle);

        let reply = fx.replies.recv().await.unwrap();
        assert_eq!(reply.code(), ReplyCode::ConnectionClosedTransferAborted);
        assert!(fx.replies.try_recv().is_err());
        assert_eq!(fx.hooks.transfers.load(Ordering::SeqCst), 1);
        assert!(fx.manager.channel_slot().lock().await.is_none());

        // The server side closed the data connection.
        let mut rest = Vec::new();
        let _ = client.read_to_end(&mut rest).await;
    }

    #[tokio::test]
    async fn second_start_while_busy_is_refused() {
        let mut fx = fixture().await;
        let first = Transfer::listing(CommandCode::List, Listing::new("/", vec![]));
        fx.executor
            .start(first, fx.manager.connector(), session())
            .unwrap();
        let second = Transfer::listing(CommandCode::List, Listing::new("/", vec![]));
        assert!(matches!(
            fx.executor.start(second, fx.manager.connector(), session()),
            Err(TransferError::Busy)
        ));
        fx.executor.clear().await;
        assert!(!fx.executor.is_busy());
    }

    #[tokio::test]
    async fn abort_while_opening_withdraws_pending_match() {
        let mut fx = fixture().await;
        fx.manager.enter_passive().await.unwrap();
        let listing = Transfer::listing(CommandCode::List, Listing::new("/", vec![]));
        fx.executor
            .start(listing, fx.manager.connector(), session())
            .unwrap();

        // No client ever connects; the transfer stays in Opening.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.executor.state(), TransferState::Opening);
        assert_eq!(fx.directory.len(), 1);

        assert!(fx.executor.abort_from_internal(true).await);
        let reply = fx.replies.recv().await.unwrap();
        assert_eq!(reply.code(), ReplyCode::ConnectionClosedTransferAborted);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fx.directory.is_empty());
        fx.manager.clear().await;
    }
}
