//! Module `bind_registry`
//!
//! Tracks the passive-mode listeners shared across sessions. One listener is
//! opened per distinct local address and kept alive while at least one
//! session references it; every connection it accepts is routed through the
//! `SessionDirectory`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::transfer::session_directory::SessionDirectory;

/// One shared passive listener.
struct BindEntry {
    /// Stops the accept task, which drops (closes) the listener.
    shutdown: CancellationToken,
    refs: usize,
}

/// Registry of passive listeners keyed by local address.
pub struct BindRegistry {
    entries: Mutex<HashMap<SocketAddr, BindEntry>>,
    directory: Arc<SessionDirectory>,
    port_range: RangeInclusive<u16>,
    cursor: AtomicU16,
    bind_timeout: Duration,
}

impl BindRegistry {
    pub fn new(
        directory: Arc<SessionDirectory>,
        port_range: RangeInclusive<u16>,
        bind_timeout: Duration,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            directory,
            cursor: AtomicU16::new(*port_range.start()),
            port_range,
            bind_timeout,
        }
    }

    /// References the listener on `local`, opening it on first use.
    pub async fn bind(&self, local: SocketAddr) -> Result<SocketAddr, TransferError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&local) {
            entry.refs += 1;
            debug!("Passive listener {local} shared, {} references", entry.refs);
            return Ok(local);
        }

        let listener = match tokio::time::timeout(self.bind_timeout, TcpListener::bind(local)).await
        {
            Ok(Ok(listener)) => listener,
            Ok(Err(e)) => return Err(TransferError::PassiveBindFailed(local, e)),
            Err(_) => return Err(TransferError::PassiveBindTimeout(local)),
        };
        // Port 0 asks the OS to choose; key the entry by what was actually bound.
        let bound = listener
            .local_addr()
            .map_err(|e| TransferError::PassiveBindFailed(local, e))?;

        let shutdown = CancellationToken::new();
        tokio::spawn(accept_loop(
            listener,
            bound,
            Arc::clone(&self.directory),
            shutdown.clone(),
        ));
        entries.insert(bound, BindEntry { shutdown, refs: 1 });
        info!("Passive listener opened on {bound}");
        Ok(bound)
    }

    /// Drops one reference to the listener on `local`, closing it at zero.
    pub async fn unbind(&self, local: SocketAddr) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&local) else {
            warn!("Unbind requested for {local} but no passive listener is registered");
            return;
        };

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            if let Some(entry) = entries.remove(&local) {
                entry.shutdown.cancel();
            }
            info!("Passive listener on {local} closed");
        } else {
            debug!("Passive listener {local} released, {} references left", entry.refs);
        }
    }

    /// Chooses and binds a passive address on `ip` from the configured range.
    ///
    /// Both ends of the range are usable; a range starting at port 0 lets the
    /// OS choose. Fresh ports are preferred so that sessions from the same
    /// client do not collide in the directory; when every port is taken an
    /// existing listener is shared.
    pub async fn allocate(&self, ip: IpAddr) -> Result<SocketAddr, TransferError> {
        let (first, last) = (*self.port_range.start(), *self.port_range.end());
        if first == 0 || first > last {
            return self.bind(SocketAddr::new(ip, 0)).await;
        }

        let span = u32::from(last - first) + 1;
        let start = u32::from(self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_sub(first));
        let candidates: Vec<SocketAddr> = (0..span)
            .map(|offset| {
                let port = u32::from(first) + (start + offset) % span;
                SocketAddr::new(ip, port as u16)
            })
            .collect();

        for candidate in &candidates {
            if self.is_bound(*candidate).await {
                continue;
            }
            match self.bind(*candidate).await {
                Ok(bound) => return Ok(bound),
                Err(e) => debug!("Passive port {candidate} unavailable: {e}"),
            }
        }

        for candidate in &candidates {
            if self.is_bound(*candidate).await {
                return self.bind(*candidate).await;
            }
        }

        error!("No passive port available on {ip} in {:?}", self.port_range);
        Err(TransferError::NoAvailablePort)
    }

    pub async fn is_bound(&self, local: SocketAddr) -> bool {
        self.entries.lock().await.contains_key(&local)
    }

    pub async fn ref_count(&self, local: SocketAddr) -> usize {
        self.entries
            .lock()
            .await
            .get(&local)
            .map(|entry| entry.refs)
            .unwrap_or(0)
    }
}

async fn accept_loop(
    listener: TcpListener,
    local: SocketAddr,
    directory: Arc<SessionDirectory>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Passive listener {local} accepted {peer}");
                    let directory = Arc::clone(&directory);
                    tokio::spawn(async move {
                        directory.deliver(stream).await;
                    });
                }
                Err(e) => {
                    warn!("Accept failed on passive listener {local}: {e}");
                }
            },
        }
    }
    debug!("Accept loop for {local} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    fn registry(range: RangeInclusive<u16>) -> BindRegistry {
        BindRegistry::new(
            Arc::new(SessionDirectory::new()),
            range,
            Duration::from_secs(1),
        )
    }

    async fn wait_closed(addr: SocketAddr) -> bool {
        // The accept task exits asynchronously after cancellation.
        for _ in 0..50 {
            if TcpStream::connect(addr).await.is_err() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn listener_open_while_references_remain() {
        let registry = registry(0..=0);
        let addr = registry.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert_eq!(registry.bind(addr).await.unwrap(), addr);
        assert_eq!(registry.ref_count(addr).await, 2);

        registry.unbind(addr).await;
        assert!(registry.is_bound(addr).await);
        assert!(TcpStream::connect(addr).await.is_ok());

        registry.unbind(addr).await;
        assert!(!registry.is_bound(addr).await);
        assert!(wait_closed(addr).await);
    }

    #[tokio::test]
    async fn unbind_without_entry_is_a_no_op() {
        let registry = registry(0..=0);
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        registry.unbind(addr).await;
        assert_eq!(registry.ref_count(addr).await, 0);

        let bound = registry.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        registry.unbind(bound).await;
        registry.unbind(bound).await;
        assert!(!registry.is_bound(bound).await);
    }

    #[tokio::test]
    async fn allocate_prefers_fresh_ports() {
        let registry = registry(0..=0);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let first = registry.allocate(ip).await.unwrap();
        let second = registry.allocate(ip).await.unwrap();
        assert_ne!(first, second);
        registry.unbind(first).await;
        registry.unbind(second).await;
    }

    #[tokio::test]
    async fn allocate_hands_out_the_last_port_of_the_range() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let registry = registry(port..=port);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let bound = registry.allocate(ip).await.unwrap();
        assert_eq!(bound.port(), port);

        // With the only port taken the listener is shared.
        assert_eq!(registry.allocate(ip).await.unwrap(), bound);
        assert_eq!(registry.ref_count(bound).await, 2);
    }
}
