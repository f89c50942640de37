//! Module `session_directory`
//!
//! Process-wide lookup used to hand a freshly connected data socket to the
//! control session that asked for it. Sockets arriving on a shared passive
//! listener (or completing an active connect) carry no protocol bytes that
//! identify their session, so the match is made on the socket's address pair.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::error::TransferError;

/// Lookup attempts before an unmatched data socket is dropped.
const MATCH_ATTEMPTS: u32 = 5;
/// Delay between lookup attempts; covers a control task that has not yet
/// published its pending entry.
const MATCH_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Identifies a data connection before any data flows: the remote IP and the
/// server-side socket address it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataKey {
    pub peer_ip: IpAddr,
    pub local: SocketAddr,
}

impl DataKey {
    pub fn new(peer_ip: IpAddr, local: SocketAddr) -> Self {
        Self { peer_ip, local }
    }

    /// Key of an already connected socket.
    pub fn of_stream(stream: &TcpStream) -> std::io::Result<Self> {
        Ok(Self {
            peer_ip: stream.peer_addr()?.ip(),
            local: stream.local_addr()?,
        })
    }
}

/// A session waiting for its data connection.
struct PendingMatch {
    session_id: u64,
    /// Distinguishes successive registrations of the same key.
    ticket: u64,
    deliver: oneshot::Sender<TcpStream>,
}

/// Concurrent map from `DataKey` to the session awaiting that connection.
#[derive(Default)]
pub struct SessionDirectory {
    pending: DashMap<DataKey, PendingMatch>,
    next_ticket: AtomicU64,
}

/// A published pending match.
///
/// Dropping it withdraws the entry, so an abandoned wait never leaves a
/// stale match behind.
pub struct Registration {
    directory: Arc<SessionDirectory>,
    key: DataKey,
    ticket: u64,
    matched: oneshot::Receiver<TcpStream>,
}

impl Registration {
    pub fn key(&self) -> DataKey {
        self.key
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Waits for the matched socket. Fails once the entry was withdrawn.
    pub async fn matched(&mut self) -> Result<TcpStream, oneshot::error::RecvError> {
        (&mut self.matched).await
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.directory.withdraw(&self.key, self.ticket);
    }
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a pending match for `session_id`.
    ///
    /// A socket that arrives before the session awaits it is parked in the
    /// returned registration. Fails when another session is already waiting
    /// on the same key.
    pub fn register(
        self: &Arc<Self>,
        key: DataKey,
        session_id: u64,
    ) -> Result<Registration, TransferError> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let pending = PendingMatch {
            session_id,
            ticket,
            deliver: tx,
        };
        match self.pending.entry(key) {
            Entry::Occupied(mut occupied) => {
                // A dead receiver left behind by an abandoned wait can be replaced.
                if occupied.get().deliver.is_closed() || occupied.get().session_id == session_id {
                    occupied.insert(pending);
                } else {
                    return Err(TransferError::AddressInUse {
                        peer_ip: key.peer_ip,
                        local: key.local,
                    });
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(pending);
            }
        }
        debug!("Session {session_id} awaiting data connection {key:?}");
        Ok(Registration {
            directory: Arc::clone(self),
            key,
            ticket,
            matched: rx,
        })
    }

    /// Withdraws the pending match published under `ticket`, if still present.
    pub fn withdraw(&self, key: &DataKey, ticket: u64) {
        if self
            .pending
            .remove_if(key, |_, pending| pending.ticket == ticket)
            .is_some()
        {
            debug!("Pending data connection {key:?} withdrawn");
        }
    }

    /// Hands a connected data socket to its waiting session.
    ///
    /// Returns `false` when no session claimed it; the socket is then dropped.
    pub async fn deliver(&self, stream: TcpStream) -> bool {
        let key = match DataKey::of_stream(&stream) {
            Ok(key) => key,
            Err(e) => {
                warn!("Dropping data connection with unreadable address: {e}");
                return false;
            }
        };

        for attempt in 1..=MATCH_ATTEMPTS {
            if let Some((_, pending)) = self.pending.remove(&key) {
                let session_id = pending.session_id;
                return match pending.deliver.send(stream) {
                    Ok(()) => {
                        debug!("Data connection {key:?} matched to session {session_id}");
                        true
                    }
                    Err(_) => {
                        warn!("Session {session_id} stopped waiting for data connection {key:?}");
                        false
                    }
                };
            }
            if attempt < MATCH_ATTEMPTS {
                tokio::time::sleep(MATCH_RETRY_DELAY).await;
            }
        }

        warn!(
            "No session awaiting data connection from {} on {}; closing it",
            key.peer_ip, key.local
        );
        false
    }

    pub fn is_pending(&self, key: &DataKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn delivers_to_registered_session() {
        let directory = Arc::new(SessionDirectory::new());
        let (_client, accepted) = connected_pair().await;
        let key = DataKey::of_stream(&accepted).unwrap();

        let mut registration = directory.register(key, 7).unwrap();
        assert!(directory.deliver(accepted).await);
        let stream = registration.matched().await.unwrap();
        assert_eq!(DataKey::of_stream(&stream).unwrap(), key);
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn late_registration_is_still_matched() {
        let directory = Arc::new(SessionDirectory::new());
        let (_client, accepted) = connected_pair().await;
        let key = DataKey::of_stream(&accepted).unwrap();

        let delivering = tokio::spawn({
            let directory = Arc::clone(&directory);
            async move { directory.deliver(accepted).await }
        });
        // Register inside the retry window, after the first lookup missed.
        tokio::time::sleep(MATCH_RETRY_DELAY + MATCH_RETRY_DELAY / 2).await;
        let mut registration = directory.register(key, 3).unwrap();

        assert!(delivering.await.unwrap());
        let stream = registration.matched().await.unwrap();
        assert_eq!(DataKey::of_stream(&stream).unwrap(), key);
    }

    #[tokio::test]
    async fn second_session_on_same_key_is_refused() {
        let directory = Arc::new(SessionDirectory::new());
        let key = DataKey::new("10.0.0.1".parse().unwrap(), "10.0.0.2:2122".parse().unwrap());
        let first = directory.register(key, 1).unwrap();
        assert!(matches!(
            directory.register(key, 2),
            Err(TransferError::AddressInUse { .. })
        ));
        assert!(directory.is_pending(&key));
        drop(first);
        assert!(!directory.is_pending(&key));
    }

    #[tokio::test]
    async fn replaced_registration_does_not_withdraw_its_successor() {
        let directory = Arc::new(SessionDirectory::new());
        let key = DataKey::new("10.0.0.1".parse().unwrap(), "10.0.0.2:2122".parse().unwrap());
        let old = directory.register(key, 1).unwrap();
        let current = directory.register(key, 1).unwrap();
        drop(old);
        assert!(directory.is_pending(&key));
        drop(current);
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn unmatched_socket_is_dropped() {
        let directory = SessionDirectory::new();
        let (_client, accepted) = connected_pair().await;
        assert!(!directory.deliver(accepted).await);
    }
}
