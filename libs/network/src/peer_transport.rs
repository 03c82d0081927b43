//! Peer Transport
//!
//! Owns every link of one machine: the accept loop, outbound connects, the
//! session table and one read loop per session. Decoded clock messages go to
//! the machine's [`Inbox`]; send failures are reported to the caller and
//! never end the process.
//!
//! ## Link Pairing
//!
//! For every pair of machines exactly one TCP connection carries traffic in
//! both directions. The lower id dials, then announces itself with a Hello
//! frame. The accepting side rejects unknown ids, ids that should have been
//! accepted the other way round, and duplicates of a live link.

use crate::inbox::Inbox;
use crate::session::{initiates_link, LinkRole, PeerSession};
use crate::transports::{FrameReader, FrameWriter, ReadOutcome, TransportConfig};
use crate::{Result, TransportError};
use codec::{ActorId, Frame, Message};
use futures::future::{join_all, try_join_all};
use machine_config::Peer;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

/// How often `wait_for_links` re-checks the session table
const LINK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Pause after a failed `accept` before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Lock-free link and traffic counters
#[derive(Debug, Default)]
struct TransportStats {
    links_initiated: AtomicU64,
    links_accepted: AtomicU64,
    links_rejected: AtomicU64,
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    send_failures: AtomicU64,
}

impl TransportStats {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            links_initiated: self.links_initiated.load(Ordering::Relaxed),
            links_accepted: self.links_accepted.load(Ordering::Relaxed),
            links_rejected: self.links_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the transport counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    pub links_initiated: u64,
    pub links_accepted: u64,
    pub links_rejected: u64,
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub send_failures: u64,
}

struct TransportInner {
    local: ActorId,
    /// Every other machine, ascending by id
    peers: Vec<Peer>,
    config: TransportConfig,
    sessions: RwLock<HashMap<ActorId, Arc<PeerSession>>>,
    inbox: Arc<dyn Inbox>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stats: TransportStats,
}

/// Cheaply cloneable handle; clones share one session table
#[derive(Clone)]
pub struct PeerTransport {
    inner: Arc<TransportInner>,
}

/// Resolves once the shutdown flag is set
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

impl PeerTransport {
    pub fn new(
        local: ActorId,
        mut peers: Vec<Peer>,
        inbox: Arc<dyn Inbox>,
        config: TransportConfig,
    ) -> Self {
        peers.retain(|peer| peer.id != local);
        peers.sort_by_key(|peer| peer.id);

        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(TransportInner {
                local,
                peers,
                config,
                sessions: RwLock::new(HashMap::new()),
                inbox,
                shutdown_tx,
                tasks: Mutex::new(Vec::new()),
                stats: TransportStats::default(),
            }),
        }
    }

    pub fn local_id(&self) -> ActorId {
        self.inner.local
    }

    pub fn peers(&self) -> &[Peer] {
        &self.inner.peers
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Bind the listening socket and start the accept loop.
    ///
    /// Returns the bound address, useful when binding port 0.
    pub async fn listen(&self, addr: &str) -> Result<SocketAddr> {
        if self.is_shutting_down() {
            return Err(TransportError::Shutdown);
        }

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            TransportError::connection_with_source(
                "Failed to bind listener",
                Some(addr.to_string()),
                e,
            )
        })?;
        let local_addr = listener.local_addr()?;

        info!(machine = %self.inner.local, addr = %local_addr, "Listening for peers");

        let transport = self.clone();
        let handle = tokio::spawn(async move { transport.accept_loop(listener).await });
        self.track(handle);

        Ok(local_addr)
    }

    async fn accept_loop(self, listener: TcpListener) {
        let mut shutdown = self.inner.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        debug!(remote = %remote_addr, "Accepted connection");
                        let transport = self.clone();
                        let handle = tokio::spawn(async move {
                            transport.accept_link(stream, remote_addr).await
                        });
                        self.track(handle);
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }

        debug!(machine = %self.inner.local, "Accept loop stopped");
    }

    /// Identify an inbound connection, then serve it until it closes
    async fn accept_link(self, stream: TcpStream, remote_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(remote = %remote_addr, "Failed to set TCP_NODELAY: {}", e);
        }
        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, remote_addr);

        let peer = match self.read_hello(&mut reader).await {
            Ok(peer) => peer,
            Err(e) => {
                if !e.is_shutdown() {
                    TransportStats::bump(&self.inner.stats.links_rejected);
                    warn!(remote = %remote_addr, error = %e, "Rejected inbound connection");
                }
                return;
            }
        };

        let writer = FrameWriter::new(write_half, remote_addr);
        let session = Arc::new(PeerSession::new(
            peer,
            remote_addr,
            LinkRole::Acceptor,
            writer,
        ));

        if let Err(e) = self.register(session.clone()) {
            TransportStats::bump(&self.inner.stats.links_rejected);
            warn!(peer = %peer, remote = %remote_addr, error = %e, "Rejected inbound link");
            return;
        }

        TransportStats::bump(&self.inner.stats.links_accepted);
        info!(machine = %self.inner.local, peer = %peer, remote = %remote_addr, "Link accepted");

        self.read_loop(session, reader).await;
    }

    /// Wait for the first frame of an inbound connection and vet the sender
    async fn read_hello(&self, reader: &mut FrameReader<OwnedReadHalf>) -> Result<ActorId> {
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        let handshake_timeout = self.inner.config.handshake_timeout;

        let outcome = tokio::select! {
            _ = stopped(&mut shutdown) => return Err(TransportError::Shutdown),
            read = timeout(handshake_timeout, reader.read_frame()) => read.map_err(|_| {
                TransportError::timeout("handshake", handshake_timeout.as_millis() as u64)
            })??,
        };

        let peer = match outcome {
            ReadOutcome::Frame(Frame::Hello { actor_id }) => actor_id,
            ReadOutcome::Frame(Frame::Clock(_)) => {
                return Err(TransportError::handshake("clock frame before hello"))
            }
            ReadOutcome::Malformed(e) => return Err(e.into()),
            ReadOutcome::Closed => {
                return Err(TransportError::handshake("connection closed before hello"))
            }
        };

        if !self.inner.peers.iter().any(|known| known.id == peer) {
            return Err(TransportError::handshake(format!(
                "unknown machine {}",
                peer
            )));
        }
        if !initiates_link(peer, self.inner.local) {
            return Err(TransportError::handshake(format!(
                "machine {} must accept from {}, not dial it",
                peer, self.inner.local
            )));
        }

        Ok(peer)
    }

    /// Dial one higher-id peer, retrying with backoff until the grace window
    /// runs out, then announce ourselves and start reading.
    pub async fn connect_to_peer(&self, peer: &Peer) -> Result<()> {
        let address = peer.address();
        let retry = &self.inner.config.retry;
        let deadline = Instant::now() + retry.grace;
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        let mut attempt: u32 = 0;

        let stream = loop {
            if self.is_shutting_down() {
                return Err(TransportError::Shutdown);
            }

            let failure = match timeout(
                self.inner.config.handshake_timeout,
                TcpStream::connect(&address),
            )
            .await
            {
                Ok(Ok(stream)) => break stream,
                Ok(Err(e)) => TransportError::connection_with_source(
                    format!("machine {} unreachable", peer.id),
                    Some(address.clone()),
                    e,
                ),
                Err(_) => TransportError::timeout(
                    format!("connect to machine {}", peer.id),
                    self.inner.config.handshake_timeout.as_millis() as u64,
                ),
            };

            if !failure.is_retryable() {
                return Err(failure);
            }

            let delay = retry.calculate_delay(attempt);
            if Instant::now()
                .checked_add(delay)
                .map_or(true, |retry_at| retry_at > deadline)
            {
                error!(
                    peer = %peer.id,
                    addr = %address,
                    attempts = attempt + 1,
                    "Giving up on peer after grace window"
                );
                return Err(failure);
            }

            debug!(
                peer = %peer.id,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Peer not reachable yet, retrying"
            );

            tokio::select! {
                _ = stopped(&mut shutdown) => return Err(TransportError::Shutdown),
                _ = sleep(delay) => {}
            }
            attempt += 1;
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(peer = %peer.id, "Failed to set TCP_NODELAY: {}", e);
        }
        let remote_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let mut writer = FrameWriter::new(write_half, remote_addr);
        writer
            .send_frame(&Frame::Hello {
                actor_id: self.inner.local,
            })
            .await?;

        let session = Arc::new(PeerSession::new(
            peer.id,
            remote_addr,
            LinkRole::Initiator,
            writer,
        ));
        self.register(session.clone())?;
        TransportStats::bump(&self.inner.stats.links_initiated);

        info!(
            machine = %self.inner.local,
            peer = %peer.id,
            remote = %remote_addr,
            attempts = attempt + 1,
            "Link established"
        );

        let reader = FrameReader::new(read_half, remote_addr);
        let transport = self.clone();
        let handle = tokio::spawn(async move { transport.read_loop(session, reader).await });
        self.track(handle);

        Ok(())
    }

    /// Dial every higher-id peer, then wait out the rest of the grace window
    /// for lower-id peers to dial us.
    ///
    /// An unreachable outbound peer is an error. Missing inbound links are
    /// only logged: those peers may still arrive later.
    pub async fn establish_links(&self) -> Result<()> {
        let started = Instant::now();
        let local = self.inner.local;

        let outbound = self
            .inner
            .peers
            .iter()
            .filter(|peer| initiates_link(local, peer.id));
        try_join_all(outbound.map(|peer| self.connect_to_peer(peer))).await?;

        let remaining = self
            .inner
            .config
            .retry
            .grace
            .saturating_sub(started.elapsed());
        let missing = self.wait_for_links(remaining).await;
        if missing.is_empty() {
            info!(machine = %local, peers = self.inner.peers.len(), "All links up");
        } else {
            warn!(machine = %local, ?missing, "Some peers have not connected yet");
        }

        Ok(())
    }

    /// Wait until every peer has a live link or `limit` passes.
    ///
    /// Returns the peers still missing.
    pub async fn wait_for_links(&self, limit: Duration) -> Vec<ActorId> {
        let deadline = Instant::now() + limit;
        loop {
            let missing = self.missing_peers();
            if missing.is_empty() || Instant::now() >= deadline || self.is_shutting_down() {
                return missing;
            }
            sleep(LINK_POLL_INTERVAL).await;
        }
    }

    fn missing_peers(&self) -> Vec<ActorId> {
        let sessions = self.inner.sessions.read();
        self.inner
            .peers
            .iter()
            .map(|peer| peer.id)
            .filter(|id| !sessions.get(id).is_some_and(|s| s.is_alive()))
            .collect()
    }

    /// Peers with a live link, ascending
    pub fn connected_peers(&self) -> Vec<ActorId> {
        let mut peers: Vec<ActorId> = self
            .inner
            .sessions
            .read()
            .values()
            .filter(|session| session.is_alive())
            .map(|session| session.peer())
            .collect();
        peers.sort();
        peers
    }

    pub fn is_connected(&self, peer: ActorId) -> bool {
        self.inner
            .sessions
            .read()
            .get(&peer)
            .is_some_and(|session| session.is_alive())
    }

    /// Send one clock message to one peer.
    ///
    /// A failed write drops the session; later sends to that peer return
    /// `NotConnected`.
    pub async fn send(&self, peer: ActorId, message: Message) -> Result<()> {
        let session = self
            .inner
            .sessions
            .read()
            .get(&peer)
            .cloned()
            .ok_or(TransportError::NotConnected { peer })?;

        if let Err(e) = session.send(message).await {
            TransportStats::bump(&self.inner.stats.send_failures);
            warn!(peer = %peer, error = %e, "Send failed, dropping session");
            self.remove_session(&session);
            return Err(e);
        }

        Ok(())
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Stop accepting, close every link and wait (bounded) for all
    /// transport tasks to finish. Tasks that overrun are aborted.
    ///
    /// Returns how many tasks had to be aborted; zero means every accept and
    /// read loop stopped on its own. Later calls return zero.
    pub async fn shutdown(&self) -> usize {
        if self.inner.shutdown_tx.send_replace(true) {
            return 0;
        }
        info!(machine = %self.inner.local, "Shutting down transport");

        let sessions: Vec<Arc<PeerSession>> = self
            .inner
            .sessions
            .write()
            .drain()
            .map(|(_, session)| session)
            .collect();

        let limit = self.inner.config.shutdown_timeout;
        let close_all = async {
            for session in &sessions {
                session.close().await;
            }
        };
        if timeout(limit, close_all).await.is_err() {
            warn!("Timed out closing sessions");
        }

        let mut handles = std::mem::take(&mut *self.inner.tasks.lock());
        let mut aborted = 0;
        if timeout(limit, join_all(handles.iter_mut())).await.is_err() {
            for handle in handles.iter().filter(|h| !h.is_finished()) {
                handle.abort();
                aborted += 1;
            }
            warn!(aborted, "Transport tasks did not stop in time, aborted them");
        }

        info!(machine = %self.inner.local, tasks = handles.len(), aborted, "Transport stopped");
        aborted
    }

    /// Insert a session unless a live one already exists for that peer
    fn register(&self, session: Arc<PeerSession>) -> Result<()> {
        let mut sessions = self.inner.sessions.write();

        // Checked under the table lock so shutdown cannot miss this session
        if self.is_shutting_down() {
            return Err(TransportError::Shutdown);
        }
        if sessions
            .get(&session.peer())
            .is_some_and(|existing| existing.is_alive())
        {
            return Err(TransportError::handshake(format!(
                "duplicate link from machine {}",
                session.peer()
            )));
        }

        sessions.insert(session.peer(), session);
        Ok(())
    }

    /// Remove `session` if it is still the one registered for its peer
    fn remove_session(&self, session: &Arc<PeerSession>) {
        session.mark_closed();
        let mut sessions = self.inner.sessions.write();
        if sessions
            .get(&session.peer())
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(&session.peer());
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Deliver every clock frame from one link until it closes
    async fn read_loop(self, session: Arc<PeerSession>, mut reader: FrameReader<OwnedReadHalf>) {
        let peer = session.peer();
        let mut shutdown = self.inner.shutdown_tx.subscribe();

        loop {
            let outcome = tokio::select! {
                _ = stopped(&mut shutdown) => break,
                outcome = reader.read_frame() => outcome,
            };

            match outcome {
                Ok(ReadOutcome::Frame(Frame::Clock(message))) => {
                    if message.sender() != peer {
                        TransportStats::bump(&self.inner.stats.malformed_frames);
                        warn!(
                            peer = %peer,
                            claimed = %message.sender(),
                            "Discarding message with mismatched sender"
                        );
                        continue;
                    }
                    TransportStats::bump(&self.inner.stats.frames_received);
                    self.inner.inbox.deliver(message);
                }
                Ok(ReadOutcome::Frame(Frame::Hello { .. })) => {
                    TransportStats::bump(&self.inner.stats.malformed_frames);
                    warn!(peer = %peer, "Discarding hello on established link");
                }
                Ok(ReadOutcome::Malformed(_)) => {
                    TransportStats::bump(&self.inner.stats.malformed_frames);
                }
                Ok(ReadOutcome::Closed) => {
                    info!(peer = %peer, "Peer closed link");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, category = e.category(), "Link failed");
                    break;
                }
            }
        }

        self.remove_session(&session);
        debug!(peer = %peer, role = ?session.role(), "Read loop stopped");
    }
}

impl std::fmt::Debug for PeerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTransport")
            .field("local", &self.inner.local)
            .field("peers", &self.inner.peers.len())
            .field("connected", &self.connected_peers())
            .finish()
    }
}
