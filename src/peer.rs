// ABOUTME: The user-facing object that owns listeners, dialled connections, and the
// ABOUTME: routing/accept queues for channels; implements round-robin open dispatch

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::config::DpxConfig;
use crate::duplex::{self, DuplexConn, WriteOutcome};
use crate::error::ErrorCode;
use crate::frame::Frame;
use crate::queue::BoundedQueue;

static NEXT_PEER_INDEX: AtomicU64 = AtomicU64::new(0);

async fn send_greeting(_stream: &mut TcpStream) -> io::Result<()> {
    Ok(())
}

async fn receive_greeting(_stream: &mut TcpStream) -> io::Result<()> {
    Ok(())
}

type OpenItem = (Frame, Arc<Channel>);

struct PeerState {
    conns: Vec<Arc<DuplexConn>>,
    listeners: Vec<JoinHandle<()>>,
    dialers: Vec<JoinHandle<()>>,
    chan_index: i64,
    next_conn_id: u64,
    rr_index: usize,
    closed: bool,
}

/// The user-facing object owning listeners, dialled connections, and the
/// routing/accept queues for channels. See spec.md §3/§4.5.
pub struct Peer {
    pub index: u64,
    config: DpxConfig,
    state: Mutex<PeerState>,
    open_frames: Arc<BoundedQueue<OpenItem>>,
    incoming_channels: Arc<BoundedQueue<Arc<Channel>>>,
    /// Fires whenever a connection is added, so `route_open_frames` can
    /// wake up after the connection list drains and later refills — a
    /// generalization of the source's single-shot `first_conn` signal
    /// (see DESIGN.md).
    conn_added: Notify,
}

/// Shared handle to a peer, used by the tasks (reader, router, dialer,
/// acceptor) that must reach back into it.
pub type PeerHandle = Arc<Peer>;

impl Peer {
    pub fn new() -> Arc<Self> {
        Self::with_config(DpxConfig::default())
    }

    pub fn with_config(config: DpxConfig) -> Arc<Self> {
        let peer = Arc::new(Self {
            index: NEXT_PEER_INDEX.fetch_add(1, Ordering::Relaxed),
            open_frames: BoundedQueue::new(config.channel_queue_depth),
            incoming_channels: BoundedQueue::new(config.channel_queue_depth),
            conn_added: Notify::new(),
            state: Mutex::new(PeerState {
                conns: Vec::new(),
                listeners: Vec::new(),
                dialers: Vec::new(),
                chan_index: 0,
                next_conn_id: 0,
                rr_index: 0,
                closed: false,
            }),
            config,
        });
        tokio::spawn(run_router(peer.clone()));
        peer
    }

    /// Open a new client channel for `method`. The OPEN frame is queued
    /// for the router; binding to a connection happens asynchronously.
    /// See spec.md §4.5 `open`.
    pub async fn open(self: &Arc<Self>, method: impl Into<String>) -> Option<Arc<Channel>> {
        let method = method.into();
        let mut state = self.state.lock().await;
        if state.closed {
            return None;
        }
        let id = state.chan_index;
        state.chan_index += 1;
        drop(state);

        let channel = Channel::new_client(id, method.clone(), &self.config);
        let mut open_frame = Frame::open(method);
        open_frame.channel = id;

        if self
            .open_frames
            .send((open_frame, channel.clone()))
            .await
            .is_err()
        {
            return None;
        }
        Some(channel)
    }

    /// Accept the next inbound channel, or `None` once the peer is closed.
    pub async fn accept(self: &Arc<Self>) -> Option<Arc<Channel>> {
        self.incoming_channels.recv().await
    }

    /// Called by the reader task when an OPEN frame with an unregistered
    /// channel id arrives. Returns whether the peer accepted it. See
    /// spec.md §4.5 `handle_open`.
    pub(crate) async fn handle_open(
        self: &Arc<Self>,
        conn: &Arc<DuplexConn>,
        frame: Frame,
    ) -> bool {
        if self.state.lock().await.closed {
            return false;
        }
        let channel =
            Channel::new_server(frame.channel, frame.method.clone(), conn, &self.config).await;
        // Blocking send, matching the original's `alchansend`: a full
        // queue applies backpressure to this connection's reader until
        // `accept()` makes room, rather than silently dropping an
        // already-linked, pump-spawned channel on transient contention.
        if self.incoming_channels.send(channel).await.is_err() {
            warn!(peer = self.index, "incoming_channels closed, dropping open frame");
            return false;
        }
        true
    }

    /// Bind a TCPv4 listener with `SO_REUSEADDR` and spawn its accept
    /// loop. `*` as address means any-interface. See spec.md §4.5/§6.
    pub async fn bind(self: &Arc<Self>, addr: &str, port: u16) -> io::Result<SocketAddr> {
        let bind_addr = if addr == "*" { "0.0.0.0" } else { addr };
        let resolved: SocketAddr = tokio::net::lookup_host((bind_addr, port))
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unresolvable address"))?;

        let socket = match resolved {
            SocketAddr::V4(_) => tokio::net::TcpSocket::new_v4()?,
            SocketAddr::V6(_) => tokio::net::TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(resolved)?;
        let listener = socket.listen(1024)?;
        let local_addr = listener.local_addr()?;

        let peer = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((mut stream, remote)) => {
                        if let Err(err) = receive_greeting(&mut stream).await {
                            warn!(%remote, %err, "greeting failed, dropping inbound connection");
                            continue;
                        }
                        peer.accept_connection(stream).await;
                    }
                    Err(err) => {
                        warn!(%err, "accept failed, stopping listener");
                        return;
                    }
                }
            }
        });
        self.state.lock().await.listeners.push(handle);
        info!(peer = self.index, %local_addr, "listening");
        Ok(local_addr)
    }

    /// Schedule a dial loop against `addr:port` with the retry policy in
    /// spec.md §4.5/§6. Returns immediately; fails only if the peer is
    /// already closed.
    pub async fn connect(self: &Arc<Self>, addr: impl Into<String>, port: u16) -> bool {
        if self.state.lock().await.closed {
            return false;
        }
        let addr = addr.into();
        let peer = self.clone();
        let attempts = self.config.retry_attempts;
        let interval = self.config.retry_interval;
        let handle = tokio::spawn(async move {
            dial_loop(peer, addr, port, attempts, interval).await;
        });
        self.state.lock().await.dialers.push(handle);
        true
    }

    /// Wrap an accepted or dialled socket in a new `DuplexConn`, append
    /// it to the connection list, and spawn its reader/writer tasks. See
    /// spec.md §4.5 `accept_connection`.
    pub(crate) async fn accept_connection(self: &Arc<Self>, stream: TcpStream) -> Arc<DuplexConn> {
        let mut state = self.state.lock().await;
        let id = state.next_conn_id;
        state.next_conn_id += 1;
        let conn = duplex::spawn(id, stream, self.clone(), self.config.clone());
        state.conns.push(conn.clone());
        drop(state);

        self.conn_added.notify_waiters();
        debug!(peer = self.index, conn = conn.id, "connection added");
        conn
    }

    /// Idempotent. Closes `open_frames` and `incoming_channels` and every
    /// `DuplexConn`'s outbound queue. Listeners and already-spawned
    /// connections are left running until their own tasks observe
    /// closure; disposal happens when the returned `Arc<Peer>` is
    /// dropped. See spec.md §4.5 `close`.
    pub async fn close(self: &Arc<Self>) -> ErrorCode {
        let mut state = self.state.lock().await;
        if state.closed {
            return ErrorCode::PeerAlreadyClosed;
        }
        state.closed = true;
        let conns = state.conns.clone();
        drop(state);

        self.open_frames.close().await;
        self.incoming_channels.close().await;
        for conn in conns {
            conn.close().await;
        }
        ErrorCode::None
    }

    pub async fn connection_count(self: &Arc<Self>) -> usize {
        self.state.lock().await.conns.len()
    }
}

async fn dial_loop(peer: Arc<Peer>, addr: String, port: u16, attempts: u32, interval: Duration) {
    for attempt in 1..=attempts {
        if peer.state.lock().await.closed {
            return;
        }
        match TcpStream::connect((addr.as_str(), port)).await {
            Ok(mut stream) => {
                if let Err(err) = send_greeting(&mut stream).await {
                    warn!(%addr, port, %err, "greeting failed on dial");
                    return;
                }
                let _ = stream.set_nodelay(true);
                peer.accept_connection(stream).await;
                return;
            }
            Err(err) => {
                debug!(%addr, port, attempt, %err, "dial attempt failed");
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
    warn!(%addr, port, attempts, "giving up dialing after exhausting retries");
}

/// Await the connection list being non-empty, correctly even if a
/// connection is added between the initial check and the call to
/// `notified()` (the standard `Notify` check-then-wait idiom). Loops
/// because a connection added concurrently with another draining back
/// to empty would otherwise let a stale wakeup fall through.
async fn wait_for_connection(peer: &Arc<Peer>) {
    loop {
        if !peer.state.lock().await.conns.is_empty() {
            return;
        }
        let notified = peer.conn_added.notified();
        if !peer.state.lock().await.conns.is_empty() {
            return;
        }
        notified.await;
    }
}

/// The router: load-balances queued OPEN frames across the connection
/// pool in round-robin order. See spec.md §4.5 `route_open_frames` /
/// `rr_next_conn`.
async fn run_router(peer: Arc<Peer>) {
    let mut deferred: Option<OpenItem> = None;
    loop {
        wait_for_connection(&peer).await;

        loop {
            if peer.state.lock().await.conns.is_empty() {
                break;
            }

            let item = match deferred.take() {
                Some(item) => item,
                None => match peer.open_frames.recv().await {
                    Some(item) => item,
                    None => return,
                },
            };

            let conn = {
                let mut state = peer.state.lock().await;
                if state.conns.is_empty() {
                    deferred = Some(item);
                    break;
                }
                let idx = state.rr_index % state.conns.len();
                state.rr_index = state.rr_index.wrapping_add(1);
                state.conns[idx].clone()
            };

            match conn.write_frame(item.0.clone()).await {
                Ok(WriteOutcome::Ok) => {
                    conn.link(item.1.clone()).await;
                }
                _ => {
                    deferred = Some(item);
                }
            }
        }
    }
}
