// ABOUTME: Owns one TCP connection: a reader task that parses frames and dispatches
// ABOUTME: them, a writer task that drains the outbound queue, and the channel id registry

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, trace, warn};

use crate::channel::Channel;
use crate::codec;
use crate::config::DpxConfig;
use crate::error::DpxError;
use crate::frame::{Frame, FrameType};
use crate::peer::PeerHandle;
use crate::queue::BoundedQueue;

/// Outcome of a single write attempt, reported back to the frame's sender
/// through the ephemeral reply channel described in spec.md §3/§4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok,
    ShortWrite,
    Failed,
}

type OutboundItem = (Frame, oneshot::Sender<WriteOutcome>);

/// The wrapper around a single TCP socket that carries frames for many
/// channels in both directions concurrently. See spec.md §3/§4.3.
pub struct DuplexConn {
    pub id: u64,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    outbound: Arc<BoundedQueue<OutboundItem>>,
    channels: Mutex<HashMap<i64, Arc<Channel>>>,
    closed: AtomicBool,
}

impl DuplexConn {
    fn new(id: u64, stream: &TcpStream, config: &DpxConfig) -> Arc<Self> {
        Arc::new(Self {
            id,
            local_addr: stream.local_addr().ok(),
            peer_addr: stream.peer_addr().ok(),
            outbound: BoundedQueue::new(config.channel_queue_depth),
            channels: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Insert `channel` into the id map (replacing any prior binding) and
    /// publish this connection into the channel's rendezvous slot.
    pub async fn link(self: &Arc<Self>, channel: Arc<Channel>) {
        self.channels.lock().await.insert(channel.id, channel.clone());
        channel.bind_connection(self.clone()).await;
    }

    pub async fn unlink(&self, channel_id: i64) {
        self.channels.lock().await.remove(&channel_id);
    }

    /// Synchronous-looking helper: enqueue `frame` on the outbound queue
    /// and wait for the writer to report the result. See spec.md §4.3.
    pub async fn write_frame(&self, frame: Frame) -> Result<WriteOutcome, DpxError> {
        let (tx, rx) = oneshot::channel();
        self.outbound
            .send((frame, tx))
            .await
            .map_err(|_| DpxError::DuplexClosed)?;
        rx.await.map_err(|_| DpxError::DuplexClosed)
    }

    /// Closes the outbound queue, which unblocks and terminates the
    /// writer. The reader terminates independently on EOF/error.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.outbound.close().await;
    }
}

/// Wrap an accepted or dialled socket in a new `DuplexConn` and spawn its
/// reader and writer tasks. See spec.md §4.5 `accept_connection`.
pub fn spawn(id: u64, stream: TcpStream, peer: PeerHandle, config: DpxConfig) -> Arc<DuplexConn> {
    let conn = DuplexConn::new(id, &stream, &config);
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    tokio::spawn(run_reader(conn.clone(), read_half, peer, config.clone()));
    tokio::spawn(run_writer(conn.clone(), write_half));

    conn
}

async fn run_reader(
    conn: Arc<DuplexConn>,
    mut read_half: OwnedReadHalf,
    peer: PeerHandle,
    config: DpxConfig,
) {
    let mut buf = BytesMut::with_capacity(config.decoder_buffer_size);
    let mut chunk = vec![0u8; config.socket_read_chunk];

    loop {
        loop {
            match codec::try_decode(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.advance(consumed);
                    dispatch(&conn, &peer, frame).await;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(conn = conn.id, %err, "dropping connection on malformed frame");
                    conn.close().await;
                    return;
                }
            }
        }

        match read_half.read(&mut chunk).await {
            Ok(0) => {
                trace!(conn = conn.id, "peer closed connection");
                conn.close().await;
                return;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!(conn = conn.id, %err, "read error, closing connection");
                conn.close().await;
                return;
            }
        }
    }
}

async fn dispatch(conn: &Arc<DuplexConn>, peer: &PeerHandle, frame: Frame) {
    match frame.frame_type {
        FrameType::Data => {
            let channel = conn.channels.lock().await.get(&frame.channel).cloned();
            match channel {
                Some(channel) => channel.handle_incoming(frame).await,
                None => trace!(channel = frame.channel, "dropped data frame for unknown channel"),
            }
        }
        FrameType::Open => {
            let already_registered = conn.channels.lock().await.contains_key(&frame.channel);
            if already_registered {
                trace!(channel = frame.channel, "dropped duplicate open frame");
                return;
            }
            if !peer.handle_open(conn, frame).await {
                trace!("open frame rejected by peer");
            }
        }
    }
}

async fn run_writer(conn: Arc<DuplexConn>, mut write_half: OwnedWriteHalf) {
    loop {
        let Some((frame, reply)) = conn.outbound.recv().await else {
            break;
        };
        let bytes = codec::encode(&frame);
        let outcome = match write_half.write(&bytes).await {
            Ok(n) if n == bytes.len() => WriteOutcome::Ok,
            Ok(n) => {
                warn!(conn = conn.id, written = n, total = bytes.len(), "short write");
                WriteOutcome::ShortWrite
            }
            Err(err) => {
                warn!(conn = conn.id, %err, "write failed");
                WriteOutcome::Failed
            }
        };
        let _ = reply.send(outcome);
    }
    let _ = write_half.shutdown().await;
}
