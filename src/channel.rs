// ABOUTME: The logical bidirectional frame stream multiplexed over a DuplexConn,
// ABOUTME: and its pump task, which binds the channel to a connection and drains its outgoing queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::config::DpxConfig;
use crate::duplex::{DuplexConn, WriteOutcome};
use crate::error::{DpxError, ErrorCode};
use crate::frame::{Frame, FrameType};
use crate::queue::BoundedQueue;

/// A logical bidirectional frame stream, identified by a peer-local id.
/// See spec.md §3/§4.4.
pub struct Channel {
    pub id: i64,
    pub server: bool,
    method: Mutex<Option<String>>,
    closed: AtomicBool,
    /// Server-side: has a `last` frame already been delivered to the user?
    last_seen: AtomicBool,
    error: Mutex<ErrorCode>,
    incoming: Arc<BoundedQueue<Frame>>,
    outgoing: Arc<BoundedQueue<Frame>>,
    conn_binding: Arc<BoundedQueue<Arc<DuplexConn>>>,
    current_conn: Mutex<Option<Arc<DuplexConn>>>,
    /// Signaled by the pump task when it has finished draining and exited,
    /// so `close` can report only once teardown is actually complete.
    cleanup: Notify,
    pump_exited: AtomicBool,
}

impl Channel {
    fn new(id: i64, server: bool, method: Option<String>, config: &DpxConfig) -> Arc<Self> {
        Arc::new(Self {
            id,
            server,
            method: Mutex::new(method),
            closed: AtomicBool::new(false),
            last_seen: AtomicBool::new(false),
            error: Mutex::new(ErrorCode::None),
            incoming: BoundedQueue::new(config.channel_queue_depth),
            outgoing: BoundedQueue::new(config.channel_queue_depth),
            conn_binding: BoundedQueue::new(1),
            current_conn: Mutex::new(None),
            cleanup: Notify::new(),
            pump_exited: AtomicBool::new(false),
        })
    }

    /// Allocate a fresh client-side channel (unbound; the peer's router will
    /// bind it to a connection once the OPEN frame is dispatched).
    pub fn new_client(id: i64, method: String, config: &DpxConfig) -> Arc<Self> {
        let channel = Self::new(id, false, Some(method), config);
        tokio::spawn(run_pump(channel.clone()));
        channel
    }

    /// Allocate a server-side channel for an inbound OPEN frame, linked
    /// immediately to the connection it arrived on.
    pub async fn new_server(
        id: i64,
        method: Option<String>,
        conn: &Arc<DuplexConn>,
        config: &DpxConfig,
    ) -> Arc<Self> {
        let channel = Self::new(id, true, method, config);
        tokio::spawn(run_pump(channel.clone()));
        conn.link(channel.clone()).await;
        channel
    }

    pub async fn bind_connection(&self, conn: Arc<DuplexConn>) {
        *self.current_conn.lock().await = Some(conn.clone());
        // Best effort: a depth-1 queue only ever needs to hold the most
        // recent binding, so a full queue means the pump hasn't consumed
        // the previous one yet; blocking here would stall the caller
        // (the router or another link()) for no benefit, so fall back to
        // a blocking send only if the non-blocking path is contended.
        if self.conn_binding.try_send(conn.clone()).is_err() {
            let _ = self.conn_binding.send(conn).await;
        }
    }

    pub async fn method(&self) -> Option<String> {
        self.method.lock().await.clone()
    }

    pub async fn set_method(&self, new_method: impl Into<String>) -> Option<String> {
        let mut guard = self.method.lock().await;
        std::mem::replace(&mut *guard, Some(new_method.into()))
    }

    pub async fn error(&self) -> ErrorCode {
        *self.error.lock().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Validate, deep-copy, stamp, and enqueue a frame for transmission.
    /// See spec.md §4.4.
    pub async fn send_frame(self: &Arc<Self>, mut frame: Frame) -> Result<(), DpxError> {
        if self.closed.load(Ordering::SeqCst) {
            let code = *self.error.lock().await;
            return Err(DpxError::ChannelClosed(if code.is_ok() {
                ErrorCode::ChanClosed
            } else {
                code
            }));
        }
        frame.channel = self.id;
        frame.frame_type = FrameType::Data;
        self.outgoing
            .send(frame)
            .await
            .map_err(|_| DpxError::ChannelClosed(ErrorCode::ChanClosed))
    }

    /// Block for the next inbound frame. Returns `None` on graceful or
    /// forced end of stream. See spec.md §4.4.
    pub async fn receive_frame(self: &Arc<Self>) -> Option<Frame> {
        if self.server && self.last_seen.load(Ordering::SeqCst) {
            return None;
        }
        let frame = self.incoming.recv().await?;
        if frame.last {
            if self.server {
                self.last_seen.store(true, Ordering::SeqCst);
            } else {
                self.schedule_close(ErrorCode::None);
            }
        }
        Some(frame)
    }

    /// The reader task's entry point for a DATA frame addressed to this
    /// channel. See spec.md §4.3/§4.4.
    pub async fn handle_incoming(self: &Arc<Self>, frame: Frame) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if frame.is_protocol_error() {
            debug!(channel = self.id, "closing channel on protocol error frame");
            self.schedule_close(ErrorCode::ChanFrame);
            return;
        }
        if self.incoming.send(frame).await.is_err() {
            warn!(channel = self.id, "dropped inbound frame on closed channel");
        }
    }

    /// Spawn `close` as a background task so the caller (the reader loop,
    /// the pump, or `receive_frame`) is not blocked waiting for the pump's
    /// cleanup signal. Mirrors the source's "schedules the channel for
    /// closure" language.
    fn schedule_close(self: &Arc<Self>, reason: ErrorCode) {
        let channel = self.clone();
        tokio::spawn(async move { channel.close(reason).await });
    }

    /// Idempotent. See spec.md §4.4.
    pub async fn close(self: &Arc<Self>, reason: ErrorCode) {
        if self.closed.swap(true, Ordering::SeqCst) {
            self.wait_for_pump_exit().await;
            return;
        }
        self.close_queues(reason).await;
        self.wait_for_pump_exit().await;
    }

    /// Await `finish_pump`'s signal, using the same check-then-wait idiom
    /// as `peer::wait_for_connection`: the `Notified` future is created
    /// before re-checking `pump_exited`, not after, so a pump that sets
    /// `pump_exited` and fires `notify_waiters()` between our load and our
    /// await can't strand us here forever.
    async fn wait_for_pump_exit(&self) {
        if self.pump_exited.load(Ordering::SeqCst) {
            return;
        }
        let notified = self.cleanup.notified();
        if self.pump_exited.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    async fn close_queues(&self, reason: ErrorCode) {
        *self.error.lock().await = reason;
        self.conn_binding.close().await;
        self.incoming.close().await;
        self.outgoing.close().await;
        if let Some(conn) = self.current_conn.lock().await.take() {
            conn.unlink(self.id).await;
        }
    }
}

/// The channel pump: awaits an initial binding, then loops forwarding
/// `outgoing` frames to the currently bound connection, rebinding on
/// write failure. See spec.md §4.4. Implemented with `tokio::select!`
/// rather than the source's non-blocking poll-and-yield loop: both
/// express "react to whichever of {rebind, next outgoing frame} happens
/// first", but `select!` does so without burning a scheduler tick per
/// iteration when the channel is idle.
async fn run_pump(channel: Arc<Channel>) {
    let Some(mut current_conn) = channel.conn_binding.recv().await else {
        finish_pump(&channel);
        return;
    };

    'outer: loop {
        let frame = tokio::select! {
            biased;
            rebind = channel.conn_binding.recv() => {
                match rebind {
                    Some(conn) => {
                        current_conn = conn;
                        continue 'outer;
                    }
                    None => break 'outer,
                }
            }
            out = channel.outgoing.recv() => {
                match out {
                    Some(frame) => frame,
                    None => break 'outer,
                }
            }
        };

        let pending = frame;
        loop {
            match current_conn.write_frame(pending.clone()).await {
                Ok(WriteOutcome::Ok) => {
                    if pending.is_protocol_error() {
                        close_from_pump(&channel, ErrorCode::ChanFrame).await;
                    } else if pending.last && channel.server {
                        close_from_pump(&channel, ErrorCode::None).await;
                    }
                    break;
                }
                Ok(WriteOutcome::ShortWrite) | Ok(WriteOutcome::Failed) | Err(_) => {
                    match channel.conn_binding.recv().await {
                        Some(new_conn) => {
                            current_conn = new_conn;
                            continue;
                        }
                        None => break 'outer,
                    }
                }
            }
        }

        if channel.closed.load(Ordering::SeqCst) {
            break 'outer;
        }
        tokio::task::yield_now().await;
    }

    if !channel.closed.swap(true, Ordering::SeqCst) {
        channel.close_queues(ErrorCode::None).await;
    }
    finish_pump(&channel);
}

async fn close_from_pump(channel: &Arc<Channel>, reason: ErrorCode) {
    if !channel.closed.swap(true, Ordering::SeqCst) {
        channel.close_queues(reason).await;
    }
}

fn finish_pump(channel: &Arc<Channel>) {
    channel.pump_exited.store(true, Ordering::SeqCst);
    channel.cleanup.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_frame_on_closed_channel_errors() {
        let config = DpxConfig::default();
        let channel = Channel::new_client(1, "m".into(), &config);
        channel.close(ErrorCode::None).await;
        let err = channel.send_frame(Frame::data()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ChanClosed);
    }

    #[tokio::test]
    async fn receive_frame_after_close_is_none() {
        let config = DpxConfig::default();
        let channel = Channel::new_client(1, "m".into(), &config);
        channel.close(ErrorCode::None).await;
        assert!(channel.receive_frame().await.is_none());
    }

    #[tokio::test]
    async fn server_side_receive_returns_none_once_last_seen() {
        let config = DpxConfig::default();
        let channel = Channel::new(2, true, Some("m".into()), &config);
        channel
            .incoming
            .send(Frame::data().with_last(true))
            .await
            .unwrap();
        let frame = channel.receive_frame().await.unwrap();
        assert!(frame.last);
        assert!(channel.receive_frame().await.is_none());
    }

    #[tokio::test]
    async fn method_get_and_set() {
        let config = DpxConfig::default();
        let channel = Channel::new_client(1, "old".into(), &config);
        let old = channel.set_method("new").await;
        assert_eq!(old, Some("old".to_string()));
        assert_eq!(channel.method().await, Some("new".to_string()));
    }
}
