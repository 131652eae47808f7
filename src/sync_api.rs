// ABOUTME: Thin synchronous wrappers over the async core, for callers on foreign
// ABOUTME: (non-async) threads; each entry point packages its arguments and calls Bridge::join

use std::net::SocketAddr;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::channel::Channel;
use crate::config::DpxConfig;
use crate::error::ErrorCode;
use crate::frame::Frame;
use crate::peer::Peer;

/// A peer plus the bridge that lets synchronous callers drive it.
pub struct SyncPeer {
    peer: Arc<Peer>,
    bridge: Arc<Bridge>,
}

/// A channel plus the bridge used to reach it synchronously.
pub struct SyncChannel {
    channel: Arc<Channel>,
    bridge: Arc<Bridge>,
}

/// `peer_new()` — create a peer with its own dedicated runtime.
pub fn peer_new() -> std::io::Result<SyncPeer> {
    let bridge = Arc::new(Bridge::new()?);
    let peer = bridge.join(async { Peer::with_config(DpxConfig::default()) });
    Ok(SyncPeer { peer, bridge })
}

/// `peer_free(p)` — Rust's ownership model disposes the peer's resources
/// when the last `Arc` reference is dropped; this exists only so callers
/// translating the spec's literal API one-to-one have a symbol to call.
pub fn peer_free(_peer: SyncPeer) {}

/// `peer_close(p)`.
pub fn peer_close(peer: &SyncPeer) -> ErrorCode {
    let p = peer.peer.clone();
    peer.bridge.join(async move { p.close().await })
}

/// `peer_bind(p, addr, port)`.
pub fn peer_bind(peer: &SyncPeer, addr: &str, port: u16) -> std::io::Result<SocketAddr> {
    let p = peer.peer.clone();
    let addr = addr.to_string();
    peer.bridge.join(async move { p.bind(&addr, port).await })
}

/// `peer_connect(p, addr, port)`.
pub fn peer_connect(peer: &SyncPeer, addr: &str, port: u16) -> bool {
    let p = peer.peer.clone();
    let addr = addr.to_string();
    peer.bridge.join(async move { p.connect(addr, port).await })
}

/// `peer_open(p, method) -> channel`.
pub fn peer_open(peer: &SyncPeer, method: &str) -> Option<SyncChannel> {
    let p = peer.peer.clone();
    let method = method.to_string();
    let channel = peer.bridge.join(async move { p.open(method).await })?;
    Some(SyncChannel {
        channel,
        bridge: peer.bridge.clone(),
    })
}

/// `peer_accept(p) -> channel|null`.
pub fn peer_accept(peer: &SyncPeer) -> Option<SyncChannel> {
    let p = peer.peer.clone();
    let channel = peer.bridge.join(async move { p.accept().await })?;
    Some(SyncChannel {
        channel,
        bridge: peer.bridge.clone(),
    })
}

/// `channel_free(c)`. See `peer_free` for why this is a no-op.
pub fn channel_free(_channel: SyncChannel) {}

/// `channel_close(c, reason)`.
pub fn channel_close(channel: &SyncChannel, reason: ErrorCode) {
    let c = channel.channel.clone();
    channel.bridge.join(async move { c.close(reason).await })
}

/// `channel_error(c) -> error_code`.
pub fn channel_error(channel: &SyncChannel) -> ErrorCode {
    let c = channel.channel.clone();
    channel.bridge.join(async move { c.error().await })
}

/// `channel_send_frame(c, frame) -> error_code`.
pub fn channel_send_frame(channel: &SyncChannel, frame: Frame) -> ErrorCode {
    let c = channel.channel.clone();
    match channel.bridge.join(async move { c.send_frame(frame).await }) {
        Ok(()) => ErrorCode::None,
        Err(err) => err.code(),
    }
}

/// `channel_receive_frame(c) -> frame|null`.
pub fn channel_receive_frame(channel: &SyncChannel) -> Option<Frame> {
    let c = channel.channel.clone();
    channel.bridge.join(async move { c.receive_frame().await })
}

/// `channel_method_get(c)`.
pub fn channel_method_get(channel: &SyncChannel) -> Option<String> {
    let c = channel.channel.clone();
    channel.bridge.join(async move { c.method().await })
}

/// `channel_method_set(c, m) -> old`.
pub fn channel_method_set(channel: &SyncChannel, method: &str) -> Option<String> {
    let c = channel.channel.clone();
    let method = method.to_string();
    channel
        .bridge
        .join(async move { c.set_method(method).await })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_new_close_and_double_close() {
        let peer = peer_new().unwrap();
        assert_eq!(peer_close(&peer), ErrorCode::None);
        assert_eq!(peer_close(&peer), ErrorCode::PeerAlreadyClosed);
    }

    #[test]
    fn open_after_close_is_none() {
        let peer = peer_new().unwrap();
        peer_close(&peer);
        assert!(peer_open(&peer, "m").is_none());
    }
}
