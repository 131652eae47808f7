// ABOUTME: Compile-time tunables from the spec, made overridable for tests
// ABOUTME: via a small builder in the style of the client-side configuration structs this crate replaced

use std::time::Duration;

/// Depth of every channel-facing bounded queue (`incoming`, `outgoing`,
/// a `DuplexConn`'s outbound queue, and the peer's `open_frames` /
/// `incoming_channels` queues).
pub const CHANNEL_QUEUE_DEPTH: usize = 1024;

/// Chunk size used for each individual socket read.
pub const SOCKET_READ_CHUNK: usize = 8192;

/// Size of the streaming decoder's working buffer.
pub const DECODER_BUFFER_SIZE: usize = 65536;

/// Number of dial attempts `Peer::connect` makes before giving up.
pub const RETRY_ATTEMPTS: u32 = 20;

/// Delay between successive dial attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Runtime-overridable view of the tunables above, so tests can shrink
/// queue depths and retry intervals without waiting on production-sized
/// timers. Mirrors the builder pattern the teacher crate used for
/// `KeepAliveConfig`.
#[derive(Debug, Clone)]
pub struct DpxConfig {
    pub channel_queue_depth: usize,
    pub socket_read_chunk: usize,
    pub decoder_buffer_size: usize,
    pub retry_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for DpxConfig {
    fn default() -> Self {
        Self {
            channel_queue_depth: CHANNEL_QUEUE_DEPTH,
            socket_read_chunk: SOCKET_READ_CHUNK,
            decoder_buffer_size: DECODER_BUFFER_SIZE,
            retry_attempts: RETRY_ATTEMPTS,
            retry_interval: RETRY_INTERVAL,
        }
    }
}

impl DpxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_queue_depth(mut self, depth: usize) -> Self {
        self.channel_queue_depth = depth;
        self
    }

    pub fn with_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_interval = interval;
        self
    }
}
