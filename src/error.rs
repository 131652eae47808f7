// ABOUTME: Error taxonomy for dpx, including the stable numeric ErrorCode ABI from the spec
// ABOUTME: and the richer thiserror-based DpxError used internally for diagnostics

use thiserror::Error;

/// Stable numeric error codes. These values are part of the wire-adjacent
/// ABI: a future FFI surface over this crate must see the same
/// discriminants a caller of the original C library would have seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    None = 0,
    Freeing = 1,
    ChanClosed = 10,
    ChanFrame = 11,
    NetworkFail = 20,
    NetworkNotAll = 21,
    PeerAlreadyClosed = 30,
    DuplexClosed = 40,
    Fatal = -50,
}

impl ErrorCode {
    pub fn is_ok(self) -> bool {
        matches!(self, ErrorCode::None)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::None => "none",
            ErrorCode::Freeing => "freeing",
            ErrorCode::ChanClosed => "channel closed",
            ErrorCode::ChanFrame => "channel closed by protocol error",
            ErrorCode::NetworkFail => "network failure",
            ErrorCode::NetworkNotAll => "short write",
            ErrorCode::PeerAlreadyClosed => "peer already closed",
            ErrorCode::DuplexClosed => "duplex connection closed",
            ErrorCode::Fatal => "fatal error",
        };
        f.write_str(name)
    }
}

/// Internal, diagnostic-rich error type. Operations that ultimately surface
/// through the public API are mapped down to an [`ErrorCode`] at the
/// boundary; internally we keep the richer variant around for logging.
#[derive(Debug, Error)]
pub enum DpxError {
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("queue closed")]
    QueueClosed,

    #[error("queue full")]
    QueueFull,

    #[error("queue empty")]
    QueueEmpty,

    #[error("channel closed: {0}")]
    ChannelClosed(ErrorCode),

    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("short write: wrote {written} of {total} bytes")]
    ShortWrite { written: usize, total: usize },

    #[error("duplex connection closed")]
    DuplexClosed,

    #[error("peer already closed")]
    PeerAlreadyClosed,
}

impl DpxError {
    /// Collapse the diagnostic error down to the stable numeric code.
    pub fn code(&self) -> ErrorCode {
        match self {
            DpxError::Codec(_) => ErrorCode::Fatal,
            DpxError::QueueClosed => ErrorCode::ChanClosed,
            DpxError::QueueFull | DpxError::QueueEmpty => ErrorCode::Fatal,
            DpxError::ChannelClosed(code) => *code,
            DpxError::Network(_) => ErrorCode::NetworkFail,
            DpxError::ShortWrite { .. } => ErrorCode::NetworkNotAll,
            DpxError::DuplexClosed => ErrorCode::DuplexClosed,
            DpxError::PeerAlreadyClosed => ErrorCode::PeerAlreadyClosed,
        }
    }
}
