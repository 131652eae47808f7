// ABOUTME: The in-memory Frame type shared by every layer above the codec
// ABOUTME: plus the FrameType discriminant and the peer-local "no channel yet" sentinel

use std::collections::HashMap;

/// Sentinel channel id used on an OPEN frame before it has been bound to
/// a freshly allocated channel id.
pub const NO_CHANNEL: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Open,
    Data,
}

impl FrameType {
    pub(crate) fn as_i64(self) -> i64 {
        match self {
            FrameType::Open => 0,
            FrameType::Data => 1,
        }
    }

    pub(crate) fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(FrameType::Open),
            1 => Some(FrameType::Data),
            _ => None,
        }
    }
}

/// The atomic message unit exchanged on the wire. See `spec.md` §3/§4.1.
///
/// `method` and `error` are independently nullable: `None` is distinct
/// from `Some(String::new())`. `headers` is never absent on the wire; an
/// empty map round-trips as an empty map, never `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub channel: i64,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub error: Option<String>,
    pub last: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            channel: NO_CHANNEL,
            method: None,
            headers: HashMap::new(),
            error: None,
            last: false,
            payload: Vec::new(),
        }
    }

    pub fn open(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::new(FrameType::Open)
        }
    }

    pub fn data() -> Self {
        Self::new(FrameType::Data)
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn header_add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn header_find(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn header_remove(&mut self, key: &str) -> Option<String> {
        self.headers.remove(key)
    }

    pub fn header_len(&self) -> usize {
        self.headers.len()
    }

    pub fn header_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if this frame carries a protocol-level error that is not also
    /// the terminal `last` frame of a direction. `DuplexConn`'s reader and
    /// `Channel::handle_incoming` both use this to decide whether to close
    /// the target channel with `CHAN_FRAME`.
    pub fn is_protocol_error(&self) -> bool {
        !self.last && self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}
