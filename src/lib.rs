//! dpx: a symmetric peer-to-peer duplex messaging transport over TCP.
//!
//! Each [`peer::Peer`] can act as client and server simultaneously: it may
//! bind any number of listener ports and dial any number of remote
//! endpoints, pooling every resulting TCP connection behind one identity.
//! Independent [`channel::Channel`]s are multiplexed over that pool, each
//! carrying an ordered bidirectional stream of [`frame::Frame`]s. Outgoing
//! channel opens are load-balanced round-robin across the connection pool.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use dpx::peer::Peer;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Peer::new();
//!     server.bind("127.0.0.1", 9876).await?;
//!
//!     let client = Peer::new();
//!     client.connect("127.0.0.1", 9876).await;
//!
//!     let channel = client.open("echo").await.expect("peer not closed");
//!     channel
//!         .send_frame(dpx::frame::Frame::data().with_payload(b"hi".to_vec()).with_last(true))
//!         .await
//!         .unwrap();
//!
//!     let accepted = server.accept().await.expect("peer not closed");
//!     let request = accepted.receive_frame().await.expect("frame arrives");
//!     assert_eq!(request.payload, b"hi");
//!     Ok(())
//! }
//! ```
//!
//! For callers on foreign (non-async) threads, see [`sync_api`].

pub mod bridge;
pub mod channel;
pub mod codec;
pub mod config;
pub mod duplex;
pub mod error;
pub mod frame;
pub mod peer;
pub mod queue;
pub mod sync_api;

pub use channel::Channel;
pub use codec::CodecError;
pub use config::DpxConfig;
pub use duplex::DuplexConn;
pub use error::{DpxError, ErrorCode};
pub use frame::{Frame, FrameType};
pub use peer::Peer;

/// A specialized `Result` type for dpx operations.
pub type Result<T> = std::result::Result<T, DpxError>;
