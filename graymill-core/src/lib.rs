//! Streaming relay core for Graymill.
//!
//! Bridges three concurrently-progressing data flows for one HTTP request:
//! an inbound chunked byte source (the uploaded file), an outbound duplex
//! gRPC stream (the remote filter service), and an accumulated response
//! payload handed back to the HTTP layer.
//!
//! ```text
//! UploadArtifact → ChunkSource → feeder ─┐
//!                                        ├─ DuplexStream (one ProcessVideo call)
//!          accumulator ← drainer ←───────┘
//! ```
//!
//! The [`relay`] controller drives the feeder and drainer concurrently,
//! resolves their completion or first failure into one [`RelayOutcome`],
//! and guarantees the in-flight call is closed on every exit path.

pub mod artifact;
pub mod chunk;
pub mod duplex;
pub mod error;
pub mod relay;

pub use artifact::UploadArtifact;
pub use chunk::{ChunkSource, DEFAULT_CHUNK_SIZE};
pub use duplex::{DuplexStream, InboundChunks, PendingInbound, RecvHalf, SendHalf, StreamState};
pub use error::{RelayError, RelayOutcome, Stage};
pub use relay::relay;
