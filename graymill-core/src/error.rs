//! Error types surfaced by the streaming relay.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Pipeline stage a relay failure originated from.
///
/// Used by the HTTP layer to log where a request died without parsing
/// error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the uploaded bytes from local storage.
    Source,
    /// Writing a chunk to the duplex call's request stream.
    Send,
    /// Opening the duplex call or reading its response stream.
    Receive,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Send => "send",
            Self::Receive => "receive",
        };
        f.write_str(name)
    }
}

/// A failure that terminated a relay attempt.
///
/// One relay maps to one `ProcessVideo` call; none of these are retried.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Local I/O fault reading the upload. Distinct from a clean
    /// end-of-sequence, so a truncated source is never mistaken for success.
    #[error("failed to read upload: {0}")]
    SourceRead(#[from] std::io::Error),

    /// Failure writing a chunk to the duplex call, including sends attempted
    /// after half-close or after the stream errored.
    #[error("failed to send chunk to filter service: {0}")]
    Send(String),

    /// Transport fault or remote-signaled error on the duplex call.
    #[error("filter service stream failed: {0}")]
    Receive(#[source] tonic::Status),

    /// The configured relay deadline elapsed before the remote completed.
    #[error("relay timed out after {0:?}")]
    Timeout(Duration),
}

impl RelayError {
    /// Stage the failure originated from.
    ///
    /// A timeout reports [`Stage::Receive`]: the observable symptom is the
    /// remote never completing its response stream.
    pub fn stage(&self) -> Stage {
        match self {
            Self::SourceRead(_) => Stage::Source,
            Self::Send(_) => Stage::Send,
            Self::Receive(_) | Self::Timeout(_) => Stage::Receive,
        }
    }
}

/// Result of one relay invocation: the full accumulated response bytes, or
/// the first failure observed by either direction.
pub type RelayOutcome = Result<Bytes, RelayError>;
