//! Adapter over one bidirectional `ProcessVideo` call.
//!
//! The adapter splits into a send half and a receive half so the relay's
//! feeder and drainer can make progress concurrently. Both halves share one
//! state cell; once either direction observes a fault the stream is
//! `Errored` and no further chunks are accepted or emitted.
//!
//! The inbound side starts as a *pending* call future rather than a live
//! stream: a remote that buffers its whole input (as the filter service
//! does) will not send response headers until the request stream has been
//! fed, so the call must be resolved concurrently with feeding. Awaiting it
//! up front would deadlock against the send-side backpressure.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

use crate::error::RelayError;

/// Live inbound chunk stream of the duplex call.
pub type InboundChunks = Pin<Box<dyn Stream<Item = Result<Bytes, Status>> + Send>>;

/// In-flight call resolving to the inbound stream once response headers
/// arrive.
pub type PendingInbound =
    Pin<Box<dyn Future<Output = Result<InboundChunks, Status>> + Send>>;

/// Combined state of the duplex call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    /// Both directions live.
    Open = 0,
    /// Local side signaled completion; remote still producing.
    HalfClosed = 1,
    /// Both directions ended cleanly.
    Closed = 2,
    /// Either direction faulted. Terminal.
    Errored = 3,
}

/// Shared state cell. `Errored` is sticky.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(StreamState::Open as u8))
    }

    fn get(&self) -> StreamState {
        match self.0.load(Ordering::Acquire) {
            0 => StreamState::Open,
            1 => StreamState::HalfClosed,
            2 => StreamState::Closed,
            _ => StreamState::Errored,
        }
    }

    fn transition(&self, next: StreamState) {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == StreamState::Errored as u8 {
                return;
            }
            match self.0.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// One open duplex call, ready to be split between feeder and drainer.
pub struct DuplexStream {
    send: SendHalf,
    recv: RecvHalf,
}

impl DuplexStream {
    /// Pair an outbound chunk channel with the call that will consume it.
    ///
    /// `tx` is the sender of the channel backing the call's request stream;
    /// its capacity bounds the in-flight chunk count. `opening` resolves to
    /// the call's response stream.
    pub fn new(tx: mpsc::Sender<Bytes>, opening: PendingInbound) -> Self {
        let shared = Arc::new(StateCell::new());
        Self {
            send: SendHalf {
                tx: Some(tx),
                shared: Arc::clone(&shared),
            },
            recv: RecvHalf {
                inbound: Inbound::Opening(opening),
                shared,
            },
        }
    }

    /// Split into independently-owned halves.
    pub fn split(self) -> (SendHalf, RecvHalf) {
        (self.send, self.recv)
    }
}

/// Send side of the duplex call.
pub struct SendHalf {
    tx: Option<mpsc::Sender<Bytes>>,
    shared: Arc<StateCell>,
}

impl SendHalf {
    /// Forward one chunk as one outbound message.
    ///
    /// Suspends until the call accepts the chunk. Sends after half-close or
    /// after a fault are rejected; a closed request stream marks the duplex
    /// `Errored`.
    pub async fn send(&mut self, chunk: Bytes) -> Result<(), RelayError> {
        if self.shared.get() == StreamState::Errored {
            return Err(RelayError::Send("duplex stream already failed".into()));
        }
        let Some(tx) = &self.tx else {
            return Err(RelayError::Send("send after half-close".into()));
        };
        tx.send(chunk).await.map_err(|_| {
            self.shared.transition(StreamState::Errored);
            RelayError::Send("filter service closed the request stream".into())
        })
    }

    /// Signal that no more chunks will be sent, while the response stream
    /// stays live. Idempotent.
    pub fn half_close(&mut self) {
        if self.tx.take().is_some() {
            self.shared.transition(StreamState::HalfClosed);
        }
    }

    /// Current combined stream state.
    pub fn state(&self) -> StreamState {
        self.shared.get()
    }
}

enum Inbound {
    Opening(PendingInbound),
    Streaming(InboundChunks),
}

/// Receive side of the duplex call.
pub struct RecvHalf {
    inbound: Inbound,
    shared: Arc<StateCell>,
}

impl RecvHalf {
    /// Next response chunk, `None` at remote end-of-stream.
    ///
    /// The first call resolves the in-flight RPC; a rejection at open
    /// surfaces here the same way a mid-stream transport fault does. After a
    /// fault the stream is `Errored` and yields nothing further.
    pub async fn recv(&mut self) -> Result<Option<Bytes>, RelayError> {
        loop {
            if self.shared.get() == StreamState::Errored {
                return Err(RelayError::Receive(Status::aborted(
                    "duplex stream already failed",
                )));
            }
            match &mut self.inbound {
                Inbound::Opening(call) => match call.as_mut().await {
                    Ok(stream) => self.inbound = Inbound::Streaming(stream),
                    Err(status) => {
                        self.shared.transition(StreamState::Errored);
                        return Err(RelayError::Receive(status));
                    }
                },
                Inbound::Streaming(stream) => {
                    return match stream.next().await {
                        Some(Ok(chunk)) => Ok(Some(chunk)),
                        Some(Err(status)) => {
                            self.shared.transition(StreamState::Errored);
                            Err(RelayError::Receive(status))
                        }
                        None => {
                            self.shared.transition(StreamState::Closed);
                            Ok(None)
                        }
                    };
                }
            }
        }
    }

    /// Current combined stream state.
    pub fn state(&self) -> StreamState {
        self.shared.get()
    }
}
