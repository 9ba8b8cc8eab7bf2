//! The relay controller: pump upload chunks into the duplex call while
//! draining the filtered response, and resolve exactly one outcome.

use std::sync::Mutex;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chunk::ChunkSource;
use crate::duplex::{DuplexStream, RecvHalf, SendHalf};
use crate::error::{RelayError, RelayOutcome};

/// Relay one upload through one duplex call.
///
/// Two concurrent activities share a cancellation token: the *feeder* reads
/// the source and writes the send half, half-closing at end-of-sequence; the
/// *drainer* appends response chunks to the accumulator in arrival order.
/// The first failure on either side records itself and cancels the other,
/// which stops at its next suspension point. Both activities are always
/// joined before the outcome is resolved, so a send-side fault discovered
/// after a clean receive-side end still surfaces as a failure.
///
/// Backpressure: the feeder does not read the next chunk until the send half
/// has accepted the previous one, so the upload is never buffered ahead of
/// the network. The response accumulator is unbounded; the remote's own flow
/// control governs its emission rate.
///
/// Dropping the duplex halves on return closes the in-flight call, so no
/// call is left dangling on any exit path, including timeout expiry.
pub async fn relay<R>(
    source: ChunkSource<R>,
    duplex: DuplexStream,
    timeout: Option<Duration>,
) -> RelayOutcome
where
    R: AsyncRead + Unpin,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, run(source, duplex)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RelayError::Timeout(limit)),
        },
        None => run(source, duplex).await,
    }
}

async fn run<R>(mut source: ChunkSource<R>, duplex: DuplexStream) -> RelayOutcome
where
    R: AsyncRead + Unpin,
{
    let (mut send, mut recv) = duplex.split();
    let cancel = CancellationToken::new();
    let first_error: Mutex<Option<RelayError>> = Mutex::new(None);

    let record = |err: RelayError| {
        if let Ok(mut slot) = first_error.lock() {
            slot.get_or_insert(err);
        }
        cancel.cancel();
    };

    let feeder = async {
        if let Err(err) = feed(&mut source, &mut send, &cancel).await {
            record(err);
        }
    };

    let drainer = async {
        match drain(&mut recv, &cancel).await {
            Ok(accumulated) => accumulated,
            Err(err) => {
                record(err);
                BytesMut::new()
            }
        }
    };

    let ((), accumulated) = tokio::join!(feeder, drainer);

    match first_error.into_inner() {
        Ok(Some(err)) => Err(err),
        _ => Ok(accumulated.freeze()),
    }
}

/// Read chunks and forward them in order, half-closing at end-of-sequence.
async fn feed<R>(
    source: &mut ChunkSource<R>,
    send: &mut SendHalf,
    cancel: &CancellationToken,
) -> Result<(), RelayError>
where
    R: AsyncRead + Unpin,
{
    let mut sent = 0u64;
    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            read = source.next_chunk() => match read? {
                Some(chunk) => chunk,
                None => {
                    send.half_close();
                    debug!(chunks = sent, "upload fully sent, request stream half-closed");
                    return Ok(());
                }
            },
        };
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            accepted = send.send(chunk) => accepted?,
        }
        sent += 1;
    }
}

/// Append response chunks in arrival order until end-of-stream.
async fn drain(
    recv: &mut RecvHalf,
    cancel: &CancellationToken,
) -> Result<BytesMut, RelayError> {
    let mut accumulated = BytesMut::new();
    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(accumulated),
            next = recv.recv() => match next? {
                Some(chunk) => accumulated.extend_from_slice(&chunk),
                None => {
                    debug!(bytes = accumulated.len(), "response stream complete");
                    return Ok(accumulated);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplex::{InboundChunks, PendingInbound};
    use bytes::Bytes;
    use std::io::Cursor;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;
    use tonic::Status;

    fn chunked(data: &[u8], chunk_size: usize) -> ChunkSource<Cursor<Vec<u8>>> {
        ChunkSource::new(Cursor::new(data.to_vec()), chunk_size)
    }

    /// Duplex wired to an in-process echo: every request chunk comes back
    /// verbatim, end-of-stream follows the half-close. Returns the task
    /// handle so tests can assert the call was torn down.
    fn echo_duplex() -> (DuplexStream, tokio::task::JoinHandle<usize>) {
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(1);
        let (in_tx, in_rx) = mpsc::channel(8);
        let remote = tokio::spawn(async move {
            let mut echoed = 0;
            while let Some(chunk) = out_rx.recv().await {
                if in_tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
                echoed += 1;
            }
            echoed
        });
        let inbound: InboundChunks = Box::pin(ReceiverStream::new(in_rx));
        let opening: PendingInbound = Box::pin(async move { Ok(inbound) });
        (DuplexStream::new(out_tx, opening), remote)
    }

    #[tokio::test]
    async fn echo_round_trip_reproduces_input_bytes() {
        let data: Vec<u8> = (0..5000).map(|i| (i % 241) as u8).collect();
        let (duplex, remote) = echo_duplex();

        let out = relay(chunked(&data, 512), duplex, None).await.unwrap();
        assert_eq!(&out[..], &data[..]);

        // ceil(5000/512) chunks echoed, call torn down cleanly
        assert_eq!(remote.await.unwrap(), 10);
    }

    #[tokio::test]
    async fn empty_upload_yields_empty_success() {
        let (duplex, remote) = echo_duplex();
        let out = relay(chunked(&[], 64), duplex, None).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(remote.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn response_bytes_keep_arrival_order() {
        // remote emits fixed chunks in a known order, ignoring input
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(1);
        let (in_tx, in_rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while out_rx.recv().await.is_some() {}
            for part in [&b"first-"[..], b"second-", b"third"] {
                if in_tx.send(Ok(Bytes::from_static(part))).await.is_err() {
                    return;
                }
            }
        });
        let inbound: InboundChunks = Box::pin(ReceiverStream::new(in_rx));
        let opening: PendingInbound = Box::pin(async move { Ok(inbound) });
        let duplex = DuplexStream::new(out_tx, opening);

        let out = relay(chunked(b"xy", 1), duplex, None).await.unwrap();
        assert_eq!(&out[..], b"first-second-third");
    }

    /// Reader failing after `good` bytes.
    struct FailingReader {
        good: Vec<u8>,
        offset: usize,
    }

    impl tokio::io::AsyncRead for FailingReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.offset < self.good.len() {
                let n = buf.remaining().min(self.good.len() - self.offset);
                let start = self.offset;
                buf.put_slice(&self.good[start..start + n]);
                self.offset += n;
                std::task::Poll::Ready(Ok(()))
            } else {
                std::task::Poll::Ready(Err(std::io::Error::other("disk fault")))
            }
        }
    }

    #[tokio::test]
    async fn source_fault_after_k_chunks_fails_and_closes_the_call() {
        let reader = FailingReader {
            good: vec![9u8; 192],
            offset: 0,
        };
        let source = ChunkSource::new(reader, 64);
        let (duplex, remote) = echo_duplex();

        let err = relay(source, duplex, None).await.unwrap_err();
        assert!(matches!(err, RelayError::SourceRead(_)));

        // relay returned, duplex halves dropped, remote task has ended
        let echoed = remote.await.unwrap();
        assert!(echoed <= 3);
    }

    #[tokio::test]
    async fn remote_error_before_any_chunk_is_a_receive_failure() {
        let (out_tx, _out_rx) = mpsc::channel::<Bytes>(1);
        let (in_tx, in_rx) = mpsc::channel::<Result<Bytes, Status>>(1);
        in_tx
            .try_send(Err(Status::internal("filter exploded")))
            .unwrap();
        let inbound: InboundChunks = Box::pin(ReceiverStream::new(in_rx));
        let opening: PendingInbound = Box::pin(async move { Ok(inbound) });
        let duplex = DuplexStream::new(out_tx, opening);

        let err = relay(chunked(&[0u8; 4096], 64), duplex, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Receive(_)));
        assert_eq!(err.stage(), crate::error::Stage::Receive);
    }

    #[tokio::test]
    async fn call_rejected_at_open_is_a_receive_failure() {
        let (out_tx, _out_rx) = mpsc::channel::<Bytes>(1);
        let opening: PendingInbound =
            Box::pin(async { Err(Status::unavailable("no route to filter")) });
        let duplex = DuplexStream::new(out_tx, opening);

        let err = relay(chunked(b"abc", 1), duplex, None).await.unwrap_err();
        assert!(matches!(err, RelayError::Receive(_)));
    }

    #[tokio::test]
    async fn stalled_remote_trips_the_timeout() {
        // remote consumes input but never responds and never ends
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(1);
        let (in_tx, in_rx) = mpsc::channel::<Result<Bytes, Status>>(1);
        tokio::spawn(async move {
            while out_rx.recv().await.is_some() {}
            // hold the sender open forever
            std::future::pending::<()>().await;
            drop(in_tx);
        });
        let inbound: InboundChunks = Box::pin(ReceiverStream::new(in_rx));
        let opening: PendingInbound = Box::pin(async move { Ok(inbound) });
        let duplex = DuplexStream::new(out_tx, opening);

        let err = relay(
            chunked(b"abcdef", 2),
            duplex,
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RelayError::Timeout(_)));
    }

    #[tokio::test]
    async fn send_fault_after_receive_end_still_fails() {
        // remote ends its response stream immediately but keeps reading,
        // then drops the request stream mid-upload
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(1);
        let (in_tx, in_rx) = mpsc::channel::<Result<Bytes, Status>>(1);
        drop(in_tx); // immediate clean end-of-stream
        tokio::spawn(async move {
            // accept one chunk, then kill the request direction
            let _ = out_rx.recv().await;
        });
        let inbound: InboundChunks = Box::pin(ReceiverStream::new(in_rx));
        let opening: PendingInbound = Box::pin(async move { Ok(inbound) });
        let duplex = DuplexStream::new(out_tx, opening);

        let err = relay(chunked(&[1u8; 4096], 64), duplex, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Send(_)));
    }
}
