//! Client for the remote video filter service.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::info;

use graymill_core::{DuplexStream, InboundChunks, PendingInbound};
use graymill_proto::video_filter_client::VideoFilterClient;
use graymill_proto::VideoChunk;

use crate::config::RemoteConfig;

/// Outbound chunks buffered in the call at once. The feeder's own await
/// already serializes sends; this just keeps the channel bounded.
const SEND_BUFFER: usize = 1;

/// Handle to the filter service, constructed once at startup and shared
/// across requests. Cloning the underlying channel is cheap; connection
/// lifecycle belongs to the channel, not to any single relay.
#[derive(Clone)]
pub struct FilterClient {
    inner: VideoFilterClient<Channel>,
}

impl FilterClient {
    /// Build a lazily-connecting client from configuration. No traffic
    /// flows until the first relay opens a call.
    pub fn new(config: &RemoteConfig) -> Result<Self, tonic::transport::Error> {
        let mut endpoint = Endpoint::from_shared(config.endpoint.clone())?;
        if config.tls {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }
        info!(endpoint = %config.endpoint, tls = config.tls, "filter client configured");
        Ok(Self {
            inner: VideoFilterClient::new(endpoint.connect_lazy()),
        })
    }

    /// Open exactly one `ProcessVideo` call and wrap it as a duplex adapter.
    ///
    /// The call itself is left pending inside the adapter's receive half: a
    /// filter that buffers its whole input sends no response headers until
    /// the request stream ends, so the call must resolve concurrently with
    /// feeding rather than before it.
    pub fn open_duplex(&self) -> DuplexStream {
        let (tx, rx) = mpsc::channel::<Bytes>(SEND_BUFFER);
        let outbound =
            ReceiverStream::new(rx).map(|chunk| VideoChunk::new(chunk.to_vec()));

        let mut client = self.inner.clone();
        let opening: PendingInbound = Box::pin(async move {
            let response = client.process_video(outbound).await?;
            let inbound: InboundChunks = Box::pin(
                response
                    .into_inner()
                    .map(|msg| msg.map(|chunk| Bytes::from(chunk.chunk_data))),
            );
            Ok(inbound)
        });

        DuplexStream::new(tx, opening)
    }
}
