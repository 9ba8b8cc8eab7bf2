//! Protocol buffer definitions for the Graymill video relay.
//!
//! Generated from `proto/graymill/v1/video_filter.proto`. The wire contract
//! is a single duplex call, `VideoFilter.ProcessVideo`, carrying ordered
//! `VideoChunk` messages in both directions.

// Include the generated protobuf code
tonic::include_proto!("graymill.v1");

impl VideoChunk {
    /// Wrap a slice of payload bytes as one outbound chunk.
    pub fn new(chunk_data: impl Into<Vec<u8>>) -> Self {
        Self {
            chunk_data: chunk_data.into(),
        }
    }

    /// Number of payload bytes carried by this chunk.
    pub fn len(&self) -> usize {
        self.chunk_data.len()
    }

    /// Whether the chunk carries no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.chunk_data.is_empty()
    }
}
