//! Graymill server: HTTP upload surface in front of the streaming relay.
//!
//! One `POST /process-video` endpoint decodes a multipart video upload to a
//! temp file, relays it through the remote filter's `ProcessVideo` duplex
//! call, and returns the filtered bytes as a single attachment download.

pub mod api;
pub mod client;
pub mod config;

pub use api::{create_router, ApiState, RelaySettings};
pub use client::FilterClient;
pub use config::ServerConfig;
