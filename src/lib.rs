//! # charai - Character chat client
//!
//! An async client for a character chat service: authenticated JSON
//! request/response calls plus a streaming reply channel whose body is a
//! sequence of newline-delimited JSON records.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Explicit [`Session`] value instead of process-wide client state
//! - Incremental record decoding that is independent of chunk boundaries
//! - Pluggable [`Transport`] with a reqwest implementation
//!
//! ## Architecture
//!
//! - **[`transport`]**: sends a request, hands back status plus a lazy body of byte chunks
//! - **[`decoder`]**: pure, synchronous newline-delimited JSON decoder
//! - **[`stream`]**: drives the decoder over a chunk stream
//! - **[`client`]**: the request facade (`get_json`, `post_json`, `post_streaming`)
//! - **[`api`]**: chat endpoints built on the facade
//!
//! ## Example
//! ```no_run
//! use charai::client::Client;
//! use charai::options::{HttpTransport, TransportOptions};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(TransportOptions::new(HttpTransport::default()))?;
//!     client.authenticate("identity-provider-token").await?;
//!
//!     let chat = client.continue_last_or_create_chat("character-id", false).await?;
//!     let replies = chat.send_message(&client, "Hello!").await?;
//!     futures::pin_mut!(replies);
//!
//!     while let Some(reply) = replies.next().await {
//!         let reply = reply?;
//!         if reply.is_final {
//!             println!("{}: {}", reply.character_name, reply.text);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod decoder;
pub mod http;
pub mod options;
pub mod session;
pub mod stream;
pub mod transport;

// Re-exports for convenience
pub use api::{Chat, Reply};
pub use client::{Client, ClientError};
pub use decoder::RecordDecoder;
pub use session::Session;
pub use stream::{MalformedPolicy, RecordStreamExt};
pub use transport::{ReqwestTransport, Transport};
