//! # mercury-client
//!
//! Client engine for the Mercury pub/sub RPC protocol.
//!
//! Mercury multiplexes addressed requests (GET/SEND), long-lived push
//! subscriptions (SUB/UNSUB) and keepalives over one authenticated, framed
//! connection, correlating replies by a per-request sequence id.
//!
//! ## Architecture
//!
//! - **Protocol**: request encoding, response decoding, header codec
//! - **Registries**: sequence ids + one-shot callbacks, URI subscriptions
//! - **Engine**: the caller-facing facade plus the single dispatch loop
//! - **Transport**: the read/write seam the engine runs on
//!
//! ## Example
//!
//! ```ignore
//! use mercury_client::{Engine, MercuryMethod};
//! use mercury_client::transport::StreamTransport;
//!
//! #[tokio::main]
//! async fn main() -> mercury_client::Result<()> {
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:4070").await?;
//!     let (reader, writer) = StreamTransport::new(stream).into_split();
//!     let engine = Engine::builder().start(reader, writer);
//!
//!     let reply = engine
//!         .execute_async(MercuryMethod::Get, "hm://metadata/track/abc", vec![])
//!         .await?;
//!     println!("{} parts", reply.parts.len());
//!
//!     engine.closed().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;

mod engine;
mod writer;

pub use config::{AudioFormat, DeviceConfig};
pub use engine::{Engine, EngineBuilder, Termination, DEFAULT_REQUEST_TIMEOUT};
pub use error::{MercuryError, Result};
pub use protocol::{MercuryMethod, MercuryResponse, SequenceId};
pub use registry::MatchPolicy;
