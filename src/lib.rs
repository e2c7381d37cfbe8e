//! TCP networking runtime for length-prefixed message services.
//!
//! Three endpoint roles over one framed wire format: a message server
//! ([`Server`]), a request/response client ([`Client`]) and an
//! event-driven async client ([`AsyncConn`]), plus connection pools
//! ([`SyncPool`], [`AsyncPool`]) multiplexing either client kind across
//! concurrent callers. Callers supply a frame codec, an event handler and
//! an [`Options`] record; the runtime owns sockets, framing, backpressure,
//! timeouts, heartbeats and lifecycle.
//!
//! ```no_run
//! use std::sync::Arc;
//! use framelink::{AsyncConn, EventHandler, NetResult, Options, Server};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl EventHandler for Echo {
//!     async fn on_read_msg(&self, conn: &AsyncConn, data: Vec<u8>) -> NetResult<()> {
//!         conn.write(data).await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> NetResult<()> {
//!     let opts = Options::new()
//!         .with_addr("0.0.0.0:7777")
//!         .with_event_handler(Arc::new(Echo));
//!     let server = Server::bind(opts).await?;
//!     server.serve().await
//! }
//! ```

pub mod codec;
pub mod network;
pub mod pool;
pub mod service;
pub mod utils;

pub use codec::{Fixed32Codec, HeaderCodec, VarintCodec};
pub use network::{AsyncConn, Client, EventHandler, NoopHandler, ReaderBuffer};
pub use pool::{AsyncPool, SyncPool};
pub use service::{
    init_tracing, ClientKind, NetError, NetResult, Options, PoolKind, Server, Service,
    ServiceType, MAX_RW_LEN,
};
pub use utils::{ExpDelay, TimeoutLimiter};
