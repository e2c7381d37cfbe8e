//! Connection runtimes and framing plumbing.
//!
//! - [`ReaderBuffer`]: bounded-growth buffer feeding the frame decoder
//! - [`AsyncConn`]: event-driven connection with read/write workers
//! - [`Client`]: caller-serial request/response connection
//! - [`EventHandler`]: callback surface for async connections

mod async_conn;
mod client;
mod handler;
mod reader_buffer;

pub use async_conn::AsyncConn;
pub use client::Client;
pub use handler::{EventHandler, NoopHandler};
pub use reader_buffer::ReaderBuffer;

pub(crate) use async_conn::ConnGuard;

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::time;

// Applies a per-operation deadline; zero means none.
pub(crate) async fn with_deadline<T, F>(limit: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    if limit.is_zero() {
        return fut.await;
    }
    match time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "deadline exceeded",
        )),
    }
}
