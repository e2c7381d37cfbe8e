use async_trait::async_trait;

use crate::network::AsyncConn;
use crate::service::{NetError, NetResult};

/// Connection event callbacks.
///
/// All methods default to no-ops, so implementors override only what they
/// need. Callbacks run on the connection's worker tasks: `on_read_msg`
/// blocks further reads on that connection until it returns, and returning
/// an error closes the connection. Do not call `conn.close()` from inside a
/// callback; return an error from `on_read_msg` instead.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// A new connection is up. Fires before the first `on_read_msg`.
    async fn on_opened(&self, _conn: &AsyncConn) {}

    /// The connection finished teardown. Fires exactly once.
    async fn on_closed(&self, _conn: &AsyncConn) {}

    /// One framed message body arrived.
    async fn on_read_msg(&self, _conn: &AsyncConn, _data: Vec<u8>) -> NetResult<()> {
        Ok(())
    }

    /// Writing `data` failed; the connection is about to close.
    async fn on_write_error(&self, _conn: &AsyncConn, _data: Vec<u8>, _err: NetError) {}
}

/// Zero-behavior handler, the default for `Options`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

#[async_trait]
impl EventHandler for NoopHandler {}
