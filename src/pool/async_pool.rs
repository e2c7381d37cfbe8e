use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::network::AsyncConn;
use crate::service::config::DEFAULT_POOL_SIZE;
use crate::service::{NetError, NetResult, Options};
use crate::utils::TimeoutLimiter;

/// Pool of event-driven connections.
///
/// Same admission and lifecycle as [`SyncPool`], but entries are bare
/// [`AsyncConn`] handles: they run their own heartbeats, so acquire-time
/// eviction is just the closed check. The pool derives a child context
/// from `Options::ctx`; cancelling either closes the pool and, through the
/// shared context, every pooled connection's workers.
///
/// [`SyncPool`]: crate::pool::SyncPool
pub struct AsyncPool {
    inner: Arc<AsyncPoolInner>,
}

struct AsyncPoolInner {
    addr: String,
    opts: Options,
    conn_tx: async_channel::Sender<AsyncConn>,
    conn_rx: async_channel::Receiver<AsyncConn>,
    limiter: TimeoutLimiter,
    ctx: CancellationToken,
    closed: AtomicBool,
}

impl AsyncPool {
    pub async fn new(opts: Options) -> NetResult<AsyncPool> {
        if opts.addr.is_empty() {
            return Err(NetError::PoolInvalidAddr);
        }
        let max = if opts.pool_max_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            opts.pool_max_size
        };
        let ctx = opts.ctx.child_token();
        // pooled connections live under the pool's context
        let mut conn_opts = opts.clone();
        conn_opts.ctx = ctx.clone();

        let (conn_tx, conn_rx) = async_channel::bounded(max as usize);
        let limiter = TimeoutLimiter::new(max, opts.pool_get_timeout);

        let pool = AsyncPool {
            inner: Arc::new(AsyncPoolInner {
                addr: opts.addr.clone(),
                opts: conn_opts,
                conn_tx,
                conn_rx,
                limiter,
                ctx: ctx.clone(),
                closed: AtomicBool::new(false),
            }),
        };

        let weak = Arc::downgrade(&pool.inner);
        tokio::spawn(async move {
            ctx.cancelled().await;
            if let Some(inner) = weak.upgrade() {
                inner.close();
            }
        });

        for _ in 0..pool.inner.opts.pool_init_size {
            match pool.create_conn().await {
                Ok(conn) => {
                    let _ = pool.inner.conn_tx.try_send(conn);
                }
                Err(err) => {
                    pool.close();
                    return Err(err);
                }
            }
        }
        Ok(pool)
    }

    pub async fn get(&self) -> NetResult<AsyncConn> {
        if !self.inner.limiter.allow().await {
            return Err(NetError::PoolTimeout);
        }
        let res = self.get_conn().await;
        if res.is_err() {
            self.inner.limiter.revert();
        }
        res
    }

    async fn get_conn(&self) -> NetResult<AsyncConn> {
        loop {
            if self.inner.is_closed() {
                return Err(NetError::PoolClosed);
            }
            match self.inner.conn_rx.try_recv() {
                Ok(conn) => {
                    if conn.closed() {
                        continue;
                    }
                    return Ok(conn);
                }
                Err(async_channel::TryRecvError::Empty) => return self.create_conn().await,
                Err(async_channel::TryRecvError::Closed) => return Err(NetError::PoolClosed),
            }
        }
    }

    pub fn put(&self, conn: AsyncConn) {
        self.inner.limiter.revert();
        if self.inner.is_closed() || conn.closed() {
            return;
        }
        let _ = self.inner.conn_tx.try_send(conn);
    }

    /// Closes the pool and cancels the derived context, which shuts down
    /// every pooled connection's workers. Connections held by callers are
    /// torn down the same way; their handles just stay valid.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn closed(&self) -> bool {
        self.inner.is_closed()
    }

    async fn create_conn(&self) -> NetResult<AsyncConn> {
        AsyncConn::connect(&self.inner.addr, self.inner.opts.clone()).await
    }
}

impl AsyncPoolInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.ctx.cancel();
        self.conn_rx.close();
    }
}

impl Drop for AsyncPool {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for AsyncPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPool")
            .field("addr", &self.inner.addr)
            .field("closed", &self.closed())
            .finish()
    }
}
