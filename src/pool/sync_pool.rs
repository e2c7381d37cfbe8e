use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::network::Client;
use crate::service::config::DEFAULT_POOL_SIZE;
use crate::service::{NetError, NetResult, Options};
use crate::utils::TimeoutLimiter;

struct PoolEntry {
    conn: Client,
    t: Instant,
}

/// Pool of request/response connections.
///
/// A bounded queue holds idle connections with their last-used timestamp;
/// a timed admission limiter caps how many are outstanding at once. `get`
/// evicts closed, idle-expired and heartbeat-failing entries and falls back
/// to dialing a fresh connection when the queue runs empty. Callers must
/// `put` once for every successful `get`, whether or not they closed the
/// connection themselves.
pub struct SyncPool {
    inner: Arc<SyncPoolInner>,
}

struct SyncPoolInner {
    addr: String,
    opts: Options,
    conn_tx: async_channel::Sender<PoolEntry>,
    conn_rx: async_channel::Receiver<PoolEntry>,
    limiter: TimeoutLimiter,
    ctx: CancellationToken,
    closed: AtomicBool,
}

impl SyncPool {
    /// Builds the pool and eagerly dials `pool_init_size` connections; any
    /// dial failure closes the pool and surfaces the error.
    pub async fn new(opts: Options) -> NetResult<SyncPool> {
        if opts.addr.is_empty() {
            return Err(NetError::PoolInvalidAddr);
        }
        let max = if opts.pool_max_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            opts.pool_max_size
        };
        let (conn_tx, conn_rx) = async_channel::bounded(max as usize);
        let limiter = TimeoutLimiter::new(max, opts.pool_get_timeout);
        let ctx = opts.ctx.child_token();

        let pool = SyncPool {
            inner: Arc::new(SyncPoolInner {
                addr: opts.addr.clone(),
                opts,
                conn_tx,
                conn_rx,
                limiter,
                ctx: ctx.clone(),
                closed: AtomicBool::new(false),
            }),
        };

        // cancelling the caller's context closes the pool
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
                    let _ = pool.inner.conn_tx.try_send(PoolEntry {
                        conn,
                        t: Instant::now(),
                    });
                }
                Err(err) => {
                    pool.close();
                    return Err(err);
                }
            }
        }
        Ok(pool)
    }

    /// Acquires a healthy connection, waiting at most `pool_get_timeout`
    /// for admission.
    pub async fn get(&self) -> NetResult<Client> {
        if !self.inner.limiter.allow().await {
            return Err(NetError::PoolTimeout);
        }
        let res = self.get_conn().await;
        if res.is_err() {
            self.inner.limiter.revert();
        }
        res
    }

    async fn get_conn(&self) -> NetResult<Client> {
        loop {
            if self.inner.is_closed() {
                return Err(NetError::PoolClosed);
            }
            let mut entry = match self.inner.conn_rx.try_recv() {
                Ok(entry) => entry,
                Err(async_channel::TryRecvError::Empty) => return self.create_conn().await,
                Err(async_channel::TryRecvError::Closed) => return Err(NetError::PoolClosed),
            };

            if entry.conn.closed() {
                continue;
            }
            let idle = entry.t.elapsed();
            if !self.inner.opts.pool_idle_timeout.is_zero()
                && idle > self.inner.opts.pool_idle_timeout
            {
                debug!("pool conn idle for {:?}, evicting", idle);
                entry.conn.close().await;
                continue;
            }
            if !self.inner.opts.heart_data.is_empty() && idle > self.inner.opts.heart_interval {
                let heart = self.inner.opts.heart_data.clone();
                if entry.conn.write_read(&heart).await.is_err() {
                    debug!("pool conn failed heartbeat, evicting");
                    entry.conn.close().await;
                    continue;
                }
            }
            return Ok(entry.conn);
        }
    }

    /// Returns a connection and its admission permit. Closed connections
    /// and puts after close are dropped rather than requeued.
    pub fn put(&self, conn: Client) {
        self.inner.limiter.revert();
        if self.inner.is_closed() || conn.closed() {
            return;
        }
        let _ = self.inner.conn_tx.try_send(PoolEntry {
            conn,
            t: Instant::now(),
        });
    }

    /// Closes the pool. Idempotent. Connections currently held by callers
    /// stay open; the admission limiter simply stops handing out permits
    /// for new acquires.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn closed(&self) -> bool {
        self.inner.is_closed()
    }

    async fn create_conn(&self) -> NetResult<Client> {
        Client::connect(&self.inner.addr, self.inner.opts.clone()).await
    }
}

impl SyncPoolInner {
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

impl Drop for SyncPool {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for SyncPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPool")
            .field("addr", &self.inner.addr)
            .field("closed", &self.closed())
            .finish()
    }
}
