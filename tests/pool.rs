use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use framelink::{
    AsyncConn, AsyncPool, EventHandler, NetError, NetResult, Options, Server, SyncPool,
};

/// Echoes every message and counts server-side connection lifecycle.
#[derive(Default)]
struct EchoCounter {
    opened: AtomicU32,
    closed: AtomicU32,
}

#[async_trait::async_trait]
impl EventHandler for EchoCounter {
    async fn on_opened(&self, _conn: &AsyncConn) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_closed(&self, _conn: &AsyncConn) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_read_msg(&self, conn: &AsyncConn, data: Vec<u8>) -> NetResult<()> {
        conn.write(data).await
    }
}

async fn start_server() -> (Arc<Server>, Arc<EchoCounter>, SocketAddr) {
    let handler = Arc::new(EchoCounter::default());
    let opts = Options::new()
        .with_addr("127.0.0.1:0")
        .with_event_handler(handler.clone());
    let server = Arc::new(Server::bind(opts).await.unwrap());
    let addr = server.local_addr().unwrap();
    let srv = server.clone();
    tokio::spawn(async move {
        let _ = srv.serve().await;
    });
    (server, handler, addr)
}

async fn wait_opened(handler: &EchoCounter, n: u32) {
    while handler.opened.load(Ordering::SeqCst) < n {
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn empty_addr_is_invalid() {
    let err = SyncPool::new(Options::new()).await.unwrap_err();
    assert!(matches!(err, NetError::PoolInvalidAddr));
    let err = AsyncPool::new(Options::new()).await.unwrap_err();
    assert!(matches!(err, NetError::PoolInvalidAddr));
}

#[tokio::test]
async fn admission_times_out_when_exhausted() {
    let (server, _, addr) = start_server().await;
    let opts = Options::new()
        .with_addr(addr.to_string())
        .with_pool_size(0, 1)
        .with_pool_get_timeout(Duration::from_millis(50));
    let pool = Arc::new(SyncPool::new(opts).await.unwrap());

    let held = pool.get().await.unwrap();

    let contender = pool.clone();
    let start = Instant::now();
    let err = timeout(Duration::from_secs(1), contender.get())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, NetError::PoolTimeout));
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(45), "waited {:?}", waited);

    pool.put(held);
    server.stop().await;
}

#[tokio::test]
async fn put_then_get_reuses_the_connection() {
    let (server, handler, addr) = start_server().await;
    let opts = Options::new()
        .with_addr(addr.to_string())
        .with_pool_size(0, 4);
    let pool = SyncPool::new(opts).await.unwrap();

    let mut conn = pool.get().await.unwrap();
    let resp = conn.write_read(b"one").await.unwrap();
    assert_eq!(resp, b"one");
    pool.put(conn);

    let mut conn = pool.get().await.unwrap();
    let resp = conn.write_read(b"two").await.unwrap();
    assert_eq!(resp, b"two");
    pool.put(conn);

    // the server only ever saw one dial
    timeout(Duration::from_secs(1), wait_opened(&handler, 1))
        .await
        .unwrap();
    assert_eq!(handler.opened.load(Ordering::SeqCst), 1);

    server.stop().await;
}

#[tokio::test]
async fn idle_entries_are_evicted_on_get() {
    let (server, handler, addr) = start_server().await;
    let opts = Options::new()
        .with_addr(addr.to_string())
        .with_pool_size(0, 4)
        .with_pool_idle_timeout(Duration::from_millis(100));
    let pool = SyncPool::new(opts).await.unwrap();

    let conn = pool.get().await.unwrap();
    pool.put(conn);
    sleep(Duration::from_millis(200)).await;

    // stale entry gets closed and replaced by a fresh dial
    let conn = pool.get().await.unwrap();
    assert!(!conn.closed());
    timeout(Duration::from_secs(1), wait_opened(&handler, 2))
        .await
        .unwrap();
    pool.put(conn);

    server.stop().await;
}

#[tokio::test]
async fn heartbeat_probe_keeps_healthy_conn() {
    let (server, handler, addr) = start_server().await;
    let opts = Options::new()
        .with_addr(addr.to_string())
        .with_pool_size(0, 4)
        .with_heartbeat(b"hb".to_vec(), Duration::from_millis(50));
    let pool = SyncPool::new(opts).await.unwrap();

    let conn = pool.get().await.unwrap();
    pool.put(conn);
    sleep(Duration::from_millis(120)).await;

    // idle exceeded heart_interval: get() probes with write_read and, since
    // the echo succeeds, hands the same connection back
    let conn = pool.get().await.unwrap();
    assert!(!conn.closed());
    assert_eq!(handler.opened.load(Ordering::SeqCst), 1);
    pool.put(conn);

    server.stop().await;
}

#[tokio::test]
async fn eager_init_fills_the_pool() {
    let (server, handler, addr) = start_server().await;
    let opts = Options::new()
        .with_addr(addr.to_string())
        .with_pool_size(3, 4);
    let pool = SyncPool::new(opts).await.unwrap();

    timeout(Duration::from_secs(1), wait_opened(&handler, 3))
        .await
        .unwrap();
    assert_eq!(handler.opened.load(Ordering::SeqCst), 3);

    pool.close();
    server.stop().await;
}

#[tokio::test]
async fn eager_init_failure_closes_the_pool() {
    // nothing listens on this port
    let opts = Options::new()
        .with_addr("127.0.0.1:1")
        .with_pool_size(1, 4);
    let err = SyncPool::new(opts).await.unwrap_err();
    assert!(matches!(err, NetError::Connect(_)));
}

#[tokio::test]
async fn closed_pool_rejects_get_and_drops_put() {
    let (server, _, addr) = start_server().await;
    let opts = Options::new().with_addr(addr.to_string());
    let pool = SyncPool::new(opts).await.unwrap();

    let conn = pool.get().await.unwrap();
    pool.close();
    pool.close(); // idempotent

    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, NetError::PoolClosed));
    pool.put(conn); // dropped, not requeued
    assert!(pool.closed());

    server.stop().await;
}

#[tokio::test]
async fn async_pool_reuses_and_replaces_closed_conns() {
    let (server, handler, addr) = start_server().await;
    let opts = Options::new()
        .with_addr(addr.to_string())
        .with_pool_size(0, 4);
    let pool = AsyncPool::new(opts).await.unwrap();

    let conn = pool.get().await.unwrap();
    pool.put(conn.clone());

    // a closed entry is skipped at the next acquire
    conn.close().await;
    let fresh = pool.get().await.unwrap();
    assert!(!fresh.closed());
    timeout(Duration::from_secs(1), wait_opened(&handler, 2))
        .await
        .unwrap();
    pool.put(fresh);

    pool.close();
    server.stop().await;
}

#[tokio::test]
async fn cancelling_ctx_closes_async_pool() {
    let (server, _, addr) = start_server().await;
    let ctx = CancellationToken::new();
    let opts = Options::new()
        .with_addr(addr.to_string())
        .with_context(ctx.clone());
    let pool = AsyncPool::new(opts).await.unwrap();

    let conn = pool.get().await.unwrap();
    pool.put(conn.clone());

    ctx.cancel();
    sleep(Duration::from_millis(100)).await;
    assert!(pool.closed());
    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, NetError::PoolClosed));
    // pooled connections ride the same context down
    assert!(conn.closed());

    server.stop().await;
}
