use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::network::ReaderBuffer;
use crate::service::{NetError, NetResult, Options};
use crate::utils::Shutdown;

/// Bound of the per-connection send queue.
const SEND_QUEUE_LEN: usize = 100;

/// Connection runtime with background read and write workers.
///
/// One instance serves both sides of the wire: async clients create it with
/// [`AsyncConn::connect`], the server attaches it to accepted sockets. The
/// read worker feeds framed bodies to the configured [`EventHandler`]
/// (`on_opened` first, then `on_read_msg` in socket byte order); the write
/// worker drains the bounded send queue and, when `heart_data` is set,
/// emits heartbeats whenever the link has been write-idle for
/// `heart_interval`.
///
/// Closing is idempotent. The first `close` stops the write worker, drains
/// the send queue best-effort (write failures surface through
/// `on_write_error`), shuts the socket down, joins the read worker and
/// finally fires `on_closed` exactly once.
///
/// [`EventHandler`]: crate::network::EventHandler
#[derive(Clone)]
pub struct AsyncConn {
    shared: Arc<ConnShared>,
}

struct ConnShared {
    opts: Options,
    peer_addr: SocketAddr,
    send_tx: mpsc::Sender<Vec<u8>>,
    notify_close: broadcast::Sender<()>,
    closed: AtomicBool,
    tag: Mutex<String>,
    tasks: Mutex<Option<ConnTasks>>,
    guard: Mutex<Option<ConnGuard>>,
}

struct ConnTasks {
    write: JoinHandle<(OwnedWriteHalf, mpsc::Receiver<Vec<u8>>)>,
    read: JoinHandle<()>,
}

/// Server-side bookkeeping released exactly once, at teardown or when the
/// guard is dropped without ever reaching a live connection.
pub(crate) struct ConnGuard {
    on_close: Option<Box<dyn FnOnce() + Send + Sync>>,
    _complete: mpsc::Sender<()>,
}

impl ConnGuard {
    pub(crate) fn new(
        on_close: impl FnOnce() + Send + Sync + 'static,
        complete: mpsc::Sender<()>,
    ) -> Self {
        Self {
            on_close: Some(Box::new(on_close)),
            _complete: complete,
        }
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl AsyncConn {
    /// Dials `addr` and starts the connection workers.
    pub async fn connect(addr: &str, opts: Options) -> NetResult<AsyncConn> {
        let stream = TcpStream::connect(addr).await.map_err(NetError::Connect)?;
        Self::attach(stream, opts, None)
    }

    /// Starts the workers on an already-accepted socket.
    pub(crate) fn attach(
        stream: TcpStream,
        opts: Options,
        guard: Option<ConnGuard>,
    ) -> NetResult<AsyncConn> {
        let peer_addr = stream.peer_addr().map_err(NetError::Connect)?;
        let (read_half, write_half) = stream.into_split();
        let buffer = ReaderBuffer::new(opts.init_read_buf_len, opts.max_read_buf_len);
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_LEN);
        let (notify_close, _) = broadcast::channel(1);
        // subscribe before the workers spawn, so a close racing the startup
        // cannot fire the signal past them
        let write_shutdown = Shutdown::new(notify_close.subscribe());
        let read_shutdown = Shutdown::new(notify_close.subscribe());
        let tag = Mutex::new(opts.tag.clone());

        let conn = AsyncConn {
            shared: Arc::new(ConnShared {
                opts,
                peer_addr,
                send_tx,
                notify_close,
                closed: AtomicBool::new(false),
                tag,
                tasks: Mutex::new(None),
                guard: Mutex::new(guard),
            }),
        };

        let write = if conn.shared.opts.heart_data.is_empty() {
            tokio::spawn(write_loop(conn.clone(), write_half, send_rx, write_shutdown))
        } else {
            tokio::spawn(write_loop_with_heartbeat(
                conn.clone(),
                write_half,
                send_rx,
                write_shutdown,
            ))
        };
        let read = tokio::spawn(read_loop(conn.clone(), read_half, buffer, read_shutdown));
        *conn.shared.tasks.lock().unwrap() = Some(ConnTasks { write, read });

        Ok(conn)
    }

    /// Enqueues `data` for the write worker. An empty body is a no-op. The
    /// queue is bounded: when full, the caller suspends until the worker
    /// makes room or the connection closes.
    pub async fn write(&self, data: Vec<u8>) -> NetResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        if self.closed() {
            return Err(NetError::ConnClosed);
        }
        let mut shutdown = Shutdown::subscribe(&self.shared.notify_close);
        tokio::select! {
            _ = shutdown.recv() => Err(NetError::ConnClosed),
            _ = self.shared.opts.ctx.cancelled() => Err(NetError::ConnClosed),
            res = self.shared.send_tx.send(data) => res.map_err(|_| NetError::ConnClosed),
        }
    }

    /// Tears the connection down. Only the first call has any effect.
    pub async fn close(&self) {
        if self
            .shared
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let _ = self.shared.notify_close.send(());

        let tasks = self.shared.tasks.lock().unwrap().take();
        if let Some(tasks) = tasks {
            // The write worker hands its socket half and the queue receiver
            // back, so pending messages can still go out before the socket
            // shuts down.
            if let Ok((mut write_half, mut send_rx)) = tasks.write.await {
                send_rx.close();
                while let Ok(data) = send_rx.try_recv() {
                    if let Err(err) = write_frame(&self.shared.opts, &mut write_half, &data).await {
                        self.shared
                            .opts
                            .handler
                            .on_write_error(self, data, err)
                            .await;
                    }
                }
                let _ = write_half.shutdown().await;
            }
            let _ = tasks.read.await;
        }

        self.shared.opts.handler.on_closed(self).await;

        // dropping the guard reverts the server's admission permit,
        // decrements its connection count and releases the wait handle
        drop(self.shared.guard.lock().unwrap().take());
    }

    pub fn closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.shared.peer_addr
    }

    pub fn set_tag(&self, tag: impl Into<String>) {
        *self.shared.tag.lock().unwrap() = tag.into();
    }

    pub fn tag(&self) -> String {
        self.shared.tag.lock().unwrap().clone()
    }

    /// Raw reads belong to the sync client.
    pub async fn read(&self, _buf: &mut [u8]) -> NetResult<usize> {
        Err(NetError::ConnInvalidCall)
    }

    /// Raw reads belong to the sync client.
    pub async fn read_full(&self, _buf: &mut [u8]) -> NetResult<usize> {
        Err(NetError::ConnInvalidCall)
    }

    /// Request/response belongs to the sync client; responses arrive via
    /// `on_read_msg` here.
    pub async fn write_read(&self, _req: &[u8]) -> NetResult<Vec<u8>> {
        Err(NetError::ConnInvalidCall)
    }

    fn schedule_close(&self) {
        let conn = self.clone();
        tokio::spawn(async move { conn.close().await });
    }
}

impl std::fmt::Debug for AsyncConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncConn")
            .field("peer_addr", &self.shared.peer_addr)
            .field("closed", &self.closed())
            .finish()
    }
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
}

async fn write_frame(
    opts: &Options,
    write_half: &mut OwnedWriteHalf,
    body: &[u8],
) -> NetResult<()> {
    let frame = opts.header_codec.encode(body);
    if opts.write_timeout.is_zero() {
        write_half.write_all(&frame).await.map_err(NetError::Write)
    } else {
        match time::timeout(opts.write_timeout, write_half.write_all(&frame)).await {
            Ok(res) => res.map_err(NetError::Write),
            Err(_) => Err(NetError::Write(timed_out())),
        }
    }
}

async fn read_loop(
    conn: AsyncConn,
    mut read_half: OwnedReadHalf,
    mut buffer: ReaderBuffer,
    mut shutdown: Shutdown,
) {
    let opts = conn.shared.opts.clone();
    let handler = opts.handler.clone();
    handler.on_opened(&conn).await;

    let ctx = opts.ctx.clone();

    'conn: loop {
        let res = tokio::select! {
            _ = shutdown.recv() => break 'conn,
            _ = ctx.cancelled() => break 'conn,
            res = async {
                if opts.read_timeout.is_zero() {
                    buffer.read_from(&mut read_half).await
                } else {
                    match time::timeout(opts.read_timeout, buffer.read_from(&mut read_half)).await {
                        Ok(res) => res,
                        Err(_) => Err(NetError::Read(timed_out())),
                    }
                }
            } => res,
        };
        let n = match res {
            Ok(n) => n,
            Err(err) => {
                // a close in flight makes the read error expected
                if !shutdown.is_shutdown() && !conn.closed() {
                    warn!(peer = %conn.remote_addr(), "conn read error: {}", err);
                }
                break 'conn;
            }
        };
        if n == 0 {
            if !shutdown.is_shutdown() && !conn.closed() {
                debug!(peer = %conn.remote_addr(), "conn closed by peer");
            }
            break 'conn;
        }

        while buffer.len() > 0 {
            let (body_len, header_len) = opts.header_codec.decode(buffer.data());
            if header_len == 0 {
                break;
            }
            let msg_len = body_len as usize + header_len as usize;
            if msg_len > opts.max_read_buf_len {
                warn!(
                    peer = %conn.remote_addr(),
                    "msg len {} greater than max {}", msg_len, opts.max_read_buf_len
                );
                break 'conn;
            }
            if buffer.len() < msg_len {
                break;
            }
            let mut body = vec![0u8; body_len as usize];
            buffer.read(header_len as usize, body_len as usize, &mut body);
            if let Err(err) = handler.on_read_msg(&conn, body).await {
                info!(peer = %conn.remote_addr(), "on_read_msg error: {}", err);
                break 'conn;
            }
        }
    }

    buffer.release();
    conn.schedule_close();
}

async fn write_loop(
    conn: AsyncConn,
    mut write_half: OwnedWriteHalf,
    mut send_rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown: Shutdown,
) -> (OwnedWriteHalf, mpsc::Receiver<Vec<u8>>) {
    let opts = conn.shared.opts.clone();
    let ctx = opts.ctx.clone();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ctx.cancelled() => break,
            data = send_rx.recv() => match data {
                Some(data) => {
                    if let Err(err) = write_frame(&opts, &mut write_half, &data).await {
                        opts.handler.on_write_error(&conn, data, err).await;
                        break;
                    }
                }
                None => break,
            },
        }
    }

    conn.schedule_close();
    (write_half, send_rx)
}

async fn write_loop_with_heartbeat(
    conn: AsyncConn,
    mut write_half: OwnedWriteHalf,
    mut send_rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown: Shutdown,
) -> (OwnedWriteHalf, mpsc::Receiver<Vec<u8>>) {
    let opts = conn.shared.opts.clone();
    let ctx = opts.ctx.clone();
    let heartbeat = time::sleep(opts.heart_interval);
    tokio::pin!(heartbeat);

    loop {
        // Re-armed every iteration: any write pushes the next heartbeat a
        // full interval out.
        heartbeat
            .as_mut()
            .reset(Instant::now() + opts.heart_interval);
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ctx.cancelled() => break,
            _ = heartbeat.as_mut() => {
                if let Err(err) = write_frame(&opts, &mut write_half, &opts.heart_data).await {
                    debug!(peer = %conn.remote_addr(), "heartbeat write error: {}", err);
                    break;
                }
            }
            data = send_rx.recv() => match data {
                Some(data) => {
                    if let Err(err) = write_frame(&opts, &mut write_half, &data).await {
                        opts.handler.on_write_error(&conn, data, err).await;
                        break;
                    }
                }
                None => break,
            },
        }
    }

    conn.schedule_close();
    (write_half, send_rx)
}
