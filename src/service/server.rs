use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::network::{AsyncConn, ConnGuard};
use crate::service::config::DEFAULT_SERVER_ADDR;
use crate::service::{NetError, NetResult, Options};
use crate::utils::{ExpDelay, TimeoutLimiter};

/// TCP message server.
///
/// `bind` resolves the address and claims the listener; `serve` runs the
/// accept loop and parks the caller until the context is cancelled, `stop`
/// is called, or a SIGINT/SIGTERM arrives. Every accepted socket becomes an
/// [`AsyncConn`] driven by the configured handler. Graceful stop closes the
/// accept loop first and then waits for every live connection to finish
/// teardown.
pub struct Server {
    opts: Options,
    shared: Arc<ServerShared>,
    listener: Mutex<Option<TcpListener>>,
    ctx: CancellationToken,
    stopped: AtomicBool,
    shutdown_complete_tx: Mutex<Option<mpsc::Sender<()>>>,
    shutdown_complete_rx: tokio::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

struct ServerShared {
    limiter: Option<TimeoutLimiter>,
    conn_num: AtomicU32,
}

impl Server {
    /// Binds the listener. An empty `addr` falls back to `0.0.0.0:7777`.
    pub async fn bind(opts: Options) -> NetResult<Server> {
        let addr = if opts.addr.is_empty() {
            DEFAULT_SERVER_ADDR
        } else {
            opts.addr.as_str()
        };
        let listener = TcpListener::bind(addr).await?;
        info!("tcp server listening on {}", listener.local_addr()?);

        let limiter = if opts.conn_limit > 0 {
            Some(TimeoutLimiter::new(opts.conn_limit, Duration::ZERO))
        } else {
            None
        };
        let ctx = opts.ctx.child_token();
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);

        Ok(Server {
            opts,
            shared: Arc::new(ServerShared {
                limiter,
                conn_num: AtomicU32::new(0),
            }),
            listener: Mutex::new(Some(listener)),
            ctx,
            stopped: AtomicBool::new(false),
            shutdown_complete_tx: Mutex::new(Some(shutdown_complete_tx)),
            shutdown_complete_rx: tokio::sync::Mutex::new(Some(shutdown_complete_rx)),
        })
    }

    /// The address the listener is bound to, while `serve` has not consumed
    /// it yet.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    /// Runs the accept loop and blocks until shutdown. Returns
    /// `NetError::Signal` when ended by SIGINT/SIGTERM, `Ok(())` when ended
    /// by `stop` or context cancellation. Either way, every live connection
    /// has reached teardown when this returns.
    pub async fn serve(&self) -> NetResult<()> {
        let listener = self
            .listener
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| NetError::Accept("server already serving".to_string()))?;

        let complete_tx = {
            let guard = self.shutdown_complete_tx.lock().unwrap();
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => return Err(NetError::Accept("server already stopped".to_string())),
            }
        };
        tokio::spawn(accept_loop(
            listener,
            self.shared.clone(),
            self.opts.clone(),
            self.ctx.clone(),
            complete_tx,
        ));

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = self.ctx.cancelled() => {
                self.wait().await;
                Ok(())
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, stopping");
                self.stop().await;
                Err(NetError::Signal("SIGINT"))
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, stopping");
                self.stop().await;
                Err(NetError::Signal("SIGTERM"))
            }
        }
    }

    /// Stops the accept loop, closes every connection and waits for their
    /// teardown. Idempotent; concurrent calls after the first return
    /// immediately.
    pub async fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.ctx.cancel();
        self.wait().await;
    }

    /// Number of connections that have not finished teardown.
    pub fn conn_num(&self) -> u32 {
        self.shared.conn_num.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        drop(self.shutdown_complete_tx.lock().unwrap().take());
        let mut rx_guard = self.shutdown_complete_rx.lock().await;
        if let Some(rx) = rx_guard.as_mut() {
            while rx.recv().await.is_some() {}
            *rx_guard = None;
        }
        debug!("server shutdown complete");
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("conn_num", &self.conn_num())
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<ServerShared>,
    opts: Options,
    ctx: CancellationToken,
    complete_tx: mpsc::Sender<()>,
) {
    let mut delay = ExpDelay::default();

    loop {
        let res = tokio::select! {
            _ = ctx.cancelled() => break,
            res = listener.accept() => res,
        };
        match res {
            Ok((stream, peer)) => {
                delay.reset();
                if let Some(limiter) = &shared.limiter {
                    if !limiter.allow().await {
                        warn!(
                            "conn limit {} reached, rejecting {}",
                            opts.conn_limit, peer
                        );
                        drop(stream);
                        continue;
                    }
                }
                if let Err(err) = set_keepalive(&stream) {
                    warn!("set keepalive on {} error: {}", peer, err);
                }

                shared.conn_num.fetch_add(1, Ordering::AcqRel);
                let on_close = {
                    let shared = shared.clone();
                    move || {
                        if let Some(limiter) = &shared.limiter {
                            limiter.revert();
                        }
                        shared.conn_num.fetch_sub(1, Ordering::AcqRel);
                    }
                };
                let guard = ConnGuard::new(on_close, complete_tx.clone());

                let mut conn_opts = opts.clone();
                conn_opts.ctx = ctx.clone();
                match AsyncConn::attach(stream, conn_opts, Some(guard)) {
                    Ok(conn) => debug!("accepted conn from {}", conn.remote_addr()),
                    // dropping the guard rolled the bookkeeping back
                    Err(err) => warn!("attach conn from {} error: {}", peer, err),
                }
            }
            Err(err) if is_temporary(&err) => {
                warn!("accept temp error: {}", err);
                let pause = delay.get();
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = time::sleep(pause) => {}
                }
            }
            Err(err) => {
                if ctx.is_cancelled() {
                    break;
                }
                error!("accept error: {}", err);
                break;
            }
        }
    }
    debug!("accept loop exited");
}

fn is_temporary(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

// SO_KEEPALIVE with a 60s idle period; probe count and retry interval are
// Linux-only knobs.
fn set_keepalive(stream: &TcpStream) -> io::Result<()> {
    #[allow(unused_mut)]
    let mut keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(60));
    #[cfg(target_os = "linux")]
    {
        keepalive = keepalive
            .with_interval(Duration::from_secs(10))
            .with_retries(6);
    }
    let sock_ref = socket2::SockRef::from(stream);
    sock_ref.set_tcp_keepalive(&keepalive)
}
