use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::codec::{Fixed32Codec, HeaderCodec};
use crate::network::{EventHandler, NoopHandler};

/// Hard ceiling shared by reads and writes: 32 MiB.
pub const MAX_RW_LEN: usize = 1 << 25;

pub(crate) const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:7777";
pub(crate) const DEFAULT_POOL_SIZE: u32 = 16;

/// Bitmask selecting which components the service facade builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceType(u32);

impl ServiceType {
    pub const TCP_SERVER: ServiceType = ServiceType(1);
    pub const TCP_CLIENT: ServiceType = ServiceType(1 << 1);
    pub const TCP_ASYNC_CLIENT: ServiceType = ServiceType(1 << 2);
    pub const TCP_POOL: ServiceType = ServiceType(1 << 3);
    pub const TCP_ASYNC_POOL: ServiceType = ServiceType(1 << 4);

    pub fn contains(self, other: ServiceType) -> bool {
        self.0 & other.0 != 0
    }

    pub fn tcp_server_type(self) -> bool {
        self.contains(Self::TCP_SERVER)
    }

    pub fn tcp_client_type(self) -> bool {
        self.contains(Self::TCP_CLIENT)
    }

    pub fn tcp_async_client_type(self) -> bool {
        self.contains(Self::TCP_ASYNC_CLIENT)
    }

    pub fn tcp_pool_type(self) -> bool {
        self.contains(Self::TCP_POOL)
    }

    pub fn tcp_async_pool_type(self) -> bool {
        self.contains(Self::TCP_ASYNC_POOL)
    }
}

impl BitOr for ServiceType {
    type Output = ServiceType;

    fn bitor(self, rhs: ServiceType) -> ServiceType {
        ServiceType(self.0 | rhs.0)
    }
}

impl Default for ServiceType {
    fn default() -> Self {
        Self::TCP_SERVER
    }
}

/// Tuning record shared by every component. Immutable once a component has
/// been constructed from it.
///
/// Logging has no field here: the runtime emits `tracing` events, which go
/// nowhere unless the embedding program installs a subscriber (see
/// [`crate::service::init_tracing`]).
#[derive(Clone)]
pub struct Options {
    /// Bind address for the server, connect address for clients and pools.
    pub addr: String,
    pub service_type: ServiceType,
    /// Receives connection events of async connections.
    pub handler: Arc<dyn EventHandler>,
    pub header_codec: Arc<dyn HeaderCodec>,
    /// Per-read deadline; zero disables.
    pub read_timeout: Duration,
    /// Per-write deadline; zero disables.
    pub write_timeout: Duration,
    pub init_read_buf_len: usize,
    pub max_read_buf_len: usize,
    /// Server connection admission limit; zero means unlimited.
    pub conn_limit: u32,
    /// Cancellation root: cancelling it shuts down owned workers and pools.
    pub ctx: CancellationToken,
    /// Opaque label copied onto new connections.
    pub tag: String,
    /// Heartbeat payload; empty disables heartbeats.
    pub heart_data: Vec<u8>,
    pub heart_interval: Duration,
    pub pool_init_size: u32,
    pub pool_max_size: u32,
    pub pool_get_timeout: Duration,
    /// Idle eviction threshold on pool get; zero means never.
    pub pool_idle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            addr: String::new(),
            service_type: ServiceType::default(),
            handler: Arc::new(NoopHandler),
            header_codec: Arc::new(Fixed32Codec),
            read_timeout: Duration::from_secs(2 * 60),
            write_timeout: Duration::from_secs(5),
            init_read_buf_len: 1024,
            max_read_buf_len: MAX_RW_LEN,
            conn_limit: 0,
            ctx: CancellationToken::new(),
            tag: String::new(),
            heart_data: Vec::new(),
            heart_interval: Duration::from_secs(30),
            pool_init_size: 0,
            pool_max_size: DEFAULT_POOL_SIZE,
            pool_get_timeout: Duration::from_secs(3),
            pool_idle_timeout: Duration::ZERO,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_service_type(mut self, t: ServiceType) -> Self {
        self.service_type = t;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_header_codec(mut self, codec: Arc<dyn HeaderCodec>) -> Self {
        self.header_codec = codec;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Initial and maximum reader-buffer length. `init` is clamped to
    /// `max`; zero keeps the current value.
    pub fn with_buffer_len(mut self, init: usize, max: usize) -> Self {
        if max > 0 {
            self.max_read_buf_len = max;
        }
        let init = init.min(self.max_read_buf_len);
        if init > 0 {
            self.init_read_buf_len = init;
        }
        self
    }

    pub fn with_conn_num_limit(mut self, limit: u32) -> Self {
        self.conn_limit = limit;
        self
    }

    pub fn with_context(mut self, ctx: CancellationToken) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Heartbeat payload and period for async connections and pools.
    pub fn with_heartbeat(mut self, data: Vec<u8>, interval: Duration) -> Self {
        self.heart_data = data;
        if !interval.is_zero() {
            self.heart_interval = interval;
        }
        self
    }

    /// Eager and maximum pool size. `init` is clamped to `max`; zero keeps
    /// the current value.
    pub fn with_pool_size(mut self, init: u32, max: u32) -> Self {
        if max > 0 {
            self.pool_max_size = max;
        }
        let init = init.min(self.pool_max_size);
        if init > 0 {
            self.pool_init_size = init;
        }
        self
    }

    pub fn with_pool_get_timeout(mut self, timeout: Duration) -> Self {
        self.pool_get_timeout = timeout;
        self
    }

    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("addr", &self.addr)
            .field("service_type", &self.service_type)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("init_read_buf_len", &self.init_read_buf_len)
            .field("max_read_buf_len", &self.max_read_buf_len)
            .field("conn_limit", &self.conn_limit)
            .field("tag", &self.tag)
            .field("heart_interval", &self.heart_interval)
            .field("pool_init_size", &self.pool_init_size)
            .field("pool_max_size", &self.pool_max_size)
            .field("pool_get_timeout", &self.pool_get_timeout)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .finish()
    }
}
