//! Service facade, options, server and error definitions.

pub(crate) mod app_error;
pub(crate) mod config;
mod logging;
mod server;

pub use app_error::{NetError, NetResult};
pub use config::{Options, ServiceType, MAX_RW_LEN};
pub use logging::init_tracing;
pub use server::Server;

use crate::network::{AsyncConn, Client};
use crate::pool::{AsyncPool, SyncPool};

/// Either flavor of client connection.
#[derive(Debug)]
pub enum ClientKind {
    Sync(Client),
    Async(AsyncConn),
}

/// Either flavor of connection pool.
#[derive(Debug)]
pub enum PoolKind {
    Sync(SyncPool),
    Async(AsyncPool),
}

/// Constructs the subset of {server, client, pool} selected by
/// `Options::service_type`, all sharing the one options record.
///
/// When both client kinds are requested the sync client wins; likewise the
/// sync pool over the async pool. Components come back live: the server is
/// bound (call [`Server::serve`] to accept) and clients/pools are
/// connected.
pub struct Service {
    server: Option<Server>,
    client: Option<ClientKind>,
    pool: Option<PoolKind>,
}

impl Service {
    pub async fn new(opts: Options) -> NetResult<Service> {
        let service_type = opts.service_type;
        let mut service = Service {
            server: None,
            client: None,
            pool: None,
        };

        if service_type.tcp_server_type() {
            service.server = Some(Server::bind(opts.clone()).await?);
        }
        if service_type.tcp_client_type() {
            let client = Client::connect(&opts.addr, opts.clone()).await?;
            service.client = Some(ClientKind::Sync(client));
        } else if service_type.tcp_async_client_type() {
            let conn = AsyncConn::connect(&opts.addr, opts.clone()).await?;
            service.client = Some(ClientKind::Async(conn));
        }
        if service_type.tcp_pool_type() {
            service.pool = Some(PoolKind::Sync(SyncPool::new(opts.clone()).await?));
        } else if service_type.tcp_async_pool_type() {
            service.pool = Some(PoolKind::Async(AsyncPool::new(opts).await?));
        }

        Ok(service)
    }

    pub fn server(&self) -> Option<&Server> {
        self.server.as_ref()
    }

    pub fn client(&self) -> Option<&ClientKind> {
        self.client.as_ref()
    }

    pub fn client_mut(&mut self) -> Option<&mut ClientKind> {
        self.client.as_mut()
    }

    pub fn pool(&self) -> Option<&PoolKind> {
        self.pool.as_ref()
    }

    /// Splits the facade into its components.
    pub fn into_parts(self) -> (Option<Server>, Option<ClientKind>, Option<PoolKind>) {
        (self.server, self.client, self.pool)
    }
}
