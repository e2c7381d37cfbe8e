use std::io;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Reader buffer growth or a decoded frame exceeded the configured
    /// ceiling.
    #[error("message too large")]
    TooLarge,

    #[error("conn closed")]
    ConnClosed,

    /// A sync-only operation was invoked on an async connection.
    #[error("invalid call on this conn type")]
    ConnInvalidCall,

    #[error("pool: invalid addr")]
    PoolInvalidAddr,

    #[error("pool: get conn timeout")]
    PoolTimeout,

    #[error("pool: closed")]
    PoolClosed,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("connect: {0}")]
    Connect(#[source] io::Error),

    #[error("read: {0}")]
    Read(#[source] io::Error),

    #[error("write: {0}")]
    Write(#[source] io::Error),

    #[error("accept: {0}")]
    Accept(String),

    /// `serve` ended by an interrupt signal.
    #[error("signal: {0}")]
    Signal(&'static str),
}

impl NetError {
    pub fn is_closed(&self) -> bool {
        matches!(self, NetError::ConnClosed | NetError::PoolClosed)
    }
}
