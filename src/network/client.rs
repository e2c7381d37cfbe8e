use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::network::{with_deadline, ReaderBuffer};
use crate::service::{NetError, NetResult, Options};

/// Request/response client over a framed socket.
///
/// No background workers: every operation runs on the caller, and `&mut
/// self` makes the one-caller-at-a-time discipline part of the signature.
/// `read`/`read_full` are raw socket reads; `write` and `write_read` go
/// through the frame codec.
#[derive(Debug)]
pub struct Client {
    opts: Options,
    stream: TcpStream,
    buffer: ReaderBuffer,
    peer_addr: SocketAddr,
    closed: bool,
    tag: String,
}

impl Client {
    pub async fn connect(addr: &str, opts: Options) -> NetResult<Client> {
        let stream = TcpStream::connect(addr).await.map_err(NetError::Connect)?;
        let peer_addr = stream.peer_addr().map_err(NetError::Connect)?;
        let buffer = ReaderBuffer::new(opts.init_read_buf_len, opts.max_read_buf_len);
        let tag = opts.tag.clone();
        Ok(Client {
            opts,
            stream,
            buffer,
            peer_addr,
            closed: false,
            tag,
        })
    }

    /// Raw read of up to `buf.len()` bytes, no framing.
    pub async fn read(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        if self.closed {
            return Err(NetError::ConnClosed);
        }
        with_deadline(self.opts.read_timeout, self.stream.read(buf))
            .await
            .map_err(NetError::Read)
    }

    /// Reads exactly `buf.len()` bytes or fails.
    pub async fn read_full(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        if self.closed {
            return Err(NetError::ConnClosed);
        }
        with_deadline(self.opts.read_timeout, self.stream.read_exact(buf))
            .await
            .map_err(NetError::Read)
    }

    /// Frames `data` and writes it in a single call.
    pub async fn write(&mut self, data: &[u8]) -> NetResult<()> {
        if self.closed {
            return Err(NetError::ConnClosed);
        }
        let frame = self.opts.header_codec.encode(data);
        with_deadline(self.opts.write_timeout, self.stream.write_all(&frame))
            .await
            .map_err(NetError::Write)
    }

    /// Writes `req` framed, then reads frames until one complete response
    /// body is available and returns it.
    pub async fn write_read(&mut self, req: &[u8]) -> NetResult<Vec<u8>> {
        self.write(req).await?;

        loop {
            let n = if self.opts.read_timeout.is_zero() {
                self.buffer.read_from(&mut self.stream).await?
            } else {
                match time::timeout(
                    self.opts.read_timeout,
                    self.buffer.read_from(&mut self.stream),
                )
                .await
                {
                    Ok(res) => res?,
                    Err(_) => {
                        return Err(NetError::Read(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "deadline exceeded",
                        )))
                    }
                }
            };
            if n == 0 {
                return Err(NetError::Read(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )));
            }

            let (body_len, header_len) = self.opts.header_codec.decode(self.buffer.data());
            if header_len == 0 {
                continue;
            }
            let msg_len = body_len as usize + header_len as usize;
            if msg_len > self.opts.max_read_buf_len {
                return Err(NetError::TooLarge);
            }
            if self.buffer.len() < msg_len {
                continue;
            }
            let mut body = vec![0u8; body_len as usize];
            self.buffer
                .read(header_len as usize, body_len as usize, &mut body);
            return Ok(body);
        }
    }

    /// Closes the socket. Idempotent; no handler callbacks fire.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.stream.shutdown().await;
        self.buffer.release();
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}
