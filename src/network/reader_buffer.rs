use tokio::io::{AsyncRead, AsyncReadExt};

use crate::service::{NetError, NetResult};

/// Compacting read buffer with bounded growth.
///
/// Buffered data lives in `[begin, end)` of a backing array whose length
/// doubles on demand up to `max`. The buffer does not own its byte source;
/// `read_from` pulls the next chunk from any `AsyncRead` into the free
/// tail. Invariant: `begin <= end <= buf.len() <= max`.
#[derive(Debug)]
pub struct ReaderBuffer {
    buf: Vec<u8>,
    max: usize,
    begin: usize,
    end: usize,
}

impl ReaderBuffer {
    pub fn new(init: usize, max: usize) -> Self {
        let init = init.clamp(1, max.max(1));
        Self {
            buf: vec![0; init],
            max,
            begin: 0,
            end: 0,
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// View of the buffered bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.begin..self.end]
    }

    /// Discards `offset` leading bytes, then copies the next `n` bytes into
    /// `out`. Requires `len() >= offset + n`.
    pub fn read(&mut self, offset: usize, n: usize, out: &mut [u8]) {
        self.begin += offset;
        out[..n].copy_from_slice(&self.buf[self.begin..self.begin + n]);
        self.begin += n;
    }

    /// Pulls the next chunk from `reader` into the free tail, growing or
    /// compacting first. Returns the number of bytes read; `Ok(0)` means
    /// the source reached EOF. Fails with `TooLarge` when the buffered data
    /// already fills `max` and cannot make room.
    pub async fn read_from<R>(&mut self, reader: &mut R) -> NetResult<usize>
    where
        R: AsyncRead + Unpin,
    {
        if !self.grow() {
            return Err(NetError::TooLarge);
        }
        let n = reader
            .read(&mut self.buf[self.end..])
            .await
            .map_err(NetError::Read)?;
        self.end += n;
        Ok(n)
    }

    /// Drops the backing storage. Idempotent; the buffer must not be used
    /// afterwards.
    pub fn release(&mut self) {
        self.buf = Vec::new();
        self.begin = 0;
        self.end = 0;
    }

    // Makes room at the tail: compacts when data sits past the front,
    // otherwise doubles the backing array up to `max`.
    fn grow(&mut self) -> bool {
        if self.begin == 0 {
            let l = self.buf.len();
            if self.end >= l {
                if self.end >= self.max {
                    return false;
                }
                let doubled = (l + l).min(self.max);
                self.buf.resize(doubled, 0);
            }
            return true;
        }
        if self.begin == self.end {
            self.begin = 0;
            self.end = 0;
            return true;
        }
        self.buf.copy_within(self.begin..self.end, 0);
        self.end -= self.begin;
        self.begin = 0;
        true
    }
}
