//! Frame codecs.
//!
//! A wire message is `header + body`. The header carries the body length;
//! how it is encoded is up to the codec. `decode` inspects a prefix of
//! buffered bytes and reports `(body_len, header_len)`, with
//! `header_len == 0` meaning "cannot decode yet, read more". A parse error
//! is indistinguishable from an incomplete header; the reader buffer's size
//! ceiling is what bounds garbage input.

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub trait HeaderCodec: Send + Sync {
    /// Decodes the header at the front of `buf`, returning
    /// `(body_len, header_len)`. Returns `(0, 0)` when more bytes are
    /// needed.
    fn decode(&self, buf: &[u8]) -> (u32, u32);

    /// Encodes `body` into a complete frame, header included.
    fn encode(&self, body: &[u8]) -> Bytes;
}

/// Default codec: 4-byte big-endian unsigned body length.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fixed32Codec;

impl HeaderCodec for Fixed32Codec {
    fn decode(&self, buf: &[u8]) -> (u32, u32) {
        if buf.len() < 4 {
            return (0, 0);
        }
        let mut header = &buf[..4];
        (header.get_u32(), 4)
    }

    fn encode(&self, body: &[u8]) -> Bytes {
        let mut frame = BytesMut::with_capacity(4 + body.len());
        frame.put_u32(body.len() as u32);
        frame.put_slice(body);
        frame.freeze()
    }
}

/// LEB128 varint body length, 1..=5 header bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct VarintCodec;

impl HeaderCodec for VarintCodec {
    fn decode(&self, buf: &[u8]) -> (u32, u32) {
        let mut value: u32 = 0;
        for (i, &byte) in buf.iter().take(5).enumerate() {
            value |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return (value, i as u32 + 1);
            }
        }
        (0, 0)
    }

    fn encode(&self, body: &[u8]) -> Bytes {
        let mut frame = BytesMut::with_capacity(5 + body.len());
        let mut v = body.len() as u32;
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                frame.put_u8(byte);
                break;
            }
            frame.put_u8(byte | 0x80);
        }
        frame.put_slice(body);
        frame.freeze()
    }
}
