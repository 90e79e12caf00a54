//! Wire framing: `encode`/`decode` a [`Message`] to/from a length-prefixed
//! binary frame.
//!
//! Layout: `magic(u32 BE) | header_len(u32 BE) | body_len(u32 BE) | header
//! bytes | body bytes`. `header` is the bincode encoding of [`Header`];
//! `body` is whatever the payload codec produced upstream — the frame
//! codec itself never interprets it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::header::Header;
use crate::Message;

/// Fixed magic number identifying a meshrpc frame.
pub const MAGIC: u32 = 0x1122_3344;

const PREFIX_LEN: usize = 12;

/// Encode `msg` into a self-contained frame.
pub fn encode(msg: &Message) -> Result<Bytes> {
    let header_bytes =
        bincode::serialize(&msg.header).map_err(|e| Error::InvalidFrame(e.to_string()))?;

    let header_len: u32 = header_bytes
        .len()
        .try_into()
        .map_err(|_| Error::InvalidFrame("header too large".into()))?;
    let body_len: u32 = msg
        .body
        .len()
        .try_into()
        .map_err(|_| Error::InvalidFrame("body too large".into()))?;

    let mut out = BytesMut::with_capacity(PREFIX_LEN + header_bytes.len() + msg.body.len());
    out.put_u32(MAGIC);
    out.put_u32(header_len);
    out.put_u32(body_len);
    out.put_slice(&header_bytes);
    out.put_slice(&msg.body);
    Ok(out.freeze())
}

/// Decode a single frame from `buf`, which must contain exactly one frame
/// (the transport layer is responsible for delimiting frames on the byte
/// stream before this is called).
pub fn decode(mut buf: Bytes) -> Result<Message> {
    if buf.len() < PREFIX_LEN {
        return Err(Error::InvalidFrame("frame shorter than prefix".into()));
    }

    let magic = buf.get_u32();
    if magic != MAGIC {
        return Err(Error::InvalidMagic);
    }

    let header_len = buf.get_u32() as usize;
    let body_len = buf.get_u32() as usize;

    if buf.len() != header_len + body_len {
        return Err(Error::InvalidFrame(format!(
            "declared lengths {}+{} do not match remaining {} bytes",
            header_len,
            body_len,
            buf.len()
        )));
    }

    let header_bytes = buf.split_to(header_len);
    let header: Header =
        bincode::deserialize(&header_bytes).map_err(|e| Error::InvalidFrame(e.to_string()))?;
    let body = buf.split_to(body_len);

    Ok(Message { header, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;

    #[test]
    fn round_trip() {
        let header = Header::request(7, "Echo", "Ping").with_codec("application/json");
        let msg = Message::new(header, Bytes::from_static(b"{\"n\":1}"));

        let framed = encode(&msg).unwrap();
        let decoded = decode(framed).unwrap();

        assert_eq!(decoded, msg);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = BytesMut::new();
        buf.put_u32(0xdead_beef);
        buf.put_u32(0);
        buf.put_u32(0);
        let err = decode(buf.freeze()).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic));
    }

    #[test]
    fn rejects_short_prefix() {
        let buf = Bytes::from_static(b"short");
        let err = decode(buf).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAGIC);
        buf.put_u32(5);
        buf.put_u32(5);
        buf.put_slice(b"ab");
        let err = decode(buf.freeze()).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }
}
