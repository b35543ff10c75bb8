//! RESP (REdis Serialization Protocol) frame codec.
//!
//! The decoder is incremental: it parses the single leading frame out of a
//! byte buffer and reports exactly how many bytes that frame occupied, so a
//! caller can advance its read buffer and resume with the next frame. A
//! buffer that is valid so far but ends mid-frame yields the distinguished
//! [`RespError::Incomplete`], telling the caller to read more bytes and retry.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("incomplete frame")]
    Incomplete,
    #[error("unknown frame type byte {0:#04x}")]
    UnknownType(u8),
    #[error("invalid length header")]
    InvalidLength,
    #[error("invalid integer payload")]
    InvalidInteger,
    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,
    #[error("bulk payload not terminated by CRLF")]
    MissingTerminator,
}

/// A single RESP frame.
///
/// Null bulk strings (`$-1\r\n`) and null arrays (`*-1\r\n`) are distinct
/// variants so that every decoded frame re-encodes to the identical bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    NullBulkString,
    Array(Vec<RespValue>),
    NullArray,
}

impl RespValue {
    /// Builds a bulk string frame from anything byte-like.
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        RespValue::BulkString(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Builds the array of bulk strings that carries a command on the wire.
    pub fn command(parts: &[&str]) -> Self {
        RespValue::Array(parts.iter().map(RespValue::bulk).collect())
    }

    /// Attempts to decode the single leading frame of `buf`.
    ///
    /// On success returns the frame and the exact number of bytes it
    /// occupied. Returns [`RespError::Incomplete`] when the buffer holds a
    /// valid but truncated prefix; any other error means the input is
    /// malformed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), RespError> {
        match *buf.first().ok_or(RespError::Incomplete)? {
            b'+' => {
                let (line, consumed) = read_line(buf, 1)?;
                Ok((RespValue::SimpleString(utf8(line)?), consumed))
            }
            b'-' => {
                let (line, consumed) = read_line(buf, 1)?;
                Ok((RespValue::Error(utf8(line)?), consumed))
            }
            b':' => {
                let (line, consumed) = read_line(buf, 1)?;
                Ok((RespValue::Integer(parse_integer(line)?), consumed))
            }
            b'$' => decode_bulk(buf),
            b'*' => decode_array(buf),
            other => Err(RespError::UnknownType(other)),
        }
    }

    /// Encodes the frame to its canonical wire form.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.write_to(&mut out);
        out.freeze()
    }

    fn write_to(&self, out: &mut BytesMut) {
        match self {
            RespValue::SimpleString(text) => {
                out.put_u8(b'+');
                out.put_slice(text.as_bytes());
                out.put_slice(b"\r\n");
            }
            RespValue::Error(text) => {
                out.put_u8(b'-');
                out.put_slice(text.as_bytes());
                out.put_slice(b"\r\n");
            }
            RespValue::Integer(value) => {
                out.put_u8(b':');
                out.put_slice(value.to_string().as_bytes());
                out.put_slice(b"\r\n");
            }
            RespValue::BulkString(payload) => {
                out.put_u8(b'$');
                out.put_slice(payload.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                out.put_slice(payload);
                out.put_slice(b"\r\n");
            }
            RespValue::NullBulkString => out.put_slice(b"$-1\r\n"),
            RespValue::Array(items) => {
                out.put_u8(b'*');
                out.put_slice(items.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                for item in items {
                    item.write_to(out);
                }
            }
            RespValue::NullArray => out.put_slice(b"*-1\r\n"),
        }
    }
}

/// Encodes an inline RDB snapshot: `$<len>\r\n<bytes>` with NO trailing CRLF.
///
/// This form is used exactly once per replication handshake, right after the
/// FULLRESYNC reply.
pub fn encode_rdb(content: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(content.len() + 16);
    out.put_u8(b'$');
    out.put_slice(content.len().to_string().as_bytes());
    out.put_slice(b"\r\n");
    out.put_slice(content);
    out.freeze()
}

/// Decodes the inline RDB snapshot frame produced by [`encode_rdb`].
pub fn decode_rdb(buf: &[u8]) -> Result<(Bytes, usize), RespError> {
    match *buf.first().ok_or(RespError::Incomplete)? {
        b'$' => {}
        other => return Err(RespError::UnknownType(other)),
    }
    let (header, after_header) = read_line(buf, 1)?;
    let length = parse_length(header)?;
    if length < 0 {
        return Err(RespError::InvalidLength);
    }
    let end = after_header + length as usize;
    if buf.len() < end {
        return Err(RespError::Incomplete);
    }
    Ok((Bytes::copy_from_slice(&buf[after_header..end]), end))
}

/// Returns the payload between `start` and the first CR immediately followed
/// by LF, along with the absolute index just past that terminator.
fn read_line(buf: &[u8], start: usize) -> Result<(&[u8], usize), RespError> {
    let mut i = start;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Ok((&buf[start..i], i + 2));
        }
        i += 1;
    }
    Err(RespError::Incomplete)
}

fn utf8(line: &[u8]) -> Result<String, RespError> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|_| RespError::InvalidUtf8)
}

fn parse_integer(line: &[u8]) -> Result<i64, RespError> {
    let text = std::str::from_utf8(line).map_err(|_| RespError::InvalidInteger)?;
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RespError::InvalidInteger);
    }
    text.parse::<i64>().map_err(|_| RespError::InvalidInteger)
}

/// Parses a length header. `-1` is the only accepted negative value (the
/// null marker); anything else must be plain decimal digits.
fn parse_length(header: &[u8]) -> Result<i64, RespError> {
    if header == b"-1" {
        return Ok(-1);
    }
    let text = std::str::from_utf8(header).map_err(|_| RespError::InvalidLength)?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RespError::InvalidLength);
    }
    text.parse::<i64>().map_err(|_| RespError::InvalidLength)
}

fn decode_bulk(buf: &[u8]) -> Result<(RespValue, usize), RespError> {
    let (header, after_header) = read_line(buf, 1)?;
    let length = parse_length(header)?;
    if length == -1 {
        return Ok((RespValue::NullBulkString, after_header));
    }
    let length = length as usize;
    let end = after_header + length;
    if buf.len() < end + 2 {
        return Err(RespError::Incomplete);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(RespError::MissingTerminator);
    }
    let payload = Bytes::copy_from_slice(&buf[after_header..end]);
    Ok((RespValue::BulkString(payload), end + 2))
}

fn decode_array(buf: &[u8]) -> Result<(RespValue, usize), RespError> {
    let (header, after_header) = read_line(buf, 1)?;
    let count = parse_length(header)?;
    if count == -1 {
        return Ok((RespValue::NullArray, after_header));
    }
    // Capacity hint only; a hostile count header must not allocate upfront.
    let mut items = Vec::with_capacity((count as usize).min(64));
    let mut pos = after_header;
    for _ in 0..count {
        let (item, used) = RespValue::decode(&buf[pos..])?;
        items.push(item);
        pos += used;
    }
    Ok((RespValue::Array(items), pos))
}
