//! # RESP codec
//!
//! Purpose: decode inbound command frames and encode outbound replies for
//! the five RESP types (§4.3), without pulling in a general-purpose framing
//! crate — the wire format here is fixed and small enough to hand-roll.
//!
//! ## Design Principles
//! 1. **Incremental**: `decode_frame` never blocks on more bytes than are
//!    already buffered; it reports "need more" by returning `Ok(None)` and
//!    leaves the buffer untouched so the caller can read more and retry.
//! 2. **Binary-Safe**: bulk strings are raw bytes, never assumed UTF-8.
//! 3. **Commands are always arrays of bulk strings**: any other inbound
//!    top-level type is a protocol error.

use bytes::{Buf, BytesMut};
use kv_common::KvError;

/// One decoded inbound command: the array of bulk-string arguments.
pub type Argv = Vec<Vec<u8>>;

/// Attempts to decode one command frame from the front of `buf`. Returns
/// `Ok(None)` if the buffer doesn't yet hold a complete frame (the caller
/// should read more bytes and retry); on success, the consumed bytes are
/// removed from `buf`.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Argv>, KvError> {
    let mut cursor = 0usize;
    match try_parse_array(buf, &mut cursor) {
        ParseOutcome::Complete(argv) => {
            buf.advance(cursor);
            Ok(Some(argv))
        }
        ParseOutcome::Incomplete => Ok(None),
        ParseOutcome::Invalid => Err(KvError::ProtocolError),
    }
}

enum ParseOutcome<T> {
    Complete(T),
    Incomplete,
    Invalid,
}

fn try_parse_array(buf: &BytesMut, cursor: &mut usize) -> ParseOutcome<Argv> {
    let Some(line) = read_line(buf, cursor) else { return ParseOutcome::Incomplete };
    if line.is_empty() || line[0] != b'*' {
        return ParseOutcome::Invalid;
    }
    let Some(count) = parse_i64(&line[1..]) else { return ParseOutcome::Invalid };
    if count < 0 {
        return ParseOutcome::Complete(Vec::new());
    }

    let mut argv = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match try_parse_bulk(buf, cursor) {
            ParseOutcome::Complete(item) => argv.push(item),
            ParseOutcome::Incomplete => return ParseOutcome::Incomplete,
            ParseOutcome::Invalid => return ParseOutcome::Invalid,
        }
    }
    ParseOutcome::Complete(argv)
}

fn try_parse_bulk(buf: &BytesMut, cursor: &mut usize) -> ParseOutcome<Vec<u8>> {
    let Some(line) = read_line(buf, cursor) else { return ParseOutcome::Incomplete };
    if line.is_empty() || line[0] != b'$' {
        return ParseOutcome::Invalid;
    }
    let Some(len) = parse_i64(&line[1..]) else { return ParseOutcome::Invalid };
    if len < 0 {
        return ParseOutcome::Complete(Vec::new());
    }
    let len = len as usize;

    if buf.len() < *cursor + len + 2 {
        return ParseOutcome::Incomplete;
    }
    let data = buf[*cursor..*cursor + len].to_vec();
    *cursor += len;
    if &buf[*cursor..*cursor + 2] != b"\r\n" {
        return ParseOutcome::Invalid;
    }
    *cursor += 2;
    ParseOutcome::Complete(data)
}

/// Reads one `\r\n`-terminated line starting at `*cursor`, advancing the
/// cursor past it, without copying from `buf` until the line is confirmed
/// complete.
fn read_line<'a>(buf: &'a BytesMut, cursor: &mut usize) -> Option<&'a [u8]> {
    let rest = &buf[*cursor..];
    let pos = rest.windows(2).position(|w| w == b"\r\n")?;
    let line = &rest[..pos];
    *cursor += pos + 2;
    Some(line)
}

fn parse_i64(data: &[u8]) -> Option<i64> {
    if data.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(data).ok()?;
    text.parse::<i64>().ok()
}

/// Encodes a `+Simple\r\n` reply.
pub fn encode_simple(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 3);
    out.push(b'+');
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Encodes a `-Error\r\n` reply from a bare message (no leading `-`).
pub fn encode_error(message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 3);
    out.push(b'-');
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Encodes a `KvError` the way the connection layer sends it: `-<message>\r\n`.
pub fn encode_kv_error(err: &KvError) -> Vec<u8> {
    encode_error(&err.wire_message())
}

/// Encodes a `:Integer\r\n` reply.
pub fn encode_integer(value: i64) -> Vec<u8> {
    format!(":{value}\r\n").into_bytes()
}

/// Encodes a `$len\r\nbytes\r\n` bulk string.
pub fn encode_bulk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.push(b'$');
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

/// Encodes the null bulk string, `$-1\r\n`.
pub fn encode_null_bulk() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

/// Encodes an array given already-encoded child replies.
pub fn encode_array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(items.iter().map(|i| i.len()).sum::<usize>() + 16);
    out.push(b'*');
    out.extend_from_slice(items.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// Encodes the empty array, `*0\r\n`.
pub fn encode_empty_array() -> Vec<u8> {
    b"*0\r\n".to_vec()
}

/// Re-encodes a decoded argv back into a RESP command array, for frames
/// that must be appended verbatim to the AOF.
pub fn encode_command(argv: &[Vec<u8>]) -> Vec<u8> {
    let bulks: Vec<Vec<u8>> = argv.iter().map(|arg| encode_bulk(arg)).collect();
    encode_array(&bulks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_command() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n"[..]);
        let argv = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(argv, vec![b"GET".to_vec(), b"k".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_frame_returns_none_and_leaves_buffer() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nke"[..]);
        let result = decode_frame(&mut buf).unwrap();
        assert!(result.is_none());
        assert!(!buf.is_empty());
    }

    #[test]
    fn two_frames_back_to_back_decode_one_at_a_time() {
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n"[..]);
        let first = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(first, vec![b"PING".to_vec()]);
        let second = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(second, vec![b"PING".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn malformed_type_byte_is_protocol_error() {
        let mut buf = BytesMut::from(&b"!garbage\r\n"[..]);
        assert!(decode_frame(&mut buf).is_err());
    }

    #[test]
    fn encode_helpers_produce_expected_wire_bytes() {
        assert_eq!(encode_simple("OK"), b"+OK\r\n".to_vec());
        assert_eq!(encode_integer(42), b":42\r\n".to_vec());
        assert_eq!(encode_bulk(b"hi"), b"$2\r\nhi\r\n".to_vec());
        assert_eq!(encode_null_bulk(), b"$-1\r\n".to_vec());
        assert_eq!(encode_empty_array(), b"*0\r\n".to_vec());
    }
}
