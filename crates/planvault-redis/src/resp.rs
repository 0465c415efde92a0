//! RESP2 encoder and parser.
//!
//! Only the subset a client needs: commands are encoded as arrays of bulk
//! strings, and replies are parsed from any RESP2 type.
//!
//! - Simple Strings (`+`)
//! - Errors (`-`)
//! - Integers (`:`)
//! - Bulk Strings (`$`, `$-1` is null)
//! - Arrays (`*`, `*-1` is null)

use bytes::{BufMut, Bytes, BytesMut};

/// Largest bulk string accepted from the server.
pub const MAX_BULK_SIZE: usize = 64 * 1024 * 1024;

/// Largest array accepted from the server.
pub const MAX_ELEMENTS: usize = 1024 * 1024;

/// Deepest array nesting accepted from the server.
pub const MAX_NESTING_DEPTH: usize = 32;

/// A RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`
    SimpleString(String),
    /// `-ERR message`
    Error(String),
    /// `:42`
    Integer(i64),
    /// `$3\r\nfoo`
    BulkString(Bytes),
    /// `*2\r\n...`
    Array(Vec<RespValue>),
    /// `$-1` or `*-1`
    Null,
}

impl RespValue {
    /// Returns the bulk or simple string payload as UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Returns the integer payload.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// Outcome of parsing one value from a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// A complete value and the number of bytes it occupied.
    Complete(RespValue, usize),
    /// More data is needed.
    Incomplete,
    /// The data is not valid RESP2.
    Error(String),
}

/// Encodes a command as an array of bulk strings.
///
/// ```
/// use planvault_redis::resp::encode_command;
///
/// let wire = encode_command(&[b"GET", b"plan_1"]);
/// assert_eq!(&wire[..], b"*2\r\n$3\r\nGET\r\n$6\r\nplan_1\r\n");
/// ```
#[must_use]
pub fn encode_command(args: &[&[u8]]) -> Bytes {
    let capacity = 16 + args.iter().map(|a| a.len() + 16).sum::<usize>();
    let mut buf = BytesMut::with_capacity(capacity);
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for arg in args {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
    buf.freeze()
}

/// Parses one value from the front of `data`.
#[must_use]
pub fn parse(data: &[u8]) -> ParseResult {
    match parse_value(data, 0) {
        Ok(Some((value, consumed))) => ParseResult::Complete(value, consumed),
        Ok(None) => ParseResult::Incomplete,
        Err(message) => ParseResult::Error(message),
    }
}

type Parsed = Result<Option<(RespValue, usize)>, String>;

fn parse_value(data: &[u8], depth: usize) -> Parsed {
    let Some(&type_byte) = data.first() else {
        return Ok(None);
    };
    if depth > MAX_NESTING_DEPTH {
        return Err("maximum nesting depth exceeded".to_string());
    }

    let Some(line_end) = find_crlf(&data[1..]) else {
        return Ok(None);
    };
    let line = &data[1..=line_end];
    let header_len = line_end + 3;

    match type_byte {
        b'+' => Ok(Some((
            RespValue::SimpleString(String::from_utf8_lossy(line).into_owned()),
            header_len,
        ))),
        b'-' => Ok(Some((
            RespValue::Error(String::from_utf8_lossy(line).into_owned()),
            header_len,
        ))),
        b':' => {
            let n = parse_int(line).ok_or("invalid integer")?;
            Ok(Some((RespValue::Integer(n), header_len)))
        }
        b'$' => parse_bulk(data, line, header_len),
        b'*' => parse_array(data, line, header_len, depth),
        other => Err(format!("unexpected type byte 0x{other:02x}")),
    }
}

fn parse_bulk(data: &[u8], line: &[u8], header_len: usize) -> Parsed {
    let len = parse_int(line).ok_or("invalid bulk string length")?;
    if len == -1 {
        return Ok(Some((RespValue::Null, header_len)));
    }
    let len = usize::try_from(len).map_err(|_| "invalid bulk string length".to_string())?;
    if len > MAX_BULK_SIZE {
        return Err(format!("bulk string too large: {len} > {MAX_BULK_SIZE}"));
    }

    let end = header_len + len;
    if data.len() < end + 2 {
        return Ok(None);
    }
    if &data[end..end + 2] != b"\r\n" {
        return Err("missing CRLF after bulk string".to_string());
    }
    let payload = Bytes::copy_from_slice(&data[header_len..end]);
    Ok(Some((RespValue::BulkString(payload), end + 2)))
}

fn parse_array(data: &[u8], line: &[u8], header_len: usize, depth: usize) -> Parsed {
    let len = parse_int(line).ok_or("invalid array length")?;
    if len == -1 {
        return Ok(Some((RespValue::Null, header_len)));
    }
    let len = usize::try_from(len).map_err(|_| "invalid array length".to_string())?;
    if len > MAX_ELEMENTS {
        return Err(format!("array too large: {len} > {MAX_ELEMENTS}"));
    }

    let mut elements = Vec::with_capacity(len.min(64));
    let mut offset = header_len;
    for _ in 0..len {
        match parse_value(&data[offset..], depth + 1)? {
            Some((value, consumed)) => {
                elements.push(value);
                offset += consumed;
            }
            None => return Ok(None),
        }
    }
    Ok(Some((RespValue::Array(elements), offset)))
}

fn parse_int(line: &[u8]) -> Option<i64> {
    std::str::from_utf8(line).ok()?.parse().ok()
}

/// Position of the first `\r\n` in `data`.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn complete(data: &[u8]) -> RespValue {
        match parse(data) {
            ParseResult::Complete(value, consumed) => {
                assert_eq!(consumed, data.len());
                value
            }
            other => panic!("expected complete value, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_types() {
        assert_eq!(complete(b"+OK\r\n"), RespValue::SimpleString("OK".into()));
        assert_eq!(
            complete(b"-WRONGPASS invalid password\r\n"),
            RespValue::Error("WRONGPASS invalid password".into())
        );
        assert_eq!(complete(b":-12\r\n"), RespValue::Integer(-12));
    }

    #[test]
    fn test_bulk_strings() {
        assert_eq!(
            complete(b"$6\r\nfoo\r\nb\r\n"),
            RespValue::BulkString(Bytes::from_static(b"foo\r\nb"))
        );
        assert_eq!(complete(b"$0\r\n\r\n"), RespValue::BulkString(Bytes::new()));
        assert_eq!(complete(b"$-1\r\n"), RespValue::Null);
    }

    #[test]
    fn test_nested_array() {
        let value = complete(b"*2\r\n:2\r\n$4\r\nabcd\r\n");
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Integer(2),
                RespValue::BulkString(Bytes::from_static(b"abcd")),
            ])
        );
        assert_eq!(complete(b"*-1\r\n"), RespValue::Null);
        assert_eq!(
            complete(b"*1\r\n*1\r\n+x\r\n"),
            RespValue::Array(vec![RespValue::Array(vec![RespValue::SimpleString("x".into())])])
        );
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(parse(b""), ParseResult::Incomplete);
        assert_eq!(parse(b"+OK"), ParseResult::Incomplete);
        assert_eq!(parse(b"$5\r\nab"), ParseResult::Incomplete);
        assert_eq!(parse(b"*2\r\n:1\r\n"), ParseResult::Incomplete);
    }

    #[test]
    fn test_trailing_data_is_not_consumed() {
        match parse(b":1\r\n:2\r\n") {
            ParseResult::Complete(RespValue::Integer(1), 4) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_protocol_errors() {
        assert!(matches!(parse(b"?x\r\n"), ParseResult::Error(_)));
        assert!(matches!(parse(b":abc\r\n"), ParseResult::Error(_)));
        assert!(matches!(parse(b"$3\r\nabcde\r\n"), ParseResult::Error(_)));
        assert!(matches!(parse(b"$-5\r\n"), ParseResult::Error(_)));
    }

    #[test]
    fn test_nesting_limit() {
        let mut data = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            data.extend_from_slice(b"*1\r\n");
        }
        data.extend_from_slice(b":1\r\n");
        assert!(matches!(parse(&data), ParseResult::Error(_)));
    }

    #[test]
    fn test_encoded_command_parses_back() {
        let wire = encode_command(&[b"HSET", b"plan_1", b"body", b"{}"]);
        let value = complete(&wire);
        let RespValue::Array(items) = value else {
            panic!("expected array");
        };
        let args: Vec<_> = items.iter().filter_map(RespValue::as_str).collect();
        assert_eq!(args, vec!["HSET", "plan_1", "body", "{}"]);
    }

    proptest! {
        #[test]
        fn prop_every_prefix_is_incomplete(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let wire = encode_command(&[payload.as_slice()]);
            for cut in 0..wire.len() {
                prop_assert_eq!(parse(&wire[..cut]), ParseResult::Incomplete);
            }
        }
    }
}
