//! RESP (REdis Serialization Protocol) values and their wire codec.
//!
//! Decoding works on a borrowed byte slice and never keeps state between
//! calls: a buffer that is too short yields `Ok(None)` and the caller simply
//! retries once more bytes have arrived. Successful decodes report how many
//! bytes were consumed so the caller can keep the exact source bytes around
//! for replication.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::input::FrameDecoder;

const CRLF: &[u8] = b"\r\n";

/// Arrays nested deeper than this are rejected instead of recursing further.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Errors that make a byte stream unparseable. All of them are fatal for the connection.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum RespError {
    #[error("invalid length '{0}'")]
    InvalidLength(String),
    #[error("bulk payload does not match declared length {0}")]
    LengthMismatch(usize),
    #[error("invalid integer '{0}'")]
    InvalidInteger(String),
    #[error("invalid double '{0}'")]
    InvalidDouble(String),
    #[error("invalid boolean '{0}'")]
    InvalidBoolean(String),
    #[error("invalid verbatim string")]
    InvalidVerbatimString,
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unexpected type byte 0x{0:02X}")]
    UnexpectedTypeByte(u8),
    #[error("maximum nesting depth exceeded")]
    NestingTooDeep,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    NullBulkString,
    Array(Vec<RespValue>),
    NullArray,
    Null,
    Boolean(bool),
    Double(f64),
    BigNumber(String),
    BulkError(Bytes),
    VerbatimString { format: String, text: Bytes },
    Map(Vec<(RespValue, RespValue)>),
    Set(Vec<RespValue>),
    Push(Vec<RespValue>),
}

impl RespValue {
    pub fn bulk(value: impl Into<Bytes>) -> Self {
        RespValue::BulkString(value.into())
    }

    /// Builds the array-of-bulk-strings shape every client command uses.
    pub fn command(parts: &[&str]) -> Self {
        RespValue::Array(
            parts
                .iter()
                .map(|part| RespValue::bulk(part.to_string()))
                .collect(),
        )
    }

    /// Returns the textual content of a simple or bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s.as_str()),
            RespValue::BulkString(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buffer = BytesMut::new();
        self.encode_into(&mut buffer);
        buffer.freeze()
    }

    pub fn encode_into(&self, buffer: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => put_line(buffer, b'+', s.as_bytes()),
            RespValue::Error(s) => put_line(buffer, b'-', s.as_bytes()),
            RespValue::Integer(n) => put_line(buffer, b':', n.to_string().as_bytes()),
            RespValue::BulkString(bytes) => put_blob(buffer, b'$', bytes),
            RespValue::NullBulkString => buffer.put_slice(b"$-1\r\n"),
            RespValue::Array(items) => put_aggregate(buffer, b'*', items),
            RespValue::NullArray => buffer.put_slice(b"*-1\r\n"),
            RespValue::Null => buffer.put_slice(b"_\r\n"),
            RespValue::Boolean(value) => {
                put_line(buffer, b'#', if *value { b"t" } else { b"f" })
            }
            RespValue::Double(value) => put_line(buffer, b',', format_double(*value).as_bytes()),
            RespValue::BigNumber(digits) => put_line(buffer, b'(', digits.as_bytes()),
            RespValue::BulkError(bytes) => put_blob(buffer, b'!', bytes),
            RespValue::VerbatimString { format, text } => {
                let mut body = Vec::with_capacity(format.len() + 1 + text.len());
                body.extend_from_slice(format.as_bytes());
                body.push(b':');
                body.extend_from_slice(text);
                put_blob(buffer, b'=', &body);
            }
            RespValue::Map(pairs) => {
                put_line(buffer, b'%', pairs.len().to_string().as_bytes());
                for (key, value) in pairs {
                    key.encode_into(buffer);
                    value.encode_into(buffer);
                }
            }
            RespValue::Set(items) => put_aggregate(buffer, b'~', items),
            RespValue::Push(items) => put_aggregate(buffer, b'>', items),
        }
    }

    /// Attempts to decode one value from the start of `buffer`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((value, consumed)))` - a complete value occupying the first `consumed` bytes
    /// * `Ok(None)` - the buffer does not hold a complete value yet
    /// * `Err(RespError)` - the bytes can never form a valid value
    pub fn decode(buffer: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        decode_at(buffer, 0, 0)
    }
}

/// Stateless RESP decoder handed to [`crate::input::ConnectionReader::read_frame`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

impl FrameDecoder for RespCodec {
    type Item = RespValue;

    fn decode(&self, buffer: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        RespValue::decode(buffer)
    }
}

fn put_line(buffer: &mut BytesMut, prefix: u8, content: &[u8]) {
    buffer.put_u8(prefix);
    buffer.put_slice(content);
    buffer.put_slice(CRLF);
}

fn put_blob(buffer: &mut BytesMut, prefix: u8, content: &[u8]) {
    put_line(buffer, prefix, content.len().to_string().as_bytes());
    buffer.put_slice(content);
    buffer.put_slice(CRLF);
}

fn put_aggregate(buffer: &mut BytesMut, prefix: u8, items: &[RespValue]) {
    put_line(buffer, prefix, items.len().to_string().as_bytes());
    for item in items {
        item.encode_into(buffer);
    }
}

fn format_double(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        value.to_string()
    }
}

type Decoded<T> = Result<Option<(T, usize)>, RespError>;

/// Decodes the value starting at `cursor`; on success the returned position
/// is the first byte after the value.
fn decode_at(buffer: &[u8], cursor: usize, depth: usize) -> Decoded<RespValue> {
    let Some(&type_byte) = buffer.get(cursor) else {
        return Ok(None);
    };

    if depth > MAX_NESTING_DEPTH {
        return Err(RespError::NestingTooDeep);
    }

    let start = cursor + 1;

    match type_byte {
        b'+' => map_line(buffer, start, |line| Ok(RespValue::SimpleString(utf8(line)?))),
        b'-' => map_line(buffer, start, |line| Ok(RespValue::Error(utf8(line)?))),
        b':' => map_line(buffer, start, |line| Ok(RespValue::Integer(parse_integer(line)?))),
        b'$' => Ok(read_blob(buffer, start)?.map(|(blob, end)| {
            let value = match blob {
                Some(bytes) => RespValue::BulkString(bytes),
                None => RespValue::NullBulkString,
            };
            (value, end)
        })),
        b'*' => {
            let Some((count, body_start)) = read_count(buffer, start)? else {
                return Ok(None);
            };

            // Negative counts (including -1) decode to an empty array, not NullArray.
            if count < 0 {
                return Ok(Some((RespValue::Array(Vec::new()), body_start)));
            }

            Ok(read_elements(buffer, body_start, count as usize, depth)?
                .map(|(items, end)| (RespValue::Array(items), end)))
        }
        b'_' => map_line(buffer, start, |_| Ok(RespValue::Null)),
        b'#' => map_line(buffer, start, |line| match line {
            b"t" => Ok(RespValue::Boolean(true)),
            b"f" => Ok(RespValue::Boolean(false)),
            other => Err(RespError::InvalidBoolean(lossy(other))),
        }),
        b',' => map_line(buffer, start, |line| Ok(RespValue::Double(parse_double(line)?))),
        b'(' => map_line(buffer, start, |line| {
            let digits = utf8(line)?;
            let unsigned = digits.strip_prefix('-').unwrap_or(&digits);

            if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
                return Err(RespError::InvalidInteger(digits));
            }

            Ok(RespValue::BigNumber(digits))
        }),
        b'!' => match read_blob(buffer, start)? {
            Some((Some(bytes), end)) => Ok(Some((RespValue::BulkError(bytes), end))),
            Some((None, _)) => Err(RespError::InvalidLength("-1".to_string())),
            None => Ok(None),
        },
        b'=' => match read_blob(buffer, start)? {
            Some((Some(bytes), end)) => {
                if bytes.len() < 4 || bytes[3] != b':' {
                    return Err(RespError::InvalidVerbatimString);
                }

                let format = utf8(&bytes[..3])?;
                let text = bytes.slice(4..);

                Ok(Some((RespValue::VerbatimString { format, text }, end)))
            }
            Some((None, _)) => Err(RespError::InvalidVerbatimString),
            None => Ok(None),
        },
        b'%' => {
            let Some((count, body_start)) = read_count(buffer, start)? else {
                return Ok(None);
            };
            let count = non_negative(count)?;
            let element_count = count
                .checked_mul(2)
                .ok_or_else(|| RespError::InvalidLength(count.to_string()))?;

            let Some((flat, end)) = read_elements(buffer, body_start, element_count, depth)? else {
                return Ok(None);
            };

            let mut pairs = Vec::with_capacity(count);
            let mut iter = flat.into_iter();
            while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                pairs.push((key, value));
            }

            Ok(Some((RespValue::Map(pairs), end)))
        }
        b'~' | b'>' => {
            let Some((count, body_start)) = read_count(buffer, start)? else {
                return Ok(None);
            };
            let count = non_negative(count)?;

            Ok(
                read_elements(buffer, body_start, count, depth)?.map(|(items, end)| {
                    if type_byte == b'~' {
                        (RespValue::Set(items), end)
                    } else {
                        (RespValue::Push(items), end)
                    }
                }),
            )
        }
        // Unknown leading bytes are treated as "not enough data yet".
        _ => Ok(None),
    }
}

fn map_line<F>(buffer: &[u8], start: usize, build: F) -> Decoded<RespValue>
where
    F: FnOnce(&[u8]) -> Result<RespValue, RespError>,
{
    match read_line(buffer, start) {
        Some((line, end)) => Ok(Some((build(line)?, end))),
        None => Ok(None),
    }
}

fn read_elements(
    buffer: &[u8],
    mut cursor: usize,
    count: usize,
    depth: usize,
) -> Decoded<Vec<RespValue>> {
    let mut items = Vec::with_capacity(count.min(1024));

    for _ in 0..count {
        let Some((item, next)) = decode_at(buffer, cursor, depth + 1)? else {
            return Ok(None);
        };

        items.push(item);
        cursor = next;
    }

    Ok(Some((items, cursor)))
}

fn read_count(buffer: &[u8], start: usize) -> Decoded<i64> {
    match read_line(buffer, start) {
        Some((line, end)) => {
            let count = parse_integer(line).map_err(|_| RespError::InvalidLength(lossy(line)))?;
            Ok(Some((count, end)))
        }
        None => Ok(None),
    }
}

fn non_negative(count: i64) -> Result<usize, RespError> {
    usize::try_from(count).map_err(|_| RespError::InvalidLength(count.to_string()))
}

/// Reads a length-prefixed payload terminated by CRLF. A length of -1 yields `None`.
fn read_blob(buffer: &[u8], start: usize) -> Decoded<Option<Bytes>> {
    let Some((length, body_start)) = read_count(buffer, start)? else {
        return Ok(None);
    };

    if length == -1 {
        return Ok(Some((None, body_start)));
    }

    let length = non_negative(length)?;
    let body_end = body_start
        .checked_add(length)
        .ok_or_else(|| RespError::InvalidLength(length.to_string()))?;

    if buffer.len() < body_end + CRLF.len() {
        return Ok(None);
    }

    if &buffer[body_end..body_end + CRLF.len()] != CRLF {
        return Err(RespError::LengthMismatch(length));
    }

    let body = Bytes::copy_from_slice(&buffer[body_start..body_end]);

    Ok(Some((Some(body), body_end + CRLF.len())))
}

/// Returns the bytes between `start` and the next CRLF, plus the position after that CRLF.
pub(crate) fn read_line(buffer: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let offset = buffer
        .get(start..)?
        .windows(CRLF.len())
        .position(|window| window == CRLF)?;

    Some((&buffer[start..start + offset], start + offset + CRLF.len()))
}

fn utf8(bytes: &[u8]) -> Result<String, RespError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| RespError::InvalidUtf8)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub(crate) fn parse_integer(bytes: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| RespError::InvalidInteger(lossy(bytes)))
}

fn parse_double(bytes: &[u8]) -> Result<f64, RespError> {
    match bytes {
        b"inf" | b"+inf" => Ok(f64::INFINITY),
        b"-inf" => Ok(f64::NEG_INFINITY),
        b"nan" => Ok(f64::NAN),
        other => std::str::from_utf8(other)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| RespError::InvalidDouble(lossy(other))),
    }
}
