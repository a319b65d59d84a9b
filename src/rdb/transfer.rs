use bytes::Bytes;

use crate::input::FrameDecoder;
use crate::resp::{RespError, parse_integer, read_line};

/// Frames the snapshot a master sends after `FULLRESYNC`: `$<len>\r\n` and
/// then exactly `len` raw bytes with no trailing CRLF.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdbTransferCodec;

impl RdbTransferCodec {
    /// Builds the wire form of a snapshot payload.
    pub fn encode(payload: &[u8]) -> Bytes {
        let mut bytes = format!("${}\r\n", payload.len()).into_bytes();
        bytes.extend_from_slice(payload);
        Bytes::from(bytes)
    }
}

impl FrameDecoder for RdbTransferCodec {
    type Item = Bytes;

    fn decode(&self, buffer: &[u8]) -> Result<Option<(Bytes, usize)>, RespError> {
        let Some(&first_byte) = buffer.first() else {
            return Ok(None);
        };

        if first_byte != b'$' {
            return Err(RespError::UnexpectedTypeByte(first_byte));
        }

        let Some((line, body_start)) = read_line(buffer, 1) else {
            return Ok(None);
        };

        let length = parse_integer(line)?;
        let length =
            usize::try_from(length).map_err(|_| RespError::InvalidLength(length.to_string()))?;

        if buffer.len() - body_start < length {
            return Ok(None);
        }

        let body_end = body_start + length;
        let payload = Bytes::copy_from_slice(&buffer[body_start..body_end]);

        Ok(Some((payload, body_end)))
    }
}
