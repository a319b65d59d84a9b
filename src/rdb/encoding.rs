use bytes::Bytes;

use crate::rdb::{RdbCursor, RdbError};

#[derive(Debug, PartialEq)]
enum LengthEncoding {
    Length(usize),
    Int8,
    Int16,
    Int32,
    Lzf,
}

fn read_length_encoding(cursor: &mut RdbCursor<'_>) -> Result<LengthEncoding, RdbError> {
    let byte = cursor.read_u8()?;

    // The two most significant bits select the encoding
    match byte >> 6 {
        0b00 => Ok(LengthEncoding::Length((byte & 0b0011_1111) as usize)),
        0b01 => {
            // Low 6 bits of the first byte are the high bits of a 14-bit length
            let high = ((byte & 0b0011_1111) as usize) << 8;
            let low = cursor.read_u8()? as usize;

            Ok(LengthEncoding::Length(high | low))
        }
        0b10 => match byte {
            0x80 => {
                let length = u32::from_be_bytes(cursor.read_array::<4>()?);
                Ok(LengthEncoding::Length(length as usize))
            }
            0x81 => {
                let length = u64::from_be_bytes(cursor.read_array::<8>()?);
                usize::try_from(length)
                    .map(LengthEncoding::Length)
                    .map_err(|_| RdbError::InvalidLengthEncoding(byte))
            }
            _ => Err(RdbError::InvalidLengthEncoding(byte)),
        },
        _ => match byte & 0b0011_1111 {
            0 => Ok(LengthEncoding::Int8),
            1 => Ok(LengthEncoding::Int16),
            2 => Ok(LengthEncoding::Int32),
            3 => Ok(LengthEncoding::Lzf),
            _ => Err(RdbError::InvalidLengthEncoding(byte)),
        },
    }
}

/// Reads a plain length, as used by SELECTDB and RESIZEDB.
pub fn read_length(cursor: &mut RdbCursor<'_>) -> Result<usize, RdbError> {
    let first_byte = cursor.peek().ok_or(RdbError::UnexpectedEof)?;

    match read_length_encoding(cursor)? {
        LengthEncoding::Length(length) => Ok(length),
        _ => Err(RdbError::UnexpectedSpecialEncoding(first_byte)),
    }
}

/// Reads a string-encoded value. Integer encodings are big-endian and rendered as decimal text.
pub fn read_string_bytes(cursor: &mut RdbCursor<'_>) -> Result<Bytes, RdbError> {
    let first_byte = cursor.peek().ok_or(RdbError::UnexpectedEof)?;

    match read_length_encoding(cursor)? {
        LengthEncoding::Length(length) => cursor.read_bytes(length),
        LengthEncoding::Int8 => {
            let value = u8::from_be_bytes(cursor.read_array::<1>()?);
            Ok(Bytes::from(value.to_string()))
        }
        LengthEncoding::Int16 => {
            let value = u16::from_be_bytes(cursor.read_array::<2>()?);
            Ok(Bytes::from(value.to_string()))
        }
        LengthEncoding::Int32 => {
            let value = u32::from_be_bytes(cursor.read_array::<4>()?);
            Ok(Bytes::from(value.to_string()))
        }
        LengthEncoding::Lzf => Err(RdbError::UnsupportedStringEncoding(first_byte)),
    }
}

pub fn read_string(cursor: &mut RdbCursor<'_>, what: &'static str) -> Result<String, RdbError> {
    let bytes = read_string_bytes(cursor)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| RdbError::InvalidUtf8(what))
}
