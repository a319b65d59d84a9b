use bytes::Bytes;
use jiff::Timestamp;

use crate::rdb::{
    RdbCursor, RdbError,
    encoding::{read_length, read_string, read_string_bytes},
};

const AUX_OPCODE: u8 = 0xFA;
const RESIZE_DB_OPCODE: u8 = 0xFB;
const EXPIRE_TIME_MS_OPCODE: u8 = 0xFC;
const EXPIRE_TIME_OPCODE: u8 = 0xFD;
const SELECT_DB_OPCODE: u8 = 0xFE;
const END_OF_FILE_OPCODE: u8 = 0xFF;

const STRING_VALUE_TYPE: u8 = 0x00;
// List, set, sorted set, hash and their compact encodings (zipmap through quicklist)
const UNSUPPORTED_VALUE_TYPES: [u8; 10] = [0x01, 0x02, 0x03, 0x04, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E];

const MAGIC_STRING: &[u8] = b"REDIS";

#[derive(Debug, PartialEq)]
pub enum OpCode {
    Aux {
        key: String,
        value: String,
    },
    SelectDb {
        database_number: usize,
    },
    ResizeDb {
        db_hash_table_size: usize,
        expiry_hash_table_size: usize,
    },
    Entry {
        key: String,
        value: Bytes,
        expires_at: Option<Timestamp>,
    },
    EndOfFile {
        checksum: Option<[u8; 8]>,
    },
}

/// Reads `REDIS` plus the four digit version and returns the two parts.
pub fn read_header(cursor: &mut RdbCursor<'_>) -> Result<(String, String), RdbError> {
    let magic = cursor.read_slice(MAGIC_STRING.len())?;
    if magic != MAGIC_STRING {
        return Err(RdbError::InvalidMagicString);
    }

    let version = cursor.read_slice(4)?;
    if !version.iter().all(u8::is_ascii_digit) {
        return Err(RdbError::InvalidVersion(
            String::from_utf8_lossy(version).into_owned(),
        ));
    }

    // All bytes were checked to be ASCII above
    let version = String::from_utf8_lossy(version).into_owned();

    Ok(("REDIS".to_string(), version))
}

pub fn read_opcode(cursor: &mut RdbCursor<'_>) -> Result<OpCode, RdbError> {
    match cursor.read_u8()? {
        AUX_OPCODE => {
            let key = read_string(cursor, "metadata key")?;
            let value = read_string(cursor, "metadata value")?;

            Ok(OpCode::Aux { key, value })
        }
        SELECT_DB_OPCODE => Ok(OpCode::SelectDb {
            database_number: read_length(cursor)?,
        }),
        RESIZE_DB_OPCODE => {
            let db_hash_table_size = read_length(cursor)?;
            let expiry_hash_table_size = read_length(cursor)?;

            Ok(OpCode::ResizeDb {
                db_hash_table_size,
                expiry_hash_table_size,
            })
        }
        EXPIRE_TIME_OPCODE => {
            let seconds = u32::from_be_bytes(cursor.read_array::<4>()?);
            let expires_at = Timestamp::from_second(seconds as i64)
                .map_err(|e| RdbError::InvalidTimestamp(e.to_string()))?;

            read_expiring_entry(cursor, expires_at)
        }
        EXPIRE_TIME_MS_OPCODE => {
            let milliseconds = u64::from_be_bytes(cursor.read_array::<8>()?);
            let expires_at = i64::try_from(milliseconds)
                .map_err(|e| RdbError::InvalidTimestamp(e.to_string()))
                .and_then(|ms| {
                    Timestamp::from_millisecond(ms)
                        .map_err(|e| RdbError::InvalidTimestamp(e.to_string()))
                })?;

            read_expiring_entry(cursor, expires_at)
        }
        END_OF_FILE_OPCODE => {
            let checksum = if cursor.remaining() == 0 {
                None
            } else {
                Some(cursor.read_array::<8>()?)
            };

            Ok(OpCode::EndOfFile { checksum })
        }
        value_type => read_entry(cursor, value_type, None),
    }
}

fn read_expiring_entry(
    cursor: &mut RdbCursor<'_>,
    expires_at: Timestamp,
) -> Result<OpCode, RdbError> {
    let value_type = cursor.read_u8()?;

    if value_type != STRING_VALUE_TYPE && !UNSUPPORTED_VALUE_TYPES.contains(&value_type) {
        return Err(RdbError::DanglingExpiry);
    }

    read_entry(cursor, value_type, Some(expires_at))
}

fn read_entry(
    cursor: &mut RdbCursor<'_>,
    value_type: u8,
    expires_at: Option<Timestamp>,
) -> Result<OpCode, RdbError> {
    if value_type == STRING_VALUE_TYPE {
        let key = read_string(cursor, "key")?;
        let value = read_string_bytes(cursor)?;

        return Ok(OpCode::Entry {
            key,
            value,
            expires_at,
        });
    }

    if UNSUPPORTED_VALUE_TYPES.contains(&value_type) {
        let key = read_string(cursor, "key")?;
        return Err(RdbError::UnsupportedValueType { value_type, key });
    }

    Err(RdbError::UnknownOpcode(value_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_header() {
        let test_cases: Vec<(&[u8], Result<(String, String), RdbError>)> = vec![
            (b"REDIS0011", Ok(("REDIS".to_string(), "0011".to_string()))),
            (b"REDIS0003\xFF", Ok(("REDIS".to_string(), "0003".to_string()))),
            (b"RADIS0011", Err(RdbError::InvalidMagicString)),
            (b"REDIS00a1", Err(RdbError::InvalidVersion("00a1".to_string()))),
            (b"REDIS00", Err(RdbError::UnexpectedEof)),
        ];

        for (input, expected) in test_cases {
            let mut cursor = RdbCursor::new(input);
            assert_eq!(
                read_header(&mut cursor),
                expected,
                "reading header from {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_read_opcode() {
        let expires_at = Timestamp::from_millisecond(1_713_824_559_637).unwrap();

        let test_cases: Vec<(Vec<u8>, Result<OpCode, RdbError>)> = vec![
            (
                b"\xFA\x09redis-ver\x057.2.0".to_vec(),
                Ok(OpCode::Aux {
                    key: "redis-ver".to_string(),
                    value: "7.2.0".to_string(),
                }),
            ),
            (
                b"\xFA\x0Aredis-bits\xC0\x40".to_vec(),
                Ok(OpCode::Aux {
                    key: "redis-bits".to_string(),
                    value: "64".to_string(),
                }),
            ),
            (
                vec![0xFE, 0x00],
                Ok(OpCode::SelectDb { database_number: 0 }),
            ),
            (
                vec![0xFB, 0x03, 0x01],
                Ok(OpCode::ResizeDb {
                    db_hash_table_size: 3,
                    expiry_hash_table_size: 1,
                }),
            ),
            (
                b"\x00\x03foo\x03bar".to_vec(),
                Ok(OpCode::Entry {
                    key: "foo".to_string(),
                    value: Bytes::from_static(b"bar"),
                    expires_at: None,
                }),
            ),
            (
                [
                    &[0xFC][..],
                    &1_713_824_559_637u64.to_be_bytes()[..],
                    &b"\x00\x03foo\x03bar"[..],
                ]
                .concat(),
                Ok(OpCode::Entry {
                    key: "foo".to_string(),
                    value: Bytes::from_static(b"bar"),
                    expires_at: Some(expires_at),
                }),
            ),
            (
                [&[0xFD][..], &1_713_824_559u32.to_be_bytes()[..], &b"\x00\x01k\x01v"[..]].concat(),
                Ok(OpCode::Entry {
                    key: "k".to_string(),
                    value: Bytes::from_static(b"v"),
                    expires_at: Some(Timestamp::from_second(1_713_824_559).unwrap()),
                }),
            ),
            (
                [&[0xFC][..], &1_713_824_559_637u64.to_be_bytes()[..], &[0xFF][..]].concat(),
                Err(RdbError::DanglingExpiry),
            ),
            (
                b"\x01\x04list\x01\x01a".to_vec(),
                Err(RdbError::UnsupportedValueType {
                    value_type: 1,
                    key: "list".to_string(),
                }),
            ),
            (
                b"\x0E\x02ql".to_vec(),
                Err(RdbError::UnsupportedValueType {
                    value_type: 14,
                    key: "ql".to_string(),
                }),
            ),
            (vec![0x07], Err(RdbError::UnknownOpcode(0x07))),
            (
                vec![0xFF, 1, 2, 3, 4, 5, 6, 7, 8],
                Ok(OpCode::EndOfFile {
                    checksum: Some([1, 2, 3, 4, 5, 6, 7, 8]),
                }),
            ),
            (vec![0xFF], Ok(OpCode::EndOfFile { checksum: None })),
            (vec![0xFF, 1, 2], Err(RdbError::UnexpectedEof)),
        ];

        for (input, expected) in test_cases {
            let mut cursor = RdbCursor::new(&input);
            assert_eq!(
                read_opcode(&mut cursor),
                expected,
                "reading opcode from {:02X?}",
                input
            );
        }
    }
}
