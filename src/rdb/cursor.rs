use bytes::Bytes;

use crate::rdb::RdbError;

/// Forward-only view over an RDB byte buffer.
#[derive(Debug)]
pub struct RdbCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> RdbCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8, RdbError> {
        let byte = self.peek().ok_or(RdbError::UnexpectedEof)?;
        self.position += 1;
        Ok(byte)
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], RdbError> {
        if len > self.remaining() {
            return Err(RdbError::UnexpectedEof);
        }

        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;

        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], RdbError> {
        let slice = self.read_slice(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, RdbError> {
        self.read_slice(len).map(Bytes::copy_from_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_reads_and_stops_at_end() {
        let mut cursor = RdbCursor::new(&[0x01, 0x02, 0x03]);

        assert_eq!(cursor.read_u8(), Ok(0x01));
        assert_eq!(cursor.read_array::<2>(), Ok([0x02, 0x03]));
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.peek(), None);
        assert_eq!(cursor.read_u8(), Err(RdbError::UnexpectedEof));
        assert_eq!(cursor.read_slice(1), Err(RdbError::UnexpectedEof));
    }
}
