//! Checksummed binary artifact encoding.
//!
//! Artifacts are little-endian byte streams followed by a CRC32 of everything
//! before it. [`ArtifactWriter`] accumulates the stream in memory so the file can
//! be written in one piece; [`ArtifactReader`] verifies the trailing checksum
//! before handing out any field.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Reason an artifact was rejected while decoding.
pub type Rejection = String;

/// Writes length-prefixed fields into an in-memory buffer.
#[derive(Debug, Default)]
pub struct ArtifactWriter {
    buf: Vec<u8>,
}

impl ArtifactWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ArtifactWriter {
            buf: Vec::with_capacity(capacity + 4),
        }
    }

    pub fn write_magic(&mut self, magic: &[u8; 4]) {
        self.buf.extend_from_slice(magic);
    }

    pub fn write_u16(&mut self, value: u16) {
        // Writes into a Vec cannot fail.
        let _ = self.buf.write_u16::<LittleEndian>(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        let _ = self.buf.write_u64::<LittleEndian>(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        let _ = self.buf.write_f32::<LittleEndian>(value);
    }

    /// Write a string with a u32 length prefix.
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Append the CRC32 of the buffer and return the finished bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let checksum = crc32fast::hash(&self.buf);
        self.write_u32(checksum);
        self.buf
    }
}

/// Reads fields from a checksum-verified artifact.
#[derive(Debug)]
pub struct ArtifactReader<'a> {
    cursor: Cursor<&'a [u8]>,
    end: u64,
}

impl<'a> ArtifactReader<'a> {
    /// Verify the trailing checksum and position the reader at the start.
    pub fn open(bytes: &'a [u8]) -> Result<Self, Rejection> {
        if bytes.len() < 4 {
            return Err(format!("artifact too short ({} bytes)", bytes.len()));
        }
        let (body, tail) = bytes.split_at(bytes.len() - 4);
        let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let actual = crc32fast::hash(body);
        if stored != actual {
            return Err(format!(
                "checksum mismatch (stored {stored:#010x}, computed {actual:#010x})"
            ));
        }
        Ok(ArtifactReader {
            cursor: Cursor::new(body),
            end: body.len() as u64,
        })
    }

    pub fn read_magic(&mut self, expected: &[u8; 4]) -> Result<(), Rejection> {
        let mut magic = [0u8; 4];
        self.cursor
            .read_exact(&mut magic)
            .map_err(|_| "missing magic".to_string())?;
        if &magic != expected {
            return Err(format!("bad magic {magic:?}"));
        }
        Ok(())
    }

    pub fn read_u16(&mut self) -> Result<u16, Rejection> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|e| format!("truncated u16: {e}"))
    }

    pub fn read_u32(&mut self) -> Result<u32, Rejection> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| format!("truncated u32: {e}"))
    }

    pub fn read_u64(&mut self) -> Result<u64, Rejection> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| format!("truncated u64: {e}"))
    }

    pub fn read_string(&mut self) -> Result<String, Rejection> {
        let len = self.read_u32()? as usize;
        if len as u64 > self.remaining() {
            return Err(format!("string length {len} exceeds artifact"));
        }
        let mut bytes = vec![0u8; len];
        self.cursor
            .read_exact(&mut bytes)
            .map_err(|e| format!("truncated string: {e}"))?;
        String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {e}"))
    }

    /// Read `count` f32 values, checking the length against the remaining bytes first.
    pub fn read_f32s(&mut self, count: usize) -> Result<Vec<f32>, Rejection> {
        self.ensure_remaining(count, 4)?;
        let mut values = vec![0f32; count];
        self.cursor
            .read_f32_into::<LittleEndian>(&mut values)
            .map_err(|e| format!("truncated payload: {e}"))?;
        Ok(values)
    }

    /// Read `count` u64 values, checking the length against the remaining bytes first.
    pub fn read_u64s(&mut self, count: usize) -> Result<Vec<u64>, Rejection> {
        self.ensure_remaining(count, 8)?;
        let mut values = vec![0u64; count];
        self.cursor
            .read_u64_into::<LittleEndian>(&mut values)
            .map_err(|e| format!("truncated payload: {e}"))?;
        Ok(values)
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.cursor.position())
    }

    /// Reject trailing bytes after the last field.
    pub fn finish(self) -> Result<(), Rejection> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(format!("{n} unexpected trailing bytes")),
        }
    }

    fn ensure_remaining(&self, count: usize, width: u64) -> Result<(), Rejection> {
        let needed = (count as u64).checked_mul(width);
        match needed {
            Some(needed) if needed <= self.remaining() => Ok(()),
            _ => Err(format!(
                "payload of {count} values does not fit in {} remaining bytes",
                self.remaining()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut writer = ArtifactWriter::new();
        writer.write_magic(b"TEST");
        writer.write_u16(3);
        writer.write_string("key");
        writer.write_u64(2);
        writer.write_f32(1.5);
        writer.write_f32(-2.0);
        writer.finish()
    }

    #[test]
    fn test_write_then_read() {
        let bytes = sample();
        let mut reader = ArtifactReader::open(&bytes).unwrap();
        reader.read_magic(b"TEST").unwrap();
        assert_eq!(reader.read_u16().unwrap(), 3);
        assert_eq!(reader.read_string().unwrap(), "key");
        let count = reader.read_u64().unwrap() as usize;
        assert_eq!(reader.read_f32s(count).unwrap(), vec![1.5, -2.0]);
        reader.finish().unwrap();
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let mut bytes = sample();
        bytes[6] ^= 0xff;
        let err = ArtifactReader::open(&bytes).unwrap_err();
        assert!(err.contains("checksum"), "{err}");
    }

    #[test]
    fn test_oversized_payload_is_rejected_before_allocation() {
        let mut writer = ArtifactWriter::new();
        writer.write_magic(b"TEST");
        let bytes = writer.finish();
        let mut reader = ArtifactReader::open(&bytes).unwrap();
        reader.read_magic(b"TEST").unwrap();
        assert!(reader.read_f32s(usize::MAX / 2).is_err());
    }

    #[test]
    fn test_wrong_magic() {
        let bytes = sample();
        let mut reader = ArtifactReader::open(&bytes).unwrap();
        assert!(reader.read_magic(b"NOPE").is_err());
    }
}
