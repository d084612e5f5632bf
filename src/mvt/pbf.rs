//! Streaming protobuf wire-format reader.
//!
//! Reads directly off a byte slice with every access bounds-checked, so
//! arbitrary trailing garbage or truncation surfaces as an error instead
//! of a panic. Nested messages are handled by taking a length-delimited
//! slice and constructing a sub-reader over it.

use crate::{MapError, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn from_raw(raw: u64) -> Option<WireType> {
        match raw {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// Cursor over a protobuf message
pub struct PbfReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PbfReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// True once the cursor has consumed the whole slice
    pub fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads the next field key, or `None` at end-of-stream.
    pub fn next_field(&mut self) -> Result<Option<(u32, WireType)>> {
        if self.eof() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let wire = WireType::from_raw(key & 0x7)
            .ok_or_else(|| MapError::MalformedTile(format!("wire type {} unsupported", key & 0x7)))?;
        Ok(Some(((key >> 3) as u32, wire)))
    }

    /// Reads a base-128 varint
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| MapError::MalformedTile("truncated varint".into()))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(MapError::MalformedTile("varint exceeds 10 bytes".into()).into());
            }
        }
    }

    /// Reads a zigzag-encoded signed varint
    pub fn read_zigzag(&mut self) -> Result<i64> {
        let value = self.read_varint()?;
        Ok(decode_zigzag64(value))
    }

    /// Reads a length-delimited byte slice
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| MapError::MalformedTile("truncated length-delimited field".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads a length-delimited UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| MapError::MalformedTile(format!("invalid utf8: {e}")))?;
        Ok(s.to_owned())
    }

    /// Reads a little-endian fixed32 float
    pub fn read_float(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian fixed64 double
    pub fn read_double(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Reads a packed repeated varint field into `out` as u32 values
    pub fn read_packed_varints(&mut self, out: &mut Vec<u32>) -> Result<()> {
        let bytes = self.read_bytes()?;
        let mut sub = PbfReader::new(bytes);
        while !sub.eof() {
            out.push(sub.read_varint()? as u32);
        }
        Ok(())
    }

    /// Advances past a field of the given wire type
    pub fn skip(&mut self, wire: WireType) -> Result<()> {
        match wire {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| MapError::MalformedTile("truncated fixed-width field".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// Maps a zigzag-encoded unsigned value back to signed
pub fn decode_zigzag64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// 32-bit zigzag decode, used by the geometry command stream
pub fn decode_zigzag32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_vectors() {
        let mut reader = PbfReader::new(&[0x00, 0x01, 0x96, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(reader.read_varint().unwrap(), 0);
        assert_eq!(reader.read_varint().unwrap(), 1);
        assert_eq!(reader.read_varint().unwrap(), 150);
        assert_eq!(reader.read_varint().unwrap(), u32::MAX as u64);
        assert!(reader.eof());
    }

    #[test]
    fn test_varint_truncated() {
        let mut reader = PbfReader::new(&[0x96]);
        assert!(reader.read_varint().is_err());
    }

    #[test]
    fn test_varint_overlong() {
        let mut reader = PbfReader::new(&[0xFF; 11]);
        assert!(reader.read_varint().is_err());
    }

    #[test]
    fn test_zigzag_decode() {
        assert_eq!(decode_zigzag32(0), 0);
        assert_eq!(decode_zigzag32(1), -1);
        assert_eq!(decode_zigzag32(2), 1);
        assert_eq!(decode_zigzag32(3), -2);
        assert_eq!(decode_zigzag32(4), 2);
        assert_eq!(decode_zigzag32(8192), 4096);
        assert_eq!(decode_zigzag32(8191), -4096);
        assert_eq!(decode_zigzag64(u64::MAX), i64::MIN);
    }

    #[test]
    fn test_next_field_and_string() {
        // field 1, wire 2, len 5, "hello"
        let mut reader = PbfReader::new(&[0x0A, 0x05, b'h', b'e', b'l', b'l', b'o']);
        let (tag, wire) = reader.next_field().unwrap().unwrap();
        assert_eq!(tag, 1);
        assert_eq!(wire, WireType::LengthDelimited);
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert_eq!(reader.next_field().unwrap(), None);
    }

    #[test]
    fn test_truncated_bytes() {
        // claims 10 bytes, delivers 2
        let mut reader = PbfReader::new(&[0x0A, 0x0A, 0x01, 0x02]);
        let _ = reader.next_field().unwrap().unwrap();
        assert!(reader.read_bytes().is_err());
    }

    #[test]
    fn test_skip_all_wire_types() {
        let mut data = vec![
            0x08, 0x96, 0x01, // field 1 varint 150
            0x11, 0, 0, 0, 0, 0, 0, 0, 0, // field 2 fixed64
            0x1A, 0x02, 0xAB, 0xCD, // field 3 bytes
            0x25, 0, 0, 0, 0, // field 4 fixed32
            0x28, 0x2A, // field 5 varint 42
        ];
        let mut reader = PbfReader::new(&data);
        for _ in 0..4 {
            let (_, wire) = reader.next_field().unwrap().unwrap();
            reader.skip(wire).unwrap();
        }
        let (tag, _) = reader.next_field().unwrap().unwrap();
        assert_eq!(tag, 5);
        assert_eq!(reader.read_varint().unwrap(), 42);

        // truncating any suffix must error, not panic
        while data.pop().is_some() {
            let mut reader = PbfReader::new(&data);
            loop {
                match reader.next_field() {
                    Ok(Some((_, wire))) => {
                        if reader.skip(wire).is_err() {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }

    #[test]
    fn test_packed_varints() {
        // len 4: [9, 4, 4, 150] -- 150 takes two bytes, so len 5
        let mut reader = PbfReader::new(&[0x05, 0x09, 0x04, 0x04, 0x96, 0x01]);
        let mut out = Vec::new();
        reader.read_packed_varints(&mut out).unwrap();
        assert_eq!(out, vec![9, 4, 4, 150]);
    }

    #[test]
    fn test_fixed_readers() {
        let mut bytes = 3.5f32.to_le_bytes().to_vec();
        bytes.extend(1.25f64.to_le_bytes());
        let mut reader = PbfReader::new(&bytes);
        assert_eq!(reader.read_float().unwrap(), 3.5);
        assert_eq!(reader.read_double().unwrap(), 1.25);
    }
}
