use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Abc2AsmError, Result};

/// Little-endian cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Result<Self> {
        if pos > buf.len() {
            return Err(Abc2AsmError::Eof { offset: pos });
        }
        Ok(Self { buf, pos })
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Capacity for `count` items of at least `min_size` bytes each, capped
    /// by what is left to read.
    pub fn capacity_for(&self, count: u32, min_size: usize) -> usize {
        (count as usize).min(self.remaining() / min_size.max(1))
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Abc2AsmError::Eof { offset: self.pos });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        let v = LittleEndian::read_u16(&self.buf[self.pos..self.pos + 2]);
        self.pos += 2;
        Ok(v)
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(self.get_u16()? as i16)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        let v = LittleEndian::read_u32(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(v)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        let v = LittleEndian::read_u64(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        self.need(4)?;
        let v = LittleEndian::read_f32(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(v)
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        self.need(8)?;
        let v = LittleEndian::read_f64(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.need(n)?;
        self.pos += n;
        Ok(())
    }

    pub fn get_uleb128(&mut self) -> Result<u32> {
        let start = self.pos;
        let mut result: u32 = 0;
        let mut shift: u32 = 0;
        loop {
            let b = self.get_u8()?;
            result |= ((b & 0x7f) as u32) << shift;
            if (b & 0x80) == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 35 {
                return Err(Abc2AsmError::InvalidLeb128(start));
            }
        }
    }

    pub fn get_sleb128(&mut self) -> Result<i32> {
        let start = self.pos;
        let mut result: i64 = 0;
        let mut shift: u32 = 0;
        let mut byte: u8;
        loop {
            byte = self.get_u8()?;
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;
            if (byte & 0x80) == 0 {
                break;
            }
            if shift >= 35 {
                return Err(Abc2AsmError::InvalidLeb128(start));
            }
        }
        if shift < 64 && (byte & 0x40) != 0 {
            result |= (!0i64) << shift;
        }
        Ok(result as i32)
    }

    /// Reads a zero-terminated MUTF-8 string body.
    pub fn get_mutf8(&mut self) -> Result<String> {
        let start = self.pos;
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(Abc2AsmError::Eof { offset: start })?;
        let s = decode_mutf8(&rest[..len]).ok_or(Abc2AsmError::InvalidMutf8(start))?;
        self.pos += len + 1;
        Ok(s)
    }
}

/// Decodes modified UTF-8: NUL as `C0 80`, supplementary characters as
/// surrogate pairs of 3-byte sequences. Unpaired surrogates become U+FFFD.
pub fn decode_mutf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xe0 == 0xc0 {
            let b1 = *bytes.get(i + 1)?;
            if b1 & 0xc0 != 0x80 {
                return None;
            }
            units.push((((b0 & 0x1f) as u16) << 6) | (b1 & 0x3f) as u16);
            i += 2;
        } else if b0 & 0xf0 == 0xe0 {
            let b1 = *bytes.get(i + 1)?;
            let b2 = *bytes.get(i + 2)?;
            if b1 & 0xc0 != 0x80 || b2 & 0xc0 != 0x80 {
                return None;
            }
            let unit =
                (((b0 & 0x0f) as u16) << 12) | (((b1 & 0x3f) as u16) << 6) | (b2 & 0x3f) as u16;
            units.push(unit);
            i += 3;
        } else {
            return None;
        }
    }
    Some(
        char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leb128_roundtrips_known_values() {
        let mut r = Reader::new(&[0xe5, 0x8e, 0x26]);
        assert_eq!(r.get_uleb128().unwrap(), 624485);
        let mut r = Reader::new(&[0xc0, 0xbb, 0x78]);
        assert_eq!(r.get_sleb128().unwrap(), -123456);
        let mut r = Reader::new(&[0x7f]);
        assert_eq!(r.get_sleb128().unwrap(), -1);
    }

    #[test]
    fn overlong_leb128_is_rejected() {
        let mut r = Reader::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(matches!(r.get_uleb128(), Err(Abc2AsmError::InvalidLeb128(0))));
    }

    #[test]
    fn reads_past_end_report_offset() {
        let mut r = Reader::new(&[1, 2, 3]);
        r.get_u16().unwrap();
        assert!(matches!(r.get_u32(), Err(Abc2AsmError::Eof { offset: 2 })));
    }

    #[test]
    fn mutf8_decodes_nul_and_surrogates() {
        assert_eq!(decode_mutf8(b"abc").unwrap(), "abc");
        assert_eq!(decode_mutf8(&[0x61, 0xc0, 0x80, 0x62]).unwrap(), "a\0b");
        // U+1F600 as a CESU-style surrogate pair
        let smile = [0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80];
        assert_eq!(decode_mutf8(&smile).unwrap(), "\u{1f600}");
        assert!(decode_mutf8(&[0xc3]).is_none());
    }

    #[test]
    fn mutf8_reader_consumes_terminator() {
        let mut r = Reader::new(b"hi\0rest");
        assert_eq!(r.get_mutf8().unwrap(), "hi");
        assert_eq!(r.pos(), 3);
    }

    #[test]
    fn capacity_is_capped_by_remaining_bytes() {
        let r = Reader::new(&[0; 12]);
        assert_eq!(r.capacity_for(2, 4), 2);
        assert_eq!(r.capacity_for(u32::MAX, 4), 3);
        assert_eq!(r.capacity_for(u32::MAX, 0), 12);
    }
}
