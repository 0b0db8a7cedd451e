//! Fixed-width primitives shared by every record.
//!
//! All integers are little-endian. Strings live in fixed-capacity fields of
//! `max_len + 1` bytes: the text is truncated to `max_len` bytes and the rest
//! of the field, terminator included, is zero.

use crate::DecodeError;

/// Cursor over an inbound record.
///
/// Every read is bounds checked against the record, so a short buffer turns
/// into a [`DecodeError::Truncated`] instead of a panic.
pub struct Reader<'a> {
    record: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(record: &'static str, data: &'a [u8]) -> Self {
        Self {
            record,
            data,
            pos: 0,
        }
    }

    /// Reader over a record that must be exactly `len` bytes long.
    pub fn exact(record: &'static str, data: &'a [u8], len: usize) -> Result<Self, DecodeError> {
        if data.len() != len {
            return Err(DecodeError::Length {
                record,
                expected: len,
                actual: data.len(),
            });
        }
        Ok(Self::new(record, data))
    }

    /// Reader over a record that must be at least `len` bytes long.
    pub fn at_least(
        record: &'static str,
        data: &'a [u8],
        len: usize,
    ) -> Result<Self, DecodeError> {
        if data.len() < len {
            return Err(DecodeError::Truncated {
                record,
                needed: len,
                actual: data.len(),
            });
        }
        Ok(Self::new(record, data))
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn record(&self) -> &'static str {
        self.record
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(DecodeError::Truncated {
                record: self.record,
                needed: end,
                actual: self.data.len(),
            });
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a `capacity`-byte string field.
    pub fn read_cstr(&mut self, capacity: usize) -> Result<String, DecodeError> {
        Ok(decode_cstr(self.read_bytes(capacity)?))
    }
}

/// Decode a NUL-terminated string held in `bytes`.
///
/// Stops at the first zero byte, or at the end of the slice when there is
/// none. Invalid UTF-8 is replaced rather than rejected.
pub fn decode_cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// The longest prefix of `s` that fits in `max_len` bytes without splitting a
/// character.
pub fn truncate_utf8(s: &str, max_len: usize) -> &[u8] {
    if s.len() <= max_len {
        return s.as_bytes();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}

/// Cursor over an outbound fixed-size buffer.
///
/// # Panics
///
/// Writing past the end of the buffer panics. Record encoders size their
/// buffers from the layout constants, so this only fires on a layout bug.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf[self.pos] = value;
        self.pos += 1;
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// Write `s` into a `max_len + 1` byte field.
    ///
    /// The whole field is zeroed first so nothing from a previous, longer
    /// value survives in a reused buffer.
    pub fn write_cstr(&mut self, s: &str, max_len: usize) {
        let field = &mut self.buf[self.pos..self.pos + max_len + 1];
        field.fill(0);
        let bytes = truncate_utf8(s, max_len);
        field[..bytes.len()].copy_from_slice(bytes);
        self.pos += max_len + 1;
    }

    /// Skip `len` bytes, zeroing them.
    pub fn write_zeros(&mut self, len: usize) {
        self.buf[self.pos..self.pos + len].fill(0);
        self.pos += len;
    }
}

/// Allocate a zeroed `len`-byte buffer and fill it through a [`Writer`].
pub fn encode_fixed(len: usize, fill: impl FnOnce(&mut Writer<'_>)) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    let mut writer = Writer::new(&mut buf);
    fill(&mut writer);
    debug_assert_eq!(writer.position(), len, "record layout mismatch");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cstr_stops_at_first_nul() {
        assert_eq!(decode_cstr(b"abc\0def"), "abc");
        assert_eq!(decode_cstr(b"\0abc"), "");
        assert_eq!(decode_cstr(b"full"), "full");
        assert_eq!(decode_cstr(b""), "");
    }

    #[test]
    fn read_cstr_never_scans_past_field() {
        let data = b"ab\x01\x02cd";
        let mut reader = Reader::new("test", data);
        assert_eq!(reader.read_cstr(2).unwrap(), "ab");
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn u32_is_little_endian() {
        let mut reader = Reader::new("test", &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);

        let buf = encode_fixed(4, |w| w.write_u32(0x1234_5678));
        assert_eq!(buf, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn short_read_is_an_error() {
        let mut reader = Reader::new("test", &[1, 2]);
        assert_eq!(
            reader.read_u32(),
            Err(DecodeError::Truncated {
                record: "test",
                needed: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn exact_rejects_wrong_length() {
        assert!(Reader::exact("light", &[1, 1, 1], 2).is_err());
        assert!(Reader::exact("light", &[1, 1], 2).is_ok());
    }

    #[test]
    fn write_cstr_truncates_and_terminates() {
        let buf = encode_fixed(5, |w| w.write_cstr("abcdefgh", 4));
        assert_eq!(buf, *b"abcd\0");
    }

    #[test]
    fn write_cstr_zero_fills_reused_buffer() {
        let mut buf = [0u8; 9];
        Writer::new(&mut buf).write_cstr("longname", 8);
        Writer::new(&mut buf).write_cstr("ab", 8);
        assert_eq!(buf, *b"ab\0\0\0\0\0\0\0");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_utf8("aé", 2), b"a");
        assert_eq!(truncate_utf8("aé", 3), "aé".as_bytes());
    }
}
