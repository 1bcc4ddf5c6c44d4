//! Big-endian primitives and length-prefixed modified UTF-8 strings.
//!
//! Strings use the classic `writeUTF` layout: a `u16` byte length followed by
//! modified UTF-8, where U+0000 is encoded as `C0 80` and supplementary code
//! points are written as two three-byte surrogate sequences.

use crate::error::SparseError;
use std::io::{self, Read, Write};

pub const MAX_UTF_BYTES: usize = u16::MAX as usize;

/// Encoded length of `s` in modified UTF-8.
pub fn modified_utf8_len(s: &str) -> usize {
    s.chars()
        .map(|c| match c as u32 {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            0x0800..=0xFFFF => 3,
            _ => 6,
        })
        .sum()
}

pub fn fits_utf_frame(s: &str) -> bool {
    modified_utf8_len(s) <= MAX_UTF_BYTES
}

fn push_three_byte(unit: u32, out: &mut Vec<u8>) {
    out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
    out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
    out.push(0x80 | (unit & 0x3F) as u8);
}

pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        let cp = c as u32;
        match cp {
            0x0001..=0x007F => out.push(cp as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((cp >> 6) & 0x1F) as u8);
                out.push(0x80 | (cp & 0x3F) as u8);
            }
            0x0800..=0xFFFF => push_three_byte(cp, &mut out),
            _ => {
                let v = cp - 0x1_0000;
                push_three_byte(0xD800 | (v >> 10), &mut out);
                push_three_byte(0xDC00 | (v & 0x3FF), &mut out);
            }
        }
    }
    out
}

pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, SparseError> {
    let malformed = |at: usize| SparseError::Decode(format!("malformed modified utf-8 at byte {at}"));
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1).ok_or_else(|| malformed(i))?;
            if b2 & 0xC0 != 0x80 {
                return Err(malformed(i));
            }
            units.push((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1).ok_or_else(|| malformed(i))?;
            let b3 = *bytes.get(i + 2).ok_or_else(|| malformed(i))?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return Err(malformed(i));
            }
            units.push(
                (u16::from(b & 0x0F) << 12) | (u16::from(b2 & 0x3F) << 6) | u16::from(b3 & 0x3F),
            );
            i += 3;
        } else {
            return Err(malformed(i));
        }
    }
    String::from_utf16(&units).map_err(|e| SparseError::Decode(format!("invalid utf-16: {e}")))
}

/// Big-endian writes plus `write_utf`, available on every `Write`.
pub trait DataWrite: Write {
    fn write_byte(&mut self, v: u8) -> io::Result<()> {
        self.write_all(&[v])
    }

    fn write_bool(&mut self, v: bool) -> io::Result<()> {
        self.write_all(&[u8::from(v)])
    }

    fn write_i32_be(&mut self, v: i32) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    fn write_i64_be(&mut self, v: i64) -> io::Result<()> {
        self.write_all(&v.to_be_bytes())
    }

    fn write_f64_be(&mut self, v: f64) -> io::Result<()> {
        self.write_all(&v.to_bits().to_be_bytes())
    }

    fn write_len(&mut self, len: usize) -> Result<(), SparseError> {
        let len = i32::try_from(len)
            .map_err(|_| SparseError::Encode(format!("length {len} exceeds i32 range")))?;
        self.write_i32_be(len)?;
        Ok(())
    }

    fn write_utf(&mut self, s: &str) -> Result<(), SparseError> {
        let bytes = encode_modified_utf8(s);
        let len = u16::try_from(bytes.len()).map_err(|_| {
            SparseError::Encode(format!(
                "string of {} encoded bytes exceeds {MAX_UTF_BYTES}",
                bytes.len()
            ))
        })?;
        self.write_all(&len.to_be_bytes())?;
        self.write_all(&bytes)?;
        Ok(())
    }
}

impl<W: Write + ?Sized> DataWrite for W {}

/// Big-endian reads plus `read_utf`, available on every `Read`.
pub trait DataRead: Read {
    fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    fn read_i32_be(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_i64_be(&mut self) -> io::Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_f64_be(&mut self) -> io::Result<f64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(f64::from_bits(u64::from_be_bytes(buf)))
    }

    /// Reads an `i32` element count, rejecting negative values.
    fn read_len(&mut self) -> Result<usize, SparseError> {
        let len = self.read_i32_be()?;
        usize::try_from(len).map_err(|_| SparseError::Decode(format!("negative length {len}")))
    }

    fn read_utf(&mut self) -> Result<String, SparseError> {
        let mut len_buf = [0u8; 2];
        self.read_exact(&mut len_buf)?;
        let mut bytes = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
        self.read_exact(&mut bytes)?;
        decode_modified_utf8(&bytes)
    }
}

impl<R: Read + ?Sized> DataRead for R {}

/// True when `err` only means the input ended early.
pub fn is_eof(err: &SparseError) -> bool {
    matches!(err, SparseError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
}
