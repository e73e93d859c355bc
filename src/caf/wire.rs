//! Little-endian primitives and Latin-1 strings
//!
//! Strings in CAF files are one byte per character, terminated by 0x00.
//! Characters outside Latin-1 (and embedded NULs) are written as `?`, which is
//! lossy but matches every existing index file.

use crate::core::error::{FormatError, Result};
use std::io::{self, BufRead, Write};

/// Reads fixed-width fields and strings from a CAF stream
pub struct WireReader<R: BufRead> {
    inner: R,
}

impl<R: BufRead> WireReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read a count field; negative counts only come from damaged files
    pub fn read_count(&mut self, what: &str) -> Result<usize> {
        let count = self.read_i32()?;
        usize::try_from(count)
            .map_err(|_| FormatError::Corrupt(format!("negative {} count {}", what, count)).into())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        let mut remaining = len;
        while remaining > 0 {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Err(FormatError::Truncated.into());
            }
            let step = available.len().min(remaining);
            self.inner.consume(step);
            remaining -= step;
        }
        Ok(())
    }

    /// Read a NUL-terminated Latin-1 string
    pub fn read_string(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        self.inner.read_until(0, &mut bytes)?;
        match bytes.pop() {
            Some(0) => Ok(latin1_decode(&bytes)),
            _ => Err(FormatError::Truncated.into()),
        }
    }

    pub fn skip_string(&mut self) -> Result<()> {
        self.read_string().map(|_| ())
    }
}

/// Writes fixed-width fields and strings to a CAF stream
pub struct WireWriter<W: Write> {
    inner: W,
}

impl<W: Write> WireWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_u16(&mut self, value: u16) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_string(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_all(&latin1_encode(text))?;
        self.inner.write_all(&[0])
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Encode text as Latin-1, replacing anything unrepresentable with `?`
pub fn latin1_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            0 => b'?',
            code @ 1..=0xFF => code as u8,
            _ => b'?',
        })
        .collect()
}

/// Decode Latin-1 bytes; every byte maps to the code point of the same value
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
