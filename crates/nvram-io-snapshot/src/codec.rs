//! Little-endian helpers for packing composite values into a single TLV field.

use crate::{SnapshotError, SnapshotResult};

#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(mut self, v: i64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bool(self, v: bool) -> Self {
        self.u8(u8::from(v))
    }

    pub fn bytes(mut self, v: &[u8]) -> Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn bytes(&mut self, len: usize) -> SnapshotResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(SnapshotError::UnexpectedEof)?;
        let out = self
            .buf
            .get(self.pos..end)
            .ok_or(SnapshotError::UnexpectedEof)?;
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> SnapshotResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> SnapshotResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> SnapshotResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> SnapshotResult<u64> {
        self.array().map(u64::from_le_bytes)
    }

    pub fn i64(&mut self) -> SnapshotResult<i64> {
        self.array().map(i64::from_le_bytes)
    }

    pub fn bool(&mut self) -> SnapshotResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SnapshotError::InvalidFieldEncoding("bool")),
        }
    }

    /// Fails if any bytes are left unread.
    pub fn finish(self) -> SnapshotResult<()> {
        if self.pos != self.buf.len() {
            return Err(SnapshotError::InvalidFieldEncoding("trailing bytes"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_reports_eof_and_trailing_bytes() {
        let buf = Encoder::new().u32(7).bool(true).finish();

        let mut d = Decoder::new(&buf);
        assert_eq!(d.u32().unwrap(), 7);
        assert!(d.bool().unwrap());
        assert_eq!(d.u8(), Err(SnapshotError::UnexpectedEof));

        let mut d = Decoder::new(&buf);
        d.u32().unwrap();
        assert_eq!(
            d.finish(),
            Err(SnapshotError::InvalidFieldEncoding("trailing bytes"))
        );
    }
}
