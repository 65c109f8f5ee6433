//! Fixed-layout field readers/writers.
//!
//! All multi-byte integers are little-endian. Only the reliable-channel
//! length prefix (see `codec_tcp`) is big-endian.

use crate::error::ProtoError;

pub(crate) struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), ProtoError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(ProtoError::PayloadTooLarge(end));
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<(), ProtoError> {
        self.put(&[v])
    }

    pub fn put_i8(&mut self, v: i8) -> Result<(), ProtoError> {
        self.put(&[v as u8])
    }

    pub fn put_u16(&mut self, v: u16) -> Result<(), ProtoError> {
        self.put(&v.to_le_bytes())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<(), ProtoError> {
        self.put(&v.to_le_bytes())
    }

    pub fn put_f32(&mut self, v: f32) -> Result<(), ProtoError> {
        self.put(&v.to_le_bytes())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), ProtoError> {
        self.put(bytes)
    }
}

pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        let end = self.pos.checked_add(n).ok_or(ProtoError::TooShort)?;
        let slice = self.buf.get(self.pos..end).ok_or(ProtoError::TooShort)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, ProtoError> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8, ProtoError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn u16(&mut self) -> Result<u16, ProtoError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes(
            bytes.try_into().map_err(|_| ProtoError::TooShort)?,
        ))
    }

    pub fn u32(&mut self) -> Result<u32, ProtoError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(
            bytes.try_into().map_err(|_| ProtoError::TooShort)?,
        ))
    }

    pub fn f32(&mut self) -> Result<f32, ProtoError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes(
            bytes.try_into().map_err(|_| ProtoError::TooShort)?,
        ))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtoError> {
        let bytes = self.take(N)?;
        bytes.try_into().map_err(|_| ProtoError::TooShort)
    }
}
