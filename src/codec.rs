//! Big-endian, length-prefixed binary layout shared by records and messages.
//!
//! All integers are written big-endian. Variable-length fields carry a `u16`
//! (records) or `u32` (messages) length prefix.

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub(crate) struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    pub(crate) fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub(crate) fn u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Writes `data` behind a `u16` length.
    pub(crate) fn bytes_u16(&mut self, data: &[u8]) -> Result<&mut Self> {
        let len = u16::try_from(data.len()).map_err(|_| Error::SerializationError)?;
        self.bytes.extend_from_slice(&len.to_be_bytes());
        self.bytes.extend_from_slice(data);
        Ok(self)
    }

    /// Writes `data` behind a `u32` length.
    pub(crate) fn bytes_u32(&mut self, data: &[u8]) -> Result<&mut Self> {
        let len = u32::try_from(data.len()).map_err(|_| Error::SerializationError)?;
        self.bytes.extend_from_slice(&len.to_be_bytes());
        self.bytes.extend_from_slice(data);
        Ok(self)
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Cursor over untrusted input. Every read is bounds-checked and reports
/// `error` on truncation.
#[derive(Debug)]
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
    error: Error,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8], error: Error) -> Self {
        Self {
            bytes,
            offset: 0,
            error,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or_else(|| self.error.clone())?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| self.error.clone())?;
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take(N)?;
        slice.try_into().map_err(|_| self.error.clone())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub(crate) fn bytes_u16(&mut self) -> Result<&'a [u8]> {
        let len = self.u16()?;
        self.take(usize::from(len))
    }

    pub(crate) fn bytes_u32(&mut self) -> Result<&'a [u8]> {
        let len = usize::try_from(self.u32()?).map_err(|_| self.error.clone())?;
        self.take(len)
    }

    /// Fails unless the whole input was consumed.
    pub(crate) fn finish(self) -> Result<()> {
        if self.offset == self.bytes.len() {
            Ok(())
        } else {
            Err(self.error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut writer = Writer::default();
        writer.u8(3).u32(0x0102_0304).u64(5);
        writer.bytes_u16(b"ab").unwrap();
        let bytes = writer.finish();

        assert_eq!(
            bytes,
            vec![3, 1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 5, 0, 2, b'a', b'b']
        );
    }

    #[test]
    fn test_reader_truncation() {
        let bytes = [0u8, 0, 0, 9, 1, 2];
        let mut reader = Reader::new(&bytes, Error::InvalidMessage);
        assert_eq!(reader.bytes_u32(), Err(Error::InvalidMessage));
    }

    #[test]
    fn test_reader_rejects_trailing_bytes() {
        let bytes = [0u8, 1, 7, 9];
        let mut reader = Reader::new(&bytes, Error::SerializationError);
        assert_eq!(reader.bytes_u16().unwrap(), &[7]);
        assert_eq!(reader.finish(), Err(Error::SerializationError));
    }
}
