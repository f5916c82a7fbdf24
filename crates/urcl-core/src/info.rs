//! Helpers for buffer-based info queries.
//!
//! Info queries take an optional caller buffer and report the byte size of the
//! value. Keys a wrapper can answer itself go through [`InfoWriter`]; keys that
//! need the native API go through [`forward_exact`], which rejects a caller
//! buffer whose length differs from the size the native API reports.

use bytemuck::{Pod, Zeroable};

use crate::error::{Result, UrError};
use crate::native::NativeResult;

/// Writes a wrapper-answered value into an optional caller buffer.
pub struct InfoWriter<'a> {
    value: Option<&'a mut [u8]>,
}

impl<'a> InfoWriter<'a> {
    /// Wrap an optional caller buffer.
    pub fn new(value: Option<&'a mut [u8]>) -> Self {
        Self { value }
    }

    /// Write raw bytes, returning the value size.
    pub fn bytes(self, bytes: &[u8]) -> Result<usize> {
        if let Some(buf) = self.value {
            if buf.len() < bytes.len() {
                return Err(UrError::InvalidSize);
            }
            buf[..bytes.len()].copy_from_slice(bytes);
        }
        Ok(bytes.len())
    }

    /// Write a single plain value.
    pub fn value<T: Pod>(self, value: T) -> Result<usize> {
        self.bytes(bytemuck::bytes_of(&value))
    }

    /// Write an array of plain values.
    pub fn slice<T: Pod>(self, values: &[T]) -> Result<usize> {
        self.bytes(bytemuck::cast_slice(values))
    }

    /// Write a boolean as a single byte.
    pub fn bool(self, value: bool) -> Result<usize> {
        self.value(u8::from(value))
    }
}

/// Forward a query to the native API, validating the caller's buffer size.
///
/// The native size is queried first; a caller buffer whose length differs is
/// rejected with [`UrError::InvalidSize`] before any value is written.
pub fn forward_exact<F>(value: Option<&mut [u8]>, mut query: F) -> Result<usize>
where
    F: FnMut(Option<&mut [u8]>) -> NativeResult<usize>,
{
    let size = query(None)?;
    match value {
        None => Ok(size),
        Some(buf) if buf.len() != size => Err(UrError::InvalidSize),
        Some(buf) => {
            let written = query(Some(buf))?;
            if written != size {
                return Err(UrError::InvalidSize);
            }
            Ok(written)
        }
    }
}

/// Read a single plain value from the native API.
pub fn query_value<T, F>(query: F) -> Result<T>
where
    T: Pod + Zeroable,
    F: FnOnce(Option<&mut [u8]>) -> NativeResult<usize>,
{
    let mut value = T::zeroed();
    let size = query(Some(bytemuck::bytes_of_mut(&mut value)))?;
    if size != std::mem::size_of::<T>() {
        return Err(UrError::InvalidSize);
    }
    Ok(value)
}

/// Read an array of plain values from the native API.
pub fn query_vec<T, F>(mut query: F) -> Result<Vec<T>>
where
    T: Pod + Zeroable,
    F: FnMut(Option<&mut [u8]>) -> NativeResult<usize>,
{
    let elem = std::mem::size_of::<T>();
    let size = query(None)?;
    if size % elem != 0 {
        return Err(UrError::InvalidSize);
    }
    let mut values = vec![T::zeroed(); size / elem];
    if !values.is_empty() {
        query(Some(bytemuck::cast_slice_mut(&mut values)))?;
    }
    Ok(values)
}

/// Read a nul-terminated string from the native API.
pub fn query_string<F>(mut query: F) -> Result<String>
where
    F: FnMut(Option<&mut [u8]>) -> NativeResult<usize>,
{
    let size = query(None)?;
    let mut bytes = vec![0u8; size];
    if size > 0 {
        query(Some(&mut bytes))?;
    }
    if let Some(end) = bytes.iter().position(|&b| b == 0) {
        bytes.truncate(end);
    }
    String::from_utf8(bytes).map_err(|_| UrError::InvalidValue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::ClStatus;

    fn native_u32(value: u32) -> impl FnMut(Option<&mut [u8]>) -> NativeResult<usize> {
        move |buf: Option<&mut [u8]>| {
            let bytes = value.to_ne_bytes();
            if let Some(buf) = buf {
                if buf.len() < bytes.len() {
                    return Err(ClStatus::INVALID_VALUE);
                }
                buf[..bytes.len()].copy_from_slice(&bytes);
            }
            Ok(bytes.len())
        }
    }

    #[test]
    fn test_writer_reports_size_without_buffer() {
        assert_eq!(InfoWriter::new(None).value(7u32).unwrap(), 4);
        assert_eq!(InfoWriter::new(None).slice(&[1u64, 2, 3]).unwrap(), 24);
    }

    #[test]
    fn test_writer_rejects_short_buffer() {
        let mut buf = [0u8; 2];
        assert_eq!(
            InfoWriter::new(Some(&mut buf[..])).value(7u32),
            Err(UrError::InvalidSize)
        );
    }

    #[test]
    fn test_writer_bool() {
        let mut buf = [0xFFu8; 1];
        InfoWriter::new(Some(&mut buf[..])).bool(false).unwrap();
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_forward_exact_size_mismatch() {
        let mut buf = [0u8; 8];
        assert_eq!(
            forward_exact(Some(&mut buf[..]), native_u32(3)),
            Err(UrError::InvalidSize)
        );

        let mut buf = [0u8; 4];
        assert_eq!(forward_exact(Some(&mut buf[..]), native_u32(3)).unwrap(), 4);
        assert_eq!(u32::from_ne_bytes(buf), 3);
    }

    #[test]
    fn test_query_helpers() {
        let value: u32 = query_value(native_u32(42)).unwrap();
        assert_eq!(value, 42);

        let values: Vec<u32> = query_vec(native_u32(9)).unwrap();
        assert_eq!(values, vec![9]);

        let name = query_string(|buf: Option<&mut [u8]>| {
            let bytes = b"sim\0";
            if let Some(buf) = buf {
                buf[..bytes.len()].copy_from_slice(bytes);
            }
            Ok(bytes.len())
        })
        .unwrap();
        assert_eq!(name, "sim");
    }

    #[test]
    fn test_native_error_is_translated() {
        let result: Result<u32> = query_value(|_| Err(ClStatus::INVALID_CONTEXT));
        assert_eq!(result, Err(UrError::InvalidContext));
    }
}
