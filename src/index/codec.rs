//! Little-endian length-prefixed encoding shared by the binary index files.

use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// Append `value` with a u16 length prefix.
pub(crate) fn put_str(buf: &mut Vec<u8>, value: &str, path: &Path) -> StoreResult<()> {
    let len = u16::try_from(value.len()).map_err(|_| StoreError::Serialization {
        path: path.to_path_buf(),
        reason: format!("string of {} bytes exceeds the u16 length prefix", value.len()),
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Append a u32 record count.
pub(crate) fn put_count(buf: &mut Vec<u8>, count: usize, path: &Path) -> StoreResult<()> {
    let count = u32::try_from(count).map_err(|_| StoreError::Serialization {
        path: path.to_path_buf(),
        reason: format!("{count} records exceed the u32 record count"),
    })?;
    buf.extend_from_slice(&count.to_le_bytes());
    Ok(())
}

/// Bounds-checked cursor over an index file.
///
/// Every read failure is reported as corruption of `path`.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    path: PathBuf,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8], path: &Path) -> Self {
        Self {
            bytes,
            pos: 0,
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.corrupted(format!(
                "truncated at byte {}: needed {n}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn u16(&mut self) -> StoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> StoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn string(&mut self) -> StoreResult<String> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| self.corrupted(format!("invalid UTF-8 at byte {}: {e}", self.pos)))
    }

    /// Reject a declared record count that cannot fit in the rest of the file.
    pub(crate) fn check_count(&self, count: usize, min_record_size: usize) -> StoreResult<()> {
        if count.saturating_mul(min_record_size) > self.remaining() {
            return Err(self.corrupted(format!(
                "record count {count} exceeds what {} remaining bytes can hold",
                self.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn finish(&self) -> StoreResult<()> {
        if self.remaining() != 0 {
            return Err(self.corrupted(format!("{} trailing bytes", self.remaining())));
        }
        Ok(())
    }

    pub(crate) fn corrupted(&self, reason: String) -> StoreError {
        StoreError::corrupted(&self.path, reason)
    }
}
