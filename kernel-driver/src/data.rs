//! Fixed-capacity byte store behind `read`/`write`.
//!
//! Each write replaces the stored contents (it never appends) and moves the
//! valid-length cursor. Reads always start at offset zero. Bytes the caller's
//! buffer could not supply are not counted; whatever landed before the fault
//! stays and counts as valid.

use log::Level;

use crate::error::AllocationError;
use crate::uaccess::{UserSlice, UserSliceMut, transferred};

/// Zero-filled storage with a valid-length cursor.
#[derive(Debug)]
pub struct DataBuffer {
    bytes: Box<[u8]>,
    valid: usize,
}

impl DataBuffer {
    /// Allocation may fail; nothing is left behind when it does.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocationError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| AllocationError::OutOfMemory(capacity))?;
        bytes.resize(capacity, 0);
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
            valid: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn len(&self) -> usize {
        self.valid
    }

    pub fn is_empty(&self) -> bool {
        self.valid == 0
    }

    /// The valid prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.valid]
    }
}

/// Byte-stream half of a device file.
#[derive(Debug)]
pub struct DataPlane {
    name: String,
    buffer: DataBuffer,
}

impl DataPlane {
    pub fn new(name: &str, capacity: usize) -> Result<Self, AllocationError> {
        Ok(Self {
            name: name.to_owned(),
            buffer: DataBuffer::with_capacity(capacity)?,
        })
    }

    /// Store up to `count` bytes from `src`, truncated to capacity.
    /// Returns how many bytes were actually stored.
    pub fn write(&mut self, src: &UserSlice<'_>, count: usize) -> usize {
        let to_copy = count.min(self.buffer.capacity()).min(src.len());
        let res = src.copy_from_user(&mut self.buffer.bytes[..to_copy]);
        let copied = transferred(to_copy, res);
        self.buffer.valid = copied;

        crate::pr!(
            Level::Info,
            self.name,
            "write - wrote {} of {} requested byte(s)",
            copied,
            count
        );
        copied
    }

    /// Copy the valid prefix into `dst`, up to the destination's capacity.
    pub fn read(&self, dst: &mut UserSliceMut<'_>) -> usize {
        let to_copy = dst.len().min(self.buffer.len());
        let res = dst.copy_to_user(&self.buffer.as_bytes()[..to_copy]);
        let copied = transferred(to_copy, res);

        crate::pr!(
            Level::Info,
            self.name,
            "read - copied {} of {} valid byte(s)",
            copied,
            self.buffer.len()
        );
        copied
    }

    pub fn valid_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn contents(&self) -> &[u8] {
        self.buffer.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(capacity: usize) -> DataPlane {
        DataPlane::new("data-test", capacity).unwrap()
    }

    #[test]
    fn write_truncates_to_capacity_and_read_returns_prefix() {
        let mut p = plane(255);
        let payload = vec![b'x'; 300];
        assert_eq!(p.write(&UserSlice::new(&payload), payload.len()), 255);

        let mut out = vec![0u8; 1000];
        assert_eq!(p.read(&mut UserSliceMut::new(&mut out)), 255);
        assert!(out[..255].iter().all(|&b| b == b'x'));
        assert!(out[255..].iter().all(|&b| b == 0));
    }

    #[test]
    fn read_is_bounded_by_destination() {
        let mut p = plane(16);
        p.write(&UserSlice::new(b"hello world"), 11);

        let mut out = [0u8; 5];
        assert_eq!(p.read(&mut UserSliceMut::new(&mut out)), 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn write_replaces_previous_contents() {
        let mut p = plane(16);
        p.write(&UserSlice::new(b"first write"), 11);
        p.write(&UserSlice::new(b"abc"), 3);
        assert_eq!(p.contents(), b"abc");
        assert_eq!(p.valid_len(), 3);
    }

    #[test]
    fn faulting_source_counts_only_copied_prefix() {
        let mut p = plane(255);
        let payload = [b'z'; 100];
        let src = UserSlice::new(&payload).faulting_at(60);

        assert_eq!(p.write(&src, payload.len()), 60);
        assert_eq!(p.valid_len(), 60);
    }

    #[test]
    fn faulting_destination_reports_partial_read() {
        let mut p = plane(32);
        p.write(&UserSlice::new(b"0123456789"), 10);

        let mut out = [0u8; 10];
        let mut dst = UserSliceMut::new(&mut out).faulting_at(4);
        assert_eq!(p.read(&mut dst), 4);
        assert_eq!(&out[..4], b"0123");
    }

    #[test]
    fn empty_buffer_reads_nothing() {
        let p = plane(8);
        let mut out = [0u8; 8];
        assert_eq!(p.read(&mut UserSliceMut::new(&mut out)), 0);
    }
}
