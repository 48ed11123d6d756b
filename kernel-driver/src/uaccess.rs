//! Caller-space buffers and the partial-copy contract.
//!
//! A user buffer may become inaccessible part way through (an unmapped page,
//! a bad pointer). Copies therefore report how many bytes could *not* be
//! moved instead of failing outright, exactly like `copy_{from,to}_user`.
//! Tests model the bad page with [`UserSlice::faulting_at`].

use crate::error::TransferFault;

/// Source buffer owned by the caller.
#[derive(Debug, Clone, Copy)]
pub struct UserSlice<'a> {
    data: &'a [u8],
    fault_at: Option<usize>,
}

impl<'a> UserSlice<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            fault_at: None,
        }
    }

    /// Every byte from `offset` onwards faults.
    pub fn faulting_at(mut self, offset: usize) -> Self {
        self.fault_at = Some(offset);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn accessible(&self) -> usize {
        self.fault_at
            .map_or(self.data.len(), |at| at.min(self.data.len()))
    }

    /// `access_ok`: can `len` bytes be read without faulting?
    pub fn access_ok(&self, len: usize) -> bool {
        len <= self.accessible()
    }

    /// Fill `dst` from the front of the buffer.
    pub fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), TransferFault> {
        copy_prefix(&self.data[..self.accessible()], dst)
    }
}

/// Destination buffer owned by the caller.
#[derive(Debug)]
pub struct UserSliceMut<'a> {
    data: &'a mut [u8],
    fault_at: Option<usize>,
}

impl<'a> UserSliceMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            fault_at: None,
        }
    }

    pub fn faulting_at(mut self, offset: usize) -> Self {
        self.fault_at = Some(offset);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes before the first faulting one.
    pub fn accessible(&self) -> usize {
        self.fault_at
            .map_or(self.data.len(), |at| at.min(self.data.len()))
    }

    pub fn access_ok(&self, len: usize) -> bool {
        len <= self.accessible()
    }

    /// Copy `src` to the front of the buffer. Bytes beyond the accessible
    /// prefix, or beyond the buffer's end, count as not copied.
    pub fn copy_to_user(&mut self, src: &[u8]) -> Result<(), TransferFault> {
        let n = src.len().min(self.accessible());
        self.data[..n].copy_from_slice(&src[..n]);
        missing(src.len() - n)
    }

    /// Read back from the buffer, for `_IOWR` style arguments.
    pub fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), TransferFault> {
        copy_prefix(&self.data[..self.accessible()], dst)
    }

    pub fn reader(&self) -> UserSlice<'_> {
        UserSlice {
            data: &*self.data,
            fault_at: self.fault_at,
        }
    }
}

fn copy_prefix(src: &[u8], dst: &mut [u8]) -> Result<(), TransferFault> {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    missing(dst.len() - n)
}

fn missing(not_copied: usize) -> Result<(), TransferFault> {
    match not_copied {
        0 => Ok(()),
        not_copied => Err(TransferFault { not_copied }),
    }
}

/// Bytes actually moved by a copy of `requested` bytes.
pub fn transferred(requested: usize, res: Result<(), TransferFault>) -> usize {
    match res {
        Ok(()) => requested,
        Err(fault) => requested - fault.not_copied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_truncates_copy_from_user() {
        let src = *b"abcdef";
        let user = UserSlice::new(&src).faulting_at(4);
        let mut dst = [0u8; 6];

        let res = user.copy_from_user(&mut dst);
        assert_eq!(res, Err(TransferFault { not_copied: 2 }));
        assert_eq!(&dst, b"abcd\0\0");
        assert_eq!(transferred(6, res), 4);
    }

    #[test]
    fn copy_to_user_reports_short_destination() {
        let mut raw = [0u8; 3];
        let mut user = UserSliceMut::new(&mut raw);
        assert_eq!(user.copy_to_user(b"hello"), Err(TransferFault { not_copied: 2 }));
        assert_eq!(&raw, b"hel");
    }

    #[test]
    fn access_ok_respects_fault_offset() {
        let raw = [0u8; 8];
        let user = UserSlice::new(&raw).faulting_at(5);
        assert!(user.access_ok(5));
        assert!(!user.access_ok(6));
        assert!(UserSlice::new(&raw).access_ok(8));
    }
}
