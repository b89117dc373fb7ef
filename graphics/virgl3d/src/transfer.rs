//! Transfer region
//!
//! A fixed-size staging area shared between the guest and the host. Bytes
//! are moved in and out through [`CopySource`] and [`CopyTarget`], the
//! caller-side halves of a copy. Every range is checked against the region
//! before any byte is touched.

use alloc::boxed::Box;
use alloc::vec;

use crate::{Error, Result};

/// Size of one page of the transfer region
pub const PAGE_SIZE: usize = 4096;

/// Caller memory that bytes are copied from
pub trait CopySource {
    /// Fill all of `dest`
    fn copy_in(&self, dest: &mut [u8]) -> Result<()>;
}

/// Caller memory that bytes are copied to
pub trait CopyTarget {
    /// Consume all of `src`
    fn copy_out(&mut self, src: &[u8]) -> Result<()>;
}

impl CopySource for [u8] {
    fn copy_in(&self, dest: &mut [u8]) -> Result<()> {
        let src = self.get(..dest.len()).ok_or(Error::BadAddress)?;
        dest.copy_from_slice(src);
        Ok(())
    }
}

impl CopyTarget for [u8] {
    fn copy_out(&mut self, src: &[u8]) -> Result<()> {
        let dest = self.get_mut(..src.len()).ok_or(Error::BadAddress)?;
        dest.copy_from_slice(src);
        Ok(())
    }
}

/// Bounded staging memory for guest/host transfers
pub struct TransferRegion {
    storage: Box<[u8]>,
    base_address: u64,
}

impl TransferRegion {
    /// Zeroed region of `capacity` bytes, addressed by its own location
    pub fn new(capacity: usize) -> Self {
        let storage = vec![0u8; capacity].into_boxed_slice();
        let base_address = storage.as_ptr() as u64;
        Self {
            storage,
            base_address,
        }
    }

    /// Override the address the host uses to reach the region
    pub fn with_base_address(mut self, base_address: u64) -> Self {
        self.base_address = base_address;
        self
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Check that `offset..offset + length` lies inside the region
    pub fn check_range(&self, offset: usize, length: usize) -> Result<()> {
        let capacity = self.capacity();
        match offset.checked_add(length) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(Error::TransferOutOfBounds {
                offset,
                length,
                capacity,
            }),
        }
    }

    /// Copy `length` bytes from `source` into the region at `offset`
    pub fn write<S>(&mut self, offset: usize, length: usize, source: &S) -> Result<()>
    where
        S: CopySource + ?Sized,
    {
        self.check_range(offset, length)?;
        source.copy_in(&mut self.storage[offset..offset + length])
    }

    /// Copy `length` bytes at `offset` out of the region into `target`
    pub fn read<T>(&self, offset: usize, length: usize, target: &mut T) -> Result<()>
    where
        T: CopyTarget + ?Sized,
    {
        self.check_range(offset, length)?;
        target.copy_out(&self.storage[offset..offset + length])
    }

    /// Region contents
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    /// Mutable region contents, for the host side of a transfer
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage
    }
}
