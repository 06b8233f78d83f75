//! Host-side buffer storage for the CPU backend

use super::BufferHandle;
use crate::error::ComputeError;
use bytemuck::Pod;
use std::ops::Range;

/// One allocation; stored as 8-byte words so any `Pod` scalar view is aligned
#[derive(Debug, Clone)]
struct Buffer {
    label: String,
    words: Vec<u64>,
    len: usize,
}

impl Buffer {
    fn new(label: &str, len: usize) -> Result<Self, ComputeError> {
        let word_count = len.div_ceil(8);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| ComputeError::AllocationFailed {
                label: label.to_string(),
                bytes: len,
            })?;
        words.resize(word_count, 0);
        Ok(Self {
            label: label.to_string(),
            words,
            len,
        })
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..len]
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), ComputeError> {
        if range.start > range.end || range.end > self.len {
            return Err(ComputeError::OutOfRange {
                label: self.label.clone(),
                start: range.start,
                end: range.end,
                len: self.len,
            });
        }
        Ok(())
    }
}

/// Every live buffer of a backend, addressed by [`BufferHandle`]
///
/// Kernels read typed views through [`BufferPool::view`] during evaluation
/// and write through [`BufferPool::view_mut`] during commit.
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: Vec<Option<Buffer>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, label: &str, bytes: usize) -> Result<BufferHandle, ComputeError> {
        let buffer = Buffer::new(label, bytes)?;
        // Reuse released slots first
        if let Some(slot) = self.buffers.iter().position(|b| b.is_none()) {
            self.buffers[slot] = Some(buffer);
            Ok(BufferHandle(slot))
        } else {
            self.buffers.push(Some(buffer));
            Ok(BufferHandle(self.buffers.len() - 1))
        }
    }

    pub(crate) fn remove(&mut self, handle: BufferHandle) -> Result<(), ComputeError> {
        self.buffers
            .get_mut(handle.0)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(ComputeError::InvalidHandle(handle.0))
    }

    fn get(&self, handle: BufferHandle) -> Result<&Buffer, ComputeError> {
        self.buffers
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(ComputeError::InvalidHandle(handle.0))
    }

    fn get_mut(&mut self, handle: BufferHandle) -> Result<&mut Buffer, ComputeError> {
        self.buffers
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(ComputeError::InvalidHandle(handle.0))
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    pub fn byte_len(&self, handle: BufferHandle) -> Result<usize, ComputeError> {
        Ok(self.get(handle)?.len)
    }

    pub fn label(&self, handle: BufferHandle) -> Result<&str, ComputeError> {
        Ok(&self.get(handle)?.label)
    }

    /// Typed read-only view of a whole buffer
    pub fn view<T: Pod>(&self, handle: BufferHandle) -> Result<&[T], ComputeError> {
        let buffer = self.get(handle)?;
        bytemuck::try_cast_slice(buffer.bytes()).map_err(|_| ComputeError::TypeMismatch {
            label: buffer.label.clone(),
            len: buffer.len,
            element_size: std::mem::size_of::<T>(),
        })
    }

    /// Typed mutable view of a whole buffer
    pub fn view_mut<T: Pod>(&mut self, handle: BufferHandle) -> Result<&mut [T], ComputeError> {
        let buffer = self.get_mut(handle)?;
        let (label, len) = (buffer.label.clone(), buffer.len);
        bytemuck::try_cast_slice_mut(buffer.bytes_mut()).map_err(|_| ComputeError::TypeMismatch {
            label,
            len,
            element_size: std::mem::size_of::<T>(),
        })
    }

    pub(crate) fn write(
        &mut self,
        handle: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> Result<(), ComputeError> {
        let buffer = self.get_mut(handle)?;
        let range = byte_offset..byte_offset.saturating_add(data.len());
        buffer.check_range(&range)?;
        buffer.bytes_mut()[range].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn read(
        &self,
        handle: BufferHandle,
        byte_offset: usize,
        dst: &mut [u8],
    ) -> Result<(), ComputeError> {
        let buffer = self.get(handle)?;
        let range = byte_offset..byte_offset.saturating_add(dst.len());
        buffer.check_range(&range)?;
        dst.copy_from_slice(&buffer.bytes()[range]);
        Ok(())
    }

    pub(crate) fn copy(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        range: Range<usize>,
    ) -> Result<(), ComputeError> {
        self.get(src)?.check_range(&range)?;
        self.get(dst)?.check_range(&range)?;
        if src == dst {
            return Ok(());
        }
        let staging = self.get(src)?.bytes()[range.clone()].to_vec();
        self.get_mut(dst)?.bytes_mut()[range].copy_from_slice(&staging);
        Ok(())
    }
}
