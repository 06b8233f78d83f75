//! Compute runtime the solver dispatches its kernels to
//!
//! The solver only ever talks to a [`ComputeBackend`]: it allocates untyped
//! buffers, uploads initial data, dispatches [`Kernel`]s over the cell range,
//! separates dependent work with barriers and reads results back. Kernels
//! follow a two-phase contract so that a dispatch always observes the state
//! as it was before the dispatch started:
//!
//! 1. `evaluate` runs per work-group, possibly in parallel, with read-only
//!    access to every buffer and produces one output record per cell.
//! 2. `commit` writes the records back, each cell touching only its own
//!    output slots.

pub mod buffer;
pub mod cpu;

pub use buffer::BufferPool;
pub use cpu::{CpuBackend, DispatchStats};

use crate::error::ComputeError;
use bytemuck::Pod;
use std::ops::Range;

/// Opaque handle to a backend buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) usize);

impl BufferHandle {
    pub fn id(&self) -> usize {
        self.0
    }
}

/// A data-parallel stencil executed once per cell
pub trait Kernel: Sync {
    /// Per-cell result produced by `evaluate` and consumed by `commit`
    type Output: Send;

    fn name(&self) -> &'static str;

    /// Compute results for `cells` without mutating any buffer
    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<Self::Output>,
    ) -> Result<(), ComputeError>;

    /// Store results for the cells starting at `first_cell`
    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[Self::Output],
    ) -> Result<(), ComputeError>;
}

/// Primitives the solver needs from a compute device
pub trait ComputeBackend {
    fn allocate(&mut self, label: &str, bytes: usize) -> Result<BufferHandle, ComputeError>;

    fn release(&mut self, handle: BufferHandle) -> Result<(), ComputeError>;

    /// Blocking upload
    fn write_buffer(
        &mut self,
        handle: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> Result<(), ComputeError>;

    /// Blocking readback; drains the queue first
    fn read_buffer(
        &mut self,
        handle: BufferHandle,
        byte_offset: usize,
        dst: &mut [u8],
    ) -> Result<(), ComputeError>;

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        byte_range: Range<usize>,
    ) -> Result<(), ComputeError>;

    fn dispatch<K: Kernel>(
        &mut self,
        kernel: &K,
        global_size: usize,
        local_size: usize,
    ) -> Result<(), ComputeError>;

    /// Make every previously enqueued command visible to the next one
    fn enqueue_barrier(&mut self);

    /// Block until all enqueued work has completed
    fn finish(&mut self) -> Result<(), ComputeError>;

    /// Upload a typed slice to the start of a buffer
    fn write_slice<T: Pod>(&mut self, handle: BufferHandle, data: &[T]) -> Result<(), ComputeError> {
        self.write_buffer(handle, 0, bytemuck::cast_slice(data))
    }

    /// Read the first `dst.len()` elements of a buffer
    fn read_slice<T: Pod>(&mut self, handle: BufferHandle, dst: &mut [T]) -> Result<(), ComputeError> {
        self.read_buffer(handle, 0, bytemuck::cast_slice_mut(dst))
    }

    /// Read the first `len` elements of a buffer into a new vector
    fn read_vec<T: Pod>(&mut self, handle: BufferHandle, len: usize) -> Result<Vec<T>, ComputeError> {
        let mut data = vec![T::zeroed(); len];
        self.read_slice(handle, &mut data)?;
        Ok(data)
    }
}
