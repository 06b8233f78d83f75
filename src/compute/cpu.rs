//! Multi-threaded CPU implementation of [`ComputeBackend`]
//!
//! Work-groups are evaluated in parallel on a dedicated rayon pool and then
//! committed in group order on the calling thread. Commands execute eagerly,
//! so barriers cost nothing here; in strict mode the backend still tracks
//! them and rejects any dispatch or copy that follows another command
//! without one. Tests use this to check a caller's synchronisation.

use super::buffer::BufferPool;
use super::{BufferHandle, ComputeBackend, Kernel};
use crate::error::ComputeError;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;

/// Command counters, mostly for tests and profiling
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatches: u64,
    pub barriers: u64,
    pub copies: u64,
    pub bytes_read: u64,
}

pub struct CpuBackend {
    buffers: BufferPool,
    pool: ThreadPool,
    threads: usize,
    strict_barriers: bool,
    /// Name of the last command not yet followed by a barrier
    pending: Option<String>,
    stats: DispatchStats,
}

impl CpuBackend {
    /// Backend using one worker per logical CPU
    pub fn new() -> Result<Self, ComputeError> {
        Self::with_threads(num_cpus::get())
    }

    pub fn with_threads(threads: usize) -> Result<Self, ComputeError> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lbm-worker-{}", i))
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        log::debug!("CPU compute backend with {} worker threads", threads);

        Ok(Self {
            buffers: BufferPool::new(),
            pool,
            threads,
            strict_barriers: false,
            pending: None,
            stats: DispatchStats::default(),
        })
    }

    /// Reject dependent commands that are not separated by a barrier
    pub fn with_strict_barriers(mut self, strict: bool) -> Self {
        self.strict_barriers = strict;
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DispatchStats::default();
    }

    /// Direct access to the buffers, bypassing the command queue
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    fn begin_command(&mut self, command: &str) -> Result<(), ComputeError> {
        if self.strict_barriers {
            if let Some(previous) = self.pending.take() {
                return Err(ComputeError::MissingBarrier {
                    command: command.to_string(),
                    previous,
                });
            }
        }
        self.pending = Some(command.to_string());
        Ok(())
    }
}

impl ComputeBackend for CpuBackend {
    fn allocate(&mut self, label: &str, bytes: usize) -> Result<BufferHandle, ComputeError> {
        let handle = self.buffers.insert(label, bytes)?;
        log::trace!("allocated '{}' ({} bytes) as {:?}", label, bytes, handle);
        Ok(handle)
    }

    fn release(&mut self, handle: BufferHandle) -> Result<(), ComputeError> {
        self.buffers.remove(handle)
    }

    fn write_buffer(
        &mut self,
        handle: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> Result<(), ComputeError> {
        self.finish()?;
        self.buffers.write(handle, byte_offset, data)
    }

    fn read_buffer(
        &mut self,
        handle: BufferHandle,
        byte_offset: usize,
        dst: &mut [u8],
    ) -> Result<(), ComputeError> {
        self.finish()?;
        self.buffers.read(handle, byte_offset, dst)?;
        self.stats.bytes_read += dst.len() as u64;
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        byte_range: Range<usize>,
    ) -> Result<(), ComputeError> {
        let label = format!("copy {}", self.buffers.label(dst)?);
        self.begin_command(&label)?;
        self.buffers.copy(src, dst, byte_range)?;
        self.stats.copies += 1;
        Ok(())
    }

    fn dispatch<K: Kernel>(
        &mut self,
        kernel: &K,
        global_size: usize,
        local_size: usize,
    ) -> Result<(), ComputeError> {
        if local_size == 0 {
            return Err(ComputeError::InvalidWorkSize {
                kernel: kernel.name().to_string(),
                global: global_size,
                local: local_size,
            });
        }
        self.begin_command(kernel.name())?;
        log::trace!(
            "dispatch '{}' over {} cells in groups of {}",
            kernel.name(),
            global_size,
            local_size
        );

        let groups = global_size.div_ceil(local_size);
        let buffers = &self.buffers;
        let results: Vec<Vec<K::Output>> = self.pool.install(|| {
            (0..groups)
                .into_par_iter()
                .map(|group| {
                    let start = group * local_size;
                    let end = (start + local_size).min(global_size);
                    let mut out = Vec::with_capacity(end - start);
                    kernel.evaluate(buffers, start..end, &mut out)?;
                    Ok(out)
                })
                .collect::<Result<Vec<_>, ComputeError>>()
        })?;

        for (group, outputs) in results.iter().enumerate() {
            if outputs.len() != (global_size - group * local_size).min(local_size) {
                return Err(ComputeError::KernelFailed {
                    kernel: kernel.name().to_string(),
                    reason: format!(
                        "work-group {} produced {} outputs",
                        group,
                        outputs.len()
                    ),
                });
            }
            kernel.commit(&mut self.buffers, group * local_size, outputs)?;
        }

        self.stats.dispatches += 1;
        Ok(())
    }

    fn enqueue_barrier(&mut self) {
        self.pending = None;
        self.stats.barriers += 1;
    }

    fn finish(&mut self) -> Result<(), ComputeError> {
        // Commands run eagerly; draining only resets barrier tracking
        self.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes the sum of each cell's two neighbours, read from `src`
    struct NeighbourSum {
        src: BufferHandle,
        dst: BufferHandle,
        cells: usize,
    }

    impl Kernel for NeighbourSum {
        type Output = u32;

        fn name(&self) -> &'static str {
            "neighbour_sum"
        }

        fn evaluate(
            &self,
            buffers: &BufferPool,
            cells: Range<usize>,
            out: &mut Vec<u32>,
        ) -> Result<(), ComputeError> {
            let src = buffers.view::<u32>(self.src)?;
            for cell in cells {
                let left = src[(cell + self.cells - 1) % self.cells];
                let right = src[(cell + 1) % self.cells];
                out.push(left + right);
            }
            Ok(())
        }

        fn commit(
            &self,
            buffers: &mut BufferPool,
            first_cell: usize,
            outputs: &[u32],
        ) -> Result<(), ComputeError> {
            let dst = buffers.view_mut::<u32>(self.dst)?;
            dst[first_cell..first_cell + outputs.len()].copy_from_slice(outputs);
            Ok(())
        }
    }

    fn setup(backend: &mut CpuBackend, cells: usize) -> NeighbourSum {
        let src = backend.allocate("src", cells * 4).unwrap();
        let dst = backend.allocate("dst", cells * 4).unwrap();
        let data: Vec<u32> = (0..cells as u32).collect();
        backend.write_slice(src, &data).unwrap();
        NeighbourSum { src, dst, cells }
    }

    #[test]
    fn test_dispatch_covers_partial_groups() {
        let mut backend = CpuBackend::with_threads(4).unwrap();
        let kernel = setup(&mut backend, 10);
        backend.dispatch(&kernel, 10, 4).unwrap();
        let result: Vec<u32> = backend.read_vec(kernel.dst, 10).unwrap();
        assert_eq!(result[0], 9 + 1);
        assert_eq!(result[5], 4 + 6);
        assert_eq!(result[9], 8);
        assert_eq!(backend.stats().dispatches, 1);
        assert_eq!(backend.stats().bytes_read, 40);
    }

    #[test]
    fn test_in_place_dispatch_reads_pre_dispatch_state() {
        let mut backend = CpuBackend::with_threads(2).unwrap();
        let mut kernel = setup(&mut backend, 8);
        kernel.dst = kernel.src;
        backend.dispatch(&kernel, 8, 3).unwrap();
        let result: Vec<u32> = backend.read_vec(kernel.src, 8).unwrap();
        let expected: Vec<u32> = (0..8u32).map(|c| (c + 7) % 8 + (c + 1) % 8).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_strict_mode_requires_barriers() {
        let mut backend = CpuBackend::with_threads(1).unwrap().with_strict_barriers(true);
        let kernel = setup(&mut backend, 4);
        backend.dispatch(&kernel, 4, 4).unwrap();
        let err = backend.copy_buffer(kernel.dst, kernel.src, 0..16).unwrap_err();
        assert!(matches!(err, ComputeError::MissingBarrier { .. }));

        backend.enqueue_barrier();
        backend.copy_buffer(kernel.dst, kernel.src, 0..16).unwrap();
        backend.enqueue_barrier();
        backend.dispatch(&kernel, 4, 4).unwrap();
        assert_eq!(backend.stats().barriers, 2);
    }

    #[test]
    fn test_zero_local_size_is_rejected() {
        let mut backend = CpuBackend::with_threads(1).unwrap();
        let kernel = setup(&mut backend, 4);
        assert!(matches!(
            backend.dispatch(&kernel, 4, 0),
            Err(ComputeError::InvalidWorkSize { local: 0, .. })
        ));
    }
}
