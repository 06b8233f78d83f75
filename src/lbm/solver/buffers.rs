//! Buffer ownership for the solver

use super::config::UpdatePattern;
use crate::compute::{BufferHandle, ComputeBackend};
use crate::error::ComputeError;
use crate::lbm::d3q19::Q;
use crate::lbm::kernels::{DdLayout, LatticeFields};

/// Distribution storage for one update pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionBuffers {
    /// AA: a single buffer updated in place
    InPlace(BufferHandle),
    /// AB: two buffers; `read` indexes the one holding the latest values
    PingPong { buffers: [BufferHandle; 2], read: usize },
}

impl DistributionBuffers {
    /// Layout for the step numbered `step`
    pub fn layout(&self, step: u64) -> DdLayout {
        match *self {
            DistributionBuffers::InPlace(dd) if step % 2 == 0 => DdLayout::Alpha { dd },
            DistributionBuffers::InPlace(dd) => DdLayout::Beta { dd },
            DistributionBuffers::PingPong { buffers, read } => DdLayout::PingPong {
                src: buffers[read],
                dst: buffers[1 - read],
            },
        }
    }

    /// Swap read and write roles after a step; no-op in place
    pub fn flip(&mut self) {
        if let DistributionBuffers::PingPong { read, .. } = self {
            *read = 1 - *read;
        }
    }

    /// Buffer holding the most recent outgoing distributions
    pub fn current(&self) -> BufferHandle {
        match *self {
            DistributionBuffers::InPlace(dd) => dd,
            DistributionBuffers::PingPong { buffers, read } => buffers[read],
        }
    }

    pub fn handles(&self) -> Vec<BufferHandle> {
        match *self {
            DistributionBuffers::InPlace(dd) => vec![dd],
            DistributionBuffers::PingPong { buffers, .. } => buffers.to_vec(),
        }
    }
}

/// Every device buffer of a solver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeBuffers {
    pub fields: LatticeFields,
    pub distributions: DistributionBuffers,
}

/// Byte size of `count` elements of `element_size` bytes
fn byte_size(label: &str, count: usize, element_size: usize) -> Result<usize, ComputeError> {
    count
        .checked_mul(element_size)
        .ok_or_else(|| ComputeError::SizeOverflow {
            label: label.to_string(),
            count,
            element_size,
        })
}

impl LatticeBuffers {
    /// Allocate all per-cell buffers for `cells` cells of `real_size`-byte
    /// scalars; nothing stays allocated if any allocation fails
    pub fn allocate<B: ComputeBackend>(
        backend: &mut B,
        cells: usize,
        real_size: usize,
        pattern: UpdatePattern,
    ) -> Result<Self, ComputeError> {
        let scalar = byte_size("density", cells, real_size)?;
        let vector = byte_size("velocity", cells, 3 * real_size)?;
        let dd_bytes = byte_size("dd", cells, Q * real_size)?;

        let mut allocated = Vec::new();
        let result = Self::allocate_all(backend, cells, scalar, vector, dd_bytes, pattern, &mut allocated);
        if result.is_err() {
            for handle in allocated {
                backend.release(handle)?;
            }
        }
        let buffers = result?;

        let total = 6.0 * scalar as f64
            + vector as f64
            + 2.0 * cells as f64
            + pattern.buffer_count() as f64 * dd_bytes as f64;
        log::debug!(
            "allocated lattice buffers for {} cells ({:.2} MiB)",
            cells,
            total / (1024.0 * 1024.0)
        );
        Ok(buffers)
    }

    fn allocate_all<B: ComputeBackend>(
        backend: &mut B,
        cells: usize,
        scalar: usize,
        vector: usize,
        dd_bytes: usize,
        pattern: UpdatePattern,
        allocated: &mut Vec<BufferHandle>,
    ) -> Result<Self, ComputeError> {
        let mut alloc = |label: &str, bytes: usize| -> Result<BufferHandle, ComputeError> {
            let handle = backend.allocate(label, bytes)?;
            allocated.push(handle);
            Ok(handle)
        };

        let fields = LatticeFields {
            flags: alloc("flags", cells)?,
            new_flags: alloc("new_flags", cells)?,
            velocity: alloc("velocity", vector)?,
            density: alloc("density", scalar)?,
            mass: alloc("mass", scalar)?,
            new_mass: alloc("new_mass", scalar)?,
            fraction: alloc("fraction", scalar)?,
            new_fraction: alloc("new_fraction", scalar)?,
        };

        let distributions = match pattern {
            UpdatePattern::AA => DistributionBuffers::InPlace(alloc("dd", dd_bytes)?),
            UpdatePattern::AB => DistributionBuffers::PingPong {
                buffers: [alloc("dd_a", dd_bytes)?, alloc("dd_b", dd_bytes)?],
                read: 0,
            },
        };

        Ok(Self {
            fields,
            distributions,
        })
    }

    pub fn release<B: ComputeBackend>(self, backend: &mut B) -> Result<(), ComputeError> {
        let f = self.fields;
        for handle in [
            f.flags,
            f.new_flags,
            f.velocity,
            f.density,
            f.mass,
            f.new_mass,
            f.fraction,
            f.new_fraction,
        ] {
            backend.release(handle)?;
        }
        for handle in self.distributions.handles() {
            backend.release(handle)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CpuBackend;

    #[test]
    fn test_in_place_layout_alternates() {
        let dd = BufferHandle(0);
        let buffers = DistributionBuffers::InPlace(dd);
        assert_eq!(buffers.layout(0), DdLayout::Alpha { dd });
        assert_eq!(buffers.layout(1), DdLayout::Beta { dd });
        assert_eq!(buffers.layout(2), DdLayout::Alpha { dd });
    }

    #[test]
    fn test_ping_pong_flip() {
        let (a, b) = (BufferHandle(3), BufferHandle(4));
        let mut buffers = DistributionBuffers::PingPong {
            buffers: [a, b],
            read: 0,
        };
        assert_eq!(buffers.layout(0), DdLayout::PingPong { src: a, dst: b });
        buffers.flip();
        assert_eq!(buffers.current(), b);
        assert_eq!(buffers.layout(1), DdLayout::PingPong { src: b, dst: a });
    }

    #[test]
    fn test_allocate_and_release() {
        let mut backend = CpuBackend::with_threads(1).unwrap();
        let buffers = LatticeBuffers::allocate(&mut backend, 64, 4, UpdatePattern::AB).unwrap();
        assert_eq!(backend.buffers().live_buffers(), 10);
        assert_eq!(
            backend.buffers().byte_len(buffers.distributions.current()).unwrap(),
            64 * Q * 4
        );
        buffers.release(&mut backend).unwrap();
        assert_eq!(backend.buffers().live_buffers(), 0);
    }

    #[test]
    fn test_failed_allocation_releases_everything() {
        let mut backend = CpuBackend::with_threads(1).unwrap();
        // Per-cell sizes fit, the 19 distributions do not
        let cells = usize::MAX / 64;
        let result = LatticeBuffers::allocate(&mut backend, cells, 4, UpdatePattern::AA);
        assert!(matches!(result, Err(ComputeError::SizeOverflow { .. })));

        // Flag buffers fit in memory, the velocity buffer does not
        let result = LatticeBuffers::allocate(&mut backend, 1 << 20, 1 << 38, UpdatePattern::AB);
        assert!(matches!(result, Err(ComputeError::AllocationFailed { .. })));
        assert_eq!(backend.buffers().live_buffers(), 0);
    }
}
