//! Where each distribution lives for a given lattice update
//!
//! A slot is `(cell, direction)` inside a `[T; 19]`-per-cell buffer.
//! Between steps the buffers always hold every cell's outgoing
//! (post-collision) distributions; the layout says in which slot.
//!
//! | layout | incoming `i` | previous outgoing `i` | new outgoing `i` |
//! |---|---|---|---|
//! | ping-pong | `src[x - e_i][i]` | `src[x][i]` | `dst[x][i]` |
//! | alpha (even AA) | `[x][i]` | `[x + e_i][i]` | `[x][ī]` |
//! | beta (odd AA) | `[x - e_i][ī]` | `[x][ī]` | `[x + e_i][i]` |
//!
//! In the AA layouts the slots a cell reads are exactly the slots it writes,
//! which is what makes the in-place update race free.

use crate::compute::BufferHandle;
use crate::lbm::d3q19::opposite;
use crate::lbm::domain::DomainIndexer;

/// A `(cell, direction)` pair addressing one distribution
pub type Slot = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdLayout {
    /// AB pattern: read `src`, write `dst`
    PingPong { src: BufferHandle, dst: BufferHandle },
    /// AA pattern, even step
    Alpha { dd: BufferHandle },
    /// AA pattern, odd step
    Beta { dd: BufferHandle },
}

impl DdLayout {
    pub fn read_handle(&self) -> BufferHandle {
        match *self {
            DdLayout::PingPong { src, .. } => src,
            DdLayout::Alpha { dd } | DdLayout::Beta { dd } => dd,
        }
    }

    pub fn write_handle(&self) -> BufferHandle {
        match *self {
            DdLayout::PingPong { dst, .. } => dst,
            DdLayout::Alpha { dd } | DdLayout::Beta { dd } => dd,
        }
    }

    /// Slot in the read buffer holding what streams into `cell` along `direction`
    #[inline]
    pub fn incoming(&self, domain: &DomainIndexer, cell: usize, direction: usize) -> Slot {
        match self {
            DdLayout::PingPong { .. } => (domain.upstream(cell, direction), direction),
            DdLayout::Alpha { .. } => (cell, direction),
            DdLayout::Beta { .. } => (domain.upstream(cell, direction), opposite(direction)),
        }
    }

    /// Slot in the read buffer holding what `cell` emitted along `direction` last step
    #[inline]
    pub fn previous_outgoing(&self, domain: &DomainIndexer, cell: usize, direction: usize) -> Slot {
        match self {
            DdLayout::PingPong { .. } => (cell, direction),
            DdLayout::Alpha { .. } => (domain.neighbor(cell, direction), direction),
            DdLayout::Beta { .. } => (cell, opposite(direction)),
        }
    }

    /// Slot in the write buffer receiving what `cell` emits along `direction` this step
    #[inline]
    pub fn outgoing(&self, domain: &DomainIndexer, cell: usize, direction: usize) -> Slot {
        match self {
            DdLayout::PingPong { .. } => (cell, direction),
            DdLayout::Alpha { .. } => (cell, opposite(direction)),
            DdLayout::Beta { .. } => (domain.neighbor(cell, direction), direction),
        }
    }

    /// The layout whose "previous outgoing" slots are this layout's outgoing slots
    pub fn next(&self) -> DdLayout {
        match *self {
            DdLayout::PingPong { src, dst } => DdLayout::PingPong { src: dst, dst: src },
            DdLayout::Alpha { dd } => DdLayout::Beta { dd },
            DdLayout::Beta { dd } => DdLayout::Alpha { dd },
        }
    }
}
