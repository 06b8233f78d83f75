//! Flat lattice addressing with periodic wraparound
//!
//! Cells are addressed by a single linear index
//! `x + y·X + z·X·Y`. Neighbours are reached by adding a precomputed
//! non-negative delta and wrapping the result over the whole cell count, so
//! the lattice behaves periodically in memory order.

use super::d3q19::{opposite, DIRECTIONS, Q};
use crate::error::LbmError;

/// How linear indices are folded back into the domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    /// Total cell count is a power of two: `index & mask`
    Bitmask { mask: usize },
    /// Any other cell count: `index % cells`
    Modulo,
}

impl WrapMode {
    pub fn detect(cell_count: usize) -> Self {
        if cell_count.is_power_of_two() {
            WrapMode::Bitmask {
                mask: cell_count - 1,
            }
        } else {
            WrapMode::Modulo
        }
    }
}

/// Linear indexing and neighbour offsets for a domain
#[derive(Debug, Clone, PartialEq)]
pub struct DomainIndexer {
    cells: [usize; 3],
    cell_count: usize,
    wrap_mode: WrapMode,
    /// Added to a cell index to reach `x + e_i`
    deltas: [usize; Q],
}

impl DomainIndexer {
    pub fn new(cells: [usize; 3]) -> Result<Self, LbmError> {
        if cells.iter().any(|&c| c == 0) {
            return Err(LbmError::InvalidDomain {
                cells,
                reason: "every axis needs at least one cell".to_string(),
            });
        }
        let cell_count = cells[0]
            .checked_mul(cells[1])
            .and_then(|c| c.checked_mul(cells[2]))
            .ok_or_else(|| LbmError::InvalidDomain {
                cells,
                reason: "cell count overflows".to_string(),
            })?;

        // Deltas are offset by the cell count so they never go negative
        let deltas = std::array::from_fn(|direction| {
            let e = DIRECTIONS[direction];
            let offset = e[0] as isize
                + e[1] as isize * cells[0] as isize
                + e[2] as isize * (cells[0] * cells[1]) as isize;
            (offset.rem_euclid(cell_count as isize)) as usize
        });

        let wrap_mode = WrapMode::detect(cell_count);
        log::debug!(
            "domain {}x{}x{} ({} cells) uses {:?} wraparound",
            cells[0],
            cells[1],
            cells[2],
            cell_count,
            wrap_mode
        );

        Ok(Self {
            cells,
            cell_count,
            wrap_mode,
            deltas,
        })
    }

    pub fn cells(&self) -> [usize; 3] {
        self.cells
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap_mode
    }

    #[inline]
    pub fn linear_index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.cells[0] + z * self.cells[0] * self.cells[1]
    }

    #[inline]
    pub fn coordinates(&self, index: usize) -> [usize; 3] {
        let slice = self.cells[0] * self.cells[1];
        let z = index / slice;
        let rest = index % slice;
        [rest % self.cells[0], rest / self.cells[0], z]
    }

    /// Fold an index into `0..cell_count`
    #[inline]
    pub fn wrap(&self, index: usize) -> usize {
        match self.wrap_mode {
            WrapMode::Bitmask { mask } => index & mask,
            WrapMode::Modulo => index % self.cell_count,
        }
    }

    /// Reference modulo path, valid for every domain size
    #[inline]
    pub fn wrap_modulo(&self, index: usize) -> usize {
        index % self.cell_count
    }

    /// Additive offset reaching the neighbour along `direction`
    #[inline]
    pub fn delta(&self, direction: usize) -> usize {
        self.deltas[direction]
    }

    /// Offset to read the distribution that streams into `direction`
    #[inline]
    pub fn read_delta(&self, direction: usize) -> usize {
        self.deltas[opposite(direction)]
    }

    /// Offset to write the distribution leaving along `direction`
    #[inline]
    pub fn write_delta(&self, direction: usize) -> usize {
        self.deltas[direction]
    }

    /// `x + e_direction`
    #[inline]
    pub fn neighbor(&self, index: usize, direction: usize) -> usize {
        self.wrap(index + self.deltas[direction])
    }

    /// `x − e_direction`: the cell whose distribution streams into `index`
    #[inline]
    pub fn upstream(&self, index: usize, direction: usize) -> usize {
        self.wrap(index + self.read_delta(direction))
    }

    /// Whether the cell lies on one of the six domain faces
    pub fn is_boundary(&self, index: usize) -> bool {
        let c = self.coordinates(index);
        (0..3).any(|axis| c[axis] == 0 || c[axis] + 1 == self.cells[axis])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lbm::d3q19::REST;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_rejects_empty_axis() {
        assert!(DomainIndexer::new([4, 0, 4]).is_err());
    }

    #[test]
    fn test_wrap_mode_detection() {
        assert_eq!(
            DomainIndexer::new([8, 8, 8]).unwrap().wrap_mode(),
            WrapMode::Bitmask { mask: 511 }
        );
        assert_eq!(DomainIndexer::new([7, 7, 7]).unwrap().wrap_mode(), WrapMode::Modulo);
    }

    #[test]
    fn test_wrap_paths_agree_at_boundaries() {
        for cells in [[8, 8, 8], [7, 7, 7], [16, 4, 2], [6, 4, 2]] {
            let domain = DomainIndexer::new(cells).unwrap();
            let n = domain.cell_count();
            for index in [0, n - 1, n, 2 * n - 1] {
                assert_eq!(domain.wrap(index), domain.wrap_modulo(index), "{:?} at {}", cells, index);
            }
            assert_eq!(domain.wrap(n), 0);
            assert_eq!(domain.wrap(2 * n - 1), n - 1);
        }
    }

    #[test]
    fn test_wrap_paths_agree_randomly() {
        let mut rng = StdRng::seed_from_u64(3);
        let domain = DomainIndexer::new([8, 8, 8]).unwrap();
        for _ in 0..1000 {
            let index = rng.random_range(0..4 * domain.cell_count());
            assert_eq!(domain.wrap(index), domain.wrap_modulo(index));
        }
    }

    #[test]
    fn test_linear_index_roundtrip() {
        let domain = DomainIndexer::new([5, 3, 4]).unwrap();
        assert_eq!(domain.linear_index(1, 2, 3), 1 + 2 * 5 + 3 * 15);
        for index in 0..domain.cell_count() {
            let [x, y, z] = domain.coordinates(index);
            assert_eq!(domain.linear_index(x, y, z), index);
        }
    }

    #[test]
    fn test_neighbors_in_interior() {
        let domain = DomainIndexer::new([7, 7, 7]).unwrap();
        let center = domain.linear_index(3, 3, 3);
        for direction in 0..Q {
            let e = DIRECTIONS[direction];
            let expected = domain.linear_index(
                (3 + e[0]) as usize,
                (3 + e[1]) as usize,
                (3 + e[2]) as usize,
            );
            assert_eq!(domain.neighbor(center, direction), expected);
            assert_eq!(domain.upstream(expected, direction), center);
        }
        assert_eq!(domain.neighbor(center, REST), center);
    }

    #[test]
    fn test_read_and_write_deltas_are_opposite() {
        let domain = DomainIndexer::new([4, 4, 4]).unwrap();
        for direction in 0..Q {
            assert_eq!(domain.write_delta(direction), domain.read_delta(opposite(direction)));
        }
    }

    #[test]
    fn test_negative_offsets_wrap() {
        let domain = DomainIndexer::new([4, 4, 4]).unwrap();
        // Direction 1 is -x; from the origin it wraps to the last cell
        assert_eq!(domain.neighbor(0, 1), domain.cell_count() - 1);
    }

    #[test]
    fn test_boundary_detection() {
        let domain = DomainIndexer::new([4, 4, 4]).unwrap();
        assert!(domain.is_boundary(domain.linear_index(0, 2, 2)));
        assert!(domain.is_boundary(domain.linear_index(1, 3, 1)));
        assert!(!domain.is_boundary(domain.linear_index(1, 2, 2)));
    }
}
