//! Initial conditions
//!
//! [`InitFlags`] selects one or more geometric generators; [`Scenario`]
//! turns the selection into a primary flag per cell. Generators combine by
//! union: a cell is fluid when any fluid generator claims it, and obstacle
//! generators override fluid. The six domain faces are always obstacle.
//! Closing the interface (fluid next to gas becomes interface) is done by
//! the init kernel, which looks at neighbours.

use super::domain::DomainIndexer;
use super::flags::CellFlags;
use bitflags::bitflags;

bitflags! {
    /// Initial-condition generators, combinable with `|`
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InitFlags: u32 {
        /// Fluid column against the -x wall
        const BREAKING_DAM = 1 << 0;
        /// Shallow fluid layer along the floor
        const POOL = 1 << 1;
        /// Fluid sphere hanging in the upper half
        const WATER_SPHERE = 1 << 2;
        /// Solid half sphere resting on the floor
        const OBSTACLE_HALF_SPHERE = 1 << 3;
        /// Solid bar spanning the full height
        const OBSTACLE_VERTICAL_BAR = 1 << 4;
        /// Whole domain fluid except for a gas bubble in the centre
        const FLUID_WITH_GAS_SPHERE = 1 << 5;
        /// Whole domain fluid
        const FILLED = 1 << 6;
    }
}

impl InitFlags {
    /// Decode a raw bitmask; unknown bits are dropped
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bits_truncate(raw)
    }
}

impl Default for InitFlags {
    fn default() -> Self {
        InitFlags::BREAKING_DAM
    }
}

// Proportions of the domain used by the generators
const DAM_WIDTH: f64 = 1.0 / 3.0;
const DAM_HEIGHT: f64 = 2.0 / 3.0;
const POOL_HEIGHT: f64 = 0.3;
const WATER_SPHERE_CENTER: [f64; 3] = [0.5, 0.7, 0.5];
const WATER_SPHERE_RADIUS: f64 = 0.15;
const HALF_SPHERE_RADIUS: f64 = 0.25;
const BAR_X: (f64, f64) = (0.6, 0.7);
const BAR_Z: (f64, f64) = (0.4, 0.6);
const GAS_SPHERE_RADIUS: f64 = 0.2;

/// Geometry of a set of initial-condition generators on a domain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scenario {
    flags: InitFlags,
    cells: [usize; 3],
}

impl Scenario {
    pub fn new(flags: InitFlags, cells: [usize; 3]) -> Self {
        Self { flags, cells }
    }

    pub fn flags(&self) -> InitFlags {
        self.flags
    }

    /// Primary geometric state of a cell: obstacle, fluid or gas
    pub fn classify(&self, x: usize, y: usize, z: usize) -> CellFlags {
        if self.is_wall(x, y, z) || self.is_obstacle(x, y, z) {
            CellFlags::OBSTACLE
        } else if self.is_fluid(x, y, z) {
            CellFlags::FLUID
        } else {
            CellFlags::GAS
        }
    }

    /// Classification by linear index
    pub fn classify_index(&self, domain: &DomainIndexer, index: usize) -> CellFlags {
        let [x, y, z] = domain.coordinates(index);
        self.classify(x, y, z)
    }

    fn is_wall(&self, x: usize, y: usize, z: usize) -> bool {
        let c = [x, y, z];
        (0..3).any(|axis| c[axis] == 0 || c[axis] + 1 >= self.cells[axis])
    }

    /// Cell centre in units of the smallest domain extent
    fn normalized(&self, x: usize, y: usize, z: usize) -> [f64; 3] {
        let c = [x, y, z];
        std::array::from_fn(|axis| (c[axis] as f64 + 0.5) / self.cells[axis] as f64)
    }

    fn scaled_distance(&self, point: [f64; 3], center: [f64; 3]) -> f64 {
        // Distances are measured in cells relative to the smallest extent so
        // spheres stay round in non-cubic domains
        let min_extent = self.cells.iter().copied().min().unwrap_or(1) as f64;
        let d: [f64; 3] =
            std::array::from_fn(|axis| (point[axis] - center[axis]) * self.cells[axis] as f64);
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt() / min_extent
    }

    fn is_obstacle(&self, x: usize, y: usize, z: usize) -> bool {
        let p = self.normalized(x, y, z);

        if self.flags.contains(InitFlags::OBSTACLE_HALF_SPHERE)
            && self.scaled_distance(p, [0.5, 0.0, 0.5]) < HALF_SPHERE_RADIUS
        {
            return true;
        }

        self.flags.contains(InitFlags::OBSTACLE_VERTICAL_BAR)
            && (BAR_X.0..BAR_X.1).contains(&p[0])
            && (BAR_Z.0..BAR_Z.1).contains(&p[2])
    }

    fn is_fluid(&self, x: usize, y: usize, z: usize) -> bool {
        let p = self.normalized(x, y, z);
        let flags = self.flags;

        if flags.contains(InitFlags::FILLED) {
            return true;
        }
        if flags.contains(InitFlags::BREAKING_DAM) && p[0] < DAM_WIDTH && p[1] < DAM_HEIGHT {
            return true;
        }
        if flags.contains(InitFlags::POOL) && p[1] < POOL_HEIGHT {
            return true;
        }
        if flags.contains(InitFlags::WATER_SPHERE)
            && self.scaled_distance(p, WATER_SPHERE_CENTER) < WATER_SPHERE_RADIUS
        {
            return true;
        }
        flags.contains(InitFlags::FLUID_WITH_GAS_SPHERE)
            && self.scaled_distance(p, [0.5; 3]) >= GAS_SPHERE_RADIUS
    }

    /// Axis-aligned bounds `[min, max)` per axis of every geometric fluid cell,
    /// or `None` when the scenario places no fluid
    pub fn fluid_bounds(&self) -> Option<[(usize, usize); 3]> {
        let mut bounds: Option<[(usize, usize); 3]> = None;
        for z in 0..self.cells[2] {
            for y in 0..self.cells[1] {
                for x in 0..self.cells[0] {
                    if self.classify(x, y, z) != CellFlags::FLUID {
                        continue;
                    }
                    let c = [x, y, z];
                    let b = bounds.get_or_insert([(x, x + 1), (y, y + 1), (z, z + 1)]);
                    for axis in 0..3 {
                        b[axis].0 = b[axis].0.min(c[axis]);
                        b[axis].1 = b[axis].1.max(c[axis] + 1);
                    }
                }
            }
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(scenario: &Scenario, state: CellFlags) -> usize {
        let [nx, ny, nz] = scenario.cells;
        let mut n = 0;
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    if scenario.classify(x, y, z) == state {
                        n += 1;
                    }
                }
            }
        }
        n
    }

    #[test]
    fn test_filled_domain_is_fluid_inside_walls() {
        let scenario = Scenario::new(InitFlags::FILLED, [4, 4, 4]);
        assert_eq!(count(&scenario, CellFlags::FLUID), 8);
        assert_eq!(count(&scenario, CellFlags::OBSTACLE), 56);
        assert_eq!(count(&scenario, CellFlags::GAS), 0);
    }

    #[test]
    fn test_breaking_dam_occupies_lower_corner() {
        let scenario = Scenario::new(InitFlags::BREAKING_DAM, [32, 32, 32]);
        assert_eq!(scenario.classify(2, 2, 16), CellFlags::FLUID);
        assert_eq!(scenario.classify(20, 2, 16), CellFlags::GAS);
        assert_eq!(scenario.classify(2, 28, 16), CellFlags::GAS);
        assert_eq!(scenario.classify(0, 2, 16), CellFlags::OBSTACLE);

        let bounds = scenario.fluid_bounds().unwrap();
        assert_eq!(bounds[0].0, 1);
        assert!(bounds[0].1 <= 11);
        assert!(bounds[1].1 <= 22);
    }

    #[test]
    fn test_obstacles_override_fluid() {
        let flags = InitFlags::FILLED | InitFlags::OBSTACLE_VERTICAL_BAR;
        let scenario = Scenario::new(flags, [20, 10, 20]);
        assert_eq!(scenario.classify(12, 5, 10), CellFlags::OBSTACLE);
        assert_eq!(scenario.classify(5, 5, 10), CellFlags::FLUID);
    }

    #[test]
    fn test_gas_bubble_inside_fluid() {
        let scenario = Scenario::new(InitFlags::FLUID_WITH_GAS_SPHERE, [16, 16, 16]);
        assert_eq!(scenario.classify(8, 8, 8), CellFlags::GAS);
        assert_eq!(scenario.classify(2, 2, 2), CellFlags::FLUID);
    }

    #[test]
    fn test_unknown_bits_are_ignored() {
        let flags = InitFlags::from_raw(InitFlags::POOL.bits() | 1 << 20);
        assert_eq!(flags, InitFlags::POOL);
    }

    #[test]
    fn test_empty_selection_is_all_gas() {
        let scenario = Scenario::new(InitFlags::empty(), [6, 6, 6]);
        assert_eq!(count(&scenario, CellFlags::FLUID), 0);
        assert!(scenario.fluid_bounds().is_none());
    }
}
