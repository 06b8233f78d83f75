//! D3Q19 lattice: directions, weights and equilibrium distributions
//!
//! Nineteen velocity directions on a cubic lattice, stored with the rest
//! direction last:
//! - 0..=3, 16, 17: face neighbours (weight 1/18)
//! - 4..=15: edge neighbours (weight 1/36)
//! - 18: rest (weight 1/3)
//!
//! Directions come in opposite pairs `(2k, 2k + 1)`, enumerated by [`DdPair`].

use super::real::Real;

/// Number of lattice directions
pub const Q: usize = 19;

/// Index of the rest direction
pub const REST: usize = 18;

/// Lattice velocity for each direction
pub const DIRECTIONS: [[i32; 3]; Q] = [
    [1, 0, 0],
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [1, 1, 0],
    [-1, -1, 0],
    [1, -1, 0],
    [-1, 1, 0],
    [1, 0, 1],
    [-1, 0, -1],
    [1, 0, -1],
    [-1, 0, 1],
    [0, 1, 1],
    [0, -1, -1],
    [0, 1, -1],
    [0, -1, 1],
    [0, 0, 1],
    [0, 0, -1],
    [0, 0, 0],
];

const FACE: f64 = 1.0 / 18.0;
const EDGE: f64 = 1.0 / 36.0;

/// Equilibrium weight for each direction
pub const WEIGHTS: [f64; Q] = [
    FACE,
    FACE,
    FACE,
    FACE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    EDGE,
    FACE,
    FACE,
    1.0 / 3.0,
];

/// Opposite of each direction
pub const OPPOSITE: [usize; Q] = [
    1, 0, 3, 2, 5, 4, 7, 6, 9, 8, 11, 10, 13, 12, 15, 14, 17, 16, 18,
];

#[inline]
pub fn opposite(direction: usize) -> usize {
    OPPOSITE[direction]
}

/// How the equilibrium distribution treats density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EquilibriumModel {
    /// `w·ρ·(1 + 3(e·u) + 4.5(e·u)² − 1.5u²)`, velocity is momentum / ρ
    #[default]
    Compressible,
    /// `w·(ρ + 3(e·u) + 4.5(e·u)² − 1.5u²)`, velocity is the momentum itself
    Incompressible,
}

impl EquilibriumModel {
    /// Equilibrium for a single direction
    #[inline]
    pub fn equilibrium<T: Real>(self, direction: usize, rho: T, velocity: [T; 3]) -> T {
        let e = DIRECTIONS[direction];
        let eu = dot(e, velocity);
        let uu = velocity[0] * velocity[0] + velocity[1] * velocity[1] + velocity[2] * velocity[2];
        let w = T::from_f64(WEIGHTS[direction]);
        let expansion = T::from_f64(3.0) * eu + T::from_f64(4.5) * eu * eu - T::from_f64(1.5) * uu;
        match self {
            EquilibriumModel::Compressible => w * rho * (T::ONE + expansion),
            EquilibriumModel::Incompressible => w * (rho + expansion),
        }
    }

    /// Equilibrium for all nineteen directions
    pub fn equilibrium_all<T: Real>(self, rho: T, velocity: [T; 3]) -> [T; Q] {
        std::array::from_fn(|direction| self.equilibrium(direction, rho, velocity))
    }

    /// Velocity from density and momentum
    #[inline]
    pub fn velocity<T: Real>(self, rho: T, momentum: [T; 3]) -> [T; 3] {
        match self {
            EquilibriumModel::Compressible => {
                if rho > T::ZERO {
                    let inv_rho = T::ONE / rho;
                    [momentum[0] * inv_rho, momentum[1] * inv_rho, momentum[2] * inv_rho]
                } else {
                    [T::ZERO; 3]
                }
            }
            EquilibriumModel::Incompressible => momentum,
        }
    }
}

#[inline]
fn dot<T: Real>(e: [i32; 3], v: [T; 3]) -> T {
    let mut sum = T::ZERO;
    for axis in 0..3 {
        match e[axis] {
            1 => sum += v[axis],
            -1 => sum -= v[axis],
            _ => {}
        }
    }
    sum
}

/// Projection of a vector onto a lattice direction
#[inline]
pub fn project<T: Real>(direction: usize, v: [T; 3]) -> T {
    dot(DIRECTIONS[direction], v)
}

/// Zeroth and first moments: density and momentum
pub fn moments<T: Real>(dd: &[T; Q]) -> (T, [T; 3]) {
    let mut rho = T::ZERO;
    let mut momentum = [T::ZERO; 3];
    for (direction, &value) in dd.iter().enumerate() {
        rho += value;
        let e = DIRECTIONS[direction];
        for axis in 0..3 {
            match e[axis] {
                1 => momentum[axis] += value,
                -1 => momentum[axis] -= value,
                _ => {}
            }
        }
    }
    (rho, momentum)
}

/// Opposite direction pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DdPair {
    Pair01,
    Pair23,
    Pair45,
    Pair67,
    Pair89,
    Pair1011,
    Pair1213,
    Pair1415,
    Pair1617,
}

impl DdPair {
    pub const ALL: [DdPair; 9] = [
        DdPair::Pair01,
        DdPair::Pair23,
        DdPair::Pair45,
        DdPair::Pair67,
        DdPair::Pair89,
        DdPair::Pair1011,
        DdPair::Pair1213,
        DdPair::Pair1415,
        DdPair::Pair1617,
    ];

    /// The two directions of the pair, positive first
    #[inline]
    pub fn directions(self) -> (usize, usize) {
        let first = self as usize * 2;
        (first, first + 1)
    }

    /// Pair containing `direction`; `None` for the rest direction
    pub fn of(direction: usize) -> Option<DdPair> {
        if direction < REST {
            Some(Self::ALL[direction / 2])
        } else {
            None
        }
    }

    /// `f_eq(a) + f_eq(b)`; the odd velocity terms cancel
    #[inline]
    pub fn combined_equilibrium<T: Real>(self, model: EquilibriumModel, rho: T, velocity: [T; 3]) -> T {
        let (a, _) = self.directions();
        let eu = project(a, velocity);
        let uu = velocity[0] * velocity[0] + velocity[1] * velocity[1] + velocity[2] * velocity[2];
        let w = T::from_f64(WEIGHTS[a]);
        let even = T::from_f64(9.0) * eu * eu - T::from_f64(3.0) * uu;
        match model {
            EquilibriumModel::Compressible => w * rho * (T::from_f64(2.0) + even),
            EquilibriumModel::Incompressible => w * (T::from_f64(2.0) * rho + even),
        }
    }

    /// Rebuild the missing distribution of a pair from the one that was measured
    #[inline]
    pub fn reconstruct<T: Real>(
        self,
        model: EquilibriumModel,
        rho: T,
        velocity: [T; 3],
        measured_other: T,
    ) -> T {
        self.combined_equilibrium(model, rho, velocity) - measured_other
    }
}
