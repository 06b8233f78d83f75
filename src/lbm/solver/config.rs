//! Solver configuration

use crate::lbm::d3q19::EquilibriumModel;
use crate::lbm::parameters::{LbmParameters, TimestepMode};
use crate::lbm::real::Precision;
use crate::lbm::scenario::InitFlags;
use cgmath::Vector3;

/// How distributions are buffered between steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdatePattern {
    /// One buffer updated in place, alternating alpha and beta steps
    #[default]
    AA,
    /// Two buffers, read from one and written to the other
    AB,
}

impl UpdatePattern {
    /// Number of distribution buffers the pattern needs
    pub fn buffer_count(&self) -> usize {
        match self {
            UpdatePattern::AA => 1,
            UpdatePattern::AB => 2,
        }
    }
}

/// Everything needed to set up a [`FreeSurfaceSolver`](super::FreeSurfaceSolver)
///
/// ```rust
/// use lbm_free_surface::lbm::scenario::InitFlags;
/// use lbm_free_surface::lbm::solver::{LbmConfig, UpdatePattern};
///
/// let config = LbmConfig::default()
///     .with_domain_cells([16, 16, 16])
///     .with_pattern(UpdatePattern::AB)
///     .with_init_flags(InitFlags::POOL | InitFlags::WATER_SPHERE);
/// assert_eq!(config.cell_count(), 4096);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LbmConfig {
    pub domain_cells: [usize; 3],
    /// Physical length of the domain along x in metres
    pub domain_x_length: f64,
    /// Kinematic viscosity in m²/s
    pub viscosity: f64,
    /// Physical gravitation in m/s²
    pub gravitation: Vector3<f64>,
    /// Upper bound on the lattice gravitation length
    pub max_gravitation_length: f64,
    pub timestep: TimestepMode,
    pub mass_exchange_factor: f64,
    /// Work-group size used for every dispatch
    pub max_parallelism: usize,
    pub init_flags: InitFlags,
    pub pattern: UpdatePattern,
    pub equilibrium: EquilibriumModel,
    pub precision: Precision,
}

impl Default for LbmConfig {
    fn default() -> Self {
        Self {
            domain_cells: [32, 32, 32],
            domain_x_length: 0.1,
            viscosity: 1e-3,
            gravitation: Vector3::new(0.0, -9.81, 0.0),
            max_gravitation_length: 1e-4,
            timestep: TimestepMode::Auto,
            mass_exchange_factor: 1.0,
            max_parallelism: 128,
            init_flags: InitFlags::BREAKING_DAM,
            pattern: UpdatePattern::AA,
            equilibrium: EquilibriumModel::Compressible,
            precision: Precision::Single,
        }
    }
}

impl LbmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain_cells(mut self, domain_cells: [usize; 3]) -> Self {
        self.domain_cells = domain_cells;
        self
    }

    pub fn with_domain_x_length(mut self, length: f64) -> Self {
        self.domain_x_length = length;
        self
    }

    pub fn with_viscosity(mut self, viscosity: f64) -> Self {
        self.viscosity = viscosity;
        self
    }

    pub fn with_gravitation(mut self, gravitation: Vector3<f64>) -> Self {
        self.gravitation = gravitation;
        self
    }

    pub fn with_max_gravitation_length(mut self, length: f64) -> Self {
        self.max_gravitation_length = length;
        self
    }

    /// Negative values select [`TimestepMode::Auto`]
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = TimestepMode::from_signed(timestep);
        self
    }

    pub fn with_mass_exchange_factor(mut self, factor: f64) -> Self {
        self.mass_exchange_factor = factor;
        self
    }

    pub fn with_max_parallelism(mut self, work_group_size: usize) -> Self {
        self.max_parallelism = work_group_size;
        self
    }

    pub fn with_init_flags(mut self, flags: InitFlags) -> Self {
        self.init_flags = flags;
        self
    }

    pub fn with_pattern(mut self, pattern: UpdatePattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_equilibrium(mut self, equilibrium: EquilibriumModel) -> Self {
        self.equilibrium = equilibrium;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn cell_count(&self) -> usize {
        self.domain_cells.iter().product()
    }

    /// Parameters for this configuration, already parametrized
    pub fn parameters(&self) -> LbmParameters {
        let mut parameters = LbmParameters::new(
            self.domain_cells,
            self.domain_x_length,
            self.viscosity,
            self.gravitation,
            self.max_gravitation_length,
            self.timestep,
            self.mass_exchange_factor,
        );
        parameters.compute_parametrization();
        parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LbmConfig::default();
        assert_eq!(config.domain_cells, [32, 32, 32]);
        assert_eq!(config.pattern, UpdatePattern::AA);
        assert_eq!(config.precision, Precision::Single);
        assert_eq!(config.init_flags, InitFlags::BREAKING_DAM);
        assert_eq!(config.timestep, TimestepMode::Auto);
    }

    #[test]
    fn test_builder_and_parameters() {
        let config = LbmConfig::new()
            .with_domain_cells([8, 4, 2])
            .with_domain_x_length(0.8)
            .with_timestep(-1.0)
            .with_gravitation(Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(config.cell_count(), 64);
        assert_eq!(config.timestep, TimestepMode::Auto);

        let parameters = config.parameters();
        assert!((parameters.cell_length() - 0.1).abs() < 1e-12);
        assert!(parameters.tau() > 0.5);
    }

    #[test]
    fn test_buffer_counts() {
        assert_eq!(UpdatePattern::AA.buffer_count(), 1);
        assert_eq!(UpdatePattern::AB.buffer_count(), 2);
    }
}
