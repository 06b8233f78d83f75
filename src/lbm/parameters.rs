//! # Lattice Parametrization
//!
//! Converts physical simulation inputs (domain length, viscosity, gravitation,
//! timestep) into the dimensionless constants the lattice kernels consume.
//!
//! Updating is a two-phase contract: the `set_*` mutators only store a physical
//! input, and nothing is re-derived until [`LbmParameters::compute_parametrization`]
//! is called.
//!
//! ## Usage
//!
//! ```rust
//! use cgmath::Vector3;
//! use lbm_free_surface::lbm::parameters::{LbmParameters, TimestepMode};
//!
//! let mut params = LbmParameters::new(
//!     [32, 32, 32],
//!     0.1,
//!     1e-3,
//!     Vector3::new(0.0, -9.81, 0.0),
//!     1e-4,
//!     TimestepMode::Auto,
//!     1.0,
//! );
//! params.compute_parametrization();
//! assert!(params.tau() > 0.5);
//! ```

use cgmath::{InnerSpace, Vector3, Zero};

/// Timestep used when gravitation is too small to derive one from
pub const DEFAULT_TIMESTEP: f64 = 0.001;

/// Gravitation magnitudes below this are treated as zero
const GRAVITATION_EPSILON: f64 = 1e-12;

/// Relaxation times outside this band are reported as potentially unstable
pub const STABLE_TAU_RANGE: (f64, f64) = (0.5, 2.0);

/// How the physical timestep is chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestepMode {
    /// Derive the timestep so that lattice gravitation reaches its maximum length
    Auto,
    /// Use a fixed physical timestep in seconds
    Fixed(f64),
}

impl TimestepMode {
    /// Negative (or non-finite) values request an automatically derived timestep
    pub fn from_signed(timestep: f64) -> Self {
        if timestep.is_finite() && timestep > 0.0 {
            TimestepMode::Fixed(timestep)
        } else {
            TimestepMode::Auto
        }
    }
}

/// Physical inputs and the lattice constants derived from them
#[derive(Debug, Clone, PartialEq)]
pub struct LbmParameters {
    // Physical inputs
    domain_cells: [usize; 3],
    domain_x_length: f64,
    viscosity: f64,
    gravitation: Vector3<f64>,
    max_sim_gravitation_length: f64,
    timestep_mode: TimestepMode,
    mass_exchange_factor: f64,

    // Derived values
    cell_length: f64,
    conversion_timestep: f64,
    timestep: f64,
    lattice_gravitation: Vector3<f64>,
    lattice_viscosity: f64,
    tau: f64,
    inv_tau: f64,
    inv_trt_tau: f64,
}

impl LbmParameters {
    /// Store the physical inputs; call [`compute_parametrization`](Self::compute_parametrization) before use
    pub fn new(
        domain_cells: [usize; 3],
        domain_x_length: f64,
        viscosity: f64,
        gravitation: Vector3<f64>,
        max_sim_gravitation_length: f64,
        timestep_mode: TimestepMode,
        mass_exchange_factor: f64,
    ) -> Self {
        let mut params = Self {
            domain_cells,
            domain_x_length,
            viscosity,
            gravitation,
            max_sim_gravitation_length,
            timestep_mode,
            mass_exchange_factor,
            cell_length: 0.0,
            conversion_timestep: 0.0,
            timestep: 0.0,
            lattice_gravitation: Vector3::zero(),
            lattice_viscosity: 0.0,
            tau: 0.0,
            inv_tau: 0.0,
            inv_trt_tau: 0.0,
        };
        params.update_cell_length();
        params
    }

    fn update_cell_length(&mut self) {
        let cells_x = self.domain_cells[0].max(1) as f64;
        self.cell_length = self.domain_x_length / cells_x;
    }

    /// Re-derive every lattice constant from the current physical inputs
    pub fn compute_parametrization(&mut self) {
        let gravitation_length = self.gravitation.magnitude();
        let max_length = self.max_sim_gravitation_length.abs();

        // Timestep
        self.conversion_timestep = match self.timestep_mode {
            TimestepMode::Fixed(timestep) => timestep,
            TimestepMode::Auto if gravitation_length > GRAVITATION_EPSILON => {
                (max_length * self.cell_length / gravitation_length).sqrt()
            }
            TimestepMode::Auto => DEFAULT_TIMESTEP,
        };

        // Gravitation, shrinking the timestep if the lattice length is exceeded
        self.lattice_gravitation =
            self.gravitation * (self.conversion_timestep * self.conversion_timestep / self.cell_length);
        if self.lattice_gravitation.magnitude() > max_length
            && gravitation_length > GRAVITATION_EPSILON
        {
            self.conversion_timestep = (max_length * self.cell_length / gravitation_length).sqrt();
            self.lattice_gravitation =
                self.gravitation * (self.conversion_timestep * self.conversion_timestep / self.cell_length);
        }

        // Viscosity and relaxation times
        self.lattice_viscosity =
            self.viscosity * self.conversion_timestep / (self.cell_length * self.cell_length);
        self.tau = 3.0 * self.lattice_viscosity + 0.5;
        self.inv_tau = 1.0 / self.tau;
        self.inv_trt_tau = 1.0 / (0.5 + 3.0 / (16.0 * self.tau - 8.0));

        // The mass-exchange factor scales the final timestep only
        self.timestep = self.conversion_timestep * self.mass_exchange_factor;

        if !self.is_tau_stable() {
            log::warn!(
                "relaxation time tau = {} is outside the stable range {:?}",
                self.tau,
                STABLE_TAU_RANGE
            );
        }

        log::debug!(
            "parametrization: dx = {:.3e} m, dt = {:.3e} s (step {:.3e} s), tau = {:.6}, inv_trt_tau = {:.6}, g = ({:.3e}, {:.3e}, {:.3e})",
            self.cell_length,
            self.conversion_timestep,
            self.timestep,
            self.tau,
            self.inv_trt_tau,
            self.lattice_gravitation.x,
            self.lattice_gravitation.y,
            self.lattice_gravitation.z
        );
    }

    pub fn set_gravitation(&mut self, gravitation: Vector3<f64>) {
        self.gravitation = gravitation;
    }

    pub fn set_viscosity(&mut self, viscosity: f64) {
        self.viscosity = viscosity;
    }

    pub fn set_mass_exchange_factor(&mut self, factor: f64) {
        self.mass_exchange_factor = factor;
    }

    pub fn set_domain_x_length(&mut self, length: f64) {
        self.domain_x_length = length;
        self.update_cell_length();
    }

    pub fn set_timestep_mode(&mut self, mode: TimestepMode) {
        self.timestep_mode = mode;
    }

    pub fn set_max_sim_gravitation_length(&mut self, length: f64) {
        self.max_sim_gravitation_length = length;
    }

    /// Changing the cell count changes the cell length as well
    pub fn set_domain_cells(&mut self, domain_cells: [usize; 3]) {
        self.domain_cells = domain_cells;
        self.update_cell_length();
    }

    /// Whether tau lies inside [`STABLE_TAU_RANGE`] (exclusive)
    pub fn is_tau_stable(&self) -> bool {
        self.tau > STABLE_TAU_RANGE.0 && self.tau < STABLE_TAU_RANGE.1
    }

    pub fn domain_cells(&self) -> [usize; 3] {
        self.domain_cells
    }

    pub fn domain_x_length(&self) -> f64 {
        self.domain_x_length
    }

    pub fn viscosity(&self) -> f64 {
        self.viscosity
    }

    pub fn gravitation(&self) -> Vector3<f64> {
        self.gravitation
    }

    pub fn max_sim_gravitation_length(&self) -> f64 {
        self.max_sim_gravitation_length
    }

    pub fn timestep_mode(&self) -> TimestepMode {
        self.timestep_mode
    }

    pub fn mass_exchange_factor(&self) -> f64 {
        self.mass_exchange_factor
    }

    pub fn cell_length(&self) -> f64 {
        self.cell_length
    }

    /// Physical timestep the lattice gravitation and viscosity are derived
    /// from, before the mass-exchange factor is applied
    pub fn conversion_timestep(&self) -> f64 {
        self.conversion_timestep
    }

    /// Physical time advanced by one simulation step: the conversion
    /// timestep multiplied by the mass-exchange factor
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn lattice_gravitation(&self) -> Vector3<f64> {
        self.lattice_gravitation
    }

    pub fn lattice_viscosity(&self) -> f64 {
        self.lattice_viscosity
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn inv_tau(&self) -> f64 {
        self.inv_tau
    }

    pub fn inv_trt_tau(&self) -> f64 {
        self.inv_trt_tau
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water_tank() -> LbmParameters {
        LbmParameters::new(
            [32, 32, 32],
            0.1,
            1e-3,
            Vector3::new(0.0, -9.81, 0.0),
            1e-4,
            TimestepMode::Auto,
            1.0,
        )
    }

    #[test]
    fn test_cell_length() {
        let params = water_tank();
        assert!((params.cell_length() - 0.1 / 32.0).abs() < 1e-15);
    }

    #[test]
    fn test_auto_timestep_reaches_max_gravitation_length() {
        let mut params = water_tank();
        params.compute_parametrization();

        let length = params.lattice_gravitation().magnitude();
        assert!((length - 1e-4).abs() < 1e-12);
        assert!(params.lattice_gravitation().y < 0.0);
    }

    #[test]
    fn test_fixed_timestep_is_shrunk_when_gravitation_too_long() {
        let mut params = water_tank();
        params.set_timestep_mode(TimestepMode::Fixed(0.1));
        params.compute_parametrization();

        assert!(params.conversion_timestep() < 0.1);
        assert!(params.lattice_gravitation().magnitude() <= 1e-4 + 1e-15);
    }

    #[test]
    fn test_small_fixed_timestep_is_kept() {
        let mut params = water_tank();
        params.set_timestep_mode(TimestepMode::Fixed(1e-5));
        params.compute_parametrization();

        assert_eq!(params.conversion_timestep(), 1e-5);
    }

    #[test]
    fn test_zero_gravitation_uses_default_timestep() {
        let mut params = water_tank();
        params.set_gravitation(Vector3::zero());
        params.compute_parametrization();

        assert_eq!(params.conversion_timestep(), DEFAULT_TIMESTEP);
        assert_eq!(params.lattice_gravitation(), Vector3::zero());
    }

    #[test]
    fn test_relaxation_times() {
        let mut params = water_tank();
        params.compute_parametrization();

        let tau = 3.0 * params.lattice_viscosity() + 0.5;
        assert_eq!(params.tau(), tau);
        assert_eq!(params.inv_tau(), 1.0 / tau);
        assert_eq!(params.inv_trt_tau(), 1.0 / (0.5 + 3.0 / (16.0 * tau - 8.0)));
        assert!(params.is_tau_stable());
    }

    #[test]
    fn test_reparametrization_is_idempotent() {
        let mut params = water_tank();
        params.set_mass_exchange_factor(2.0);
        params.compute_parametrization();
        let first = params.clone();
        params.compute_parametrization();

        assert_eq!(first.tau().to_bits(), params.tau().to_bits());
        assert_eq!(first.inv_tau().to_bits(), params.inv_tau().to_bits());
        assert_eq!(first.inv_trt_tau().to_bits(), params.inv_trt_tau().to_bits());
        assert_eq!(first.lattice_gravitation(), params.lattice_gravitation());
        assert_eq!(first.timestep().to_bits(), params.timestep().to_bits());
    }

    #[test]
    fn test_mutators_do_not_rederive() {
        let mut params = water_tank();
        params.compute_parametrization();
        let tau = params.tau();

        params.set_viscosity(5e-3);
        assert_eq!(params.tau(), tau);

        params.compute_parametrization();
        assert!(params.tau() > tau);
    }

    #[test]
    fn test_mass_exchange_factor_scales_final_timestep() {
        let mut params = water_tank();
        params.compute_parametrization();
        let unscaled = params.clone();

        params.set_mass_exchange_factor(3.0);
        params.compute_parametrization();

        assert_eq!(params.conversion_timestep(), unscaled.timestep());
        assert!((params.timestep() - 3.0 * unscaled.timestep()).abs() < 1e-18);
        // Lattice constants come from the unscaled timestep
        assert_eq!(params.tau(), unscaled.tau());
        assert_eq!(params.lattice_gravitation(), unscaled.lattice_gravitation());
    }

    #[test]
    fn test_domain_length_changes_cell_length() {
        let mut params = water_tank();
        params.set_domain_x_length(0.2);
        assert!((params.cell_length() - 0.2 / 32.0).abs() < 1e-15);
    }

    #[test]
    fn test_signed_timestep() {
        assert_eq!(TimestepMode::from_signed(-1.0), TimestepMode::Auto);
        assert_eq!(TimestepMode::from_signed(0.01), TimestepMode::Fixed(0.01));
    }
}
