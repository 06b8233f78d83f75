//! Opt-in consistency checks on a read-only copy of the domain
//!
//! None of these run during a step. Take a [`DomainSnapshot`] from the solver
//! (see `FreeSurfaceSolver::snapshot`) and run individual validators or
//! [`validate_all`]. Each returns a [`ValidationReport`] listing anomalies;
//! an empty report means the check passed.

use super::d3q19::REST;
use super::domain::DomainIndexer;
use super::flags::CellFlags;
use super::parameters::{LbmParameters, STABLE_TAU_RANGE};
use std::fmt;

/// Density range accepted for fluid and interface cells by [`validate_all`]
pub const DEFAULT_DENSITY_RANGE: (f64, f64) = (0.0, 2.0);

/// Relative drift of total mass accepted by [`validate_all`]
pub const DEFAULT_MASS_TOLERANCE: f64 = 1e-3;

/// Per-cell fields copied back from the device, widened to `f64`
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSnapshot {
    pub domain: DomainIndexer,
    pub step: u64,
    pub flags: Vec<u8>,
    pub density: Vec<f64>,
    pub velocity: Vec<[f64; 3]>,
    pub mass: Vec<f64>,
    pub fraction: Vec<f64>,
}

impl DomainSnapshot {
    pub fn cell_count(&self) -> usize {
        self.flags.len()
    }

    pub fn flag(&self, cell: usize) -> CellFlags {
        CellFlags::from_raw(self.flags[cell])
    }

    /// Cells whose primary state matches `state`
    pub fn cells_with(&self, state: CellFlags) -> impl Iterator<Item = usize> + '_ {
        (0..self.cell_count()).filter(move |&cell| self.flag(cell).primary() == state)
    }

    /// Σ mass over fluid and interface cells
    pub fn total_mass(&self) -> f64 {
        (0..self.cell_count())
            .filter(|&cell| self.flag(cell).is_liquid())
            .map(|cell| self.mass[cell])
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub check: &'static str,
    /// Offending cell, or `None` for domain-wide findings
    pub cell: Option<usize>,
    pub message: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell {
            Some(cell) => write!(f, "[{}] cell {}: {}", self.check, cell, self.message),
            None => write!(f, "[{}] {}", self.check, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub anomalies: Vec<Anomaly>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    fn push(&mut self, check: &'static str, cell: Option<usize>, message: String) {
        self.anomalies.push(Anomaly {
            check,
            cell,
            message,
        });
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.anomalies.extend(other.anomalies);
    }

    /// Emit every anomaly as a warning
    pub fn log(&self) {
        for anomaly in &self.anomalies {
            log::warn!("{}", anomaly);
        }
    }
}

/// Every cell has exactly one primary state, no unknown bits and no
/// transition bits left over between steps
pub fn validate_flags(snapshot: &DomainSnapshot) -> ValidationReport {
    let mut report = ValidationReport::new();
    let known = (CellFlags::PRIMARY | CellFlags::TRANSIENT).raw();
    for cell in 0..snapshot.cell_count() {
        let raw = snapshot.flags[cell];
        let flags = CellFlags::from_raw(raw);
        if !flags.has_single_primary() {
            report.push("flags", Some(cell), format!("primary state {:#04x}", flags.primary().raw()));
        }
        if raw & !known != 0 {
            report.push("flags", Some(cell), format!("unknown bits {:#04x}", raw & !known));
        }
        if flags.intersects(CellFlags::TRANSIENT) {
            report.push("flags", Some(cell), format!("transition bits left set: {:?}", flags));
        }
    }
    report
}

/// No fluid cell touches a gas cell
pub fn validate_closed_interface(snapshot: &DomainSnapshot) -> ValidationReport {
    let mut report = ValidationReport::new();
    let domain = &snapshot.domain;
    for cell in snapshot.cells_with(CellFlags::FLUID) {
        for direction in 0..REST {
            let neighbor = domain.neighbor(cell, direction);
            if snapshot.flag(neighbor).is_gas() {
                report.push(
                    "closed_interface",
                    Some(cell),
                    format!("fluid cell touches gas cell {} (direction {})", neighbor, direction),
                );
            }
        }
    }
    report
}

/// Fluid and interface densities are finite and inside `range` (exclusive)
pub fn validate_density(snapshot: &DomainSnapshot, range: (f64, f64)) -> ValidationReport {
    let mut report = ValidationReport::new();
    for cell in 0..snapshot.cell_count() {
        if !snapshot.flag(cell).is_liquid() {
            continue;
        }
        let rho = snapshot.density[cell];
        if !rho.is_finite() || rho <= range.0 || rho >= range.1 {
            report.push("density", Some(cell), format!("density {} outside {:?}", rho, range));
        }
    }
    report
}

/// Masses are finite, gas and obstacle cells carry none, and the total stays
/// within `relative_tolerance` of `expected_total`
pub fn validate_mass(
    snapshot: &DomainSnapshot,
    expected_total: f64,
    relative_tolerance: f64,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    for cell in 0..snapshot.cell_count() {
        let mass = snapshot.mass[cell];
        if !mass.is_finite() {
            report.push("mass", Some(cell), format!("non-finite mass {}", mass));
        } else if snapshot.flag(cell).is_gas_or_obstacle() && mass != 0.0 {
            report.push("mass", Some(cell), format!("{:?} cell holds mass {}", snapshot.flag(cell), mass));
        }
    }

    let total = snapshot.total_mass();
    let allowed = relative_tolerance * expected_total.abs().max(f64::MIN_POSITIVE);
    if !total.is_finite() || (total - expected_total).abs() > allowed {
        report.push(
            "mass",
            None,
            format!("total mass {} drifted from {} (allowed ±{})", total, expected_total, allowed),
        );
    }
    report
}

/// Fluid cells are full, gas and obstacle cells empty, and interface fill
/// levels equal mass over density
pub fn validate_fluid_fraction(snapshot: &DomainSnapshot) -> ValidationReport {
    let mut report = ValidationReport::new();
    for cell in 0..snapshot.cell_count() {
        let flags = snapshot.flag(cell);
        let fraction = snapshot.fraction[cell];
        let expected = if flags.is_fluid() {
            1.0
        } else if flags.is_interface() {
            let rho = snapshot.density[cell];
            if rho > 0.0 {
                snapshot.mass[cell] / rho
            } else {
                0.0
            }
        } else {
            0.0
        };
        let tolerance = 1e-4 * expected.abs().max(1.0);
        if !fraction.is_finite() || (fraction - expected).abs() > tolerance {
            report.push(
                "fluid_fraction",
                Some(cell),
                format!("{:?} cell has fraction {}, expected {}", flags.primary(), fraction, expected),
            );
        }
    }
    report
}

/// Relaxation time inside the stable band and lattice gravitation bounded
pub fn validate_parameters(parameters: &LbmParameters) -> ValidationReport {
    let mut report = ValidationReport::new();
    if !parameters.is_tau_stable() {
        report.push(
            "parameters",
            None,
            format!("tau = {} outside stable range {:?}", parameters.tau(), STABLE_TAU_RANGE),
        );
    }
    if !parameters.inv_trt_tau().is_finite() {
        report.push(
            "parameters",
            None,
            format!("inv_trt_tau = {} is not finite", parameters.inv_trt_tau()),
        );
    }
    let g = parameters.lattice_gravitation();
    let length = (g.x * g.x + g.y * g.y + g.z * g.z).sqrt();
    let limit = parameters.max_sim_gravitation_length().abs();
    if length > limit * (1.0 + 1e-9) {
        report.push(
            "parameters",
            None,
            format!("lattice gravitation {} exceeds {}", length, limit),
        );
    }
    report
}

/// Every check with default tolerances
pub fn validate_all(
    snapshot: &DomainSnapshot,
    parameters: &LbmParameters,
    expected_mass: f64,
) -> ValidationReport {
    let mut report = validate_flags(snapshot);
    report.merge(validate_closed_interface(snapshot));
    report.merge(validate_density(snapshot, DEFAULT_DENSITY_RANGE));
    report.merge(validate_mass(snapshot, expected_mass, DEFAULT_MASS_TOLERANCE));
    report.merge(validate_fluid_fraction(snapshot));
    report.merge(validate_parameters(parameters));
    report
}
