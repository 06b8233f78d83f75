//! # Prelude
//!
//! Commonly used types in one import:
//!
//! ```rust
//! use lbm_free_surface::prelude::*;
//!
//! fn main() -> Result<(), LbmError> {
//!     let config = LbmConfig::default()
//!         .with_domain_cells([8, 8, 8])
//!         .with_init_flags(InitFlags::POOL);
//!     let backend = CpuBackend::with_threads(2).map_err(|e| LbmError::compute("backend", e))?;
//!     let solver = FreeSurfaceSolver::<f32, _>::init(backend, config)?;
//!
//!     let mut simulation = FreeSurfaceSimulation::new(solver).with_steps_per_update(2);
//!     simulation.update(1.0 / 60.0)?;
//!     assert_eq!(simulation.solver().step_counter(), 2);
//!     Ok(())
//! }
//! ```

// Compute runtime
pub use crate::compute::{BufferHandle, ComputeBackend, CpuBackend, Kernel};

// Solver
pub use crate::lbm::d3q19::EquilibriumModel;
pub use crate::lbm::flags::CellFlags;
pub use crate::lbm::parameters::{LbmParameters, TimestepMode};
pub use crate::lbm::real::{Precision, Real};
pub use crate::lbm::scenario::InitFlags;
pub use crate::lbm::solver::{FreeSurfaceSolver, LbmConfig, UpdatePattern};
pub use crate::lbm::validation::{validate_all, DomainSnapshot, ValidationReport};

// Errors
pub use crate::error::{ComputeError, LbmError};

// Driving and monitoring
pub use crate::performance::PerformanceMonitor;
pub use crate::simulation::{FreeSurfaceSimulation, Simulation, SimulationManager};
