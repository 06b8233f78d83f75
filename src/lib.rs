//! Free-surface lattice Boltzmann solver
//!
//! A D3Q19 lattice Boltzmann fluid solver with a volume-of-fluid free
//! surface, running its stencil kernels on a pluggable compute backend.
//! A multi-threaded CPU backend is included.

pub mod compute;
pub mod error;
pub mod lbm;
pub mod performance;
pub mod prelude;
pub mod simulation;

pub use error::{ComputeError, LbmError};
pub use lbm::solver::{FreeSurfaceSolver, LbmConfig, UpdatePattern};
