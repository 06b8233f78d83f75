//! Simulation driving
//!
//! [`Simulation`] is the lifecycle a manager drives, [`SimulationManager`]
//! maps elapsed time to updates, and [`FreeSurfaceSimulation`] runs a
//! [`FreeSurfaceSolver`](crate::lbm::solver::FreeSurfaceSolver) behind that
//! interface.

pub mod free_surface;
pub mod manager;
pub mod traits;

pub use free_surface::FreeSurfaceSimulation;
pub use manager::SimulationManager;
pub use traits::Simulation;
