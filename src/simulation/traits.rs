//! Core simulation trait
//!
//! Defines the lifecycle a simulation goes through when it is driven by a
//! [`SimulationManager`](super::manager::SimulationManager).

use crate::error::LbmError;

/// Lifecycle of a steppable simulation
pub trait Simulation {
    /// Called once when the simulation is attached to a manager
    fn initialize(&mut self) -> Result<(), LbmError>;

    /// Advance the simulation
    ///
    /// # Arguments
    /// * `delta_time` - Wall-clock time to account for, in seconds
    fn update(&mut self, delta_time: f32) -> Result<(), LbmError>;

    /// Name used in log output
    fn name(&self) -> &str;

    fn is_running(&self) -> bool;

    /// Start/pause simulation
    fn set_running(&mut self, running: bool);

    /// Return to the initial state
    fn reset(&mut self) -> Result<(), LbmError>;

    /// Called when the simulation is detached or replaced
    fn cleanup(&mut self) {}
}
