//! Simulation manager
//!
//! Owns the attached simulation and turns elapsed wall-clock time into
//! update calls, either one per call or a whole number of fixed timesteps.

use super::traits::Simulation;
use crate::error::LbmError;

/// Runs a single attached simulation
pub struct SimulationManager {
    simulation: Option<Box<dyn Simulation>>,
    is_paused: bool,
    time_scale: f32,
    accumulated_time: f32,
    fixed_timestep: Option<f32>, // For deterministic simulations
}

impl SimulationManager {
    pub fn new() -> Self {
        Self {
            simulation: None,
            is_paused: false,
            time_scale: 1.0,
            accumulated_time: 0.0,
            fixed_timestep: None,
        }
    }

    /// Attach a simulation, cleaning up and replacing any previous one
    ///
    /// # Arguments
    /// * `simulation` - Boxed simulation implementing the Simulation trait
    pub fn attach_simulation(&mut self, mut simulation: Box<dyn Simulation>) -> Result<(), LbmError> {
        self.detach_simulation();

        simulation.initialize()?;
        log::info!("attached simulation '{}'", simulation.name());
        self.simulation = Some(simulation);
        self.is_paused = false;
        self.accumulated_time = 0.0;
        Ok(())
    }

    pub fn detach_simulation(&mut self) {
        if let Some(mut simulation) = self.simulation.take() {
            simulation.cleanup();
            log::info!("detached simulation '{}'", simulation.name());
        }
    }

    /// Account for `delta_time` seconds of wall-clock time
    ///
    /// Returns the number of update calls made. With a fixed timestep the
    /// remainder carries over to the next call.
    pub fn update(&mut self, delta_time: f32) -> Result<u32, LbmError> {
        if self.is_paused {
            return Ok(0);
        }
        let Some(simulation) = &mut self.simulation else {
            return Ok(0);
        };

        let scaled_delta = delta_time * self.time_scale;
        match self.fixed_timestep {
            Some(fixed_dt) => {
                self.accumulated_time += scaled_delta;

                let mut updates = 0;
                while self.accumulated_time >= fixed_dt {
                    simulation.update(fixed_dt)?;
                    self.accumulated_time -= fixed_dt;
                    updates += 1;
                }
                Ok(updates)
            }
            None => {
                simulation.update(scaled_delta)?;
                Ok(1)
            }
        }
    }

    pub fn reset(&mut self) -> Result<(), LbmError> {
        self.accumulated_time = 0.0;
        match &mut self.simulation {
            Some(simulation) => simulation.reset(),
            None => Ok(()),
        }
    }

    pub fn current_simulation_name(&self) -> Option<&str> {
        self.simulation.as_ref().map(|s| s.name())
    }

    /// `true` if a simulation is attached and not paused
    pub fn is_running(&self) -> bool {
        !self.is_paused && self.simulation.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.is_paused = paused;
        if let Some(simulation) = &mut self.simulation {
            simulation.set_running(!paused);
        }
    }

    /// Fixed timestep in seconds, or `None` for one update per call
    pub fn set_fixed_timestep(&mut self, timestep: Option<f32>) {
        self.fixed_timestep = timestep.filter(|dt| *dt > 0.0);
        self.accumulated_time = 0.0;
    }

    pub fn fixed_timestep(&self) -> Option<f32> {
        self.fixed_timestep
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Time scale multiplier (1.0 = normal speed), never negative
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    pub fn has_simulation(&self) -> bool {
        self.simulation.is_some()
    }
}

impl Default for SimulationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counter {
        updates: Rc<Cell<u32>>,
        running: bool,
    }

    impl Simulation for Counter {
        fn initialize(&mut self) -> Result<(), LbmError> {
            Ok(())
        }

        fn update(&mut self, _delta_time: f32) -> Result<(), LbmError> {
            self.updates.set(self.updates.get() + 1);
            Ok(())
        }

        fn name(&self) -> &str {
            "counter"
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn set_running(&mut self, running: bool) {
            self.running = running;
        }

        fn reset(&mut self) -> Result<(), LbmError> {
            self.updates.set(0);
            Ok(())
        }
    }

    fn manager_with_counter() -> (SimulationManager, Rc<Cell<u32>>) {
        let updates = Rc::new(Cell::new(0));
        let mut manager = SimulationManager::new();
        manager
            .attach_simulation(Box::new(Counter {
                updates: updates.clone(),
                running: true,
            }))
            .unwrap();
        (manager, updates)
    }

    #[test]
    fn test_fixed_timestep_accumulates() {
        let (mut manager, updates) = manager_with_counter();
        manager.set_fixed_timestep(Some(0.25));

        assert_eq!(manager.update(0.1).unwrap(), 0);
        assert_eq!(manager.update(0.2).unwrap(), 1);
        assert_eq!(manager.update(0.5).unwrap(), 2);
        assert_eq!(updates.get(), 3);
    }

    #[test]
    fn test_pause_and_time_scale() {
        let (mut manager, updates) = manager_with_counter();
        manager.set_paused(true);
        assert!(!manager.is_running());
        assert_eq!(manager.update(1.0).unwrap(), 0);

        manager.set_paused(false);
        manager.set_time_scale(-2.0);
        assert_eq!(manager.time_scale(), 0.0);
        manager.set_time_scale(2.0);
        manager.set_fixed_timestep(Some(0.5));
        assert_eq!(manager.update(1.0).unwrap(), 4);
        assert_eq!(updates.get(), 4);
    }

    #[test]
    fn test_variable_timestep_and_detach() {
        let (mut manager, updates) = manager_with_counter();
        assert_eq!(manager.current_simulation_name(), Some("counter"));
        assert_eq!(manager.update(0.016).unwrap(), 1);
        manager.reset().unwrap();
        assert_eq!(updates.get(), 0);

        manager.detach_simulation();
        assert!(!manager.has_simulation());
        assert_eq!(manager.update(1.0).unwrap(), 0);
    }
}
