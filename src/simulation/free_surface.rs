//! Free-surface solver behind the [`Simulation`] lifecycle

use super::traits::Simulation;
use crate::compute::ComputeBackend;
use crate::error::LbmError;
use crate::lbm::real::Real;
use crate::lbm::solver::FreeSurfaceSolver;
use crate::performance::PerformanceMonitor;

/// Runs a fixed number of solver steps per update, optionally pulling the
/// total mass back to its reset baseline at a regular step interval
pub struct FreeSurfaceSimulation<T: Real, B: ComputeBackend> {
    solver: FreeSurfaceSolver<T, B>,
    monitor: PerformanceMonitor,
    name: String,
    running: bool,
    steps_per_update: u32,
    normalize_every: Option<u64>,
}

impl<T: Real, B: ComputeBackend> FreeSurfaceSimulation<T, B> {
    pub fn new(solver: FreeSurfaceSolver<T, B>) -> Self {
        Self {
            solver,
            monitor: PerformanceMonitor::new(),
            name: "Free Surface LBM".to_string(),
            running: true,
            steps_per_update: 1,
            normalize_every: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_steps_per_update(mut self, steps: u32) -> Self {
        self.steps_per_update = steps;
        self
    }

    /// Normalise mass whenever the step counter is a multiple of `steps`;
    /// `None` or `Some(0)` disables it
    pub fn with_mass_normalization(mut self, steps: Option<u64>) -> Self {
        self.normalize_every = steps.filter(|&n| n > 0);
        self
    }

    /// Run exactly `steps` solver steps, ignoring the running state
    pub fn advance(&mut self, steps: u32) -> Result<(), LbmError> {
        let cells = self.solver.cell_count();
        for _ in 0..steps {
            self.monitor.begin_step();
            self.solver.simulation_step()?;
            self.monitor.end_step(cells);

            if let Some(interval) = self.normalize_every {
                if self.solver.step_counter() % interval == 0 {
                    let factor = self.solver.normalize_mass()?;
                    log::debug!(
                        "normalized mass at step {} (factor {:.9})",
                        self.solver.step_counter(),
                        factor
                    );
                }
            }
        }
        Ok(())
    }

    pub fn solver(&self) -> &FreeSurfaceSolver<T, B> {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut FreeSurfaceSolver<T, B> {
        &mut self.solver
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut PerformanceMonitor {
        &mut self.monitor
    }

    pub fn steps_per_update(&self) -> u32 {
        self.steps_per_update
    }

    pub fn into_solver(self) -> FreeSurfaceSolver<T, B> {
        self.solver
    }
}

impl<T: Real, B: ComputeBackend> Simulation for FreeSurfaceSimulation<T, B> {
    fn initialize(&mut self) -> Result<(), LbmError> {
        log::info!(
            "{}: {} cells, {} steps per update",
            self.name,
            self.solver.cell_count(),
            self.steps_per_update
        );
        self.monitor.reset();
        Ok(())
    }

    fn update(&mut self, _delta_time: f32) -> Result<(), LbmError> {
        if !self.running {
            return Ok(());
        }
        self.advance(self.steps_per_update)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    fn reset(&mut self) -> Result<(), LbmError> {
        self.monitor.reset();
        self.solver.reset_fluid()
    }

    fn cleanup(&mut self) {
        self.monitor.update_metrics();
        log::info!("{}: {}", self.name, self.monitor.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CpuBackend;
    use crate::lbm::scenario::InitFlags;
    use crate::lbm::solver::LbmConfig;
    use crate::simulation::SimulationManager;

    fn simulation() -> FreeSurfaceSimulation<f32, CpuBackend> {
        let config = LbmConfig::default()
            .with_domain_cells([8, 8, 8])
            .with_init_flags(InitFlags::POOL);
        let solver = FreeSurfaceSolver::init(CpuBackend::with_threads(2).unwrap(), config).unwrap();
        FreeSurfaceSimulation::new(solver).with_steps_per_update(3)
    }

    #[test]
    fn test_update_runs_configured_steps() {
        let mut sim = simulation();
        sim.update(0.016).unwrap();
        assert_eq!(sim.solver().step_counter(), 3);

        sim.set_running(false);
        sim.update(0.016).unwrap();
        assert_eq!(sim.solver().step_counter(), 3);

        sim.reset().unwrap();
        assert_eq!(sim.solver().step_counter(), 0);
    }

    #[test]
    fn test_normalization_restores_baseline() {
        let mut sim = simulation().with_mass_normalization(Some(2));
        sim.advance(4).unwrap();
        let solver = sim.solver_mut();
        let drift = solver.mass_reduction().unwrap() - solver.baseline_mass();
        assert!(drift.abs() < 1e-3 * solver.baseline_mass());
    }

    #[test]
    fn test_driven_by_manager() {
        let mut manager = SimulationManager::new();
        manager.attach_simulation(Box::new(simulation())).unwrap();
        manager.set_fixed_timestep(Some(0.5));
        assert_eq!(manager.update(1.0).unwrap(), 2);
        assert_eq!(manager.current_simulation_name(), Some("Free Surface LBM"));
    }
}
