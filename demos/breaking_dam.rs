//! Headless breaking dam run with periodic diagnostics
//!
//! `RUST_LOG=info cargo run --release --example breaking_dam [cells] [steps]`

use anyhow::{Context, Result};
use lbm_free_surface::compute::CpuBackend;
use lbm_free_surface::lbm::scenario::InitFlags;
use lbm_free_surface::lbm::solver::{FreeSurfaceSolver, LbmConfig, UpdatePattern};
use lbm_free_surface::lbm::validation::validate_all;
use lbm_free_surface::simulation::{FreeSurfaceSimulation, Simulation, SimulationManager};

const REPORT_EVERY: u64 = 100;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let cells: usize = args.next().map(|a| a.parse()).transpose().context("cells")?.unwrap_or(64);
    let steps: u64 = args.next().map(|a| a.parse()).transpose().context("steps")?.unwrap_or(1000);

    let config = LbmConfig::default()
        .with_domain_cells([cells, cells, cells])
        .with_init_flags(InitFlags::BREAKING_DAM | InitFlags::OBSTACLE_VERTICAL_BAR)
        .with_pattern(UpdatePattern::AA);
    let backend = CpuBackend::new()?;
    let solver = FreeSurfaceSolver::<f32, _>::init(backend, config)?;
    let mut simulation = FreeSurfaceSimulation::new(solver)
        .with_name("Breaking Dam")
        .with_mass_normalization(Some(500));
    simulation.initialize()?;

    while simulation.solver().step_counter() < steps {
        simulation.advance(REPORT_EVERY.min(steps - simulation.solver().step_counter()) as u32)?;
        simulation.monitor_mut().update_metrics();
        let throughput = simulation.monitor().summary();

        let solver = simulation.solver_mut();
        let diagnostics = solver.diagnostics()?;
        println!(
            "step {:>6}  t = {:.4} s  mass = {:.4} ({:+.2e})  max |u| = {:.4}  {}",
            solver.step_counter(),
            solver.simulated_time(),
            diagnostics.mass,
            diagnostics.mass / solver.baseline_mass() - 1.0,
            diagnostics.max_velocity,
            throughput
        );
    }

    let solver = simulation.solver_mut();
    let snapshot = solver.snapshot()?;
    let report = validate_all(&snapshot, solver.parameters(), solver.baseline_mass());
    report.log();
    println!("validation: {} anomalies", report.len());

    // Same scenario again through the manager's fixed timestep loop
    let mut manager = SimulationManager::new();
    manager.attach_simulation(Box::new(simulation))?;
    manager.set_fixed_timestep(Some(1.0 / 60.0));
    manager.reset()?;
    let updates = manager.update(0.5)?;
    println!("manager ran {} updates in half a second of simulated wall time", updates);
    manager.detach_simulation();

    Ok(())
}
