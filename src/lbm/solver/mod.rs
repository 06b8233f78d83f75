//! # Free-Surface Solver
//!
//! [`FreeSurfaceSolver`] owns every lattice buffer on a [`ComputeBackend`]
//! and sequences the stencil kernels into simulation steps. Two buffering
//! disciplines are supported through [`UpdatePattern`]:
//!
//! - **AA**: one distribution buffer updated in place, alternating alpha
//!   (even) and beta (odd) steps. An extra pass computes the exchanged mass
//!   before the in-place update overwrites the slots it reads.
//! - **AB**: two distribution buffers swapped after every step.
//!
//! Both run the same stages in the same order with a barrier after every
//! dispatch and copy, and produce identical results.
//!
//! ## Errors
//!
//! Every failure is returned as an [`LbmError`] and also recorded in the
//! solver's [`ErrorAccumulator`]. While errors are pending the solver refuses
//! to step; [`FreeSurfaceSolver::reload`] clears them.
//!
//! ## Usage
//!
//! ```rust
//! use cgmath::Vector3;
//! use lbm_free_surface::compute::CpuBackend;
//! use lbm_free_surface::lbm::scenario::InitFlags;
//! use lbm_free_surface::lbm::solver::{FreeSurfaceSolver, LbmConfig};
//!
//! let config = LbmConfig::default()
//!     .with_domain_cells([8, 8, 8])
//!     .with_init_flags(InitFlags::POOL);
//! let backend = CpuBackend::with_threads(2).unwrap();
//! let mut solver = FreeSurfaceSolver::<f32, _>::init(backend, config).unwrap();
//!
//! for _ in 0..5 {
//!     solver.simulation_step().unwrap();
//! }
//! let drift = solver.mass_reduction().unwrap() - solver.baseline_mass();
//! assert!(drift.abs() < 1e-3);
//! ```

pub mod buffers;
pub mod config;

pub use buffers::{DistributionBuffers, LatticeBuffers};
pub use config::{LbmConfig, UpdatePattern};

use crate::compute::{BufferHandle, ComputeBackend, Kernel};
use crate::error::{ComputeError, ErrorAccumulator, LbmError};
use crate::lbm::d3q19::Q;
use crate::lbm::domain::DomainIndexer;
use crate::lbm::kernels::{
    ExchangeMassKernel, GasToInterfaceKernel, GatherMassKernel, InitKernel,
    InterfaceToFluidNeighborsKernel, InterfaceToGasKernel, InterfaceToGasNeighborsKernel,
    KernelConstants, LatticeFields, MassScaleKernel, StreamCollideKernel,
};
use crate::lbm::flags::CellFlags;
use crate::lbm::parameters::{LbmParameters, TimestepMode};
use crate::lbm::real::{Precision, Real};
use crate::lbm::scenario::{InitFlags, Scenario};
use crate::lbm::validation::DomainSnapshot;
use cgmath::Vector3;

/// Full-domain reductions over fluid and interface cells, in `f64`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Diagnostics {
    pub mass: f64,
    pub density_checksum: f64,
    pub velocity_checksum: f64,
    pub max_velocity: f64,
    pub liquid_cells: usize,
}

pub struct FreeSurfaceSolver<T: Real, B: ComputeBackend> {
    backend: B,
    config: LbmConfig,
    parameters: LbmParameters,
    constants: KernelConstants<T>,
    domain: DomainIndexer,
    buffers: Option<LatticeBuffers>,
    step_counter: u64,
    baseline_mass: f64,
    errors: ErrorAccumulator,
}

/// Dispatch over the whole domain and fence it off from what follows
fn run_stage<B: ComputeBackend, K: Kernel>(
    backend: &mut B,
    kernel: &K,
    cells: usize,
    local_size: usize,
) -> Result<(), ComputeError> {
    backend.dispatch(kernel, cells, local_size)?;
    backend.enqueue_barrier();
    Ok(())
}

/// Make the flags written by the previous stage visible to the next one
fn publish_flags<B: ComputeBackend>(
    backend: &mut B,
    fields: &LatticeFields,
    cells: usize,
) -> Result<(), ComputeError> {
    backend.copy_buffer(fields.new_flags, fields.flags, 0..cells)?;
    backend.enqueue_barrier();
    Ok(())
}

impl<T: Real, B: ComputeBackend> FreeSurfaceSolver<T, B> {
    /// Validate the configuration, allocate every buffer and set up the
    /// initial scenario
    pub fn init(backend: B, config: LbmConfig) -> Result<Self, LbmError> {
        if config.precision != T::PRECISION {
            let error = LbmError::UnsupportedPrecision {
                requested: config.precision,
                available: T::PRECISION,
            };
            log::error!("{}", error);
            return Err(error);
        }

        let domain = DomainIndexer::new(config.domain_cells)?;
        let parameters = config.parameters();
        let constants = KernelConstants::from_parameters(&parameters, config.equilibrium);

        log::info!(
            "initializing {:?} solver: {:?} cells, {:?} pattern, {:?} precision",
            config.equilibrium,
            config.domain_cells,
            config.pattern,
            config.precision
        );

        let mut solver = Self {
            backend,
            config,
            parameters,
            constants,
            domain,
            buffers: None,
            step_counter: 0,
            baseline_mass: 0.0,
            errors: ErrorAccumulator::new(),
        };
        solver.reload()?;
        Ok(solver)
    }

    fn record<R>(&mut self, result: Result<R, LbmError>) -> Result<R, LbmError> {
        result.map_err(|error| self.errors.record(error))
    }

    fn record_compute<R>(
        &mut self,
        operation: &'static str,
        result: Result<R, ComputeError>,
    ) -> Result<R, LbmError> {
        self.record(result.map_err(|error| LbmError::compute(operation, error)))
    }

    fn lattice_buffers(&self) -> Result<&LatticeBuffers, LbmError> {
        self.buffers
            .as_ref()
            .ok_or(LbmError::Unusable(self.errors.len()))
    }

    fn local_size(&self) -> usize {
        self.config.max_parallelism.max(1)
    }

    /// Reallocate every buffer for the configured domain size and reset the
    /// fluid; clears previously recorded errors
    pub fn reload(&mut self) -> Result<(), LbmError> {
        self.errors.clear();

        if let Some(old) = self.buffers.take() {
            let released = old.release(&mut self.backend);
            self.record_compute("reload", released)?;
        }

        let domain = DomainIndexer::new(self.config.domain_cells);
        self.domain = self.record(domain)?;
        self.parameters.set_domain_cells(self.config.domain_cells);
        self.refresh_constants();

        let allocated = LatticeBuffers::allocate(
            &mut self.backend,
            self.domain.cell_count(),
            std::mem::size_of::<T>(),
            self.config.pattern,
        );
        self.buffers = Some(self.record_compute("reload", allocated)?);

        log::info!(
            "reloaded {}x{}x{} domain ({:?} wraparound)",
            self.config.domain_cells[0],
            self.config.domain_cells[1],
            self.config.domain_cells[2],
            self.domain.wrap_mode()
        );
        self.reset_fluid()
    }

    /// Reinitialise every cell from the configured scenario and record the
    /// resulting mass as the baseline
    pub fn reset_fluid(&mut self) -> Result<(), LbmError> {
        let dispatched = self.dispatch_init();
        self.record_compute("reset_fluid", dispatched)?;

        self.step_counter = 0;
        self.baseline_mass = self.mass_reduction()?;
        log::info!(
            "fluid reset with {:?}: baseline mass {:.6}",
            self.config.init_flags,
            self.baseline_mass
        );
        Ok(())
    }

    fn dispatch_init(&mut self) -> Result<(), ComputeError> {
        let local_size = self.local_size();
        let Some(buffers) = self.buffers.as_mut() else {
            return Err(ComputeError::KernelFailed {
                kernel: "init".to_string(),
                reason: "buffers are not allocated".to_string(),
            });
        };
        let scenario = Scenario::new(self.config.init_flags, self.domain.cells());
        let distributions = buffers.distributions.handles();
        let kernel = InitKernel::<T>::new(&self.domain, &scenario, &buffers.fields, &distributions);
        run_stage(&mut self.backend, &kernel, self.domain.cell_count(), local_size)?;
        if let DistributionBuffers::PingPong { read, .. } = &mut buffers.distributions {
            *read = 0;
        }
        self.backend.finish()
    }

    /// Select a different scenario for the next [`reset_fluid`](Self::reset_fluid)
    pub fn set_init_flags(&mut self, flags: InitFlags) {
        self.config.init_flags = flags;
    }

    /// Advance the simulation by exactly one timestep
    pub fn simulation_step(&mut self) -> Result<(), LbmError> {
        if self.errors.has_errors() {
            return Err(LbmError::Unusable(self.errors.len()));
        }
        let dispatched = self.dispatch_step();
        self.record_compute("simulation_step", dispatched)?;
        self.step_counter += 1;
        Ok(())
    }

    fn dispatch_step(&mut self) -> Result<(), ComputeError> {
        let local = self.local_size();
        let Self {
            backend,
            config,
            constants,
            domain,
            buffers,
            step_counter,
            ..
        } = self;
        let Some(buffers) = buffers.as_mut() else {
            return Err(ComputeError::KernelFailed {
                kernel: "stream_collide".to_string(),
                reason: "buffers are not allocated".to_string(),
            });
        };
        let domain: &DomainIndexer = domain;
        let constants: &KernelConstants<T> = constants;
        let cells = domain.cell_count();
        let fields = &buffers.fields;
        let layout = buffers.distributions.layout(*step_counter);
        let in_place = config.pattern == UpdatePattern::AA;
        log::trace!("step {} with {:?}", step_counter, layout);

        if in_place {
            let pre = ExchangeMassKernel {
                domain,
                fields,
                constants,
                layout,
            };
            run_stage(backend, &pre, cells, local)?;
        }

        let main = StreamCollideKernel {
            domain,
            fields,
            constants,
            layout,
            exchange_precomputed: in_place,
        };
        run_stage(backend, &main, cells, local)?;
        publish_flags(backend, fields, cells)?;

        run_stage(
            backend,
            &InterfaceToFluidNeighborsKernel::<T>::new(domain, fields),
            cells,
            local,
        )?;
        publish_flags(backend, fields, cells)?;

        run_stage(backend, &InterfaceToGasKernel::<T>::new(fields), cells, local)?;
        publish_flags(backend, fields, cells)?;

        run_stage(
            backend,
            &InterfaceToGasNeighborsKernel::<T>::new(domain, fields),
            cells,
            local,
        )?;
        publish_flags(backend, fields, cells)?;

        run_stage(backend, &GatherMassKernel::<T>::new(domain, fields), cells, local)?;

        let gas_to_interface =
            GasToInterfaceKernel::<T>::new(domain, fields, constants.equilibrium, layout);
        run_stage(backend, &gas_to_interface, cells, local)?;
        publish_flags(backend, fields, cells)?;

        buffers.distributions.flip();
        Ok(())
    }

    /// Multiply the mass of every cell by `factor`, outside the step sequence
    pub fn scale_mass(&mut self, factor: f64) -> Result<(), LbmError> {
        let dispatched = self.dispatch_mass_scale(factor);
        self.record_compute("scale_mass", dispatched)?;
        log::debug!("scaled mass by {}", factor);
        Ok(())
    }

    fn dispatch_mass_scale(&mut self, factor: f64) -> Result<(), ComputeError> {
        let local = self.local_size();
        let Some(buffers) = self.buffers.as_ref() else {
            return Err(ComputeError::KernelFailed {
                kernel: "mass_scale".to_string(),
                reason: "buffers are not allocated".to_string(),
            });
        };
        let kernel = MassScaleKernel {
            fields: &buffers.fields,
            factor: T::from_f64(factor),
        };
        run_stage(&mut self.backend, &kernel, self.domain.cell_count(), local)
    }

    /// Rescale the total mass back to the baseline recorded at the last
    /// reset; returns the applied factor
    pub fn normalize_mass(&mut self) -> Result<f64, LbmError> {
        let current = self.mass_reduction()?;
        if current <= 0.0 || self.baseline_mass <= 0.0 {
            return Ok(1.0);
        }
        let factor = self.baseline_mass / current;
        self.scale_mass(factor)?;
        Ok(factor)
    }

    fn refresh_constants(&mut self) {
        self.parameters.compute_parametrization();
        self.constants = KernelConstants::from_parameters(&self.parameters, self.config.equilibrium);
    }

    pub fn update_viscosity(&mut self, viscosity: f64) {
        self.config.viscosity = viscosity;
        self.parameters.set_viscosity(viscosity);
        self.refresh_constants();
    }

    pub fn update_gravitation(&mut self, gravitation: Vector3<f64>) {
        self.config.gravitation = gravitation;
        self.parameters.set_gravitation(gravitation);
        self.refresh_constants();
    }

    pub fn update_domain_x_length(&mut self, length: f64) {
        self.config.domain_x_length = length;
        self.parameters.set_domain_x_length(length);
        self.refresh_constants();
    }

    pub fn update_mass_exchange_factor(&mut self, factor: f64) {
        self.config.mass_exchange_factor = factor;
        self.parameters.set_mass_exchange_factor(factor);
        self.refresh_constants();
    }

    pub fn update_timestep(&mut self, timestep: TimestepMode) {
        self.config.timestep = timestep;
        self.parameters.set_timestep_mode(timestep);
        self.refresh_constants();
    }

    pub fn update_max_gravitation_length(&mut self, length: f64) {
        self.config.max_gravitation_length = length;
        self.parameters.set_max_sim_gravitation_length(length);
        self.refresh_constants();
    }

    /// Change the domain size; takes effect through [`reload`](Self::reload)
    pub fn set_domain_cells(&mut self, domain_cells: [usize; 3]) {
        self.config.domain_cells = domain_cells;
    }

    fn read_field<F: bytemuck::Pod>(
        &mut self,
        field: &'static str,
        handle: impl Fn(&LatticeBuffers) -> BufferHandle,
        per_cell: usize,
        dst: &mut [F],
    ) -> Result<(), LbmError> {
        let expected = self.domain.cell_count() * per_cell;
        if dst.len() != expected {
            return self.record(Err(LbmError::ReadbackSize {
                field,
                expected,
                actual: dst.len(),
            }));
        }
        let handle = handle(self.lattice_buffers()?);
        let read = self.backend.read_slice(handle, dst);
        self.record_compute(field, read)
    }

    fn read_vec<F: bytemuck::Pod>(
        &mut self,
        field: &'static str,
        handle: impl Fn(&LatticeBuffers) -> BufferHandle,
        per_cell: usize,
    ) -> Result<Vec<F>, LbmError> {
        let mut data = vec![F::zeroed(); self.domain.cell_count() * per_cell];
        self.read_field(field, handle, per_cell, &mut data)?;
        Ok(data)
    }

    /// Copy velocities (`3 × cells`, x y z per cell) into `dst`
    pub fn store_velocity(&mut self, dst: &mut [T]) -> Result<(), LbmError> {
        self.read_field("velocity", |b| b.fields.velocity, 3, dst)
    }

    pub fn store_density(&mut self, dst: &mut [T]) -> Result<(), LbmError> {
        self.read_field("density", |b| b.fields.density, 1, dst)
    }

    pub fn store_mass(&mut self, dst: &mut [T]) -> Result<(), LbmError> {
        self.read_field("mass", |b| b.fields.mass, 1, dst)
    }

    pub fn store_fraction(&mut self, dst: &mut [T]) -> Result<(), LbmError> {
        self.read_field("fraction", |b| b.fields.fraction, 1, dst)
    }

    pub fn store_flags(&mut self, dst: &mut [u8]) -> Result<(), LbmError> {
        self.read_field("flags", |b| b.fields.flags, 1, dst)
    }

    /// Copy the raw distribution buffer holding the latest values
    /// (`19 × cells`), in the storage layout of the step that produced them
    pub fn store_distributions(&mut self, dst: &mut [T]) -> Result<(), LbmError> {
        self.read_field("distributions", |b| b.distributions.current(), Q, dst)
    }

    /// All full-domain reductions from a single readback
    pub fn diagnostics(&mut self) -> Result<Diagnostics, LbmError> {
        let flags: Vec<u8> = self.read_vec("flags", |b| b.fields.flags, 1)?;
        let mass: Vec<T> = self.read_vec("mass", |b| b.fields.mass, 1)?;
        let density: Vec<T> = self.read_vec("density", |b| b.fields.density, 1)?;
        let velocity: Vec<T> = self.read_vec("velocity", |b| b.fields.velocity, 3)?;

        let mut diagnostics = Diagnostics::default();
        for (cell, &raw) in flags.iter().enumerate() {
            if !CellFlags::from_raw(raw).is_liquid() {
                continue;
            }
            let u = [
                velocity[3 * cell].to_f64(),
                velocity[3 * cell + 1].to_f64(),
                velocity[3 * cell + 2].to_f64(),
            ];
            diagnostics.liquid_cells += 1;
            diagnostics.mass += mass[cell].to_f64();
            diagnostics.density_checksum += density[cell].to_f64();
            diagnostics.velocity_checksum += u[0] + u[1] + u[2];
            let speed = (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]).sqrt();
            diagnostics.max_velocity = diagnostics.max_velocity.max(speed);
        }
        Ok(diagnostics)
    }

    /// Σ mass over fluid and interface cells
    pub fn mass_reduction(&mut self) -> Result<f64, LbmError> {
        let flags: Vec<u8> = self.read_vec("flags", |b| b.fields.flags, 1)?;
        let mass: Vec<T> = self.read_vec("mass", |b| b.fields.mass, 1)?;
        Ok(flags
            .iter()
            .zip(&mass)
            .filter(|(&raw, _)| CellFlags::from_raw(raw).is_liquid())
            .map(|(_, m)| m.to_f64())
            .sum())
    }

    /// Σ density over fluid and interface cells
    pub fn density_checksum(&mut self) -> Result<f64, LbmError> {
        Ok(self.diagnostics()?.density_checksum)
    }

    /// Σ (ux + uy + uz) over fluid and interface cells
    pub fn velocity_checksum(&mut self) -> Result<f64, LbmError> {
        Ok(self.diagnostics()?.velocity_checksum)
    }

    /// Largest velocity magnitude over fluid and interface cells
    pub fn max_velocity(&mut self) -> Result<f64, LbmError> {
        Ok(self.diagnostics()?.max_velocity)
    }

    /// Copy of every per-cell field for validation
    pub fn snapshot(&mut self) -> Result<DomainSnapshot, LbmError> {
        let flags: Vec<u8> = self.read_vec("flags", |b| b.fields.flags, 1)?;
        let density: Vec<T> = self.read_vec("density", |b| b.fields.density, 1)?;
        let velocity: Vec<T> = self.read_vec("velocity", |b| b.fields.velocity, 3)?;
        let mass: Vec<T> = self.read_vec("mass", |b| b.fields.mass, 1)?;
        let fraction: Vec<T> = self.read_vec("fraction", |b| b.fields.fraction, 1)?;

        let widen = |values: Vec<T>| values.into_iter().map(Real::to_f64).collect::<Vec<_>>();
        Ok(DomainSnapshot {
            domain: self.domain.clone(),
            step: self.step_counter,
            flags,
            density: widen(density),
            velocity: velocity
                .chunks_exact(3)
                .map(|u| [u[0].to_f64(), u[1].to_f64(), u[2].to_f64()])
                .collect(),
            mass: widen(mass),
            fraction: widen(fraction),
        })
    }

    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    /// Physical time simulated since the last reset, in seconds
    pub fn simulated_time(&self) -> f64 {
        self.step_counter as f64 * self.parameters.timestep()
    }

    pub fn baseline_mass(&self) -> f64 {
        self.baseline_mass
    }

    pub fn config(&self) -> &LbmConfig {
        &self.config
    }

    pub fn parameters(&self) -> &LbmParameters {
        &self.parameters
    }

    pub fn constants(&self) -> &KernelConstants<T> {
        &self.constants
    }

    pub fn domain(&self) -> &DomainIndexer {
        &self.domain
    }

    pub fn cell_count(&self) -> usize {
        self.domain.cell_count()
    }

    pub fn precision(&self) -> Precision {
        T::PRECISION
    }

    pub fn errors(&self) -> &[LbmError] {
        self.errors.errors()
    }

    pub fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
