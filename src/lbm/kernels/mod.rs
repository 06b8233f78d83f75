//! Stencil kernels of the free-surface solver
//!
//! One kernel per stage of a step, plus initialisation and mass scaling.
//! Every kernel is a pull (gather) stencil: it reads whatever neighbour data
//! it needs and writes only the slots owned by the cell it evaluates. The
//! orchestrator separates stages with barriers and publishes shadow buffers
//! (`new_flags`) with copies, so each stage sees the complete result of the
//! stage before it.

pub mod init;
pub mod layout;
pub mod mass;
pub mod stream_collide;
pub mod transitions;

pub use init::InitKernel;
pub use layout::{DdLayout, Slot};
pub use mass::{GatherMassKernel, MassScaleKernel};
pub use stream_collide::{ExchangeMassKernel, StreamCollideKernel};
pub use transitions::{
    GasToInterfaceKernel, InterfaceToFluidNeighborsKernel, InterfaceToGasKernel,
    InterfaceToGasNeighborsKernel,
};

use super::d3q19::{opposite, DdPair, EquilibriumModel, DIRECTIONS, Q, REST, WEIGHTS};
use super::domain::DomainIndexer;
use super::flags::CellFlags;
use super::parameters::LbmParameters;
use super::real::Real;
use crate::compute::{BufferHandle, BufferPool};
use crate::error::ComputeError;
use bytemuck::Pod;

/// Density assumed for the gas phase when reconstructing distributions
pub const ATMOSPHERIC_DENSITY: f64 = 1.0;

/// Per-cell buffers shared by all kernels; distributions are addressed
/// through a [`DdLayout`] instead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeFields {
    pub flags: BufferHandle,
    pub new_flags: BufferHandle,
    pub velocity: BufferHandle,
    pub density: BufferHandle,
    pub mass: BufferHandle,
    pub new_mass: BufferHandle,
    pub fraction: BufferHandle,
    pub new_fraction: BufferHandle,
}

/// Lattice constants handed to the kernels, converted to the kernel precision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelConstants<T> {
    pub inv_tau: T,
    pub inv_trt_tau: T,
    pub gravitation: [T; 3],
    pub mass_exchange_factor: T,
    pub equilibrium: EquilibriumModel,
}

impl<T: Real> KernelConstants<T> {
    pub fn from_parameters(parameters: &LbmParameters, equilibrium: EquilibriumModel) -> Self {
        let g = parameters.lattice_gravitation();
        Self {
            inv_tau: T::from_f64(parameters.inv_tau()),
            inv_trt_tau: T::from_f64(parameters.inv_trt_tau()),
            gravitation: [T::from_f64(g.x), T::from_f64(g.y), T::from_f64(g.z)],
            mass_exchange_factor: T::from_f64(parameters.mass_exchange_factor()),
            equilibrium,
        }
    }
}

#[inline]
pub(crate) fn flag_at(flags: &[u8], cell: usize) -> CellFlags {
    CellFlags::from_raw(flags[cell])
}

/// Whether any of the 18 neighbours satisfies `predicate`
#[inline]
pub(crate) fn any_neighbor(
    domain: &DomainIndexer,
    flags: &[u8],
    cell: usize,
    predicate: impl Fn(CellFlags) -> bool,
) -> bool {
    (0..REST).any(|direction| predicate(flag_at(flags, domain.neighbor(cell, direction))))
}

/// Weight of the mass flux between two neighbouring cells
#[inline]
pub(crate) fn exchange_factor<T: Real>(
    own: CellFlags,
    own_fraction: T,
    other: CellFlags,
    other_fraction: T,
) -> T {
    if own.is_gas_or_obstacle() || other.is_gas_or_obstacle() {
        T::ZERO
    } else if own.is_interface() && other.is_interface() {
        (own_fraction + other_fraction) * T::from_f64(0.5)
    } else {
        T::ONE
    }
}

/// Net mass streamed into `cell` during the step described by `layout`
///
/// Uses the raw streamed distributions, before any reconstruction, so the
/// flux between two cells cancels exactly.
pub(crate) fn exchanged_mass<T: Real>(
    domain: &DomainIndexer,
    layout: &DdLayout,
    dd: &[[T; Q]],
    flags: &[u8],
    fraction: &[T],
    cell: usize,
    mass_exchange_factor: T,
) -> T {
    let own = flag_at(flags, cell);
    let mut delta = T::ZERO;
    for direction in 0..REST {
        let source = domain.upstream(cell, direction);
        let s = exchange_factor(own, fraction[cell], flag_at(flags, source), fraction[source]);
        if s == T::ZERO {
            continue;
        }
        let (ic, id) = layout.incoming(domain, cell, direction);
        let (oc, od) = layout.previous_outgoing(domain, cell, opposite(direction));
        delta += s * (dd[ic][id] - dd[oc][od]);
    }
    delta * mass_exchange_factor
}

/// Incoming distributions of a fluid or interface cell
///
/// Obstacle sources bounce back what the cell sent towards them. Gas sources
/// are rebuilt from the equilibrium at atmospheric density and the cell's
/// previous velocity: if the opposite source also carries no fluid the single
/// equilibrium is used, otherwise the pair equilibrium minus what the cell
/// emitted the other way.
pub(crate) fn gather_incoming<T: Real>(
    domain: &DomainIndexer,
    layout: &DdLayout,
    dd: &[[T; Q]],
    flags: &[u8],
    model: EquilibriumModel,
    cell: usize,
    previous_velocity: [T; 3],
) -> [T; Q] {
    let rho_gas = T::from_f64(ATMOSPHERIC_DENSITY);
    std::array::from_fn(|direction| {
        if direction == REST {
            let (c, d) = layout.incoming(domain, cell, REST);
            return dd[c][d];
        }
        let source = flag_at(flags, domain.upstream(cell, direction));
        let back = opposite(direction);
        if source.is_obstacle() {
            let (c, d) = layout.previous_outgoing(domain, cell, back);
            dd[c][d]
        } else if source.is_gas() {
            let facing = flag_at(flags, domain.upstream(cell, back));
            if facing.is_gas_or_obstacle() {
                model.equilibrium(direction, rho_gas, previous_velocity)
            } else {
                let (c, d) = layout.previous_outgoing(domain, cell, back);
                // Rest is excluded above, so every direction has a pair
                match DdPair::of(direction) {
                    Some(pair) => pair.reconstruct(model, rho_gas, previous_velocity, dd[c][d]),
                    None => model.equilibrium(direction, rho_gas, previous_velocity),
                }
            }
        } else {
            let (c, d) = layout.incoming(domain, cell, direction);
            dd[c][d]
        }
    })
}

/// Result of a collision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collided<T> {
    pub outgoing: [T; Q],
    pub density: T,
    pub velocity: [T; 3],
}

/// Two-relaxation-time collision with a body force
pub(crate) fn collide<T: Real>(incoming: &[T; Q], constants: &KernelConstants<T>) -> Collided<T> {
    let (density, momentum) = super::d3q19::moments(incoming);
    let velocity = constants.equilibrium.velocity(density, momentum);
    let feq = constants.equilibrium.equilibrium_all(density, velocity);

    let half = T::from_f64(0.5);
    let mut outgoing = [T::ZERO; Q];
    for pair in DdPair::ALL {
        let (a, b) = pair.directions();
        let symmetric = (incoming[a] + incoming[b] - feq[a] - feq[b]) * half;
        let antisymmetric = (incoming[a] - incoming[b] - feq[a] + feq[b]) * half;
        let even = constants.inv_tau * symmetric;
        let odd = constants.inv_trt_tau * antisymmetric;
        outgoing[a] = incoming[a] - even - odd;
        outgoing[b] = incoming[b] - even + odd;
    }
    outgoing[REST] = incoming[REST] - constants.inv_tau * (incoming[REST] - feq[REST]);

    let three = T::from_f64(3.0);
    for direction in 0..REST {
        let e = DIRECTIONS[direction];
        let mut eg = T::ZERO;
        for axis in 0..3 {
            eg += T::from_f64(e[axis] as f64) * constants.gravitation[axis];
        }
        outgoing[direction] += three * T::from_f64(WEIGHTS[direction]) * density * eg;
    }

    Collided {
        outgoing,
        density,
        velocity,
    }
}

/// Write one value per output into a per-cell field; `None` leaves the slot
pub(crate) fn commit_field<F: Pod, O>(
    buffers: &mut BufferPool,
    handle: BufferHandle,
    first_cell: usize,
    outputs: &[O],
    value: impl Fn(&O) -> Option<F>,
) -> Result<(), ComputeError> {
    let len = buffers.byte_len(handle)? / std::mem::size_of::<F>();
    let end = first_cell + outputs.len();
    if end > len {
        return Err(ComputeError::OutOfRange {
            label: buffers.label(handle)?.to_string(),
            start: first_cell * std::mem::size_of::<F>(),
            end: end * std::mem::size_of::<F>(),
            len: len * std::mem::size_of::<F>(),
        });
    }
    let field = buffers.view_mut::<F>(handle)?;
    for (slot, output) in field[first_cell..end].iter_mut().zip(outputs) {
        if let Some(v) = value(output) {
            *slot = v;
        }
    }
    Ok(())
}

/// Scatter outgoing distributions into the write buffer of `layout`
pub(crate) fn commit_outgoing<T: Real, O>(
    buffers: &mut BufferPool,
    domain: &DomainIndexer,
    layout: &DdLayout,
    first_cell: usize,
    outputs: &[O],
    outgoing: impl Fn(&O) -> Option<&[T; Q]>,
) -> Result<(), ComputeError> {
    let dd = buffers.view_mut::<[T; Q]>(layout.write_handle())?;
    for (offset, output) in outputs.iter().enumerate() {
        if let Some(values) = outgoing(output) {
            let cell = first_cell + offset;
            for (direction, &value) in values.iter().enumerate() {
                let (c, d) = layout.outgoing(domain, cell, direction);
                dd[c][d] = value;
            }
        }
    }
    Ok(())
}

/// Buffers shared by the kernel tests
#[cfg(test)]
pub(crate) mod testing {
    use super::LatticeFields;
    use crate::compute::{ComputeBackend, CpuBackend};
    use crate::lbm::flags::CellFlags;

    /// Per-cell fields for `n` cells with `real`-byte scalars
    pub fn allocate_fields(backend: &mut CpuBackend, n: usize, real: usize) -> LatticeFields {
        let mut alloc = |label: &str, bytes: usize| backend.allocate(label, bytes).unwrap();
        LatticeFields {
            flags: alloc("flags", n),
            new_flags: alloc("new_flags", n),
            velocity: alloc("velocity", 3 * n * real),
            density: alloc("density", n * real),
            mass: alloc("mass", n * real),
            new_mass: alloc("new_mass", n * real),
            fraction: alloc("fraction", n * real),
            new_fraction: alloc("new_fraction", n * real),
        }
    }

    /// Raw flags: `fill` everywhere except the listed cells
    pub fn flag_field(n: usize, fill: CellFlags, cells: &[(usize, CellFlags)]) -> Vec<u8> {
        let mut flags = vec![fill.raw(); n];
        for &(cell, state) in cells {
            flags[cell] = state.raw();
        }
        flags
    }

    pub fn read_flags(backend: &mut CpuBackend, fields: &LatticeFields, n: usize) -> Vec<CellFlags> {
        let raw: Vec<u8> = backend.read_vec(fields.new_flags, n).unwrap();
        raw.into_iter().map(CellFlags::from_raw).collect()
    }

    /// Copy `new_flags` over `flags` the way the solver does between stages
    pub fn publish_flags(backend: &mut CpuBackend, fields: &LatticeFields, n: usize) {
        let staged: Vec<u8> = backend.read_vec(fields.new_flags, n).unwrap();
        backend.write_slice(fields.flags, &staged).unwrap();
    }
}
