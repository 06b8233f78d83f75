//! Flag transitions of the free surface
//!
//! Run after the main pass, in this order, each followed by publishing
//! `new_flags` to `flags`:
//!
//! 1. [`InterfaceToFluidNeighborsKernel`]: filled cells become fluid, their
//!    gas neighbours are marked to become interface, and emptied neighbours
//!    stay interface.
//! 2. [`InterfaceToGasKernel`]: emptied cells become gas.
//! 3. [`InterfaceToGasNeighborsKernel`]: fluid next to a new gas cell becomes
//!    interface.
//! 4. (mass redistribution, see [`super::mass`])
//! 5. [`GasToInterfaceKernel`]: marked gas cells become interface with an
//!    equilibrium taken from their neighbours; all transient bits are cleared.

use super::{any_neighbor, commit_field, commit_outgoing, flag_at, DdLayout, LatticeFields};
use crate::compute::{BufferPool, Kernel};
use crate::error::ComputeError;
use crate::lbm::d3q19::{EquilibriumModel, Q, REST};
use crate::lbm::domain::DomainIndexer;
use crate::lbm::flags::CellFlags;
use crate::lbm::kernels::ATMOSPHERIC_DENSITY;
use crate::lbm::real::Real;
use std::marker::PhantomData;
use std::ops::Range;

/// New flags for a cell, optionally with a new fill level
#[derive(Debug, Clone, Copy)]
pub struct FlagUpdate<T> {
    flags: u8,
    fraction: Option<T>,
}

impl<T> FlagUpdate<T> {
    fn keep(flags: CellFlags) -> Self {
        Self {
            flags: flags.raw(),
            fraction: None,
        }
    }
}

fn commit_flag_updates<T: Real>(
    buffers: &mut BufferPool,
    fields: &LatticeFields,
    first_cell: usize,
    outputs: &[FlagUpdate<T>],
) -> Result<(), ComputeError> {
    commit_field(buffers, fields.new_flags, first_cell, outputs, |o| Some(o.flags))?;
    commit_field(buffers, fields.new_fraction, first_cell, outputs, |o| o.fraction)
}

pub struct InterfaceToFluidNeighborsKernel<'a, T> {
    pub domain: &'a DomainIndexer,
    pub fields: &'a LatticeFields,
    _precision: PhantomData<T>,
}

impl<'a, T: Real> InterfaceToFluidNeighborsKernel<'a, T> {
    pub fn new(domain: &'a DomainIndexer, fields: &'a LatticeFields) -> Self {
        Self {
            domain,
            fields,
            _precision: PhantomData,
        }
    }
}

impl<T: Real> Kernel for InterfaceToFluidNeighborsKernel<'_, T> {
    type Output = FlagUpdate<T>;

    fn name(&self) -> &'static str {
        "interface_to_fluid_neighbors"
    }

    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<FlagUpdate<T>>,
    ) -> Result<(), ComputeError> {
        let flags = buffers.view::<u8>(self.fields.flags)?;
        let filled = |f: CellFlags| f.contains(CellFlags::INTERFACE_TO_FLUID);

        for cell in cells {
            let state = flag_at(flags, cell);
            let update = if state.contains(CellFlags::INTERFACE_TO_FLUID) {
                FlagUpdate {
                    flags: state.with_primary(CellFlags::FLUID).raw(),
                    fraction: Some(T::ONE),
                }
            } else if state.is_gas() && any_neighbor(self.domain, flags, cell, filled) {
                FlagUpdate::keep(state | CellFlags::GAS_TO_INTERFACE)
            } else if state.contains(CellFlags::INTERFACE_TO_GAS)
                && any_neighbor(self.domain, flags, cell, filled)
            {
                FlagUpdate::keep(state - CellFlags::INTERFACE_TO_GAS)
            } else {
                FlagUpdate::keep(state)
            };
            out.push(update);
        }
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[FlagUpdate<T>],
    ) -> Result<(), ComputeError> {
        commit_flag_updates(buffers, self.fields, first_cell, outputs)
    }
}

pub struct InterfaceToGasKernel<'a, T> {
    pub fields: &'a LatticeFields,
    _precision: PhantomData<T>,
}

impl<'a, T: Real> InterfaceToGasKernel<'a, T> {
    pub fn new(fields: &'a LatticeFields) -> Self {
        Self {
            fields,
            _precision: PhantomData,
        }
    }
}

impl<T: Real> Kernel for InterfaceToGasKernel<'_, T> {
    type Output = FlagUpdate<T>;

    fn name(&self) -> &'static str {
        "interface_to_gas"
    }

    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<FlagUpdate<T>>,
    ) -> Result<(), ComputeError> {
        let flags = buffers.view::<u8>(self.fields.flags)?;
        for cell in cells {
            let state = flag_at(flags, cell);
            if state.contains(CellFlags::INTERFACE_TO_GAS) {
                out.push(FlagUpdate {
                    flags: state.with_primary(CellFlags::GAS).raw(),
                    fraction: Some(T::ZERO),
                });
            } else {
                out.push(FlagUpdate::keep(state));
            }
        }
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[FlagUpdate<T>],
    ) -> Result<(), ComputeError> {
        commit_flag_updates(buffers, self.fields, first_cell, outputs)
    }
}

pub struct InterfaceToGasNeighborsKernel<'a, T> {
    pub domain: &'a DomainIndexer,
    pub fields: &'a LatticeFields,
    _precision: PhantomData<T>,
}

impl<'a, T: Real> InterfaceToGasNeighborsKernel<'a, T> {
    pub fn new(domain: &'a DomainIndexer, fields: &'a LatticeFields) -> Self {
        Self {
            domain,
            fields,
            _precision: PhantomData,
        }
    }
}

impl<T: Real> Kernel for InterfaceToGasNeighborsKernel<'_, T> {
    type Output = FlagUpdate<T>;

    fn name(&self) -> &'static str {
        "interface_to_gas_neighbors"
    }

    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<FlagUpdate<T>>,
    ) -> Result<(), ComputeError> {
        let flags = buffers.view::<u8>(self.fields.flags)?;
        let new_mass = buffers.view::<T>(self.fields.new_mass)?;
        let density = buffers.view::<T>(self.fields.density)?;
        let emptied = |f: CellFlags| f.contains(CellFlags::INTERFACE_TO_GAS);

        for cell in cells {
            let state = flag_at(flags, cell);
            if state.is_fluid() && any_neighbor(self.domain, flags, cell, emptied) {
                let level = if density[cell] > T::ZERO {
                    new_mass[cell] / density[cell]
                } else {
                    T::ZERO
                };
                let demoted = (state - CellFlags::INTERFACE_TO_FLUID).with_primary(CellFlags::INTERFACE);
                out.push(FlagUpdate {
                    flags: demoted.raw(),
                    fraction: Some(level),
                });
            } else {
                out.push(FlagUpdate::keep(state));
            }
        }
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[FlagUpdate<T>],
    ) -> Result<(), ComputeError> {
        commit_flag_updates(buffers, self.fields, first_cell, outputs)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewInterface<T> {
    outgoing: [T; Q],
    density: T,
    velocity: [T; 3],
    fraction: T,
}

#[derive(Debug, Clone, Copy)]
pub struct GasToInterfaceCell<T> {
    flags: u8,
    created: Option<NewInterface<T>>,
}

/// Turns marked gas cells into interface and clears every transient bit
///
/// A new interface cell starts from the equilibrium at the mean density and
/// velocity of its fluid and interface neighbours (rest at unit density if
/// it has none). The distributions are written as the cell's outgoing values
/// for `layout`, the layout of the step that just ran.
pub struct GasToInterfaceKernel<'a, T> {
    pub domain: &'a DomainIndexer,
    pub fields: &'a LatticeFields,
    pub equilibrium: EquilibriumModel,
    pub layout: DdLayout,
    _precision: PhantomData<T>,
}

impl<'a, T: Real> GasToInterfaceKernel<'a, T> {
    pub fn new(
        domain: &'a DomainIndexer,
        fields: &'a LatticeFields,
        equilibrium: EquilibriumModel,
        layout: DdLayout,
    ) -> Self {
        Self {
            domain,
            fields,
            equilibrium,
            layout,
            _precision: PhantomData,
        }
    }
}

impl<T: Real> Kernel for GasToInterfaceKernel<'_, T> {
    type Output = GasToInterfaceCell<T>;

    fn name(&self) -> &'static str {
        "gas_to_interface"
    }

    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<GasToInterfaceCell<T>>,
    ) -> Result<(), ComputeError> {
        let flags = buffers.view::<u8>(self.fields.flags)?;
        let density = buffers.view::<T>(self.fields.density)?;
        let velocity = buffers.view::<[T; 3]>(self.fields.velocity)?;
        let mass = buffers.view::<T>(self.fields.mass)?;

        for cell in cells {
            let state = flag_at(flags, cell);
            if !state.contains(CellFlags::GAS_TO_INTERFACE) {
                out.push(GasToInterfaceCell {
                    flags: (state - CellFlags::TRANSIENT).raw(),
                    created: None,
                });
                continue;
            }

            let mut count = 0usize;
            let mut rho = T::ZERO;
            let mut u = [T::ZERO; 3];
            for direction in 0..REST {
                let neighbor = self.domain.neighbor(cell, direction);
                let other = flag_at(flags, neighbor);
                if other.is_liquid() && !other.contains(CellFlags::GAS_TO_INTERFACE) {
                    count += 1;
                    rho += density[neighbor];
                    for axis in 0..3 {
                        u[axis] += velocity[neighbor][axis];
                    }
                }
            }
            if count > 0 {
                let inv = T::ONE / T::from_f64(count as f64);
                rho *= inv;
                for component in u.iter_mut() {
                    *component *= inv;
                }
            } else {
                rho = T::from_f64(ATMOSPHERIC_DENSITY);
            }

            let fraction = if rho > T::ZERO { mass[cell] / rho } else { T::ZERO };
            out.push(GasToInterfaceCell {
                flags: CellFlags::INTERFACE.raw(),
                created: Some(NewInterface {
                    outgoing: self.equilibrium.equilibrium_all(rho, u),
                    density: rho,
                    velocity: u,
                    fraction,
                }),
            });
        }
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[GasToInterfaceCell<T>],
    ) -> Result<(), ComputeError> {
        let f = self.fields;
        commit_outgoing::<T, _>(buffers, self.domain, &self.layout, first_cell, outputs, |o| {
            o.created.as_ref().map(|c| &c.outgoing)
        })?;
        commit_field(buffers, f.density, first_cell, outputs, |o| {
            o.created.map(|c| c.density)
        })?;
        commit_field(buffers, f.velocity, first_cell, outputs, |o| {
            o.created.map(|c| c.velocity)
        })?;
        for handle in [f.fraction, f.new_fraction] {
            commit_field(buffers, handle, first_cell, outputs, |o| {
                o.created.map(|c| c.fraction)
            })?;
        }
        commit_field(buffers, f.new_flags, first_cell, outputs, |o| Some(o.flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ComputeBackend, CpuBackend};
    use crate::lbm::kernels::testing::{allocate_fields, flag_field, publish_flags, read_flags};

    fn setup(domain: &DomainIndexer, flags: &[u8]) -> (CpuBackend, LatticeFields) {
        let mut backend = CpuBackend::with_threads(2).unwrap();
        let n = domain.cell_count();
        let fields = allocate_fields(&mut backend, n, 8);
        backend.write_slice(fields.flags, flags).unwrap();
        backend.write_slice(fields.new_flags, flags).unwrap();
        backend.write_slice(fields.density, &vec![1.0f64; n]).unwrap();
        (backend, fields)
    }

    #[test]
    fn test_filled_cell_marks_gas_and_keeps_emptied_neighbour() {
        let domain = DomainIndexer::new([5, 5, 5]).unwrap();
        let n = domain.cell_count();
        let filled = domain.linear_index(2, 2, 2);
        let gas = domain.neighbor(filled, 0);
        let emptied = domain.neighbor(filled, 1);
        let flags = flag_field(
            n,
            CellFlags::FLUID,
            &[
                (filled, CellFlags::INTERFACE | CellFlags::INTERFACE_TO_FLUID),
                (gas, CellFlags::GAS),
                (emptied, CellFlags::INTERFACE | CellFlags::INTERFACE_TO_GAS),
            ],
        );
        let (mut backend, fields) = setup(&domain, &flags);

        backend
            .dispatch(&InterfaceToFluidNeighborsKernel::<f64>::new(&domain, &fields), n, 16)
            .unwrap();
        let after = read_flags(&mut backend, &fields, n);
        assert_eq!(after[filled].primary(), CellFlags::FLUID);
        assert_eq!(after[gas], CellFlags::GAS | CellFlags::GAS_TO_INTERFACE);
        assert_eq!(after[emptied], CellFlags::INTERFACE);
        let fraction: Vec<f64> = backend.read_vec(fields.new_fraction, n).unwrap();
        assert_eq!(fraction[filled], 1.0);

        // The rescued cell no longer carries the emptied mark, so it survives
        publish_flags(&mut backend, &fields, n);
        backend
            .dispatch(&InterfaceToGasKernel::<f64>::new(&fields), n, 16)
            .unwrap();
        let after = read_flags(&mut backend, &fields, n);
        assert_eq!(after[emptied], CellFlags::INTERFACE);
    }

    #[test]
    fn test_fluid_next_to_emptied_cell_becomes_interface() {
        let domain = DomainIndexer::new([5, 5, 5]).unwrap();
        let n = domain.cell_count();
        let emptied = domain.linear_index(2, 2, 2);
        let exposed = domain.neighbor(emptied, 2);
        let sheltered = domain.linear_index(0, 0, 0);
        let flags = flag_field(
            n,
            CellFlags::GAS,
            &[
                (emptied, CellFlags::INTERFACE | CellFlags::INTERFACE_TO_GAS),
                (exposed, CellFlags::FLUID),
                (sheltered, CellFlags::FLUID),
            ],
        );
        let (mut backend, fields) = setup(&domain, &flags);
        let mut new_mass = vec![0.0f64; n];
        new_mass[exposed] = 0.9;
        let mut density = vec![1.0f64; n];
        density[exposed] = 1.2;
        backend.write_slice(fields.new_mass, &new_mass).unwrap();
        backend.write_slice(fields.density, &density).unwrap();

        backend
            .dispatch(&InterfaceToGasKernel::<f64>::new(&fields), n, 16)
            .unwrap();
        let after = read_flags(&mut backend, &fields, n);
        assert_eq!(after[emptied].primary(), CellFlags::GAS);
        let fraction: Vec<f64> = backend.read_vec(fields.new_fraction, n).unwrap();
        assert_eq!(fraction[emptied], 0.0);

        publish_flags(&mut backend, &fields, n);
        backend
            .dispatch(&InterfaceToGasNeighborsKernel::<f64>::new(&domain, &fields), n, 16)
            .unwrap();
        let after = read_flags(&mut backend, &fields, n);
        assert_eq!(after[exposed], CellFlags::INTERFACE);
        assert_eq!(after[sheltered], CellFlags::FLUID);
        let fraction: Vec<f64> = backend.read_vec(fields.new_fraction, n).unwrap();
        assert!((fraction[exposed] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_gas_next_to_filled_cell_starts_from_neighbour_equilibrium() {
        let domain = DomainIndexer::new([5, 5, 5]).unwrap();
        let n = domain.cell_count();
        let filled = domain.linear_index(2, 2, 2);
        let gas = domain.neighbor(filled, 0);
        let surface = domain.neighbor(gas, 0);
        let flags = flag_field(
            n,
            CellFlags::GAS,
            &[
                (filled, CellFlags::INTERFACE | CellFlags::INTERFACE_TO_FLUID),
                (surface, CellFlags::INTERFACE),
            ],
        );
        let (mut backend, fields) = setup(&domain, &flags);
        let src = backend.allocate("dd_a", n * Q * 8).unwrap();
        let dst = backend.allocate("dd_b", n * Q * 8).unwrap();

        let mut density = vec![1.0f64; n];
        density[filled] = 1.2;
        let mut velocity = vec![[0.0f64; 3]; n];
        velocity[filled] = [0.01, 0.0, 0.0];
        velocity[surface] = [0.03, 0.0, 0.0];
        let mut mass = vec![0.0f64; n];
        mass[gas] = 0.11;
        backend.write_slice(fields.density, &density).unwrap();
        backend.write_slice(fields.velocity, &velocity).unwrap();
        backend.write_slice(fields.mass, &mass).unwrap();

        backend
            .dispatch(&InterfaceToFluidNeighborsKernel::<f64>::new(&domain, &fields), n, 16)
            .unwrap();
        publish_flags(&mut backend, &fields, n);
        let model = EquilibriumModel::Compressible;
        let layout = DdLayout::PingPong { src, dst };
        backend
            .dispatch(&GasToInterfaceKernel::<f64>::new(&domain, &fields, model, layout), n, 16)
            .unwrap();

        // Other marked gas cells around the filled one are left out of the mean
        let rho = 1.1;
        let u = [0.02, 0.0, 0.0];
        let after = read_flags(&mut backend, &fields, n);
        assert_eq!(after[gas], CellFlags::INTERFACE);
        assert_eq!(after[filled], CellFlags::FLUID);
        assert_eq!(after[surface], CellFlags::INTERFACE);
        assert!(after.iter().all(|f| !f.intersects(CellFlags::TRANSIENT)));

        let density: Vec<f64> = backend.read_vec(fields.density, n).unwrap();
        let velocity: Vec<[f64; 3]> = backend.read_vec(fields.velocity, n).unwrap();
        let fraction: Vec<f64> = backend.read_vec(fields.fraction, n).unwrap();
        let new_fraction: Vec<f64> = backend.read_vec(fields.new_fraction, n).unwrap();
        assert!((density[gas] - rho).abs() < 1e-12);
        for axis in 0..3 {
            assert!((velocity[gas][axis] - u[axis]).abs() < 1e-12);
        }
        assert!((fraction[gas] - 0.1).abs() < 1e-12);
        assert_eq!(fraction[gas], new_fraction[gas]);

        let expected = model.equilibrium_all(rho, u);
        let dd: Vec<[f64; Q]> = backend.read_vec(dst, n).unwrap();
        for direction in 0..Q {
            assert!((dd[gas][direction] - expected[direction]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_isolated_new_interface_starts_at_rest() {
        let domain = DomainIndexer::new([5, 5, 5]).unwrap();
        let n = domain.cell_count();
        let cell = domain.linear_index(2, 2, 2);
        let flags = flag_field(
            n,
            CellFlags::GAS,
            &[(cell, CellFlags::GAS | CellFlags::GAS_TO_INTERFACE)],
        );
        let (mut backend, fields) = setup(&domain, &flags);
        let dd = backend.allocate("dd", n * Q * 8).unwrap();
        let mut mass = vec![0.0f64; n];
        mass[cell] = 0.3;
        backend.write_slice(fields.mass, &mass).unwrap();

        let model = EquilibriumModel::Compressible;
        let kernel = GasToInterfaceKernel::<f64>::new(&domain, &fields, model, DdLayout::Alpha { dd });
        backend.dispatch(&kernel, n, 16).unwrap();

        let density: Vec<f64> = backend.read_vec(fields.density, n).unwrap();
        let fraction: Vec<f64> = backend.read_vec(fields.fraction, n).unwrap();
        assert_eq!(density[cell], ATMOSPHERIC_DENSITY);
        assert!((fraction[cell] - 0.3).abs() < 1e-12);

        let rest = model.equilibrium_all(1.0f64, [0.0; 3]);
        let distributions: Vec<[f64; Q]> = backend.read_vec(dd, n).unwrap();
        let layout = DdLayout::Alpha { dd };
        for direction in 0..Q {
            let (c, d) = layout.outgoing(&domain, cell, direction);
            assert!((distributions[c][d] - rest[direction]).abs() < 1e-15);
        }
    }
}
