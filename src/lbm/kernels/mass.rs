//! Mass bookkeeping kernels

use super::{commit_field, flag_at, LatticeFields};
use crate::compute::{BufferPool, Kernel};
use crate::error::ComputeError;
use crate::lbm::d3q19::REST;
use crate::lbm::domain::DomainIndexer;
use crate::lbm::flags::CellFlags;
use crate::lbm::real::Real;
use std::marker::PhantomData;
use std::ops::Range;

/// Cells that take a share of the excess mass of converting neighbours
#[inline]
fn receives(flags: CellFlags) -> bool {
    !flags.is_converting()
        && (flags.is_interface() || flags.contains(CellFlags::GAS_TO_INTERFACE))
}

#[derive(Debug, Clone, Copy)]
pub struct MassUpdate<T> {
    mass: T,
    fraction: T,
}

/// Redistributes the mass of cells that filled or emptied this step and
/// publishes `mass` and `fraction`
///
/// A filled cell keeps exactly its density and hands the excess to its
/// receiving neighbours; an emptied cell hands over everything it still
/// holds. Each receiver pulls `excess / k` from every converting neighbour,
/// where `k` is that neighbour's receiver count. A filled cell without
/// receivers keeps its excess; an emptied one loses it.
pub struct GatherMassKernel<'a, T> {
    pub domain: &'a DomainIndexer,
    pub fields: &'a LatticeFields,
    _precision: PhantomData<T>,
}

impl<'a, T: Real> GatherMassKernel<'a, T> {
    pub fn new(domain: &'a DomainIndexer, fields: &'a LatticeFields) -> Self {
        Self {
            domain,
            fields,
            _precision: PhantomData,
        }
    }

    fn receiver_count(&self, flags: &[u8], cell: usize) -> usize {
        (0..REST)
            .filter(|&direction| receives(flag_at(flags, self.domain.neighbor(cell, direction))))
            .count()
    }
}

impl<T: Real> Kernel for GatherMassKernel<'_, T> {
    type Output = MassUpdate<T>;

    fn name(&self) -> &'static str {
        "gather_mass"
    }

    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<MassUpdate<T>>,
    ) -> Result<(), ComputeError> {
        let flags = buffers.view::<u8>(self.fields.flags)?;
        let new_mass = buffers.view::<T>(self.fields.new_mass)?;
        let new_fraction = buffers.view::<T>(self.fields.new_fraction)?;
        let density = buffers.view::<T>(self.fields.density)?;

        let excess = |cell: usize, state: CellFlags| {
            if state.contains(CellFlags::INTERFACE_TO_FLUID) {
                new_mass[cell] - density[cell]
            } else {
                new_mass[cell]
            }
        };

        for cell in cells {
            let state = flag_at(flags, cell);

            let update = if state.contains(CellFlags::INTERFACE_TO_FLUID) {
                let mass = if self.receiver_count(flags, cell) > 0 {
                    density[cell]
                } else {
                    new_mass[cell]
                };
                MassUpdate {
                    mass,
                    fraction: T::ONE,
                }
            } else if state.contains(CellFlags::INTERFACE_TO_GAS) {
                if self.receiver_count(flags, cell) == 0 && new_mass[cell] != T::ZERO {
                    log::warn!(
                        "emptied cell {} has no interface neighbour, discarding mass {:?}",
                        cell,
                        new_mass[cell]
                    );
                }
                MassUpdate {
                    mass: T::ZERO,
                    fraction: T::ZERO,
                }
            } else if receives(state) {
                let mut mass = new_mass[cell];
                for direction in 0..REST {
                    let neighbor = self.domain.neighbor(cell, direction);
                    let other = flag_at(flags, neighbor);
                    if other.is_converting() {
                        // This cell is one of the neighbour's receivers, so k >= 1
                        let k = self.receiver_count(flags, neighbor);
                        mass += excess(neighbor, other) / T::from_f64(k as f64);
                    }
                }
                let fraction = if state.is_interface() && density[cell] > T::ZERO {
                    mass / density[cell]
                } else {
                    T::ZERO
                };
                MassUpdate { mass, fraction }
            } else {
                MassUpdate {
                    mass: new_mass[cell],
                    fraction: new_fraction[cell],
                }
            };
            out.push(update);
        }
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[MassUpdate<T>],
    ) -> Result<(), ComputeError> {
        commit_field(buffers, self.fields.mass, first_cell, outputs, |o| Some(o.mass))?;
        commit_field(buffers, self.fields.fraction, first_cell, outputs, |o| Some(o.fraction))
    }
}

/// Multiplies the mass of every cell by a constant factor
pub struct MassScaleKernel<'a, T> {
    pub fields: &'a LatticeFields,
    pub factor: T,
}

impl<T: Real> Kernel for MassScaleKernel<'_, T> {
    type Output = T;

    fn name(&self) -> &'static str {
        "mass_scale"
    }

    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<T>,
    ) -> Result<(), ComputeError> {
        let mass = buffers.view::<T>(self.fields.mass)?;
        out.extend(mass[cells].iter().map(|&m| m * self.factor));
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[T],
    ) -> Result<(), ComputeError> {
        commit_field(buffers, self.fields.mass, first_cell, outputs, |&m| Some(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ComputeBackend, CpuBackend};
    use crate::lbm::kernels::testing::{allocate_fields, flag_field};

    /// Run the gather and return `(mass, fraction)`
    fn gather(
        domain: &DomainIndexer,
        flags: &[u8],
        new_mass: &[f64],
        density: &[f64],
    ) -> (Vec<f64>, Vec<f64>) {
        let mut backend = CpuBackend::with_threads(2).unwrap();
        let n = domain.cell_count();
        let fields = allocate_fields(&mut backend, n, 8);
        backend.write_slice(fields.flags, flags).unwrap();
        backend.write_slice(fields.new_mass, new_mass).unwrap();
        backend.write_slice(fields.new_fraction, &vec![1.0f64; n]).unwrap();
        backend.write_slice(fields.density, density).unwrap();

        let kernel = GatherMassKernel::<f64>::new(domain, &fields);
        backend.dispatch(&kernel, n, 16).unwrap();
        (
            backend.read_vec(fields.mass, n).unwrap(),
            backend.read_vec(fields.fraction, n).unwrap(),
        )
    }

    fn total(values: &[f64]) -> f64 {
        values.iter().sum()
    }

    #[test]
    fn test_excess_is_split_evenly_between_receivers() {
        let domain = DomainIndexer::new([5, 5, 5]).unwrap();
        let n = domain.cell_count();
        let filled = domain.linear_index(2, 2, 2);
        let (east, west, north) = (
            domain.neighbor(filled, 0),
            domain.neighbor(filled, 1),
            domain.neighbor(filled, 2),
        );
        let flags = flag_field(
            n,
            CellFlags::FLUID,
            &[
                (filled, CellFlags::INTERFACE | CellFlags::INTERFACE_TO_FLUID),
                (east, CellFlags::INTERFACE),
                (north, CellFlags::INTERFACE),
                (west, CellFlags::GAS | CellFlags::GAS_TO_INTERFACE),
            ],
        );
        let mut new_mass = vec![1.0; n];
        new_mass[filled] = 1.3;
        new_mass[east] = 0.4;
        new_mass[north] = 0.4;
        new_mass[west] = 0.0;

        let (mass, fraction) = gather(&domain, &flags, &new_mass, &vec![1.0; n]);

        // Three receivers share an excess of 0.3
        assert_eq!(mass[filled], 1.0);
        assert_eq!(fraction[filled], 1.0);
        assert!((mass[east] - 0.5).abs() < 1e-12);
        assert!((mass[north] - 0.5).abs() < 1e-12);
        assert!((fraction[east] - 0.5).abs() < 1e-12);
        assert!((mass[west] - 0.1).abs() < 1e-12);
        assert_eq!(fraction[west], 0.0);

        let bystander = domain.linear_index(0, 0, 0);
        assert_eq!(mass[bystander], 1.0);
        assert_eq!(fraction[bystander], 1.0);
        assert!((total(&mass) - total(&new_mass)).abs() < 1e-10);
    }

    #[test]
    fn test_filled_cell_without_receivers_keeps_excess() {
        let domain = DomainIndexer::new([5, 5, 5]).unwrap();
        let n = domain.cell_count();
        let filled = domain.linear_index(2, 2, 2);
        let flags = flag_field(
            n,
            CellFlags::FLUID,
            &[(filled, CellFlags::INTERFACE | CellFlags::INTERFACE_TO_FLUID)],
        );
        let mut new_mass = vec![1.0; n];
        new_mass[filled] = 1.3;

        let (mass, fraction) = gather(&domain, &flags, &new_mass, &vec![1.0; n]);

        assert_eq!(mass[filled], 1.3);
        assert_eq!(fraction[filled], 1.0);
        assert!((total(&mass) - total(&new_mass)).abs() < 1e-10);
    }

    #[test]
    fn test_emptied_cell_hands_remaining_mass_to_receiver() {
        let domain = DomainIndexer::new([5, 5, 5]).unwrap();
        let n = domain.cell_count();
        let emptied = domain.linear_index(2, 2, 2);
        let receiver = domain.neighbor(emptied, 4);
        let flags = flag_field(
            n,
            CellFlags::GAS,
            &[
                (emptied, CellFlags::INTERFACE | CellFlags::INTERFACE_TO_GAS),
                (receiver, CellFlags::INTERFACE),
            ],
        );
        let mut new_mass = vec![0.0; n];
        new_mass[emptied] = -0.02;
        new_mass[receiver] = 0.5;
        let mut density = vec![0.0; n];
        density[emptied] = 1.0;
        density[receiver] = 1.0;

        let (mass, fraction) = gather(&domain, &flags, &new_mass, &density);

        assert_eq!(mass[emptied], 0.0);
        assert_eq!(fraction[emptied], 0.0);
        assert!((mass[receiver] - 0.48).abs() < 1e-12);
        assert!((fraction[receiver] - 0.48).abs() < 1e-12);
    }

    #[test]
    fn test_emptied_cell_without_receivers_loses_mass() {
        let domain = DomainIndexer::new([5, 5, 5]).unwrap();
        let n = domain.cell_count();
        let emptied = domain.linear_index(2, 2, 2);
        let flags = flag_field(
            n,
            CellFlags::GAS,
            &[(emptied, CellFlags::INTERFACE | CellFlags::INTERFACE_TO_GAS)],
        );
        let mut new_mass = vec![0.0; n];
        new_mass[emptied] = 0.01;

        // Logs a warning and drops the 0.01
        let (mass, fraction) = gather(&domain, &flags, &new_mass, &vec![1.0; n]);

        assert_eq!(mass[emptied], 0.0);
        assert_eq!(fraction[emptied], 0.0);
        assert_eq!(total(&mass), 0.0);
    }

    #[test]
    fn test_mass_scale() {
        let mut backend = CpuBackend::with_threads(2).unwrap();
        let n = 40;
        let fields = allocate_fields(&mut backend, n, 4);
        let mass: Vec<f32> = (0..n).map(|cell| cell as f32).collect();
        backend.write_slice(fields.mass, &mass).unwrap();

        let kernel = MassScaleKernel {
            fields: &fields,
            factor: 0.5f32,
        };
        backend.dispatch(&kernel, n, 16).unwrap();

        let scaled: Vec<f32> = backend.read_vec(fields.mass, n).unwrap();
        for cell in 0..n {
            assert_eq!(scaled[cell], cell as f32 * 0.5);
        }
    }
}
