//! Scenario initialisation

use super::{commit_field, LatticeFields};
use crate::compute::{BufferHandle, BufferPool, Kernel};
use crate::error::ComputeError;
use crate::lbm::d3q19::{Q, REST, WEIGHTS};
use crate::lbm::domain::DomainIndexer;
use crate::lbm::flags::CellFlags;
use crate::lbm::real::Real;
use crate::lbm::scenario::Scenario;
use std::marker::PhantomData;
use std::ops::Range;

/// Initial mass and fill level of a cell on the free surface
pub const INITIAL_INTERFACE_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct InitCell<T> {
    flags: u8,
    density: T,
    mass: T,
    fraction: T,
}

/// Assigns flags, mass and fraction from the scenario geometry and puts every
/// cell at rest with unit density
///
/// Geometric fluid cells with a gas neighbour become interface, which closes
/// the surface before the first step.
pub struct InitKernel<'a, T> {
    pub domain: &'a DomainIndexer,
    pub scenario: &'a Scenario,
    pub fields: &'a LatticeFields,
    /// Every distribution buffer; all are filled with the rest equilibrium
    pub distributions: &'a [BufferHandle],
    _precision: PhantomData<T>,
}

impl<'a, T: Real> InitKernel<'a, T> {
    pub fn new(
        domain: &'a DomainIndexer,
        scenario: &'a Scenario,
        fields: &'a LatticeFields,
        distributions: &'a [BufferHandle],
    ) -> Self {
        Self {
            domain,
            scenario,
            fields,
            distributions,
            _precision: PhantomData,
        }
    }

    fn classify(&self, cell: usize) -> CellFlags {
        let geometric = self.scenario.classify_index(self.domain, cell);
        if geometric != CellFlags::FLUID {
            return geometric;
        }
        let touches_gas = (0..REST).any(|direction| {
            let neighbor = self.domain.neighbor(cell, direction);
            self.scenario.classify_index(self.domain, neighbor) == CellFlags::GAS
        });
        if touches_gas {
            CellFlags::INTERFACE
        } else {
            CellFlags::FLUID
        }
    }
}

impl<T: Real> Kernel for InitKernel<'_, T> {
    type Output = InitCell<T>;

    fn name(&self) -> &'static str {
        "init"
    }

    fn evaluate(
        &self,
        _buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<InitCell<T>>,
    ) -> Result<(), ComputeError> {
        for cell in cells {
            let flags = self.classify(cell);
            let fill = if flags.is_fluid() {
                T::ONE
            } else if flags.is_interface() {
                T::from_f64(INITIAL_INTERFACE_FRACTION)
            } else {
                T::ZERO
            };
            let density = if flags.is_obstacle() { T::ZERO } else { T::ONE };
            out.push(InitCell {
                flags: flags.raw(),
                density,
                mass: fill,
                fraction: fill,
            });
        }
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[InitCell<T>],
    ) -> Result<(), ComputeError> {
        let f = self.fields;
        for handle in [f.flags, f.new_flags] {
            commit_field(buffers, handle, first_cell, outputs, |o| Some(o.flags))?;
        }
        for handle in [f.mass, f.new_mass] {
            commit_field(buffers, handle, first_cell, outputs, |o| Some(o.mass))?;
        }
        for handle in [f.fraction, f.new_fraction] {
            commit_field(buffers, handle, first_cell, outputs, |o| Some(o.fraction))?;
        }
        commit_field(buffers, f.density, first_cell, outputs, |o| Some(o.density))?;
        commit_field(buffers, f.velocity, first_cell, outputs, |_| Some([T::ZERO; 3]))?;

        let rest: [T; Q] = std::array::from_fn(|direction| T::from_f64(WEIGHTS[direction]));
        for &handle in self.distributions {
            commit_field(buffers, handle, first_cell, outputs, |_| Some(rest))?;
        }
        Ok(())
    }
}
