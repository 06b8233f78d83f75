//! Streaming, collision and mass exchange

use super::{
    collide, commit_field, commit_outgoing, exchanged_mass, flag_at, gather_incoming, Collided,
    DdLayout, KernelConstants, LatticeFields,
};
use crate::compute::{BufferPool, Kernel};
use crate::error::ComputeError;
use crate::lbm::d3q19::Q;
use crate::lbm::domain::DomainIndexer;
use crate::lbm::flags::CellFlags;
use crate::lbm::real::Real;
use std::ops::Range;

/// Computes `new_mass = mass + Δm` for fluid and interface cells ahead of an
/// in-place update, which overwrites the neighbour slots the exchange reads
pub struct ExchangeMassKernel<'a, T> {
    pub domain: &'a DomainIndexer,
    pub fields: &'a LatticeFields,
    pub constants: &'a KernelConstants<T>,
    pub layout: DdLayout,
}

impl<T: Real> Kernel for ExchangeMassKernel<'_, T> {
    type Output = Option<T>;

    fn name(&self) -> &'static str {
        "exchange_mass"
    }

    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<Option<T>>,
    ) -> Result<(), ComputeError> {
        let flags = buffers.view::<u8>(self.fields.flags)?;
        let mass = buffers.view::<T>(self.fields.mass)?;
        let fraction = buffers.view::<T>(self.fields.fraction)?;
        let dd = buffers.view::<[T; Q]>(self.layout.read_handle())?;

        for cell in cells {
            if !flag_at(flags, cell).is_liquid() {
                out.push(None);
                continue;
            }
            let delta = exchanged_mass(
                self.domain,
                &self.layout,
                dd,
                flags,
                fraction,
                cell,
                self.constants.mass_exchange_factor,
            );
            out.push(Some(mass[cell] + delta));
        }
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[Option<T>],
    ) -> Result<(), ComputeError> {
        commit_field(buffers, self.fields.new_mass, first_cell, outputs, |o| *o)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamCollideCell<T> {
    collided: Option<Collided<T>>,
    mass: T,
    fraction: T,
    flags: u8,
}

/// Main pass: stream, reconstruct, collide and update fill levels
///
/// Fluid and interface cells gather their incoming distributions, collide
/// and emit the result through `layout`. Interface cells that fill up or run
/// empty are tagged `INTERFACE_TO_FLUID` / `INTERFACE_TO_GAS` in `new_flags`.
/// Gas cells are reset to zero mass; obstacles are untouched.
pub struct StreamCollideKernel<'a, T> {
    pub domain: &'a DomainIndexer,
    pub fields: &'a LatticeFields,
    pub constants: &'a KernelConstants<T>,
    pub layout: DdLayout,
    /// `new_mass` already holds `mass + Δm` from [`ExchangeMassKernel`]
    pub exchange_precomputed: bool,
}

impl<T: Real> Kernel for StreamCollideKernel<'_, T> {
    type Output = StreamCollideCell<T>;

    fn name(&self) -> &'static str {
        "stream_collide"
    }

    fn evaluate(
        &self,
        buffers: &BufferPool,
        cells: Range<usize>,
        out: &mut Vec<StreamCollideCell<T>>,
    ) -> Result<(), ComputeError> {
        let flags = buffers.view::<u8>(self.fields.flags)?;
        let velocity = buffers.view::<[T; 3]>(self.fields.velocity)?;
        let mass = buffers.view::<T>(self.fields.mass)?;
        let fraction = buffers.view::<T>(self.fields.fraction)?;
        let dd = buffers.view::<[T; Q]>(self.layout.read_handle())?;
        let precomputed = if self.exchange_precomputed {
            Some(buffers.view::<T>(self.fields.new_mass)?)
        } else {
            None
        };

        for cell in cells {
            let state = flag_at(flags, cell);
            if !state.is_liquid() {
                out.push(StreamCollideCell {
                    collided: None,
                    mass: T::ZERO,
                    fraction: T::ZERO,
                    flags: state.raw(),
                });
                continue;
            }

            let incoming = gather_incoming(
                self.domain,
                &self.layout,
                dd,
                flags,
                self.constants.equilibrium,
                cell,
                velocity[cell],
            );
            let collided = collide(&incoming, self.constants);

            let new_mass = match precomputed {
                Some(new_mass) => new_mass[cell],
                None => {
                    mass[cell]
                        + exchanged_mass(
                            self.domain,
                            &self.layout,
                            dd,
                            flags,
                            fraction,
                            cell,
                            self.constants.mass_exchange_factor,
                        )
                }
            };

            let (new_fraction, new_flags) = if state.is_fluid() {
                (T::ONE, state)
            } else {
                let level = if collided.density > T::ZERO {
                    new_mass / collided.density
                } else {
                    T::ZERO
                };
                let tagged = if level >= T::ONE {
                    state | CellFlags::INTERFACE_TO_FLUID
                } else if level <= T::ZERO {
                    state | CellFlags::INTERFACE_TO_GAS
                } else {
                    state
                };
                (level, tagged)
            };

            out.push(StreamCollideCell {
                collided: Some(collided),
                mass: new_mass,
                fraction: new_fraction,
                flags: new_flags.raw(),
            });
        }
        Ok(())
    }

    fn commit(
        &self,
        buffers: &mut BufferPool,
        first_cell: usize,
        outputs: &[StreamCollideCell<T>],
    ) -> Result<(), ComputeError> {
        let f = self.fields;
        commit_outgoing::<T, _>(buffers, self.domain, &self.layout, first_cell, outputs, |o| {
            o.collided.as_ref().map(|c| &c.outgoing)
        })?;
        commit_field(buffers, f.density, first_cell, outputs, |o| {
            o.collided.map(|c| c.density)
        })?;
        commit_field(buffers, f.velocity, first_cell, outputs, |o| {
            o.collided.map(|c| c.velocity)
        })?;
        commit_field(buffers, f.new_mass, first_cell, outputs, |o| Some(o.mass))?;
        commit_field(buffers, f.new_fraction, first_cell, outputs, |o| Some(o.fraction))?;
        commit_field(buffers, f.new_flags, first_cell, outputs, |o| Some(o.flags))
    }
}
