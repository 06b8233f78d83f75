//! Free-surface lattice Boltzmann method on a D3Q19 lattice
//!
//! - [`parameters`] converts physical inputs to lattice constants
//! - [`domain`] and [`scenario`] describe the grid and its initial contents
//! - [`kernels`] holds the per-cell stencil kernels
//! - [`solver`] sequences those kernels into timesteps
//! - [`validation`] checks a [`validation::DomainSnapshot`] for anomalies

pub mod d3q19;
pub mod domain;
pub mod flags;
pub mod kernels;
pub mod parameters;
pub mod real;
pub mod scenario;
pub mod solver;
pub mod validation;
