//! Compute module - Domain decomposition, halo exchange and the Gray-Scott stencil.

mod decompose;
mod error;
mod field;
mod halo;
#[cfg(feature = "mpi")]
mod mpi_transport;
mod simulation;
mod stats;
mod stencil;
mod transport;

pub use decompose::*;
pub use error::*;
pub use field::*;
pub use halo::*;
#[cfg(feature = "mpi")]
pub use mpi_transport::*;
pub use simulation::*;
pub use stats::*;
pub use stencil::*;
pub use transport::*;
