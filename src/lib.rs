//! Gray-Scott - Distributed 3D reaction-diffusion.
//!
//! This crate evolves the two concentration fields U and V of the Gray-Scott
//! model with an explicit 7-point stencil. The global grid is split over a
//! Cartesian grid of ranks; each rank keeps a one-cell ghost border that is
//! refreshed from its six face neighbors before every step.
//!
//! # Architecture
//!
//! - `schema`: Run settings
//! - `compute`: Decomposition, transport, halo exchange, stencil and driver
//! - `checkpoint`: Snapshot sink/source traits and per-rank checkpoint files
//!
//! # Example
//!
//! ```rust,no_run
//! use std::thread;
//!
//! use gray_scott::{
//!     checkpoint::MemorySink,
//!     compute::{GrayScott, ThreadTransport},
//!     schema::Settings,
//! };
//!
//! let settings = Settings {
//!     extent: [32, 32, 32],
//!     steps: 100,
//!     output_period: 50,
//!     ..Default::default()
//! };
//!
//! // One thread per rank, connected by an in-process transport.
//! let handles: Vec<_> = ThreadTransport::universe(4)
//!     .into_iter()
//!     .map(|transport| {
//!         let settings = settings.clone();
//!         thread::spawn(move || {
//!             let mut sim = GrayScott::new(settings, transport)?;
//!             sim.init()?;
//!             let mut sink = MemorySink::default();
//!             sim.run(&mut sink)?;
//!             sim.global_stats()
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     let (u, v) = handle.join().unwrap().unwrap();
//!     println!("U: {}  V: {}", u, v);
//! }
//! ```

pub mod checkpoint;
pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{GrayScott, SelfTransport, SimulationError, ThreadTransport, Transport};
pub use schema::Settings;
