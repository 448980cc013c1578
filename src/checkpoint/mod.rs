//! Checkpoint output and restart input.
//!
//! The simulation core hands ghost-free snapshots to a [`SnapshotSink`] and
//! reads them back from a [`SnapshotSource`]. [`CheckpointWriter`] and
//! [`CheckpointReader`] implement both against per-rank `.gsck` files;
//! [`MemorySink`] keeps snapshots in memory.
//!
//! # File Format
//!
//! ```text
//! Header (76 bytes):
//!   Magic: "GSCK" (4 bytes)
//!   Version: u16
//!   Flags: u16 (compression)
//!   Global extent: 3 x u32
//!   Local extent: 3 x u32
//!   Local offset: 3 x u32
//!   Frame count: u64
//!   dt: f64
//!   Reserved: 16 bytes
//!
//! Frame data (variable):
//!   U then V, local_cells * 8 bytes each (f64 LE), optionally LZ4 compressed
//!
//! Frame index table (frame_count * 24 bytes, at the end):
//!   Step: u64
//!   Offset: u64
//!   Size: u64
//! ```
//!
//! The writer rewrites the index table and frame count after every frame, so
//! the index always sits at the end of the file.

mod format;
mod reader;
mod writer;

use crate::compute::{LocalSubdomain, Result, SimulationError};

pub use format::{
    CHECKPOINT_MAGIC, CHECKPOINT_VERSION, CheckpointFlags, CheckpointHeader, CompressionType,
    FrameIndex,
};
pub use reader::CheckpointReader;
pub use writer::{CheckpointStats, CheckpointWriter, checkpoint_path};

/// Ghost-free state of one rank at one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Step index.
    pub step: u64,
    /// Global extent, for reassembly.
    pub global: [usize; 3],
    /// This rank's subdomain.
    pub local: LocalSubdomain,
    /// Ghost-free U, x fastest.
    pub u: Vec<f64>,
    /// Ghost-free V, x fastest.
    pub v: Vec<f64>,
}

impl Snapshot {
    /// Check that both arrays match the subdomain.
    pub fn validate(&self) -> Result<()> {
        let expected = self.local.cells();
        for actual in [self.u.len(), self.v.len()] {
            if actual != expected {
                return Err(SimulationError::DimensionMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

/// Receives snapshots during a run.
pub trait SnapshotSink {
    fn write(&mut self, snapshot: &Snapshot) -> Result<()>;
}

/// Supplies snapshots for restart.
pub trait SnapshotSource {
    /// The snapshot taken at `step`.
    fn read(&mut self, step: u64) -> Result<Snapshot>;
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub snapshots: Vec<Snapshot>,
}

impl SnapshotSink for MemorySink {
    fn write(&mut self, snapshot: &Snapshot) -> Result<()> {
        snapshot.validate()?;
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

impl SnapshotSource for MemorySink {
    fn read(&mut self, step: u64) -> Result<Snapshot> {
        self.snapshots
            .iter()
            .find(|s| s.step == step)
            .cloned()
            .ok_or_else(|| {
                SimulationError::Checkpoint(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no snapshot for step {}", step),
                ))
            })
    }
}
