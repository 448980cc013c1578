//! MPI transport: one OS process per rank.
//!
//! Requires the `mpi` feature and an MPI installation. Launch the binary with
//! `mpirun -n <ranks>`; the rank count comes from the launcher.
//!
//! Sends use buffered mode (`MPI_Bsend`) so a rank can post all of its halo
//! planes before receiving any, which is what [`Transport::send`] promises.
//! The attach buffer is sized from the global extent by [`MpiTransport::new`].

use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::{Rank, Tag};

use super::{MAX_TAG, Result, SimulationError, Transport};

/// Per-message allowance for the MPI buffered-send bookkeeping.
const BSEND_OVERHEAD: usize = 1024;

/// Messages a rank may have in flight: both fields' six planes.
const HALO_MESSAGES: usize = 12;

/// Transport over `MPI_COMM_WORLD`.
pub struct MpiTransport {
    rank: usize,
    size: usize,
}

impl MpiTransport {
    /// Attach a send buffer large enough for one iteration's halo traffic over
    /// `extent` and wrap the world communicator.
    ///
    /// `universe` must outlive the transport; dropping it finalizes MPI.
    pub fn new(universe: &mut Universe, extent: [usize; 3]) -> Self {
        let world = universe.world();
        let size = world.size() as usize;
        universe.set_buffer_size(send_buffer_bytes(extent, size));
        Self {
            rank: world.rank() as usize,
            size,
        }
    }

    fn peer(&self, peer: usize) -> Result<Rank> {
        if peer >= self.size {
            return Err(SimulationError::communication(
                peer,
                format!("no such rank (size {})", self.size),
            ));
        }
        Ok(peer as Rank)
    }
}

impl Transport for MpiTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: usize, tag: u32, payload: Vec<f64>) -> Result<()> {
        let peer = self.peer(dest)?;
        let tag = mpi_tag(dest, tag)?;
        SimpleCommunicator::world()
            .process_at_rank(peer)
            .buffered_send_with_tag(&payload[..], tag);
        Ok(())
    }

    fn recv(&mut self, source: usize, tag: u32) -> Result<Vec<f64>> {
        let peer = self.peer(source)?;
        let tag = mpi_tag(source, tag)?;
        let (payload, _status) = SimpleCommunicator::world()
            .process_at_rank(peer)
            .receive_vec_with_tag::<f64>(tag);
        Ok(payload)
    }
}

fn mpi_tag(peer: usize, tag: u32) -> Result<Tag> {
    if tag > MAX_TAG {
        return Err(SimulationError::communication(
            peer,
            format!("tag {} exceeds {}", tag, MAX_TAG),
        ));
    }
    Ok(tag as Tag)
}

/// Attach-buffer size for the halo planes of one iteration plus the
/// reduction messages rank 0 broadcasts to `ranks - 1` peers.
///
/// Planes are bounded by the two largest global extents, so the result holds
/// for any decomposition.
pub fn send_buffer_bytes(extent: [usize; 3], ranks: usize) -> usize {
    let mut sorted = extent;
    sorted.sort_unstable();
    let plane = sorted[1] * sorted[2] * size_of::<f64>();
    let reductions = ranks.saturating_sub(1) * (3 * size_of::<f64>() + BSEND_OVERHEAD);
    HALO_MESSAGES * (plane + BSEND_OVERHEAD) + reductions
}
