//! Message passing between ranks.
//!
//! The halo exchange only needs point-to-point sends and receives of f64
//! payloads. [`Transport`] captures that; [`ThreadTransport`] runs ranks as
//! threads of one process over crossbeam channels, [`SelfTransport`] is the
//! single-rank case. With the `mpi` feature, `MpiTransport` runs one process
//! per rank.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use super::{Result, SimulationError};

/// Default time a receive waits before the run is declared broken.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest tag every transport must carry. MPI guarantees tags up to 32767.
pub const MAX_TAG: u32 = 32_767;

/// Tag reserved for collective reductions.
const TAG_REDUCE: u32 = MAX_TAG;

/// Point-to-point message passing between ranks.
///
/// A message sent with `(dest, tag)` is received by `dest` with
/// `(source, tag)`. Messages with the same source and tag arrive in order.
/// Tags never exceed [`MAX_TAG`].
pub trait Transport: Send {
    /// This rank.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn size(&self) -> usize;

    /// Send a payload. Must not wait for the matching receive.
    fn send(&mut self, dest: usize, tag: u32, payload: Vec<f64>) -> Result<()>;

    /// Block until the message from `source` with `tag` arrives.
    fn recv(&mut self, source: usize, tag: u32) -> Result<Vec<f64>>;
}

/// Transport for a single-rank run. There are no peers to talk to.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfTransport;

impl Transport for SelfTransport {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&mut self, dest: usize, _tag: u32, _payload: Vec<f64>) -> Result<()> {
        Err(SimulationError::communication(
            dest,
            "single-rank transport has no peers",
        ))
    }

    fn recv(&mut self, source: usize, _tag: u32) -> Result<Vec<f64>> {
        Err(SimulationError::communication(
            source,
            "single-rank transport has no peers",
        ))
    }
}

struct Envelope {
    source: usize,
    tag: u32,
    payload: Vec<f64>,
}

/// In-process transport: each rank is a thread holding one endpoint.
pub struct ThreadTransport {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    /// Messages that arrived before anyone asked for them.
    pending: HashMap<(usize, u32), VecDeque<Vec<f64>>>,
    timeout: Duration,
}

impl ThreadTransport {
    /// Create connected endpoints for `size` ranks; element `r` is rank `r`.
    pub fn universe(size: usize) -> Vec<ThreadTransport> {
        Self::universe_with_timeout(size, DEFAULT_RECV_TIMEOUT)
    }

    pub fn universe_with_timeout(size: usize, timeout: Duration) -> Vec<ThreadTransport> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadTransport {
                rank,
                peers: senders.clone(),
                inbox,
                pending: HashMap::new(),
                timeout,
            })
            .collect()
    }
}

impl Transport for ThreadTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&mut self, dest: usize, tag: u32, payload: Vec<f64>) -> Result<()> {
        let peer = self.peers.get(dest).ok_or_else(|| {
            SimulationError::communication(dest, format!("no such rank (size {})", self.peers.len()))
        })?;
        peer.send(Envelope {
            source: self.rank,
            tag,
            payload,
        })
        .map_err(|_| SimulationError::communication(dest, "peer endpoint dropped"))
    }

    fn recv(&mut self, source: usize, tag: u32) -> Result<Vec<f64>> {
        if source >= self.peers.len() {
            return Err(SimulationError::communication(
                source,
                format!("no such rank (size {})", self.peers.len()),
            ));
        }
        if let Some(payload) = self
            .pending
            .get_mut(&(source, tag))
            .and_then(VecDeque::pop_front)
        {
            return Ok(payload);
        }
        loop {
            let envelope = self.inbox.recv_timeout(self.timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => SimulationError::communication(
                    source,
                    format!("timed out after {:?} waiting for tag {}", self.timeout, tag),
                ),
                RecvTimeoutError::Disconnected => {
                    SimulationError::communication(source, "all peers disconnected")
                }
            })?;
            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            self.pending
                .entry((envelope.source, envelope.tag))
                .or_default()
                .push_back(envelope.payload);
        }
    }
}

/// Element-wise sum of `values` across all ranks; every rank gets the result.
pub fn all_reduce_sum<T: Transport + ?Sized>(
    transport: &mut T,
    values: &[f64],
) -> Result<Vec<f64>> {
    let size = transport.size();
    if size == 1 {
        return Ok(values.to_vec());
    }
    if transport.rank() == 0 {
        let mut total = values.to_vec();
        for source in 1..size {
            let part = transport.recv(source, TAG_REDUCE)?;
            if part.len() != total.len() {
                return Err(SimulationError::communication(
                    source,
                    format!("reduction length {} != {}", part.len(), total.len()),
                ));
            }
            for (t, p) in total.iter_mut().zip(part) {
                *t += p;
            }
        }
        for dest in 1..size {
            transport.send(dest, TAG_REDUCE, total.clone())?;
        }
        Ok(total)
    } else {
        transport.send(0, TAG_REDUCE, values.to_vec())?;
        transport.recv(0, TAG_REDUCE)
    }
}

/// Element-wise min and max across all ranks.
pub fn all_reduce_min_max<T: Transport + ?Sized>(
    transport: &mut T,
    min: f64,
    max: f64,
) -> Result<(f64, f64)> {
    let size = transport.size();
    if size == 1 {
        return Ok((min, max));
    }
    if transport.rank() == 0 {
        let (mut lo, mut hi) = (min, max);
        for source in 1..size {
            let part = transport.recv(source, TAG_REDUCE)?;
            let [pmin, pmax] = part[..] else {
                return Err(SimulationError::communication(
                    source,
                    format!("expected 2 values, got {}", part.len()),
                ));
            };
            lo = lo.min(pmin);
            hi = hi.max(pmax);
        }
        for dest in 1..size {
            transport.send(dest, TAG_REDUCE, vec![lo, hi])?;
        }
        Ok((lo, hi))
    } else {
        transport.send(0, TAG_REDUCE, vec![min, max])?;
        let part = transport.recv(0, TAG_REDUCE)?;
        match part[..] {
            [lo, hi] => Ok((lo, hi)),
            _ => Err(SimulationError::communication(0, "malformed min/max reply")),
        }
    }
}
