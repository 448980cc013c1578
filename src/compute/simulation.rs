//! Simulation driver - one rank's share of a distributed Gray-Scott run.
//!
//! Each step exchanges the U and V halos with the face neighbors, runs the
//! stencil into the next buffers and swaps. Steps never overlap.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::checkpoint::{Snapshot, SnapshotSink};
use crate::schema::Settings;

use super::{
    FieldStats, FieldStore, FieldTag, LocalSubdomain, Parameters, ProcessTopology, Result,
    SimulationError, Transport, Walls, decompose_with, exchange, step,
};

/// Lifecycle of a [`GrayScott`] instance. Dropping it closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed; no step taken yet.
    Ready,
    /// At least one step taken.
    Stepping,
}

/// One rank of the simulation.
pub struct GrayScott<T: Transport> {
    settings: Settings,
    params: Parameters,
    topology: ProcessTopology,
    walls: Walls,
    fields: FieldStore,
    transport: T,
    rng: StdRng,
    phase: Phase,
    initialized: bool,
    step: u64,
}

impl<T: Transport> GrayScott<T> {
    /// Decompose the domain over the transport's ranks and allocate this
    /// rank's fields.
    pub fn new(settings: Settings, transport: T) -> Result<Self> {
        settings.validate()?;
        let (topology, local) = decompose_with(
            settings.extent,
            transport.size(),
            transport.rank(),
            settings.process_grid,
        )?;
        if transport.rank() == 0 {
            log::info!(
                "Decomposed {:?} over {} ranks as {:?}",
                settings.extent,
                transport.size(),
                topology.dims
            );
        }
        log::debug!(
            "rank {} at {:?}: size {:?} offset {:?} neighbors {:?}",
            topology.rank,
            topology.coords,
            local.size,
            local.offset,
            topology.neighbors
        );

        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(topology.rank as u64)),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            params: Parameters::from_settings(&settings),
            walls: Walls::new(&topology, settings.boundary),
            fields: FieldStore::new(local),
            settings,
            topology,
            transport,
            rng,
            phase: Phase::Ready,
            initialized: false,
            step: 0,
        })
    }

    /// Seed the initial condition. Fails on a second call without an
    /// intervening [`restart`](Self::restart).
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(SimulationError::AlreadyInitialized);
        }
        self.fields
            .initialize(self.settings.extent, self.settings.noise, &mut self.rng);
        self.initialized = true;
        Ok(())
    }

    /// Advance one step.
    pub fn iterate(&mut self) -> Result<()> {
        exchange(
            &mut self.fields.u,
            FieldTag::U,
            &self.topology,
            &mut self.transport,
        )?;
        exchange(
            &mut self.fields.v,
            FieldTag::V,
            &self.topology,
            &mut self.transport,
        )?;

        let FieldStore {
            u, v, u_next, v_next, ..
        } = &mut self.fields;
        let local = *u.local();
        step(u, v, u_next, v_next, &local, &self.params, self.walls);
        self.fields.swap();

        self.step += 1;
        self.phase = Phase::Stepping;
        Ok(())
    }

    /// Replace both fields with ghost-free arrays. The step index is kept.
    pub fn restart(&mut self, u: &[f64], v: &[f64]) -> Result<()> {
        self.fields.restore(u, v)?;
        self.initialized = false;
        log::debug!("rank {} restored fields at step {}", self.topology.rank, self.step);
        Ok(())
    }

    /// Restart from a saved state and continue counting from `step`.
    pub fn resume(&mut self, step: u64, u: &[f64], v: &[f64]) -> Result<()> {
        self.restart(u, v)?;
        self.step = step;
        Ok(())
    }

    /// Run the configured number of steps, handing a snapshot to `sink` every
    /// output period (and before the first step when `init_output` is set).
    pub fn run<S: SnapshotSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        self.run_with(sink, |_| Ok(()))
    }

    /// [`Self::run`], calling `observe` after every snapshot handed to `sink`.
    ///
    /// The observer may use collective operations such as
    /// [`Self::global_stats`]; every rank reaches it at the same steps.
    pub fn run_with<S, F>(&mut self, sink: &mut S, mut observe: F) -> Result<()>
    where
        S: SnapshotSink + ?Sized,
        F: FnMut(&mut Self) -> Result<()>,
    {
        let period = self.settings.output_period;
        let end = self.step + self.settings.steps;
        if self.settings.init_output {
            sink.write(&self.snapshot())?;
            observe(self)?;
        }
        while self.step < end {
            self.iterate()?;
            if self.step % period == 0 {
                sink.write(&self.snapshot())?;
                log::debug!("rank {} wrote step {}", self.topology.rank, self.step);
                observe(self)?;
            }
        }
        Ok(())
    }

    /// Ghost-free view of the current state for the persistence sink.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            step: self.step,
            global: self.settings.extent,
            local: *self.fields.local(),
            u: self.fields.u.ghost_free(),
            v: self.fields.v.ghost_free(),
        }
    }

    /// Ghost-free copy of U.
    pub fn u_noghost(&self) -> Vec<f64> {
        self.fields.u.ghost_free()
    }

    /// Ghost-free copy of V.
    pub fn v_noghost(&self) -> Vec<f64> {
        self.fields.v.ghost_free()
    }

    /// Write ghost-free U into a caller-owned buffer.
    pub fn u_noghost_into(&self, out: &mut [f64]) -> Result<()> {
        self.fields.u.ghost_free_into(out)
    }

    /// Write ghost-free V into a caller-owned buffer.
    pub fn v_noghost_into(&self, out: &mut [f64]) -> Result<()> {
        self.fields.v.ghost_free_into(out)
    }

    /// Statistics of this rank's U and V.
    pub fn local_stats(&self) -> (FieldStats, FieldStats) {
        (
            FieldStats::from_field(&self.fields.u),
            FieldStats::from_field(&self.fields.v),
        )
    }

    /// Statistics of U and V over the whole domain. Collective.
    pub fn global_stats(&mut self) -> Result<(FieldStats, FieldStats)> {
        let (u, v) = self.local_stats();
        Ok((u.reduce(&mut self.transport)?, v.reduce(&mut self.transport)?))
    }

    /// Release the fields and hand the transport back.
    pub fn close(self) -> T {
        log::debug!("rank {} closed at step {}", self.topology.rank, self.step);
        self.transport
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn topology(&self) -> &ProcessTopology {
        &self.topology
    }

    pub fn local(&self) -> &LocalSubdomain {
        self.fields.local()
    }

    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of steps taken (including any resumed offset).
    pub fn step_index(&self) -> u64 {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemorySink;
    use crate::compute::{SelfTransport, ThreadTransport};
    use crate::schema::BoundaryCondition;
    use std::thread;

    fn scenario() -> Settings {
        Settings {
            extent: [8, 8, 8],
            du: 0.2,
            dv: 0.1,
            f: 0.02,
            k: 0.048,
            dt: 1.0,
            noise: 0.0,
            steps: 10,
            output_period: 5,
            ..Default::default()
        }
    }

    /// Run `f` on every rank of an in-process universe and collect the results
    /// in rank order.
    fn on_ranks<R, F>(procs: usize, settings: Settings, f: F) -> Vec<R>
    where
        R: Send + 'static,
        F: Fn(GrayScott<ThreadTransport>) -> R + Send + Sync + Clone + 'static,
    {
        let handles: Vec<_> = ThreadTransport::universe(procs)
            .into_iter()
            .map(|transport| {
                let settings = settings.clone();
                let f = f.clone();
                thread::spawn(move || f(GrayScott::new(settings, transport).unwrap()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_scenario_single_rank() {
        let mut sim = GrayScott::new(scenario(), SelfTransport).unwrap();
        assert_eq!(sim.phase(), Phase::Ready);
        sim.init().unwrap();

        let local = *sim.local();
        let u0 = sim.fields().u.clone();
        for (gz, gy, gx) in [(3, 3, 3), (4, 4, 4), (3, 4, 3)] {
            let c = local.global_to_local(gx, gy, gz);
            assert_eq!(u0.at(c), 0.5);
            assert_eq!(sim.fields().v.at(c), 0.25);
        }

        sim.iterate().unwrap();
        assert_eq!(sim.phase(), Phase::Stepping);
        assert_eq!(sim.step_index(), 1);

        let u1 = &sim.fields().u;
        let v1 = &sim.fields().v;
        // Cells with no seeded neighbor stay exactly quiescent.
        for (gx, gy, gz) in [(0, 0, 0), (7, 7, 7), (0, 4, 4), (4, 4, 0), (1, 6, 3)] {
            let c = local.global_to_local(gx, gy, gz);
            assert_eq!(u1.at(c), 1.0, "U at {:?}", (gx, gy, gz));
            assert_eq!(v1.at(c), 0.0);
        }
        // Seeded cells react.
        let c = local.global_to_local(3, 3, 3);
        assert_ne!(u1.at(c), 0.5);
        assert_ne!(v1.at(c), 0.25);
        // The quiescent neighbor of the seed loses U to diffusion.
        let c = local.global_to_local(2, 3, 3);
        assert!(u1.at(c) < 1.0);
    }

    #[test]
    fn test_init_twice() {
        let settings = Settings {
            noise: 0.1,
            seed: Some(5),
            ..scenario()
        };
        let mut sim = GrayScott::new(settings, SelfTransport).unwrap();
        sim.init().unwrap();
        let before = sim.u_noghost();
        assert!(matches!(sim.init(), Err(SimulationError::AlreadyInitialized)));
        assert_eq!(sim.u_noghost(), before);

        // A restart clears the flag.
        let (u, v) = (sim.u_noghost(), sim.v_noghost());
        sim.restart(&u, &v).unwrap();
        assert!(!sim.is_initialized());
        sim.init().unwrap();
    }

    #[test]
    fn test_pinned_seed_is_reproducible() {
        let settings = Settings {
            noise: 0.1,
            seed: Some(11),
            ..scenario()
        };
        let mut a = GrayScott::new(settings.clone(), SelfTransport).unwrap();
        let mut b = GrayScott::new(settings, SelfTransport).unwrap();
        a.init().unwrap();
        b.init().unwrap();
        assert_eq!(a.u_noghost(), b.u_noghost());
        assert_eq!(a.v_noghost(), b.v_noghost());
    }

    #[test]
    fn test_restart_dimension_mismatch() {
        let mut sim = GrayScott::new(scenario(), SelfTransport).unwrap();
        let err = sim.restart(&[0.0; 10], &[0.0; 512]).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::DimensionMismatch {
                expected: 512,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_too_many_ranks_for_extent() {
        let settings = Settings {
            extent: [1, 1, 2],
            ..scenario()
        };
        let mut endpoints = ThreadTransport::universe(3);
        let transport = endpoints.pop().unwrap();
        assert!(matches!(
            GrayScott::new(settings, transport),
            Err(SimulationError::Configuration(_))
        ));
    }

    #[test]
    fn test_restart_round_trip_matches_continuation() {
        let settings = Settings {
            noise: 0.05,
            seed: Some(2),
            ..scenario()
        };
        let results = on_ranks(2, settings.clone(), move |mut sim| {
            sim.init().unwrap();
            for _ in 0..3 {
                sim.iterate().unwrap();
            }
            let (u, v) = (sim.u_noghost(), sim.v_noghost());

            // Continue directly.
            let mut cont = sim;
            cont.iterate().unwrap();
            let expected = (cont.u_noghost(), cont.v_noghost());
            let transport = cont.close();

            // Fresh instance restored from the ghost-free arrays.
            let mut restored = GrayScott::new(settings.clone(), transport).unwrap();
            restored.resume(3, &u, &v).unwrap();
            restored.iterate().unwrap();
            assert_eq!(restored.step_index(), 4);
            (expected, (restored.u_noghost(), restored.v_noghost()))
        });
        for (expected, actual) in results {
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn test_decomposed_run_matches_single_rank() {
        let settings = Settings {
            extent: [8, 6, 4],
            noise: 0.0,
            ..scenario()
        };
        let mut single = GrayScott::new(settings.clone(), SelfTransport).unwrap();
        single.init().unwrap();
        for _ in 0..4 {
            single.iterate().unwrap();
        }
        let reference = single.u_noghost();

        for procs in [2, 4] {
            let parts = on_ranks(procs, settings.clone(), |mut sim| {
                sim.init().unwrap();
                for _ in 0..4 {
                    sim.iterate().unwrap();
                }
                (*sim.local(), sim.u_noghost())
            });
            let mut assembled = vec![f64::NAN; reference.len()];
            for (local, data) in parts {
                let [sx, sy, sz] = local.size;
                for z in 0..sz {
                    for y in 0..sy {
                        for x in 0..sx {
                            let g = [local.offset[0] + x, local.offset[1] + y, local.offset[2] + z];
                            assembled[g[0] + 8 * (g[1] + 6 * g[2])] = data[x + sx * (y + sy * z)];
                        }
                    }
                }
            }
            for (a, b) in assembled.iter().zip(&reference) {
                assert!((a - b).abs() < 1e-12, "{} ranks: {} vs {}", procs, a, b);
            }
        }
    }

    #[test]
    fn test_pure_diffusion_conserves_global_sum() {
        let settings = Settings {
            extent: [8, 8, 6],
            f: 0.0,
            k: 0.0,
            dt: 0.5,
            noise: 0.1,
            seed: Some(9),
            boundary: BoundaryCondition::Reflective,
            ..scenario()
        };
        let sums = on_ranks(4, settings, |mut sim| {
            sim.init().unwrap();
            let (before, _) = sim.global_stats().unwrap();
            for _ in 0..10 {
                sim.iterate().unwrap();
            }
            let (after, _) = sim.global_stats().unwrap();
            (before.sum, after.sum)
        });
        for (before, after) in sums {
            assert!((after - before).abs() < 1e-9 * before, "{} -> {}", before, after);
        }
    }

    #[test]
    fn test_fixed_boundary_drains_mass() {
        let settings = Settings {
            f: 0.0,
            k: 0.0,
            boundary: BoundaryCondition::Fixed,
            ..scenario()
        };
        let mut sim = GrayScott::new(settings, SelfTransport).unwrap();
        sim.init().unwrap();
        let before = sim.local_stats().0.sum;
        sim.iterate().unwrap();
        let after = sim.local_stats().0.sum;
        assert!(after < before);
        // Corner cell sees three zero ghosts.
        let c = sim.local().global_to_local(0, 0, 0);
        assert!((sim.fields().u.at(c) - (1.0 - 0.2 * 3.0)).abs() < 1e-15);
    }

    #[test]
    fn test_run_writes_every_period() {
        let settings = Settings {
            init_output: true,
            ..scenario()
        };
        let mut sim = GrayScott::new(settings, SelfTransport).unwrap();
        sim.init().unwrap();
        let mut sink = MemorySink::default();
        sim.run(&mut sink).unwrap();
        let steps: Vec<u64> = sink.snapshots.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 5, 10]);
        assert_eq!(sink.snapshots[0].u.len(), 512);
        assert_eq!(sink.snapshots[2].global, [8, 8, 8]);
        assert_eq!(sim.step_index(), 10);
    }

    #[test]
    fn test_run_with_observes_each_output() {
        let results = on_ranks(2, scenario(), |mut sim| {
            sim.init().unwrap();
            let mut sink = MemorySink::default();
            let mut seen = Vec::new();
            sim.run_with(&mut sink, |sim| {
                let (u, _) = sim.global_stats()?;
                seen.push((sim.step_index(), u.cells));
                Ok(())
            })
            .unwrap();
            seen
        });
        for seen in results {
            assert_eq!(seen, vec![(5, 512), (10, 512)]);
        }
    }
}
