//! Ghost-padded field storage.
//!
//! A [`Field`] holds one concentration over a subdomain plus one ghost cell on
//! every face, flattened with x fastest. [`FieldStore`] owns the current and
//! next buffers of U and V and is the only place field memory is allocated.

use rand::Rng;
use rand_distr::Uniform;

use super::{LocalSubdomain, Result, SimulationError};

/// One concentration field with a one-cell ghost border.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    data: Vec<f64>,
    local: LocalSubdomain,
}

impl Field {
    /// Zero-filled field over `local`.
    pub fn new(local: LocalSubdomain) -> Self {
        Self {
            data: vec![0.0; local.ghosted_cells()],
            local,
        }
    }

    #[inline]
    pub fn local(&self) -> &LocalSubdomain {
        &self.local
    }

    /// Dimensions including ghosts.
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.local.ghosted_dims()
    }

    /// Value at a ghosted local coordinate.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.data[self.local.local_index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f64) {
        let i = self.local.local_index(x, y, z);
        self.data[i] = value;
    }

    #[inline]
    pub fn at(&self, c: [usize; 3]) -> f64 {
        self.get(c[0], c[1], c[2])
    }

    #[inline]
    pub fn at_mut(&mut self, c: [usize; 3]) -> &mut f64 {
        let i = self.local.local_index(c[0], c[1], c[2]);
        &mut self.data[i]
    }

    /// Raw ghosted data, x fastest.
    #[inline]
    pub(crate) fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Set every interior cell to `value`, leaving ghosts alone.
    pub fn fill_interior(&mut self, value: f64) {
        let [sx, sy, sz] = self.local.size;
        for z in 1..=sz {
            for y in 1..=sy {
                let start = self.local.local_index(1, y, z);
                self.data[start..start + sx].fill(value);
            }
        }
    }

    /// Copy of the interior with the ghost border stripped.
    pub fn ghost_free(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.local.cells()];
        self.copy_interior_to(&mut out);
        out
    }

    /// Write the interior into a caller-owned buffer.
    pub fn ghost_free_into(&self, out: &mut [f64]) -> Result<()> {
        if out.len() != self.local.cells() {
            return Err(SimulationError::DimensionMismatch {
                expected: self.local.cells(),
                actual: out.len(),
            });
        }
        self.copy_interior_to(out);
        Ok(())
    }

    fn copy_interior_to(&self, out: &mut [f64]) {
        let [sx, sy, sz] = self.local.size;
        for (row, dst) in out.chunks_exact_mut(sx).enumerate() {
            let y = row % sy + 1;
            let z = row / sy + 1;
            debug_assert!(z <= sz);
            let start = self.local.local_index(1, y, z);
            dst.copy_from_slice(&self.data[start..start + sx]);
        }
    }

    /// Copy a ghost-free array into the interior. Ghosts are left for the next
    /// halo exchange.
    pub fn restore(&mut self, src: &[f64]) -> Result<()> {
        if src.len() != self.local.cells() {
            return Err(SimulationError::DimensionMismatch {
                expected: self.local.cells(),
                actual: src.len(),
            });
        }
        let [sx, sy, _] = self.local.size;
        for (row, chunk) in src.chunks_exact(sx).enumerate() {
            let start = self.local.local_index(1, row % sy + 1, row / sy + 1);
            self.data[start..start + sx].copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Iterate interior values in ghost-free order.
    pub fn interior(&self) -> impl Iterator<Item = f64> + '_ {
        let [sx, sy, sz] = self.local.size;
        (1..=sz).flat_map(move |z| {
            (1..=sy).flat_map(move |y| {
                let start = self.local.local_index(1, y, z);
                self.data[start..start + sx].iter().copied()
            })
        })
    }
}

/// Owner of the double-buffered U and V fields.
#[derive(Debug, Clone)]
pub struct FieldStore {
    local: LocalSubdomain,
    pub u: Field,
    pub v: Field,
    pub u_next: Field,
    pub v_next: Field,
}

impl FieldStore {
    /// Allocate all four buffers, zero-filled.
    pub fn new(local: LocalSubdomain) -> Self {
        Self {
            local,
            u: Field::new(local),
            v: Field::new(local),
            u_next: Field::new(local),
            v_next: Field::new(local),
        }
    }

    #[inline]
    pub fn local(&self) -> &LocalSubdomain {
        &self.local
    }

    /// Seed the quiescent state plus a perturbed cube at the global center.
    ///
    /// Every interior cell starts at U=1, V=0. Cells of the cube
    /// `[L/2 - d, L/2 + d)` with `d = max(1, L/8)` per axis that fall inside
    /// this subdomain get U = 0.5 - noise*r and V = 0.25 + noise*r, r uniform
    /// in [0, 1).
    pub fn initialize<R: Rng>(&mut self, extent: [usize; 3], noise: f64, rng: &mut R) {
        for f in [&mut self.u, &mut self.v, &mut self.u_next, &mut self.v_next] {
            f.fill(0.0);
        }
        self.u.fill_interior(1.0);

        let [lo, hi] = seed_region(extent);
        let unit = Uniform::new(0.0f64, 1.0);
        let mut seeded = 0usize;
        for gz in lo[2]..hi[2] {
            for gy in lo[1]..hi[1] {
                for gx in lo[0]..hi[0] {
                    if !self.local.is_inside(gx, gy, gz) {
                        continue;
                    }
                    let c = self.local.global_to_local(gx, gy, gz);
                    *self.u.at_mut(c) = 0.5 - noise * rng.sample(unit);
                    *self.v.at_mut(c) = 0.25 + noise * rng.sample(unit);
                    seeded += 1;
                }
            }
        }
        log::debug!(
            "Seeded {} cells of region {:?}..{:?} at offset {:?}",
            seeded,
            lo,
            hi,
            self.local.offset
        );
    }

    /// Exchange current and next buffers of both fields.
    #[inline]
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.u, &mut self.u_next);
        std::mem::swap(&mut self.v, &mut self.v_next);
    }

    /// Restore both current fields from ghost-free arrays.
    ///
    /// Both lengths are checked before either field is touched.
    pub fn restore(&mut self, u: &[f64], v: &[f64]) -> Result<()> {
        let expected = self.local.cells();
        for actual in [u.len(), v.len()] {
            if actual != expected {
                return Err(SimulationError::DimensionMismatch { expected, actual });
            }
        }
        self.u.restore(u)?;
        self.v.restore(v)
    }
}

/// Global bounds `[lo, hi)` of the seeded cube.
pub fn seed_region(extent: [usize; 3]) -> [[usize; 3]; 2] {
    let mut lo = [0; 3];
    let mut hi = [0; 3];
    for a in 0..3 {
        let d = (extent[a] / 8).max(1);
        let center = extent[a] / 2;
        lo[a] = center.saturating_sub(d);
        hi[a] = (center + d).min(extent[a]);
    }
    [lo, hi]
}
