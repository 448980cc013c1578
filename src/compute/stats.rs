//! Summary statistics for console diagnostics.

use serde::{Deserialize, Serialize};

use super::{Field, Result, Transport, all_reduce_min_max, all_reduce_sum};

/// Statistics of one field's interior.
///
/// `min`, `max`, `sum` and `mean` cover the finite cells only; NaN and
/// infinite cells are counted in `non_finite`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sum: f64,
    pub cells: usize,
    pub non_finite: usize,
}

impl FieldStats {
    /// Statistics over this rank's interior cells.
    pub fn from_field(field: &Field) -> Self {
        let mut sum = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut cells = 0usize;
        let mut non_finite = 0usize;
        for v in field.interior() {
            cells += 1;
            if !v.is_finite() {
                non_finite += 1;
                continue;
            }
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        Self {
            min,
            max,
            mean: finite_mean(sum, cells - non_finite),
            sum,
            cells,
            non_finite,
        }
    }

    /// True if every cell holds a finite value.
    pub fn is_finite(&self) -> bool {
        self.non_finite == 0
    }

    /// Combine per-rank statistics into global ones. Collective.
    pub fn reduce<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Self> {
        let totals = all_reduce_sum(
            transport,
            &[self.sum, self.cells as f64, self.non_finite as f64],
        )?;
        let (min, max) = all_reduce_min_max(transport, self.min, self.max)?;
        let sum = totals[0];
        let cells = totals[1] as usize;
        let non_finite = totals[2] as usize;
        Ok(Self {
            min,
            max,
            mean: finite_mean(sum, cells - non_finite),
            sum,
            cells,
            non_finite,
        })
    }
}

fn finite_mean(sum: f64, finite: usize) -> f64 {
    if finite > 0 { sum / finite as f64 } else { 0.0 }
}

impl std::fmt::Display for FieldStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "min={:.6} max={:.6} mean={:.6} sum={:.6}",
            self.min, self.max, self.mean, self.sum
        )?;
        if self.non_finite > 0 {
            write!(f, " non-finite={}/{}", self.non_finite, self.cells)?;
        }
        Ok(())
    }
}
