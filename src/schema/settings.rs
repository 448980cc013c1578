//! Settings for Gray-Scott simulation runs.

use serde::{Deserialize, Serialize};

fn default_output() -> String {
    "gs".to_string()
}

fn default_noise() -> f64 {
    0.1
}

/// Treatment of subdomain faces that lie on the global domain boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// Zero-flux: the boundary cell stands in for its missing neighbor.
    #[default]
    Reflective,
    /// The boundary ghost plane is read as-is (it stays at its zero fill).
    Fixed,
}

/// Compression applied to checkpoint frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    Lz4,
}

/// Top-level simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Global grid extent in cells (x, y, z).
    pub extent: [usize; 3],
    /// Diffusion coefficient of U.
    pub du: f64,
    /// Diffusion coefficient of V.
    pub dv: f64,
    /// Feed rate.
    pub f: f64,
    /// Kill rate.
    pub k: f64,
    /// Time step.
    pub dt: f64,
    /// Amplitude of the uniform noise added to the seeded region.
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Number of steps to run.
    pub steps: u64,
    /// Write a snapshot every N steps.
    pub output_period: u64,
    /// Pins the per-rank random generators (rank r uses `seed + r`).
    #[serde(default)]
    pub seed: Option<u64>,
    /// Resume from the checkpoint frame with this step index.
    #[serde(default)]
    pub restart_step: Option<u64>,
    #[serde(default)]
    pub boundary: BoundaryCondition,
    /// Process-grid hint; a zero entry leaves that axis free.
    #[serde(default)]
    pub process_grid: [usize; 3],
    /// Checkpoint path prefix.
    #[serde(default = "default_output")]
    pub output: String,
    /// Also write the state before the first step.
    #[serde(default)]
    pub init_output: bool,
    #[serde(default)]
    pub compression: Compression,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extent: [64, 64, 64],
            du: 0.2,
            dv: 0.1,
            f: 0.02,
            k: 0.048,
            dt: 0.2,
            noise: default_noise(),
            steps: 1000,
            output_period: 100,
            seed: None,
            restart_step: None,
            boundary: BoundaryCondition::default(),
            process_grid: [0; 3],
            output: default_output(),
            init_output: false,
            compression: Compression::default(),
        }
    }
}

impl Settings {
    /// Total number of cells in the global domain.
    #[inline]
    pub fn global_cells(&self) -> usize {
        self.extent.iter().product()
    }

    /// Largest dt for which the explicit update of the 7-point stencil is stable.
    pub fn max_stable_dt(&self) -> f64 {
        1.0 / (6.0 * self.du.max(self.dv))
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extent.contains(&0) {
            return Err(ConfigError::InvalidExtent(self.extent));
        }
        for (name, value) in [
            ("du", self.du),
            ("dv", self.dv),
            ("f", self.f),
            ("k", self.k),
            ("noise", self.noise),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(ConfigError::InvalidTimeStep(self.dt));
        }
        if self.steps == 0 {
            return Err(ConfigError::InvalidSteps);
        }
        if self.output_period == 0 {
            return Err(ConfigError::InvalidOutputPeriod);
        }
        if self.compression == Compression::Lz4 && !cfg!(feature = "lz4") {
            return Err(ConfigError::CompressionUnavailable);
        }
        Ok(())
    }

    /// Log parameter combinations that are valid but unlikely to behave.
    pub fn warn(&self) {
        let max_dt = self.max_stable_dt();
        if self.dt > max_dt {
            log::warn!(
                "dt={} exceeds the explicit stability bound {:.4}; the run may diverge",
                self.dt,
                max_dt
            );
        }
        if self.f > 0.1 || self.k > 0.1 {
            log::warn!("F and k above 0.1 rarely produce Turing patterns");
        }
        if self.du <= self.dv {
            log::warn!("Du should typically exceed Dv for pattern formation");
        }
    }
}

/// Settings validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Global extent {0:?} must be positive on every axis")]
    InvalidExtent([usize; 3]),
    #[error("Parameter {name} must be finite and non-negative (got {value})")]
    InvalidRate { name: &'static str, value: f64 },
    #[error("Time step must be positive (got {0})")]
    InvalidTimeStep(f64),
    #[error("Step count must be non-zero")]
    InvalidSteps,
    #[error("Output period must be non-zero")]
    InvalidOutputPeriod,
    #[error("lz4 compression requires building with the `lz4` feature")]
    CompressionUnavailable,
}
