//! Schema module - Settings for Gray-Scott simulation runs.

mod settings;

pub use settings::*;
