//! Process configuration: `simdkern.toml` and its environment override.

mod settings;

pub use settings::{Config, CONFIG_ENV, CONFIG_FILE};
