pub mod build;
pub mod check;
pub mod features;
pub mod list;
pub mod run;

use std::path::Path;
use std::process;

use simdkern::config::Config;
use simdkern::target::FeatureLevel;

/// Read a kernel source file, exiting on failure.
pub fn read_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Settings for the working directory, exiting if the file is invalid.
pub fn load_config() -> Config {
    let dir = std::env::current_dir().unwrap_or_else(|_| ".".into());
    match Config::discover(&dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e.message);
            process::exit(1);
        }
    }
}

/// Parse a `--level` argument, exiting with the valid names on failure.
pub fn parse_level(name: &str) -> FeatureLevel {
    match FeatureLevel::parse(name) {
        Some(level) => level,
        None => {
            let names: Vec<&str> = FeatureLevel::ALL.iter().map(|l| l.name()).collect();
            eprintln!(
                "error: unknown feature level '{}' (expected one of: {})",
                name,
                names.join(", ")
            );
            process::exit(1);
        }
    }
}

/// Display name for a source path.
pub fn display_name(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
