use std::path::{Path, PathBuf};

use crate::diagnostic::Diagnostic;
use crate::span::Span;
use crate::target::FeatureLevel;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "simdkern.toml";

/// Overrides the configuration file location.
pub const CONFIG_ENV: &str = "SIMDKERN_CONFIG";

/// Settings from simdkern.toml.
///
/// ```toml
/// [cpu]
/// max_level = "avx2"   # never dispatch above this level
/// fma = true           # false drops FMA variants from dispatch
///
/// [compile]
/// optimize = true      # register caching and FMA fusion
/// all_levels = false   # also compile levels the host cannot run
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub max_level: Option<FeatureLevel>,
    pub fma: bool,
    pub optimize: bool,
    pub all_levels: bool,
    /// File the settings came from, if any.
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_level: None,
            fma: true,
            optimize: true,
            all_levels: false,
            path: None,
        }
    }
}

fn parse_bool(key: &str, value: &str, path: &Path) -> Result<bool, Diagnostic> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Diagnostic::error(
            format!("'{}' in '{}' must be true or false, found '{}'", key, path.display(), value),
            Span::dummy(),
        )),
    }
}

impl Config {
    /// Load settings from a simdkern.toml file.
    pub fn load(path: &Path) -> Result<Config, Diagnostic> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Diagnostic::error(format!("cannot read '{}': {}", path.display(), e), Span::dummy())
        })?;
        Config::parse(&content, path)
    }

    /// Parse settings; `path` is only used in messages.
    pub fn parse(content: &str, path: &Path) -> Result<Config, Diagnostic> {
        let mut config = Config {
            path: Some(path.to_path_buf()),
            ..Config::default()
        };
        // Section-aware minimal TOML parsing
        let mut section = String::new();
        for line in content.lines() {
            let trimmed = match line.split_once('#') {
                Some((before, _)) => before.trim(),
                None => line.trim(),
            };
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                section = trimmed[1..trimmed.len() - 1].trim().to_string();
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(Diagnostic::error(
                    format!("expected 'key = value' in '{}', found '{}'", path.display(), trimmed),
                    Span::dummy(),
                ));
            };
            let key = key.trim().trim_matches('"');
            let value = value.trim().trim_matches('"');
            match (section.as_str(), key) {
                ("cpu", "max_level") => {
                    let level = FeatureLevel::parse(value).ok_or_else(|| {
                        Diagnostic::error(
                            format!("unknown feature level '{}' in '{}'", value, path.display()),
                            Span::dummy(),
                        )
                        .with_help(format!(
                            "levels are {}",
                            FeatureLevel::ALL.map(|l| l.name()).join(", ")
                        ))
                    })?;
                    config.max_level = Some(level);
                }
                ("cpu", "fma") => config.fma = parse_bool(key, value, path)?,
                ("compile", "optimize") => config.optimize = parse_bool(key, value, path)?,
                ("compile", "all_levels") => config.all_levels = parse_bool(key, value, path)?,
                _ => tracing::warn!(section = %section, key, "ignoring unknown setting"),
            }
        }
        Ok(config)
    }

    /// Settings for a process started in `dir`: the file named by
    /// `SIMDKERN_CONFIG`, else `dir/simdkern.toml`, else defaults.
    pub fn discover(dir: &Path) -> Result<Config, Diagnostic> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Config::load(Path::new(&path));
        }
        let candidate = dir.join(CONFIG_FILE);
        if candidate.exists() {
            Config::load(&candidate)
        } else {
            Ok(Config::default())
        }
    }

    /// Apply the `[cpu]` caps to a detected level.
    pub fn cap(&self, level: FeatureLevel) -> FeatureLevel {
        let level = match self.max_level {
            Some(max) => level.min(max),
            None => level,
        };
        if self.fma {
            level
        } else {
            level.without_fma()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"# dispatch caps
[cpu]
max_level = "avx2+fma"
fma = false

[compile]
optimize = false   # debugging
all_levels = true
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_level, Some(FeatureLevel::Avx2Fma));
        assert!(!config.fma);
        assert!(!config.optimize);
        assert!(config.all_levels);
        assert_eq!(config.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE));
        assert!(config.is_err());
        let config = Config::parse("", Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(config.max_level, None);
        assert!(config.fma && config.optimize && !config.all_levels);
    }

    #[test]
    fn test_discover_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        if std::env::var(CONFIG_ENV).is_ok() {
            return;
        }
        assert_eq!(Config::discover(dir.path()).unwrap().path, None);
        fs::write(dir.path().join(CONFIG_FILE), "[cpu]\nmax_level = \"sse2\"\n").unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.max_level, Some(FeatureLevel::Sse2));
    }

    #[test]
    fn test_bad_values_rejected() {
        let path = Path::new(CONFIG_FILE);
        let err = Config::parse("[cpu]\nmax_level = \"avx3\"\n", path).unwrap_err();
        assert_eq!(err.message, "unknown feature level 'avx3' in 'simdkern.toml'");
        let err = Config::parse("[compile]\noptimize = yes\n", path).unwrap_err();
        assert_eq!(
            err.message,
            "'optimize' in 'simdkern.toml' must be true or false, found 'yes'"
        );
        // Unknown keys are only warned about.
        assert!(Config::parse("[cpu]\nturbo = true\n", path).is_ok());
    }

    #[test]
    fn test_cap() {
        let mut config = Config::default();
        assert_eq!(config.cap(FeatureLevel::Avx512fFma), FeatureLevel::Avx512fFma);
        config.max_level = Some(FeatureLevel::AvxFma);
        assert_eq!(config.cap(FeatureLevel::Avx512fFma), FeatureLevel::AvxFma);
        assert_eq!(config.cap(FeatureLevel::Sse2), FeatureLevel::Sse2);
        config.fma = false;
        assert_eq!(config.cap(FeatureLevel::Avx512fFma), FeatureLevel::Avx);
    }
}
