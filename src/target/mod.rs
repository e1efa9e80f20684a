//! CPU features and dispatch levels.
//!
//! Every kernel is compiled once per `FeatureLevel`. The host's level is
//! detected once per process and can be capped with `SIMDKERN_MAX_LEVEL`
//! (or `[cpu] max_level` in `simdkern.toml`) to pin dispatch.

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::OnceLock;

/// Environment variable that caps the detected feature level.
pub const MAX_LEVEL_ENV: &str = "SIMDKERN_MAX_LEVEL";

// ─── Feature Set ──────────────────────────────────────────────────

/// Instruction-set extensions relevant to code generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeatureSet {
    pub sse2: bool,
    pub avx: bool,
    pub avx2: bool,
    pub avx512f: bool,
    pub fma: bool,
}

impl FeatureSet {
    /// SSE2 only: the x86-64 baseline.
    pub fn baseline() -> Self {
        Self {
            sse2: true,
            avx: false,
            avx2: false,
            avx512f: false,
            fma: false,
        }
    }

    /// Every extension this crate can emit.
    pub fn all() -> Self {
        Self {
            sse2: true,
            avx: true,
            avx2: true,
            avx512f: true,
            fma: true,
        }
    }

    /// Drop extensions whose prerequisites are missing: AVX512F needs
    /// AVX2, AVX2 needs AVX, FMA needs AVX.
    pub fn normalized(mut self) -> Self {
        self.sse2 = true;
        if !self.avx {
            self.avx2 = false;
            self.fma = false;
        }
        if !self.avx2 {
            self.avx512f = false;
        }
        self
    }

    /// The highest level whose features are all present.
    pub fn level(&self) -> FeatureLevel {
        FeatureLevel::ALL
            .iter()
            .rev()
            .copied()
            .find(|level| self.contains(&level.features()))
            .unwrap_or(FeatureLevel::Sse2)
    }

    pub fn contains(&self, other: &FeatureSet) -> bool {
        (self.sse2 || !other.sse2)
            && (self.avx || !other.avx)
            && (self.avx2 || !other.avx2)
            && (self.avx512f || !other.avx512f)
            && (self.fma || !other.fma)
    }

    /// Space-separated list of enabled extensions.
    pub fn describe(&self) -> String {
        let mut names = vec!["sse2"];
        if self.avx {
            names.push("avx");
        }
        if self.avx2 {
            names.push("avx2");
        }
        if self.avx512f {
            names.push("avx512f");
        }
        if self.fma {
            names.push("fma");
        }
        names.join(" ")
    }
}

// ─── Feature Level ────────────────────────────────────────────────

/// Ordered compilation tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    Sse2,
    Avx,
    AvxFma,
    Avx2,
    Avx2Fma,
    Avx512f,
    Avx512fFma,
}

impl FeatureLevel {
    pub const ALL: [FeatureLevel; 7] = [
        FeatureLevel::Sse2,
        FeatureLevel::Avx,
        FeatureLevel::AvxFma,
        FeatureLevel::Avx2,
        FeatureLevel::Avx2Fma,
        FeatureLevel::Avx512f,
        FeatureLevel::Avx512fFma,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeatureLevel::Sse2 => "sse2",
            FeatureLevel::Avx => "avx",
            FeatureLevel::AvxFma => "avx+fma",
            FeatureLevel::Avx2 => "avx2",
            FeatureLevel::Avx2Fma => "avx2+fma",
            FeatureLevel::Avx512f => "avx512f",
            FeatureLevel::Avx512fFma => "avx512f+fma",
        }
    }

    /// Parse a level name. Accepts `+` or `-` before `fma` and any case.
    pub fn parse(s: &str) -> Option<FeatureLevel> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "+");
        FeatureLevel::ALL
            .iter()
            .copied()
            .find(|level| level.name() == normalized)
    }

    pub fn features(self) -> FeatureSet {
        let fma = self.has_fma();
        let (avx, avx2, avx512f) = match self {
            FeatureLevel::Sse2 => (false, false, false),
            FeatureLevel::Avx | FeatureLevel::AvxFma => (true, false, false),
            FeatureLevel::Avx2 | FeatureLevel::Avx2Fma => (true, true, false),
            FeatureLevel::Avx512f | FeatureLevel::Avx512fFma => (true, true, true),
        };
        FeatureSet {
            sse2: true,
            avx,
            avx2,
            avx512f,
            fma,
        }
    }

    pub fn has_fma(self) -> bool {
        matches!(
            self,
            FeatureLevel::AvxFma | FeatureLevel::Avx2Fma | FeatureLevel::Avx512fFma
        )
    }

    /// The same vector width without FMA.
    pub fn without_fma(self) -> FeatureLevel {
        match self {
            FeatureLevel::AvxFma => FeatureLevel::Avx,
            FeatureLevel::Avx2Fma => FeatureLevel::Avx2,
            FeatureLevel::Avx512fFma => FeatureLevel::Avx512f,
            other => other,
        }
    }

    /// Levels at or below `self`, lowest first.
    pub fn up_to(self) -> impl Iterator<Item = FeatureLevel> {
        FeatureLevel::ALL.into_iter().filter(move |l| *l <= self)
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Detection ────────────────────────────────────────────────────

static DETECTED: OnceLock<FeatureSet> = OnceLock::new();
static HOST_LEVEL: OnceLock<FeatureLevel> = OnceLock::new();

/// Features of the running CPU, detected once.
pub fn detect() -> FeatureSet {
    *DETECTED.get_or_init(|| {
        let features = detect_raw().normalized();
        tracing::info!(features = %features.describe(), "detected cpu features");
        features
    })
}

#[cfg(target_arch = "x86_64")]
fn detect_raw() -> FeatureSet {
    FeatureSet {
        sse2: true,
        avx: std::arch::is_x86_feature_detected!("avx"),
        avx2: std::arch::is_x86_feature_detected!("avx2"),
        avx512f: std::arch::is_x86_feature_detected!("avx512f"),
        fma: std::arch::is_x86_feature_detected!("fma"),
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn detect_raw() -> FeatureSet {
    FeatureSet {
        sse2: false,
        avx: false,
        avx2: false,
        avx512f: false,
        fma: false,
    }
}

/// Whether this process can execute generated code at all.
pub fn host_supported() -> bool {
    cfg!(target_arch = "x86_64")
}

/// The dispatch level for this process: the detected level, capped by
/// `SIMDKERN_MAX_LEVEL` when set.
pub fn host_level() -> FeatureLevel {
    *HOST_LEVEL.get_or_init(|| {
        let detected = detect().level();
        let level = match std::env::var(MAX_LEVEL_ENV) {
            Ok(value) => match FeatureLevel::parse(&value) {
                Some(cap) => detected.min(cap),
                None => {
                    tracing::warn!(value = %value, "ignoring unknown {}", MAX_LEVEL_ENV);
                    detected
                }
            },
            Err(_) => detected,
        };
        tracing::info!(%level, %detected, "host dispatch level");
        level
    })
}
