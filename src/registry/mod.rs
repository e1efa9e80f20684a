//! Kernel registry and multi-level dispatch.
//!
//! A kernel is registered once per (name, parameter types) and compiled
//! for every feature level in parallel. A level whose code is identical
//! to the variant it would otherwise fall back to is not stored; a lookup
//! takes the highest stored level the dispatch level can run, so absent
//! levels fall back to the nearest lower one.
//!
//! Entries are replaced whole on re-registration. Variants are handed out
//! as `Arc`s, so code a caller still holds stays mapped.

mod build;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::config::Config;
use crate::diagnostic::Diagnostic;
use crate::runtime::{self, ExecutableBuffer, KernelFn, TypeError, Value};
use crate::target::{self, FeatureLevel};
use crate::types::Ty;

// ─── Variants ─────────────────────────────────────────────────────

/// One compiled kernel for one feature level.
pub struct KernelVariant {
    pub name: String,
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub level: FeatureLevel,
    pub optimize: bool,
    pub fingerprint: blake3::Hash,
    /// Length of the instruction stream, without the constant pool.
    pub code_len: usize,
    code: ExecutableBuffer,
}

impl KernelVariant {
    pub fn entry(&self) -> KernelFn {
        self.code.entry()
    }

    /// Code and constant pool as mapped.
    pub fn bytes(&self) -> &[u8] {
        self.code.bytes()
    }

    /// Check the arguments and run the kernel.
    pub fn call(&self, args: &[Value]) -> Result<Value, DispatchError> {
        if args.len() != self.params.len() {
            return Err(DispatchError::Type(TypeError::Arity {
                kernel: self.name.clone(),
                expected: self.params.len(),
                found: args.len(),
            }));
        }
        for (index, (arg, expected)) in args.iter().zip(&self.params).enumerate() {
            if arg.ty() != *expected {
                return Err(DispatchError::Type(TypeError::Argument {
                    kernel: self.name.clone(),
                    index,
                    expected: *expected,
                    found: arg.ty(),
                }));
            }
        }
        if !target::host_supported() || self.level > target::detect().level() {
            return Err(DispatchError::Unsupported {
                name: self.name.clone(),
                level: self.level,
            });
        }
        // SAFETY: argument types match the signature the code was compiled
        // for, and the host supports the variant's level.
        Ok(unsafe { runtime::invoke(self.entry(), args, self.ret) })
    }
}

impl fmt::Debug for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelVariant")
            .field("name", &self.name)
            .field("signature", &signature(&self.params))
            .field("level", &self.level)
            .field("fingerprint", &self.fingerprint.to_hex().as_str())
            .finish()
    }
}

/// The stored variants of one kernel, lowest level first.
#[derive(Debug)]
pub struct KernelSet {
    pub ret: Ty,
    pub variants: Vec<Arc<KernelVariant>>,
}

impl KernelSet {
    /// The highest stored variant whose features `level` has.
    pub fn for_level(&self, level: FeatureLevel) -> Option<Arc<KernelVariant>> {
        fallback(&self.variants, level).cloned()
    }

    pub fn levels(&self) -> Vec<FeatureLevel> {
        self.variants.iter().map(|v| v.level).collect()
    }
}

/// The highest variant `level` can run. Levels are ordered but not nested:
/// avx2 lacks the FMA of avx+fma.
pub(crate) fn fallback(variants: &[Arc<KernelVariant>], level: FeatureLevel) -> Option<&Arc<KernelVariant>> {
    let features = level.features();
    variants
        .iter()
        .rev()
        .find(|v| features.contains(&v.level.features()))
}

// ─── Errors ───────────────────────────────────────────────────────

/// A kernel that could not be registered.
#[derive(Clone, Debug)]
pub struct CompileError {
    pub kernel: String,
    /// The level that failed; `None` when the source itself is rejected.
    pub level: Option<FeatureLevel>,
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot compile '{}'", self.kernel)?;
        if let Some(level) = self.level {
            write!(f, " at {}", level)?;
        }
        if let Some(first) = self.diagnostics.first() {
            write!(f, ": {}", first.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Why a call could not be dispatched.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchError {
    /// No variant for this name and signature.
    Unimplemented { name: String, signature: String },
    Type(TypeError),
    /// The variant needs features this CPU lacks.
    Unsupported { name: String, level: FeatureLevel },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Unimplemented { name, signature } => {
                write!(f, "no implementation of '{}' for ({})", name, signature)
            }
            DispatchError::Type(e) => write!(f, "{}", e),
            DispatchError::Unsupported { name, level } => {
                write!(f, "'{}' was compiled for {}, which this CPU does not support", name, level)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<TypeError> for DispatchError {
    fn from(e: TypeError) -> Self {
        DispatchError::Type(e)
    }
}

pub fn signature(params: &[Ty]) -> String {
    params.iter().map(|t| t.name).collect::<Vec<_>>().join(", ")
}

// ─── Registry ─────────────────────────────────────────────────────

/// How the registry compiles and dispatches.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryOptions {
    /// Highest level lookups may return.
    pub dispatch_level: FeatureLevel,
    /// Compile every level, not just those up to `dispatch_level`.
    pub all_levels: bool,
    /// Optimization for the built-in kernels.
    pub optimize: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        RegistryOptions {
            dispatch_level: target::host_level(),
            all_levels: false,
            optimize: true,
        }
    }
}

impl RegistryOptions {
    pub fn from_config(config: &Config) -> Self {
        RegistryOptions {
            dispatch_level: config.cap(target::host_level()),
            all_levels: config.all_levels,
            optimize: config.optimize,
        }
    }

    /// Levels a registration compiles, lowest first.
    pub fn levels(&self) -> Vec<FeatureLevel> {
        if self.all_levels {
            FeatureLevel::ALL.to_vec()
        } else {
            self.dispatch_level.up_to().collect()
        }
    }
}

type Key = (String, Vec<Ty>);

enum Entry {
    Compiled(Arc<KernelSet>),
    Failed(Arc<CompileError>),
}

/// Where a (name, signature) key is in its lifecycle.
#[derive(Clone, Debug)]
pub enum KernelStatus {
    Unregistered,
    Compiled(Arc<KernelSet>),
    Failed(Arc<CompileError>),
}

/// Summary of one registered kernel, for listings.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelInfo {
    pub name: String,
    pub params: Vec<Ty>,
    pub ret: Option<Ty>,
    /// Stored levels; empty when compilation failed.
    pub levels: Vec<FeatureLevel>,
}

pub struct Registry {
    options: RegistryOptions,
    table: Mutex<HashMap<Key, Entry>>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Registry {
    /// An empty registry dispatching at the host level.
    pub fn new() -> Self {
        Registry::with_options(RegistryOptions::default())
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Registry {
            options,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// A registry holding the built-in kernel library.
    pub fn with_builtin_kernels(options: RegistryOptions) -> Self {
        let registry = Registry::with_options(options);
        crate::kernels::register_all(&registry);
        registry
    }

    /// The process-wide registry: built-in kernels, configured from the
    /// working directory's simdkern.toml.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config = std::env::current_dir()
                .map_err(|e| e.to_string())
                .and_then(|dir| Config::discover(&dir).map_err(|d| d.message))
                .unwrap_or_else(|message| {
                    tracing::warn!(%message, "using default configuration");
                    Config::default()
                });
            Registry::with_builtin_kernels(RegistryOptions::from_config(&config))
        })
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Key, Entry>> {
        // A panic while holding the lock cannot leave a half-written
        // entry: entries are replaced whole.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Compile `source` for every configured level and publish the
    /// result under (name, params), replacing any previous entry.
    pub fn register_kernel(
        &self,
        name: &str,
        params: &[Ty],
        source: &str,
        optimize: bool,
    ) -> Result<Arc<KernelSet>, CompileError> {
        let key = (name.to_string(), params.to_vec());
        let levels = self.options.levels();
        let (entry, result) = match build::build_variants(name, params, source, optimize, &levels) {
            Ok(set) => {
                let set = Arc::new(set);
                tracing::debug!(
                    kernel = name,
                    signature = %signature(params),
                    levels = ?set.levels(),
                    "registered kernel"
                );
                (Entry::Compiled(set.clone()), Ok(set))
            }
            Err(error) => {
                let error = Arc::new(error);
                (Entry::Failed(error.clone()), Err((*error).clone()))
            }
        };
        self.table().insert(key, entry);
        result
    }

    /// The variant a call with these argument types dispatches to.
    pub fn lookup(&self, name: &str, params: &[Ty]) -> Option<Arc<KernelVariant>> {
        if !target::host_supported() {
            return None;
        }
        let key = (name.to_string(), params.to_vec());
        match self.table().get(&key)? {
            Entry::Compiled(set) => set.for_level(self.options.dispatch_level),
            Entry::Failed(_) => None,
        }
    }

    pub fn status(&self, name: &str, params: &[Ty]) -> KernelStatus {
        let key = (name.to_string(), params.to_vec());
        match self.table().get(&key) {
            None => KernelStatus::Unregistered,
            Some(Entry::Compiled(set)) => KernelStatus::Compiled(set.clone()),
            Some(Entry::Failed(e)) => KernelStatus::Failed(e.clone()),
        }
    }

    /// Dispatch on the argument types and run.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, DispatchError> {
        let params: Vec<Ty> = args.iter().map(|a| a.ty()).collect();
        let variant = self
            .lookup(name, &params)
            .ok_or_else(|| DispatchError::Unimplemented {
                name: name.to_string(),
                signature: signature(&params),
            })?;
        variant.call(args)
    }

    /// Every registered key, sorted by name then signature.
    pub fn kernels(&self) -> Vec<KernelInfo> {
        let mut out: Vec<KernelInfo> = self
            .table()
            .iter()
            .map(|((name, params), entry)| {
                let (ret, levels) = match entry {
                    Entry::Compiled(set) => (Some(set.ret), set.levels()),
                    Entry::Failed(_) => (None, Vec::new()),
                };
                KernelInfo {
                    name: name.clone(),
                    params: params.clone(),
                    ret,
                    levels,
                }
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| signature(&a.params).cmp(&signature(&b.params))));
        out
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Drop every entry. Variants already handed out stay valid.
    pub fn clear(&self) {
        self.table().clear();
    }
}
