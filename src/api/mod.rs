//! Public compile entry points.
//!
//! These take kernel source text, render diagnostics for the caller's
//! file name, and hand back per-level results. The registry goes through
//! the same `pipeline` without rendering anything.

pub mod pipeline;

use crate::config::Config;
use crate::diagnostic::{render_diagnostics, Diagnostic, Severity};
use crate::lir::lower::MachineCode;
use crate::lir::Program;
use crate::target::{self, FeatureLevel};

use pipeline::{assemble, fingerprint, CheckedSource};

/// Which levels to compile and whether to optimize.
#[derive(Clone, Debug, PartialEq)]
pub struct CompileOptions {
    /// Levels to compile, lowest first. The first one is the baseline:
    /// if it fails, compilation fails.
    pub levels: Vec<FeatureLevel>,
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            levels: FeatureLevel::ALL.to_vec(),
            optimize: true,
        }
    }
}

impl CompileOptions {
    /// A single level.
    pub fn for_level(level: FeatureLevel, optimize: bool) -> Self {
        Self {
            levels: vec![level],
            optimize,
        }
    }

    /// Levels up to the configured host cap, or every level when the
    /// config asks for all of them.
    pub fn from_config(config: &Config) -> Self {
        let levels = if config.all_levels {
            FeatureLevel::ALL.to_vec()
        } else {
            config.cap(target::host_level()).up_to().collect()
        };
        Self {
            levels,
            optimize: config.optimize,
        }
    }
}

/// One kernel compiled for one level.
#[derive(Clone, Debug)]
pub struct CompiledKernel {
    pub name: String,
    pub level: FeatureLevel,
    pub optimize: bool,
    pub program: Program,
    pub code: MachineCode,
    pub fingerprint: blake3::Hash,
}

impl CompiledKernel {
    /// The instruction listing.
    pub fn listing(&self) -> String {
        self.program.listing()
    }

    pub fn code_len(&self) -> usize {
        self.code.code_len
    }

    /// Bytes after the code: alignment padding and the constant pool.
    pub fn const_len(&self) -> usize {
        self.code.bytes.len() - self.code.code_len
    }
}

/// Compile every kernel in `source` at every level.
pub fn compile(source: &str, filename: &str) -> Result<Vec<CompiledKernel>, Vec<Diagnostic>> {
    compile_with_options(source, filename, &CompileOptions::default())
}

/// Compile every kernel in `source` at the requested levels.
///
/// A failure at the first (baseline) level is an error. Failures at other
/// levels are rendered as warnings and those levels are left out.
pub fn compile_with_options(
    source: &str,
    filename: &str,
    options: &CompileOptions,
) -> Result<Vec<CompiledKernel>, Vec<Diagnostic>> {
    let checked = match CheckedSource::build(source) {
        Ok(checked) => checked,
        Err(errors) => {
            render_diagnostics(&errors, filename, source);
            return Err(errors);
        }
    };
    let (kernels, diagnostics) = build_all(&checked, options);
    render_diagnostics(&diagnostics, filename, source);
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        return Err(diagnostics);
    }
    Ok(kernels)
}

/// Parse, type check and compile without keeping the code. Returns the
/// warnings for levels that could not be compiled.
pub fn check(source: &str, filename: &str) -> Result<Vec<Diagnostic>, Vec<Diagnostic>> {
    check_with_options(source, filename, &CompileOptions::default())
}

pub fn check_with_options(
    source: &str,
    filename: &str,
    options: &CompileOptions,
) -> Result<Vec<Diagnostic>, Vec<Diagnostic>> {
    let checked = match CheckedSource::build(source) {
        Ok(checked) => checked,
        Err(errors) => {
            render_diagnostics(&errors, filename, source);
            return Err(errors);
        }
    };
    let (_, diagnostics) = build_all(&checked, options);
    render_diagnostics(&diagnostics, filename, source);
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        return Err(diagnostics);
    }
    Ok(diagnostics)
}

fn build_all(checked: &CheckedSource, options: &CompileOptions) -> (Vec<CompiledKernel>, Vec<Diagnostic>) {
    let mut kernels = Vec::new();
    let mut diagnostics = Vec::new();
    let baseline = options.levels.first().copied();
    for def in &checked.file.kernels {
        for &level in &options.levels {
            match assemble(def, &checked.info, level, options.optimize) {
                Ok((program, code)) => {
                    tracing::debug!(kernel = %def.name.node, %level, code_len = code.code_len, "compiled");
                    kernels.push(CompiledKernel {
                        name: def.name.node.clone(),
                        level,
                        optimize: options.optimize,
                        fingerprint: fingerprint(&code),
                        program,
                        code,
                    });
                }
                Err(errors) if Some(level) == baseline => diagnostics.extend(errors),
                Err(errors) => diagnostics.extend(errors.into_iter().map(|d| {
                    let message = format!("'{}' is skipped at {}: {}", def.name.node, level, d.message);
                    let mut warning = Diagnostic::warning(message, d.span);
                    warning.notes = d.notes;
                    warning.help = d.help;
                    warning
                })),
            }
        }
    }
    (kernels, diagnostics)
}
