//! Compiling one registration into its stored variants.

use std::sync::Arc;

use rayon::prelude::*;

use super::{fallback, signature, CompileError, KernelSet, KernelVariant};
use crate::api::pipeline::{assemble, fingerprint, CheckedSource};
use crate::diagnostic::Diagnostic;
use crate::lir::lower::MachineCode;
use crate::runtime::ExecutableBuffer;
use crate::span::Span;
use crate::target::FeatureLevel;
use crate::typecheck;
use crate::types::Ty;

pub(super) fn build_variants(
    name: &str,
    params: &[Ty],
    source: &str,
    optimize: bool,
    levels: &[FeatureLevel],
) -> Result<KernelSet, CompileError> {
    let rejected = |diagnostics: Vec<Diagnostic>| CompileError {
        kernel: name.to_string(),
        level: None,
        diagnostics,
    };
    let checked = CheckedSource::build(source).map_err(rejected)?;
    let [def] = checked.file.kernels.as_slice() else {
        return Err(rejected(vec![Diagnostic::error(
            format!(
                "source for '{}' must define exactly one kernel, found {}",
                name,
                checked.file.kernels.len()
            ),
            Span::dummy(),
        )]));
    };
    if def.name.node != name {
        return Err(rejected(vec![Diagnostic::error(
            format!("expected a definition of '{}', found '{}'", name, def.name.node),
            def.name.span,
        )]));
    }
    let sig = typecheck::signature(def).map_err(rejected)?;
    if sig.param_types() != params {
        return Err(rejected(vec![Diagnostic::error(
            format!(
                "'{}' takes ({}) but is registered for ({})",
                name,
                signature(&sig.param_types()),
                signature(params)
            ),
            def.name.span,
        )]));
    }

    let built: Vec<(FeatureLevel, Result<MachineCode, Vec<Diagnostic>>)> = levels
        .par_iter()
        .map(|&level| {
            let code = assemble(def, &checked.info, level, optimize).map(|(_, code)| code);
            (level, code)
        })
        .collect();

    let mut variants: Vec<Arc<KernelVariant>> = Vec::new();
    for (level, result) in built {
        let code = match result {
            Ok(code) => code,
            Err(diagnostics) if level == FeatureLevel::Sse2 => {
                return Err(CompileError {
                    kernel: name.to_string(),
                    level: Some(level),
                    diagnostics,
                });
            }
            Err(diagnostics) => {
                let reason = diagnostics.first().map(|d| d.message.as_str()).unwrap_or("unknown error");
                tracing::warn!(kernel = name, %level, reason, "skipping level");
                continue;
            }
        };
        let hash = fingerprint(&code);
        if let Some(below) = fallback(&variants, level).filter(|v| v.fingerprint == hash) {
            tracing::debug!(kernel = name, %level, same_as = %below.level, "identical to a lower level");
            continue;
        }
        let buffer = ExecutableBuffer::new(&code).map_err(|e| CompileError {
            kernel: name.to_string(),
            level: Some(level),
            diagnostics: vec![Diagnostic::error(
                format!("cannot map executable memory: {}", e),
                Span::dummy(),
            )],
        })?;
        tracing::debug!(
            kernel = name,
            %level,
            code_len = code.code_len,
            fingerprint = %hash.to_hex(),
            "compiled variant"
        );
        variants.push(Arc::new(KernelVariant {
            name: name.to_string(),
            params: params.to_vec(),
            ret: sig.ret,
            level,
            optimize,
            fingerprint: hash,
            code_len: code.code_len,
            code: buffer,
        }));
    }
    if variants.is_empty() {
        // No baseline in `levels`, and every requested level failed.
        return Err(CompileError {
            kernel: name.to_string(),
            level: None,
            diagnostics: vec![Diagnostic::error(
                format!("'{}' did not compile at any requested level", name),
                Span::dummy(),
            )],
        });
    }
    Ok(KernelSet {
        ret: sig.ret,
        variants,
    })
}
