//! Shared source preparation pipeline.
//!
//! Lex → parse → type check once, then assemble any kernel of the file at
//! any level. Used by the public API and by the registry; nothing here
//! renders diagnostics.

use crate::ast::{File, KernelDef};
use crate::compile::compile_kernel;
use crate::diagnostic::Diagnostic;
use crate::lexer::Lexer;
use crate::lir::lower::{MachineCode, RegisterLowering, X86_64Lowering};
use crate::lir::Program;
use crate::parser::Parser;
use crate::target::FeatureLevel;
use crate::typecheck::{check_file, TypeInfo};

/// A parsed and type-checked source file.
pub(crate) struct CheckedSource {
    pub file: File,
    pub info: TypeInfo,
}

impl CheckedSource {
    pub fn build(source: &str) -> Result<Self, Vec<Diagnostic>> {
        let file = parse(source)?;
        let info = check_file(&file)?;
        Ok(CheckedSource { file, info })
    }

    /// The top-level kernel called `name`.
    pub fn kernel(&self, name: &str) -> Option<&KernelDef> {
        self.file.kernels.iter().find(|k| k.name.node == name)
    }
}

pub(crate) fn parse(source: &str) -> Result<File, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Parser::new(tokens).parse_file()
}

/// Compile one checked kernel for `level` and encode it.
pub(crate) fn assemble(
    def: &KernelDef,
    info: &TypeInfo,
    level: FeatureLevel,
    optimize: bool,
) -> Result<(Program, MachineCode), Vec<Diagnostic>> {
    let program = compile_kernel(def, info, level, optimize)?;
    let code = X86_64Lowering::new(level.features())
        .lower(&program)
        .map_err(|d| vec![d])?;
    Ok((program, code))
}

/// Identity of a variant's code and constants.
pub fn fingerprint(code: &MachineCode) -> blake3::Hash {
    blake3::hash(&code.bytes)
}
