//! RegisterLowering: assembles a `Program` into target machine code.
//!
//! The x86-64 lowering is the only backend; other targets compile the
//! library but have no lowering and therefore no kernel implementations.

mod x86_64;

use super::Program;
use crate::diagnostic::Diagnostic;
use crate::target::FeatureSet;

pub use x86_64::X86_64Lowering;

/// Assembled code: instruction bytes, zero padding to a 64-byte boundary,
/// then the constant pool (absent when the program has no constants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineCode {
    pub bytes: Vec<u8>,
    /// Length of the instruction stream.
    pub code_len: usize,
}

/// Lowers a program into machine code for one register-machine target.
pub trait RegisterLowering {
    /// The target name (e.g. "x86_64").
    fn target_name(&self) -> &str;

    /// Encode every instruction, resolve labels and constant references.
    fn lower(&self, program: &Program) -> Result<MachineCode, Diagnostic>;

    /// Lower to assembly text for debugging, one line per instruction.
    fn lower_text(&self, program: &Program) -> Vec<String> {
        program.insts.iter().map(|inst| inst.asm(program.vex)).collect()
    }
}

/// Create a register-lowering backend for the given target name.
pub fn create_register_lowering(
    target: &str,
    features: FeatureSet,
) -> Option<Box<dyn RegisterLowering>> {
    match target {
        "x86_64" | "x86-64" => Some(Box::new(X86_64Lowering::new(features))),
        _ => None,
    }
}
