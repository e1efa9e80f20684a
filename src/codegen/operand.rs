//! Where an intermediate value lives while an expression is compiled.

use crate::ast::Literal;
use crate::lir::{Mem, Reg, VReg};
use crate::types::Ty;

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A scalar in one register (GPR for integers, xmm for floats).
    ScalarReg(Reg),
    /// A vector in one register (vector or opmask).
    VectorReg(Reg),
    /// A vector split across several registers; part `i` holds bytes
    /// `i * part_bytes ..` of the value.
    MultiPartReg(Vec<VReg>),
    /// The value's memory image (home slot, spill slot or constant).
    Memory(Mem),
    /// A literal not yet materialized.
    Immediate(Literal),
}

/// A typed operand.
#[derive(Clone, Debug, PartialEq)]
pub struct Val {
    pub op: Operand,
    pub ty: Ty,
}

impl Val {
    pub fn new(op: Operand, ty: Ty) -> Self {
        Self { op, ty }
    }

    pub fn memory(mem: Mem, ty: Ty) -> Self {
        Self::new(Operand::Memory(mem), ty)
    }

    pub fn immediate(lit: Literal, ty: Ty) -> Self {
        Self::new(Operand::Immediate(lit), ty)
    }

    /// Wrap vector register parts in the operand shape that fits them.
    pub fn from_parts(parts: Vec<VReg>, ty: Ty) -> Self {
        let op = match parts.as_slice() {
            [one] if ty.is_scalar() => Operand::ScalarReg(Reg::Vec(*one)),
            [one] => Operand::VectorReg(Reg::Vec(*one)),
            _ => Operand::MultiPartReg(parts),
        };
        Self::new(op, ty)
    }

    pub fn from_reg(reg: Reg, ty: Ty) -> Self {
        if ty.is_scalar() {
            Self::new(Operand::ScalarReg(reg), ty)
        } else {
            Self::new(Operand::VectorReg(reg), ty)
        }
    }

    /// Every register the value occupies.
    pub fn regs(&self) -> Vec<Reg> {
        match &self.op {
            Operand::ScalarReg(r) | Operand::VectorReg(r) => vec![*r],
            Operand::MultiPartReg(parts) => parts.iter().map(|p| Reg::Vec(*p)).collect(),
            Operand::Memory(_) | Operand::Immediate(_) => Vec::new(),
        }
    }

    pub fn is_reg(&self) -> bool {
        !self.regs().is_empty()
    }

    pub fn mem(&self) -> Option<Mem> {
        match self.op {
            Operand::Memory(m) => Some(m),
            _ => None,
        }
    }

    /// Vector register parts, if the value is held in vector registers.
    pub fn vec_parts(&self) -> Option<Vec<VReg>> {
        match &self.op {
            Operand::ScalarReg(Reg::Vec(r)) | Operand::VectorReg(Reg::Vec(r)) => Some(vec![*r]),
            Operand::MultiPartReg(parts) => Some(parts.clone()),
            _ => None,
        }
    }

    pub fn gpr(&self) -> Option<crate::lir::Gpr> {
        match self.op {
            Operand::ScalarReg(Reg::Gpr(g)) => Some(g),
            _ => None,
        }
    }

    pub fn kreg(&self) -> Option<crate::lir::KReg> {
        match self.op {
            Operand::VectorReg(Reg::K(k)) | Operand::ScalarReg(Reg::K(k)) => Some(k),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<Literal> {
        match self.op {
            Operand::Immediate(lit) => Some(lit),
            _ => None,
        }
    }

    /// Same storage, different type.
    pub fn retyped(self, ty: Ty) -> Self {
        Self { op: self.op, ty }
    }
}
