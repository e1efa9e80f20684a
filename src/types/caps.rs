//! Capability queries: which operator/operand combinations have a legal
//! lowering for a descriptor at a feature set.

use crate::ast::BinOp;
use crate::target::FeatureSet;

use super::{Elem, RegClass, Ty, TypeDescriptor};

/// Where the right-hand operand of a binary operation lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// A register-resident value of the given type.
    Arg(Ty),
    Memory,
    Const,
}

impl TypeDescriptor {
    /// Whether `self op self` can be lowered at all at this feature set.
    pub fn supports(&self, op: BinOp, fs: &FeatureSet) -> bool {
        use BinOp::*;
        if self.mask {
            return matches!(op, BitAnd | BitOr | BitXor | And | Or);
        }
        if self.is_float() {
            return op.is_arithmetic() || op.is_comparison();
        }
        match op {
            Add | Sub | BitAnd | BitOr | BitXor | Shl | Shr => true,
            // pmulld is SSE4.1; vector int64 multiply needs AVX512DQ.
            Mul => self.is_scalar() || (self.elem == Elem::I32 && fs.avx),
            Div | And | Or => false,
            // pcmpgtq is SSE4.2.
            Eq | Ne | Lt | Le | Gt | Ge => {
                self.is_scalar() || self.elem == Elem::I32 || fs.avx
            }
        }
    }

    pub fn can_operate_with_arg(&self, op: BinOp, other: &TypeDescriptor, fs: &FeatureSet) -> bool {
        if op.is_shift() {
            return false;
        }
        let broadcastable =
            !self.mask && !other.mask && other.is_scalar() && other.elem == self.elem;
        (other == self || broadcastable) && self.supports(op, fs)
    }

    pub fn can_operate_with_memory(&self, op: BinOp, fs: &FeatureSet) -> bool {
        if op.is_shift() || (self.mask && self.layout(fs).class == RegClass::K) {
            return false;
        }
        self.supports(op, fs)
    }

    /// Constants are interned in the pool, so this is also the memory
    /// case, plus immediate shift counts.
    pub fn can_operate_with_const(&self, op: BinOp, fs: &FeatureSet) -> bool {
        !self.mask && self.supports(op, fs)
    }

    pub fn can_operate(&self, op: BinOp, rhs: OperandKind, fs: &FeatureSet) -> bool {
        match rhs {
            OperandKind::Arg(other) => self.can_operate_with_arg(op, other, fs),
            OperandKind::Memory => self.can_operate_with_memory(op, fs),
            OperandKind::Const => self.can_operate_with_const(op, fs),
        }
    }

    /// Scalar integer comparisons set flags only; they cannot be stored.
    pub fn is_condition_only(&self, op: BinOp) -> bool {
        self.is_int() && self.is_scalar() && op.is_comparison()
    }

    /// `sqrt`, `abs`, `min`, `max`, `fma`, `round` and `floor`.
    pub fn supports_math(&self) -> bool {
        self.is_float()
    }
}
