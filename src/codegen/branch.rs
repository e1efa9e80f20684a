//! Conditional jumps on scalar conditions.
//!
//! `ucomis*` reports unordered operands as ZF = PF = CF = 1. Ordered
//! `>` and `>=` map to `a`/`ae`, which are false when unordered; `<` and
//! `<=` swap their operands to reuse them. Equality also tests the parity
//! flag so NaN compares unequal.

use super::{CodeGen, Operand, Val};
use crate::ast::BinOp;
use crate::diagnostic::Diagnostic;
use crate::lir::*;
use crate::types::Width;

impl CodeGen {
    /// Jump to `target` when `a op b` equals `jump_if`; fall through
    /// otherwise. Operands are scalar floats or scalar integers.
    pub fn branch_compare(
        &mut self,
        op: BinOp,
        a: Val,
        b: Val,
        jump_if: bool,
        target: Label,
    ) -> Result<(), Diagnostic> {
        let ty = if matches!(a.op, Operand::Immediate(_)) { b.ty } else { a.ty };
        if ty.is_int() {
            return self.branch_int_compare(op, a, b, ty, jump_if, target);
        }
        if !ty.is_float() || !ty.is_scalar() {
            return Err(self.error(format!("cannot branch on a comparison of {}", ty)));
        }
        let (op, a, b) = match op {
            BinOp::Lt => (BinOp::Gt, b, a),
            BinOp::Le => (BinOp::Ge, b, a),
            _ => (op, a, b),
        };
        let a = self.to_regs(Val::new(a.op, ty))?;
        let b = self.materialize(Val::new(b.op, ty));
        let ar = a
            .vec_parts()
            .map(|p| p[0].with_width(Width::X))
            .ok_or_else(|| self.error("internal error: compare operand not in xmm".into()))?;
        let br = match (&b.op, b.vec_parts()) {
            (_, Some(parts)) => RegMem::Reg(parts[0].with_width(Width::X)),
            (Operand::Memory(m), _) => RegMem::Mem(*m),
            _ => return Err(self.error("internal error: compare operand".into())),
        };
        self.emit(Inst::Ucomi {
            double: ty.elem.is_double(),
            a: ar,
            b: br,
        });
        self.release(&a);
        self.release(&b);

        match (op, jump_if) {
            (BinOp::Gt, _) => self.jcc(Cond::A, jump_if, target),
            (BinOp::Ge, _) => self.jcc(Cond::Ae, jump_if, target),
            (BinOp::Eq, true) | (BinOp::Ne, false) => {
                // equal and ordered
                let skip = self.new_label();
                self.emit(Inst::Jcc(Cond::P, skip));
                self.emit(Inst::Jcc(Cond::E, target));
                self.emit(Inst::Label(skip));
            }
            _ => {
                // unequal or unordered
                self.emit(Inst::Jcc(Cond::P, target));
                self.emit(Inst::Jcc(Cond::Ne, target));
            }
        }
        Ok(())
    }

    fn branch_int_compare(
        &mut self,
        op: BinOp,
        a: Val,
        b: Val,
        ty: crate::types::Ty,
        jump_if: bool,
        target: Label,
    ) -> Result<(), Diagnostic> {
        let w64 = ty.elem_bytes() == 8;
        let a = self.to_regs(Val::new(a.op, ty))?;
        let ar = a
            .gpr()
            .ok_or_else(|| self.error("internal error: integer not in a GPR".into()))?;
        let b = Val::new(b.op, ty);
        let src = self.gpr_source(&b)?;
        self.emit(Inst::Alu {
            op: AluOp::Cmp,
            w64,
            dst: ar,
            src,
        });
        if let (Operand::Immediate(_), GprSrc::Reg(g)) = (&b.op, src) {
            self.regs.free(Reg::Gpr(g));
        } else {
            self.release(&b);
        }
        self.release(&a);
        let cond = match op {
            BinOp::Eq => Cond::E,
            BinOp::Ne => Cond::Ne,
            BinOp::Lt => Cond::L,
            BinOp::Le => Cond::Le,
            BinOp::Gt => Cond::G,
            _ => Cond::Ge,
        };
        self.jcc(cond, jump_if, target);
        Ok(())
    }

    /// Jump on the truth of a scalar integer (non-zero) or a scalar mask
    /// (low lane set).
    pub fn branch_truthy(&mut self, val: Val, jump_if: bool, target: Label) -> Result<(), Diagnostic> {
        let ty = val.ty;
        if !ty.is_scalar() {
            return Err(self.error(format!(
                "a {} condition needs a vector if, not a branch",
                ty
            )));
        }
        let val = self.to_regs(val)?;
        let w64 = ty.elem_bytes() == 8;
        if let Some(g) = val.gpr() {
            self.emit(Inst::Test { w64, a: g, b: g });
            self.release(&val);
        } else if ty.is_mask() {
            let part = val
                .vec_parts()
                .map(|p| p[0])
                .ok_or_else(|| self.error("internal error: mask not in xmm".into()))?;
            let g = self.alloc_gpr()?;
            self.emit(Inst::MovMsk {
                double: w64,
                dst: g,
                src: part,
            });
            self.release(&val);
            self.emit(Inst::Alu {
                op: AluOp::And,
                w64: false,
                dst: g,
                src: GprSrc::Imm(1),
            });
            self.regs.free(Reg::Gpr(g));
        } else {
            return Err(self.error(format!("{} cannot be used as a condition", ty)));
        }
        self.jcc(Cond::Ne, jump_if, target);
        Ok(())
    }

    fn jcc(&mut self, cond: Cond, jump_if: bool, target: Label) {
        let cond = if jump_if { cond } else { cond.negate() };
        self.emit(Inst::Jcc(cond, target));
    }
}
