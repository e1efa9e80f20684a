//! Arithmetic, comparisons, masks, selects and broadcasts.
//!
//! Vector operations run part by part. The destination reuses a
//! temporary operand when one exists; otherwise fresh registers are
//! taken. Legacy SSE encodings tie the destination to the first source,
//! which costs a copy (or a scratch register when the destination is the
//! second source of a non-commutative operation).

use super::moves::int_value;
use super::{CodeGen, Operand, Val};
use crate::ast::{BinOp, Literal};
use crate::diagnostic::Diagnostic;
use crate::lir::*;
use crate::types::{RegClass, Ty, Width};

/// Build the instruction for part `i`: `dst = a op b`.
pub(crate) type PartFn<'a> = &'a dyn Fn(usize, VReg, VReg, RegMem) -> Inst;

/// `round` and `floor`: adding then subtracting 1.5 * 2^mantissa rounds
/// to the nearest integer (ties to even).
const ROUND_MAGIC_F64: f64 = 6755399441055744.0;
const ROUND_MAGIC_F32: f64 = 12582912.0;
/// `pow2i`: adding 2^mantissa + bias leaves `n + bias` in the low
/// mantissa bits, ready to be shifted into the exponent field.
const POW2I_BIAS_F64: f64 = 4503599627371519.0;
const POW2I_BIAS_F32: f64 = 8388735.0;

fn fmt_of(ty: Ty) -> FFmt {
    FFmt::new(ty.elem.is_double(), ty.is_scalar())
}

fn lane_of(ty: Ty) -> Lane {
    if ty.elem_bytes() == 8 {
        Lane::Q
    } else {
        Lane::D
    }
}

fn sign_bit(ty: Ty) -> u64 {
    if ty.elem_bytes() == 8 {
        1 << 63
    } else {
        1 << 31
    }
}

/// The operation type of a binary expression: the vector side wins over
/// a scalar one, a typed side over an immediate.
fn common_type(a: &Val, b: &Val) -> Ty {
    if a.ty.is_vector() {
        a.ty
    } else if b.ty.is_vector() || matches!(a.op, Operand::Immediate(_)) {
        b.ty
    } else {
        a.ty
    }
}

/// Fused multiply-add flavours: `a*b + c`, `a*b - c`, `c - a*b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fused {
    MulAdd,
    MulSub,
    NegMulAdd,
}

impl CodeGen {
    // ─── Part-wise engine ─────────────────────────────────────────

    /// Apply a two-operand vector instruction to every part of `a` and
    /// `b`. `b` may be a scalar in memory when `a` is a zmm vector; it is
    /// then used as an embedded broadcast.
    pub(crate) fn apply2(
        &mut self,
        a: Val,
        b: Val,
        out: Ty,
        commutative: bool,
        make: PartFn<'_>,
    ) -> Result<Val, Diagnostic> {
        let layout = self.layout(a.ty);
        let width = self.width(a.ty);
        let a_src = self.sources(&a)?;
        let b_src = if b.ty.is_scalar() && a.ty.is_vector() {
            let m = b.mem().ok_or_else(|| {
                self.error(format!("internal error: scalar {} not broadcastable", b.ty))
            })?;
            vec![RegMem::Bcst(m); layout.parts as usize]
        } else {
            self.sources(&b)?
        };

        let dst = if self.destructible(&a) {
            a.vec_parts().unwrap_or_default()
        } else if b.ty == a.ty && self.destructible(&b) {
            b.vec_parts().unwrap_or_default()
        } else {
            self.alloc_parts(a.ty)?
        };
        let legacy = !self.fs.avx;
        let mut scratch: Option<VReg> = None;

        for i in 0..layout.parts as usize {
            let d = dst[i];
            let bi = b_src[i];
            let b_is_dst = bi == RegMem::Reg(d);
            match a_src[i] {
                RegMem::Reg(ar) => {
                    if !legacy || d == ar {
                        self.emit(make(i, d, ar, bi));
                    } else if b_is_dst && commutative {
                        self.emit(make(i, d, d, RegMem::Reg(ar)));
                    } else if b_is_dst {
                        let s = self.scratch(&mut scratch, width)?;
                        self.emit(Inst::MovReg { dst: s, src: ar });
                        self.emit(make(i, s, s, bi));
                        self.emit(Inst::MovReg { dst: d, src: s });
                    } else {
                        self.emit(Inst::MovReg { dst: d, src: ar });
                        self.emit(make(i, d, d, bi));
                    }
                }
                RegMem::Mem(m) | RegMem::Bcst(m) => {
                    if b_is_dst && commutative {
                        self.emit(make(i, d, d, RegMem::Mem(m)));
                    } else if b_is_dst {
                        let s = self.scratch(&mut scratch, width)?;
                        self.emit(Inst::Load {
                            kind: Self::load_kind(a.ty),
                            dst: s,
                            src: m,
                        });
                        self.emit(make(i, s, s, bi));
                        self.emit(Inst::MovReg { dst: d, src: s });
                    } else {
                        self.emit(Inst::Load {
                            kind: Self::load_kind(a.ty),
                            dst: d,
                            src: m,
                        });
                        self.emit(make(i, d, d, bi));
                    }
                }
            }
        }

        if let Some(s) = scratch {
            self.regs.free(Reg::Vec(s));
        }
        self.release_except(&a, &dst);
        self.release_except(&b, &dst);
        Ok(Val::from_parts(dst, out))
    }

    fn scratch(&mut self, slot: &mut Option<VReg>, width: Width) -> Result<VReg, Diagnostic> {
        if let Some(s) = slot {
            return Ok(*s);
        }
        let s = self.alloc_vec(width)?;
        *slot = Some(s);
        Ok(s)
    }

    /// Bring two operands to the common vector type `ty`: immediates turn
    /// into full-width constants and scalars are broadcast. A scalar in
    /// memory against a zmm vector is left for an embedded broadcast.
    fn unify(&mut self, a: Val, b: Val, ty: Ty, commutative: bool) -> Result<(Val, Val), Diagnostic> {
        let adopt = |v: Val| match v.op {
            Operand::Immediate(lit) => Val::immediate(lit, ty),
            _ => v,
        };
        let (mut a, mut b) = (adopt(a), adopt(b));
        if a.ty == ty && b.ty == ty {
            return Ok((a, b));
        }
        if a.ty != ty && commutative && b.ty == ty {
            std::mem::swap(&mut a, &mut b);
        }
        if a.ty != ty {
            a = self.broadcast(a, ty)?;
        }
        if b.ty != ty {
            let embedded = self.layout(ty).class == RegClass::Vec(Width::Z)
                && matches!(b.op, Operand::Memory(_));
            if !embedded {
                b = self.broadcast(b, ty)?;
            }
        }
        Ok((a, b))
    }

    // ─── Binary operators ─────────────────────────────────────────

    /// `a op b` for arithmetic, bitwise, shift and comparison operators.
    /// One side may be a scalar of the other's element type.
    pub fn binary(&mut self, op: BinOp, a: Val, b: Val) -> Result<Val, Diagnostic> {
        if op.is_comparison() {
            return self.compare(op, a, b);
        }
        if op.is_shift() {
            return self.shift(op, a, b);
        }
        let ty = common_type(&a, &b);
        if ty.is_mask() {
            return self.mask_binary(op, a, b);
        }
        if !ty.supports(op, &self.fs) {
            return Err(self.unsupported(&format!("operator '{}'", op.as_str()), ty));
        }
        if ty.is_int() && ty.is_scalar() {
            return self.gpr_binary(op, a, b);
        }
        let commutative = matches!(
            op,
            BinOp::Add | BinOp::Mul | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor
        );
        let simd = if ty.is_float() {
            let fop = match op {
                BinOp::Add => FOp::Add,
                BinOp::Sub => FOp::Sub,
                BinOp::Mul => FOp::Mul,
                BinOp::Div => FOp::Div,
                _ => return Err(self.unsupported(&format!("operator '{}'", op.as_str()), ty)),
            };
            SimdOp::FArith(fop, fmt_of(ty))
        } else {
            let iop = match op {
                BinOp::Add => IOp::Add,
                BinOp::Sub => IOp::Sub,
                BinOp::Mul => IOp::Mul,
                BinOp::BitAnd => IOp::And,
                BinOp::BitOr => IOp::Or,
                BinOp::BitXor => IOp::Xor,
                _ => return Err(self.unsupported(&format!("operator '{}'", op.as_str()), ty)),
            };
            SimdOp::IArith(iop, lane_of(ty))
        };
        let (a, b) = self.unify(a, b, ty, commutative)?;
        self.apply2(a, b, ty, commutative, &|_, dst, a, b| Inst::Simd { op: simd, dst, a, b })
    }

    /// Scalar integer arithmetic in general-purpose registers.
    fn gpr_binary(&mut self, op: BinOp, a: Val, b: Val) -> Result<Val, Diagnostic> {
        let ty = if matches!(a.op, Operand::Immediate(_)) { b.ty } else { a.ty };
        let w64 = ty.elem_bytes() == 8;
        let commutative = matches!(
            op,
            BinOp::Add | BinOp::Mul | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor
        );
        let swap = commutative
            && (matches!(a.op, Operand::Immediate(_))
                || (!self.destructible(&a) && self.destructible(&b)));
        let (a, b) = if swap { (b, a) } else { (a, b) };

        let dst = match a.gpr() {
            Some(g) if self.destructible(&a) => g,
            _ => {
                let src = self.gpr_source(&a)?;
                let g = self.alloc_gpr()?;
                self.emit(Inst::Mov { w64, dst: g, src });
                self.release_gpr_source(&a, src);
                g
            }
        };
        let src = self.gpr_source(&b)?;
        let inst = match op {
            BinOp::Mul => Inst::Imul { w64, dst, src },
            _ => {
                let alu = match op {
                    BinOp::Add => AluOp::Add,
                    BinOp::Sub => AluOp::Sub,
                    BinOp::BitAnd => AluOp::And,
                    BinOp::BitOr => AluOp::Or,
                    BinOp::BitXor => AluOp::Xor,
                    _ => return Err(self.unsupported(&format!("operator '{}'", op.as_str()), ty)),
                };
                Inst::Alu { op: alu, w64, dst, src }
            }
        };
        self.emit(inst);
        self.release_gpr_source(&b, src);
        Ok(Val::from_reg(Reg::Gpr(dst), ty))
    }

    /// Release a GPR operand, including a register materialized for a
    /// wide immediate.
    fn release_gpr_source(&mut self, val: &Val, src: GprSrc) {
        match (&val.op, src) {
            (Operand::Immediate(_), GprSrc::Reg(g)) => self.regs.free(Reg::Gpr(g)),
            _ => self.release(val),
        }
    }

    /// Shift by a constant count. `>>` is a logical shift.
    fn shift(&mut self, op: BinOp, a: Val, count: Val) -> Result<Val, Diagnostic> {
        let ty = a.ty;
        let n = match count.literal() {
            Some(lit) => int_value(lit),
            None => return Err(self.error("shift counts must be integer constants".into())),
        };
        let bits = ty.elem_bytes() as i64 * 8;
        if !(0..bits).contains(&n) {
            return Err(self.error(format!("shift count {} out of range for {}", n, ty)));
        }
        if !ty.is_int() {
            return Err(self.unsupported(&format!("operator '{}'", op.as_str()), ty));
        }
        let imm = n as u8;
        if ty.is_scalar() {
            let w64 = ty.elem_bytes() == 8;
            let dst = match a.gpr() {
                Some(g) if self.destructible(&a) => g,
                _ => {
                    let src = self.gpr_source(&a)?;
                    let g = self.alloc_gpr()?;
                    self.emit(Inst::Mov { w64, dst: g, src });
                    self.release_gpr_source(&a, src);
                    g
                }
            };
            let op = if op == BinOp::Shl { GprShift::Shl } else { GprShift::Shr };
            self.emit(Inst::ShiftGpr { op, w64, dst, imm });
            return Ok(Val::from_reg(Reg::Gpr(dst), ty));
        }
        let vop = if op == BinOp::Shl { VShift::Sll } else { VShift::Srl };
        let lane = lane_of(ty);
        let srcs = self.sources(&a)?;
        let dst = if self.destructible(&a) {
            a.vec_parts().unwrap_or_default()
        } else {
            self.alloc_parts(ty)?
        };
        for (d, src) in dst.iter().zip(srcs) {
            let src = match src {
                RegMem::Reg(r) if self.fs.avx || r == *d => r,
                RegMem::Reg(r) => {
                    self.emit(Inst::MovReg { dst: *d, src: r });
                    *d
                }
                RegMem::Mem(m) | RegMem::Bcst(m) => {
                    self.emit(Inst::Load {
                        kind: MovKind::Ups,
                        dst: *d,
                        src: m,
                    });
                    *d
                }
            };
            self.emit(Inst::Shift {
                op: vop,
                lane,
                dst: *d,
                src,
                imm,
            });
        }
        self.release_except(&a, &dst);
        Ok(Val::from_parts(dst, ty))
    }

    // ─── Comparisons ──────────────────────────────────────────────

    /// Lane-wise comparison producing a mask. Scalar integer comparisons
    /// only exist as branch conditions.
    pub fn compare(&mut self, op: BinOp, a: Val, b: Val) -> Result<Val, Diagnostic> {
        let ty = common_type(&a, &b);
        if ty.is_int() && ty.is_scalar() {
            return Err(self.error(
                "integer comparisons can only be used as conditions".to_string(),
            ));
        }
        if ty.is_mask() || !ty.supports(op, &self.fs) {
            return Err(self.unsupported(&format!("comparison '{}'", op.as_str()), ty));
        }
        let mask_ty = ty.mask_of();
        // Greater-than becomes less-than with swapped operands; this keeps
        // unordered (NaN) lanes false.
        let (op, a, b) = match op {
            BinOp::Gt => (BinOp::Lt, b, a),
            BinOp::Ge => (BinOp::Le, b, a),
            _ => (op, a, b),
        };
        let commutative = matches!(op, BinOp::Eq | BinOp::Ne);
        let (a, b) = self.unify(a, b, ty, commutative)?;
        let opmask = self.layout(mask_ty).class == RegClass::K;

        if ty.is_float() {
            let pred = match op {
                BinOp::Eq => 0,
                BinOp::Lt => 1,
                BinOp::Le => 2,
                _ => 4,
            };
            let fmt = fmt_of(ty);
            if opmask {
                return self.compare_k(CmpKind::Float(fmt), pred, a, b, mask_ty);
            }
            return self.apply2(a, b, mask_ty, commutative, &|_, dst, a, b| Inst::Simd {
                op: SimdOp::FCmp(pred, fmt),
                dst,
                a,
                b,
            });
        }

        let lane = lane_of(ty);
        if opmask {
            let pred = match op {
                BinOp::Eq => 0,
                BinOp::Lt => 1,
                BinOp::Le => 2,
                _ => 4,
            };
            return self.compare_k(CmpKind::Int(lane), pred, a, b, mask_ty);
        }
        let pcmp = |iop: IOp| {
            move |_: usize, dst: VReg, a: VReg, b: RegMem| Inst::Simd {
                op: SimdOp::IArith(iop, lane),
                dst,
                a,
                b,
            }
        };
        let result = match op {
            BinOp::Eq => self.apply2(a, b, ty, true, &pcmp(IOp::CmpEq))?,
            BinOp::Ne => {
                let eq = self.apply2(a, b, ty, true, &pcmp(IOp::CmpEq))?;
                self.bit_not(eq)?
            }
            // a < b is b > a
            BinOp::Lt => self.apply2(b, a, ty, false, &pcmp(IOp::CmpGt))?,
            // a <= b is not (a > b)
            _ => {
                let gt = self.apply2(a, b, ty, false, &pcmp(IOp::CmpGt))?;
                self.bit_not(gt)?
            }
        };
        self.retype(result, mask_ty)
    }

    /// AVX-512 compare into an opmask register.
    fn compare_k(&mut self, kind: CmpKind, pred: u8, a: Val, b: Val, mask_ty: Ty) -> Result<Val, Diagnostic> {
        let a = self.to_regs(a)?;
        let ar = a
            .vec_parts()
            .and_then(|p| p.first().copied())
            .ok_or_else(|| self.error("internal error: compare operand not in zmm".into()))?;
        let b_src = if b.ty.is_scalar() {
            match b.mem() {
                Some(m) => RegMem::Bcst(m),
                None => return Err(self.error("internal error: scalar compare operand".into())),
            }
        } else {
            self.sources(&b)?[0]
        };
        let k = self.alloc_k()?;
        self.emit(Inst::CmpK {
            kind,
            pred,
            dst: k,
            a: ar,
            b: b_src,
        });
        self.release(&a);
        self.release(&b);
        Ok(Val::from_reg(Reg::K(k), mask_ty))
    }

    /// Flip every bit of a vector value.
    fn bit_not(&mut self, val: Val) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        let ones = self.const_bits(u64::MAX, ty);
        let op = if ty.is_int() {
            SimdOp::IArith(IOp::Xor, lane_of(ty))
        } else {
            SimdOp::FLogic(LOp::Xor, ty.elem_bytes() == 8)
        };
        self.apply2(val, ones, ty, true, &|_, dst, a, b| Inst::Simd { op, dst, a, b })
    }

    // ─── Masks ────────────────────────────────────────────────────

    /// `&`, `|`, `^`, `and`, `or` on two masks of the same type.
    pub fn mask_binary(&mut self, op: BinOp, a: Val, b: Val) -> Result<Val, Diagnostic> {
        let ty = a.ty;
        if self.layout(ty).class == RegClass::K {
            let kop = match op {
                BinOp::BitAnd | BinOp::And => KLogic::And,
                BinOp::BitOr | BinOp::Or => KLogic::Or,
                BinOp::BitXor => KLogic::Xor,
                _ => return Err(self.unsupported(&format!("operator '{}'", op.as_str()), ty)),
            };
            let a = self.to_regs(a)?;
            let b = self.to_regs(b)?;
            let (ka, kb) = match (a.kreg(), b.kreg()) {
                (Some(ka), Some(kb)) => (ka, kb),
                _ => return Err(self.error("internal error: mask not in opmask".into())),
            };
            let dst = if self.destructible(&a) {
                ka
            } else if self.destructible(&b) {
                kb
            } else {
                self.alloc_k()?
            };
            self.emit(Inst::KOp {
                op: kop,
                dst,
                a: ka,
                b: kb,
            });
            for k in [ka, kb] {
                if k != dst {
                    self.regs.free(Reg::K(k));
                }
            }
            return Ok(Val::from_reg(Reg::K(dst), ty));
        }
        let lop = match op {
            BinOp::BitAnd | BinOp::And => LOp::And,
            BinOp::BitOr | BinOp::Or => LOp::Or,
            BinOp::BitXor => LOp::Xor,
            _ => return Err(self.unsupported(&format!("operator '{}'", op.as_str()), ty)),
        };
        let double = ty.elem_bytes() == 8;
        self.apply2(a, b, ty, true, &|_, dst, a, b| Inst::Simd {
            op: SimdOp::FLogic(lop, double),
            dst,
            a,
            b,
        })
    }

    /// Logical `not` of a mask.
    pub fn mask_not(&mut self, val: Val) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        if self.layout(ty).class == RegClass::K {
            let val = self.to_regs(val)?;
            let src = val
                .kreg()
                .ok_or_else(|| self.error("internal error: mask not in opmask".into()))?;
            let dst = if self.destructible(&val) { src } else { self.alloc_k()? };
            self.emit(Inst::KNot { dst, src });
            return Ok(Val::from_reg(Reg::K(dst), ty));
        }
        self.bit_not(val)
    }

    // ─── Unary ────────────────────────────────────────────────────

    /// Arithmetic negation: sign-bit flip for floats, `0 - x` for ints.
    pub fn negate(&mut self, val: Val) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        if let Operand::Immediate(lit) = val.op {
            let lit = match lit {
                Literal::Integer(i) => Literal::Integer(-i),
                Literal::Float(f) => Literal::Float(-f),
            };
            return Ok(Val::immediate(lit, ty));
        }
        if ty.is_float() {
            let sign = self.const_bits(sign_bit(ty), ty);
            let double = ty.elem.is_double();
            return self.apply2(val, sign, ty, true, &|_, dst, a, b| Inst::Simd {
                op: SimdOp::FLogic(LOp::Xor, double),
                dst,
                a,
                b,
            });
        }
        if !ty.is_int() {
            return Err(self.unsupported("negation", ty));
        }
        if ty.is_scalar() {
            let w64 = ty.elem_bytes() == 8;
            let g = self.alloc_gpr()?;
            self.emit(Inst::Alu {
                op: AluOp::Xor,
                w64,
                dst: g,
                src: GprSrc::Reg(g),
            });
            let src = self.gpr_source(&val)?;
            self.emit(Inst::Alu {
                op: AluOp::Sub,
                w64,
                dst: g,
                src,
            });
            self.release_gpr_source(&val, src);
            return Ok(Val::from_reg(Reg::Gpr(g), ty));
        }
        let lane = lane_of(ty);
        let zero = self.alloc_parts(ty)?;
        for z in &zero {
            self.emit(Inst::Simd {
                op: SimdOp::IArith(IOp::Xor, lane),
                dst: *z,
                a: *z,
                b: RegMem::Reg(*z),
            });
        }
        let zero = Val::from_parts(zero, ty);
        self.apply2(zero, val, ty, false, &|_, dst, a, b| Inst::Simd {
            op: SimdOp::IArith(IOp::Sub, lane),
            dst,
            a,
            b,
        })
    }

    pub fn abs(&mut self, val: Val) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        if !ty.supports_math() {
            return Err(self.unsupported("abs", ty));
        }
        let magnitude = self.const_bits(!sign_bit(ty), ty);
        let double = ty.elem.is_double();
        self.apply2(val, magnitude, ty, true, &|_, dst, a, b| Inst::Simd {
            op: SimdOp::FLogic(LOp::And, double),
            dst,
            a,
            b,
        })
    }

    pub fn sqrt(&mut self, val: Val) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        if !ty.supports_math() {
            return Err(self.unsupported("sqrt", ty));
        }
        let fmt = fmt_of(ty);
        let srcs = self.sources(&val)?;
        let dst = if self.destructible(&val) {
            val.vec_parts().unwrap_or_default()
        } else {
            self.alloc_parts(ty)?
        };
        for (d, src) in dst.iter().zip(srcs) {
            self.emit(Inst::Sqrt { fmt, dst: *d, src });
        }
        self.release_except(&val, &dst);
        Ok(Val::from_parts(dst, ty))
    }

    /// `min`/`max` with x86 semantics: when either lane is NaN the second
    /// operand is returned.
    pub fn min_max(&mut self, max: bool, a: Val, b: Val) -> Result<Val, Diagnostic> {
        let ty = if matches!(a.op, Operand::Immediate(_)) { b.ty } else { a.ty };
        if !ty.supports_math() {
            return Err(self.unsupported(if max { "max" } else { "min" }, ty));
        }
        let (a, b) = self.unify(a, b, ty, false)?;
        let fop = if max { FOp::Max } else { FOp::Min };
        let fmt = fmt_of(ty);
        self.apply2(a, b, ty, false, &|_, dst, a, b| Inst::Simd {
            op: SimdOp::FArith(fop, fmt),
            dst,
            a,
            b,
        })
    }

    /// Round to nearest, ties to even. Exact for |x| < 2^51 (f64) or
    /// 2^22 (f32); larger magnitudes are already integral.
    pub fn round(&mut self, val: Val) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        if !ty.supports_math() {
            return Err(self.unsupported("round", ty));
        }
        let magic = if ty.elem.is_double() {
            ROUND_MAGIC_F64
        } else {
            ROUND_MAGIC_F32
        };
        let t = self.binary(BinOp::Add, val, Val::immediate(Literal::Float(magic), ty))?;
        self.binary(BinOp::Sub, t, Val::immediate(Literal::Float(magic), ty))
    }

    /// `round(x) - (round(x) > x ? 1 : 0)`.
    pub fn floor(&mut self, val: Val) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        if !ty.supports_math() {
            return Err(self.unsupported("floor", ty));
        }
        let (x1, x2) = self.dup(val)?;
        let r = self.round(x1)?;
        let (r1, r2) = self.dup(r)?;
        let above = self.compare(BinOp::Gt, r1, x2)?;
        let one = Val::immediate(Literal::Float(1.0), ty);
        let zero = Val::immediate(Literal::Float(0.0), ty);
        let correction = self.select(one, zero, above)?;
        self.binary(BinOp::Sub, r2, correction)
    }

    /// `2.0 ** n` for integral float `n` in the normal exponent range,
    /// built directly in the exponent field.
    pub fn pow2i(&mut self, val: Val) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        if !ty.supports_math() {
            return Err(self.unsupported("pow2i", ty));
        }
        let (bias, shift) = if ty.elem.is_double() {
            (POW2I_BIAS_F64, 52)
        } else {
            (POW2I_BIAS_F32, 23)
        };
        let int_ty = ty
            .with_elem(ty.elem.as_int())
            .ok_or_else(|| self.unsupported("pow2i", ty))?;
        let biased = self.binary(BinOp::Add, val, Val::immediate(Literal::Float(bias), ty))?;
        let bits = self.retype(biased, int_ty)?;
        let shifted = self.shift(
            BinOp::Shl,
            bits,
            Val::immediate(Literal::Integer(shift), int_ty),
        )?;
        self.retype(shifted, ty)
    }

    /// Fused multiply-add when the level has FMA; a separate multiply and
    /// add (two roundings) otherwise.
    pub fn fma(&mut self, kind: Fused, a: Val, b: Val, c: Val) -> Result<Val, Diagnostic> {
        let ty = [&a, &b, &c]
            .iter()
            .find(|v| !matches!(v.op, Operand::Immediate(_)))
            .map(|v| v.ty)
            .unwrap_or(a.ty);
        if !ty.supports_math() {
            return Err(self.unsupported("fma", ty));
        }
        let adopt = |v: Val| match v.op {
            Operand::Immediate(lit) => Val::immediate(lit, ty),
            _ => v,
        };
        let (a, b, c) = (adopt(a), adopt(b), adopt(c));
        if a.ty != ty || b.ty != ty || c.ty != ty {
            return Err(self.error(format!(
                "fma operands must all be {}",
                ty
            )));
        }
        if !self.fs.fma {
            let product = self.binary(BinOp::Mul, a, b)?;
            return match kind {
                Fused::MulAdd => self.binary(BinOp::Add, product, c),
                Fused::MulSub => self.binary(BinOp::Sub, product, c),
                Fused::NegMulAdd => self.binary(BinOp::Sub, c, product),
            };
        }
        let fkind = match kind {
            Fused::MulAdd => FmaKind::MAdd,
            Fused::MulSub => FmaKind::MSub,
            Fused::NegMulAdd => FmaKind::NMAdd,
        };
        let fmt = fmt_of(ty);

        // Put a destructible multiplicand first.
        let (a, b) = if !self.destructible(&a) && self.destructible(&b) {
            (b, a)
        } else {
            (a, b)
        };

        if !self.destructible(&c) && self.destructible(&a) {
            // dst = b * dst + c
            let b = self.to_regs(b)?;
            let dst = a.vec_parts().unwrap_or_default();
            let b_parts = b.vec_parts().unwrap_or_default();
            let c_src = self.sources(&c)?;
            for i in 0..dst.len() {
                self.emit(Inst::Fma {
                    kind: fkind,
                    order: FmaOrder::O213,
                    fmt,
                    dst: dst[i],
                    a: b_parts[i],
                    b: c_src[i],
                });
            }
            self.release_except(&b, &dst);
            self.release_except(&c, &dst);
            return Ok(Val::from_parts(dst, ty));
        }

        // dst = a * b + dst, with dst holding c.
        let dst = if self.destructible(&c) {
            c.vec_parts().unwrap_or_default()
        } else {
            let parts = self.alloc_parts(ty)?;
            for (d, src) in parts.iter().zip(self.sources(&c)?) {
                match src {
                    RegMem::Reg(r) => self.emit(Inst::MovReg { dst: *d, src: r }),
                    RegMem::Mem(m) | RegMem::Bcst(m) => self.emit(Inst::Load {
                        kind: Self::load_kind(ty),
                        dst: *d,
                        src: m,
                    }),
                }
            }
            self.release(&c);
            parts
        };
        let (a, b) = if !a.is_reg() && b.is_reg() { (b, a) } else { (a, b) };
        let a = self.to_regs(a)?;
        let a_parts = a.vec_parts().unwrap_or_default();
        let b_src = self.sources(&b)?;
        for i in 0..dst.len() {
            self.emit(Inst::Fma {
                kind: fkind,
                order: FmaOrder::O231,
                fmt,
                dst: dst[i],
                a: a_parts[i],
                b: b_src[i],
            });
        }
        self.release_except(&a, &dst);
        self.release_except(&b, &dst);
        Ok(Val::from_parts(dst, ty))
    }

    // ─── Select ───────────────────────────────────────────────────

    /// Per lane `mask ? t : f`.
    pub fn select(&mut self, t: Val, f: Val, mask: Val) -> Result<Val, Diagnostic> {
        let ty = if matches!(t.op, Operand::Immediate(_)) { f.ty } else { t.ty };
        let adopt = |v: Val| match v.op {
            Operand::Immediate(lit) => Val::immediate(lit, ty),
            _ => v,
        };
        let (t, f) = (adopt(t), adopt(f));
        let layout = self.layout(ty);
        let double = ty.elem_bytes() == 8;
        match layout.class {
            RegClass::Gpr | RegClass::K => Err(self.unsupported("select", ty)),
            RegClass::Vec(Width::Z) => {
                let mask = self.to_regs(mask)?;
                let k = mask
                    .kreg()
                    .ok_or_else(|| self.error("internal error: zmm select without opmask".into()))?;
                let out = self.apply2(f, t, ty, false, &|_, dst, a, b| Inst::BlendK {
                    double,
                    dst,
                    a,
                    b,
                    k,
                })?;
                self.release(&mask);
                Ok(out)
            }
            RegClass::Vec(_) if self.fs.avx => {
                let mask_parts = self.parts_as(mask, layout)?;
                let parts = mask_parts.clone();
                let out = self.apply2(f, t, ty, false, &|i, dst, a, b| Inst::Blendv {
                    double,
                    dst,
                    a,
                    b,
                    mask: parts[i],
                })?;
                self.regs
                    .free_all(&mask_parts.iter().map(|p| Reg::Vec(*p)).collect::<Vec<_>>());
                Ok(out)
            }
            RegClass::Vec(width) => {
                // (m & t) | (~m & f), part by part
                let mask_parts = self.parts_as(mask, layout)?;
                let t_src = self.sources(&t)?;
                let f_src = self.sources(&f)?;
                let logic = |op: LOp, dst: VReg, b: RegMem| Inst::Simd {
                    op: SimdOp::FLogic(op, double),
                    dst,
                    a: dst,
                    b,
                };
                let mut out = Vec::with_capacity(mask_parts.len());
                for (i, p) in mask_parts.iter().enumerate() {
                    let m = if self.regs.can_destruct(Reg::Vec(*p)) {
                        *p
                    } else {
                        let c = self.alloc_vec(width)?;
                        self.emit(Inst::MovReg { dst: c, src: *p });
                        c
                    };
                    let r = self.alloc_vec(width)?;
                    self.emit(Inst::MovReg { dst: r, src: m });
                    self.emit(logic(LOp::And, r, t_src[i]));
                    self.emit(logic(LOp::AndN, m, f_src[i]));
                    self.emit(logic(LOp::Or, r, RegMem::Reg(m)));
                    self.regs.free(Reg::Vec(m));
                    out.push(r);
                }
                self.release(&t);
                self.release(&f);
                Ok(Val::from_parts(out, ty))
            }
        }
    }

    // ─── Broadcast and lanes ──────────────────────────────────────

    /// Replicate a scalar into every lane of `to`.
    pub fn broadcast(&mut self, val: Val, to: Ty) -> Result<Val, Diagnostic> {
        if let Operand::Immediate(lit) = val.op {
            return Ok(Val::immediate(lit, to));
        }
        if val.ty.elem != to.elem || !val.ty.is_scalar() {
            return Err(self.error(format!("cannot broadcast {} to {}", val.ty, to)));
        }
        let layout = self.layout(to);
        let width = match layout.class {
            RegClass::Vec(w) => w,
            _ => return Err(self.unsupported("broadcast", to)),
        };
        let double = to.elem_bytes() == 8;
        // Register broadcasts need AVX2, except movddup.
        let reg_ok = !self.fs.avx || self.fs.avx2 || (double && width == Width::X);
        let val = if val.gpr().is_some() || (val.is_reg() && !reg_ok) {
            self.spill(val)?
        } else {
            val
        };
        let src = match (&val.op, val.vec_parts()) {
            (Operand::Memory(m), _) => RegMem::Mem(*m),
            (_, Some(parts)) => RegMem::Reg(parts[0].with_width(Width::X)),
            _ => return Err(self.error(format!("internal error: cannot broadcast {}", val.ty))),
        };
        let first = self.alloc_vec(width)?;
        if self.fs.avx {
            self.emit(Inst::Broadcast {
                double,
                dst: first,
                src,
            });
        } else {
            match src {
                RegMem::Reg(r) => self.emit(Inst::MovReg { dst: first, src: r }),
                RegMem::Mem(m) | RegMem::Bcst(m) => self.emit(Inst::Load {
                    kind: if double { MovKind::Sd } else { MovKind::Ss },
                    dst: first,
                    src: m,
                }),
            }
            let op = if double {
                SimdOp::Unpcklpd
            } else {
                SimdOp::Shufps(0)
            };
            self.emit(Inst::Simd {
                op,
                dst: first,
                a: first,
                b: RegMem::Reg(first),
            });
        }
        self.release(&val);
        let mut parts = vec![first];
        for _ in 1..layout.parts {
            let p = self.alloc_vec(width)?;
            self.emit(Inst::MovReg { dst: p, src: first });
            parts.push(p);
        }
        Ok(Val::from_parts(parts, to))
    }

    /// Lane `index` of a vector as a scalar in a register.
    pub fn extract(&mut self, val: Val, index: u32) -> Result<Val, Diagnostic> {
        let ty = val.ty;
        if index >= ty.lanes {
            return Err(self.error(format!("lane {} out of range for {}", index, ty)));
        }
        let scalar = ty.scalar_of();
        let val = self.materialize(val);
        let val = self.spill(val)?;
        let mem = val
            .mem()
            .ok_or_else(|| self.error("internal error: extract without memory".into()))?
            .offset((index * ty.elem_bytes()) as i32);
        let out = if scalar.is_int() {
            let g = self.alloc_gpr()?;
            self.emit(Inst::Mov {
                w64: ty.elem_bytes() == 8,
                dst: g,
                src: GprSrc::Mem(mem),
            });
            Val::from_reg(Reg::Gpr(g), scalar)
        } else {
            let r = self.alloc_vec(Width::X)?;
            self.emit(Inst::Load {
                kind: Self::load_kind(scalar),
                dst: r,
                src: mem,
            });
            Val::from_parts(vec![r], scalar)
        };
        self.release(&val);
        Ok(out)
    }
}
