//! Element type conversions (type constructors such as `int32(x)` or
//! `float64x4(v)`).
//!
//! Scalars convert in registers. Vectors convert lane by lane through
//! memory with the scalar instructions, which every level has.

use super::{CodeGen, Operand, Val};
use crate::ast::Literal;
use crate::diagnostic::Diagnostic;
use crate::lir::*;
use crate::types::{Elem, Ty, Width};

impl CodeGen {
    /// Convert `val` to `to`: identity, scalar broadcast, or a numeric
    /// conversion with the same lane count. Float to int truncates.
    pub fn convert(&mut self, val: Val, to: Ty) -> Result<Val, Diagnostic> {
        let from = val.ty;
        if let Operand::Immediate(lit) = val.op {
            let lit = match (lit, to.elem.is_float()) {
                (Literal::Float(f), false) => Literal::Integer(f.trunc() as i128),
                (lit, _) => lit,
            };
            return Ok(Val::immediate(lit, to));
        }
        if from == to {
            return Ok(val);
        }
        if from.is_mask() || to.is_mask() {
            return Err(self.error(format!("cannot convert {} to {}", from, to)));
        }
        if from.is_scalar() && to.is_vector() {
            let val = if from.elem == to.elem {
                val
            } else {
                self.convert(val, to.scalar_of())?
            };
            return self.broadcast(val, to);
        }
        if from.lanes != to.lanes {
            return Err(self.error(format!(
                "cannot convert {} to {}: lane counts differ",
                from, to
            )));
        }
        if from.is_scalar() {
            return self.convert_scalar(val, to);
        }

        let val = self.spill(val)?;
        let src = val
            .mem()
            .ok_or_else(|| self.error("internal error: conversion source not in memory".into()))?;
        let out = self.frame.temp(to);
        let (from_lane, to_lane) = (from.scalar_of(), to.scalar_of());
        for lane in 0..from.lanes {
            let lane_src = Val::memory(src.offset((lane * from.elem_bytes()) as i32), from_lane);
            let converted = self.convert_scalar(lane_src, to_lane)?;
            self.store(converted, out.offset((lane * to.elem_bytes()) as i32))?;
        }
        self.release(&val);
        Ok(Val::memory(out, to))
    }

    fn convert_scalar(&mut self, val: Val, to: Ty) -> Result<Val, Diagnostic> {
        let from = val.ty;
        let out = match (from.elem, to.elem) {
            (f, t) if f == t => return Ok(val.retyped(to)),
            (Elem::F32 | Elem::F64, Elem::I32 | Elem::I64) => {
                let src = self.float_source(&val)?;
                let dst = self.alloc_gpr()?;
                self.emit(Inst::CvttF2Si {
                    double: from.elem == Elem::F64,
                    w64: to.elem == Elem::I64,
                    dst,
                    src,
                });
                Val::from_reg(Reg::Gpr(dst), to)
            }
            (Elem::I32 | Elem::I64, Elem::F32 | Elem::F64) => {
                let val = self.to_regs(val)?;
                let src = val
                    .gpr()
                    .ok_or_else(|| self.error("internal error: integer not in a GPR".into()))?;
                let dst = self.alloc_vec(Width::X)?;
                self.emit(Inst::CvtSi2F {
                    double: to.elem == Elem::F64,
                    w64: from.elem == Elem::I64,
                    dst,
                    src,
                });
                self.release(&val);
                return Ok(Val::from_parts(vec![dst], to));
            }
            (Elem::F32 | Elem::F64, _) => {
                let src = self.float_source(&val)?;
                let dst = self.alloc_vec(Width::X)?;
                self.emit(Inst::CvtF2F {
                    to_double: to.elem == Elem::F64,
                    dst,
                    src,
                });
                Val::from_parts(vec![dst], to)
            }
            (Elem::I32, _) => {
                let src = self.gpr_source(&val)?;
                let dst = self.alloc_gpr()?;
                self.emit(Inst::Movsxd { dst, src });
                Val::from_reg(Reg::Gpr(dst), to)
            }
            (Elem::I64, _) => {
                let src = self.gpr_source(&val)?;
                let dst = self.alloc_gpr()?;
                self.emit(Inst::Mov {
                    w64: false,
                    dst,
                    src,
                });
                Val::from_reg(Reg::Gpr(dst), to)
            }
        };
        self.release(&val);
        Ok(out)
    }

    fn float_source(&mut self, val: &Val) -> Result<RegMem, Diagnostic> {
        match (&val.op, val.vec_parts()) {
            (Operand::Memory(m), _) => Ok(RegMem::Mem(*m)),
            (_, Some(parts)) => Ok(RegMem::Reg(parts[0].with_width(Width::X))),
            _ => Err(self.error(format!("internal error: {} not convertible", val.ty))),
        }
    }
}
