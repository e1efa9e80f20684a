//! Loads, stores, spills and layout changes.

use super::{CodeGen, Operand, Val};
use crate::diagnostic::Diagnostic;
use crate::lir::*;
use crate::types::{Layout, RegClass, Ty};

impl CodeGen {
    pub(crate) fn load_kind(ty: Ty) -> MovKind {
        match (ty.is_scalar(), ty.elem_bytes()) {
            (true, 4) => MovKind::Ss,
            (true, _) => MovKind::Sd,
            (false, _) => MovKind::Ups,
        }
    }

    /// Replace an immediate by its constant-pool image.
    pub(crate) fn materialize(&mut self, val: Val) -> Val {
        match val.op {
            Operand::Immediate(lit) => {
                let mem = self.const_mem(lit, val.ty);
                Val::memory(mem, val.ty)
            }
            _ => val,
        }
    }

    /// Bring `val` into registers of its own layout.
    pub fn to_regs(&mut self, val: Val) -> Result<Val, Diagnostic> {
        if val.is_reg() {
            return Ok(val);
        }
        let layout = self.layout(val.ty);
        match layout.class {
            RegClass::Gpr => {
                let w64 = val.ty.elem_bytes() == 8;
                let src = match val.op {
                    Operand::Immediate(lit) => GprSrc::Imm(int_value(lit)),
                    Operand::Memory(m) => GprSrc::Mem(m),
                    _ => return Err(self.error(format!("internal error: cannot load {}", val.ty))),
                };
                let dst = self.alloc_gpr()?;
                self.emit(Inst::Mov { w64, dst, src });
                self.release(&val);
                Ok(Val::from_reg(Reg::Gpr(dst), val.ty))
            }
            RegClass::K => {
                let mem = self.materialize(val.clone()).mem().ok_or_else(|| {
                    self.error(format!("internal error: {} has no memory image", val.ty))
                })?;
                let dst = self.alloc_k()?;
                self.emit(Inst::KLoad { dst, src: mem });
                self.release(&val);
                Ok(Val::from_reg(Reg::K(dst), val.ty))
            }
            RegClass::Vec(_) => {
                let ty = val.ty;
                let mem = match self.materialize(val.clone()).mem() {
                    Some(m) => m,
                    None => return Err(self.error(format!("internal error: cannot load {}", ty))),
                };
                let parts = self.alloc_parts(ty)?;
                for (i, part) in parts.iter().enumerate() {
                    self.emit(Inst::Load {
                        kind: Self::load_kind(ty),
                        dst: *part,
                        src: mem.offset((i as u32 * layout.part_bytes) as i32),
                    });
                }
                self.release(&val);
                Ok(Val::from_parts(parts, ty))
            }
        }
    }

    /// Vector source operands, one per part. Immediates become constants.
    pub(crate) fn sources(&mut self, val: &Val) -> Result<Vec<RegMem>, Diagnostic> {
        let layout = self.layout(val.ty);
        if let Some(parts) = val.vec_parts() {
            return Ok(parts.into_iter().map(RegMem::Reg).collect());
        }
        let mem = match &val.op {
            Operand::Memory(m) => *m,
            Operand::Immediate(lit) => self.const_mem(*lit, val.ty),
            _ => {
                return Err(self.error(format!(
                    "internal error: {} is not in vector registers",
                    val.ty
                )))
            }
        };
        Ok((0..layout.parts)
            .map(|i| RegMem::Mem(mem.offset((i * layout.part_bytes) as i32)))
            .collect())
    }

    /// General-purpose source operand for an integer scalar.
    pub(crate) fn gpr_source(&mut self, val: &Val) -> Result<GprSrc, Diagnostic> {
        match &val.op {
            Operand::ScalarReg(Reg::Gpr(g)) => Ok(GprSrc::Reg(*g)),
            Operand::Memory(m) => Ok(GprSrc::Mem(*m)),
            Operand::Immediate(lit) => {
                let v = int_value(*lit);
                if i32::try_from(v).is_ok() {
                    Ok(GprSrc::Imm(v))
                } else {
                    let g = self.alloc_gpr()?;
                    self.emit(Inst::Mov {
                        w64: true,
                        dst: g,
                        src: GprSrc::Imm(v),
                    });
                    Ok(GprSrc::Reg(g))
                }
            }
            _ => Err(self.error(format!("internal error: {} is not a GPR value", val.ty))),
        }
    }

    /// Write `val` to `dst` in its memory image and release it.
    pub fn store(&mut self, val: Val, dst: Mem) -> Result<(), Diagnostic> {
        let layout = self.layout(val.ty);
        let val = if val.is_reg() {
            val
        } else if val.mem() == Some(dst) {
            return Ok(());
        } else {
            self.to_regs(val)?
        };
        match layout.class {
            RegClass::Gpr => {
                let src = val.gpr().ok_or_else(|| self.error("internal error: lost GPR".into()))?;
                self.emit(Inst::StoreGpr {
                    w64: val.ty.elem_bytes() == 8,
                    dst,
                    src,
                });
            }
            RegClass::K => {
                let src = val.kreg().ok_or_else(|| self.error("internal error: lost mask".into()))?;
                self.emit(Inst::KStore { dst, src });
            }
            RegClass::Vec(_) => {
                let parts = val.vec_parts().unwrap_or_default();
                for (i, part) in parts.iter().enumerate() {
                    self.emit(Inst::Store {
                        kind: Self::load_kind(val.ty),
                        dst: dst.offset((i as u32 * layout.part_bytes) as i32),
                        src: *part,
                    });
                }
            }
        }
        self.release(&val);
        Ok(())
    }

    /// Move a register value to a fresh spill slot.
    pub fn spill(&mut self, val: Val) -> Result<Val, Diagnostic> {
        if !val.is_reg() {
            return Ok(val);
        }
        let ty = val.ty;
        let slot = self.frame.temp(ty);
        self.store(val, slot)?;
        Ok(Val::memory(slot, ty))
    }

    /// Two handles on one value. Temporaries are parked in a slot that is
    /// never recycled, so releasing either handle leaves the other intact.
    pub(crate) fn dup(&mut self, val: Val) -> Result<(Val, Val), Diagnostic> {
        let shared = match &val.op {
            Operand::Immediate(_) => true,
            Operand::Memory(m) => !self.frame.is_temp(*m),
            _ => !self.destructible(&val),
        };
        if shared {
            return Ok((val.clone(), val));
        }
        let ty = val.ty;
        let home = self.frame.home(ty);
        self.store(val, home)?;
        Ok((Val::memory(home, ty), Val::memory(home, ty)))
    }

    /// Registers of `val` laid out as `layout`, going through memory when
    /// the layouts differ (e.g. an integer compare result used as a float
    /// mask on AVX without AVX2).
    pub(crate) fn parts_as(&mut self, val: Val, layout: Layout) -> Result<Vec<VReg>, Diagnostic> {
        let own = self.layout(val.ty);
        if own == layout {
            let val = self.to_regs(val)?;
            return val
                .vec_parts()
                .ok_or_else(|| self.error(format!("internal error: {} not in vectors", val.ty)));
        }
        let width = match layout.class {
            RegClass::Vec(w) => w,
            other => {
                return Err(self.error(format!(
                    "internal error: cannot view {} as {}",
                    val.ty, other
                )))
            }
        };
        let val = self.spill(val)?;
        let val = self.materialize(val);
        let mem = val
            .mem()
            .ok_or_else(|| self.error("internal error: relayout without memory".into()))?;
        let mut parts = Vec::with_capacity(layout.parts as usize);
        for i in 0..layout.parts {
            let part = self.alloc_vec(width)?;
            self.emit(Inst::Load {
                kind: MovKind::Ups,
                dst: part,
                src: mem.offset((i * layout.part_bytes) as i32),
            });
            parts.push(part);
        }
        self.release(&val);
        Ok(parts)
    }

    /// Reinterpret the bits of `val` as `ty` (same total size).
    pub fn retype(&mut self, val: Val, ty: Ty) -> Result<Val, Diagnostic> {
        if !val.is_reg() {
            let val = self.materialize(val);
            return Ok(val.retyped(ty));
        }
        if self.layout(val.ty) == self.layout(ty) {
            return Ok(val.retyped(ty));
        }
        Ok(self.spill(val)?.retyped(ty))
    }

    /// Read variable storage: the cached register copy when there is one.
    pub fn read_var(&mut self, key: &str, home: Mem, ty: Ty) -> Val {
        if self.optimize && !self.layout(ty).is_multi_part() {
            if let Some(val) = self.cached_var(key) {
                return val;
            }
        }
        Val::memory(home, ty)
    }

    /// Write variable storage. With optimization on, a temporary result
    /// stays in its registers as the variable's cached copy. Multi-part
    /// values are never cached: a handful of them would pin the whole
    /// vector file.
    pub fn write_var(&mut self, key: &str, home: Mem, val: Val) -> Result<(), Diagnostic> {
        let cacheable =
            self.optimize && self.destructible(&val) && !self.layout(val.ty).is_multi_part();
        if cacheable {
            self.forget_var(key);
            let layout = self.layout(val.ty);
            match layout.class {
                RegClass::Gpr => {
                    if let Some(src) = val.gpr() {
                        self.emit(Inst::StoreGpr {
                            w64: val.ty.elem_bytes() == 8,
                            dst: home,
                            src,
                        });
                    }
                }
                RegClass::K => {
                    if let Some(src) = val.kreg() {
                        self.emit(Inst::KStore { dst: home, src });
                    }
                }
                RegClass::Vec(_) => {
                    for (i, part) in val.vec_parts().unwrap_or_default().iter().enumerate() {
                        self.emit(Inst::Store {
                            kind: Self::load_kind(val.ty),
                            dst: home.offset((i as u32 * layout.part_bytes) as i32),
                            src: *part,
                        });
                    }
                }
            }
            self.regs.cache(key, val);
            return Ok(());
        }
        // `val` may be the variable's own cached copy (`x = x`), so the
        // copy is dropped only after the store has released it.
        self.store(val, home)?;
        self.forget_var(key);
        Ok(())
    }

    /// Copy a value image between two slots.
    pub fn copy_slot(&mut self, src: Mem, dst: Mem, ty: Ty) -> Result<(), Diagnostic> {
        let val = self.to_regs(Val::memory(src, ty))?;
        self.store(val, dst)
    }
}

/// Integer value of a literal (floats truncate).
pub(crate) fn int_value(lit: crate::ast::Literal) -> i64 {
    match lit {
        crate::ast::Literal::Integer(i) => i as i64,
        crate::ast::Literal::Float(f) => f as i64,
    }
}
