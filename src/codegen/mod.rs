//! Code generation: typed operations on `Val`s lowered to `lir` instructions
//! for one feature level.
//!
//! The generator owns the register pools, the constant pool and the stack
//! frame. The expression compiler drives it one operation at a time and
//! never sees a physical register choice.
//!
//! Frame convention (System V):
//!
//! ```text
//! kernel(args: *const *const u8 /* rdi */, ret: *mut u8 /* rsi */)
//! push rbp; mov rbp, rsp; and rsp, -64; sub rsp, FRAME
//! ...                                   ; homes at [rsp + off]
//! .Lend: vzeroupper; mov rsp, rbp; pop rbp; ret
//! ```
//!
//! Arguments arrive as pointers to 64-byte buffers and are bound at the
//! top of the body (`bind_param`). Results are stored through `rsi`.

mod alloc;
mod arith;
mod branch;
mod consts;
mod convert;
mod frame;
mod moves;
pub mod operand;
#[cfg(test)]
mod tests;

pub use alloc::RegAlloc;
pub use arith::Fused;
pub use consts::{literal_bytes, ConstPool};
pub use frame::Frame;
pub use operand::{Operand, Val};

use crate::ast::Literal;
use crate::diagnostic::Diagnostic;
use crate::lir::*;
use crate::span::Span;
use crate::target::{FeatureLevel, FeatureSet};
use crate::types::{Layout, Passing, RegClass, Ty, Width};

pub struct CodeGen {
    level: FeatureLevel,
    fs: FeatureSet,
    optimize: bool,
    insts: Vec<Inst>,
    pub(crate) regs: RegAlloc,
    consts: ConstPool,
    pub(crate) frame: Frame,
    next_label: u32,
    epilogue: Label,
    /// Description of the statement being compiled, for error messages.
    context: String,
}

impl CodeGen {
    pub fn new(level: FeatureLevel, optimize: bool) -> Self {
        let mut gen = Self {
            level,
            fs: level.features(),
            optimize,
            insts: Vec::new(),
            regs: RegAlloc::new(),
            consts: ConstPool::new(),
            frame: Frame::new(),
            next_label: 0,
            epilogue: Label(0),
            context: "kernel".to_string(),
        };
        gen.epilogue = gen.new_label();
        gen
    }

    pub fn level(&self) -> FeatureLevel {
        self.level
    }

    pub fn features(&self) -> &FeatureSet {
        &self.fs
    }

    pub fn optimize(&self) -> bool {
        self.optimize
    }

    /// Start a statement: name it for diagnostics and drop operand pins.
    pub fn begin_statement(&mut self, context: String) {
        self.context = context;
        self.regs.clear_pins();
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn layout(&self, ty: Ty) -> Layout {
        ty.layout(&self.fs)
    }

    fn width(&self, ty: Ty) -> Width {
        match self.layout(ty).class {
            RegClass::Vec(w) => w,
            _ => Width::X,
        }
    }

    pub fn emit(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Place a label. Control can arrive from elsewhere, so no register
    /// cache survives it.
    pub fn bind(&mut self, label: Label) {
        self.regs.flush();
        self.emit(Inst::Label(label));
    }

    pub fn jump(&mut self, label: Label) {
        self.emit(Inst::Jmp(label));
    }

    /// Instructions emitted so far.
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    fn error(&self, message: String) -> Diagnostic {
        Diagnostic::error(message, Span::dummy())
    }

    fn unsupported(&self, what: &str, ty: Ty) -> Diagnostic {
        self.error(format!(
            "{} is not supported for {} at {}",
            what, ty, self.level
        ))
    }

    // ─── Registers ────────────────────────────────────────────────

    fn alloc_vec(&mut self, width: Width) -> Result<VReg, Diagnostic> {
        let context = self.context.clone();
        self.regs.alloc_vec(width, &context)
    }

    fn alloc_gpr(&mut self) -> Result<Gpr, Diagnostic> {
        let context = self.context.clone();
        self.regs.alloc_gpr(&context)
    }

    fn alloc_k(&mut self) -> Result<KReg, Diagnostic> {
        let context = self.context.clone();
        self.regs.alloc_k(&context)
    }

    /// Fresh registers for one value of `ty`.
    fn alloc_parts(&mut self, ty: Ty) -> Result<Vec<VReg>, Diagnostic> {
        let layout = self.layout(ty);
        let width = self.width(ty);
        let mut parts = Vec::with_capacity(layout.parts as usize);
        for _ in 0..layout.parts {
            parts.push(self.alloc_vec(width)?);
        }
        Ok(parts)
    }

    /// Whether every register of `val` is a temporary this operation may
    /// overwrite.
    fn destructible(&self, val: &Val) -> bool {
        let regs = val.regs();
        !regs.is_empty() && regs.iter().all(|r| self.regs.can_destruct(*r))
    }

    /// Release whatever `val` holds: temporaries and spill slots.
    pub fn release(&mut self, val: &Val) {
        match &val.op {
            Operand::Memory(m) => self.frame.release(*m),
            _ => self.regs.free_all(&val.regs()),
        }
    }

    /// Release `val` except the registers in `keep`.
    fn release_except(&mut self, val: &Val, keep: &[VReg]) {
        if let Operand::Memory(m) = &val.op {
            self.frame.release(*m);
            return;
        }
        for r in val.regs() {
            let kept = matches!(r, Reg::Vec(v) if keep.iter().any(|k| k.idx == v.idx));
            if !kept {
                self.regs.free(r);
            }
        }
    }

    // ─── Constants and homes ──────────────────────────────────────

    pub fn literal(&self, lit: Literal, ty: Ty) -> Val {
        Val::immediate(lit, ty)
    }

    /// Memory operand holding `lit` as a `ty` image.
    pub fn const_mem(&mut self, lit: Literal, ty: Ty) -> Mem {
        self.consts.literal(lit, ty)
    }

    fn const_bits(&mut self, bits: u64, ty: Ty) -> Val {
        Val::memory(self.consts.bits(bits, ty), ty)
    }

    /// A permanent frame slot for a variable of `ty`.
    pub fn alloc_home(&mut self, ty: Ty) -> Mem {
        self.frame.home(ty)
    }

    pub fn constants(&self) -> usize {
        self.consts.len()
    }

    // ─── Variable cache ───────────────────────────────────────────

    /// A register copy of variable `key`, pinned for the statement.
    pub fn cached_var(&mut self, key: &str) -> Option<Val> {
        let val = self.regs.cached(key)?.clone();
        for r in val.regs() {
            self.regs.pin(r);
        }
        Some(val)
    }

    pub fn forget_var(&mut self, key: &str) {
        self.regs.uncache(key);
    }

    pub fn flush_cache(&mut self) {
        self.regs.flush();
    }

    // ─── Frame ────────────────────────────────────────────────────

    /// Store the kernel result through `rsi` and leave.
    pub fn ret(&mut self, val: Val) -> Result<(), Diagnostic> {
        self.store(val, Mem::at(Gpr::RSI, 0))?;
        let end = self.epilogue;
        self.jump(end);
        Ok(())
    }

    /// Bind argument `index` to variable `key`. A value that fits one
    /// register at this level is loaded straight into a register, which
    /// stays cached as the variable when optimizing; multi-part values are
    /// copied into the home slot.
    pub fn bind_param(&mut self, index: usize, key: &str, home: Mem, ty: Ty) -> Result<(), Diagnostic> {
        let ptr = self.alloc_gpr()?;
        self.emit(Inst::Mov {
            w64: true,
            dst: ptr,
            src: GprSrc::Mem(Mem::at(Gpr::RDI, 8 * index as i32)),
        });
        let arg = Mem::at(ptr, 0);
        match ty.passing(&self.fs) {
            Passing::Register => {
                let val = self.to_regs(Val::memory(arg, ty))?;
                self.regs.free(Reg::Gpr(ptr));
                self.write_var(key, home, val)
            }
            Passing::Pointer => {
                self.copy_slot(arg, home, ty)?;
                self.regs.free(Reg::Gpr(ptr));
                Ok(())
            }
        }
    }

    /// Wrap the body in prologue and epilogue.
    pub fn finish(mut self) -> Program {
        let frame = self.frame.size();
        let mut code = vec![
            Inst::Push(Gpr::RBP),
            Inst::Mov {
                w64: true,
                dst: Gpr::RBP,
                src: GprSrc::Reg(Gpr::RSP),
            },
            Inst::Alu {
                op: AluOp::And,
                w64: true,
                dst: Gpr::RSP,
                src: GprSrc::Imm(-64),
            },
        ];
        if frame > 0 {
            code.push(Inst::Alu {
                op: AluOp::Sub,
                w64: true,
                dst: Gpr::RSP,
                src: GprSrc::Imm(frame as i64),
            });
        }
        code.append(&mut self.insts);
        code.push(Inst::Label(self.epilogue));
        if self.fs.avx {
            code.push(Inst::Vzeroupper);
        }
        code.push(Inst::Mov {
            w64: true,
            dst: Gpr::RSP,
            src: GprSrc::Reg(Gpr::RBP),
        });
        code.push(Inst::Pop(Gpr::RBP));
        code.push(Inst::Ret);
        tracing::trace!(
            level = %self.level,
            insts = code.len(),
            frame,
            consts = self.consts.len(),
            "kernel assembled"
        );
        Program {
            insts: code,
            consts: self.consts.into_data(),
            vex: self.fs.avx,
        }
    }
}
