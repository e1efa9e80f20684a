//! x86-64 lowering: legacy SSE, VEX and EVEX encodings.
//!
//! Memory operands always use `mod=10` with a 32-bit displacement (and a
//! SIB byte for `rsp`-based addresses), so EVEX never needs compressed
//! displacements. Constant-pool operands are RIP-relative and patched
//! once the pool is placed after the code.

use std::collections::HashMap;

use super::{MachineCode, RegisterLowering};
use crate::diagnostic::Diagnostic;
use crate::lir::*;
use crate::span::Span;
use crate::target::FeatureSet;
use crate::types::Width;

pub struct X86_64Lowering {
    features: FeatureSet,
}

impl X86_64Lowering {
    pub fn new(features: FeatureSet) -> Self {
        Self { features }
    }
}

impl RegisterLowering for X86_64Lowering {
    fn target_name(&self) -> &str {
        "x86_64"
    }

    fn lower(&self, program: &Program) -> Result<MachineCode, Diagnostic> {
        let mut code: Vec<u8> = Vec::new();
        let mut labels: HashMap<Label, usize> = HashMap::new();
        // (position of rel32, end of instruction, target)
        let mut jumps: Vec<(usize, usize, Label)> = Vec::new();
        let mut fixups: Vec<(usize, usize, ConstId, i32)> = Vec::new();

        for inst in &program.insts {
            if let Inst::Label(label) = inst {
                if labels.insert(*label, code.len()).is_some() {
                    return Err(internal(format!("label {} defined twice", label)));
                }
                continue;
            }
            let enc = self.encode(inst)?;
            let start = code.len();
            code.extend_from_slice(&enc.bytes);
            let end = code.len();
            if let Some((pos, id, disp)) = enc.fixup {
                fixups.push((start + pos, end, id, disp));
            }
            if let Some((pos, label)) = enc.jump {
                jumps.push((start + pos, end, label));
            }
        }

        for (pos, end, label) in jumps {
            let target = labels
                .get(&label)
                .copied()
                .ok_or_else(|| internal(format!("jump to undefined label {}", label)))?;
            patch_rel32(&mut code, pos, target as i64 - end as i64)?;
        }

        let code_len = code.len();
        let mut offsets = Vec::with_capacity(program.consts.len());
        if !program.consts.is_empty() {
            pad_to(&mut code, 64);
            for entry in &program.consts {
                pad_to(&mut code, entry.align.max(1) as usize);
                offsets.push(code.len());
                code.extend_from_slice(&entry.bytes);
            }
        }

        for (pos, end, id, disp) in fixups {
            let target = offsets
                .get(id.0 as usize)
                .copied()
                .ok_or_else(|| internal(format!("reference to missing constant {}", id.0)))?;
            patch_rel32(&mut code, pos, target as i64 + disp as i64 - end as i64)?;
        }

        Ok(MachineCode {
            bytes: code,
            code_len,
        })
    }
}

fn internal(message: String) -> Diagnostic {
    Diagnostic::error(format!("internal encoder error: {}", message), Span::dummy())
}

fn pad_to(code: &mut Vec<u8>, align: usize) {
    while code.len() % align != 0 {
        code.push(0);
    }
}

fn patch_rel32(code: &mut [u8], pos: usize, rel: i64) -> Result<(), Diagnostic> {
    let rel = i32::try_from(rel).map_err(|_| internal("displacement out of range".into()))?;
    code[pos..pos + 4].copy_from_slice(&rel.to_le_bytes());
    Ok(())
}

// ─── Encoding primitives ──────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Legacy,
    Vex,
    Evex,
}

#[derive(Clone, Copy)]
enum Map {
    M0F,
    M0F38,
    M0F3A,
}

impl Map {
    fn select(self) -> u8 {
        match self {
            Map::M0F => 1,
            Map::M0F38 => 2,
            Map::M0F3A => 3,
        }
    }
}

#[derive(Clone, Copy)]
enum Pp {
    None,
    P66,
    PF3,
    PF2,
}

impl Pp {
    fn bits(self) -> u8 {
        match self {
            Pp::None => 0,
            Pp::P66 => 1,
            Pp::PF3 => 2,
            Pp::PF2 => 3,
        }
    }

    fn legacy_prefix(self) -> Option<u8> {
        match self {
            Pp::None => None,
            Pp::P66 => Some(0x66),
            Pp::PF3 => Some(0xF3),
            Pp::PF2 => Some(0xF2),
        }
    }

    fn of(fmt: FFmt) -> Pp {
        match fmt {
            FFmt::Ps => Pp::None,
            FFmt::Pd => Pp::P66,
            FFmt::Ss => Pp::PF3,
            FFmt::Sd => Pp::PF2,
        }
    }
}

#[derive(Clone, Copy)]
struct Opcode {
    pp: Pp,
    map: Map,
    op: u8,
    /// REX.W / VEX.W
    w: bool,
    /// EVEX.W
    ew: bool,
}

impl Opcode {
    fn new(pp: Pp, map: Map, op: u8) -> Self {
        Self {
            pp,
            map,
            op,
            w: false,
            ew: false,
        }
    }

    fn w(self, w: bool) -> Self {
        Self { w, ..self }
    }

    fn ew(self, ew: bool) -> Self {
        Self { ew, ..self }
    }
}

/// ModRM r/m operand: a register number or a memory reference.
#[derive(Clone, Copy)]
enum Rm {
    Reg(u8),
    Mem(Mem),
}

impl Rm {
    fn ext(self) -> bool {
        match self {
            Rm::Reg(r) => r & 8 != 0,
            Rm::Mem(Mem {
                base: Base::Gpr(b), ..
            }) => b.0 & 8 != 0,
            Rm::Mem(_) => false,
        }
    }
}

fn rm_of(operand: RegMem) -> (Rm, bool) {
    match operand {
        RegMem::Reg(r) => (Rm::Reg(r.idx), false),
        RegMem::Mem(m) => (Rm::Mem(m), false),
        RegMem::Bcst(m) => (Rm::Mem(m), true),
    }
}

fn gpr_rm(src: GprSrc) -> Option<Rm> {
    match src {
        GprSrc::Reg(r) => Some(Rm::Reg(r.0)),
        GprSrc::Mem(m) => Some(Rm::Mem(m)),
        GprSrc::Imm(_) => None,
    }
}

/// Bytes of one instruction plus its pending patch sites.
#[derive(Default)]
struct Enc {
    bytes: Vec<u8>,
    fixup: Option<(usize, ConstId, i32)>,
    jump: Option<(usize, Label)>,
}

impl Enc {
    fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    fn modrm(&mut self, reg: u8, rm: Rm) {
        let reg = (reg & 7) << 3;
        match rm {
            Rm::Reg(r) => self.push(0xC0 | reg | (r & 7)),
            Rm::Mem(Mem {
                base: Base::Gpr(b),
                disp,
            }) => {
                self.push(0x80 | reg | (b.0 & 7));
                if b.0 & 7 == 4 {
                    self.push(0x24);
                }
                self.bytes.extend_from_slice(&disp.to_le_bytes());
            }
            Rm::Mem(Mem {
                base: Base::Const(id),
                disp,
            }) => {
                self.push(0x05 | reg);
                self.fixup = Some((self.bytes.len(), id, disp));
                self.bytes.extend_from_slice(&[0; 4]);
            }
        }
    }

    fn legacy(&mut self, oc: Opcode, reg: u8, rm: Rm, imm: Option<u8>) {
        if let Some(prefix) = oc.pp.legacy_prefix() {
            self.push(prefix);
        }
        let rex = 0x40 | (oc.w as u8) << 3 | ((reg >> 3) & 1) << 2 | rm.ext() as u8;
        if rex != 0x40 {
            self.push(rex);
        }
        self.push(0x0F);
        match oc.map {
            Map::M0F => {}
            Map::M0F38 => self.push(0x38),
            Map::M0F3A => self.push(0x3A),
        }
        self.push(oc.op);
        self.modrm(reg, rm);
        if let Some(imm) = imm {
            self.push(imm);
        }
    }

    /// VEX prefix, opcode, ModRM. The two-byte `C5` form is used whenever
    /// it can express the instruction: 0F map, W0 and no REX.B extension.
    fn vex(&mut self, oc: Opcode, reg: u8, vvvv: u8, rm: Rm, l256: bool, imm: Option<u8>) {
        let r = (!(reg >> 3) & 1) << 7;
        let tail = (!vvvv & 0xF) << 3 | (l256 as u8) << 2 | oc.pp.bits();
        if matches!(oc.map, Map::M0F) && !oc.w && !rm.ext() {
            self.push(0xC5);
            self.push(r | tail);
        } else {
            self.push(0xC4);
            let b = (!rm.ext() as u8) << 5;
            self.push(r | 1 << 6 | b | oc.map.select());
            self.push((oc.w as u8) << 7 | tail);
        }
        self.push(oc.op);
        self.modrm(reg, rm);
        if let Some(imm) = imm {
            self.push(imm);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn evex(
        &mut self,
        oc: Opcode,
        reg: u8,
        vvvv: u8,
        rm: Rm,
        width: Width,
        k: u8,
        bcst: bool,
        imm: Option<u8>,
    ) {
        self.push(0x62);
        let r = (!(reg >> 3) & 1) << 7;
        let b = (!rm.ext() as u8) << 5;
        // X and R' are inverted extensions for registers 16-31, never used.
        self.push(r | 1 << 6 | b | 1 << 4 | oc.map.select());
        self.push((oc.ew as u8) << 7 | (!vvvv & 0xF) << 3 | 1 << 2 | oc.pp.bits());
        let ll = match width {
            Width::X => 0,
            Width::Y => 1,
            Width::Z => 2,
        };
        self.push(ll << 5 | (bcst as u8) << 4 | 1 << 3 | (k & 7));
        self.push(oc.op);
        self.modrm(reg, rm);
        if let Some(imm) = imm {
            self.push(imm);
        }
    }

    /// General-purpose instruction: optional REX, opcode bytes, ModRM, immediate.
    fn gpr(&mut self, w64: bool, opcode: &[u8], reg: u8, rm: Rm, imm: &[u8]) {
        let rex = 0x40 | (w64 as u8) << 3 | ((reg >> 3) & 1) << 2 | rm.ext() as u8;
        if rex != 0x40 {
            self.push(rex);
        }
        self.bytes.extend_from_slice(opcode);
        self.modrm(reg, rm);
        self.bytes.extend_from_slice(imm);
    }
}

fn imm32(inst: &Inst, value: i64) -> Result<[u8; 4], Diagnostic> {
    i32::try_from(value)
        .map(|v| v.to_le_bytes())
        .map_err(|_| invalid(inst, "immediate does not fit in 32 bits"))
}

fn invalid(inst: &Inst, why: &str) -> Diagnostic {
    internal(format!("cannot encode '{}': {}", inst, why))
}

// ─── Instruction encoding ─────────────────────────────────────────

impl X86_64Lowering {
    fn mode(&self, width: Width, needs_evex: bool) -> Mode {
        if !self.features.avx {
            Mode::Legacy
        } else if width == Width::Z || needs_evex {
            Mode::Evex
        } else {
            Mode::Vex
        }
    }

    /// Emit a vector instruction `reg = vvvv op rm` in the given mode.
    /// Legacy encodings have no `vvvv`; they require it to equal `reg`.
    #[allow(clippy::too_many_arguments)]
    fn emit_vec(
        &self,
        e: &mut Enc,
        inst: &Inst,
        mode: Mode,
        oc: Opcode,
        reg: u8,
        vvvv: Option<u8>,
        rm: Rm,
        width: Width,
        bcst: bool,
        imm: Option<u8>,
    ) -> Result<(), Diagnostic> {
        match mode {
            Mode::Legacy => {
                if vvvv.is_some_and(|v| v != reg) {
                    return Err(invalid(
                        inst,
                        "legacy SSE form needs the destination to equal the first source",
                    ));
                }
                if bcst {
                    return Err(invalid(inst, "embedded broadcast needs AVX-512"));
                }
                e.legacy(oc, reg, rm, imm);
            }
            Mode::Vex => e.vex(oc, reg, vvvv.unwrap_or(0), rm, width == Width::Y, imm),
            Mode::Evex => {
                if !self.features.avx512f {
                    return Err(invalid(inst, "EVEX encoding needs AVX-512F"));
                }
                e.evex(oc, reg, vvvv.unwrap_or(0), rm, width, 0, bcst, imm);
            }
        }
        Ok(())
    }

    fn encode(&self, inst: &Inst) -> Result<Enc, Diagnostic> {
        let mut e = Enc::default();
        match *inst {
            Inst::Simd { op, dst, a, b } => {
                let (rm, bcst) = rm_of(b);
                let mode = self.mode(dst.width, bcst);
                let mut imm = None;
                let oc = match op {
                    SimdOp::FArith(fop, fmt) => {
                        let code = match fop {
                            FOp::Add => 0x58,
                            FOp::Mul => 0x59,
                            FOp::Sub => 0x5C,
                            FOp::Min => 0x5D,
                            FOp::Div => 0x5E,
                            FOp::Max => 0x5F,
                        };
                        Opcode::new(Pp::of(fmt), Map::M0F, code).ew(fmt.is_double())
                    }
                    SimdOp::FLogic(lop, double) if mode == Mode::Evex => {
                        // vandpd/vorpd on zmm need AVX512DQ; the integer
                        // forms are AVX512F and bitwise identical.
                        let code = match lop {
                            LOp::And => 0xDB,
                            LOp::AndN => 0xDF,
                            LOp::Or => 0xEB,
                            LOp::Xor => 0xEF,
                        };
                        Opcode::new(Pp::P66, Map::M0F, code).ew(double)
                    }
                    SimdOp::FLogic(lop, double) => {
                        let code = match lop {
                            LOp::And => 0x54,
                            LOp::AndN => 0x55,
                            LOp::Or => 0x56,
                            LOp::Xor => 0x57,
                        };
                        let pp = if double { Pp::P66 } else { Pp::None };
                        Opcode::new(pp, Map::M0F, code).ew(double)
                    }
                    SimdOp::FCmp(pred, fmt) => {
                        if mode == Mode::Evex {
                            return Err(invalid(inst, "zmm compares produce opmasks"));
                        }
                        imm = Some(pred);
                        Opcode::new(Pp::of(fmt), Map::M0F, 0xC2)
                    }
                    SimdOp::IArith(iop, lane) => {
                        let q = lane == Lane::Q;
                        let (map, code) = match (iop, lane) {
                            (IOp::Add, Lane::D) => (Map::M0F, 0xFE),
                            (IOp::Add, Lane::Q) => (Map::M0F, 0xD4),
                            (IOp::Sub, Lane::D) => (Map::M0F, 0xFA),
                            (IOp::Sub, Lane::Q) => (Map::M0F, 0xFB),
                            (IOp::Mul, Lane::D) => (Map::M0F38, 0x40),
                            (IOp::Mul, Lane::Q) => {
                                return Err(invalid(inst, "no 64-bit lane multiply"))
                            }
                            (IOp::And, _) => (Map::M0F, 0xDB),
                            (IOp::AndN, _) => (Map::M0F, 0xDF),
                            (IOp::Or, _) => (Map::M0F, 0xEB),
                            (IOp::Xor, _) => (Map::M0F, 0xEF),
                            (IOp::CmpEq, Lane::D) => (Map::M0F, 0x76),
                            (IOp::CmpEq, Lane::Q) => (Map::M0F38, 0x29),
                            (IOp::CmpGt, Lane::D) => (Map::M0F, 0x66),
                            (IOp::CmpGt, Lane::Q) => (Map::M0F38, 0x37),
                        };
                        if matches!(iop, IOp::CmpEq | IOp::CmpGt) && mode == Mode::Evex {
                            return Err(invalid(inst, "zmm compares produce opmasks"));
                        }
                        Opcode::new(Pp::P66, map, code).ew(q)
                    }
                    SimdOp::Unpcklpd => Opcode::new(Pp::P66, Map::M0F, 0x14).ew(true),
                    SimdOp::Shufps(sel) => {
                        imm = Some(sel);
                        Opcode::new(Pp::None, Map::M0F, 0xC6)
                    }
                };
                self.emit_vec(
                    &mut e,
                    inst,
                    mode,
                    oc,
                    dst.idx,
                    Some(a.idx),
                    rm,
                    dst.width,
                    bcst,
                    imm,
                )?;
            }
            Inst::Fma {
                kind,
                order,
                fmt,
                dst,
                a,
                b,
            } => {
                if !self.features.fma {
                    return Err(invalid(inst, "FMA is not available"));
                }
                let (rm, bcst) = rm_of(b);
                let base: u8 = match order {
                    FmaOrder::O132 => 0x98,
                    FmaOrder::O213 => 0xA8,
                    FmaOrder::O231 => 0xB8,
                };
                let kind_offset = match kind {
                    FmaKind::MAdd => 0,
                    FmaKind::MSub => 2,
                    FmaKind::NMAdd => 4,
                };
                let code = base + kind_offset + fmt.is_scalar() as u8;
                let double = fmt.is_double();
                let oc = Opcode::new(Pp::P66, Map::M0F38, code).w(double).ew(double);
                let mode = self.mode(dst.width, bcst);
                self.emit_vec(
                    &mut e,
                    inst,
                    mode,
                    oc,
                    dst.idx,
                    Some(a.idx),
                    rm,
                    dst.width,
                    bcst,
                    None,
                )?;
            }
            Inst::Sqrt { fmt, dst, src } => {
                let (rm, bcst) = rm_of(src);
                let oc = Opcode::new(Pp::of(fmt), Map::M0F, 0x51).ew(fmt.is_double());
                // Scalar forms merge the upper lanes from vvvv.
                let vvvv = fmt.is_scalar().then_some(dst.idx);
                let mode = self.mode(dst.width, bcst);
                self.emit_vec(&mut e, inst, mode, oc, dst.idx, vvvv, rm, dst.width, bcst, None)?;
            }
            Inst::CmpK {
                kind,
                pred,
                dst,
                a,
                b,
            } => {
                if !self.features.avx512f {
                    return Err(invalid(inst, "opmask compares need AVX-512F"));
                }
                let (rm, bcst) = rm_of(b);
                let oc = match kind {
                    CmpKind::Float(fmt) => {
                        Opcode::new(Pp::of(fmt), Map::M0F, 0xC2).ew(fmt.is_double())
                    }
                    CmpKind::Int(lane) => {
                        Opcode::new(Pp::P66, Map::M0F3A, 0x1F).ew(lane == Lane::Q)
                    }
                };
                e.evex(oc, dst.0, a.idx, rm, a.width, 0, bcst, Some(pred));
            }
            Inst::BlendK {
                double,
                dst,
                a,
                b,
                k,
            } => {
                if !self.features.avx512f {
                    return Err(invalid(inst, "opmask blends need AVX-512F"));
                }
                let (rm, bcst) = rm_of(b);
                let oc = Opcode::new(Pp::P66, Map::M0F38, 0x65).ew(double);
                e.evex(oc, dst.idx, a.idx, rm, dst.width, k.0, bcst, None);
            }
            Inst::Blendv {
                double,
                dst,
                a,
                b,
                mask,
            } => {
                let (rm, bcst) = rm_of(b);
                if self.mode(dst.width, bcst) != Mode::Vex {
                    return Err(invalid(inst, "variable blends are VEX-only"));
                }
                let oc = Opcode::new(Pp::P66, Map::M0F3A, if double { 0x4B } else { 0x4A });
                e.vex(oc, dst.idx, a.idx, rm, dst.width == Width::Y, Some(mask.idx << 4));
            }
            Inst::Shift {
                op,
                lane,
                dst,
                src,
                imm,
            } => {
                let digit = match (op, lane) {
                    (VShift::Sll, _) => 6,
                    (VShift::Srl, _) => 2,
                    (VShift::Sra, Lane::D) => 4,
                    (VShift::Sra, Lane::Q) => {
                        return Err(invalid(inst, "no 64-bit arithmetic shift"))
                    }
                };
                let code = if lane == Lane::Q { 0x73 } else { 0x72 };
                let oc = Opcode::new(Pp::P66, Map::M0F, code).ew(lane == Lane::Q);
                match self.mode(dst.width, false) {
                    Mode::Legacy => {
                        if dst != src {
                            return Err(invalid(
                                inst,
                                "legacy SSE form needs the destination to equal the source",
                            ));
                        }
                        e.legacy(oc, digit, Rm::Reg(dst.idx), Some(imm));
                    }
                    Mode::Vex => e.vex(
                        oc,
                        digit,
                        dst.idx,
                        Rm::Reg(src.idx),
                        dst.width == Width::Y,
                        Some(imm),
                    ),
                    Mode::Evex => {
                        e.evex(oc, digit, dst.idx, Rm::Reg(src.idx), dst.width, 0, false, Some(imm))
                    }
                }
            }
            Inst::Load { kind, dst, src } => {
                let oc = mov_opcode(kind, 0x10);
                let mode = self.mode(dst.width, false);
                self.emit_vec(
                    &mut e,
                    inst,
                    mode,
                    oc,
                    dst.idx,
                    None,
                    Rm::Mem(src),
                    dst.width,
                    false,
                    None,
                )?;
            }
            Inst::Store { kind, dst, src } => {
                let oc = mov_opcode(kind, 0x11);
                let mode = self.mode(src.width, false);
                self.emit_vec(
                    &mut e,
                    inst,
                    mode,
                    oc,
                    src.idx,
                    None,
                    Rm::Mem(dst),
                    src.width,
                    false,
                    None,
                )?;
            }
            Inst::MovReg { dst, src } => {
                let oc = Opcode::new(Pp::None, Map::M0F, 0x28);
                let mode = self.mode(dst.width, false);
                self.emit_vec(
                    &mut e,
                    inst,
                    mode,
                    oc,
                    dst.idx,
                    None,
                    Rm::Reg(src.idx),
                    dst.width,
                    false,
                    None,
                )?;
            }
            Inst::Broadcast { double, dst, src } => {
                let (rm, bcst) = rm_of(src);
                let mode = self.mode(dst.width, false);
                if mode == Mode::Legacy || bcst {
                    return Err(invalid(inst, "broadcasts need AVX"));
                }
                let movddup = double && dst.width == Width::X;
                if matches!(src, RegMem::Reg(_)) && !movddup && !self.features.avx2 {
                    return Err(invalid(inst, "register broadcasts need AVX2"));
                }
                let oc = if movddup {
                    Opcode::new(Pp::PF2, Map::M0F, 0x12).ew(true)
                } else if double {
                    Opcode::new(Pp::P66, Map::M0F38, 0x19).ew(true)
                } else {
                    Opcode::new(Pp::P66, Map::M0F38, 0x18)
                };
                self.emit_vec(&mut e, inst, mode, oc, dst.idx, None, rm, dst.width, false, None)?;
            }
            Inst::KLoad { dst, src } => {
                self.require_avx512(inst)?;
                e.vex(Opcode::new(Pp::None, Map::M0F, 0x90), dst.0, 0, Rm::Mem(src), false, None);
            }
            Inst::KStore { dst, src } => {
                self.require_avx512(inst)?;
                e.vex(Opcode::new(Pp::None, Map::M0F, 0x91), src.0, 0, Rm::Mem(dst), false, None);
            }
            Inst::KOp { op, dst, a, b } => {
                self.require_avx512(inst)?;
                let code = match op {
                    KLogic::And => 0x41,
                    KLogic::AndN => 0x42,
                    KLogic::Or => 0x45,
                    KLogic::Xor => 0x47,
                };
                e.vex(Opcode::new(Pp::None, Map::M0F, code), dst.0, a.0, Rm::Reg(b.0), true, None);
            }
            Inst::KNot { dst, src } => {
                self.require_avx512(inst)?;
                e.vex(Opcode::new(Pp::None, Map::M0F, 0x44), dst.0, 0, Rm::Reg(src.0), false, None);
            }
            Inst::CvtSi2F {
                double,
                w64,
                dst,
                src,
            } => {
                let pp = if double { Pp::PF2 } else { Pp::PF3 };
                let oc = Opcode::new(pp, Map::M0F, 0x2A).w(w64).ew(w64);
                let mode = self.mode(Width::X, false);
                self.emit_vec(
                    &mut e,
                    inst,
                    mode,
                    oc,
                    dst.idx,
                    Some(dst.idx),
                    Rm::Reg(src.0),
                    Width::X,
                    false,
                    None,
                )?;
            }
            Inst::CvttF2Si {
                double,
                w64,
                dst,
                src,
            } => {
                let (rm, _) = rm_of(src);
                let pp = if double { Pp::PF2 } else { Pp::PF3 };
                let oc = Opcode::new(pp, Map::M0F, 0x2C).w(w64).ew(w64);
                let mode = self.mode(Width::X, false);
                self.emit_vec(&mut e, inst, mode, oc, dst.0, None, rm, Width::X, false, None)?;
            }
            Inst::CvtF2F { to_double, dst, src } => {
                let (rm, _) = rm_of(src);
                let pp = if to_double { Pp::PF3 } else { Pp::PF2 };
                let oc = Opcode::new(pp, Map::M0F, 0x5A).ew(!to_double);
                let mode = self.mode(Width::X, false);
                self.emit_vec(
                    &mut e,
                    inst,
                    mode,
                    oc,
                    dst.idx,
                    Some(dst.idx),
                    rm,
                    Width::X,
                    false,
                    None,
                )?;
            }
            Inst::Ucomi { double, a, b } => {
                let (rm, _) = rm_of(b);
                let pp = if double { Pp::P66 } else { Pp::None };
                let oc = Opcode::new(pp, Map::M0F, 0x2E).ew(double);
                let mode = self.mode(Width::X, false);
                self.emit_vec(&mut e, inst, mode, oc, a.idx, None, rm, Width::X, false, None)?;
            }
            Inst::MovMsk { double, dst, src } => {
                if src.width == Width::Z {
                    return Err(invalid(inst, "zmm masks live in opmask registers"));
                }
                let pp = if double { Pp::P66 } else { Pp::None };
                let oc = Opcode::new(pp, Map::M0F, 0x50);
                let mode = self.mode(src.width, false);
                self.emit_vec(
                    &mut e,
                    inst,
                    mode,
                    oc,
                    dst.0,
                    None,
                    Rm::Reg(src.idx),
                    src.width,
                    false,
                    None,
                )?;
            }
            Inst::Mov { w64, dst, src } => match src {
                GprSrc::Imm(value) => {
                    if !w64 {
                        let v = u32::try_from(value)
                            .or_else(|_| i32::try_from(value).map(|v| v as u32))
                            .map_err(|_| invalid(inst, "immediate does not fit in 32 bits"))?;
                        if dst.0 & 8 != 0 {
                            e.push(0x41);
                        }
                        e.push(0xB8 | (dst.0 & 7));
                        e.bytes.extend_from_slice(&v.to_le_bytes());
                    } else if let Ok(v) = i32::try_from(value) {
                        e.gpr(true, &[0xC7], 0, Rm::Reg(dst.0), &v.to_le_bytes());
                    } else {
                        e.push(0x48 | (dst.0 >> 3) & 1);
                        e.push(0xB8 | (dst.0 & 7));
                        e.bytes.extend_from_slice(&value.to_le_bytes());
                    }
                }
                other => {
                    let rm = gpr_rm(other).ok_or_else(|| invalid(inst, "bad source"))?;
                    e.gpr(w64, &[0x8B], dst.0, rm, &[]);
                }
            },
            Inst::StoreGpr { w64, dst, src } => e.gpr(w64, &[0x89], src.0, Rm::Mem(dst), &[]),
            Inst::Movsxd { dst, src } => {
                let rm = gpr_rm(src).ok_or_else(|| invalid(inst, "bad source"))?;
                e.gpr(true, &[0x63], dst.0, rm, &[]);
            }
            Inst::Alu { op, w64, dst, src } => {
                let (code, digit) = match op {
                    AluOp::Add => (0x03, 0),
                    AluOp::Or => (0x0B, 1),
                    AluOp::And => (0x23, 4),
                    AluOp::Sub => (0x2B, 5),
                    AluOp::Xor => (0x33, 6),
                    AluOp::Cmp => (0x3B, 7),
                };
                match src {
                    GprSrc::Imm(value) => {
                        let imm = imm32(inst, value)?;
                        e.gpr(w64, &[0x81], digit, Rm::Reg(dst.0), &imm);
                    }
                    other => {
                        let rm = gpr_rm(other).ok_or_else(|| invalid(inst, "bad source"))?;
                        e.gpr(w64, &[code], dst.0, rm, &[]);
                    }
                }
            }
            Inst::Imul { w64, dst, src } => match src {
                GprSrc::Imm(value) => {
                    let imm = imm32(inst, value)?;
                    e.gpr(w64, &[0x69], dst.0, Rm::Reg(dst.0), &imm);
                }
                other => {
                    let rm = gpr_rm(other).ok_or_else(|| invalid(inst, "bad source"))?;
                    e.gpr(w64, &[0x0F, 0xAF], dst.0, rm, &[]);
                }
            },
            Inst::ShiftGpr { op, w64, dst, imm } => {
                let digit = match op {
                    GprShift::Shl => 4,
                    GprShift::Shr => 5,
                    GprShift::Sar => 7,
                };
                e.gpr(w64, &[0xC1], digit, Rm::Reg(dst.0), &[imm]);
            }
            Inst::Neg { w64, dst } => e.gpr(w64, &[0xF7], 3, Rm::Reg(dst.0), &[]),
            Inst::Test { w64, a, b } => e.gpr(w64, &[0x85], b.0, Rm::Reg(a.0), &[]),
            Inst::Push(r) => {
                if r.0 & 8 != 0 {
                    e.push(0x41);
                }
                e.push(0x50 | (r.0 & 7));
            }
            Inst::Pop(r) => {
                if r.0 & 8 != 0 {
                    e.push(0x41);
                }
                e.push(0x58 | (r.0 & 7));
            }
            Inst::Ret => e.push(0xC3),
            Inst::Vzeroupper => {
                if !self.features.avx {
                    return Err(invalid(inst, "vzeroupper needs AVX"));
                }
                e.bytes.extend_from_slice(&[0xC5, 0xF8, 0x77]);
            }
            Inst::Label(_) => {}
            Inst::Jmp(label) => {
                e.push(0xE9);
                e.jump = Some((1, label));
                e.bytes.extend_from_slice(&[0; 4]);
            }
            Inst::Jcc(cond, label) => {
                e.push(0x0F);
                e.push(0x80 | cond as u8);
                e.jump = Some((2, label));
                e.bytes.extend_from_slice(&[0; 4]);
            }
        }
        Ok(e)
    }

    fn require_avx512(&self, inst: &Inst) -> Result<(), Diagnostic> {
        if self.features.avx512f {
            Ok(())
        } else {
            Err(invalid(inst, "opmask registers need AVX-512F"))
        }
    }
}

fn mov_opcode(kind: MovKind, op: u8) -> Opcode {
    match kind {
        MovKind::Ups => Opcode::new(Pp::None, Map::M0F, op),
        MovKind::Ss => Opcode::new(Pp::PF3, Map::M0F, op),
        MovKind::Sd => Opcode::new(Pp::PF2, Map::M0F, op).ew(true),
    }
}
