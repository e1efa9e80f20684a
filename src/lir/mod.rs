//! LIR: structured x86-64 instructions.
//!
//! Code generation appends `Inst`s to a `Program`; `lower` assembles the
//! frozen program into position-independent machine code followed by its
//! constant pool. Instructions are written in VEX three-operand form
//! (`dst = a op b`); the encoder falls back to legacy SSE encodings, which
//! require `dst == a`, when AVX is unavailable.

pub mod lower;

use std::fmt;

use crate::types::Width;

// ─── Registers ────────────────────────────────────────────────────

/// A general-purpose register by hardware number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gpr(pub u8);

impl Gpr {
    pub const RAX: Gpr = Gpr(0);
    pub const RCX: Gpr = Gpr(1);
    pub const RDX: Gpr = Gpr(2);
    pub const RBX: Gpr = Gpr(3);
    pub const RSP: Gpr = Gpr(4);
    pub const RBP: Gpr = Gpr(5);
    pub const RSI: Gpr = Gpr(6);
    pub const RDI: Gpr = Gpr(7);
    pub const R8: Gpr = Gpr(8);
    pub const R9: Gpr = Gpr(9);
    pub const R10: Gpr = Gpr(10);
    pub const R11: Gpr = Gpr(11);
}

const GPR_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(GPR_NAMES[(self.0 & 15) as usize])
    }
}

/// A vector register viewed at a width (`xmm3`, `ymm3`, `zmm3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg {
    pub idx: u8,
    pub width: Width,
}

impl VReg {
    pub fn new(idx: u8, width: Width) -> Self {
        Self { idx, width }
    }

    pub fn xmm(idx: u8) -> Self {
        Self::new(idx, Width::X)
    }

    pub fn with_width(self, width: Width) -> Self {
        Self { width, ..self }
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mm{}", self.width.prefix(), self.idx)
    }
}

/// An AVX-512 opmask register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KReg(pub u8);

impl fmt::Display for KReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.0)
    }
}

/// Any physical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Gpr(Gpr),
    Vec(VReg),
    K(KReg),
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Gpr(r) => write!(f, "{}", r),
            Reg::Vec(r) => write!(f, "{}", r),
            Reg::K(r) => write!(f, "{}", r),
        }
    }
}

// ─── Memory ───────────────────────────────────────────────────────

/// Index of an entry in the program's constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    Gpr(Gpr),
    /// RIP-relative reference into the constant pool.
    Const(ConstId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Base,
    pub disp: i32,
}

impl Mem {
    pub fn at(base: Gpr, disp: i32) -> Self {
        Self {
            base: Base::Gpr(base),
            disp,
        }
    }

    pub fn constant(id: ConstId) -> Self {
        Self {
            base: Base::Const(id),
            disp: 0,
        }
    }

    pub fn offset(self, by: i32) -> Self {
        Self {
            disp: self.disp + by,
            ..self
        }
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            Base::Gpr(r) => write!(f, "[{}", r)?,
            Base::Const(id) => write!(f, "[const{}", id.0)?,
        }
        match self.disp {
            0 => f.write_str("]"),
            d if d < 0 => write!(f, "-{}]", -(d as i64)),
            d => write!(f, "+{}]", d),
        }
    }
}

/// Vector source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegMem {
    Reg(VReg),
    Mem(Mem),
    /// Memory scalar broadcast to every lane (EVEX `{1toN}`).
    Bcst(Mem),
}

impl fmt::Display for RegMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegMem::Reg(r) => write!(f, "{}", r),
            RegMem::Mem(m) => write!(f, "{}", m),
            RegMem::Bcst(m) => write!(f, "{}{{1toN}}", m),
        }
    }
}

/// General-purpose source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GprSrc {
    Reg(Gpr),
    Mem(Mem),
    Imm(i64),
}

impl fmt::Display for GprSrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GprSrc::Reg(r) => write!(f, "{}", r),
            GprSrc::Mem(m) => write!(f, "{}", m),
            GprSrc::Imm(v) => write!(f, "{}", v),
        }
    }
}

// ─── Labels and conditions ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// Condition codes; the discriminant is the `jcc` low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    B = 0x2,
    Ae = 0x3,
    E = 0x4,
    Ne = 0x5,
    Be = 0x6,
    A = 0x7,
    P = 0xA,
    Np = 0xB,
    L = 0xC,
    Ge = 0xD,
    Le = 0xE,
    G = 0xF,
}

impl Cond {
    pub fn negate(self) -> Cond {
        match self {
            Cond::B => Cond::Ae,
            Cond::Ae => Cond::B,
            Cond::E => Cond::Ne,
            Cond::Ne => Cond::E,
            Cond::Be => Cond::A,
            Cond::A => Cond::Be,
            Cond::P => Cond::Np,
            Cond::Np => Cond::P,
            Cond::L => Cond::Ge,
            Cond::Ge => Cond::L,
            Cond::Le => Cond::G,
            Cond::G => Cond::Le,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Cond::B => "b",
            Cond::Ae => "ae",
            Cond::E => "e",
            Cond::Ne => "ne",
            Cond::Be => "be",
            Cond::A => "a",
            Cond::P => "p",
            Cond::Np => "np",
            Cond::L => "l",
            Cond::Ge => "ge",
            Cond::Le => "le",
            Cond::G => "g",
        }
    }
}

// ─── Operation kinds ──────────────────────────────────────────────

/// Float operand format: packed/scalar, single/double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FFmt {
    Ps,
    Pd,
    Ss,
    Sd,
}

impl FFmt {
    pub fn new(double: bool, scalar: bool) -> Self {
        match (double, scalar) {
            (false, false) => FFmt::Ps,
            (true, false) => FFmt::Pd,
            (false, true) => FFmt::Ss,
            (true, true) => FFmt::Sd,
        }
    }

    pub fn is_double(self) -> bool {
        matches!(self, FFmt::Pd | FFmt::Sd)
    }

    pub fn is_scalar(self) -> bool {
        matches!(self, FFmt::Ss | FFmt::Sd)
    }

    pub fn suffix(self) -> &'static str {
        match self {
            FFmt::Ps => "ps",
            FFmt::Pd => "pd",
            FFmt::Ss => "ss",
            FFmt::Sd => "sd",
        }
    }
}

/// Integer lane width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    D,
    Q,
}

impl Lane {
    pub fn suffix(self) -> &'static str {
        match self {
            Lane::D => "d",
            Lane::Q => "q",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FOp {
    Add,
    Mul,
    Sub,
    Min,
    Div,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LOp {
    And,
    AndN,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IOp {
    Add,
    Sub,
    Mul,
    And,
    AndN,
    Or,
    Xor,
    CmpEq,
    CmpGt,
}

/// Vector operations of the form `dst = a op b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimdOp {
    FArith(FOp, FFmt),
    /// Bitwise logic on float registers; `double` selects the pd form.
    FLogic(LOp, bool),
    /// `cmp{pred}` producing an all-ones lane mask in a vector register.
    FCmp(u8, FFmt),
    IArith(IOp, Lane),
    Unpcklpd,
    Shufps(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FmaKind {
    /// `x*y + z`
    MAdd,
    /// `x*y - z`
    MSub,
    /// `-(x*y) + z`
    NMAdd,
}

/// Operand order of an FMA: which operands are multiplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FmaOrder {
    /// `dst = dst*b ± a`
    O132,
    /// `dst = a*dst ± b`
    O213,
    /// `dst = a*b ± dst`
    O231,
}

/// Vector shift by immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VShift {
    Sll,
    Srl,
    Sra,
}

/// Vector load/store flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovKind {
    /// Full register, unaligned.
    Ups,
    Ss,
    Sd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KLogic {
    And,
    AndN,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Or,
    And,
    Sub,
    Xor,
    Cmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GprShift {
    Shl,
    Shr,
    Sar,
}

/// Operand kind of an AVX-512 compare into an opmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpKind {
    Float(FFmt),
    Int(Lane),
}

// ─── Instructions ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    // ── Vector arithmetic ──
    Simd {
        op: SimdOp,
        dst: VReg,
        a: VReg,
        b: RegMem,
    },
    Fma {
        kind: FmaKind,
        order: FmaOrder,
        fmt: FFmt,
        dst: VReg,
        a: VReg,
        b: RegMem,
    },
    Sqrt {
        fmt: FFmt,
        dst: VReg,
        src: RegMem,
    },
    /// AVX-512 compare into an opmask.
    CmpK {
        kind: CmpKind,
        pred: u8,
        dst: KReg,
        a: VReg,
        b: RegMem,
    },
    /// `dst = k ? b : a` per lane.
    BlendK {
        double: bool,
        dst: VReg,
        a: VReg,
        b: RegMem,
        k: KReg,
    },
    /// `dst = mask ? b : a` per lane (sign bit of each mask lane).
    Blendv {
        double: bool,
        dst: VReg,
        a: VReg,
        b: RegMem,
        mask: VReg,
    },
    Shift {
        op: VShift,
        lane: Lane,
        dst: VReg,
        src: VReg,
        imm: u8,
    },

    // ── Vector moves ──
    Load {
        kind: MovKind,
        dst: VReg,
        src: Mem,
    },
    Store {
        kind: MovKind,
        dst: Mem,
        src: VReg,
    },
    MovReg {
        dst: VReg,
        src: VReg,
    },
    /// Replicate the low element of `src` into every lane of `dst`.
    Broadcast {
        double: bool,
        dst: VReg,
        src: RegMem,
    },

    // ── Opmask ──
    KLoad {
        dst: KReg,
        src: Mem,
    },
    KStore {
        dst: Mem,
        src: KReg,
    },
    KOp {
        op: KLogic,
        dst: KReg,
        a: KReg,
        b: KReg,
    },
    KNot {
        dst: KReg,
        src: KReg,
    },

    // ── Scalar conversion and flags ──
    CvtSi2F {
        double: bool,
        w64: bool,
        dst: VReg,
        src: Gpr,
    },
    CvttF2Si {
        double: bool,
        w64: bool,
        dst: Gpr,
        src: RegMem,
    },
    /// Scalar precision change: `cvtss2sd` when `to_double`, else `cvtsd2ss`.
    CvtF2F {
        to_double: bool,
        dst: VReg,
        src: RegMem,
    },
    Ucomi {
        double: bool,
        a: VReg,
        b: RegMem,
    },
    MovMsk {
        double: bool,
        dst: Gpr,
        src: VReg,
    },

    // ── General-purpose ──
    Mov {
        w64: bool,
        dst: Gpr,
        src: GprSrc,
    },
    StoreGpr {
        w64: bool,
        dst: Mem,
        src: Gpr,
    },
    Movsxd {
        dst: Gpr,
        src: GprSrc,
    },
    Alu {
        op: AluOp,
        w64: bool,
        dst: Gpr,
        src: GprSrc,
    },
    Imul {
        w64: bool,
        dst: Gpr,
        src: GprSrc,
    },
    ShiftGpr {
        op: GprShift,
        w64: bool,
        dst: Gpr,
        imm: u8,
    },
    Neg {
        w64: bool,
        dst: Gpr,
    },
    Test {
        w64: bool,
        a: Gpr,
        b: Gpr,
    },
    Push(Gpr),
    Pop(Gpr),
    Ret,
    Vzeroupper,

    // ── Control flow ──
    Label(Label),
    Jmp(Label),
    Jcc(Cond, Label),
}

/// Raw bytes of one constant-pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstData {
    pub bytes: Vec<u8>,
    pub align: u32,
}

/// A complete instruction stream plus the constants it references.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub insts: Vec<Inst>,
    pub consts: Vec<ConstData>,
    /// Vector instructions assemble to VEX/EVEX forms (any AVX level).
    pub vex: bool,
}

impl Program {
    /// One instruction per line in the syntax of its encoding, labels
    /// flush left.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for inst in &self.insts {
            match inst {
                Inst::Label(l) => out.push_str(&format!("{}:\n", l)),
                other => out.push_str(&format!("    {}\n", other.asm(self.vex))),
            }
        }
        out
    }
}

// ─── Display ──────────────────────────────────────────────────────

fn gpr_name(r: Gpr, w64: bool) -> String {
    if w64 {
        return r.to_string();
    }
    match r.0 {
        0..=7 => format!("e{}", &GPR_NAMES[r.0 as usize][1..]),
        n => format!("r{}d", n),
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Simd { op, dst, a, b } => {
                let name = match op {
                    SimdOp::FArith(op, fmt) => {
                        let base = match op {
                            FOp::Add => "add",
                            FOp::Mul => "mul",
                            FOp::Sub => "sub",
                            FOp::Min => "min",
                            FOp::Div => "div",
                            FOp::Max => "max",
                        };
                        format!("{}{}", base, fmt.suffix())
                    }
                    SimdOp::FLogic(op, double) => {
                        let base = match op {
                            LOp::And => "and",
                            LOp::AndN => "andn",
                            LOp::Or => "or",
                            LOp::Xor => "xor",
                        };
                        format!("{}{}", base, if *double { "pd" } else { "ps" })
                    }
                    SimdOp::FCmp(pred, fmt) => format!("cmp{}{}", pred, fmt.suffix()),
                    SimdOp::IArith(op, lane) => {
                        let base = match op {
                            IOp::Add => "padd",
                            IOp::Sub => "psub",
                            IOp::Mul => "pmull",
                            IOp::And => "pand",
                            IOp::AndN => "pandn",
                            IOp::Or => "por",
                            IOp::Xor => "pxor",
                            IOp::CmpEq => "pcmpeq",
                            IOp::CmpGt => "pcmpgt",
                        };
                        format!("{}{}", base, lane.suffix())
                    }
                    SimdOp::Unpcklpd => "unpcklpd".to_string(),
                    SimdOp::Shufps(imm) => format!("shufps.{}", imm),
                };
                write!(f, "{} {}, {}, {}", name, dst, a, b)
            }
            Inst::Fma {
                kind,
                order,
                fmt,
                dst,
                a,
                b,
            } => {
                let kind = match kind {
                    FmaKind::MAdd => "fmadd",
                    FmaKind::MSub => "fmsub",
                    FmaKind::NMAdd => "fnmadd",
                };
                let order = match order {
                    FmaOrder::O132 => "132",
                    FmaOrder::O213 => "213",
                    FmaOrder::O231 => "231",
                };
                write!(f, "v{}{}{} {}, {}, {}", kind, order, fmt.suffix(), dst, a, b)
            }
            Inst::Sqrt { fmt, dst, src } => write!(f, "sqrt{} {}, {}", fmt.suffix(), dst, src),
            Inst::CmpK {
                kind,
                pred,
                dst,
                a,
                b,
            } => match kind {
                CmpKind::Float(fmt) => {
                    write!(f, "vcmp{}{} {}, {}, {}", pred, fmt.suffix(), dst, a, b)
                }
                CmpKind::Int(lane) => {
                    write!(f, "vpcmp{}{} {}, {}, {}", pred, lane.suffix(), dst, a, b)
                }
            },
            Inst::BlendK {
                double,
                dst,
                a,
                b,
                k,
            } => write!(
                f,
                "vblendm{} {} {{{}}}, {}, {}",
                if *double { "pd" } else { "ps" },
                dst,
                k,
                a,
                b
            ),
            Inst::Blendv {
                double,
                dst,
                a,
                b,
                mask,
            } => write!(
                f,
                "vblendv{} {}, {}, {}, {}",
                if *double { "pd" } else { "ps" },
                dst,
                a,
                b,
                mask
            ),
            Inst::Shift {
                op,
                lane,
                dst,
                src,
                imm,
            } => {
                let base = match op {
                    VShift::Sll => "psll",
                    VShift::Srl => "psrl",
                    VShift::Sra => "psra",
                };
                write!(f, "{}{} {}, {}, {}", base, lane.suffix(), dst, src, imm)
            }
            Inst::Load { kind, dst, src } => write!(f, "mov{} {}, {}", mov_suffix(*kind), dst, src),
            Inst::Store { kind, dst, src } => {
                write!(f, "mov{} {}, {}", mov_suffix(*kind), dst, src)
            }
            Inst::MovReg { dst, src } => write!(f, "movaps {}, {}", dst, src),
            Inst::Broadcast { double, dst, src } => write!(
                f,
                "vbroadcast{} {}, {}",
                if *double { "sd" } else { "ss" },
                dst,
                src
            ),
            Inst::KLoad { dst, src } => write!(f, "kmovw {}, {}", dst, src),
            Inst::KStore { dst, src } => write!(f, "kmovw {}, {}", dst, src),
            Inst::KOp { op, dst, a, b } => {
                let name = match op {
                    KLogic::And => "kandw",
                    KLogic::AndN => "kandnw",
                    KLogic::Or => "korw",
                    KLogic::Xor => "kxorw",
                };
                write!(f, "{} {}, {}, {}", name, dst, a, b)
            }
            Inst::KNot { dst, src } => write!(f, "knotw {}, {}", dst, src),
            Inst::CvtSi2F {
                double,
                w64,
                dst,
                src,
            } => write!(
                f,
                "cvtsi2{} {}, {}",
                if *double { "sd" } else { "ss" },
                dst,
                gpr_name(*src, *w64)
            ),
            Inst::CvttF2Si {
                double,
                w64,
                dst,
                src,
            } => write!(
                f,
                "cvtt{}2si {}, {}",
                if *double { "sd" } else { "ss" },
                gpr_name(*dst, *w64),
                src
            ),
            Inst::CvtF2F { to_double, dst, src } => write!(
                f,
                "{} {}, {}",
                if *to_double { "cvtss2sd" } else { "cvtsd2ss" },
                dst,
                src
            ),
            Inst::Ucomi { double, a, b } => {
                write!(f, "ucomis{} {}, {}", if *double { "d" } else { "s" }, a, b)
            }
            Inst::MovMsk { double, dst, src } => write!(
                f,
                "movmsk{} {}, {}",
                if *double { "pd" } else { "ps" },
                gpr_name(*dst, false),
                src
            ),
            Inst::Mov { w64, dst, src } => write!(f, "mov {}, {}", gpr_name(*dst, *w64), src),
            Inst::StoreGpr { w64, dst, src } => {
                write!(f, "mov {}, {}", dst, gpr_name(*src, *w64))
            }
            Inst::Movsxd { dst, src } => {
                let src = match src {
                    GprSrc::Reg(r) => gpr_name(*r, false),
                    other => other.to_string(),
                };
                write!(f, "movsxd {}, {}", dst, src)
            }
            Inst::Alu { op, w64, dst, src } => {
                let name = match op {
                    AluOp::Add => "add",
                    AluOp::Or => "or",
                    AluOp::And => "and",
                    AluOp::Sub => "sub",
                    AluOp::Xor => "xor",
                    AluOp::Cmp => "cmp",
                };
                let src = match src {
                    GprSrc::Reg(r) => gpr_name(*r, *w64),
                    other => other.to_string(),
                };
                write!(f, "{} {}, {}", name, gpr_name(*dst, *w64), src)
            }
            Inst::Imul { w64, dst, src } => {
                let src = match src {
                    GprSrc::Reg(r) => gpr_name(*r, *w64),
                    other => other.to_string(),
                };
                write!(f, "imul {}, {}", gpr_name(*dst, *w64), src)
            }
            Inst::ShiftGpr { op, w64, dst, imm } => {
                let name = match op {
                    GprShift::Shl => "shl",
                    GprShift::Shr => "shr",
                    GprShift::Sar => "sar",
                };
                write!(f, "{} {}, {}", name, gpr_name(*dst, *w64), imm)
            }
            Inst::Neg { w64, dst } => write!(f, "neg {}", gpr_name(*dst, *w64)),
            Inst::Test { w64, a, b } => {
                write!(f, "test {}, {}", gpr_name(*a, *w64), gpr_name(*b, *w64))
            }
            Inst::Push(r) => write!(f, "push {}", r),
            Inst::Pop(r) => write!(f, "pop {}", r),
            Inst::Ret => write!(f, "ret"),
            Inst::Vzeroupper => write!(f, "vzeroupper"),
            Inst::Label(l) => write!(f, "{}:", l),
            Inst::Jmp(l) => write!(f, "jmp {}", l),
            Inst::Jcc(c, l) => write!(f, "j{} {}", c.suffix(), l),
        }
    }
}

impl Inst {
    /// Whether the instruction is an SSE instruction, so it takes a `v`
    /// prefix when VEX or EVEX encoded.
    fn has_legacy_form(&self) -> bool {
        matches!(
            self,
            Inst::Simd { .. }
                | Inst::Sqrt { .. }
                | Inst::Shift { .. }
                | Inst::Load { .. }
                | Inst::Store { .. }
                | Inst::MovReg { .. }
                | Inst::CvtSi2F { .. }
                | Inst::CvttF2Si { .. }
                | Inst::CvtF2F { .. }
                | Inst::Ucomi { .. }
                | Inst::MovMsk { .. }
        )
    }

    /// Assembly text as encoded: `v`-prefixed with VEX/EVEX, destructive
    /// two-operand forms for legacy SSE. `Display` gives the neutral
    /// three-operand form.
    pub fn asm(&self, vex: bool) -> String {
        let text = self.to_string();
        if !self.has_legacy_form() {
            return text;
        }
        if vex {
            return format!("v{}", text);
        }
        let name = text.split_once(' ').map_or(text.as_str(), |(name, _)| name);
        match self {
            Inst::Simd { dst, a, b, .. } if dst == a => format!("{} {}, {}", name, dst, b),
            Inst::Shift { dst, src, imm, .. } if dst == src => format!("{} {}, {}", name, dst, imm),
            _ => text,
        }
    }
}

fn mov_suffix(kind: MovKind) -> &'static str {
    match kind {
        MovKind::Ups => "ups",
        MovKind::Ss => "ss",
        MovKind::Sd => "sd",
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_display() {
        assert_eq!(Gpr::RAX.to_string(), "rax");
        assert_eq!(Gpr::R11.to_string(), "r11");
        assert_eq!(VReg::new(3, Width::Y).to_string(), "ymm3");
        assert_eq!(VReg::xmm(15).to_string(), "xmm15");
        assert_eq!(KReg(2).to_string(), "k2");
        assert_eq!(gpr_name(Gpr::RCX, false), "ecx");
        assert_eq!(gpr_name(Gpr::R9, false), "r9d");
    }

    #[test]
    fn test_mem_display() {
        assert_eq!(Mem::at(Gpr::RSP, 32).to_string(), "[rsp+32]");
        assert_eq!(Mem::at(Gpr::RBP, -8).to_string(), "[rbp-8]");
        assert_eq!(Mem::constant(ConstId(4)).offset(8).to_string(), "[const4+8]");
        assert_eq!(Mem::at(Gpr::RDI, 0).to_string(), "[rdi]");
    }

    #[test]
    fn test_cond_negate_is_involution() {
        for c in [
            Cond::B,
            Cond::Ae,
            Cond::E,
            Cond::Ne,
            Cond::Be,
            Cond::A,
            Cond::P,
            Cond::Np,
            Cond::L,
            Cond::Ge,
            Cond::Le,
            Cond::G,
        ] {
            assert_eq!(c.negate().negate(), c);
            assert_ne!(c.negate(), c);
            // x86 condition codes pair up by flipping the low bit.
            assert_eq!(c as u8 ^ 1, c.negate() as u8);
        }
    }

    #[test]
    fn test_inst_display() {
        let y = |i| VReg::new(i, Width::Y);
        let add = Inst::Simd {
            op: SimdOp::FArith(FOp::Add, FFmt::Pd),
            dst: y(0),
            a: y(1),
            b: RegMem::Mem(Mem::at(Gpr::RSP, 64)),
        };
        assert_eq!(add.to_string(), "addpd ymm0, ymm1, [rsp+64]");
        let fma = Inst::Fma {
            kind: FmaKind::MAdd,
            order: FmaOrder::O231,
            fmt: FFmt::Sd,
            dst: VReg::xmm(2),
            a: VReg::xmm(0),
            b: RegMem::Reg(VReg::xmm(1)),
        };
        assert_eq!(fma.to_string(), "vfmadd231sd xmm2, xmm0, xmm1");
        let alu = Inst::Alu {
            op: AluOp::Sub,
            w64: true,
            dst: Gpr::RSP,
            src: GprSrc::Imm(128),
        };
        assert_eq!(alu.to_string(), "sub rsp, 128");
        assert_eq!(Inst::Jcc(Cond::Ae, Label(3)).to_string(), "jae .L3");
    }

    #[test]
    fn test_asm_follows_encoding() {
        let x = VReg::xmm;
        let add = Inst::Simd {
            op: SimdOp::FArith(FOp::Add, FFmt::Pd),
            dst: x(0),
            a: x(0),
            b: RegMem::Mem(Mem::at(Gpr::RSP, 32)),
        };
        assert_eq!(add.asm(false), "addpd xmm0, [rsp+32]");
        assert_eq!(add.asm(true), "vaddpd xmm0, xmm0, [rsp+32]");
        let shift = Inst::Shift {
            op: VShift::Sll,
            lane: Lane::Q,
            dst: x(1),
            src: x(1),
            imm: 52,
        };
        assert_eq!(shift.asm(false), "psllq xmm1, 52");
        assert_eq!(shift.asm(true), "vpsllq xmm1, xmm1, 52");
        let load = Inst::Load {
            kind: MovKind::Ups,
            dst: VReg::new(15, Width::Y),
            src: Mem::at(Gpr::RAX, 0),
        };
        assert_eq!(load.asm(true), "vmovups ymm15, [rax]");
        // Already VEX-only mnemonics keep their name.
        let blend = Inst::Blendv {
            double: true,
            dst: x(0),
            a: x(1),
            b: RegMem::Reg(x(2)),
            mask: x(3),
        };
        assert_eq!(blend.asm(true), "vblendvpd xmm0, xmm1, xmm2, xmm3");
        assert_eq!(Inst::Ret.asm(true), "ret");
    }

    #[test]
    fn test_listing() {
        let program = Program {
            insts: vec![
                Inst::Label(Label(0)),
                Inst::Mov {
                    w64: false,
                    dst: Gpr::RAX,
                    src: GprSrc::Imm(1),
                },
                Inst::Ret,
            ],
            consts: Vec::new(),
            vex: false,
        };
        insta::assert_snapshot!(program.listing(), @r"
        .L0:
            mov eax, 1
            ret
        ");
    }
}
