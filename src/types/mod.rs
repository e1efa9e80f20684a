//! Type descriptors: one immutable descriptor per machine value
//! representation (scalars, fixed-width vectors and their masks).
//!
//! Descriptors live in a static table and are handed around as
//! `Ty = &'static TypeDescriptor`. Everything that depends on the CPU
//! (register class, part count, calling convention) is computed from a
//! `FeatureSet` on demand.

mod caps;
#[cfg(test)]
mod tests;

pub use caps::OperandKind;

use std::fmt;

use crate::target::FeatureSet;

pub type Ty = &'static TypeDescriptor;

// ─── Element ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Elem {
    F32,
    F64,
    I32,
    I64,
}

impl Elem {
    pub fn bytes(self) -> u32 {
        match self {
            Elem::F32 | Elem::I32 => 4,
            Elem::F64 | Elem::I64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Elem::F32 | Elem::F64)
    }

    pub fn is_double(self) -> bool {
        self.bytes() == 8
    }

    /// The integer element of the same width.
    pub fn as_int(self) -> Elem {
        match self {
            Elem::F32 | Elem::I32 => Elem::I32,
            Elem::F64 | Elem::I64 => Elem::I64,
        }
    }

    /// The float element of the same width.
    pub fn as_float(self) -> Elem {
        match self {
            Elem::F32 | Elem::I32 => Elem::F32,
            Elem::F64 | Elem::I64 => Elem::F64,
        }
    }
}

// ─── Register classes ─────────────────────────────────────────────

/// Vector register width: xmm, ymm or zmm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Width {
    X,
    Y,
    Z,
}

impl Width {
    pub fn bytes(self) -> u32 {
        match self {
            Width::X => 16,
            Width::Y => 32,
            Width::Z => 64,
        }
    }

    pub fn from_bytes(bytes: u32) -> Width {
        match bytes {
            0..=16 => Width::X,
            17..=32 => Width::Y,
            _ => Width::Z,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            Width::X => 'x',
            Width::Y => 'y',
            Width::Z => 'z',
        }
    }
}

/// The register class a value is accumulated in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegClass {
    Gpr,
    Vec(Width),
    /// AVX-512 opmask register.
    K,
}

impl fmt::Display for RegClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegClass::Gpr => f.write_str("general-purpose"),
            RegClass::Vec(w) => write!(f, "{}mm", w.prefix()),
            RegClass::K => f.write_str("mask"),
        }
    }
}

/// How a value is split across registers at a feature level.
///
/// Part `i` lives at byte offset `i * part_bytes` of the value's memory
/// image; a single-register value has `parts == 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    pub class: RegClass,
    pub parts: u32,
    pub part_bytes: u32,
}

impl Layout {
    pub fn is_multi_part(&self) -> bool {
        self.parts > 1
    }
}

/// Calling convention class of a kernel argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Passing {
    /// Fits one register at the level.
    Register,
    /// Multi-part: passed by pointer and loaded part by part.
    Pointer,
}

// ─── Descriptor ───────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub elem: Elem,
    pub lanes: u32,
    /// Comparison result; lanes are all-ones or all-zeros of `elem` width.
    pub mask: bool,
}

impl TypeDescriptor {
    pub fn is_scalar(&self) -> bool {
        self.lanes == 1
    }

    pub fn is_vector(&self) -> bool {
        self.lanes > 1
    }

    pub fn is_float(&self) -> bool {
        !self.mask && self.elem.is_float()
    }

    pub fn is_int(&self) -> bool {
        !self.mask && !self.elem.is_float()
    }

    pub fn is_mask(&self) -> bool {
        self.mask
    }

    pub fn elem_bytes(&self) -> u32 {
        self.elem.bytes()
    }

    /// Logical size: lanes times element width.
    pub fn size(&self) -> u32 {
        self.lanes * self.elem.bytes()
    }

    /// Storage size; 3-lane vectors round up to the next power of two.
    pub fn stack_size(&self) -> u32 {
        self.size().next_power_of_two()
    }

    pub fn stack_align(&self) -> u32 {
        self.stack_size().max(16)
    }

    /// Bytes a spilled value occupies; registers are never narrower
    /// than 16 bytes.
    pub fn slot_size(&self) -> u32 {
        self.stack_size().max(16)
    }

    /// The mask type produced by comparing two values of this type.
    pub fn mask_of(&self) -> Ty {
        mask(self.elem.bytes(), self.lanes).unwrap_or(&MASK64X1)
    }

    /// The scalar type of one lane.
    pub fn scalar_of(&self) -> Ty {
        if self.mask {
            return self.mask_of_lanes(1);
        }
        vector(self.elem, 1).unwrap_or(&FLOAT64)
    }

    fn mask_of_lanes(&self, lanes: u32) -> Ty {
        mask(self.elem.bytes(), lanes).unwrap_or(&MASK64X1)
    }

    /// Same lane count with a different element type.
    pub fn with_elem(&self, elem: Elem) -> Option<Ty> {
        vector(elem, self.lanes)
    }

    /// The value type whose comparisons produce this mask (float flavour).
    pub fn compared_type(&self) -> Ty {
        vector(self.elem.as_float(), self.lanes).unwrap_or(&FLOAT64)
    }

    pub fn layout(&self, fs: &FeatureSet) -> Layout {
        if self.is_int() && self.is_scalar() {
            return Layout {
                class: RegClass::Gpr,
                parts: 1,
                part_bytes: self.elem.bytes(),
            };
        }
        let bytes = self.stack_size();
        if bytes == 64 && fs.avx512f {
            let class = if self.mask {
                RegClass::K
            } else {
                RegClass::Vec(Width::Z)
            };
            return Layout {
                class,
                parts: 1,
                part_bytes: 64,
            };
        }
        let wide = if self.is_int() { fs.avx2 } else { fs.avx };
        let max_part = if wide { 32 } else { 16 };
        let part_bytes = bytes.max(16).min(max_part);
        Layout {
            class: RegClass::Vec(Width::from_bytes(part_bytes)),
            parts: bytes.max(16) / part_bytes,
            part_bytes,
        }
    }

    /// Register class the value accumulates in at this feature set.
    pub fn acum_type(&self, fs: &FeatureSet) -> RegClass {
        self.layout(fs).class
    }

    pub fn passing(&self, fs: &FeatureSet) -> Passing {
        if self.layout(fs).is_multi_part() {
            Passing::Pointer
        } else {
            Passing::Register
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ─── Static table ─────────────────────────────────────────────────

macro_rules! descriptors {
    ($($ident:ident = $name:literal, $elem:ident, $lanes:literal, $mask:literal;)*) => {
        $(
            pub static $ident: TypeDescriptor = TypeDescriptor {
                name: $name,
                elem: Elem::$elem,
                lanes: $lanes,
                mask: $mask,
            };
        )*
        static ALL: &[&TypeDescriptor] = &[$(&$ident),*];
    };
}

descriptors! {
    FLOAT32 = "float32", F32, 1, false;
    FLOAT32X2 = "float32x2", F32, 2, false;
    FLOAT32X3 = "float32x3", F32, 3, false;
    FLOAT32X4 = "float32x4", F32, 4, false;
    FLOAT32X8 = "float32x8", F32, 8, false;
    FLOAT32X16 = "float32x16", F32, 16, false;
    FLOAT64 = "float64", F64, 1, false;
    FLOAT64X2 = "float64x2", F64, 2, false;
    FLOAT64X3 = "float64x3", F64, 3, false;
    FLOAT64X4 = "float64x4", F64, 4, false;
    FLOAT64X8 = "float64x8", F64, 8, false;
    INT32 = "int32", I32, 1, false;
    INT32X2 = "int32x2", I32, 2, false;
    INT32X3 = "int32x3", I32, 3, false;
    INT32X4 = "int32x4", I32, 4, false;
    INT32X8 = "int32x8", I32, 8, false;
    INT32X16 = "int32x16", I32, 16, false;
    INT64 = "int64", I64, 1, false;
    INT64X2 = "int64x2", I64, 2, false;
    INT64X3 = "int64x3", I64, 3, false;
    INT64X4 = "int64x4", I64, 4, false;
    INT64X8 = "int64x8", I64, 8, false;
    MASK32X1 = "mask32", I32, 1, true;
    MASK32X2 = "mask32x2", I32, 2, true;
    MASK32X3 = "mask32x3", I32, 3, true;
    MASK32X4 = "mask32x4", I32, 4, true;
    MASK32X8 = "mask32x8", I32, 8, true;
    MASK32X16 = "mask32x16", I32, 16, true;
    MASK64X1 = "mask64", I64, 1, true;
    MASK64X2 = "mask64x2", I64, 2, true;
    MASK64X3 = "mask64x3", I64, 3, true;
    MASK64X4 = "mask64x4", I64, 4, true;
    MASK64X8 = "mask64x8", I64, 8, true;
}

/// Every descriptor, value types first.
pub fn all() -> impl Iterator<Item = Ty> {
    ALL.iter().copied()
}

/// Descriptor by name (`float64x4`, `int32`, `mask32x8`, ...).
pub fn lookup(name: &str) -> Option<Ty> {
    all().find(|ty| ty.name == name)
}

/// Value type with the given element and lane count.
pub fn vector(elem: Elem, lanes: u32) -> Option<Ty> {
    all().find(|ty| !ty.mask && ty.elem == elem && ty.lanes == lanes)
}

/// Mask type for `lane_bytes`-wide lanes.
pub fn mask(lane_bytes: u32, lanes: u32) -> Option<Ty> {
    all().find(|ty| ty.mask && ty.elem.bytes() == lane_bytes && ty.lanes == lanes)
}

/// Float types the kernel library is instantiated for.
pub fn float_types() -> impl Iterator<Item = Ty> {
    all().filter(|ty| ty.is_float())
}
