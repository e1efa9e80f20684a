//! Host-side values passed to and returned from kernels.

use std::fmt;

use crate::types::{self, Elem, Ty};

/// Lane storage of a host value.
#[derive(Clone, Debug, PartialEq)]
pub enum Lanes {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl Lanes {
    pub fn len(&self) -> usize {
        match self {
            Lanes::F32(v) => v.len(),
            Lanes::F64(v) => v.len(),
            Lanes::I32(v) => v.len(),
            Lanes::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn elem(&self) -> Elem {
        match self {
            Lanes::F32(_) => Elem::F32,
            Lanes::F64(_) => Elem::F64,
            Lanes::I32(_) => Elem::I32,
            Lanes::I64(_) => Elem::I64,
        }
    }
}

/// Rejected host values and arguments.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeError {
    /// Masks exist only inside kernels.
    Mask(Ty),
    Element { ty: Ty, found: &'static str },
    LaneCount { ty: Ty, found: usize },
    Parse { ty: Ty, text: String },
    Arity {
        kernel: String,
        expected: usize,
        found: usize,
    },
    Argument {
        kernel: String,
        index: usize,
        expected: Ty,
        found: Ty,
    },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Mask(ty) => write!(f, "{} values cannot be passed to or from kernels", ty),
            TypeError::Element { ty, found } => {
                write!(f, "{} holds {} lanes, found {} lanes", ty, elem_name(ty.elem), found)
            }
            TypeError::LaneCount { ty, found } => {
                write!(f, "{} has {} lanes, found {}", ty, ty.lanes, found)
            }
            TypeError::Parse { ty, text } => write!(f, "cannot read '{}' as {}", text, ty),
            TypeError::Arity {
                kernel,
                expected,
                found,
            } => write!(f, "'{}' takes {} arguments, found {}", kernel, expected, found),
            TypeError::Argument {
                kernel,
                index,
                expected,
                found,
            } => write!(
                f,
                "argument {} of '{}' must be {}, found {}",
                index + 1,
                kernel,
                expected,
                found
            ),
        }
    }
}

impl std::error::Error for TypeError {}

fn elem_name(elem: Elem) -> &'static str {
    match elem {
        Elem::F32 => "float32",
        Elem::F64 => "float64",
        Elem::I32 => "int32",
        Elem::I64 => "int64",
    }
}

/// A typed host value: a descriptor plus one entry per lane.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    ty: Ty,
    lanes: Lanes,
}

impl Value {
    /// Check `lanes` against `ty`.
    pub fn new(ty: Ty, lanes: Lanes) -> Result<Value, TypeError> {
        if ty.is_mask() {
            return Err(TypeError::Mask(ty));
        }
        if lanes.elem() != ty.elem {
            return Err(TypeError::Element {
                ty,
                found: elem_name(lanes.elem()),
            });
        }
        if lanes.len() != ty.lanes as usize {
            return Err(TypeError::LaneCount {
                ty,
                found: lanes.len(),
            });
        }
        Ok(Value { ty, lanes })
    }

    pub fn f32(x: f32) -> Value {
        Value {
            ty: &types::FLOAT32,
            lanes: Lanes::F32(vec![x]),
        }
    }

    pub fn f64(x: f64) -> Value {
        Value {
            ty: &types::FLOAT64,
            lanes: Lanes::F64(vec![x]),
        }
    }

    pub fn i32(x: i32) -> Value {
        Value {
            ty: &types::INT32,
            lanes: Lanes::I32(vec![x]),
        }
    }

    pub fn i64(x: i64) -> Value {
        Value {
            ty: &types::INT64,
            lanes: Lanes::I64(vec![x]),
        }
    }

    /// A value of `ty` from numbers, each converted to the element type.
    /// Integer lanes must hold integral numbers.
    pub fn from_f64s(ty: Ty, xs: &[f64]) -> Result<Value, TypeError> {
        let lanes = match ty.elem {
            Elem::F32 => Lanes::F32(xs.iter().map(|x| *x as f32).collect()),
            Elem::F64 => Lanes::F64(xs.to_vec()),
            Elem::I32 | Elem::I64 => {
                if let Some(bad) = xs.iter().find(|x| x.fract() != 0.0 || !x.is_finite()) {
                    return Err(TypeError::Parse {
                        ty,
                        text: bad.to_string(),
                    });
                }
                match ty.elem {
                    Elem::I32 => Lanes::I32(xs.iter().map(|x| *x as i32).collect()),
                    _ => Lanes::I64(xs.iter().map(|x| *x as i64).collect()),
                }
            }
        };
        Value::new(ty, lanes)
    }

    /// `x` in every lane of `ty`.
    pub fn splat(ty: Ty, x: f64) -> Result<Value, TypeError> {
        Value::from_f64s(ty, &vec![x; ty.lanes as usize])
    }

    /// Read a value from text: one number for every lane, or a
    /// comma-separated list with one number per lane.
    pub fn parse(ty: Ty, text: &str) -> Result<Value, TypeError> {
        let parse_err = || TypeError::Parse {
            ty,
            text: text.to_string(),
        };
        let xs = text
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|_| parse_err())?;
        match xs.as_slice() {
            [x] => Value::splat(ty, *x),
            _ => Value::from_f64s(ty, &xs),
        }
    }

    pub fn ty(&self) -> Ty {
        self.ty
    }

    pub fn lanes(&self) -> &Lanes {
        &self.lanes
    }

    /// Every lane widened to `f64`.
    pub fn to_f64s(&self) -> Vec<f64> {
        match &self.lanes {
            Lanes::F32(v) => v.iter().map(|x| *x as f64).collect(),
            Lanes::F64(v) => v.clone(),
            Lanes::I32(v) => v.iter().map(|x| *x as f64).collect(),
            Lanes::I64(v) => v.iter().map(|x| *x as f64).collect(),
        }
    }

    pub fn lane(&self, i: usize) -> Option<f64> {
        self.to_f64s().get(i).copied()
    }

    /// Write the in-memory image kernels expect: lanes packed from
    /// offset 0, the rest of `out` untouched.
    pub(crate) fn write_image(&self, out: &mut [u8]) {
        let mut put = |i: usize, bytes: &[u8]| {
            let at = i * bytes.len();
            out[at..at + bytes.len()].copy_from_slice(bytes);
        };
        match &self.lanes {
            Lanes::F32(v) => v.iter().enumerate().for_each(|(i, x)| put(i, &x.to_le_bytes())),
            Lanes::F64(v) => v.iter().enumerate().for_each(|(i, x)| put(i, &x.to_le_bytes())),
            Lanes::I32(v) => v.iter().enumerate().for_each(|(i, x)| put(i, &x.to_le_bytes())),
            Lanes::I64(v) => v.iter().enumerate().for_each(|(i, x)| put(i, &x.to_le_bytes())),
        }
    }

    /// Inverse of `write_image`.
    pub(crate) fn read_image(ty: Ty, bytes: &[u8]) -> Value {
        let n = ty.lanes as usize;
        let chunk = |i: usize, w: usize| &bytes[i * w..(i + 1) * w];
        let lanes = match ty.elem {
            Elem::F32 => Lanes::F32(
                (0..n)
                    .map(|i| f32::from_le_bytes(word4(chunk(i, 4))))
                    .collect(),
            ),
            Elem::F64 => Lanes::F64(
                (0..n)
                    .map(|i| f64::from_le_bytes(word8(chunk(i, 8))))
                    .collect(),
            ),
            Elem::I32 => Lanes::I32(
                (0..n)
                    .map(|i| i32::from_le_bytes(word4(chunk(i, 4))))
                    .collect(),
            ),
            Elem::I64 => Lanes::I64(
                (0..n)
                    .map(|i| i64::from_le_bytes(word8(chunk(i, 8))))
                    .collect(),
            ),
        };
        Value { ty, lanes }
    }
}

fn word4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

fn word8(b: &[u8]) -> [u8; 8] {
    [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lanes: Vec<String> = match &self.lanes {
            Lanes::F32(v) => v.iter().map(|x| x.to_string()).collect(),
            Lanes::F64(v) => v.iter().map(|x| x.to_string()).collect(),
            Lanes::I32(v) => v.iter().map(|x| x.to_string()).collect(),
            Lanes::I64(v) => v.iter().map(|x| x.to_string()).collect(),
        };
        if self.ty.is_scalar() {
            write!(f, "{}", lanes.join(", "))
        } else {
            write!(f, "{}({})", self.ty, lanes.join(", "))
        }
    }
}
