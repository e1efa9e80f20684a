//! Builtin functions and type constructors.

use crate::diagnostic::Diagnostic;
use crate::span::Span;
use crate::types::{self, Ty};

use super::expr::{adopts, describe, InferTy};

/// Every builtin function name; helpers may not reuse them.
pub const BUILTINS: &[&str] = &[
    "select", "sqrt", "abs", "round", "floor", "pow2i", "min", "max", "fma", "as_int", "as_float",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

pub(super) fn arity(name: &str, want: usize, got: usize, span: Span) -> Result<(), Diagnostic> {
    if want == got {
        return Ok(());
    }
    Err(Diagnostic::error(
        format!(
            "'{}' expects {} argument{}, found {}",
            name,
            want,
            if want == 1 { "" } else { "s" },
            got
        ),
        span,
    ))
}

fn float_operand(name: &str, t: InferTy, span: Span) -> Result<InferTy, Diagnostic> {
    match t {
        InferTy::Unknown => Ok(t),
        InferTy::Lit { .. } => Ok(InferTy::Known(&types::FLOAT64)),
        InferTy::Known(ty) if ty.is_float() => Ok(t),
        other => Err(Diagnostic::error(
            format!("'{}' expects a float operand, found {}", name, describe(other)),
            span,
        )),
    }
}

/// Unify operands that must share one float type. Constants adopt it; if
/// every operand is a constant the type is float64.
fn same_float(name: &str, args: &[InferTy], span: Span) -> Result<InferTy, Diagnostic> {
    if args.contains(&InferTy::Unknown) {
        return Ok(InferTy::Unknown);
    }
    let mut ty: Option<Ty> = None;
    for arg in args {
        if let InferTy::Known(t) = arg {
            match ty {
                None => ty = Some(*t),
                Some(prev) if prev == *t => {}
                Some(prev) => {
                    return Err(Diagnostic::error(
                        format!("'{}' expects operands of one type, found {} and {}", name, prev, t),
                        span,
                    ))
                }
            }
        }
    }
    float_operand(name, ty.map(InferTy::Known).unwrap_or(InferTy::Lit { float: true }), span)
}

/// Result type of a builtin call, or `None` if `name` is not a builtin.
pub(super) fn builtin_ty(name: &str, args: &[InferTy], span: Span) -> Option<Result<InferTy, Diagnostic>> {
    let result = match name {
        "sqrt" | "abs" | "round" | "floor" | "pow2i" => {
            arity(name, 1, args.len(), span).and_then(|_| float_operand(name, args[0], span))
        }
        "min" | "max" => arity(name, 2, args.len(), span).and_then(|_| same_float(name, args, span)),
        "fma" => arity(name, 3, args.len(), span).and_then(|_| same_float(name, args, span)),
        "select" => arity(name, 3, args.len(), span).and_then(|_| select_ty(args, span)),
        "as_int" | "as_float" => arity(name, 1, args.len(), span).and_then(|_| reinterpret_ty(name, args[0], span)),
        _ => return None,
    };
    Some(result)
}

/// `select(a, b, mask)`: lanes of `a` where the mask is set, else `b`.
fn select_ty(args: &[InferTy], span: Span) -> Result<InferTy, Diagnostic> {
    let mask = match args[2] {
        InferTy::Unknown => return Ok(InferTy::Unknown),
        InferTy::Known(m) if m.is_mask() => m,
        other => {
            return Err(Diagnostic::error(
                format!("the third argument of 'select' must be a mask, found {}", describe(other)),
                span,
            ))
        }
    };
    let value = match (args[0], args[1]) {
        (InferTy::Unknown, _) | (_, InferTy::Unknown) => return Ok(InferTy::Unknown),
        (InferTy::Known(a), InferTy::Known(b)) if a != b => {
            return Err(Diagnostic::error(
                format!("'select' branches have different types {} and {}", a, b),
                span,
            ))
        }
        (InferTy::Known(t), other) | (other, InferTy::Known(t)) => {
            if let InferTy::Lit { float } = other {
                if !adopts(float, t) {
                    return Err(Diagnostic::error(
                        format!("float constant cannot be selected into {}", t),
                        span,
                    ));
                }
            }
            t
        }
        (InferTy::Lit { float: a }, InferTy::Lit { float: b }) => {
            let elem = if a || b {
                mask.elem.as_float()
            } else {
                mask.elem.as_int()
            };
            types::vector(elem, mask.lanes).unwrap_or(mask.compared_type())
        }
    };
    if value.is_mask() || (value.is_int() && value.is_scalar()) {
        return Err(Diagnostic::error(
            format!("'select' is not supported for {}", value),
            span,
        ));
    }
    if value.mask_of() != mask {
        return Err(Diagnostic::error(
            format!("a {} mask cannot select between {} values", mask, value),
            span,
        )
        .with_help("the mask must come from comparing values with the same lane layout".to_string()));
    }
    Ok(InferTy::Known(value))
}

/// `as_int`/`as_float`: same bits, element kind swapped.
fn reinterpret_ty(name: &str, arg: InferTy, span: Span) -> Result<InferTy, Diagnostic> {
    let want_float_input = name == "as_int";
    match arg {
        InferTy::Unknown => Ok(arg),
        InferTy::Known(t) if !t.is_mask() && t.elem.is_float() == want_float_input => {
            let elem = if want_float_input {
                t.elem.as_int()
            } else {
                t.elem.as_float()
            };
            t.with_elem(elem).map(InferTy::Known).ok_or_else(|| {
                Diagnostic::error(format!("'{}' is not defined for {}", name, t), span)
            })
        }
        other => Err(Diagnostic::error(
            format!(
                "'{}' expects {} operand, found {}",
                name,
                if want_float_input { "a float" } else { "an integer" },
                describe(other)
            ),
            span,
        )),
    }
}

/// `T(x)`: a typed constant, identity, scalar broadcast, or a lane-wise
/// numeric conversion.
pub(super) fn constructor_ty(target: Ty, args: &[InferTy], span: Span) -> Result<InferTy, Diagnostic> {
    if target.is_mask() {
        return Err(Diagnostic::error(
            format!("mask type {} cannot be constructed", target),
            span,
        )
        .with_help("masks come from comparisons".to_string()));
    }
    arity(target.name, 1, args.len(), span)?;
    match args[0] {
        InferTy::Unknown => Ok(InferTy::Known(target)),
        InferTy::Lit { .. } => Ok(InferTy::Known(target)),
        InferTy::Known(from) => {
            let ok = !from.is_mask() && (from == target || from.is_scalar() || from.lanes == target.lanes);
            if ok {
                Ok(InferTy::Known(target))
            } else {
                Err(Diagnostic::error(
                    format!("cannot convert {} to {}", from, target),
                    span,
                ))
            }
        }
    }
}
