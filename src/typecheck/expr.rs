//! Expression typing, literal adoption and constant folding.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::span::{Span, Spanned};
use crate::target::FeatureSet;
use crate::types::{self, Ty};

use super::builtins;
use super::Signature;

/// The type of an expression while inference is still running.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InferTy {
    /// Depends on a variable no assignment has typed yet.
    Unknown,
    /// A numeric constant with no type of its own; it adopts the type of
    /// whatever it meets.
    Lit { float: bool },
    Known(Ty),
}

impl InferTy {
    /// The type a value of this kind ends up with when nothing else
    /// decides: float constants are float64, integer constants int32.
    pub fn resolve(self) -> Option<Ty> {
        match self {
            InferTy::Unknown => None,
            InferTy::Lit { float: true } => Some(&types::FLOAT64),
            InferTy::Lit { float: false } => Some(&types::INT32),
            InferTy::Known(ty) => Some(ty),
        }
    }

    /// Merge a newly seen assignment into a variable's type. Conflicting
    /// concrete types keep the first; the check pass reports the clash.
    pub(super) fn merge(self, other: InferTy) -> InferTy {
        match (self, other) {
            (InferTy::Unknown, t) | (t, InferTy::Unknown) => t,
            (InferTy::Lit { float: a }, InferTy::Lit { float: b }) => InferTy::Lit { float: a || b },
            (InferTy::Lit { .. }, k @ InferTy::Known(_)) => k,
            (k @ InferTy::Known(_), _) => k,
        }
    }
}

/// Whether a constant may stand in for a value of `ty`.
pub(super) fn adopts(float: bool, ty: Ty) -> bool {
    !ty.is_mask() && (!float || ty.elem.is_float())
}

/// Names that denote float constants when no variable shadows them.
pub fn named_constant(name: &str) -> Option<Literal> {
    match name {
        "inf" => Some(Literal::Float(f64::INFINITY)),
        "nan" => Some(Literal::Float(f64::NAN)),
        _ => None,
    }
}

/// Fold an expression built only from constants. Integer `+ - *` and the
/// bit operators stay integral; `/` always yields a float.
pub fn const_eval(expr: &Expr) -> Option<Literal> {
    match expr {
        Expr::Literal(lit) => Some(*lit),
        Expr::Var(name) => named_constant(name),
        Expr::Unary { op, expr } => {
            let v = const_eval(&expr.node)?;
            match (op, v) {
                (UnaryOp::Pos, v) => Some(v),
                (UnaryOp::Neg, Literal::Integer(i)) => Some(Literal::Integer(-i)),
                (UnaryOp::Neg, Literal::Float(f)) => Some(Literal::Float(-f)),
                _ => None,
            }
        }
        Expr::BinOp { op, lhs, rhs } => {
            let a = const_eval(&lhs.node)?;
            let b = const_eval(&rhs.node)?;
            fold_binary(*op, a, b)
        }
        _ => None,
    }
}

fn fold_binary(op: BinOp, a: Literal, b: Literal) -> Option<Literal> {
    let float = |l: Literal| match l {
        Literal::Integer(i) => i as f64,
        Literal::Float(f) => f,
    };
    if let (Literal::Integer(x), Literal::Integer(y)) = (a, b) {
        let v = match op {
            BinOp::Add => x.checked_add(y)?,
            BinOp::Sub => x.checked_sub(y)?,
            BinOp::Mul => x.checked_mul(y)?,
            BinOp::BitAnd => x & y,
            BinOp::BitOr => x | y,
            BinOp::BitXor => x ^ y,
            BinOp::Shl if (0..64).contains(&y) => x.checked_shl(y as u32)?,
            BinOp::Shr if (0..64).contains(&y) => x >> y,
            BinOp::Div => return Some(Literal::Float(x as f64 / y as f64)),
            _ => return None,
        };
        return Some(Literal::Integer(v));
    }
    let (x, y) = (float(a), float(b));
    let v = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        _ => return None,
    };
    Some(Literal::Float(v))
}

/// A constant integer (shift counts, lane indices).
pub(super) fn const_int(expr: &Expr) -> Option<i128> {
    match const_eval(expr)? {
        Literal::Integer(i) => Some(i),
        Literal::Float(_) => None,
    }
}

/// What an expression may refer to.
pub(super) struct Env<'a> {
    pub vars: &'a BTreeMap<String, InferTy>,
    /// Variables assigned on every path so far; `None` while inferring.
    pub defined: Option<&'a BTreeSet<String>>,
    pub helpers: &'a HashMap<String, Signature>,
}

fn err(message: String, span: Span) -> Diagnostic {
    Diagnostic::error(message, span)
}

/// Type of an expression in value position.
pub(super) fn expr_ty(env: &Env<'_>, expr: &Spanned<Expr>) -> Result<InferTy, Diagnostic> {
    match &expr.node {
        Expr::Literal(Literal::Float(_)) => Ok(InferTy::Lit { float: true }),
        Expr::Literal(Literal::Integer(_)) => Ok(InferTy::Lit { float: false }),
        Expr::Var(name) => var_ty(env, name, expr.span),
        Expr::BinOp { op, lhs, rhs } => {
            if let Some(lit) = const_eval(&expr.node) {
                return Ok(InferTy::Lit {
                    float: matches!(lit, Literal::Float(_)),
                });
            }
            let a = expr_ty(env, lhs)?;
            if op.is_shift() {
                if const_int(&rhs.node).is_none() {
                    return Err(err(
                        "shift counts must be integer constants".to_string(),
                        rhs.span,
                    ));
                }
                return shift_ty(*op, a, expr.span);
            }
            let b = expr_ty(env, rhs)?;
            binary_ty(*op, a, b, expr.span)
        }
        Expr::Unary { op, expr: inner } => {
            let t = expr_ty(env, inner)?;
            unary_ty(*op, t, expr.span)
        }
        Expr::Call { name, args } => {
            let mut tys = Vec::with_capacity(args.len());
            for arg in args {
                tys.push(expr_ty(env, arg)?);
            }
            call_ty(env, name, &tys, expr.span)
        }
        Expr::Index { expr: base, index } => {
            let t = expr_ty(env, base)?;
            let t = match t {
                InferTy::Unknown => return Ok(InferTy::Unknown),
                InferTy::Known(t) if t.is_vector() && !t.is_mask() => t,
                other => {
                    return Err(err(
                        format!("cannot index a value of type {}", describe(other)),
                        base.span,
                    ))
                }
            };
            match const_int(&index.node) {
                Some(i) if (0..t.lanes as i128).contains(&i) => Ok(InferTy::Known(t.scalar_of())),
                Some(i) => Err(err(
                    format!("lane index {} out of range for {}", i, t),
                    index.span,
                )),
                None => Err(err(
                    "lane indices must be integer constants".to_string(),
                    index.span,
                )),
            }
        }
    }
}

fn var_ty(env: &Env<'_>, name: &str, span: Span) -> Result<InferTy, Diagnostic> {
    let declared = env.vars.get(name).copied();
    if declared.is_none() {
        if named_constant(name).is_some() {
            return Ok(InferTy::Lit { float: true });
        }
        if env.defined.is_none() {
            return Ok(InferTy::Unknown);
        }
        return Err(err(format!("undefined variable '{}'", name), span));
    }
    if let Some(defined) = env.defined {
        if !defined.contains(name) {
            return Err(err(format!("variable '{}' may be used before assignment", name), span)
                .with_help(
                    "a variable assigned in only some branches of an if is undefined after it"
                        .to_string(),
                ));
        }
    }
    Ok(declared.unwrap_or(InferTy::Unknown))
}

pub(super) fn describe(t: InferTy) -> String {
    match t {
        InferTy::Unknown => "unknown".to_string(),
        InferTy::Lit { float: true } => "float constant".to_string(),
        InferTy::Lit { float: false } => "integer constant".to_string(),
        InferTy::Known(ty) => ty.name.to_string(),
    }
}

/// The common operand type of a binary operation: equal types, or a
/// vector against a scalar of its element type.
pub(super) fn operand_type(op: &str, a: Ty, b: Ty, span: Span) -> Result<Ty, Diagnostic> {
    if a == b {
        return Ok(a);
    }
    let broadcast = |v: Ty, s: Ty| v.is_vector() && s.is_scalar() && !v.is_mask() && !s.is_mask() && v.elem == s.elem;
    if broadcast(a, b) {
        return Ok(a);
    }
    if broadcast(b, a) {
        return Ok(b);
    }
    Err(err(format!("mismatched operand types {} and {} for '{}'", a, b, op), span))
}

/// Resolve a constant against a concrete type.
fn adopt(op: &str, float: bool, ty: Ty, span: Span) -> Result<Ty, Diagnostic> {
    if adopts(float, ty) {
        Ok(ty)
    } else {
        Err(err(
            format!(
                "{} constant cannot be combined with {} in '{}'",
                if float { "float" } else { "integer" },
                ty,
                op
            ),
            span,
        ))
    }
}

pub(super) fn binary_ty(op: BinOp, a: InferTy, b: InferTy, span: Span) -> Result<InferTy, Diagnostic> {
    let sym = op.as_str();
    let ty = match (a, b) {
        (InferTy::Unknown, _) | (_, InferTy::Unknown) => return Ok(InferTy::Unknown),
        (InferTy::Lit { float: fa }, InferTy::Lit { float: fb }) => {
            if op.is_comparison() || op.is_logical() {
                return Err(err(format!("'{}' between two constants", sym), span));
            }
            if (fa || fb) && (op.is_bitwise() || op.is_shift()) {
                return Err(err(format!("'{}' needs integer constants", sym), span));
            }
            return Ok(InferTy::Lit {
                float: fa || fb || op == BinOp::Div,
            });
        }
        (InferTy::Lit { float }, InferTy::Known(t)) | (InferTy::Known(t), InferTy::Lit { float }) => {
            adopt(sym, float, t, span)?
        }
        (InferTy::Known(x), InferTy::Known(y)) => operand_type(sym, x, y, span)?,
    };

    if ty.is_mask() {
        if op.is_bitwise() || op.is_logical() {
            return Ok(InferTy::Known(ty));
        }
        return Err(err(format!("operator '{}' is not supported for {}", sym, ty), span)
            .with_help("masks combine with &, |, ^, and, or, not and feed select".to_string()));
    }
    if op.is_logical() {
        return Err(err(format!("'{}' needs mask operands, found {}", sym, ty), span));
    }
    if !ty.supports(op, &FeatureSet::all()) {
        return Err(err(format!("operator '{}' is not supported for {}", sym, ty), span));
    }
    if op.is_comparison() {
        if ty.is_condition_only(op) {
            return Err(err(
                "integer comparisons can only be used as conditions".to_string(),
                span,
            )
            .with_help("use them directly in 'if' or 'while'".to_string()));
        }
        return Ok(InferTy::Known(ty.mask_of()));
    }
    Ok(InferTy::Known(ty))
}

fn shift_ty(op: BinOp, a: InferTy, span: Span) -> Result<InferTy, Diagnostic> {
    match a {
        InferTy::Unknown => Ok(InferTy::Unknown),
        InferTy::Lit { float: false } => Ok(a),
        InferTy::Known(t) if t.is_int() => Ok(a),
        other => Err(err(
            format!("operator '{}' is not supported for {}", op.as_str(), describe(other)),
            span,
        )),
    }
}

fn unary_ty(op: UnaryOp, t: InferTy, span: Span) -> Result<InferTy, Diagnostic> {
    match (op, t) {
        (_, InferTy::Unknown) => Ok(t),
        (UnaryOp::Pos, _) => Ok(t),
        (UnaryOp::Neg, InferTy::Lit { .. }) => Ok(t),
        (UnaryOp::Neg, InferTy::Known(ty)) if !ty.is_mask() => Ok(t),
        (UnaryOp::Not, InferTy::Known(ty)) if ty.is_mask() => Ok(t),
        (UnaryOp::Not, other) => Err(err(
            format!("'not' needs a mask operand, found {}", describe(other)),
            span,
        )),
        (op, other) => Err(err(
            format!("unary operator '{}' is not supported for {}", op.as_str(), describe(other)),
            span,
        )),
    }
}

fn call_ty(env: &Env<'_>, name: &Spanned<String>, args: &[InferTy], span: Span) -> Result<InferTy, Diagnostic> {
    if let Some(target) = types::lookup(&name.node) {
        return builtins::constructor_ty(target, args, span);
    }
    if let Some(result) = builtins::builtin_ty(&name.node, args, span) {
        return result;
    }
    let Some(sig) = env.helpers.get(&name.node) else {
        return Err(err(format!("unknown function '{}'", name.node), name.span));
    };
    builtins::arity(&name.node, sig.params.len(), args.len(), span)?;
    if args.contains(&InferTy::Unknown) {
        return Ok(InferTy::Known(sig.ret));
    }
    for (arg, (param, want)) in args.iter().zip(&sig.params) {
        let ok = match arg {
            InferTy::Lit { float } => adopts(*float, *want),
            InferTy::Known(t) => t == want,
            InferTy::Unknown => true,
        };
        if !ok {
            return Err(err(
                format!(
                    "argument '{}' of '{}' expects {}, found {}",
                    param,
                    name.node,
                    want,
                    describe(*arg)
                ),
                span,
            ));
        }
    }
    Ok(InferTy::Known(sig.ret))
}

// ─── Conditions ───────────────────────────────────────────────────

/// How an `if`/`while` condition lowers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CondKind {
    /// Flags and jumps.
    Scalar,
    /// A lane mask merging both branches with select.
    Vector(Ty),
    /// Not yet typed.
    Unknown,
}

/// Classify a condition. Scalar comparisons (including integer ones),
/// scalar integers and scalar masks branch; vector masks select.
pub(super) fn cond_kind(env: &Env<'_>, expr: &Spanned<Expr>) -> Result<CondKind, Diagnostic> {
    match &expr.node {
        Expr::BinOp { op, lhs, rhs } if op.is_logical() => {
            let a = cond_kind(env, lhs)?;
            let b = cond_kind(env, rhs)?;
            match (a, b) {
                (CondKind::Unknown, _) | (_, CondKind::Unknown) => Ok(CondKind::Unknown),
                (CondKind::Scalar, CondKind::Scalar) => Ok(CondKind::Scalar),
                (CondKind::Vector(x), CondKind::Vector(y)) if x == y => Ok(CondKind::Vector(x)),
                _ => Err(err(
                    format!("cannot combine scalar and vector conditions with '{}'", op.as_str()),
                    expr.span,
                )),
            }
        }
        Expr::Unary {
            op: UnaryOp::Not,
            expr: inner,
        } => cond_kind(env, inner),
        Expr::BinOp { op, lhs, rhs } if op.is_comparison() => {
            let a = expr_ty(env, lhs)?;
            let b = expr_ty(env, rhs)?;
            let ty = match (a, b) {
                (InferTy::Unknown, _) | (_, InferTy::Unknown) => return Ok(CondKind::Unknown),
                (InferTy::Lit { .. }, InferTy::Lit { .. }) => {
                    return Err(err(
                        format!("'{}' between two constants", op.as_str()),
                        expr.span,
                    ))
                }
                (InferTy::Lit { float }, InferTy::Known(t)) | (InferTy::Known(t), InferTy::Lit { float }) => {
                    adopt(op.as_str(), float, t, expr.span)?
                }
                (InferTy::Known(x), InferTy::Known(y)) => operand_type(op.as_str(), x, y, expr.span)?,
            };
            if ty.is_mask() || !ty.supports(*op, &FeatureSet::all()) {
                return Err(err(
                    format!("operator '{}' is not supported for {}", op.as_str(), ty),
                    expr.span,
                ));
            }
            if ty.is_scalar() {
                Ok(CondKind::Scalar)
            } else {
                Ok(CondKind::Vector(ty.mask_of()))
            }
        }
        _ => match expr_ty(env, expr)? {
            InferTy::Unknown => Ok(CondKind::Unknown),
            InferTy::Known(t) if t.is_scalar() && (t.is_int() || t.is_mask()) => Ok(CondKind::Scalar),
            InferTy::Known(t) if t.is_mask() => Ok(CondKind::Vector(t)),
            other => Err(err(
                format!("a condition must be a comparison or a mask, found {}", describe(other)),
                expr.span,
            )),
        },
    }
}
