//! Expressions: operands, operators, builtins and helper inlining.

use crate::ast::*;
use crate::codegen::{Fused, Val};
use crate::diagnostic::Diagnostic;
use crate::span::{Span, Spanned};
use crate::typecheck::{const_eval, named_constant};
use crate::types::{self, Ty};

use super::{at, Compiler, Exit};

/// Default type of a constant nothing else types.
fn literal_type(lit: Literal) -> Ty {
    match lit {
        Literal::Float(_) => &types::FLOAT64,
        Literal::Integer(_) => &types::INT32,
    }
}

/// A constant operand takes `ty`; other values are left alone.
pub(super) fn adopt(val: Val, ty: Ty) -> Val {
    match val.literal() {
        Some(lit) => Val::immediate(lit, ty),
        None => val,
    }
}

/// Whether evaluating `expr` may inline a helper body, which runs whole
/// statements of its own.
fn calls_helper(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => false,
        Expr::BinOp { lhs, rhs, .. } => calls_helper(&lhs.node) || calls_helper(&rhs.node),
        Expr::Unary { expr, .. } => calls_helper(&expr.node),
        Expr::Index { expr, .. } => calls_helper(&expr.node),
        Expr::Call { name, args } => {
            let builtin = crate::typecheck::is_builtin(&name.node) || types::lookup(&name.node).is_some();
            !builtin || args.iter().any(|a| calls_helper(&a.node))
        }
    }
}

impl<'a> Compiler<'a> {
    /// Evaluate an expression to a value.
    pub(super) fn expr(&mut self, expr: &Spanned<Expr>) -> Result<Val, Diagnostic> {
        if let Some(lit) = const_eval(&expr.node) {
            if !self.shadows_constant(&expr.node) {
                return Ok(Val::immediate(lit, literal_type(lit)));
            }
        }
        match &expr.node {
            Expr::Literal(lit) => Ok(Val::immediate(*lit, literal_type(*lit))),
            Expr::Var(name) => self.read(name, expr.span),
            Expr::BinOp { op, lhs, rhs } => {
                if let Some(val) = self.try_fuse(expr, *op, lhs, rhs)? {
                    return Ok(val);
                }
                let mut vals = self.operands(&[lhs.as_ref(), rhs.as_ref()])?;
                let (b, a) = (vals.pop(), vals.pop());
                let (Some(a), Some(b)) = (a, b) else {
                    return Err(internal("missing operand", expr.span));
                };
                self.gen.binary(*op, a, b).map_err(|d| at(d, expr.span))
            }
            Expr::Unary { op, expr: inner } => {
                let val = self.expr(inner)?;
                let out = match op {
                    UnaryOp::Pos => Ok(val),
                    UnaryOp::Neg => self.gen.negate(val),
                    UnaryOp::Not => self.gen.mask_not(val),
                    UnaryOp::Invert => Err(Diagnostic::error(
                        format!("unary operator '~' is not supported for {}", val.ty),
                        expr.span,
                    )),
                };
                out.map_err(|d| at(d, expr.span))
            }
            Expr::Call { name, args } => self.call(name, args, expr.span),
            Expr::Index { expr: base, index } => {
                let lane = match const_eval(&index.node) {
                    Some(Literal::Integer(i)) if i >= 0 => i as u32,
                    _ => {
                        return Err(Diagnostic::error(
                            "lane indices must be integer constants".to_string(),
                            index.span,
                        ))
                    }
                };
                let val = self.expr(base)?;
                self.gen.extract(val, lane).map_err(|d| at(d, expr.span))
            }
        }
    }

    /// `inf`/`nan` fold to constants unless a variable of that name exists.
    fn shadows_constant(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Var(name) => {
                named_constant(name).is_some()
                    && self.scope().map(|s| s.homes.contains_key(name.as_str())).unwrap_or(false)
            }
            _ => false,
        }
    }

    fn read(&mut self, name: &str, span: Span) -> Result<Val, Diagnostic> {
        let known = self.scope()?.homes.contains_key(name);
        if !known {
            if let Some(lit) = named_constant(name) {
                return Ok(Val::immediate(lit, literal_type(lit)));
            }
        }
        let (key, home, ty) = self.home(name, span)?;
        Ok(self.gen.read_var(&key, home, ty))
    }

    /// Evaluate operands left to right. A value already in registers is
    /// parked in the frame when a later operand could exhaust the pools:
    /// multi-part values before any compound operand, and every register
    /// value before a helper call.
    pub(super) fn operands(&mut self, exprs: &[&Spanned<Expr>]) -> Result<Vec<Val>, Diagnostic> {
        let mut vals: Vec<Val> = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let helper = calls_helper(&expr.node);
            let compound = !expr.node.is_leaf() && const_eval(&expr.node).is_none();
            for val in vals.iter_mut() {
                let multi = self.gen.layout(val.ty).is_multi_part();
                if val.is_reg() && (helper || (compound && multi)) {
                    let parked = self.gen.spill(val.clone()).map_err(|d| at(d, expr.span))?;
                    *val = parked;
                }
            }
            vals.push(self.expr(expr)?);
        }
        Ok(vals)
    }

    /// `a*b + c`, `c + a*b`, `a*b - c` and `c - a*b` as one fused
    /// operation when optimizing for a level with FMA and every operand
    /// already has the result type.
    fn try_fuse(
        &mut self,
        whole: &Spanned<Expr>,
        op: BinOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
    ) -> Result<Option<Val>, Diagnostic> {
        if !self.gen.optimize() || !self.gen.features().fma || !matches!(op, BinOp::Add | BinOp::Sub) {
            return Ok(None);
        }
        let product = |e: &Spanned<Expr>| match &e.node {
            Expr::BinOp {
                op: BinOp::Mul,
                lhs,
                rhs,
            } if const_eval(&e.node).is_none() => Some((lhs.as_ref().clone(), rhs.as_ref().clone())),
            _ => None,
        };
        let (kind, a, b, c) = match (product(lhs), product(rhs), op) {
            (Some((a, b)), _, BinOp::Add) => (Fused::MulAdd, a, b, rhs),
            (None, Some((a, b)), BinOp::Add) => (Fused::MulAdd, a, b, lhs),
            (Some((a, b)), _, BinOp::Sub) => (Fused::MulSub, a, b, rhs),
            (None, Some((a, b)), BinOp::Sub) => (Fused::NegMulAdd, a, b, lhs),
            _ => return Ok(None),
        };
        let types = self.scope()?.types;
        let Some(ty) = types.expr_type(whole) else {
            return Ok(None);
        };
        let fits = |e: &Spanned<Expr>| const_eval(&e.node).is_some() || types.expr_type(e) == Some(ty);
        if !ty.is_float() || !fits(&a) || !fits(&b) || !fits(c) {
            return Ok(None);
        }
        let mut vals = self.operands(&[&a, &b, c])?;
        let (c, b, a) = (vals.pop(), vals.pop(), vals.pop());
        let (Some(a), Some(b), Some(c)) = (a, b, c) else {
            return Err(internal("missing operand", whole.span));
        };
        let (a, b, c) = (adopt(a, ty), adopt(b, ty), adopt(c, ty));
        self.gen
            .fma(kind, a, b, c)
            .map(Some)
            .map_err(|d| at(d, whole.span))
    }

    fn call(&mut self, name: &Spanned<String>, args: &[Spanned<Expr>], span: Span) -> Result<Val, Diagnostic> {
        if let Some(target) = types::lookup(&name.node) {
            let [arg] = args else {
                return Err(internal("constructor arity", span));
            };
            let val = self.expr(arg)?;
            return self.gen.convert(val, target).map_err(|d| at(d, span));
        }
        let helper = self.scope()?.helpers.get(name.node.as_str()).copied();
        if let Some(def) = helper {
            return self.inline(def, args, span);
        }

        let whole = Spanned::new(
            Expr::Call {
                name: name.clone(),
                args: args.to_vec(),
            },
            span,
        );
        let result = self
            .scope()?
            .types
            .expr_type(&whole)
            .ok_or_else(|| internal("untyped builtin call", span))?;
        let refs: Vec<&Spanned<Expr>> = args.iter().collect();
        let vals = self.operands(&refs)?;
        let out = match (name.node.as_str(), vals.as_slice()) {
            ("sqrt", [x]) => self.gen.sqrt(adopt(x.clone(), result)),
            ("abs", [x]) => self.gen.abs(adopt(x.clone(), result)),
            ("round", [x]) => self.gen.round(adopt(x.clone(), result)),
            ("floor", [x]) => self.gen.floor(adopt(x.clone(), result)),
            ("pow2i", [x]) => self.gen.pow2i(adopt(x.clone(), result)),
            ("min", [x, y]) => self.gen.min_max(false, adopt(x.clone(), result), adopt(y.clone(), result)),
            ("max", [x, y]) => self.gen.min_max(true, adopt(x.clone(), result), adopt(y.clone(), result)),
            ("fma", [x, y, z]) => self.gen.fma(
                Fused::MulAdd,
                adopt(x.clone(), result),
                adopt(y.clone(), result),
                adopt(z.clone(), result),
            ),
            ("select", [t, f, m]) => self.gen.select(adopt(t.clone(), result), adopt(f.clone(), result), m.clone()),
            ("as_int", [x]) | ("as_float", [x]) => {
                let from = result
                    .with_elem(if name.node == "as_int" { result.elem.as_float() } else { result.elem.as_int() })
                    .unwrap_or(result);
                self.gen.retype(adopt(x.clone(), from), result)
            }
            _ => Err(Diagnostic::error(format!("unknown function '{}'", name.node), name.span)),
        };
        out.map_err(|d| at(d, span))
    }

    /// Inline a helper: arguments go to fresh parameter homes, `return`
    /// stores to a result slot and jumps to the end of the body.
    fn inline(&mut self, def: &'a KernelDef, args: &[Spanned<Expr>], span: Span) -> Result<Val, Diagnostic> {
        if self.scopes.iter().any(|s| std::ptr::eq(s.def, def)) {
            return Err(Diagnostic::error(
                format!("recursive helper '{}' cannot be inlined", def.name.node),
                span,
            )
            .with_help("helpers are expanded at every call site; rewrite the recursion as a loop".to_string()));
        }
        let info = self.info;
        let types = info
            .def(def)
            .ok_or_else(|| internal("helper has not been type checked", def.name.span))?;
        let outer = self.scope()?.helpers.clone();
        let mut scope = self.scope_for(def, types, &outer);

        let refs: Vec<&Spanned<Expr>> = args.iter().collect();
        let vals = self.operands(&refs)?;
        for (val, (param, ty)) in vals.into_iter().zip(&types.sig.params) {
            let (home, _) = scope
                .homes
                .get(param.as_str())
                .copied()
                .ok_or_else(|| internal("parameter without storage", span))?;
            let key = format!("{}#{}", scope.id, param);
            self.gen
                .write_var(&key, home, adopt(val, *ty))
                .map_err(|d| at(d, span))?;
        }

        let exit = Exit {
            slot: self.gen.alloc_home(types.sig.ret),
            label: self.gen.new_label(),
        };
        scope.exit = Some(exit);
        let context = self.gen.context().to_string();
        self.scopes.push(scope);
        let body = self.block(&def.body);
        self.scopes.pop();
        body?;
        self.gen.bind(exit.label);
        self.gen.begin_statement(context);
        Ok(Val::memory(exit.slot, types.sig.ret))
    }
}

fn internal(what: &str, span: Span) -> Diagnostic {
    Diagnostic::error(format!("internal error: {}", what), span)
}
