//! Type checking for kernel sources.
//!
//! Every definition (kernel or nested helper) is checked in two passes.
//! Inference runs every assignment to a fixpoint, so a variable has one
//! type for the whole definition no matter where it is first assigned.
//! Checking then walks the body in order and reports mismatches,
//! capability errors, reads of possibly unassigned variables and
//! control flow that cannot be lowered.

mod builtins;
mod expr;
mod stmt;
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::span::{Span, Spanned};
use crate::types::{self, Ty};

pub use builtins::{is_builtin, BUILTINS};
pub use expr::{const_eval, named_constant, CondKind, InferTy};

use expr::Env;

/// Parameter and result types of a definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub params: Vec<(String, Ty)>,
    pub ret: Ty,
}

impl Signature {
    pub fn param_types(&self) -> Vec<Ty> {
        self.params.iter().map(|(_, t)| *t).collect()
    }
}

/// Checked types of one definition.
#[derive(Clone, Debug)]
pub struct DefTypes {
    pub name: String,
    pub sig: Signature,
    /// Every variable, parameters included.
    pub vars: BTreeMap<String, Ty>,
    /// Helper signatures visible from the body.
    pub helpers: HashMap<String, Signature>,
}

impl DefTypes {
    fn env_vars(&self) -> BTreeMap<String, InferTy> {
        self.vars
            .iter()
            .map(|(n, t)| (n.clone(), InferTy::Known(*t)))
            .collect()
    }

    /// Type of an expression in this definition. Constants resolve to
    /// float64 or int32.
    pub fn expr_type(&self, expr: &Spanned<Expr>) -> Option<Ty> {
        let vars = self.env_vars();
        let env = Env {
            vars: &vars,
            defined: None,
            helpers: &self.helpers,
        };
        expr::expr_ty(&env, expr).ok()?.resolve()
    }

    /// How a condition in this definition lowers.
    pub fn condition_kind(&self, cond: &Spanned<Expr>) -> CondKind {
        let vars = self.env_vars();
        let env = Env {
            vars: &vars,
            defined: None,
            helpers: &self.helpers,
        };
        expr::cond_kind(&env, cond).unwrap_or(CondKind::Unknown)
    }
}

/// Types of every definition in a source, keyed by the span of the
/// definition's name.
#[derive(Clone, Debug, Default)]
pub struct TypeInfo {
    defs: HashMap<Span, DefTypes>,
}

impl TypeInfo {
    pub fn def(&self, def: &KernelDef) -> Option<&DefTypes> {
        self.defs.get(&def.name.span)
    }

    pub fn var_type(&self, def: &KernelDef, name: &str) -> Option<Ty> {
        self.def(def)?.vars.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Resolve a type annotation.
pub fn resolve_type(name: &Spanned<String>) -> Result<Ty, Diagnostic> {
    let ty = types::lookup(&name.node).ok_or_else(|| {
        Diagnostic::error(format!("unknown type '{}'", name.node), name.span).with_help(
            "types are float32, float64, int32, int64 and their vectors such as float64x4"
                .to_string(),
        )
    })?;
    if ty.is_mask() {
        return Err(Diagnostic::error(
            format!("mask type {} cannot be a parameter or result", ty),
            name.span,
        ));
    }
    Ok(ty)
}

/// The annotated signature of a definition.
pub fn signature(def: &KernelDef) -> Result<Signature, Vec<Diagnostic>> {
    let mut errors = Vec::new();
    let mut params = Vec::with_capacity(def.params.len());
    for p in &def.params {
        match resolve_type(&p.ty) {
            Ok(ty) => {
                if params.iter().any(|(n, _): &(String, Ty)| *n == p.name.node) {
                    errors.push(Diagnostic::error(
                        format!("duplicate parameter '{}'", p.name.node),
                        p.name.span,
                    ));
                }
                params.push((p.name.node.clone(), ty));
            }
            Err(e) => errors.push(e),
        }
    }
    let ret = resolve_type(&def.ret);
    match ret {
        Ok(ret) if errors.is_empty() => Ok(Signature { params, ret }),
        Ok(_) => Err(errors),
        Err(e) => {
            errors.push(e);
            Err(errors)
        }
    }
}

/// Type-check every kernel of a file.
pub fn check_file(file: &File) -> Result<TypeInfo, Vec<Diagnostic>> {
    let mut tc = TypeChecker::new();
    let mut seen: Vec<&str> = Vec::new();
    for kernel in &file.kernels {
        if seen.contains(&kernel.name.node.as_str()) {
            tc.error(
                format!("kernel '{}' is defined twice", kernel.name.node),
                kernel.name.span,
            );
        }
        seen.push(&kernel.name.node);
        tc.check_def(kernel, &HashMap::new());
    }
    tc.finish()
}

/// Type-check a single kernel definition.
pub fn check_kernel(def: &KernelDef) -> Result<TypeInfo, Vec<Diagnostic>> {
    let mut tc = TypeChecker::new();
    tc.check_def(def, &HashMap::new());
    tc.finish()
}

pub(crate) struct TypeChecker {
    diagnostics: Vec<Diagnostic>,
    info: TypeInfo,
}

impl TypeChecker {
    fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
            info: TypeInfo::default(),
        }
    }

    fn finish(self) -> Result<TypeInfo, Vec<Diagnostic>> {
        if self.diagnostics.is_empty() {
            Ok(self.info)
        } else {
            Err(self.diagnostics)
        }
    }

    fn error(&mut self, message: String, span: Span) {
        self.diagnostics.push(Diagnostic::error(message, span));
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Check one definition. `outer` holds the helpers visible from the
    /// enclosing definition.
    fn check_def(&mut self, def: &KernelDef, outer: &HashMap<String, Signature>) {
        let sig = match signature(def) {
            Ok(sig) => sig,
            Err(errors) => {
                self.diagnostics.extend(errors);
                return;
            }
        };

        let mut helpers = outer.clone();
        let mut nested: Vec<&KernelDef> = Vec::new();
        walk_stmts(&def.body, &mut |stmt| {
            if let Stmt::Def(inner) = stmt {
                nested.push(inner);
            }
        });
        for inner in &nested {
            let name = &inner.name;
            if is_builtin(&name.node) || types::lookup(&name.node).is_some() {
                self.error(
                    format!("'{}' is a builtin and cannot be redefined", name.node),
                    name.span,
                );
                continue;
            }
            if let Ok(inner_sig) = signature(inner) {
                helpers.insert(name.node.clone(), inner_sig);
            }
        }

        let vars = self.infer_vars(def, &sig, &helpers);
        let errors_before = self.diagnostics.len();
        self.check_body(def, &sig, &vars, &helpers);

        for inner in nested {
            self.check_def(inner, &helpers);
        }

        if self.diagnostics.len() > errors_before {
            return;
        }
        let vars = vars
            .iter()
            .filter_map(|(name, t)| t.resolve().map(|t| (name.clone(), t)))
            .collect();
        tracing::trace!(def = %def.name.node, "type checked");
        self.info.defs.insert(
            def.name.span,
            DefTypes {
                name: def.name.node.clone(),
                sig,
                vars,
                helpers,
            },
        );
    }

    /// Run every assignment until no variable's type changes.
    fn infer_vars(
        &self,
        def: &KernelDef,
        sig: &Signature,
        helpers: &HashMap<String, Signature>,
    ) -> BTreeMap<String, InferTy> {
        let mut vars: BTreeMap<String, InferTy> = sig
            .params
            .iter()
            .map(|(n, t)| (n.clone(), InferTy::Known(*t)))
            .collect();
        let mut assigns: Vec<Assign<'_>> = Vec::new();
        collect_assigns(&def.body, &mut Vec::new(), &mut assigns);

        // Each round can only refine a type (Unknown, then a constant,
        // then a concrete type), so this terminates.
        for _ in 0..=3 * assigns.len() + 1 {
            let mut changed = false;
            for assign in &assigns {
                let (name, span, value) = (assign.name, assign.span, assign.value);
                let env = Env {
                    vars: &vars,
                    defined: None,
                    helpers,
                };
                let value_ty = match assign.op {
                    None => expr::expr_ty(&env, value),
                    Some(op) => {
                        let current = vars.get(name).copied().unwrap_or(InferTy::Unknown);
                        expr::expr_ty(&env, value)
                            .and_then(|v| expr::binary_ty(op, current, v, span.merge(value.span)))
                    }
                }
                .unwrap_or(InferTy::Unknown);
                // A constant assigned under a vector condition takes the
                // lane layout of the values that condition compares.
                let value_ty = match value_ty {
                    InferTy::Lit { float } => masked_type(&env, &assign.conds, float).unwrap_or(value_ty),
                    other => other,
                };
                let old = vars.get(name).copied().unwrap_or(InferTy::Unknown);
                let new = old.merge(value_ty);
                if new != old {
                    vars.insert(name.to_string(), new);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        vars
    }
}

/// One assignment with the conditions of the `if` branches around it,
/// outermost first.
struct Assign<'a> {
    name: &'a str,
    op: Option<BinOp>,
    value: &'a Spanned<Expr>,
    span: Span,
    conds: Vec<&'a Spanned<Expr>>,
}

fn collect_assigns<'a>(block: &'a Block, conds: &mut Vec<&'a Spanned<Expr>>, out: &mut Vec<Assign<'a>>) {
    for stmt in block {
        match &stmt.node {
            Stmt::Assign { target, op, value } => out.push(Assign {
                name: target.node.as_str(),
                op: *op,
                value,
                span: target.span,
                conds: conds.clone(),
            }),
            Stmt::If {
                branches,
                else_body,
            } => {
                // Later branches run under the earlier conditions too.
                let depth = conds.len();
                for (cond, body) in branches {
                    conds.push(cond);
                    collect_assigns(body, conds, out);
                }
                if let Some(body) = else_body {
                    collect_assigns(body, conds, out);
                }
                conds.truncate(depth);
            }
            Stmt::While { body, .. } => collect_assigns(body, conds, out),
            Stmt::Def(_) | Stmt::Return(_) | Stmt::Pass => {}
        }
    }
}

/// The vector type a constant adopts under the innermost vector
/// condition in `conds`, if any.
fn masked_type(env: &Env<'_>, conds: &[&Spanned<Expr>], float: bool) -> Option<InferTy> {
    conds.iter().rev().find_map(|cond| match expr::cond_kind(env, cond) {
        Ok(CondKind::Vector(mask)) => {
            let compared = mask.compared_type();
            let ty = if float {
                Some(compared)
            } else {
                compared.with_elem(compared.elem.as_int())
            };
            ty.map(InferTy::Known)
        }
        _ => None,
    })
}
