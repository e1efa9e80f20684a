//! Statement checks and definite assignment.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::span::Spanned;
use crate::types::Ty;

use super::expr::{self, adopts, cond_kind, describe, CondKind, Env, InferTy};
use super::{Signature, TypeChecker};

/// What every statement of one definition sees.
struct Body<'a> {
    name: &'a str,
    sig: &'a Signature,
    vars: &'a BTreeMap<String, InferTy>,
    helpers: &'a HashMap<String, Signature>,
}

impl<'a> Body<'a> {
    fn env<'b>(&'b self, defined: &'b BTreeSet<String>) -> Env<'b> {
        Env {
            vars: self.vars,
            defined: Some(defined),
            helpers: self.helpers,
        }
    }

    fn declared(&self, name: &str) -> Option<Ty> {
        self.vars.get(name).and_then(|t| t.resolve())
    }
}

impl TypeChecker {
    pub(super) fn check_body(
        &mut self,
        def: &KernelDef,
        sig: &Signature,
        vars: &BTreeMap<String, InferTy>,
        helpers: &HashMap<String, Signature>,
    ) {
        let body = Body {
            name: &def.name.node,
            sig,
            vars,
            helpers,
        };
        let defined: BTreeSet<String> = sig.params.iter().map(|(n, _)| n.clone()).collect();
        let mut masks = Vec::new();
        if self.check_block(&body, &def.body, defined, &mut masks).is_some() {
            self.report(
                Diagnostic::error(
                    format!("'{}' can reach its end without returning {}", def.name.node, sig.ret),
                    def.name.span,
                )
                .with_help("end every path with 'return'".to_string()),
            );
        }
    }

    /// Check a block. Returns the variables assigned on every path out of
    /// it, or `None` when every path returns.
    fn check_block(
        &mut self,
        body: &Body<'_>,
        block: &Block,
        mut defined: BTreeSet<String>,
        masks: &mut Vec<Ty>,
    ) -> Option<BTreeSet<String>> {
        for stmt in block {
            match &stmt.node {
                Stmt::Def(_) | Stmt::Pass => {}
                Stmt::Assign { target, op, value } => {
                    self.check_assign(body, target, *op, value, &defined, masks);
                    defined.insert(target.node.clone());
                }
                Stmt::Return(value) => {
                    if let Some(mask) = masks.last() {
                        self.report(
                            Diagnostic::error(
                                format!("'return' inside an if on a {} condition", mask),
                                stmt.span,
                            )
                            .with_help(
                                "both branches of a vector if run; assign the result and return after the if"
                                    .to_string(),
                            ),
                        );
                    }
                    self.check_return(body, value, &defined);
                    return None;
                }
                Stmt::If {
                    branches,
                    else_body,
                } => {
                    defined = self.check_if(body, branches, else_body.as_ref(), &defined, masks)?;
                }
                Stmt::While { cond, body: inner } => {
                    match cond_kind(&body.env(&defined), cond) {
                        Ok(CondKind::Vector(mask)) => self.report(
                            Diagnostic::error(
                                format!("'while' on a {} condition is not supported", mask),
                                cond.span,
                            )
                            .with_help(
                                "loop on a scalar condition and use select inside the body"
                                    .to_string(),
                            ),
                        ),
                        Ok(_) => {}
                        Err(e) => self.report(e),
                    }
                    // The body may not run at all.
                    self.check_block(body, inner, defined.clone(), masks);
                }
            }
        }
        Some(defined)
    }

    /// An `if`/`elif` chain, checked as nested if/else.
    fn check_if(
        &mut self,
        body: &Body<'_>,
        branches: &[(Spanned<Expr>, Block)],
        else_body: Option<&Block>,
        defined: &BTreeSet<String>,
        masks: &mut Vec<Ty>,
    ) -> Option<BTreeSet<String>> {
        let Some(((cond, then), rest)) = branches.split_first() else {
            return match else_body {
                Some(block) => self.check_block(body, block, defined.clone(), masks),
                None => Some(defined.clone()),
            };
        };
        let mask = match cond_kind(&body.env(defined), cond) {
            Ok(CondKind::Vector(mask)) => Some(mask),
            Ok(_) => None,
            Err(e) => {
                self.report(e);
                None
            }
        };
        if let Some(mask) = mask {
            masks.push(mask);
        }
        let then_out = self.check_block(body, then, defined.clone(), masks);
        let else_out = self.check_if(body, rest, else_body, defined, masks);
        if mask.is_some() {
            masks.pop();
        }
        match (then_out, else_out) {
            (Some(a), Some(b)) => Some(a.intersection(&b).cloned().collect()),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }

    fn check_assign(
        &mut self,
        body: &Body<'_>,
        target: &Spanned<String>,
        op: Option<BinOp>,
        value: &Spanned<Expr>,
        defined: &BTreeSet<String>,
        masks: &[Ty],
    ) {
        let env = body.env(defined);
        let value_ty = match op {
            None => expr::expr_ty(&env, value),
            Some(op) => {
                let current = Spanned::new(Expr::Var(target.node.clone()), target.span);
                expr::expr_ty(&env, &current).and_then(|cur| {
                    expr::expr_ty(&env, value)
                        .and_then(|v| expr::binary_ty(op, cur, v, target.span.merge(value.span)))
                })
            }
        };
        let declared = body.declared(&target.node);
        match (value_ty, declared) {
            (Err(e), _) => self.report(e),
            (Ok(InferTy::Known(t)), Some(d)) if t != d => self.report(
                Diagnostic::error(
                    format!("cannot assign {} to '{}' of type {}", t, target.node, d),
                    value.span,
                )
                .with_note(format!("a variable keeps one type; '{}' is {}", target.node, d)),
            ),
            (Ok(InferTy::Lit { float }), Some(d)) if !adopts(float, d) => self.error(
                format!(
                    "cannot assign {} to '{}' of type {}",
                    describe(InferTy::Lit { float }),
                    target.node,
                    d
                ),
                value.span,
            ),
            _ => {}
        }

        if let Some(d) = declared {
            for mask in masks {
                if d.is_mask() || d.is_scalar() || d.mask_of() != *mask {
                    self.report(
                        Diagnostic::error(
                            format!(
                                "'{}' of type {} cannot be assigned under a {} condition",
                                target.node, d, mask
                            ),
                            target.span,
                        )
                        .with_help(
                            "both branches of a vector if run and are merged with select; \
                             only values with the condition's lane layout can be merged"
                                .to_string(),
                        ),
                    );
                    break;
                }
            }
        }
    }

    fn check_return(&mut self, body: &Body<'_>, value: &Spanned<Expr>, defined: &BTreeSet<String>) {
        let ret = body.sig.ret;
        match expr::expr_ty(&body.env(defined), value) {
            Err(e) => self.report(e),
            Ok(InferTy::Known(t)) if t != ret => self.error(
                format!("'{}' returns {}, found {}", body.name, ret, t),
                value.span,
            ),
            Ok(InferTy::Lit { float }) if !adopts(float, ret) => self.error(
                format!("'{}' returns {}, found a float constant", body.name, ret),
                value.span,
            ),
            Ok(_) => {}
        }
    }
}
