//! Scalar conditions as conditional jumps. `and`, `or` and `not` never
//! materialize a boolean; they short-circuit through labels.

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::lir::Label;
use crate::span::Spanned;

use super::{at, Compiler};

impl<'a> Compiler<'a> {
    /// Jump to `target` when `cond` is `jump_if`; fall through otherwise.
    pub(super) fn cond_jump(&mut self, cond: &Spanned<Expr>, jump_if: bool, target: Label) -> Result<(), Diagnostic> {
        match &cond.node {
            Expr::BinOp {
                op: BinOp::And,
                lhs,
                rhs,
            } => {
                if jump_if {
                    let skip = self.gen.new_label();
                    self.cond_jump(lhs, false, skip)?;
                    self.cond_jump(rhs, true, target)?;
                    self.gen.bind(skip);
                } else {
                    self.cond_jump(lhs, false, target)?;
                    self.cond_jump(rhs, false, target)?;
                }
                Ok(())
            }
            Expr::BinOp {
                op: BinOp::Or,
                lhs,
                rhs,
            } => {
                if jump_if {
                    self.cond_jump(lhs, true, target)?;
                    self.cond_jump(rhs, true, target)?;
                } else {
                    let skip = self.gen.new_label();
                    self.cond_jump(lhs, true, skip)?;
                    self.cond_jump(rhs, false, target)?;
                    self.gen.bind(skip);
                }
                Ok(())
            }
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => self.cond_jump(expr, !jump_if, target),
            Expr::BinOp { op, lhs, rhs } if op.is_comparison() => {
                let mut vals = self.operands(&[lhs.as_ref(), rhs.as_ref()])?;
                let (b, a) = (vals.pop(), vals.pop());
                let (Some(a), Some(b)) = (a, b) else {
                    return Err(Diagnostic::error(
                        "internal error: missing comparison operand".to_string(),
                        cond.span,
                    ));
                };
                self.gen
                    .branch_compare(*op, a, b, jump_if, target)
                    .map_err(|d| at(d, cond.span))
            }
            _ => {
                let val = self.expr(cond)?;
                self.gen
                    .branch_truthy(val, jump_if, target)
                    .map_err(|d| at(d, cond.span))
            }
        }
    }
}
