//! Statements: assignments, returns and structured control flow.
//!
//! A vector `if` runs both branches over the whole vector and merges the
//! variables they assign with `select`. Every variable keeps its value in
//! its home slot, so a branch is undone by copying snapshots back.

use crate::ast::*;
use crate::codegen::Val;
use crate::diagnostic::Diagnostic;
use crate::lir::Mem;
use crate::span::Spanned;
use crate::typecheck::CondKind;
use crate::types::Ty;

use super::expr::adopt;
use super::{at, Compiler};

impl<'a> Compiler<'a> {
    pub(super) fn block(&mut self, block: &Block) -> Result<(), Diagnostic> {
        for stmt in block {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn def_name(&self) -> Result<String, Diagnostic> {
        Ok(self.scope()?.def.name.node.clone())
    }

    fn stmt(&mut self, stmt: &Spanned<Stmt>) -> Result<(), Diagnostic> {
        let name = self.def_name()?;
        match &stmt.node {
            Stmt::Def(_) | Stmt::Pass => Ok(()),
            Stmt::Assign { target, op, value } => {
                self.gen
                    .begin_statement(format!("assignment to '{}' in '{}'", target.node, name));
                self.assign(target, *op, value)
            }
            Stmt::Return(value) => {
                self.gen.begin_statement(format!("return in '{}'", name));
                self.ret(value)
            }
            Stmt::If {
                branches,
                else_body,
            } => self.if_chain(branches, else_body.as_ref()),
            Stmt::While { cond, body } => self.while_loop(cond, body),
        }
    }

    fn assign(&mut self, target: &Spanned<String>, op: Option<BinOp>, value: &Spanned<Expr>) -> Result<(), Diagnostic> {
        let (key, home, ty) = self.home(&target.node, target.span)?;
        let val = match op {
            None => self.expr(value)?,
            Some(op) => {
                // `x op= e` is `x = x op e`, which may also fuse.
                let current = Spanned::new(Expr::Var(target.node.clone()), target.span);
                let combined = Spanned::new(
                    Expr::BinOp {
                        op,
                        lhs: Box::new(current),
                        rhs: Box::new(value.clone()),
                    },
                    target.span.merge(value.span),
                );
                self.expr(&combined)?
            }
        };
        let val = self.fit(val, ty).map_err(|d| at(d, value.span))?;
        self.gen.write_var(&key, home, val).map_err(|d| at(d, value.span))
    }

    /// Bring a value to the declared type of its destination.
    fn fit(&mut self, val: Val, ty: Ty) -> Result<Val, Diagnostic> {
        let val = adopt(val, ty);
        if val.ty == ty {
            Ok(val)
        } else {
            self.gen.convert(val, ty)
        }
    }

    fn ret(&mut self, value: &Spanned<Expr>) -> Result<(), Diagnostic> {
        let (exit, ret_ty) = {
            let scope = self.scope()?;
            (scope.exit, scope.types.sig.ret)
        };
        let val = self.expr(value)?;
        let val = self.fit(val, ret_ty).map_err(|d| at(d, value.span))?;
        match exit {
            None => self.gen.ret(val),
            Some(exit) => self.gen.store(val, exit.slot).map(|_| self.gen.jump(exit.label)),
        }
        .map_err(|d| at(d, value.span))
    }

    /// An `if`/`elif`/`else` chain, lowered as nested if/else so that each
    /// condition picks its own lowering.
    fn if_chain(&mut self, branches: &[(Spanned<Expr>, Block)], else_body: Option<&Block>) -> Result<(), Diagnostic> {
        let Some(((cond, then), rest)) = branches.split_first() else {
            return match else_body {
                Some(block) => self.block(block),
                None => Ok(()),
            };
        };
        match self.scope()?.types.condition_kind(cond) {
            CondKind::Vector(mask) => self.vector_if(cond, mask, then, rest, else_body),
            CondKind::Scalar | CondKind::Unknown => self.scalar_if(cond, then, rest, else_body),
        }
    }

    fn scalar_if(
        &mut self,
        cond: &Spanned<Expr>,
        then: &Block,
        rest: &[(Spanned<Expr>, Block)],
        else_body: Option<&Block>,
    ) -> Result<(), Diagnostic> {
        let name = self.def_name()?;
        self.gen.begin_statement(format!("if condition in '{}'", name));
        let otherwise = self.gen.new_label();
        self.cond_jump(cond, false, otherwise)?;
        self.block(then)?;
        if rest.is_empty() && else_body.is_none() {
            self.gen.bind(otherwise);
            return Ok(());
        }
        let end = self.gen.new_label();
        self.gen.jump(end);
        self.gen.bind(otherwise);
        self.if_chain(rest, else_body)?;
        self.gen.bind(end);
        Ok(())
    }

    fn vector_if(
        &mut self,
        cond: &Spanned<Expr>,
        mask_ty: Ty,
        then: &Block,
        rest: &[(Spanned<Expr>, Block)],
        else_body: Option<&Block>,
    ) -> Result<(), Diagnostic> {
        let name = self.def_name()?;
        self.gen
            .begin_statement(format!("vector if condition in '{}'", name));
        let mask = self.expr(cond)?;
        let mask = self.fit(mask, mask_ty).map_err(|d| at(d, cond.span))?;
        let mask_slot = self.gen.alloc_home(mask_ty);
        self.gen.store(mask, mask_slot).map_err(|d| at(d, cond.span))?;

        let mut names = assigned_vars(then);
        let others = rest
            .iter()
            .map(|(_, block)| block)
            .chain(else_body)
            .flat_map(assigned_vars);
        for n in others {
            if !names.contains(&n) {
                names.push(n);
            }
        }
        let vars: Vec<(String, Mem, Ty)> = names
            .iter()
            .map(|n| self.home(n, cond.span))
            .collect::<Result<_, _>>()?;

        let spanned = |d: Diagnostic| at(d, cond.span);
        let mut snapshots = Vec::with_capacity(vars.len());
        for (_, home, ty) in &vars {
            let slot = self.gen.frame.temp(*ty);
            self.gen.copy_slot(*home, slot, *ty).map_err(spanned)?;
            snapshots.push(slot);
        }

        self.block(then)?;

        self.gen.begin_statement(format!("vector if in '{}'", name));
        let mut taken = Vec::with_capacity(vars.len());
        for ((key, home, ty), snapshot) in vars.iter().zip(snapshots) {
            let slot = self.gen.frame.temp(*ty);
            self.gen.copy_slot(*home, slot, *ty).map_err(spanned)?;
            self.gen.copy_slot(snapshot, *home, *ty).map_err(spanned)?;
            self.gen.forget_var(key);
            taken.push(slot);
        }

        self.if_chain(rest, else_body)?;

        let context = format!("merge after vector if in '{}'", name);
        for ((key, home, ty), slot) in vars.iter().zip(taken) {
            self.gen.begin_statement(context.clone());
            let current = self.gen.read_var(key, *home, *ty);
            let merged = self
                .gen
                .select(Val::memory(slot, *ty), current, Val::memory(mask_slot, mask_ty))
                .map_err(spanned)?;
            self.gen.write_var(key, *home, merged).map_err(spanned)?;
        }
        Ok(())
    }

    fn while_loop(&mut self, cond: &Spanned<Expr>, body: &Block) -> Result<(), Diagnostic> {
        let name = self.def_name()?;
        let top = self.gen.new_label();
        let exit = self.gen.new_label();
        self.gen.bind(top);
        self.gen
            .begin_statement(format!("while condition in '{}'", name));
        self.cond_jump(cond, false, exit)?;
        self.block(body)?;
        self.gen.jump(top);
        self.gen.bind(exit);
        Ok(())
    }
}
