//! Kernel compiler: walks a type-checked kernel and drives `CodeGen`.
//!
//! Every variable has a home slot in the frame for the whole kernel; the
//! generator may additionally keep a register copy. Nested helpers are
//! inlined at each call site with their own homes, keyed by a scope id so
//! that helper variables never alias the caller's.

mod cond;
mod expr;
mod stmt;
#[cfg(test)]
mod tests;

use std::collections::HashMap;

use crate::ast::*;
use crate::codegen::CodeGen;
use crate::diagnostic::Diagnostic;
use crate::lir::{Label, Mem, Program};
use crate::span::Span;
use crate::target::FeatureLevel;
use crate::typecheck::{DefTypes, TypeInfo};
use crate::types::Ty;

/// Compile one checked kernel for `level`.
pub fn compile_kernel(
    def: &KernelDef,
    info: &TypeInfo,
    level: FeatureLevel,
    optimize: bool,
) -> Result<Program, Vec<Diagnostic>> {
    let types = info.def(def).ok_or_else(|| {
        vec![Diagnostic::error(
            format!("'{}' has not been type checked", def.name.node),
            def.name.span,
        )]
    })?;
    let mut compiler = Compiler::new(CodeGen::new(level, optimize), info);
    let scope = compiler.scope_for(def, types, &HashMap::new());
    compiler.scopes.push(scope);
    for (i, (name, _)) in types.sig.params.iter().enumerate() {
        let (key, home, ty) = compiler.home(name, def.name.span).map_err(|d| vec![d])?;
        compiler.gen.begin_statement(format!("argument '{}'", name));
        compiler
            .gen
            .bind_param(i, &key, home, ty)
            .map_err(|d| vec![d])?;
    }
    compiler.block(&def.body).map_err(|d| vec![d])?;
    tracing::debug!(kernel = %def.name.node, %level, optimize, "kernel compiled");
    Ok(compiler.gen.finish())
}

/// Where `return` goes inside an inlined helper.
#[derive(Clone, Copy)]
struct Exit {
    slot: Mem,
    label: Label,
}

/// One definition being compiled: the kernel itself or an inlined helper.
struct FnScope<'a> {
    id: u32,
    def: &'a KernelDef,
    types: &'a DefTypes,
    homes: HashMap<&'a str, (Mem, Ty)>,
    helpers: HashMap<&'a str, &'a KernelDef>,
    /// `None` for the kernel, whose `return` leaves through `rsi`.
    exit: Option<Exit>,
}

pub(crate) struct Compiler<'a> {
    gen: CodeGen,
    info: &'a TypeInfo,
    scopes: Vec<FnScope<'a>>,
    next_scope: u32,
}

impl<'a> Compiler<'a> {
    fn new(gen: CodeGen, info: &'a TypeInfo) -> Self {
        Self {
            gen,
            info,
            scopes: Vec::new(),
            next_scope: 0,
        }
    }

    /// A fresh scope for `def` with a home for every variable.
    fn scope_for(
        &mut self,
        def: &'a KernelDef,
        types: &'a DefTypes,
        outer: &HashMap<&'a str, &'a KernelDef>,
    ) -> FnScope<'a> {
        let id = self.next_scope;
        self.next_scope += 1;
        let mut homes = HashMap::new();
        // Parameters first, so the kernel's argument homes lead the frame.
        for (name, ty) in &types.sig.params {
            homes.insert(name.as_str(), (self.gen.alloc_home(*ty), *ty));
        }
        for (name, ty) in &types.vars {
            if !homes.contains_key(name.as_str()) {
                homes.insert(name.as_str(), (self.gen.alloc_home(*ty), *ty));
            }
        }
        let mut helpers = outer.clone();
        walk_stmts(&def.body, &mut |stmt| {
            if let Stmt::Def(inner) = stmt {
                helpers.insert(inner.name.node.as_str(), inner);
            }
        });
        FnScope {
            id,
            def,
            types,
            homes,
            helpers,
            exit: None,
        }
    }

    fn scope(&self) -> Result<&FnScope<'a>, Diagnostic> {
        self.scopes
            .last()
            .ok_or_else(|| Diagnostic::error("internal error: no scope".to_string(), Span::dummy()))
    }

    /// Cache key, home slot and type of a variable in the current scope.
    fn home(&self, name: &str, span: Span) -> Result<(String, Mem, Ty), Diagnostic> {
        let scope = self.scope()?;
        match scope.homes.get(name) {
            Some((mem, ty)) => Ok((format!("{}#{}", scope.id, name), *mem, *ty)),
            None => Err(Diagnostic::error(
                format!("internal error: '{}' has no storage", name),
                span,
            )),
        }
    }
}

/// Give a generator diagnostic the span of the construct being compiled.
fn at(mut diagnostic: Diagnostic, span: Span) -> Diagnostic {
    if diagnostic.span.is_dummy() {
        diagnostic.span = span;
    }
    diagnostic
}
