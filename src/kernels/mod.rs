//! The built-in kernel library.
//!
//! Every kernel is one source template per element type, instantiated for
//! each float type by substituting `{T}`. Scalar and vector instances run
//! the same arithmetic lane by lane, so their results agree bit for bit at
//! a given feature level.

mod double;
mod single;
#[cfg(test)]
mod tests;

use rayon::prelude::*;

use crate::registry::Registry;
use crate::types::{self, Elem, Ty};

/// Shape of a kernel's parameter list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Params {
    /// `(x: T)`
    Unary,
    /// `(a: T, b: T)`
    Binary,
    /// `(x: T, n: int32)`
    Power,
}

/// One library kernel: its name, signature shape and sources.
#[derive(Debug)]
pub struct Template {
    pub name: &'static str,
    pub params: Params,
    double: &'static str,
    single: &'static str,
}

pub static TEMPLATES: &[Template] = &[
    Template {
        name: "asin",
        params: Params::Unary,
        double: double::ASIN,
        single: single::ASIN,
    },
    Template {
        name: "acos",
        params: Params::Unary,
        double: double::ACOS,
        single: single::ACOS,
    },
    Template {
        name: "atan",
        params: Params::Unary,
        double: double::ATAN,
        single: single::ATAN,
    },
    Template {
        name: "atan2",
        params: Params::Binary,
        double: double::ATAN2,
        single: single::ATAN2,
    },
    Template {
        name: "exp",
        params: Params::Unary,
        double: double::EXP,
        single: single::EXP,
    },
    Template {
        name: "log",
        params: Params::Unary,
        double: double::LOG,
        single: single::LOG,
    },
    Template {
        name: "pow",
        params: Params::Binary,
        double: double::POW,
        single: single::POW,
    },
    Template {
        name: "pown",
        params: Params::Power,
        double: double::POWN,
        single: single::POWN,
    },
    Template {
        name: "sin",
        params: Params::Unary,
        double: double::SIN,
        single: single::SIN,
    },
    Template {
        name: "cos",
        params: Params::Unary,
        double: double::COS,
        single: single::COS,
    },
    Template {
        name: "tan",
        params: Params::Unary,
        double: double::TAN,
        single: single::TAN,
    },
];

impl Template {
    /// The source instantiated for `ty`, or `None` if `ty` is not a float
    /// value type.
    pub fn source(&self, ty: Ty) -> Option<String> {
        let text = match ty.elem {
            _ if !ty.is_float() => return None,
            Elem::F64 => self.double,
            _ => self.single,
        };
        Some(text.replace("{T}", ty.name))
    }

    pub fn signature(&self, ty: Ty) -> Vec<Ty> {
        match self.params {
            Params::Unary => vec![ty],
            Params::Binary => vec![ty, ty],
            Params::Power => vec![ty, &types::INT32],
        }
    }
}

pub fn template(name: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.name == name)
}

/// Register every template for every float type. A kernel that fails to
/// compile is logged and left in the failed state; the rest still register.
pub fn register_all(registry: &Registry) {
    let jobs: Vec<(&Template, Ty)> = TEMPLATES
        .iter()
        .flat_map(|t| types::float_types().map(move |ty| (t, ty)))
        .collect();
    let failed: usize = jobs
        .par_iter()
        .map(|&(template, ty)| {
            let Some(source) = template.source(ty) else {
                return 0;
            };
            let optimize = registry.options().optimize;
            match registry.register_kernel(template.name, &template.signature(ty), &source, optimize) {
                Ok(_) => 0,
                Err(e) => {
                    tracing::warn!(kernel = template.name, ty = ty.name, error = %e, "built-in kernel failed");
                    1
                }
            }
        })
        .sum();
    tracing::info!(
        kernels = jobs.len() - failed,
        failed,
        level = %registry.options().dispatch_level,
        "registered built-in kernels"
    );
}
