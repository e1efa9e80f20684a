use std::process;

use clap::Args;
use simdkern::kernels;
use simdkern::registry::Registry;
use simdkern::types;
use simdkern::Value;

#[derive(Args)]
pub struct RunArgs {
    /// Built-in kernel (asin, exp, pow, pown, ...)
    pub kernel: String,
    /// Float type to evaluate in (float64, float32x4, ...)
    pub ty: String,
    /// Arguments: one number per argument to fill every lane, or a
    /// comma-separated list with one number per lane
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,
}

pub fn cmd_run(args: RunArgs) {
    let Some(template) = kernels::template(&args.kernel) else {
        let names: Vec<&str> = kernels::TEMPLATES.iter().map(|t| t.name).collect();
        eprintln!(
            "error: unknown kernel '{}' (expected one of: {})",
            args.kernel,
            names.join(", ")
        );
        process::exit(1);
    };
    let ty = match types::lookup(&args.ty) {
        Some(ty) if ty.is_float() => ty,
        _ => {
            eprintln!("error: '{}' is not a float type", args.ty);
            process::exit(1);
        }
    };
    let params = template.signature(ty);
    if params.len() != args.args.len() {
        eprintln!(
            "error: '{}' takes {} argument(s), found {}",
            template.name,
            params.len(),
            args.args.len()
        );
        process::exit(1);
    }
    let values: Vec<Value> = match params
        .iter()
        .zip(&args.args)
        .map(|(ty, text)| Value::parse(ty, text))
        .collect()
    {
        Ok(values) => values,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let registry = Registry::global();
    if let Some(variant) = registry.lookup(template.name, &params) {
        tracing::info!(kernel = template.name, level = %variant.level, "dispatching");
    }
    match registry.call(template.name, &values) {
        Ok(result) => println!("{}", result),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
