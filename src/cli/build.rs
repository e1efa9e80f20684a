use std::path::PathBuf;
use std::process;

use clap::Args;
use simdkern::{CompileOptions, CompiledKernel};

use super::{display_name, load_config, parse_level, read_source};

#[derive(Args)]
pub struct BuildArgs {
    /// Kernel source file
    pub input: PathBuf,
    /// Compile for this level only (e.g. sse2, avx2+fma)
    #[arg(long)]
    pub level: Option<String>,
    /// Optimization: register caching and FMA fusion
    #[arg(long, value_name = "BOOL")]
    pub optimize: Option<bool>,
    /// Print sizes and fingerprints without the listings
    #[arg(long)]
    pub summary: bool,
}

pub fn cmd_build(args: BuildArgs) {
    let source = read_source(&args.input);
    let filename = display_name(&args.input);
    let config = load_config();
    let mut options = match &args.level {
        Some(name) => CompileOptions::for_level(parse_level(name), config.optimize),
        None => CompileOptions {
            levels: simdkern::target::FeatureLevel::ALL.to_vec(),
            optimize: config.optimize,
        },
    };
    if let Some(optimize) = args.optimize {
        options.optimize = optimize;
    }

    let kernels = match simdkern::compile_with_options(&source, &filename, &options) {
        Ok(kernels) => kernels,
        Err(_) => process::exit(1),
    };
    for kernel in &kernels {
        println!("{}", header(kernel));
        if !args.summary {
            print!("{}", kernel.listing());
            println!();
        }
    }
}

/// One summary line per compiled level.
pub fn header(kernel: &CompiledKernel) -> String {
    let hex = kernel.fingerprint.to_hex();
    format!(
        "; {} @ {}: {} bytes of code, {} bytes of constants, fingerprint {}",
        kernel.name,
        kernel.level,
        kernel.code_len(),
        kernel.const_len(),
        &hex.as_str()[..16]
    )
}
