use std::path::PathBuf;
use std::process;

use clap::Args;

use super::{display_name, load_config, read_source};

#[derive(Args)]
pub struct CheckArgs {
    /// Kernel source file
    pub input: PathBuf,
    /// Compile at every level, including ones the host cannot run
    #[arg(long)]
    pub all_levels: bool,
}

pub fn cmd_check(args: CheckArgs) {
    let source = read_source(&args.input);
    let filename = display_name(&args.input);
    let mut config = load_config();
    config.all_levels |= args.all_levels;
    let options = simdkern::CompileOptions::from_config(&config);

    match simdkern::check_with_options(&source, &filename, &options) {
        Ok(warnings) if warnings.is_empty() => eprintln!("OK: {}", filename),
        Ok(warnings) => eprintln!("OK: {} ({} level(s) skipped)", filename, warnings.len()),
        Err(_) => process::exit(1),
    }
}
