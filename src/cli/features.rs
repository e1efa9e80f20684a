use clap::Args;
use simdkern::target::{self, FeatureLevel, FeatureSet};

use super::load_config;

#[derive(Args)]
pub struct FeaturesArgs {}

pub fn cmd_features(_args: FeaturesArgs) {
    let config = load_config();
    let detected = target::detect();
    let dispatch = config.cap(target::host_level());
    print!("{}", render(&detected, target::host_supported(), dispatch));
}

/// The detected extensions and which levels this host can run.
pub fn render(detected: &FeatureSet, supported: bool, dispatch: FeatureLevel) -> String {
    let mut out = String::new();
    if !supported {
        out.push_str("host: not x86-64, generated code cannot run here\n");
    }
    out.push_str(&format!("features: {}\n", detected.describe()));
    out.push_str(&format!("detected: {}\n", detected.level()));
    out.push_str(&format!("dispatch: {}\n", dispatch));
    for level in FeatureLevel::ALL {
        let runs = supported && detected.contains(&level.features());
        let mark = if level == dispatch { "  <- dispatch" } else { "" };
        out.push_str(&format!(
            "  {:<12} {}{}\n",
            level.name(),
            if runs { "yes" } else { "no" },
            mark
        ));
    }
    out
}
