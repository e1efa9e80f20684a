use clap::Args;
use simdkern::registry::{signature, KernelInfo, Registry};

#[derive(Args)]
pub struct ListArgs {
    /// Only kernels with this name
    pub name: Option<String>,
}

pub fn cmd_list(args: ListArgs) {
    let kernels: Vec<KernelInfo> = Registry::global()
        .kernels()
        .into_iter()
        .filter(|k| args.name.as_deref().map_or(true, |n| n == k.name))
        .collect();
    print!("{}", render(&kernels));
}

pub fn render(kernels: &[KernelInfo]) -> String {
    let mut out = String::new();
    for kernel in kernels {
        let head = format!("{}({})", kernel.name, signature(&kernel.params));
        let tail = match kernel.ret {
            Some(ret) => {
                let levels: Vec<&str> = kernel.levels.iter().map(|l| l.name()).collect();
                format!("-> {}  [{}]", ret, levels.join(" "))
            }
            None => "compile failed".to_string(),
        };
        out.push_str(&format!("{:<36} {}\n", head, tail));
    }
    out
}
