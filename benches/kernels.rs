//! Compile and call throughput for the built-in kernels.
//!
//! Compilation is measured per feature level for a representative kernel;
//! calls go through the registry's dispatch at the host level.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use simdkern::kernels;
use simdkern::registry::{Registry, RegistryOptions};
use simdkern::target::{self, FeatureLevel};
use simdkern::types::{self, Ty};
use simdkern::{CompileOptions, Value};

/// Source → machine code for one level.
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for (name, ty) in [("exp", &types::FLOAT64X4), ("atan2", &types::FLOAT32X8), ("pow", &types::FLOAT64)] {
        let Some(source) = kernels::template(name).and_then(|t| t.source(ty)) else {
            continue;
        };
        for level in [FeatureLevel::Sse2, FeatureLevel::Avx2Fma] {
            let options = CompileOptions::for_level(level, true);
            group.bench_with_input(
                BenchmarkId::new(format!("{}_{}", name, ty), level.name()),
                &source,
                |b, source| b.iter(|| simdkern::compile_with_options(black_box(source), "bench.py", &options)),
            );
        }
    }
    group.finish();
}

/// Register the whole library, every level compiled in parallel.
fn bench_register_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("register");
    group.sample_size(10);
    group.bench_function("builtin_library", |b| {
        b.iter(|| Registry::with_builtin_kernels(RegistryOptions::default()))
    });
    group.finish();
}

fn call_args(name: &str, ty: Ty) -> Vec<Value> {
    let x = Value::splat(ty, 0.37).unwrap_or_else(|e| panic!("{}", e));
    match name {
        "atan2" | "pow" => vec![x.clone(), x],
        "pown" => vec![x, Value::i32(7)],
        _ => vec![x],
    }
}

/// Dispatch plus execution, per element of the argument vector.
fn bench_call(c: &mut Criterion) {
    if !target::host_supported() {
        return;
    }
    let registry = Registry::with_options(RegistryOptions::default());
    let mut group = c.benchmark_group("call");
    for name in ["sin", "exp", "log", "atan2", "pown"] {
        for ty in [&types::FLOAT64, &types::FLOAT64X4, &types::FLOAT32X8] {
            let Some(template) = kernels::template(name) else {
                continue;
            };
            let Some(source) = template.source(ty) else {
                continue;
            };
            if registry
                .register_kernel(name, &template.signature(ty), &source, true)
                .is_err()
            {
                continue;
            }
            let args = call_args(name, ty);
            group.bench_with_input(BenchmarkId::new(name, ty.name), &args, |b, args| {
                b.iter(|| registry.call(name, black_box(args)))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_register_all, bench_call);
criterion_main!(benches);
