//! Agreement between widths, feature levels and the two lowerings of
//! `if`, plus the registry's replacement rules.

#![cfg(target_arch = "x86_64")]

use simdkern::kernels::{self, Params};
use simdkern::registry::{Registry, RegistryOptions};
use simdkern::runtime::Lanes;
use simdkern::target::{self, FeatureLevel};
use simdkern::types::{self, Ty};
use simdkern::Value;

fn load(registry: &Registry, name: &str, ty: Ty) {
    let template = kernels::template(name).expect("built-in kernel");
    let source = template.source(ty).expect("float type");
    registry
        .register_kernel(name, &template.signature(ty), &source, true)
        .unwrap_or_else(|e| panic!("{}", e));
}

/// Raw lane bits, widened so f32 and f64 compare alike.
fn bits(value: &Value) -> Vec<u64> {
    match value.lanes() {
        Lanes::F32(v) => v.iter().map(|x| x.to_bits() as u64).collect(),
        Lanes::F64(v) => v.iter().map(|x| x.to_bits()).collect(),
        Lanes::I32(v) => v.iter().map(|x| *x as u32 as u64).collect(),
        Lanes::I64(v) => v.iter().map(|x| *x as u64).collect(),
    }
}

/// Same-type samples for one template: the unary inputs, a second float
/// operand for binary kernels, and an exponent for `pown`.
fn samples(params: Params) -> Vec<Vec<f64>> {
    let xs = vec![
        -3.5, -1.0, -0.75, -0.5, -0.1, 0.0, 0.3, 0.5, 0.625, 0.9, 1.0, 2.0, 7.25, 40.0, 1e-3, f64::NAN,
    ];
    match params {
        Params::Unary => vec![xs],
        Params::Binary => {
            let ys = xs.iter().rev().copied().collect();
            vec![xs, ys]
        }
        Params::Power => {
            let ns = (0..xs.len()).map(|i| i as f64 - 8.0).collect();
            vec![xs, ns]
        }
    }
}

/// Evaluate sample `i` of every column with `ty` (or a scalar int32 for a
/// `pown` exponent).
fn call_at(registry: &Registry, name: &str, sig: &[Ty], columns: &[Vec<f64>], at: &[usize]) -> Value {
    let args: Vec<Value> = sig
        .iter()
        .zip(columns)
        .map(|(ty, col)| {
            let lanes: Vec<f64> = at.iter().map(|i| col[*i]).collect();
            if ty.is_scalar() {
                Value::from_f64s(ty, &lanes[..1]).expect("valid lanes")
            } else {
                Value::from_f64s(ty, &lanes).expect("valid lanes")
            }
        })
        .collect();
    registry.call(name, &args).unwrap_or_else(|e| panic!("{}: {}", name, e))
}

#[test]
fn test_widths_are_bit_identical() {
    let registry = Registry::with_options(RegistryOptions::default());
    let families: [(Ty, &[Ty]); 2] = [
        (
            &types::FLOAT64,
            &[&types::FLOAT64X2, &types::FLOAT64X3, &types::FLOAT64X4, &types::FLOAT64X8],
        ),
        (
            &types::FLOAT32,
            &[&types::FLOAT32X4, &types::FLOAT32X8, &types::FLOAT32X16],
        ),
    ];
    for template in kernels::TEMPLATES {
        let columns = samples(template.params);
        for (scalar, vectors) in families {
            load(&registry, template.name, scalar);
            let scalar_sig = template.signature(scalar);
            let reference: Vec<u64> = (0..columns[0].len())
                .map(|i| bits(&call_at(&registry, template.name, &scalar_sig, &columns, &[i]))[0])
                .collect();

            for &vector in vectors {
                load(&registry, template.name, vector);
                let sig = template.signature(vector);
                let lanes = vector.lanes as usize;
                // pown's exponent is one scalar per call, so every lane
                // gets the same sample there.
                for start in 0..columns[0].len() {
                    let at: Vec<usize> = match template.params {
                        Params::Power => vec![start; lanes],
                        _ => (0..lanes).map(|l| (start + l) % columns[0].len()).collect(),
                    };
                    let got = bits(&call_at(&registry, template.name, &sig, &columns, &at));
                    let want: Vec<u64> = at.iter().map(|i| reference[*i]).collect();
                    assert_eq!(got, want, "{} {} at {}", template.name, vector, start);
                }
            }
        }
    }
}

/// Levels the host can run, lowest first.
fn host_levels() -> Vec<FeatureLevel> {
    if !target::host_supported() {
        return Vec::new();
    }
    let detected = target::detect();
    FeatureLevel::ALL
        .into_iter()
        .filter(|l| detected.contains(&l.features()))
        .collect()
}

#[test]
fn test_levels_agree_within_fma_class() {
    let kernels = [("exp", &types::FLOAT64X4), ("sin", &types::FLOAT64X8), ("atan2", &types::FLOAT32X8)];
    let mut outputs: Vec<(FeatureLevel, Vec<Value>)> = Vec::new();
    for level in host_levels() {
        let registry = Registry::with_options(RegistryOptions {
            dispatch_level: level,
            all_levels: false,
            optimize: true,
        });
        let mut results = Vec::new();
        for (name, ty) in kernels {
            load(&registry, name, ty);
            let template = kernels::template(name).expect("built-in kernel");
            let sig = template.signature(ty);
            let columns = samples(template.params);
            let lanes = ty.lanes as usize;
            for start in (0..columns[0].len()).step_by(lanes) {
                let at: Vec<usize> = (0..lanes).map(|l| (start + l) % columns[0].len()).collect();
                results.push(call_at(&registry, name, &sig, &columns, &at));
            }
        }
        outputs.push((level, results));
    }

    for (level, results) in &outputs {
        for (other, other_results) in &outputs {
            if level.has_fma() == other.has_fma() {
                let a: Vec<Vec<u64>> = results.iter().map(bits).collect();
                let b: Vec<Vec<u64>> = other_results.iter().map(bits).collect();
                assert_eq!(a, b, "{} and {} disagree", level, other);
                continue;
            }
            // Fusion drops one rounding per multiply-add.
            for (x, y) in results.iter().zip(other_results) {
                for (p, q) in x.to_f64s().into_iter().zip(y.to_f64s()) {
                    let tol = if x.ty().elem == types::Elem::F32 { 1e-6 } else { 1e-14 };
                    assert!(
                        (p.is_nan() && q.is_nan()) || (p - q).abs() <= tol * p.abs().max(1.0),
                        "{} vs {}: {} and {}",
                        level,
                        other,
                        p,
                        q
                    );
                }
            }
        }
    }
}

const BRANCHY: &str = "\
def branchy(x: {T}) -> {T}:
    if x > 0.5:
        y = x * 2.0
    else:
        y = x - 1.0
    return y
";

const SELECTED: &str = "\
def selected(x: {T}) -> {T}:
    return select(x * 2.0, x - 1.0, x > 0.5)
";

#[test]
fn test_select_matches_branches_at_the_boundary() {
    let registry = Registry::with_options(RegistryOptions::default());
    let half: f64 = 0.5;
    let xs = [
        half,
        f64::from_bits(half.to_bits() + 1),
        f64::from_bits(half.to_bits() - 1),
        0.0,
        -0.0,
        f64::NAN,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];
    for ty in [&types::FLOAT64, &types::FLOAT64X8] {
        let branchy = BRANCHY.replace("{T}", ty.name);
        let selected = SELECTED.replace("{T}", ty.name);
        registry.register_kernel("branchy", &[ty], &branchy, true).unwrap_or_else(|e| panic!("{}", e));
        registry.register_kernel("selected", &[ty], &selected, true).unwrap_or_else(|e| panic!("{}", e));

        for (i, x) in xs.iter().enumerate() {
            let arg = if ty.is_scalar() {
                Value::f64(*x)
            } else {
                let lanes: Vec<f64> = (0..8).map(|l| xs[(i + l) % xs.len()]).collect();
                Value::from_f64s(ty, &lanes).expect("valid lanes")
            };
            let a = registry.call("branchy", &[arg.clone()]).unwrap_or_else(|e| panic!("{}", e));
            let b = registry.call("selected", &[arg]).unwrap_or_else(|e| panic!("{}", e));
            assert_eq!(bits(&a), bits(&b), "{} at {}", ty, x);
        }
    }
}

#[test]
fn test_reregistration_keeps_old_code_alive() {
    let registry = Registry::with_options(RegistryOptions::default());
    let sig: [Ty; 1] = [&types::FLOAT64X2];
    let first = "def bump(x: float64x2) -> float64x2:\n    return x + 1.0\n";
    let second = "def bump(x: float64x2) -> float64x2:\n    return x + 2.0\n";

    registry.register_kernel("bump", &sig, first, true).unwrap_or_else(|e| panic!("{}", e));
    let old = registry.lookup("bump", &sig).expect("registered");
    let again = registry.register_kernel("bump", &sig, first, true).unwrap_or_else(|e| panic!("{}", e));
    let again = again.for_level(registry.options().dispatch_level).expect("dispatchable");
    assert_eq!(again.fingerprint, old.fingerprint);
    assert_eq!(registry.len(), 1);

    registry.register_kernel("bump", &sig, second, true).unwrap_or_else(|e| panic!("{}", e));
    let arg = Value::from_f64s(&types::FLOAT64X2, &[1.0, 2.0]).expect("valid lanes");
    let new = registry.call("bump", &[arg.clone()]).unwrap_or_else(|e| panic!("{}", e));
    assert_eq!(new.to_f64s(), vec![3.0, 4.0]);
    let kept = old.call(&[arg]).unwrap_or_else(|e| panic!("{}", e));
    assert_eq!(kept.to_f64s(), vec![2.0, 3.0]);
    assert_eq!(registry.len(), 1);
}
