use super::*;
use crate::api::pipeline::{assemble, CheckedSource};
use crate::registry::{KernelStatus, RegistryOptions};
use crate::target::FeatureLevel;
use crate::types::{FLOAT32X16, FLOAT32X3, FLOAT64, FLOAT64X8, INT32X4};

fn checked(template: &Template, ty: Ty) -> CheckedSource {
    let source = template.source(ty).unwrap();
    match CheckedSource::build(&source) {
        Ok(checked) => checked,
        Err(errors) => panic!(
            "{} for {} does not type check: {:?}\n{}",
            template.name, ty, errors, source
        ),
    }
}

fn assemble_at(template: &Template, ty: Ty, level: FeatureLevel) {
    let checked = checked(template, ty);
    let def = checked.kernel(template.name).unwrap();
    for optimize in [false, true] {
        if let Err(errors) = assemble(def, &checked.info, level, optimize) {
            panic!("{} for {} at {}: {:?}", template.name, ty, level, errors);
        }
    }
}

#[test]
fn test_every_template_type_checks() {
    for template in TEMPLATES {
        for ty in types::float_types() {
            let checked = checked(template, ty);
            let def = checked.kernel(template.name).unwrap();
            let sig = crate::typecheck::signature(def).unwrap();
            assert_eq!(sig.param_types(), template.signature(ty));
            assert_eq!(sig.ret, ty);
        }
    }
}

#[test]
fn test_only_float_types_instantiate() {
    let asin = template("asin").unwrap();
    assert!(asin.source(&INT32X4).is_none());
    assert!(asin.source(&FLOAT64).unwrap().starts_with("def asin(x: float64) -> float64:"));
    assert!(template("erf").is_none());
}

#[test]
fn test_pown_takes_an_int32_exponent() {
    let pown = template("pown").unwrap();
    assert_eq!(pown.signature(&FLOAT32X3), vec![&FLOAT32X3 as Ty, &types::INT32]);
}

#[test]
fn test_scalars_compile_at_every_level() {
    for template in TEMPLATES {
        for level in FeatureLevel::ALL {
            assemble_at(template, &FLOAT64, level);
            assemble_at(template, &types::FLOAT32, level);
        }
    }
}

#[test]
fn test_widest_vectors_compile_at_every_level() {
    // Four registers per value at sse2.
    for template in TEMPLATES {
        for level in FeatureLevel::ALL {
            assemble_at(template, &FLOAT64X8, level);
            assemble_at(template, &FLOAT32X16, level);
        }
    }
}

#[test]
fn test_register_all_compiles_every_instance() {
    let registry = Registry::with_options(RegistryOptions {
        dispatch_level: FeatureLevel::Sse2,
        all_levels: false,
        optimize: true,
    });
    register_all(&registry);
    let expected = TEMPLATES.len() * types::float_types().count();
    assert_eq!(registry.len(), expected);
    for info in registry.kernels() {
        assert_eq!(info.levels, vec![FeatureLevel::Sse2], "{} {:?}", info.name, info.params);
    }
    let params = [&FLOAT64X8 as Ty, &FLOAT64X8];
    assert!(matches!(registry.status("atan2", &params), KernelStatus::Compiled(_)));
}
