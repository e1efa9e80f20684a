use super::*;
use crate::ast::BinOp;
use crate::target::{FeatureLevel, FeatureSet};

fn fs(level: FeatureLevel) -> FeatureSet {
    level.features()
}

#[test]
fn test_lookup_by_name() {
    assert_eq!(lookup("float64x4"), Some(&FLOAT64X4));
    assert_eq!(lookup("int32"), Some(&INT32));
    assert_eq!(lookup("mask32x8"), Some(&MASK32X8));
    assert_eq!(lookup("float16"), None);
    assert_eq!(lookup("float64x16"), None);
}

#[test]
fn test_sizes() {
    assert_eq!(FLOAT64.size(), 8);
    assert_eq!(FLOAT32X3.size(), 12);
    assert_eq!(FLOAT32X3.stack_size(), 16);
    assert_eq!(FLOAT64X3.size(), 24);
    assert_eq!(FLOAT64X3.stack_size(), 32);
    assert_eq!(FLOAT32X16.size(), 64);
    assert_eq!(INT64X8.stack_size(), 64);
}

#[test]
fn test_size_invariants_hold_for_every_descriptor() {
    for ty in all() {
        assert_eq!(ty.size(), ty.lanes * ty.elem_bytes(), "{}", ty);
        assert!(ty.stack_size().is_power_of_two(), "{}", ty);
        assert!(ty.stack_size() >= ty.size(), "{}", ty);
        assert!(ty.stack_align().is_power_of_two(), "{}", ty);
        assert!(ty.stack_align() >= 16 && ty.stack_align() >= ty.stack_size());
    }
}

#[test]
fn test_masks_and_scalars() {
    assert_eq!(FLOAT64X4.mask_of(), &MASK64X4);
    assert_eq!(FLOAT32X16.mask_of(), &MASK32X16);
    assert_eq!(INT32X8.mask_of(), &MASK32X8);
    assert_eq!(FLOAT32.mask_of(), &MASK32X1);
    assert_eq!(FLOAT64X8.scalar_of(), &FLOAT64);
    assert_eq!(INT32X4.scalar_of(), &INT32);
    assert_eq!(FLOAT64X4.with_elem(Elem::I64), Some(&INT64X4));
    assert_eq!(FLOAT64X8.with_elem(Elem::I32), Some(&INT32X8));
    assert_eq!(MASK64X4.compared_type(), &FLOAT64X4);
}

#[test]
fn test_every_value_type_has_a_mask() {
    for ty in all().filter(|t| !t.is_mask()) {
        let m = ty.mask_of();
        assert!(m.is_mask());
        assert_eq!(m.lanes, ty.lanes);
        assert_eq!(m.elem_bytes(), ty.elem_bytes());
    }
}

#[test]
fn test_layout_scalars() {
    for level in FeatureLevel::ALL {
        let l = INT64.layout(&fs(level));
        assert_eq!(l.class, RegClass::Gpr);
        let l = FLOAT64.layout(&fs(level));
        assert_eq!(l.class, RegClass::Vec(Width::X));
        assert_eq!(l.parts, 1);
    }
}

#[test]
fn test_layout_multi_part() {
    let sse2 = fs(FeatureLevel::Sse2);
    let l = FLOAT64X4.layout(&sse2);
    assert_eq!((l.class, l.parts, l.part_bytes), (RegClass::Vec(Width::X), 2, 16));
    let l = FLOAT32X16.layout(&sse2);
    assert_eq!(l.parts, 4);

    let avx = fs(FeatureLevel::Avx);
    let l = FLOAT64X4.layout(&avx);
    assert_eq!((l.class, l.parts), (RegClass::Vec(Width::Y), 1));
    let l = FLOAT64X8.layout(&avx);
    assert_eq!((l.class, l.parts), (RegClass::Vec(Width::Y), 2));
    // Integer vectors only widen with AVX2.
    let l = INT32X8.layout(&avx);
    assert_eq!((l.class, l.parts), (RegClass::Vec(Width::X), 2));
    let l = INT32X8.layout(&fs(FeatureLevel::Avx2));
    assert_eq!((l.class, l.parts), (RegClass::Vec(Width::Y), 1));

    let avx512 = fs(FeatureLevel::Avx512f);
    let l = FLOAT64X8.layout(&avx512);
    assert_eq!((l.class, l.parts), (RegClass::Vec(Width::Z), 1));
    assert_eq!(MASK64X8.layout(&avx512).class, RegClass::K);
    assert_eq!(MASK64X4.layout(&avx512).class, RegClass::Vec(Width::Y));
    // Sub-16-byte vectors still occupy a whole xmm register.
    let l = FLOAT32X2.layout(&sse2);
    assert_eq!((l.class, l.parts, l.part_bytes), (RegClass::Vec(Width::X), 1, 16));
}

#[test]
fn test_layout_covers_storage() {
    for level in FeatureLevel::ALL {
        let features = fs(level);
        for ty in all().filter(|t| !(t.is_int() && t.is_scalar())) {
            let l = ty.layout(&features);
            assert_eq!(l.parts * l.part_bytes, ty.slot_size(), "{} at {}", ty, level);
        }
    }
}

#[test]
fn test_passing() {
    assert_eq!(FLOAT64X8.passing(&fs(FeatureLevel::Sse2)), Passing::Pointer);
    assert_eq!(FLOAT64X8.passing(&fs(FeatureLevel::Avx512f)), Passing::Register);
    assert_eq!(FLOAT64.passing(&fs(FeatureLevel::Sse2)), Passing::Register);
    assert_eq!(FLOAT64X4.acum_type(&fs(FeatureLevel::Avx2)), RegClass::Vec(Width::Y));
}

#[test]
fn test_float_capabilities() {
    let f = fs(FeatureLevel::Sse2);
    for op in [BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Lt, BinOp::Ne] {
        assert!(FLOAT64X4.can_operate_with_arg(op, &FLOAT64X4, &f));
        assert!(FLOAT64X4.can_operate_with_memory(op, &f));
        assert!(FLOAT64X4.can_operate_with_const(op, &f));
    }
    assert!(!FLOAT64X4.can_operate_with_arg(BinOp::BitOr, &FLOAT64X4, &f));
    assert!(!FLOAT32.can_operate_with_const(BinOp::Shl, &f));
    // Scalars broadcast against vectors of the same element.
    assert!(FLOAT64X4.can_operate_with_arg(BinOp::Mul, &FLOAT64, &f));
    assert!(!FLOAT64X4.can_operate_with_arg(BinOp::Mul, &FLOAT32, &f));
    assert!(!FLOAT64X4.can_operate_with_arg(BinOp::Mul, &FLOAT64X2, &f));
}

#[test]
fn test_int_capabilities() {
    let sse2 = fs(FeatureLevel::Sse2);
    let avx = fs(FeatureLevel::Avx);
    assert!(INT32.can_operate_with_arg(BinOp::Mul, &INT32, &sse2));
    assert!(!INT32X4.can_operate_with_arg(BinOp::Mul, &INT32X4, &sse2));
    assert!(INT32X4.can_operate_with_arg(BinOp::Mul, &INT32X4, &avx));
    assert!(!INT64X4.can_operate_with_arg(BinOp::Mul, &INT64X4, &FeatureSet::all()));
    assert!(!INT32.can_operate_with_arg(BinOp::Div, &INT32, &avx));
    assert!(!INT64X2.can_operate_with_arg(BinOp::Gt, &INT64X2, &sse2));
    assert!(INT64X2.can_operate_with_arg(BinOp::Gt, &INT64X2, &avx));
    assert!(INT32X4.can_operate_with_arg(BinOp::Gt, &INT32X4, &sse2));
    // Shift counts must be constants.
    assert!(INT64.can_operate_with_const(BinOp::Shr, &sse2));
    assert!(!INT64.can_operate_with_arg(BinOp::Shr, &INT64, &sse2));
    assert!(!INT64.can_operate_with_memory(BinOp::Shl, &sse2));
    assert!(INT32.is_condition_only(BinOp::Lt));
    assert!(!INT32X4.is_condition_only(BinOp::Lt));
}

#[test]
fn test_mask_capabilities() {
    let avx512 = fs(FeatureLevel::Avx512f);
    assert!(MASK64X4.can_operate_with_arg(BinOp::BitAnd, &MASK64X4, &avx512));
    assert!(MASK64X4.can_operate_with_memory(BinOp::BitOr, &avx512));
    assert!(!MASK64X8.can_operate_with_memory(BinOp::BitOr, &avx512));
    assert!(!MASK64X4.can_operate_with_arg(BinOp::Add, &MASK64X4, &avx512));
    assert!(!MASK64X4.can_operate_with_const(BinOp::BitAnd, &avx512));
    assert!(!MASK64X4.supports_math());
}

#[test]
fn test_can_operate_dispatch() {
    let f = FeatureSet::all();
    assert!(FLOAT32X8.can_operate(BinOp::Add, OperandKind::Arg(&FLOAT32X8), &f));
    assert!(FLOAT32X8.can_operate(BinOp::Add, OperandKind::Memory, &f));
    assert!(INT32X8.can_operate(BinOp::Shl, OperandKind::Const, &f));
    assert!(!INT32X8.can_operate(BinOp::Shl, OperandKind::Memory, &f));
}
