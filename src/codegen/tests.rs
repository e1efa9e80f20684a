use super::arith::Fused;
use super::*;
use crate::ast::BinOp;
use crate::lir::lower::{RegisterLowering, X86_64Lowering};
use crate::types::{self, FLOAT32, FLOAT32X4, FLOAT64, FLOAT64X2, FLOAT64X4, FLOAT64X8, INT32, INT64X4};

fn gen(level: FeatureLevel) -> CodeGen {
    CodeGen::new(level, false)
}

/// Assemble and encode; panics with the diagnostic on failure.
fn encode(gen: CodeGen) -> Vec<u8> {
    let level = gen.level();
    let program = gen.finish();
    match X86_64Lowering::new(level.features()).lower(&program) {
        Ok(code) => code.bytes,
        Err(d) => panic!("{} at {}:\n{}", d.message, level, program.listing()),
    }
}

fn param(gen: &mut CodeGen, ty: Ty) -> (Mem, Val) {
    let home = gen.alloc_home(ty);
    (home, Val::memory(home, ty))
}

#[test]
fn test_frame_slots_are_aligned_and_reused() {
    let mut frame = Frame::new();
    let a = frame.home(&FLOAT64);
    let b = frame.temp(&FLOAT64X8);
    assert_eq!(a.disp, 0);
    assert_eq!(b.disp, 64);
    frame.release(b);
    let c = frame.temp(&FLOAT64X8);
    assert_eq!(c.disp, 64);
    // Homes are never recycled.
    frame.release(a);
    let d = frame.temp(&FLOAT64);
    assert_ne!(d.disp, 0);
    assert_eq!(frame.size() % 64, 0);
}

#[test]
fn test_const_pool_deduplicates() {
    let mut pool = ConstPool::new();
    let one = pool.literal(Literal::Float(1.0), &FLOAT64X4);
    let again = pool.literal(Literal::Integer(1), &FLOAT64X4);
    let other = pool.literal(Literal::Float(2.0), &FLOAT64X4);
    assert_eq!(one, again);
    assert_ne!(one, other);
    assert_eq!(pool.len(), 2);
    let data = pool.into_data();
    assert_eq!(data[0].bytes.len(), 32);
    assert_eq!(&data[0].bytes[24..32], &1.0f64.to_le_bytes());
    assert_eq!(data[0].align, 32);
}

#[test]
fn test_literal_bytes() {
    assert_eq!(literal_bytes(Literal::Float(1.5), types::Elem::F32), 1.5f32.to_le_bytes().to_vec());
    assert_eq!(literal_bytes(Literal::Integer(-1), types::Elem::I32), vec![0xFF; 4]);
    assert_eq!(
        literal_bytes(Literal::Integer(0x7FF0_0000_0000_0000), types::Elem::I64),
        0x7FF0_0000_0000_0000u64.to_le_bytes().to_vec()
    );
}

#[test]
fn test_register_exhaustion_names_the_statement() {
    let mut regs = RegAlloc::new();
    for _ in 0..7 {
        regs.alloc_gpr("x").expect("pool has seven registers");
    }
    let err = regs.alloc_gpr("assignment to 'y'").unwrap_err();
    assert_eq!(
        err.message,
        "register exhaustion (general-purpose) while compiling assignment to 'y'"
    );
}

#[test]
fn test_cached_variables_are_evicted_under_pressure() {
    let mut regs = RegAlloc::new();
    let cached = regs.alloc_vec(Width::Y, "x").unwrap();
    regs.cache("x", Val::from_parts(vec![cached], &FLOAT64X4));
    for _ in 0..15 {
        regs.alloc_vec(Width::Y, "y").unwrap();
    }
    // The sixteenth request reclaims the cached copy.
    let reg = regs.alloc_vec(Width::Y, "y").unwrap();
    assert_eq!(reg.idx, cached.idx);
    assert!(regs.cached("x").is_none());
}

#[test]
fn test_pinned_cache_is_not_evicted() {
    let mut regs = RegAlloc::new();
    let cached = regs.alloc_vec(Width::X, "x").unwrap();
    regs.cache("x", Val::from_parts(vec![cached], &FLOAT64X2));
    regs.pin(Reg::Vec(cached));
    for _ in 0..15 {
        regs.alloc_vec(Width::X, "y").unwrap();
    }
    assert!(regs.alloc_vec(Width::X, "y").is_err());
    regs.clear_pins();
    assert!(regs.alloc_vec(Width::X, "y").is_ok());
}

#[test]
fn test_temporaries_are_destructible_cached_are_not() {
    let mut regs = RegAlloc::new();
    let t = regs.alloc_vec(Width::X, "t").unwrap();
    assert!(regs.can_destruct(Reg::Vec(t)));
    regs.cache("v", Val::from_parts(vec![t], &FLOAT64X2));
    assert!(!regs.can_destruct(Reg::Vec(t)));
    regs.free(Reg::Vec(t));
    assert!(!regs.is_free(Reg::Vec(t)));
    regs.flush();
    assert!(regs.is_free(Reg::Vec(t)));
}

#[test]
fn test_prologue_and_epilogue() {
    let mut g = gen(FeatureLevel::Avx2Fma);
    let home = g.alloc_home(&FLOAT64X4);
    g.bind_param(0, "x", home, &FLOAT64X4).unwrap();
    let x = g.read_var("x", home, &FLOAT64X4);
    g.ret(x).unwrap();
    let program = g.finish();
    insta::assert_snapshot!(program.listing(), @r"
        push rbp
        mov rbp, rsp
        and rsp, -64
        sub rsp, 64
        mov rax, [rdi]
        vmovups ymm0, [rax]
        vmovups [rsp], ymm0
        vmovups ymm0, [rsp]
        vmovups [rsi], ymm0
        jmp .L0
    .L0:
        vzeroupper
        mov rsp, rbp
        pop rbp
        ret
    ");
}

#[test]
fn test_legacy_add_ties_destination() {
    let mut g = gen(FeatureLevel::Sse2);
    let (_, a) = param(&mut g, &FLOAT64X2);
    let (_, b) = param(&mut g, &FLOAT64X2);
    let sum = g.binary(BinOp::Add, a, b).unwrap();
    let listing: Vec<String> = g.insts().iter().map(|i| i.to_string()).collect();
    assert_eq!(listing, vec!["movups xmm0, [rsp]", "addpd xmm0, xmm0, [rsp+16]"]);
    assert!(sum.is_reg());
}

#[test]
fn test_scalar_broadcast_against_vector() {
    let mut g = gen(FeatureLevel::Sse2);
    let (_, v) = param(&mut g, &FLOAT32X4);
    let (_, s) = param(&mut g, &FLOAT32);
    let out = g.binary(BinOp::Mul, v, s).unwrap();
    assert_eq!(out.ty, &FLOAT32X4);
    let listing: Vec<String> = g.insts().iter().map(|i| i.to_string()).collect();
    assert!(listing.iter().any(|l| l.starts_with("shufps.0")), "{:?}", listing);
}

#[test]
fn test_zmm_uses_embedded_broadcast() {
    let mut g = gen(FeatureLevel::Avx512f);
    let (_, v) = param(&mut g, &FLOAT64X8);
    let (_, s) = param(&mut g, &FLOAT64);
    g.binary(BinOp::Add, v, s).unwrap();
    let listing: Vec<String> = g.insts().iter().map(|i| i.to_string()).collect();
    assert!(listing.iter().any(|l| l.contains("{1toN}")), "{:?}", listing);
}

#[test]
fn test_scalar_int_compare_is_condition_only() {
    let mut g = gen(FeatureLevel::Sse2);
    let (_, n) = param(&mut g, &INT32);
    let err = g
        .compare(BinOp::Lt, n, Val::immediate(Literal::Integer(0), &INT32))
        .unwrap_err();
    assert_eq!(err.message, "integer comparisons can only be used as conditions");
}

#[test]
fn test_unsupported_operation_names_level() {
    let mut g = gen(FeatureLevel::Sse2);
    let (_, a) = param(&mut g, &types::INT32X4);
    let (_, b) = param(&mut g, &types::INT32X4);
    let err = g.binary(BinOp::Mul, a, b).unwrap_err();
    assert_eq!(err.message, "operator '*' is not supported for int32x4 at sse2");
}

/// Every float operation must encode at every level for every type.
#[test]
fn test_float_operations_encode_everywhere() {
    for level in FeatureLevel::ALL {
        for ty in types::float_types() {
            let mut g = gen(level);
            let (_, a) = param(&mut g, ty);
            let (_, b) = param(&mut g, ty);
            let (a1, a2) = (a.clone(), a.clone());
            let sum = g.binary(BinOp::Add, a1, b.clone()).unwrap();
            let q = g.binary(BinOp::Div, sum, b.clone()).unwrap();
            let lt = g.compare(BinOp::Lt, q, a2).unwrap();
            let ge = g.compare(BinOp::Ge, a.clone(), b.clone()).unwrap();
            let both = g.mask_binary(BinOp::And, lt, ge).unwrap();
            let flipped = g.mask_not(both).unwrap();
            let picked = g.select(a.clone(), b.clone(), flipped).unwrap();
            let neg = g.negate(picked).unwrap();
            let abs = g.abs(neg).unwrap();
            let root = g.sqrt(abs).unwrap();
            let fl = g.floor(root).unwrap();
            let p = g.pow2i(fl).unwrap();
            let m = g.min_max(true, p, a.clone()).unwrap();
            let f = g.fma(Fused::MulAdd, m, b.clone(), a.clone()).unwrap();
            let n = g.fma(Fused::NegMulAdd, a.clone(), b.clone(), f).unwrap();
            g.ret(n).unwrap();
            let bytes = encode(g);
            assert!(!bytes.is_empty(), "{} at {}", ty, level);
        }
    }
}

#[test]
fn test_int_operations_encode_everywhere() {
    for level in FeatureLevel::ALL {
        for ty in [&types::INT32X4, &types::INT64X2, &INT64X4, &types::INT32X16] {
            let mut g = gen(level);
            let (_, a) = param(&mut g, ty);
            let (_, b) = param(&mut g, ty);
            let x = g.binary(BinOp::BitXor, a.clone(), b.clone()).unwrap();
            let s = g.binary(BinOp::Shl, x, Val::immediate(Literal::Integer(3), ty)).unwrap();
            let r = g.binary(BinOp::Shr, s, Val::immediate(Literal::Integer(1), ty)).unwrap();
            let d = g.binary(BinOp::Sub, r, a.clone()).unwrap();
            let n = g.negate(d).unwrap();
            let eq = g.compare(BinOp::Eq, n.clone(), b.clone());
            let out = match eq {
                Ok(mask) => g.select(a.clone(), b.clone(), mask).unwrap(),
                Err(_) => n,
            };
            g.ret(out).unwrap();
            encode(g);
        }
    }
}

#[test]
fn test_conversions_encode_everywhere() {
    let pairs: [(Ty, Ty); 5] = [
        (&FLOAT64, &INT32),
        (&INT32, &FLOAT32),
        (&FLOAT32X4, &types::INT32X4),
        (&types::INT64X4, &FLOAT64X4),
        (&FLOAT32X4, &types::FLOAT64X4),
    ];
    for level in FeatureLevel::ALL {
        for (from, to) in pairs {
            let mut g = gen(level);
            let (_, v) = param(&mut g, from);
            let out = g.convert(v, to).unwrap();
            assert_eq!(out.ty, to);
            g.ret(out).unwrap();
            encode(g);
        }
    }
}

#[test]
fn test_scalar_branches_encode() {
    for level in [FeatureLevel::Sse2, FeatureLevel::Avx512fFma] {
        let mut g = gen(level);
        let (_, x) = param(&mut g, &FLOAT64);
        let (_, n) = param(&mut g, &INT32);
        let target = g.new_label();
        for op in [BinOp::Lt, BinOp::Le, BinOp::Gt, BinOp::Ge, BinOp::Eq, BinOp::Ne] {
            for jump_if in [true, false] {
                g.branch_compare(op, x.clone(), Val::immediate(Literal::Float(0.5), &FLOAT64), jump_if, target)
                    .unwrap();
                g.branch_compare(op, n.clone(), Val::immediate(Literal::Integer(3), &INT32), jump_if, target)
                    .unwrap();
            }
        }
        g.branch_truthy(n.clone(), true, target).unwrap();
        let m = g.compare(BinOp::Lt, x.clone(), Val::immediate(Literal::Float(1.0), &FLOAT64)).unwrap();
        g.branch_truthy(m, false, target).unwrap();
        g.bind(target);
        g.ret(x).unwrap();
        encode(g);
    }
}

#[test]
fn test_unordered_equality_checks_parity() {
    let mut g = gen(FeatureLevel::Sse2);
    let (_, x) = param(&mut g, &FLOAT64);
    let (_, y) = param(&mut g, &FLOAT64);
    let target = g.new_label();
    g.branch_compare(BinOp::Eq, x, y, true, target).unwrap();
    let listing: Vec<String> = g.insts().iter().map(|i| i.to_string()).collect();
    assert_eq!(
        listing,
        vec![
            "movsd xmm0, [rsp]",
            "ucomisd xmm0, [rsp+16]",
            "jp .L2",
            "je .L1",
            ".L2:",
        ]
    );
}

#[test]
fn test_write_var_caches_when_optimizing() {
    let mut g = CodeGen::new(FeatureLevel::Avx2, true);
    let (_, a) = param(&mut g, &FLOAT64X4);
    let home = g.alloc_home(&FLOAT64X4);
    let sum = g.binary(BinOp::Add, a.clone(), a).unwrap();
    g.write_var("x", home, sum).unwrap();
    let read = g.read_var("x", home, &FLOAT64X4);
    assert!(read.is_reg());
    g.flush_cache();
    let read = g.read_var("x", home, &FLOAT64X4);
    assert_eq!(read.mem(), Some(home));
}

#[test]
fn test_register_params_stay_cached() {
    let mut g = CodeGen::new(FeatureLevel::Avx2, true);
    let home = g.alloc_home(&FLOAT64X4);
    g.bind_param(0, "x", home, &FLOAT64X4).unwrap();
    assert!(g.read_var("x", home, &FLOAT64X4).is_reg());
    // The home slot is written too.
    let listing: Vec<String> = g.insts().iter().map(|i| i.to_string()).collect();
    assert_eq!(listing, vec!["mov rax, [rdi]", "movups ymm0, [rax]", "movups [rsp], ymm0"]);
}

#[test]
fn test_pointer_params_are_copied_home() {
    let mut g = CodeGen::new(FeatureLevel::Sse2, true);
    let scalar = g.alloc_home(&FLOAT64);
    let wide = g.alloc_home(&FLOAT64X8);
    g.bind_param(0, "s", scalar, &FLOAT64).unwrap();
    g.bind_param(1, "w", wide, &FLOAT64X8).unwrap();
    assert!(g.read_var("s", scalar, &FLOAT64).is_reg());
    assert_eq!(g.read_var("w", wide, &FLOAT64X8).mem(), Some(wide));
    let stores = g.insts().iter().filter(|i| matches!(i, Inst::Store { .. })).count();
    assert_eq!(stores, 1 + 4);
}

#[test]
fn test_multi_part_values_are_not_cached() {
    let mut g = CodeGen::new(FeatureLevel::Sse2, true);
    let (_, a) = param(&mut g, &FLOAT64X8);
    let home = g.alloc_home(&FLOAT64X8);
    let sum = g.binary(BinOp::Add, a.clone(), a).unwrap();
    g.write_var("x", home, sum).unwrap();
    assert_eq!(g.read_var("x", home, &FLOAT64X8).mem(), Some(home));
    assert_eq!(g.regs.live_temps(), 0);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "released twice")]
fn test_double_release_is_caught() {
    let mut regs = RegAlloc::new();
    let t = regs.alloc_vec(Width::X, "t").unwrap();
    regs.free(Reg::Vec(t));
    regs.free(Reg::Vec(t));
}

#[test]
fn test_self_assignment_releases_once() {
    let mut g = CodeGen::new(FeatureLevel::Avx2, true);
    let (_, a) = param(&mut g, &FLOAT64X4);
    let home = g.alloc_home(&FLOAT64X4);
    let sum = g.binary(BinOp::Add, a.clone(), a).unwrap();
    g.write_var("x", home, sum).unwrap();
    let x = g.read_var("x", home, &FLOAT64X4);
    g.write_var("x", home, x).unwrap();
    assert_eq!(g.read_var("x", home, &FLOAT64X4).mem(), Some(home));
    assert_eq!(g.regs.live_temps(), 0);
}
