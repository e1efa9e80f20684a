use super::*;
use crate::lexer::Lexer;
use crate::lir::lower::{RegisterLowering, X86_64Lowering};
use crate::parser::Parser;
use crate::typecheck::check_file;

fn build(source: &str, level: FeatureLevel, optimize: bool) -> Result<Program, Vec<Diagnostic>> {
    let (tokens, diags) = Lexer::new(source).tokenize();
    assert!(diags.is_empty(), "lex errors: {:?}", diags);
    let file = match Parser::new(tokens).parse_file() {
        Ok(file) => file,
        Err(errors) => panic!("parse errors: {:?}", errors),
    };
    let info = match check_file(&file) {
        Ok(info) => info,
        Err(errors) => panic!("type errors: {:?}", errors),
    };
    compile_kernel(&file.kernels[0], &info, level, optimize)
}

/// Compile and encode; returns the listing.
fn listing(source: &str, level: FeatureLevel, optimize: bool) -> String {
    let program = match build(source, level, optimize) {
        Ok(program) => program,
        Err(errors) => panic!("compile errors at {}: {:?}", level, errors),
    };
    if let Err(d) = X86_64Lowering::new(level.features()).lower(&program) {
        panic!("{} at {}:\n{}", d.message, level, program.listing());
    }
    program.listing()
}

fn compile_error(source: &str, level: FeatureLevel) -> String {
    match build(source, level, false) {
        Ok(program) => panic!("expected a compile error, got:\n{}", program.listing()),
        Err(errors) => errors[0].message.clone(),
    }
}

const POLY: &str = "\
def poly(x: float64x4, c: float64x4) -> float64x4:
    return x * c + 1.0
";

const CLAMP: &str = "\
def clamp(x: float64x4) -> float64x4:
    y = x
    if x < 0.0:
        y = -x
    elif x > 2.0:
        y = x * 0.5
    return y
";

const POWN: &str = "\
def pown(x: float64, n: int32) -> float64:
    acc = 1.0
    if n < 0:
        x = 1.0 / x
        n = -n
    while n > 0:
        acc *= x
        n -= 1
    return acc
";

#[test]
fn test_kernels_encode_at_every_level() {
    let sources = [
        POLY,
        CLAMP,
        POWN,
        "def lane(v: float32x8) -> float32:\n    return v[5] + 1.0\n",
        "def wide(a: float64x8, b: float64x8) -> float64x8:\n    return select(a, b, a > b) * (a - b) + sqrt(abs(b))\n",
    ];
    for source in sources {
        for level in FeatureLevel::ALL {
            for optimize in [false, true] {
                listing(source, level, optimize);
            }
        }
    }
}

#[test]
fn test_fma_fused_only_when_optimizing_with_fma() {
    assert!(listing(POLY, FeatureLevel::Avx2Fma, true).contains("vfmadd"));
    assert!(!listing(POLY, FeatureLevel::Avx2Fma, false).contains("vfmadd"));
    assert!(!listing(POLY, FeatureLevel::Avx2, true).contains("vfmadd"));
}

#[test]
fn test_augmented_assignment_fuses() {
    let source = "\
def dot(a: float64x4, b: float64x4, c: float64x4) -> float64x4:
    acc = c
    acc += a * b
    acc -= a * c
    return acc
";
    let text = listing(source, FeatureLevel::AvxFma, true);
    assert!(text.contains("vfmadd"), "{}", text);
    assert!(text.contains("vfnmadd"), "{}", text);
}

#[test]
fn test_fusion_skipped_for_mixed_types() {
    // The product is float64x4 but the addend is a scalar variable.
    let source = "\
def k(x: float64x4, s: float64) -> float64x4:
    return x * x + s
";
    assert!(!listing(source, FeatureLevel::Avx2Fma, true).contains("vfmadd"));
}

#[test]
fn test_vector_if_merges_with_select() {
    assert!(listing(CLAMP, FeatureLevel::Avx2, false).contains("vblendvpd"));
    let legacy = listing(CLAMP, FeatureLevel::Sse2, false);
    assert!(legacy.contains("andnpd"), "{}", legacy);
    assert!(!legacy.contains("ucomisd"), "{}", legacy);
    let wide = "\
def k(x: float64x8) -> float64x8:
    y = x
    if x < 0.0:
        y = 0.0
    return y
";
    assert!(listing(wide, FeatureLevel::Avx512f, false).contains("vblendmpd"));
}

#[test]
fn test_vector_if_has_no_branches() {
    let text = listing(CLAMP, FeatureLevel::Avx2Fma, true);
    let jumps = text.lines().filter(|l| l.trim_start().starts_with('j')).count();
    // Only the final jump to the epilogue.
    assert_eq!(jumps, 1, "{}", text);
}

#[test]
fn test_scalar_control_flow_uses_jumps() {
    let text = listing(POWN, FeatureLevel::Sse2, false);
    assert!(text.contains("cmp "), "{}", text);
    assert!(text.lines().filter(|l| l.contains("jmp .L")).count() >= 2, "{}", text);
    let float_if = "\
def sgn(x: float64) -> float64:
    if x < 0.0 or x != x:
        return -1.0
    return 1.0
";
    assert!(listing(float_if, FeatureLevel::Avx, false).contains("ucomisd"));
}

#[test]
fn test_helpers_are_inlined_per_call() {
    let source = "\
def k(x: float64, y: float64) -> float64:
    def sq(v: float64) -> float64:
        return v * v
    return sq(x) + sq(y)
";
    let text = listing(source, FeatureLevel::Sse2, false);
    assert_eq!(text.matches("mulsd").count(), 2, "{}", text);
}

#[test]
fn test_nested_helper_calls() {
    let source = "\
def k(x: float32x4) -> float32x4:
    def sq(v: float32x4) -> float32x4:
        return v * v
    def quad(v: float32x4) -> float32x4:
        return sq(sq(v))
    return quad(x) - sq(x)
";
    for level in FeatureLevel::ALL {
        listing(source, level, true);
    }
}

#[test]
fn test_recursive_helper_rejected() {
    let source = "\
def k(x: float64) -> float64:
    def f(y: float64) -> float64:
        return f(y)
    return f(x)
";
    assert_eq!(
        compile_error(source, FeatureLevel::Sse2),
        "recursive helper 'f' cannot be inlined"
    );
}

#[test]
fn test_level_specific_failure_names_level() {
    let source = "\
def k(a: int32x4, b: int32x4) -> int32x4:
    return a * b
";
    assert_eq!(
        compile_error(source, FeatureLevel::Sse2),
        "operator '*' is not supported for int32x4 at sse2"
    );
    listing(source, FeatureLevel::Avx, false);
}

#[test]
fn test_constants_are_folded_and_pooled() {
    let source = "\
def k(x: float64x2) -> float64x2:
    return x * (2.0 * 0.25) + 0.5
";
    let program = match build(source, FeatureLevel::Sse2, false) {
        Ok(program) => program,
        Err(errors) => panic!("{:?}", errors),
    };
    // 0.5 appears twice but is interned once.
    assert_eq!(program.consts.len(), 1);
}

#[test]
fn test_unchecked_kernel_rejected() {
    let (tokens, _) = Lexer::new("def k(x: float64) -> float64:\n    return x\n").tokenize();
    let file = match Parser::new(tokens).parse_file() {
        Ok(file) => file,
        Err(errors) => panic!("{:?}", errors),
    };
    let empty = match check_file(&crate::ast::File { kernels: Vec::new() }) {
        Ok(info) => info,
        Err(errors) => panic!("{:?}", errors),
    };
    let errors = match compile_kernel(&file.kernels[0], &empty, FeatureLevel::Sse2, false) {
        Ok(_) => panic!("expected an error"),
        Err(errors) => errors,
    };
    assert_eq!(errors[0].message, "'k' has not been type checked");
}
