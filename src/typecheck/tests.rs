use super::*;
use crate::lexer::Lexer;
use crate::parser::Parser;

fn parse(source: &str) -> File {
    let (tokens, diags) = Lexer::new(source).tokenize();
    assert!(diags.is_empty(), "lex errors: {:?}", diags);
    match Parser::new(tokens).parse_file() {
        Ok(file) => file,
        Err(errors) => panic!("parse errors: {:?}", errors),
    }
}

fn check_ok(source: &str) -> (File, TypeInfo) {
    let file = parse(source);
    match check_file(&file) {
        Ok(info) => (file, info),
        Err(errors) => panic!("type errors: {:?}", errors),
    }
}

fn errors(source: &str) -> Vec<String> {
    match check_file(&parse(source)) {
        Ok(_) => panic!("expected type errors for:\n{}", source),
        Err(errors) => errors.into_iter().map(|d| d.message).collect(),
    }
}

fn var(source: &str, name: &str) -> Ty {
    let (file, info) = check_ok(source);
    match info.var_type(&file.kernels[0], name) {
        Some(ty) => ty,
        None => panic!("no type for '{}'", name),
    }
}

fn has_error(source: &str, message: &str) {
    let errs = errors(source);
    assert!(
        errs.iter().any(|e| e == message),
        "expected '{}' in {:?}",
        message,
        errs
    );
}

// ─── Inference ────────────────────────────────────────────────────

#[test]
fn test_accumulator_takes_type_from_later_assignment() {
    let src = "def k(x: float64x4) -> float64x4:\n    acc = 0.0\n    acc = acc + x\n    return acc\n";
    assert_eq!(var(src, "acc"), &types::FLOAT64X4);
}

#[test]
fn test_constant_only_variables_default() {
    let src = "def k(x: float64) -> float64:\n    n = 3\n    h = 0.5\n    return x * h\n";
    assert_eq!(var(src, "n"), &types::INT32);
    assert_eq!(var(src, "h"), &types::FLOAT64);
}

#[test]
fn test_reinterpret_and_lane_types() {
    let src = "def k(x: float64x4) -> float64:\n    bits = as_int(x)\n    back = as_float(bits)\n    return back[3]\n";
    assert_eq!(var(src, "bits"), &types::INT64X4);
    assert_eq!(var(src, "back"), &types::FLOAT64X4);
}

#[test]
fn test_comparison_yields_sibling_mask() {
    let src = "def k(x: float32x8) -> float32x8:\n    m = x > 1.0\n    return select(x, 0.0, m)\n";
    assert_eq!(var(src, "m"), &types::MASK32X8);
}

#[test]
fn test_signature() {
    let file = parse("def k(x: float32x4, n: int32) -> float32x4:\n    return x\n");
    let sig = signature(&file.kernels[0]).unwrap();
    assert_eq!(sig.param_types(), vec![&types::FLOAT32X4 as Ty, &types::INT32 as Ty]);
    assert_eq!(sig.ret, &types::FLOAT32X4);
}

#[test]
fn test_const_eval() {
    let e = |src: &str| {
        let file = parse(&format!("def k(x: float64) -> float64:\n    return {}\n", src));
        match &file.kernels[0].body[0].node {
            Stmt::Return(e) => const_eval(&e.node),
            _ => None,
        }
    };
    assert_eq!(e("2 * 3 + 1"), Some(Literal::Integer(7)));
    assert_eq!(e("1 / 2"), Some(Literal::Float(0.5)));
    assert_eq!(e("1 << 4"), Some(Literal::Integer(16)));
    assert_eq!(e("-inf"), Some(Literal::Float(f64::NEG_INFINITY)));
    assert_eq!(e("x + 1"), None);
}

// ─── Operators ────────────────────────────────────────────────────

#[test]
fn test_mismatched_operands() {
    has_error(
        "def k(x: float64x4, y: float32x4) -> float64x4:\n    return x + y\n",
        "mismatched operand types float64x4 and float32x4 for '+'",
    );
}

#[test]
fn test_scalar_broadcasts_against_vector() {
    check_ok("def k(x: float64x4, s: float64) -> float64x4:\n    return s * x + s\n");
}

#[test]
fn test_bitwise_on_float_rejected() {
    has_error(
        "def k(x: float64) -> float64:\n    return x | x\n",
        "operator '|' is not supported for float64",
    );
}

#[test]
fn test_float_constant_with_int() {
    has_error(
        "def k(n: int32x4) -> int32x4:\n    return n + 0.5\n",
        "float constant cannot be combined with int32x4 in '+'",
    );
}

#[test]
fn test_int_comparison_only_as_condition() {
    has_error(
        "def k(n: int32) -> int32:\n    m = n > 0\n    return n\n",
        "integer comparisons can only be used as conditions",
    );
}

#[test]
fn test_shift_count_must_be_constant() {
    has_error(
        "def k(n: int32x4, s: int32x4) -> int32x4:\n    return n << s\n",
        "shift counts must be integer constants",
    );
    check_ok("def k(n: int64x2) -> int64x2:\n    return (n << 52) >> 1\n");
}

#[test]
fn test_lane_index_bounds() {
    has_error(
        "def k(x: float64x4) -> float64:\n    return x[4]\n",
        "lane index 4 out of range for float64x4",
    );
}

#[test]
fn test_unary_invert_rejected() {
    has_error(
        "def k(n: int32) -> int32:\n    return ~n\n",
        "unary operator '~' is not supported for int32",
    );
}

// ─── Builtins ─────────────────────────────────────────────────────

#[test]
fn test_constructors() {
    check_ok("def k(x: float32x4) -> int32x4:\n    return int32x4(x)\n");
    check_ok("def k(x: float64) -> float64x8:\n    return float64x8(x) + float64x8(1)\n");
    has_error(
        "def k(x: float64x4) -> float64x2:\n    return float64x2(x)\n",
        "cannot convert float64x4 to float64x2",
    );
    has_error(
        "def k(x: float64x2) -> float64x2:\n    m = mask64x2(x)\n    return x\n",
        "mask type mask64x2 cannot be constructed",
    );
}

#[test]
fn test_select_needs_matching_mask() {
    has_error(
        "def k(x: float64x4, y: float32x4) -> float64x4:\n    return select(x, x, y > 0.0)\n",
        "a mask32x4 mask cannot select between float64x4 values",
    );
    has_error(
        "def k(x: float64x4) -> float64x4:\n    return select(x, x, x)\n",
        "the third argument of 'select' must be a mask, found float64x4",
    );
}

#[test]
fn test_math_builtins() {
    check_ok(
        "def k(x: float32x16, y: float32x16) -> float32x16:\n    return fma(min(x, y), max(x, 2.0), sqrt(abs(x))) + floor(x) + round(y) + pow2i(x)\n",
    );
    has_error(
        "def k(n: int32) -> int32:\n    return sqrt(n)\n",
        "'sqrt' expects a float operand, found int32",
    );
    has_error(
        "def k(x: float64) -> float64:\n    return fma(x, x)\n",
        "'fma' expects 3 arguments, found 2",
    );
}

#[test]
fn test_unknown_function() {
    has_error(
        "def k(x: float64) -> float64:\n    return frobnicate(x)\n",
        "unknown function 'frobnicate'",
    );
}

// ─── Helpers ──────────────────────────────────────────────────────

#[test]
fn test_helper_call() {
    let src = "def k(x: float64) -> float64:\n    def sq(v: float64) -> float64:\n        return v * v\n    return sq(x) + sq(2.0)\n";
    let (file, info) = check_ok(src);
    assert_eq!(info.len(), 2);
    match &file.kernels[0].body[0].node {
        Stmt::Def(helper) => assert_eq!(info.var_type(helper, "v"), Some(&types::FLOAT64 as Ty)),
        other => panic!("expected helper, got {:?}", other),
    }
}

#[test]
fn test_helper_argument_mismatch() {
    has_error(
        "def k(x: float32) -> float64:\n    def sq(v: float64) -> float64:\n        return v * v\n    return sq(x)\n",
        "argument 'v' of 'sq' expects float64, found float32",
    );
}

#[test]
fn test_helper_cannot_shadow_builtin() {
    has_error(
        "def k(x: float64) -> float64:\n    def sqrt(v: float64) -> float64:\n        return v\n    return x\n",
        "'sqrt' is a builtin and cannot be redefined",
    );
}

// ─── Statements ───────────────────────────────────────────────────

#[test]
fn test_undefined_variable() {
    has_error(
        "def k(x: float64) -> float64:\n    return x + y\n",
        "undefined variable 'y'",
    );
}

#[test]
fn test_assignment_keeps_variable_type() {
    has_error(
        "def k(x: float64, y: float32) -> float64:\n    t = x\n    t = y\n    return t\n",
        "cannot assign float32 to 't' of type float64",
    );
}

#[test]
fn test_return_type() {
    has_error(
        "def k(x: float32) -> float64:\n    return x\n",
        "'k' returns float64, found float32",
    );
}

#[test]
fn test_missing_return() {
    has_error(
        "def k(x: float64) -> float64:\n    y = x\n",
        "'k' can reach its end without returning float64",
    );
    check_ok(
        "def sgn(x: float64) -> float64:\n    if x > 0.0:\n        return 1.0\n    elif x < 0.0:\n        return -1.0\n    else:\n        return 0.0\n",
    );
}

#[test]
fn test_scalar_while_with_int_condition() {
    let src = "def p(x: float64, n: int32) -> float64:\n    r = 1.0\n    while n > 0 and x != 0.0:\n        r = r * x\n        n -= 1\n    return r\n";
    assert_eq!(var(src, "r"), &types::FLOAT64);
}

#[test]
fn test_vector_if_merges() {
    check_ok(
        "def k(x: float64x4) -> float64x4:\n    y = x\n    if x < 0.0:\n        y = -x\n    else:\n        y = x * 2.0\n    return y\n",
    );
}

#[test]
fn test_one_branch_variable_undefined_after_if() {
    has_error(
        "def k(x: float64x4) -> float64x4:\n    if x < 0.0:\n        y = -x\n    return y\n",
        "variable 'y' may be used before assignment",
    );
}

#[test]
fn test_return_inside_vector_if() {
    has_error(
        "def k(x: float64x2) -> float64x2:\n    if x < 0.0:\n        return -x\n    return x\n",
        "'return' inside an if on a mask64x2 condition",
    );
}

#[test]
fn test_vector_while_rejected() {
    has_error(
        "def k(x: float32x4) -> float32x4:\n    while x > 1.0:\n        x = x * 0.5\n    return x\n",
        "'while' on a mask32x4 condition is not supported",
    );
}

#[test]
fn test_scalar_assigned_under_vector_condition() {
    has_error(
        "def k(x: float64x2, s: float64) -> float64x2:\n    t = s\n    if x > 0.0:\n        t = s * 2.0\n    return x * t\n",
        "'t' of type float64 cannot be assigned under a mask64x2 condition",
    );
}

#[test]
fn test_constant_under_vector_condition_takes_lane_type() {
    let src = "\
def k(x: float64x2) -> float64x2:
    a = abs(x)
    extra = 0.0
    if a > 2.0:
        extra = 1.0
    elif a > 0.5:
        extra = 0.5
    return a + extra
";
    assert_eq!(var(src, "extra"), &types::FLOAT64X2);

    let src = "\
def k(x: float32x4, s: float64) -> float32x4:
    n = 0
    h = 0.0
    if x > 0.0:
        n = 1
    if s > 0.0:
        h = 1.0
    return x
";
    assert_eq!(var(src, "n"), &types::INT32X4);
    assert_eq!(var(src, "h"), &types::FLOAT64);
}

#[test]
fn test_mixed_scalar_and_vector_condition() {
    has_error(
        "def k(x: float64x2, s: float64) -> float64x2:\n    if x > 0.0 and s > 0.0:\n        x = -x\n    return x\n",
        "cannot combine scalar and vector conditions with 'and'",
    );
}

#[test]
fn test_float_condition_rejected() {
    has_error(
        "def k(x: float64) -> float64:\n    if x:\n        return x\n    return 0.0\n",
        "a condition must be a comparison or a mask, found float64",
    );
}

// ─── Signatures ───────────────────────────────────────────────────

#[test]
fn test_mask_parameter_rejected() {
    has_error(
        "def k(m: mask64x2) -> float64x2:\n    return select(1.0, 0.0, m)\n",
        "mask type mask64x2 cannot be a parameter or result",
    );
}

#[test]
fn test_unknown_type() {
    has_error(
        "def k(x: float16) -> float64:\n    return 0.0\n",
        "unknown type 'float16'",
    );
}

#[test]
fn test_duplicate_kernel() {
    has_error(
        "def k(x: float64) -> float64:\n    return x\n\ndef k(x: float64) -> float64:\n    return x\n",
        "kernel 'k' is defined twice",
    );
}
