use super::*;
use crate::lexer::Lexer;

fn parse(source: &str) -> File {
    let (tokens, diags) = Lexer::new(source).tokenize();
    assert!(diags.is_empty(), "lex errors: {:?}", diags);
    match Parser::new(tokens).parse_file() {
        Ok(file) => file,
        Err(errors) => panic!("parse errors: {:?}", errors),
    }
}

fn parse_err(source: &str) -> Vec<Diagnostic> {
    let (tokens, diags) = Lexer::new(source).tokenize();
    assert!(diags.is_empty(), "lex errors: {:?}", diags);
    match Parser::new(tokens).parse_file() {
        Ok(_) => panic!("expected parse errors for:\n{}", source),
        Err(errors) => errors,
    }
}

fn body_of(source: &str) -> Block {
    parse(source).kernels.remove(0).body
}

fn return_expr(source: &str) -> Expr {
    let body = body_of(source);
    match &body.last().map(|s| &s.node) {
        Some(Stmt::Return(e)) => e.node.clone(),
        other => panic!("expected return, got {:?}", other),
    }
}

fn kernel_returning(expr: &str) -> String {
    format!("def k(x: float64, y: float64) -> float64:\n    return {}\n", expr)
}

fn bin(e: &Expr) -> (BinOp, &Expr, &Expr) {
    match e {
        Expr::BinOp { op, lhs, rhs } => (*op, &lhs.node, &rhs.node),
        other => panic!("expected binary op, got {:?}", other),
    }
}

#[test]
fn test_kernel_signature() {
    let file = parse("def scale(x: float64x4, k: float64) -> float64x4:\n    return x * k\n");
    assert_eq!(file.kernels.len(), 1);
    let k = &file.kernels[0];
    assert_eq!(k.name.node, "scale");
    assert_eq!(k.params.len(), 2);
    assert_eq!(k.params[0].name.node, "x");
    assert_eq!(k.params[0].ty.node, "float64x4");
    assert_eq!(k.params[1].ty.node, "float64");
    assert_eq!(k.ret.node, "float64x4");
    assert_eq!(k.body.len(), 1);
}

#[test]
fn test_type_names_written_as_calls() {
    let file = parse("def f(x: float32()) -> float32():\n    return x\n");
    assert_eq!(file.kernels[0].params[0].ty.node, "float32");
    assert_eq!(file.kernels[0].ret.node, "float32");
}

#[test]
fn test_multiple_kernels() {
    let file = parse(
        "def a(x: float64) -> float64:\n    return x\n\n\ndef b(x: float32) -> float32:\n    return x\n",
    );
    let names: Vec<_> = file.kernels.iter().map(|k| k.name.node.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_precedence_mul_over_add() {
    let e = return_expr(&kernel_returning("x + y * 2.0"));
    let (op, _, rhs) = bin(&e);
    assert_eq!(op, BinOp::Add);
    assert_eq!(bin(rhs).0, BinOp::Mul);
}

#[test]
fn test_left_associative_sub() {
    let e = return_expr(&kernel_returning("x - y - 1.0"));
    let (op, lhs, rhs) = bin(&e);
    assert_eq!(op, BinOp::Sub);
    assert_eq!(bin(lhs).0, BinOp::Sub);
    assert_eq!(*rhs, Expr::Literal(Literal::Float(1.0)));
}

#[test]
fn test_logical_precedence() {
    // `not` binds looser than comparisons, tighter than `and`.
    let e = return_expr(&kernel_returning("not x < y and y > 0.0 or x == y"));
    let (op, lhs, _) = bin(&e);
    assert_eq!(op, BinOp::Or);
    let (op, lhs, _) = bin(lhs);
    assert_eq!(op, BinOp::And);
    match lhs {
        Expr::Unary { op, expr } => {
            assert_eq!(*op, UnaryOp::Not);
            assert_eq!(bin(&expr.node).0, BinOp::Lt);
        }
        other => panic!("expected not, got {:?}", other),
    }
}

#[test]
fn test_bitwise_precedence() {
    let e = return_expr(&kernel_returning("x | y & x << 2"));
    let (op, _, rhs) = bin(&e);
    assert_eq!(op, BinOp::BitOr);
    let (op, _, rhs) = bin(rhs);
    assert_eq!(op, BinOp::BitAnd);
    assert_eq!(bin(rhs).0, BinOp::Shl);
}

#[test]
fn test_negative_literals_fold() {
    let e = return_expr(&kernel_returning("-2.5 * x"));
    let (_, lhs, _) = bin(&e);
    assert_eq!(*lhs, Expr::Literal(Literal::Float(-2.5)));

    let e = return_expr(&kernel_returning("-x * y"));
    let (op, lhs, _) = bin(&e);
    assert_eq!(op, BinOp::Mul);
    assert!(matches!(lhs, Expr::Unary { op: UnaryOp::Neg, .. }));
}

#[test]
fn test_calls_and_index() {
    let e = return_expr(&kernel_returning("fma(x, y, abs(x))[0]"));
    match e {
        Expr::Index { expr, index } => {
            assert_eq!(index.node, Expr::Literal(Literal::Integer(0)));
            match expr.node {
                Expr::Call { name, args } => {
                    assert_eq!(name.node, "fma");
                    assert_eq!(args.len(), 3);
                    assert!(matches!(&args[2].node, Expr::Call { name, .. } if name.node == "abs"));
                }
                other => panic!("expected call, got {:?}", other),
            }
        }
        other => panic!("expected index, got {:?}", other),
    }
}

#[test]
fn test_parenthesized() {
    let e = return_expr(&kernel_returning("(x + y) * 2.0"));
    let (op, lhs, _) = bin(&e);
    assert_eq!(op, BinOp::Mul);
    assert_eq!(bin(lhs).0, BinOp::Add);
}

#[test]
fn test_augmented_assign() {
    let body = body_of("def f(x: float64) -> float64:\n    x += 1.0\n    x *= 2.0\n    return x\n");
    match &body[0].node {
        Stmt::Assign { target, op, .. } => {
            assert_eq!(target.node, "x");
            assert_eq!(*op, Some(BinOp::Add));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
    assert!(matches!(&body[1].node, Stmt::Assign { op: Some(BinOp::Mul), .. }));
}

#[test]
fn test_if_elif_else() {
    let body = body_of(
        "def f(x: float64) -> float64:\n    if x < 0.0:\n        y = -x\n    elif x > 1.0:\n        y = 1.0\n    else:\n        y = x\n    return y\n",
    );
    assert_eq!(body.len(), 2);
    match &body[0].node {
        Stmt::If {
            branches,
            else_body,
        } => {
            assert_eq!(branches.len(), 2);
            assert_eq!(branches[0].1.len(), 1);
            assert!(else_body.is_some());
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn test_single_line_blocks() {
    let body = body_of(
        "def f(x: float64) -> float64:\n    if x < 0.0: x = -x\n    else: pass\n    return x\n",
    );
    match &body[0].node {
        Stmt::If {
            branches,
            else_body,
        } => {
            assert!(matches!(branches[0].1[0].node, Stmt::Assign { .. }));
            assert!(matches!(else_body.as_ref().map(|b| &b[0].node), Some(Stmt::Pass)));
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn test_while_and_nested_def() {
    let body = body_of(
        "def f(x: float64, n: int32) -> float64:\n    def sq(v: float64) -> float64:\n        return v * v\n    while n > 0:\n        x = sq(x)\n        n -= 1\n    return x\n",
    );
    assert!(matches!(&body[0].node, Stmt::Def(d) if d.name.node == "sq"));
    match &body[1].node {
        Stmt::While { body, .. } => assert_eq!(body.len(), 2),
        other => panic!("expected while, got {:?}", other),
    }
}

#[test]
fn test_assigned_vars_walks_nested_blocks() {
    let body = body_of(
        "def f(x: float64) -> float64:\n    a = x\n    if x > 0.0:\n        b = x\n    while x > 1.0:\n        x = x / 2.0\n        a = x\n    return a\n",
    );
    assert_eq!(assigned_vars(&body), vec!["a", "b", "x"]);
}

#[test]
fn test_error_chained_comparison() {
    let errors = parse_err(&kernel_returning("0.0 < x < 1.0"));
    assert!(errors[0].message.contains("chained comparisons"));
}

#[test]
fn test_error_missing_colon() {
    let errors = parse_err("def f(x: float64) -> float64\n    return x\n");
    assert!(errors.iter().any(|d| d.message.contains("expected ':'")));
}

#[test]
fn test_error_missing_annotation() {
    let errors = parse_err("def f(x) -> float64:\n    return x\n");
    assert!(errors[0].message.contains("no type annotation"));
}

#[test]
fn test_error_top_level_statement() {
    let errors = parse_err("x = 1\ndef f(x: float64) -> float64:\n    return x\n");
    assert!(errors[0].message.contains("expected 'def'"));
}

#[test]
fn test_error_bare_expression() {
    let errors = parse_err("def f(x: float64) -> float64:\n    x + 1.0\n    return x\n");
    assert!(errors[0].message.contains("expected statement"));
    assert!(errors[0].help.is_some());
}

#[test]
fn test_errors_recover_per_line() {
    let errors = parse_err(
        "def f(x: float64) -> float64:\n    y = (x +\n    z = x ) )\n    return y\n    w = * 2\n",
    );
    assert!(errors.len() >= 2, "got {:?}", errors);
}

#[test]
fn test_empty_file_is_error() {
    let errors = parse_err("# nothing here\n");
    assert!(errors[0].message.contains("no kernel"));
}

#[test]
fn test_tuple_rejected() {
    let errors = parse_err(&kernel_returning("(x, y)"));
    assert!(errors[0].message.contains("tuples"));
}
