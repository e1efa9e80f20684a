use super::*;

fn lex(source: &str) -> Vec<Lexeme> {
    let (tokens, diagnostics) = Lexer::new(source).tokenize();
    assert!(diagnostics.is_empty(), "unexpected errors: {:?}", diagnostics);
    tokens.into_iter().map(|t| t.node).collect()
}

fn lex_errors(source: &str) -> Vec<Diagnostic> {
    Lexer::new(source).tokenize().1
}

#[test]
fn test_keywords_and_identifiers() {
    let tokens = lex("def if elif else while return pass and or not foo _asin");
    assert_eq!(
        tokens,
        vec![
            Lexeme::Def,
            Lexeme::If,
            Lexeme::Elif,
            Lexeme::Else,
            Lexeme::While,
            Lexeme::Return,
            Lexeme::Pass,
            Lexeme::And,
            Lexeme::Or,
            Lexeme::Not,
            Lexeme::Ident("foo".into()),
            Lexeme::Ident("_asin".into()),
            Lexeme::Newline,
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_numbers() {
    let tokens = lex("1 0x1F 1.5 2e-3 .5 1_000 3. 0x7FF0000000000000");
    assert_eq!(
        tokens,
        vec![
            Lexeme::Integer(1),
            Lexeme::Integer(31),
            Lexeme::Float(1.5),
            Lexeme::Float(2e-3),
            Lexeme::Float(0.5),
            Lexeme::Integer(1000),
            Lexeme::Float(3.0),
            Lexeme::Integer(0x7FF0000000000000),
            Lexeme::Newline,
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_hex_literal_above_i64_range() {
    let tokens = lex("0xFFFFFFFFFFFFFFFF");
    assert_eq!(tokens[0], Lexeme::Integer(u64::MAX as i128));
}

#[test]
fn test_two_char_operators() {
    let tokens = lex("-> += -= *= /= == != <= >= << >>");
    assert_eq!(
        &tokens[..11],
        &[
            Lexeme::Arrow,
            Lexeme::PlusEq,
            Lexeme::MinusEq,
            Lexeme::StarEq,
            Lexeme::SlashEq,
            Lexeme::EqEq,
            Lexeme::NotEq,
            Lexeme::Le,
            Lexeme::Ge,
            Lexeme::Shl,
            Lexeme::Shr,
        ]
    );
}

#[test]
fn test_indent_and_dedent() {
    let source = "def f(x: float64) -> float64:\n    y = x\n    return y\n";
    let tokens = lex(source);
    let layout: Vec<&Lexeme> = tokens
        .iter()
        .filter(|t| matches!(t, Lexeme::Newline | Lexeme::Indent | Lexeme::Dedent))
        .collect();
    assert_eq!(
        layout,
        vec![
            &Lexeme::Newline,
            &Lexeme::Indent,
            &Lexeme::Newline,
            &Lexeme::Newline,
            &Lexeme::Dedent,
        ]
    );
    assert_eq!(tokens.last(), Some(&Lexeme::Eof));
}

#[test]
fn test_nested_blocks_close_at_eof() {
    let source = "def f(x: float64) -> float64:\n    if x < 0.0:\n        x = 0.0\n    return x";
    let tokens = lex(source);
    let dedents = tokens.iter().filter(|t| **t == Lexeme::Dedent).count();
    let indents = tokens.iter().filter(|t| **t == Lexeme::Indent).count();
    assert_eq!(indents, 2);
    assert_eq!(dedents, 2);
}

#[test]
fn test_blank_lines_and_comments_are_ignored() {
    let source = "# header\n\ndef f(x: float64) -> float64:\n\n    # inside\n    return x  # trailing\n";
    let tokens = lex(source);
    assert_eq!(tokens[0], Lexeme::Def);
    let newlines = tokens.iter().filter(|t| **t == Lexeme::Newline).count();
    assert_eq!(newlines, 2);
}

#[test]
fn test_line_breaks_inside_parentheses() {
    let tokens = lex("y = (a +\n     b)\n");
    assert!(!tokens[..tokens.len() - 2].contains(&Lexeme::Newline));
    assert!(!tokens.contains(&Lexeme::Indent));
}

#[test]
fn test_backslash_continuation() {
    let tokens = lex("y = a + \\\n    b\n");
    assert_eq!(
        tokens,
        vec![
            Lexeme::Ident("y".into()),
            Lexeme::Eq,
            Lexeme::Ident("a".into()),
            Lexeme::Plus,
            Lexeme::Ident("b".into()),
            Lexeme::Newline,
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_inconsistent_dedent_is_error() {
    let errors = lex_errors("def f(x: float64) -> float64:\n    y = x\n  return y\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("unindent"));
}

#[test]
fn test_unexpected_character() {
    let errors = lex_errors("y = x % 2\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("unexpected character '%'"));
    assert!(errors[0].help.is_some());
}

#[test]
fn test_spans_cover_token_text() {
    let (tokens, _) = Lexer::new("abc = 1.25").tokenize();
    assert_eq!(tokens[0].span, Span::new(0, 3));
    assert_eq!(tokens[2].span, Span::new(6, 10));
}
