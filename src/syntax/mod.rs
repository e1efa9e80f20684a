//! Kernel source front end: spans, lexemes, the indentation-aware lexer,
//! and the Pratt parser producing `crate::ast`.

pub mod lexeme;
pub mod lexer;
pub mod parser;
pub mod span;
