use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

mod expr;
mod stmts;
#[cfg(test)]
mod tests;

/// Recursive-descent parser over the lexer's token stream.
///
/// Errors are accumulated; after an error the parser skips to the end of
/// the offending line and continues, so one pass reports every problem.
pub(crate) struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn parse_file(mut self) -> Result<File, Vec<Diagnostic>> {
        let mut kernels = Vec::new();
        self.skip_newlines();
        while !self.at(&Lexeme::Eof) {
            if self.at(&Lexeme::Def) {
                kernels.push(self.parse_def());
            } else {
                let before = self.pos;
                self.error_with_help(
                    &format!("expected 'def', found {}", self.peek().description()),
                    "a kernel file contains only 'def' blocks at the top level",
                );
                self.synchronize();
                if self.pos == before {
                    self.advance();
                }
            }
            self.skip_newlines();
        }

        if kernels.is_empty() && self.diagnostics.is_empty() {
            self.diagnostics.push(Diagnostic::error(
                "no kernel definition found".to_string(),
                self.current_span(),
            ));
        }

        if self.diagnostics.is_empty() {
            Ok(File { kernels })
        } else {
            Err(self.diagnostics)
        }
    }

    // --- Token helpers ---

    fn peek(&self) -> &Lexeme {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].node
    }

    fn peek_at(&self, offset: usize) -> &Lexeme {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return self.current_span();
        }
        self.tokens[(self.pos - 1).min(self.tokens.len() - 1)].span
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn at(&self, lexeme: &Lexeme) -> bool {
        self.peek() == lexeme
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.at(lexeme) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: &Lexeme) -> Span {
        let span = self.current_span();
        if !self.eat(lexeme) {
            self.error(&format!(
                "expected {}, found {}",
                lexeme.description(),
                self.peek().description()
            ));
        }
        span
    }

    fn expect_ident(&mut self) -> Spanned<String> {
        let span = self.current_span();
        if let Lexeme::Ident(name) = self.peek().clone() {
            self.advance();
            Spanned::new(name, span)
        } else {
            self.error(&format!(
                "expected identifier, found {}",
                self.peek().description()
            ));
            Spanned::new(String::new(), span)
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Lexeme::Newline) {}
    }

    // --- Diagnostics ---

    fn error(&mut self, message: &str) {
        let span = self.current_span();
        self.diagnostics
            .push(Diagnostic::error(message.to_string(), span));
    }

    fn error_with_help(&mut self, message: &str, help: &str) {
        let span = self.current_span();
        self.diagnostics
            .push(Diagnostic::error(message.to_string(), span).with_help(help.to_string()));
    }

    fn error_at(&mut self, span: Span, message: &str, help: &str) {
        self.diagnostics
            .push(Diagnostic::error(message.to_string(), span).with_help(help.to_string()));
    }

    /// Skip past the end of the current line (or to the end of the block).
    fn synchronize(&mut self) {
        loop {
            match self.peek().clone() {
                Lexeme::Newline => {
                    self.advance();
                    return;
                }
                Lexeme::Dedent | Lexeme::Eof => return,
                Lexeme::Indent => {
                    // Skip a whole unexpected block.
                    let mut depth = 0usize;
                    loop {
                        match self.peek().clone() {
                            Lexeme::Indent => depth += 1,
                            Lexeme::Dedent => {
                                depth -= 1;
                                if depth == 0 {
                                    self.advance();
                                    return;
                                }
                            }
                            Lexeme::Eof => return,
                            _ => {}
                        }
                        self.advance();
                    }
                }
                _ => self.advance(),
            }
        }
    }
}
