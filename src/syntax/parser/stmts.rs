use crate::ast::*;
use crate::lexeme::Lexeme;
use crate::span::Spanned;

use super::Parser;

impl Parser {
    /// `def name(a: type, ...) -> type:` and its body.
    pub(super) fn parse_def(&mut self) -> KernelDef {
        self.expect(&Lexeme::Def);
        let name = self.expect_ident();

        self.expect(&Lexeme::LParen);
        let mut params = Vec::new();
        while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
            let pname = self.expect_ident();
            if !self.at(&Lexeme::Colon) {
                self.error_with_help(
                    &format!("parameter '{}' has no type annotation", pname.node),
                    "annotate every parameter, e.g. 'x: float64x4'",
                );
            } else {
                self.advance();
            }
            let ty = self.parse_type_name();
            params.push(Param { name: pname, ty });
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        self.expect(&Lexeme::RParen);

        let ret = if self.eat(&Lexeme::Arrow) {
            self.parse_type_name()
        } else {
            self.error_with_help(
                &format!("'{}' has no return type annotation", name.node),
                "add '-> type' before the colon",
            );
            Spanned::new(String::new(), self.current_span())
        };

        self.expect(&Lexeme::Colon);
        let body = self.parse_block();

        KernelDef {
            name,
            params,
            ret,
            body,
        }
    }

    /// A type annotation: a type name, optionally written as a call `float64()`.
    fn parse_type_name(&mut self) -> Spanned<String> {
        let name = self.expect_ident();
        if self.at(&Lexeme::LParen) && self.peek_at(1) == &Lexeme::RParen {
            self.advance();
            self.advance();
        }
        name
    }

    /// A block after `:` is either an indented suite or one simple
    /// statement on the same line.
    pub(super) fn parse_block(&mut self) -> Block {
        if !self.eat(&Lexeme::Newline) {
            return self.parse_simple_stmt().into_iter().collect();
        }
        if !self.eat(&Lexeme::Indent) {
            self.error_with_help(
                "expected an indented block",
                "indent the body of 'def', 'if', 'elif', 'else' and 'while'",
            );
            return Vec::new();
        }

        let mut stmts = Vec::new();
        while !self.at(&Lexeme::Dedent) && !self.at(&Lexeme::Eof) {
            let before = self.pos;
            if let Some(stmt) = self.parse_stmt() {
                stmts.push(stmt);
            }
            if self.pos == before {
                self.advance();
            }
        }
        self.eat(&Lexeme::Dedent);
        stmts
    }

    fn parse_stmt(&mut self) -> Option<Spanned<Stmt>> {
        let start = self.current_span();
        match self.peek().clone() {
            Lexeme::Def => {
                let def = self.parse_def();
                Some(Spanned::new(Stmt::Def(def), start.merge(self.prev_span())))
            }
            Lexeme::If => Some(self.parse_if()),
            Lexeme::While => {
                self.advance();
                let cond = self.parse_expr();
                self.expect(&Lexeme::Colon);
                let body = self.parse_block();
                Some(Spanned::new(
                    Stmt::While { cond, body },
                    start.merge(self.prev_span()),
                ))
            }
            Lexeme::Indent => {
                self.error("unexpected indent");
                self.synchronize();
                None
            }
            _ => self.parse_simple_stmt(),
        }
    }

    fn parse_if(&mut self) -> Spanned<Stmt> {
        let start = self.current_span();
        self.expect(&Lexeme::If);
        let mut branches = Vec::new();
        let cond = self.parse_expr();
        self.expect(&Lexeme::Colon);
        branches.push((cond, self.parse_block()));

        while self.eat(&Lexeme::Elif) {
            let cond = self.parse_expr();
            self.expect(&Lexeme::Colon);
            branches.push((cond, self.parse_block()));
        }

        let else_body = if self.eat(&Lexeme::Else) {
            self.expect(&Lexeme::Colon);
            Some(self.parse_block())
        } else {
            None
        };

        Spanned::new(
            Stmt::If {
                branches,
                else_body,
            },
            start.merge(self.prev_span()),
        )
    }

    /// `return e`, `pass`, `x = e` or `x op= e`, terminated by end of line.
    fn parse_simple_stmt(&mut self) -> Option<Spanned<Stmt>> {
        let start = self.current_span();
        let stmt = match self.peek().clone() {
            Lexeme::Return => {
                self.advance();
                if matches!(self.peek(), Lexeme::Newline | Lexeme::Dedent | Lexeme::Eof) {
                    self.error_with_help(
                        "'return' needs a value",
                        "every kernel returns exactly one value",
                    );
                    return None;
                }
                Stmt::Return(self.parse_expr())
            }
            Lexeme::Pass => {
                self.advance();
                Stmt::Pass
            }
            Lexeme::Ident(name) => {
                let op = match self.peek_at(1).clone() {
                    Lexeme::Eq => None,
                    Lexeme::PlusEq => Some(BinOp::Add),
                    Lexeme::MinusEq => Some(BinOp::Sub),
                    Lexeme::StarEq => Some(BinOp::Mul),
                    Lexeme::SlashEq => Some(BinOp::Div),
                    _ => {
                        self.error_with_help(
                            &format!("expected statement, found {}", self.peek().description()),
                            "a bare expression has no effect; assign it or return it",
                        );
                        self.synchronize();
                        return None;
                    }
                };
                let target = Spanned::new(name, start);
                self.advance();
                self.advance();
                let value = self.parse_expr();
                Stmt::Assign { target, op, value }
            }
            _ => {
                self.error_with_help(
                    &format!("expected statement, found {}", self.peek().description()),
                    "statements are 'def', 'if', 'while', 'return', 'pass' and assignments",
                );
                self.synchronize();
                return None;
            }
        };

        let span = start.merge(self.prev_span());
        self.end_line();
        Some(Spanned::new(stmt, span))
    }

    fn end_line(&mut self) {
        match self.peek().clone() {
            Lexeme::Newline => self.advance(),
            Lexeme::Dedent | Lexeme::Eof => {}
            _ => {
                self.error(&format!(
                    "expected end of line, found {}",
                    self.peek().description()
                ));
                self.synchronize();
            }
        }
    }
}
