use crate::ast::*;
use crate::lexeme::Lexeme;
use crate::span::Spanned;

use super::Parser;

impl Parser {
    pub(super) fn parse_expr(&mut self) -> Spanned<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Spanned<Expr> {
        let mut lhs = self.parse_prefix();
        let mut after_comparison = false;

        loop {
            let op = match self.peek() {
                Lexeme::Or => BinOp::Or,
                Lexeme::And => BinOp::And,
                Lexeme::EqEq => BinOp::Eq,
                Lexeme::NotEq => BinOp::Ne,
                Lexeme::Lt => BinOp::Lt,
                Lexeme::Le => BinOp::Le,
                Lexeme::Gt => BinOp::Gt,
                Lexeme::Ge => BinOp::Ge,
                Lexeme::Pipe => BinOp::BitOr,
                Lexeme::Caret => BinOp::BitXor,
                Lexeme::Amp => BinOp::BitAnd,
                Lexeme::Shl => BinOp::Shl,
                Lexeme::Shr => BinOp::Shr,
                Lexeme::Plus => BinOp::Add,
                Lexeme::Minus => BinOp::Sub,
                Lexeme::Star => BinOp::Mul,
                Lexeme::Slash => BinOp::Div,
                _ => break,
            };

            let (l_bp, r_bp) = op.binding_power();
            if l_bp < min_bp {
                break;
            }

            let op_span = self.current_span();
            if op.is_comparison() && after_comparison {
                self.error_at(
                    op_span,
                    "chained comparisons are not supported",
                    "split the comparison and join the parts with 'and'",
                );
            }
            after_comparison = op.is_comparison();

            self.advance(); // consume operator
            let rhs = self.parse_expr_bp(r_bp);
            let span = lhs.span.merge(rhs.span);
            lhs = Spanned::new(
                Expr::BinOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }

        lhs
    }

    fn parse_prefix(&mut self) -> Spanned<Expr> {
        let start = self.current_span();
        let op = match self.peek().clone() {
            Lexeme::Minus => UnaryOp::Neg,
            Lexeme::Plus => UnaryOp::Pos,
            Lexeme::Tilde => UnaryOp::Invert,
            Lexeme::Not => UnaryOp::Not,
            _ => {
                let primary = self.parse_primary();
                return self.parse_postfix(primary);
            }
        };
        self.advance();

        let bp = if op == UnaryOp::Not { NOT_BP } else { UNARY_BP };
        let operand = self.parse_expr_bp(bp);
        let span = start.merge(operand.span);

        // Fold the sign into numeric literals so `-1.5` is a single constant.
        match (op, &operand.node) {
            (UnaryOp::Neg, Expr::Literal(Literal::Integer(n))) => {
                Spanned::new(Expr::Literal(Literal::Integer(-n)), span)
            }
            (UnaryOp::Neg, Expr::Literal(Literal::Float(x))) => {
                Spanned::new(Expr::Literal(Literal::Float(-x)), span)
            }
            _ => Spanned::new(
                Expr::Unary {
                    op,
                    expr: Box::new(operand),
                },
                span,
            ),
        }
    }

    /// Parse postfix lane indexing: `v[0]`, `v[i][j]`.
    fn parse_postfix(&mut self, mut expr: Spanned<Expr>) -> Spanned<Expr> {
        while self.at(&Lexeme::LBracket) {
            self.advance();
            let index = self.parse_expr();
            self.expect(&Lexeme::RBracket);
            let span = expr.span.merge(self.prev_span());
            expr = Spanned::new(
                Expr::Index {
                    expr: Box::new(expr),
                    index: Box::new(index),
                },
                span,
            );
        }
        expr
    }

    fn parse_primary(&mut self) -> Spanned<Expr> {
        let start = self.current_span();

        match self.peek().clone() {
            Lexeme::Integer(n) => {
                self.advance();
                Spanned::new(Expr::Literal(Literal::Integer(n)), start)
            }
            Lexeme::Float(x) => {
                self.advance();
                Spanned::new(Expr::Literal(Literal::Float(x)), start)
            }
            Lexeme::LParen => {
                self.advance();
                let inner = self.parse_expr();
                if self.at(&Lexeme::Comma) {
                    self.error_with_help(
                        "tuples are not supported",
                        "kernels operate on scalars and vectors only",
                    );
                }
                self.expect(&Lexeme::RParen);
                Spanned::new(inner.node, start.merge(self.prev_span()))
            }
            Lexeme::Ident(name) => {
                self.advance();
                if self.at(&Lexeme::LParen) {
                    self.advance();
                    let args = self.parse_call_args();
                    self.expect(&Lexeme::RParen);
                    let span = start.merge(self.prev_span());
                    Spanned::new(
                        Expr::Call {
                            name: Spanned::new(name, start),
                            args,
                        },
                        span,
                    )
                } else {
                    Spanned::new(Expr::Var(name), start)
                }
            }
            _ => {
                self.error_with_help(
                    &format!("expected expression, found {}", self.peek().description()),
                    "expressions include literals (42, 1.5), variables, calls, and operators",
                );
                // Leave line structure intact so recovery can find it.
                if !matches!(
                    self.peek(),
                    Lexeme::Newline | Lexeme::Indent | Lexeme::Dedent | Lexeme::Eof
                ) {
                    self.advance();
                }
                Spanned::new(Expr::Literal(Literal::Integer(0)), start)
            }
        }
    }

    fn parse_call_args(&mut self) -> Vec<Spanned<Expr>> {
        let mut args = Vec::new();
        while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
            args.push(self.parse_expr());
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        args
    }
}
