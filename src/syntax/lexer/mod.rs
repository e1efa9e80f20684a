use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

#[cfg(test)]
mod tests;

/// Indentation-aware lexer for kernel source.
///
/// Produces `Newline` at the end of every logical line, `Indent`/`Dedent`
/// when the leading whitespace of a line grows or shrinks, and ignores
/// line breaks inside parentheses and brackets.
pub(crate) struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    tokens: Vec<Spanned<Lexeme>>,
    /// Stack of active indentation columns; the bottom entry is always 0.
    indents: Vec<usize>,
    /// Nesting depth of `(` and `[`.
    depth: u32,
}

impl<'src> Lexer<'src> {
    pub(crate) fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            diagnostics: Vec::new(),
            tokens: Vec::new(),
            indents: vec![0],
            depth: 0,
        }
    }

    pub(crate) fn tokenize(mut self) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.depth == 0 {
                if !self.scan_indentation() {
                    break;
                }
                at_line_start = false;
            }

            self.skip_inline_whitespace();
            if self.pos >= self.source.len() {
                break;
            }

            match self.source[self.pos] {
                b'#' => {
                    while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                    continue;
                }
                b'\n' => {
                    let at = self.pos;
                    self.pos += 1;
                    if self.depth == 0 {
                        self.push_newline(at);
                        at_line_start = true;
                    }
                    continue;
                }
                b'\\' if self.peek_byte(1) == Some(b'\n') => {
                    self.pos += 2;
                    continue;
                }
                b'\\' if self.peek_byte(1) == Some(b'\r') && self.peek_byte(2) == Some(b'\n') => {
                    self.pos += 3;
                    continue;
                }
                _ => {}
            }

            if let Some(tok) = self.scan_token() {
                self.tokens.push(tok);
            }
        }

        let end = self.source.len();
        self.push_newline(end);
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Lexeme::Dedent, end, end);
        }
        self.push(Lexeme::Eof, end, end);
        (self.tokens, self.diagnostics)
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn push(&mut self, lexeme: Lexeme, start: usize, end: usize) {
        self.tokens
            .push(Spanned::new(lexeme, Span::new(start as u32, end as u32)));
    }

    /// Emit a `Newline` unless the current logical line is empty.
    fn push_newline(&mut self, at: usize) {
        match self.tokens.last().map(|t| &t.node) {
            None | Some(Lexeme::Newline) | Some(Lexeme::Indent) | Some(Lexeme::Dedent) => {}
            Some(_) => self.push(Lexeme::Newline, at, at),
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while self.pos < self.source.len() {
            match self.source[self.pos] {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' if self.depth > 0 => self.pos += 1,
                _ => break,
            }
        }
    }

    /// Measure the indentation of the next non-blank line and emit
    /// `Indent`/`Dedent` tokens. Returns false at end of input.
    fn scan_indentation(&mut self) -> bool {
        loop {
            let line_start = self.pos;
            let mut column = 0usize;
            while self.pos < self.source.len() {
                match self.source[self.pos] {
                    b' ' => column += 1,
                    b'\t' => column = (column / 8 + 1) * 8,
                    b'\r' => {}
                    _ => break,
                }
                self.pos += 1;
            }

            if self.pos >= self.source.len() {
                return false;
            }

            // Blank and comment-only lines do not affect indentation.
            match self.source[self.pos] {
                b'\n' => {
                    self.pos += 1;
                    continue;
                }
                b'#' => {
                    while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                    continue;
                }
                _ => {}
            }

            let current = self.indents.last().copied().unwrap_or(0);
            if column > current {
                self.indents.push(column);
                self.push(Lexeme::Indent, line_start, self.pos);
            } else if column < current {
                while self.indents.last().is_some_and(|&c| c > column) {
                    self.indents.pop();
                    self.push(Lexeme::Dedent, line_start, self.pos);
                }
                if self.indents.last().copied().unwrap_or(0) != column {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "unindent does not match any outer indentation level".to_string(),
                            Span::new(line_start as u32, self.pos as u32),
                        )
                        .with_help("indent blocks consistently".to_string()),
                    );
                    self.indents.push(column);
                }
            }
            return true;
        }
    }

    fn scan_token(&mut self) -> Option<Spanned<Lexeme>> {
        let ch = self.source[self.pos];

        if is_ident_start(ch) {
            return Some(self.scan_ident_or_keyword());
        }

        if ch.is_ascii_digit()
            || (ch == b'.' && self.peek_byte(1).is_some_and(|c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        self.scan_symbol()
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        let token = Lexeme::from_keyword(&text).unwrap_or(Lexeme::Ident(text));
        Spanned::new(token, Span::new(start as u32, self.pos as u32))
    }

    fn scan_number(&mut self) -> Option<Spanned<Lexeme>> {
        let start = self.pos;

        if self.source[self.pos] == b'0' && matches!(self.peek_byte(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.pos < self.source.len()
                && (self.source[self.pos].is_ascii_hexdigit() || self.source[self.pos] == b'_')
            {
                self.pos += 1;
            }
            let digits: String = self.source[digits_start..self.pos]
                .iter()
                .filter(|&&b| b != b'_')
                .map(|&b| b as char)
                .collect();
            let span = Span::new(start as u32, self.pos as u32);
            return match u64::from_str_radix(&digits, 16) {
                Ok(value) => Some(Spanned::new(Lexeme::Integer(value as i128), span)),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        "invalid hexadecimal literal".to_string(),
                        span,
                    ));
                    None
                }
            };
        }

        let mut text = String::new();
        let mut is_float = false;
        self.take_digits(&mut text);

        if self.pos < self.source.len() && self.source[self.pos] == b'.' {
            is_float = true;
            self.pos += 1;
            if text.is_empty() {
                text.push('0');
            }
            text.push('.');
            let before = text.len();
            self.take_digits(&mut text);
            if text.len() == before {
                text.push('0');
            }
        }

        if self.pos < self.source.len() && matches!(self.source[self.pos], b'e' | b'E') {
            let sign = self.peek_byte(1);
            let exponent_follows = match sign {
                Some(b'+' | b'-') => self.peek_byte(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_follows {
                is_float = true;
                text.push('e');
                self.pos += 1;
                if let Some(s @ (b'+' | b'-')) = self.peek_byte(0) {
                    text.push(s as char);
                    self.pos += 1;
                }
                self.take_digits(&mut text);
            }
        }

        let span = Span::new(start as u32, self.pos as u32);
        if is_float {
            match text.parse::<f64>() {
                Ok(value) => Some(Spanned::new(Lexeme::Float(value), span)),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        format!("invalid float literal '{}'", text),
                        span,
                    ));
                    None
                }
            }
        } else {
            match text.parse::<u64>() {
                Ok(value) => Some(Spanned::new(Lexeme::Integer(value as i128), span)),
                Err(_) => {
                    self.diagnostics.push(
                        Diagnostic::error(format!("integer literal '{}' is too large", text), span)
                            .with_help("integer literals must fit in 64 bits".to_string()),
                    );
                    None
                }
            }
        }
    }

    fn take_digits(&mut self, out: &mut String) {
        while self.pos < self.source.len() {
            let c = self.source[self.pos];
            if c.is_ascii_digit() {
                out.push(c as char);
            } else if c != b'_' {
                break;
            }
            self.pos += 1;
        }
    }

    fn scan_symbol(&mut self) -> Option<Spanned<Lexeme>> {
        let start = self.pos;
        let ch = self.source[self.pos];
        let next = self.peek_byte(1);

        let two = match (ch, next) {
            (b'-', Some(b'>')) => Some(Lexeme::Arrow),
            (b'+', Some(b'=')) => Some(Lexeme::PlusEq),
            (b'-', Some(b'=')) => Some(Lexeme::MinusEq),
            (b'*', Some(b'=')) => Some(Lexeme::StarEq),
            (b'/', Some(b'=')) => Some(Lexeme::SlashEq),
            (b'=', Some(b'=')) => Some(Lexeme::EqEq),
            (b'!', Some(b'=')) => Some(Lexeme::NotEq),
            (b'<', Some(b'=')) => Some(Lexeme::Le),
            (b'>', Some(b'=')) => Some(Lexeme::Ge),
            (b'<', Some(b'<')) => Some(Lexeme::Shl),
            (b'>', Some(b'>')) => Some(Lexeme::Shr),
            _ => None,
        };
        if let Some(tok) = two {
            self.pos += 2;
            return Some(Spanned::new(tok, Span::new(start as u32, self.pos as u32)));
        }

        let one = match ch {
            b'(' => {
                self.depth += 1;
                Lexeme::LParen
            }
            b')' => {
                self.depth = self.depth.saturating_sub(1);
                Lexeme::RParen
            }
            b'[' => {
                self.depth += 1;
                Lexeme::LBracket
            }
            b']' => {
                self.depth = self.depth.saturating_sub(1);
                Lexeme::RBracket
            }
            b',' => Lexeme::Comma,
            b':' => Lexeme::Colon,
            b'=' => Lexeme::Eq,
            b'<' => Lexeme::Lt,
            b'>' => Lexeme::Gt,
            b'+' => Lexeme::Plus,
            b'-' => Lexeme::Minus,
            b'*' => Lexeme::Star,
            b'/' => Lexeme::Slash,
            b'&' => Lexeme::Amp,
            b'|' => Lexeme::Pipe,
            b'^' => Lexeme::Caret,
            b'~' => Lexeme::Tilde,
            _ => {
                let shown = String::from_utf8_lossy(&self.source[start..start + 1]).into_owned();
                self.pos += 1;
                let mut diag = Diagnostic::error(
                    format!("unexpected character '{}'", shown),
                    Span::new(start as u32, self.pos as u32),
                );
                if ch == b'%' {
                    diag = diag.with_help("'%' is not part of the kernel language".into());
                }
                self.diagnostics.push(diag);
                return None;
            }
        };
        self.pos += 1;
        Some(Spanned::new(one, Span::new(start as u32, self.pos as u32)))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}
