/// All lexemes of the kernel language.
#[derive(Clone, Debug, PartialEq)]
pub enum Lexeme {
    // Keywords
    Def,
    If,
    Elif,
    Else,
    While,
    Return,
    Pass,
    And,
    Or,
    Not,

    // Symbols
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Colon,    // :
    Arrow,    // ->
    Eq,       // =
    PlusEq,   // +=
    MinusEq,  // -=
    StarEq,   // *=
    SlashEq,  // /=
    EqEq,     // ==
    NotEq,    // !=
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Amp,      // &
    Pipe,     // |
    Caret,    // ^
    Tilde,    // ~
    Shl,      // <<
    Shr,      // >>

    // Literals
    Integer(i128),
    Float(f64),
    Ident(String),

    // Layout
    Newline,
    Indent,
    Dedent,

    // End of file
    Eof,
}

impl Lexeme {
    /// Try to match an identifier string to a keyword.
    pub fn from_keyword(s: &str) -> Option<Lexeme> {
        match s {
            "def" => Some(Lexeme::Def),
            "if" => Some(Lexeme::If),
            "elif" => Some(Lexeme::Elif),
            "else" => Some(Lexeme::Else),
            "while" => Some(Lexeme::While),
            "return" => Some(Lexeme::Return),
            "pass" => Some(Lexeme::Pass),
            "and" => Some(Lexeme::And),
            "or" => Some(Lexeme::Or),
            "not" => Some(Lexeme::Not),
            _ => None,
        }
    }

    /// Human-readable description for error messages.
    pub fn description(&self) -> String {
        match self {
            Lexeme::Def => "'def'".into(),
            Lexeme::If => "'if'".into(),
            Lexeme::Elif => "'elif'".into(),
            Lexeme::Else => "'else'".into(),
            Lexeme::While => "'while'".into(),
            Lexeme::Return => "'return'".into(),
            Lexeme::Pass => "'pass'".into(),
            Lexeme::And => "'and'".into(),
            Lexeme::Or => "'or'".into(),
            Lexeme::Not => "'not'".into(),
            Lexeme::LParen => "'('".into(),
            Lexeme::RParen => "')'".into(),
            Lexeme::LBracket => "'['".into(),
            Lexeme::RBracket => "']'".into(),
            Lexeme::Comma => "','".into(),
            Lexeme::Colon => "':'".into(),
            Lexeme::Arrow => "'->'".into(),
            Lexeme::Eq => "'='".into(),
            Lexeme::PlusEq => "'+='".into(),
            Lexeme::MinusEq => "'-='".into(),
            Lexeme::StarEq => "'*='".into(),
            Lexeme::SlashEq => "'/='".into(),
            Lexeme::EqEq => "'=='".into(),
            Lexeme::NotEq => "'!='".into(),
            Lexeme::Lt => "'<'".into(),
            Lexeme::Le => "'<='".into(),
            Lexeme::Gt => "'>'".into(),
            Lexeme::Ge => "'>='".into(),
            Lexeme::Plus => "'+'".into(),
            Lexeme::Minus => "'-'".into(),
            Lexeme::Star => "'*'".into(),
            Lexeme::Slash => "'/'".into(),
            Lexeme::Amp => "'&'".into(),
            Lexeme::Pipe => "'|'".into(),
            Lexeme::Caret => "'^'".into(),
            Lexeme::Tilde => "'~'".into(),
            Lexeme::Shl => "'<<'".into(),
            Lexeme::Shr => "'>>'".into(),
            Lexeme::Integer(n) => format!("integer {}", n),
            Lexeme::Float(x) => format!("float {}", x),
            Lexeme::Ident(name) => format!("identifier '{}'", name),
            Lexeme::Newline => "end of line".into(),
            Lexeme::Indent => "indent".into(),
            Lexeme::Dedent => "dedent".into(),
            Lexeme::Eof => "end of file".into(),
        }
    }
}
