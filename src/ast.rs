use crate::span::Spanned;

/// A parsed kernel source file: one or more top-level kernel definitions.
#[derive(Clone, Debug)]
pub struct File {
    pub kernels: Vec<KernelDef>,
}

/// `def name(p: type, ...) -> type:` followed by an indented body.
///
/// Used both for top-level kernels and for nested helper definitions,
/// which are inlined at their call sites.
#[derive(Clone, Debug)]
pub struct KernelDef {
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub ret: Spanned<String>,
    pub body: Block,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: Spanned<String>,
    pub ty: Spanned<String>,
}

pub type Block = Vec<Spanned<Stmt>>;

#[derive(Clone, Debug)]
pub enum Stmt {
    /// Nested helper definition.
    Def(KernelDef),
    /// `x = e` or an augmented form such as `x += e` (`op` is the operator).
    Assign {
        target: Spanned<String>,
        op: Option<BinOp>,
        value: Spanned<Expr>,
    },
    /// `if`/`elif`/`else` chain; `branches` holds the `if` and every `elif`.
    If {
        branches: Vec<(Spanned<Expr>, Block)>,
        else_body: Option<Block>,
    },
    While {
        cond: Spanned<Expr>,
        body: Block,
    },
    Return(Spanned<Expr>),
    Pass,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var(String),
    BinOp {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Spanned<Expr>>,
    },
    Call {
        name: Spanned<String>,
        args: Vec<Spanned<Expr>>,
    },
    Index {
        expr: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Integer(i128),
    Float(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,    // +
    Sub,    // -
    Mul,    // *
    Div,    // /
    Eq,     // ==
    Ne,     // !=
    Lt,     // <
    Le,     // <=
    Gt,     // >
    Ge,     // >=
    BitAnd, // &
    BitOr,  // |
    BitXor, // ^
    Shl,    // <<
    Shr,    // >>
    And,    // and
    Or,     // or
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    /// Pratt binding powers, following Python precedence.
    pub fn binding_power(&self) -> (u8, u8) {
        match self {
            BinOp::Or => (1, 2),
            BinOp::And => (3, 4),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (7, 8),
            BinOp::BitOr => (9, 10),
            BinOp::BitXor => (11, 12),
            BinOp::BitAnd => (13, 14),
            BinOp::Shl | BinOp::Shr => (15, 16),
            BinOp::Add | BinOp::Sub => (17, 18),
            BinOp::Mul | BinOp::Div => (19, 20),
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor)
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr)
    }
}

/// Binding power of prefix `not`.
pub const NOT_BP: u8 = 5;
/// Binding power of prefix `-`, `+` and `~`.
pub const UNARY_BP: u8 = 21;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,    // -
    Pos,    // +
    Not,    // not
    Invert, // ~
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Not => "not",
            UnaryOp::Invert => "~",
        }
    }
}

impl Expr {
    /// True for expressions that need no registers to evaluate beyond
    /// their own result.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Var(_))
    }
}

/// Visit every statement of a block, descending into `if`/`while`
/// bodies but not into nested definitions.
pub fn walk_stmts<'a>(block: &'a Block, f: &mut impl FnMut(&'a Stmt)) {
    for stmt in block {
        f(&stmt.node);
        match &stmt.node {
            Stmt::If {
                branches,
                else_body,
            } => {
                for (_, body) in branches {
                    walk_stmts(body, f);
                }
                if let Some(body) = else_body {
                    walk_stmts(body, f);
                }
            }
            Stmt::While { body, .. } => walk_stmts(body, f),
            _ => {}
        }
    }
}

/// Names assigned anywhere in `block` (including nested control flow).
pub fn assigned_vars(block: &Block) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    walk_stmts(block, &mut |stmt| {
        if let Stmt::Assign { target, .. } = stmt {
            if !names.contains(&target.node) {
                names.push(target.node.clone());
            }
        }
    });
    names
}
