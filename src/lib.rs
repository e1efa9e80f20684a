pub mod api;
pub mod ast;
pub mod codegen;
pub mod compile;
pub mod config;
pub mod diagnostic;
pub mod kernels;
pub mod lir;
pub mod registry;
pub mod runtime;
pub mod syntax;
pub mod target;
pub mod typecheck;
pub mod types;

// Re-exports: the front end is reachable as `crate::lexer` etc.
pub use syntax::lexeme;
pub use syntax::lexer;
pub use syntax::parser;
pub use syntax::span;

// Re-export public API: `simdkern::compile()` etc.
pub use api::*;
pub use registry::Registry;
pub use runtime::Value;
