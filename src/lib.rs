// botlang Language Library
//
// The core of a small, statically typed scripting language for controlling
// robots in a turn-based simulation: a scanner, a type-checking parser and a
// tree-walking evaluator that reaches the host only through native functions.

// Public modules
pub mod ast;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod natives;
pub mod parser;
pub mod position;
pub mod repl;
pub mod runner;
pub mod stack;
pub mod types;
pub mod value;

// Re-export commonly used items
pub use ast::{Node, NodeKind, Program};
pub use config::RunConfig;
pub use context::{FunctionSignature, IdentifierContext};
pub use error::{BotError, ErrorKind};
pub use evaluator::{Evaluator, Flow, Scope, ScopeRef};
pub use lexer::{Lexer, Token, TokenType};
pub use natives::{Console, NativeFunction, NativeTable};
pub use parser::Parser;
pub use position::{Position, Span};
pub use types::{Primitive, Type};
pub use value::Value;

// Re-export main functions
pub use repl::{start as start_repl, Session};
pub use runner::{compile, run, run_with_config};
