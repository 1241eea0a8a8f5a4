//! The scenario-script language.
//!
//! # Architecture
//!
//! - `lexer` turns source text into tokens (case-insensitive outside strings).
//! - `compiler` type-checks and emits a [`Module`] of stack-machine ops.
//! - `vm` runs one entry point of a module against a [`Host`], which owns the
//!   per-engine HTTP session, parser and temp directory.
//! - `builtins`, `extract` and `parser` implement the functions scripts call.

pub mod builtins;
pub mod compiler;
pub mod extract;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod value;
pub mod vm;

pub use builtins::{Builtin, Host};
pub use compiler::compile;
pub use module::{Entry, Module, Op};
pub use parser::{FileParser, ParserKind};
pub use value::{Value, ValueType};
pub use vm::{Globals, Limits};
