//! Arbor expression compiler.
//!
//! The type-directed core that rewrites the Arbor surface language -
//! command-style calls with keyword arguments, lambda literals,
//! error-wrap operators, type-eliding composite literals and the
//! tree-query selector sublanguage - into a typed target IR through
//! the opaque code-builder API.
//!
//! ## Modules
//!
//! - [`builder`]: the code-builder interface, its checkpoint/rollback
//!   boundary, and the reference IR builder
//! - [`context`]: per-unit compilation context
//! - [`expr`]: the expression compiler with bidirectional type
//!   checking, and its component modules (calls/overloads, generics,
//!   lambdas, composite literals, query selectors, error wrapping)
//! - [`recorder`]: write-only sink of resolved symbols and types for
//!   downstream tooling
//! - [`resolver`]: bare-name resolution (scope chain, implicit
//!   receiver, packages, wildcard imports, builtins, alias fallback)
//! - [`scope`]: lexical scope with snapshot-based rollback

pub mod builder;
pub mod context;
pub mod expr;
pub mod recorder;
pub mod resolver;
pub mod scope;

pub use builder::{
    BinaryOp, Checkpoint, CodeBuilder, ConstId, ConstantPool, ErrorNote, Ir, IrBuilder, UnaryOp,
};
pub use context::{Context, Receiver};
pub use expr::{ExprCompiler, ExprInfo};
pub use recorder::{MemoryRecorder, Recorder};
pub use resolver::{Resolution, resolve_callee, resolve_name};
pub use scope::{Binding, LexicalScope, ScopeSnapshot};

// Re-export the error types for convenience.
pub use arbor_core::{BuildError, CompileError, ErrorKind};
