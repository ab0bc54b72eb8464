//! Structured compile errors.
//!
//! Diagnostics are structured records: an [`ErrorKind`] carrying the
//! operands and a [`Span`]. Message text is produced by the pure
//! [`ErrorKind::render`] function, so rendering is testable on its own
//! and every caller formats the same way. Arity and type errors follow
//! the `have (...) / want (...)` convention throughout.
//!
//! [`BuildError`] is the code-builder's typed failure surface. The
//! overload candidate resolver inspects it to decide between retrying
//! the next candidate and failing the whole compilation.

use thiserror::Error;

use crate::span::Span;

/// A compile error: structured kind plus source position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("at {span}: {}", .kind.render())]
pub struct CompileError {
    pub kind: ErrorKind,
    pub span: Span,
}

impl CompileError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether an overload candidate attempt may absorb this error and
    /// retry the next candidate. Everything else is fatal to the
    /// enclosing compilation unit.
    pub fn is_candidate_failure(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ArityMismatch { .. }
                | ErrorKind::TypeMismatch { .. }
                | ErrorKind::TooFewValues { .. }
                | ErrorKind::TooManyValues { .. }
                | ErrorKind::NotCallable { .. }
                | ErrorKind::UnknownField { .. }
                | ErrorKind::MissingMapKey
        )
    }
}

/// The structured payload of a compile error.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// A bare name not found in any scope.
    UnresolvedIdent { name: String },
    /// A member not found on its receiver, after every fallback.
    UnresolvedMember { target: String, name: String },
    /// The same name supplied by two wildcard-imported packages.
    AmbiguousImport {
        name: String,
        first: String,
        second: String,
    },
    /// Wrong number of call arguments or lambda parameters.
    ArityMismatch {
        target: String,
        have: Vec<String>,
        want: Vec<String>,
    },
    /// A value used where an incompatible type is expected.
    TypeMismatch {
        target: String,
        have: String,
        want: String,
    },
    /// Positional struct literal with fewer values than fields.
    TooFewValues {
        type_name: String,
        have: usize,
        want: usize,
    },
    /// Composite literal with more values than the type holds.
    TooManyValues {
        type_name: String,
        have: usize,
        want: usize,
    },
    /// The same index keyed twice in a slice or array literal.
    DuplicateIndex { index: i64 },
    /// A keyed index outside the declared bound of an array literal.
    IndexOutOfRange { index: i64, len: u64 },
    /// An unkeyed element in a map literal.
    MissingMapKey,
    /// The same field keyed twice in a struct literal.
    DuplicateField { field: String },
    /// Keyed and positional elements mixed in one literal.
    MixedLiteralKeys,
    /// A literal key naming no field of the struct type.
    UnknownField { type_name: String, field: String },
    /// A selector predicate or step that does not type-check.
    InvalidSelector { detail: String },
    /// Generic instantiation could not determine a type parameter.
    UninferableTypeParam { name: String },
    /// An error-wrap operator used where it cannot apply.
    ErrWrapMisuse {
        op: &'static str,
        detail: String,
    },
    /// Call of a value whose type has no signatures.
    NotCallable { type_name: String },
    /// An internal invariant broke; always a bug.
    Internal { message: String },
}

impl ErrorKind {
    /// Render the human-readable message. Pure: same kind, same text.
    pub fn render(&self) -> String {
        match self {
            ErrorKind::UnresolvedIdent { name } => format!("undefined: {name}"),
            ErrorKind::UnresolvedMember { target, name } => {
                format!("undefined: {target}.{name}")
            }
            ErrorKind::AmbiguousImport {
                name,
                first,
                second,
            } => format!("ambiguous name '{name}': imported from both '{first}' and '{second}'"),
            ErrorKind::ArityMismatch { target, have, want } => format!(
                "wrong number of arguments to {target}: have ({}), want ({})",
                have.join(", "),
                want.join(", "),
            ),
            ErrorKind::TypeMismatch { target, have, want } => {
                format!("type mismatch in {target}: have ({have}), want ({want})")
            }
            ErrorKind::TooFewValues {
                type_name,
                have,
                want,
            } => format!("too few values in {type_name} literal: have {have}, want {want}"),
            ErrorKind::TooManyValues {
                type_name,
                have,
                want,
            } => format!("too many values in {type_name} literal: have {have}, want {want}"),
            ErrorKind::DuplicateIndex { index } => {
                format!("duplicate index {index} in literal")
            }
            ErrorKind::IndexOutOfRange { index, len } => {
                format!("index {index} out of range [0, {len}) in literal")
            }
            ErrorKind::MissingMapKey => "missing key in map literal".to_string(),
            ErrorKind::DuplicateField { field } => {
                format!("duplicate field '{field}' in literal")
            }
            ErrorKind::MixedLiteralKeys => {
                "mixed keyed and positional elements in literal".to_string()
            }
            ErrorKind::UnknownField { type_name, field } => {
                format!("unknown field '{field}' in {type_name} literal")
            }
            ErrorKind::InvalidSelector { detail } => {
                format!("invalid selector: {detail}")
            }
            ErrorKind::UninferableTypeParam { name } => {
                format!("cannot infer type parameter '{name}'")
            }
            ErrorKind::ErrWrapMisuse { op, detail } => {
                format!("cannot use '{op}' here: {detail}")
            }
            ErrorKind::NotCallable { type_name } => {
                format!("cannot call value of type '{type_name}'")
            }
            ErrorKind::Internal { message } => format!("internal: {message}"),
        }
    }
}

/// Typed failures raised by the code-builder.
///
/// The candidate resolver absorbs `UnknownMember`, `TypeMismatch`,
/// `Arity` and `NotCallable` as candidate-specific mismatches;
/// `Uninferable` and the stack errors are hard failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("no member '{name}' on type '{on}'")]
    UnknownMember { name: String, on: String },
    #[error("cannot use value of type '{found}' as '{expected}'")]
    TypeMismatch { expected: String, found: String },
    #[error("call arity mismatch: have {have}, want {want}")]
    Arity { have: usize, want: usize },
    #[error("cannot call value of type '{ty}'")]
    NotCallable { ty: String },
    #[error("cannot infer type parameter '{name}'")]
    Uninferable { name: String },
    #[error("value stack underflow")]
    StackUnderflow,
    #[error("invalid builder operation: {message}")]
    InvalidOp { message: String },
}

impl BuildError {
    /// Whether an overload candidate attempt may absorb this failure.
    pub fn is_candidate_failure(&self) -> bool {
        matches!(
            self,
            BuildError::UnknownMember { .. }
                | BuildError::TypeMismatch { .. }
                | BuildError::Arity { .. }
                | BuildError::NotCallable { .. }
        )
    }
}
