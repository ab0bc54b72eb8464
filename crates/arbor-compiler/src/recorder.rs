//! Write-only recorder sink for downstream tooling.
//!
//! The compiler appends (surface span → resolved symbol) and
//! (surface span → resolved type) pairs as it compiles; IDE-style
//! consumers read the stream afterwards. The core never reads it back.

use arbor_core::{Span, Type};

/// The sink interface. All methods are append-only.
pub trait Recorder {
    fn record_symbol(&mut self, span: Span, name: &str);
    fn record_type(&mut self, span: Span, ty: &Type);
    /// A lexical scope was opened (lambda parameters and the like),
    /// with the names declared in it.
    fn record_scope(&mut self, span: Span, names: &[String]);
}

/// An in-memory recorder.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    pub symbols: Vec<(Span, String)>,
    pub types: Vec<(Span, Type)>,
    pub scopes: Vec<(Span, Vec<String>)>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Recorder for MemoryRecorder {
    fn record_symbol(&mut self, span: Span, name: &str) {
        self.symbols.push((span, name.to_string()));
    }

    fn record_type(&mut self, span: Span, ty: &Type) {
        self.types.push((span, ty.clone()));
    }

    fn record_scope(&mut self, span: Span, names: &[String]) {
        self.scopes.push((span, names.to_vec()));
    }
}
