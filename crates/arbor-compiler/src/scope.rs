//! Lexical scope for unit compilation.
//!
//! Tracks named bindings with block depth and shadowing restore, and
//! supports whole-state snapshots: the overload candidate resolver
//! captures a snapshot next to every builder checkpoint so that scope
//! insertions made during a failed candidate attempt (lambda
//! parameters, synthesized bindings) never leak into later attempts.

use rustc_hash::FxHashMap;

use arbor_core::{Span, Type};

/// A named binding in the current scope chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub ty: Type,
    /// Block depth where declared (0 = unit scope).
    pub depth: u32,
    pub span: Span,
}

/// Lexical scope of the unit being compiled.
#[derive(Debug, Default)]
pub struct LexicalScope {
    bindings: FxHashMap<String, Binding>,
    depth: u32,
    /// Shadowed bindings, saved with the depth that shadowed them.
    shadowed: Vec<(u32, Binding)>,
}

/// Full scope state captured at an attempt boundary.
#[derive(Debug, Clone)]
pub struct ScopeSnapshot {
    bindings: FxHashMap<String, Binding>,
    depth: u32,
    shadowed: Vec<(u32, Binding)>,
}

impl LexicalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a block scope.
    pub fn push_scope(&mut self) {
        self.depth += 1;
    }

    /// Leave the current block scope, dropping its bindings and
    /// restoring whatever they shadowed.
    pub fn pop_scope(&mut self) {
        self.bindings.retain(|_, b| b.depth < self.depth);
        while let Some((at, _)) = self.shadowed.last() {
            if *at != self.depth {
                break;
            }
            let (_, binding) = self.shadowed.pop().expect("checked non-empty");
            self.bindings.insert(binding.name.clone(), binding);
        }
        self.depth -= 1;
    }

    /// Declare a binding at the current depth, shadowing any outer one.
    pub fn declare(&mut self, name: &str, ty: Type, span: Span) {
        if let Some(existing) = self.bindings.get(name)
            && existing.depth < self.depth
        {
            self.shadowed.push((self.depth, existing.clone()));
        }
        self.bindings.insert(
            name.to_string(),
            Binding {
                name: name.to_string(),
                ty,
                depth: self.depth,
                span,
            },
        );
    }

    /// Look a name up through the scope chain.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Names declared at the current depth, for the recorder.
    pub fn names_at_current_depth(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .bindings
            .values()
            .filter(|b| b.depth == self.depth)
            .map(|b| b.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Capture the full scope state.
    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            bindings: self.bindings.clone(),
            depth: self.depth,
            shadowed: self.shadowed.clone(),
        }
    }

    /// Restore a captured state, discarding every later change.
    pub fn restore(&mut self, snapshot: ScopeSnapshot) {
        self.bindings = snapshot.bindings;
        self.depth = snapshot.depth;
        self.shadowed = snapshot.shadowed;
    }
}
