//! Per-unit compilation context.
//!
//! One `Context` plus one code-builder compile one unit (a function,
//! method or script body). Independent units may be compiled in
//! parallel by independent instances; nothing here is shared.

use std::cell::RefCell;
use std::rc::Rc;

use arbor_core::{ModuleEnv, Span, Type};

use crate::recorder::Recorder;
use crate::scope::LexicalScope;

/// The implicit receiver of a method-like unit (or of a selector
/// predicate, where the enumerated element is the subject).
#[derive(Debug, Clone, PartialEq)]
pub struct Receiver {
    /// Binding name the receiver loads under.
    pub binding: String,
    pub ty: Type,
}

/// Compilation context for one unit.
pub struct Context<'env> {
    env: &'env ModuleEnv,
    pub scope: LexicalScope,
    receiver: Option<Receiver>,
    method_unit: bool,
    unit_name: String,
    file: String,
    /// Declared result types of the enclosing unit; swapped while a
    /// lambda body compiles so `?` legality follows the lambda.
    results: Vec<Type>,
    recorder: Option<Rc<RefCell<dyn Recorder>>>,
}

impl<'env> Context<'env> {
    pub fn new(env: &'env ModuleEnv) -> Self {
        Self {
            env,
            scope: LexicalScope::new(),
            receiver: None,
            method_unit: false,
            unit_name: String::new(),
            file: String::new(),
            results: Vec::new(),
            recorder: None,
        }
    }

    /// Start compiling a plain unit.
    pub fn begin_unit(&mut self, name: &str, file: &str, results: Vec<Type>) {
        self.unit_name = name.to_string();
        self.file = file.to_string();
        self.results = results;
        self.method_unit = false;
        self.receiver = None;
        self.scope = LexicalScope::new();
    }

    /// Start compiling a method-like unit with an implicit receiver.
    pub fn begin_method_unit(
        &mut self,
        name: &str,
        file: &str,
        results: Vec<Type>,
        receiver: Receiver,
    ) {
        self.begin_unit(name, file, results);
        self.method_unit = true;
        self.scope
            .declare(&receiver.binding, receiver.ty.clone(), Span::default());
        self.receiver = Some(receiver);
    }

    pub fn env(&self) -> &'env ModuleEnv {
        self.env
    }

    pub fn receiver(&self) -> Option<&Receiver> {
        self.receiver.as_ref()
    }

    pub fn is_method_unit(&self) -> bool {
        self.method_unit
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Declared result types currently in effect (`?` legality).
    pub fn results(&self) -> &[Type] {
        &self.results
    }

    /// Swap the effective result types (lambda bodies), returning the
    /// previous ones for restoration.
    pub fn swap_results(&mut self, results: Vec<Type>) -> Vec<Type> {
        std::mem::replace(&mut self.results, results)
    }

    /// Swap the implicit receiver (selector predicates), returning the
    /// previous one for restoration.
    pub fn swap_receiver(&mut self, receiver: Option<Receiver>) -> Option<Receiver> {
        std::mem::replace(&mut self.receiver, receiver)
    }

    pub fn set_recorder(&mut self, recorder: Rc<RefCell<dyn Recorder>>) {
        self.recorder = Some(recorder);
    }

    pub fn record_symbol(&self, span: Span, name: &str) {
        if let Some(rec) = &self.recorder {
            rec.borrow_mut().record_symbol(span, name);
        }
    }

    pub fn record_type(&self, span: Span, ty: &Type) {
        if let Some(rec) = &self.recorder {
            rec.borrow_mut().record_type(span, ty);
        }
    }

    pub fn record_scope(&self, span: Span, names: &[String]) {
        if let Some(rec) = &self.recorder {
            rec.borrow_mut().record_scope(span, names);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::ModuleEnv;

    #[test]
    fn method_unit_declares_receiver_binding() {
        let env = ModuleEnv::new("main");
        let mut ctx = Context::new(&env);
        ctx.begin_method_unit(
            "render",
            "view.ab",
            vec![Type::Error],
            Receiver {
                binding: "self".to_string(),
                ty: Type::Node,
            },
        );
        assert!(ctx.is_method_unit());
        assert_eq!(ctx.scope.get("self").unwrap().ty, Type::Node);
        assert_eq!(ctx.results(), &[Type::Error]);
    }

    #[test]
    fn swap_results_round_trips() {
        let env = ModuleEnv::new("main");
        let mut ctx = Context::new(&env);
        ctx.begin_unit("f", "f.ab", vec![Type::Int, Type::Error]);
        let saved = ctx.swap_results(vec![Type::Bool]);
        assert_eq!(ctx.results(), &[Type::Bool]);
        ctx.swap_results(saved);
        assert_eq!(ctx.results(), &[Type::Int, Type::Error]);
    }
}
