//! Member access and the query-selector sublanguage.
//!
//! A dotted name compiles as a plain member or method first (with a
//! capitalization fallback) and only then as a child selection, so
//! ordinary typed code and tree queries share one syntax. The selector
//! steps rewrite onto the external query runtime:
//!
//! | surface          | rewrite                          |
//! |------------------|----------------------------------|
//! | `x.name`         | `x.ChildByName("name")` (fallback) |
//! | `x."name"`       | `x.ChildByName("name")`          |
//! | `x.*`            | `x.Children()`                   |
//! | `x.**.name`      | `x.AnyDescendant("name")`        |
//! | `x.**.*`         | `x.AnyDescendant("")`            |
//! | `x.$attr`        | `x.Attribute("attr")`            |
//! | `x.select(cond)` | first-match enumeration closure  |
//!
//! Receivers of static type `any` or a map type are lifted into the
//! runtime's Node first, so the same selector syntax works over typed
//! trees and untyped decoded data. Quoted names are unquoted at
//! compile time.
//!
//! Conditional selection emits two nested anonymous functions: an
//! outer per-element closure handed to `Match`, and an inner zero-arg
//! closure that threads the predicate's own error return. The element
//! is bound as the predicate's implicit subject, so bare names inside
//! the predicate select children of the element.

use std::rc::Rc;

use arbor_core::{CompileError, ErrorKind, Signature, Span, Type, Value};
use arbor_syntax::{DescendantFilter, Expr, Ident, MemberAccess, MemberExpr};

use crate::builder::{BinaryOp, CodeBuilder};
use crate::context::Receiver;
use crate::resolver;

use super::{ExprCompiler, ExprInfo, describe_expr, from_build};

type Result<T> = std::result::Result<T, CompileError>;

/// Binding name of the enumerated element inside a predicate.
const SUBJECT: &str = "$elem";

/// Compile a member access or selector step.
pub fn compile_member<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    member: &MemberExpr<'ast>,
) -> Result<ExprInfo> {
    let span = member.span;
    let recv = compiler.infer(member.target)?;
    let recv_desc = describe_expr(member.target, &recv.ty);

    match &member.access {
        MemberAccess::Name(ident) => compile_name(compiler, &recv.ty, &recv_desc, ident, span),
        MemberAccess::Quoted { raw, span: qspan } => {
            ensure_queryable(compiler, &recv.ty, *qspan)?;
            selector_call(compiler, "ChildByName", Some(&unquote(raw)), span)
        }
        MemberAccess::Wildcard => {
            ensure_queryable(compiler, &recv.ty, span)?;
            selector_call(compiler, "Children", None, span)
        }
        MemberAccess::Descendant(filter) => {
            ensure_queryable(compiler, &recv.ty, span)?;
            let name = match filter {
                DescendantFilter::Any => String::new(),
                DescendantFilter::Named(ident) => ident.name.to_string(),
                DescendantFilter::Quoted { raw, .. } => unquote(raw),
            };
            selector_call(compiler, "AnyDescendant", Some(&name), span)
        }
        MemberAccess::Attribute { raw, quoted, span: aspan } => {
            ensure_queryable(compiler, &recv.ty, *aspan)?;
            let name = if *quoted {
                unquote(raw)
            } else {
                (*raw).to_string()
            };
            selector_call(compiler, "Attribute", Some(&name), span)
        }
        MemberAccess::Select(pred) => compile_select(compiler, &recv.ty, pred, span),
    }
}

/// `x.name`: plain member first, capitalized member next, child
/// selection last.
fn compile_name(
    compiler: &mut ExprCompiler<'_, '_>,
    recv_ty: &Type,
    recv_desc: &str,
    ident: &Ident<'_>,
    span: Span,
) -> Result<ExprInfo> {
    for name in [ident.name.to_string(), resolver::capitalize(ident.name)] {
        match compiler.builder().member(&name) {
            Ok(ty) => {
                compiler.ctx().record_symbol(ident.span, &name);
                return Ok(ExprInfo::rvalue(ty));
            }
            Err(arbor_core::BuildError::UnknownMember { .. }) => continue,
            Err(e) => return Err(from_build(e, span, &name)),
        }
    }
    if recv_ty.is_queryable() {
        ensure_queryable(compiler, recv_ty, span)?;
        return selector_call(compiler, "ChildByName", Some(ident.name), span);
    }
    Err(CompileError::new(
        ErrorKind::UnresolvedMember {
            target: recv_desc.to_string(),
            name: ident.name.to_string(),
        },
        span,
    ))
}

/// Require a query-typed receiver on top of the stack, lifting raw
/// `any`/map values into a Node.
fn ensure_queryable(
    compiler: &mut ExprCompiler<'_, '_>,
    recv_ty: &Type,
    span: Span,
) -> Result<()> {
    if recv_ty.needs_lift() {
        return compiler
            .builder()
            .lift_node()
            .map_err(|e| from_build(e, span, "selector"));
    }
    if matches!(recv_ty, Type::Node | Type::NodeSet) {
        return Ok(());
    }
    Err(CompileError::new(
        ErrorKind::InvalidSelector {
            detail: format!("type '{recv_ty}' does not support selector steps"),
        },
        span,
    ))
}

/// Emit one protocol call: `recv.Method("name")` or `recv.Method()`.
fn selector_call(
    compiler: &mut ExprCompiler<'_, '_>,
    method: &str,
    name: Option<&str>,
    span: Span,
) -> Result<ExprInfo> {
    compiler
        .builder()
        .member(method)
        .map_err(|e| from_build(e, span, method))?;
    let arity = match name {
        Some(name) => {
            compiler.builder().push_const(Value::str(name));
            1
        }
        None => 0,
    };
    let ty = compiler
        .builder()
        .call(arity, false)
        .map_err(|e| from_build(e, span, method))?;
    Ok(ExprInfo::rvalue(ty))
}

/// Conditional selection: enumerate the receiver, bind each element as
/// the predicate's implicit subject, and yield the first match into a
/// synthesized node set.
fn compile_select(
    compiler: &mut ExprCompiler<'_, '_>,
    recv_ty: &Type,
    pred: &Expr<'_>,
    span: Span,
) -> Result<ExprInfo> {
    ensure_queryable(compiler, recv_ty, span)?;
    compiler
        .builder()
        .member("Match")
        .map_err(|e| from_build(e, span, "select"))?;

    // Outer per-element closure: func(Node) (NodeSet, error).
    let outer = Rc::new(Signature::plain(
        vec![Type::Node],
        vec![Type::NodeSet, Type::Error],
    ));
    compiler.builder().begin_closure(outer);
    compiler.builder().open_scope();
    compiler.ctx_mut().scope.push_scope();
    compiler
        .ctx_mut()
        .scope
        .declare(SUBJECT, Type::Node, span);
    let saved = compiler.ctx_mut().swap_receiver(Some(Receiver {
        binding: SUBJECT.to_string(),
        ty: Type::Node,
    }));

    let body = emit_select_body(compiler, pred, span);

    compiler.ctx_mut().swap_receiver(saved);
    body?;

    compiler.ctx_mut().scope.pop_scope();
    compiler.builder().close_scope();
    compiler
        .builder()
        .end_closure()
        .map_err(|e| from_build(e, span, "select"))?;
    let ty = compiler
        .builder()
        .call(1, false)
        .map_err(|e| from_build(e, span, "select"))?;
    Ok(ExprInfo::rvalue(ty))
}

fn emit_select_body(
    compiler: &mut ExprCompiler<'_, '_>,
    pred: &Expr<'_>,
    span: Span,
) -> Result<()> {
    let b = |e| from_build(e, span, "select");

    // Inner closure threads the predicate's own error return:
    // func() (bool, error).
    let inner = Rc::new(Signature::plain(vec![], vec![Type::Bool, Type::Error]));
    compiler.builder().begin_closure(inner);
    compiler
        .check_expecting(pred, &Type::Bool, "selector predicate")
        .map_err(invalid_predicate)?;
    compiler.builder().push_const(Value::Nil);
    compiler.builder().ret(2).map_err(b)?;
    compiler.builder().end_closure().map_err(b)?;
    compiler.builder().call(0, false).map_err(b)?;

    compiler.builder().unpack().map_err(b)?;
    compiler.builder().assign("$err").map_err(b)?;
    compiler.builder().assign("$ok").map_err(b)?;

    // Propagate a predicate error out of the enumeration.
    compiler.builder().load_local("$err", Type::Error);
    compiler.builder().push_const(Value::Nil);
    compiler.builder().binary(BinaryOp::Ne).map_err(b)?;
    compiler.builder().branch_if().map_err(b)?;
    compiler.builder().push_zero(&Type::NodeSet);
    compiler.builder().load_local("$err", Type::Error);
    compiler.builder().ret(2).map_err(b)?;
    compiler.builder().branch_end();

    // Yield the matching element as a one-node set.
    compiler.builder().load_local("$ok", Type::Bool);
    compiler.builder().branch_if().map_err(b)?;
    compiler.builder().load_local(SUBJECT, Type::Node);
    compiler.builder().member("One").map_err(b)?;
    compiler.builder().call(0, false).map_err(b)?;
    compiler.builder().push_const(Value::Nil);
    compiler.builder().ret(2).map_err(b)?;
    compiler.builder().branch_end();

    compiler.builder().push_zero(&Type::NodeSet);
    compiler.builder().push_const(Value::Nil);
    compiler.builder().ret(2).map_err(b)?;
    Ok(())
}

/// Predicate type errors surface as selector errors.
fn invalid_predicate(err: CompileError) -> CompileError {
    match err.kind {
        ErrorKind::TypeMismatch { .. } => CompileError::new(
            ErrorKind::InvalidSelector {
                detail: err.kind.render(),
            },
            err.span,
        ),
        _ => err,
    }
}

/// Strip the surrounding quotes from a quoted selector name and unescape
/// the two escapes the surface language allows inside them.
fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    inner.replace("\\\"", "\"").replace("\\\\", "\\")
}
