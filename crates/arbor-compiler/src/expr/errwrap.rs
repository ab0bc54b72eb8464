//! Error-wrap operator compilation.
//!
//! All three operators take a call producing `(value..., error)` and
//! rewrite the trailing error into explicit control flow:
//!
//! - `expr!` - on a non-nil error, wrap it and invoke the target's
//!   panic primitive; otherwise the call's values flow through.
//! - `expr?` - on a non-nil error, return it (wrapped, with zero
//!   values for every other declared result) from the enclosing
//!   compiled unit. Only legal in a unit whose results end in `error`.
//! - `expr?:default` - on a non-nil error, evaluate the default
//!   instead; the wrapped call and the default are never both
//!   evaluated.
//!
//! `!` and `?:` emit a synthesized zero-argument closure invoked
//! immediately; `?` emits an inline block, because its early return
//! must leave the enclosing unit, which a closure's return cannot do.
//! The wrapped error's annotation records the wrapped source text, the
//! file and line, and the enclosing unit's name.

use std::rc::Rc;

use arbor_core::{CompileError, ErrorKind, Signature, Type, Value};
use arbor_syntax::{ErrWrapExpr, ErrWrapOp};

use crate::builder::{BinaryOp, CodeBuilder, ErrorNote};

use super::{ExprCompiler, ExprInfo, from_build};

type Result<T> = std::result::Result<T, CompileError>;

/// Compile an error-wrap expression.
pub fn compile_errwrap<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    expr: &ErrWrapExpr<'ast>,
) -> Result<ExprInfo> {
    match expr.op {
        ErrWrapOp::Panic => compile_panic(compiler, expr),
        ErrWrapOp::Propagate => compile_propagate(compiler, expr),
        ErrWrapOp::Default => compile_default(compiler, expr),
    }
}

/// The diagnostic annotation attached to the wrapped error.
fn note(compiler: &ExprCompiler<'_, '_>, expr: &ErrWrapExpr<'_>) -> ErrorNote {
    ErrorNote {
        text: expr.text.to_string(),
        file: compiler.ctx().file().to_string(),
        line: expr.span.line,
        unit: compiler.ctx().unit_name().to_string(),
    }
}

/// The non-error result types of the wrapped call, or `None` when the
/// call does not return an error at all.
fn split_error_results(ty: &Type) -> Option<Vec<Type>> {
    match ty {
        Type::Error => Some(Vec::new()),
        Type::Tuple(elems) if matches!(elems.last(), Some(Type::Error)) => {
            Some(elems[..elems.len() - 1].to_vec())
        }
        _ => None,
    }
}

/// Learn the wrapped call's result shape without keeping its emission:
/// the closure's signature must be known before the call compiles into
/// its body.
fn probe_results(
    compiler: &mut ExprCompiler<'_, '_>,
    expr: &ErrWrapExpr<'_>,
) -> Result<Vec<Type>> {
    let cp = compiler.builder().checkpoint();
    let snap = compiler.ctx().scope.snapshot();
    let probed = compiler.infer(expr.call);
    compiler.builder().rollback(cp);
    compiler.ctx_mut().scope.restore(snap);
    let info = probed?;
    split_error_results(&info.ty).ok_or_else(|| {
        CompileError::new(
            ErrorKind::ErrWrapMisuse {
                op: expr.op.symbol(),
                detail: format!("wrapped call does not return an error (have {})", info.ty),
            },
            expr.span,
        )
    })
}

/// Compile the wrapped call and bind its results: `$v0..$vN` for the
/// values, `$err` for the trailing error. Returns the value types.
fn bind_call_results(
    compiler: &mut ExprCompiler<'_, '_>,
    expr: &ErrWrapExpr<'_>,
) -> Result<Vec<Type>> {
    let span = expr.span;
    let info = compiler.infer(expr.call)?;
    let values = split_error_results(&info.ty).ok_or_else(|| {
        CompileError::new(
            ErrorKind::ErrWrapMisuse {
                op: expr.op.symbol(),
                detail: format!("wrapped call does not return an error (have {})", info.ty),
            },
            span,
        )
    })?;
    let b = |e| from_build(e, span, "error wrap");
    if values.is_empty() {
        compiler.builder().assign("$err").map_err(b)?;
    } else {
        compiler.builder().unpack().map_err(b)?;
        compiler.builder().assign("$err").map_err(b)?;
        for i in (0..values.len()).rev() {
            compiler.builder().assign(&format!("$v{i}")).map_err(b)?;
        }
    }
    Ok(values)
}

/// Emit `$err != nil` and open the error branch.
fn branch_on_error(compiler: &mut ExprCompiler<'_, '_>, expr: &ErrWrapExpr<'_>) -> Result<()> {
    let b = |e| from_build(e, expr.span, "error wrap");
    compiler.builder().load_local("$err", Type::Error);
    compiler.builder().push_const(Value::Nil);
    compiler.builder().binary(BinaryOp::Ne).map_err(b)?;
    compiler.builder().branch_if().map_err(b)
}

/// `expr!`: closure that panics with the wrapped error.
fn compile_panic(compiler: &mut ExprCompiler<'_, '_>, expr: &ErrWrapExpr<'_>) -> Result<ExprInfo> {
    let span = expr.span;
    let b = |e| from_build(e, span, "error wrap");
    let values = probe_results(compiler, expr)?;

    let sig = Rc::new(Signature::plain(vec![], values.clone()));
    compiler.builder().begin_closure(Rc::clone(&sig));
    compiler.builder().open_scope();

    bind_call_results(compiler, expr)?;
    let annotation = note(compiler, expr);
    branch_on_error(compiler, expr)?;
    compiler.builder().load_local("$err", Type::Error);
    compiler.builder().wrap_error(annotation).map_err(b)?;
    compiler.builder().panic_op().map_err(b)?;
    compiler.builder().branch_end();

    for (i, ty) in values.iter().enumerate() {
        compiler.builder().load_local(&format!("$v{i}"), ty.clone());
    }
    compiler.builder().ret(values.len()).map_err(b)?;
    compiler.builder().close_scope();
    compiler.builder().end_closure().map_err(b)?;
    let ty = compiler.builder().call(0, false).map_err(b)?;
    Ok(ExprInfo::rvalue(ty))
}

/// `expr?`: inline block returning the wrapped error (plus zero values)
/// from the enclosing unit.
fn compile_propagate(
    compiler: &mut ExprCompiler<'_, '_>,
    expr: &ErrWrapExpr<'_>,
) -> Result<ExprInfo> {
    let span = expr.span;
    let b = |e| from_build(e, span, "error wrap");

    let results = compiler.ctx().results().to_vec();
    if !matches!(results.last(), Some(Type::Error)) {
        return Err(CompileError::new(
            ErrorKind::ErrWrapMisuse {
                op: "?",
                detail: "enclosing function does not return an error".to_string(),
            },
            span,
        ));
    }

    compiler.builder().open_scope();
    let values = bind_call_results(compiler, expr)?;

    let annotation = note(compiler, expr);
    branch_on_error(compiler, expr)?;
    for result in &results[..results.len() - 1] {
        compiler.builder().push_zero(result);
    }
    compiler.builder().load_local("$err", Type::Error);
    compiler.builder().wrap_error(annotation).map_err(b)?;
    compiler.builder().ret(results.len()).map_err(b)?;
    compiler.builder().branch_end();

    for (i, ty) in values.iter().enumerate() {
        compiler.builder().load_local(&format!("$v{i}"), ty.clone());
    }
    let ty = match values.len() {
        0 => {
            compiler.builder().push_const(Value::Unit);
            Type::Unit
        }
        1 => values[0].clone(),
        n => compiler.builder().pack(n).map_err(b)?,
    };
    compiler.builder().close_scope();
    Ok(ExprInfo::rvalue(ty))
}

/// `expr?:default`: closure evaluating the default on the error path.
fn compile_default(
    compiler: &mut ExprCompiler<'_, '_>,
    expr: &ErrWrapExpr<'_>,
) -> Result<ExprInfo> {
    let span = expr.span;
    let b = |e| from_build(e, span, "error wrap");
    let default = expr.default.ok_or_else(|| {
        CompileError::new(
            ErrorKind::Internal {
                message: "default operator without default expression".to_string(),
            },
            span,
        )
    })?;

    let values = probe_results(compiler, expr)?;
    if values.len() != 1 {
        return Err(CompileError::new(
            ErrorKind::ErrWrapMisuse {
                op: "?:",
                detail: "wrapped call must have exactly one non-error result".to_string(),
            },
            span,
        ));
    }
    let value_ty = values[0].clone();

    let sig = Rc::new(Signature::plain(vec![], vec![value_ty.clone()]));
    compiler.builder().begin_closure(sig);
    compiler.builder().open_scope();

    bind_call_results(compiler, expr)?;
    branch_on_error(compiler, expr)?;
    // The default is compiled inside the error branch, so it is only
    // evaluated when the wrapped call failed.
    compiler.check_expecting(default, &value_ty, "default value")?;
    compiler.builder().ret(1).map_err(b)?;
    compiler.builder().branch_end();

    compiler.builder().load_local("$v0", value_ty.clone());
    compiler.builder().ret(1).map_err(b)?;
    compiler.builder().close_scope();
    compiler.builder().end_closure().map_err(b)?;
    let ty = compiler.builder().call(0, false).map_err(b)?;
    Ok(ExprInfo::rvalue(ty))
}
