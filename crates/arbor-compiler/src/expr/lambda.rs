//! Lambda literal compilation.
//!
//! A lambda is purely a function of (node, expected function type):
//! nothing persists between compilations. Parameter types always come
//! from the expected signature, the parameter count must match it
//! exactly, and the body compiles in a fresh child scope that is
//! exposed to the recorder. Expression-list bodies return one value
//! per trailing expression; block bodies compile as ordinary function
//! bodies under the expected signature.
//!
//! While the body compiles, the context's effective result types are
//! the lambda's, so `?` legality inside the body follows the lambda
//! rather than the enclosing unit.

use std::rc::Rc;

use arbor_core::{CompileError, ErrorKind, Span, Type};
use arbor_syntax::{Block, LambdaBody, LambdaExpr, Stmt};

use crate::builder::CodeBuilder;

use super::{ExprCompiler, ExprInfo, from_build};

type Result<T> = std::result::Result<T, CompileError>;

/// Compile a lambda literal against an expected function type.
pub fn compile_lambda<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    expr: &LambdaExpr<'ast>,
    expected: Option<&Type>,
    span: Span,
) -> Result<ExprInfo> {
    let sig = match expected {
        Some(Type::Func(sig)) => Rc::clone(sig),
        Some(other) => {
            return Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    target: "lambda literal".to_string(),
                    have: "lambda".to_string(),
                    want: other.to_string(),
                },
                span,
            ));
        }
        None => {
            return Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    target: "lambda literal".to_string(),
                    have: "lambda".to_string(),
                    want: "function type".to_string(),
                },
                span,
            ));
        }
    };

    // An expected type still carrying type parameters means the
    // enclosing generic candidate has not been instantiated yet; the
    // attempt is deferred (and retried against the instantiated
    // signature the resolver splices in).
    if sig.params.iter().any(Type::has_params) || sig.results.iter().any(Type::has_params) {
        return Err(CompileError::new(
            ErrorKind::TypeMismatch {
                target: "lambda literal".to_string(),
                have: "lambda".to_string(),
                want: sig.to_string(),
            },
            span,
        ));
    }

    if expr.params.len() != sig.params.len() {
        return Err(CompileError::new(
            ErrorKind::ArityMismatch {
                target: "lambda parameters".to_string(),
                have: expr.params.iter().map(|p| p.name.to_string()).collect(),
                want: sig.params.iter().map(Type::to_string).collect(),
            },
            span,
        ));
    }

    compiler.builder().begin_closure(Rc::clone(&sig));
    compiler.builder().open_scope();
    compiler.ctx_mut().scope.push_scope();
    for (param, ty) in expr.params.iter().zip(&sig.params) {
        compiler
            .ctx_mut()
            .scope
            .declare(param.name, ty.clone(), param.span);
    }
    let names = compiler.ctx().scope.names_at_current_depth();
    compiler.ctx().record_scope(span, &names);

    let saved = compiler.ctx_mut().swap_results(sig.results.to_vec());
    let body = compile_body(compiler, expr, &sig, span);
    compiler.ctx_mut().swap_results(saved);
    body?;

    compiler.ctx_mut().scope.pop_scope();
    compiler.builder().close_scope();
    let ty = compiler
        .builder()
        .end_closure()
        .map_err(|e| from_build(e, span, "lambda literal"))?;
    Ok(ExprInfo::rvalue(ty))
}

fn compile_body(
    compiler: &mut ExprCompiler<'_, '_>,
    expr: &LambdaExpr<'_>,
    sig: &arbor_core::Signature,
    span: Span,
) -> Result<()> {
    match expr.body {
        LambdaBody::Exprs(list) => {
            if list.len() != sig.results.len() {
                return Err(CompileError::new(
                    ErrorKind::ArityMismatch {
                        target: "lambda results".to_string(),
                        have: vec![list.len().to_string()],
                        want: sig.results.iter().map(Type::to_string).collect(),
                    },
                    span,
                ));
            }
            for (value, result) in list.iter().zip(&sig.results) {
                compiler.check_expecting(value, result, "lambda result")?;
            }
            compiler
                .builder()
                .ret(list.len())
                .map_err(|e| from_build(e, span, "lambda result"))
        }
        LambdaBody::Block(block) => compile_block(compiler, block),
    }
}

/// Compile a statement block as an ordinary function body.
fn compile_block(compiler: &mut ExprCompiler<'_, '_>, block: &Block<'_>) -> Result<()> {
    let mut returned = false;
    for stmt in block.stmts {
        returned = matches!(stmt, Stmt::Return { .. });
        compile_stmt(compiler, stmt)?;
    }
    // A result-less body falls off the end with an implicit return.
    if !returned && compiler.ctx().results().is_empty() {
        compiler
            .builder()
            .ret(0)
            .map_err(|e| from_build(e, block.span, "lambda body"))?;
    }
    Ok(())
}

fn compile_stmt(compiler: &mut ExprCompiler<'_, '_>, stmt: &Stmt<'_>) -> Result<()> {
    match stmt {
        Stmt::Expr(expr) => {
            compiler.infer(expr)?;
            compiler
                .builder()
                .assign("_")
                .map_err(|e| from_build(e, expr.span(), "expression statement"))
        }
        Stmt::Var { name, value, span } => {
            let info = compiler.infer(value)?;
            compiler
                .builder()
                .assign(name.name)
                .map_err(|e| from_build(e, *span, "variable declaration"))?;
            compiler
                .ctx_mut()
                .scope
                .declare(name.name, info.ty, *span);
            Ok(())
        }
        Stmt::Return { values, span } => {
            let results = compiler.ctx().results().to_vec();
            if values.len() != results.len() {
                return Err(CompileError::new(
                    ErrorKind::ArityMismatch {
                        target: "return".to_string(),
                        have: vec![values.len().to_string()],
                        want: results.iter().map(Type::to_string).collect(),
                    },
                    *span,
                ));
            }
            for (value, result) in values.iter().zip(&results) {
                compiler.check_expecting(value, result, "return value")?;
            }
            compiler
                .builder()
                .ret(values.len())
                .map_err(|e| from_build(e, *span, "return"))
        }
    }
}
