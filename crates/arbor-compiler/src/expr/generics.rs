//! Generic candidate instantiation.
//!
//! A type-parameterized candidate is made concrete before its argument
//! compilation proceeds, one of two ways:
//! - **Explicit**: leading positional call arguments that compile to
//!   type-valued expressions supply the type parameters directly.
//! - **Inferred**: the non-lambda arguments compile first (rolled back
//!   afterwards), their types feed the code-builder's constraint
//!   solver, and the instantiated signature re-enters the candidate
//!   chain right after the generic candidate.
//!
//! Failure to infer is a hard compile error naming the parameter.

use rustc_hash::FxHashMap;

use arbor_core::{CompileError, ErrorKind, Signature, Span, SymbolKind, Type};
use arbor_syntax::{CallExpr, Expr};

use crate::builder::CodeBuilder;
use crate::resolver::{self, Resolution};

use super::{ExprCompiler, from_build, resolve_type_expr};

type Result<T> = std::result::Result<T, CompileError>;

/// How a generic candidate becomes concrete.
pub(crate) enum GenericPlan {
    /// Instantiated from leading type arguments; `skip` of them are
    /// consumed and the rest of the call compiles against `sig`.
    Explicit { sig: Signature, skip: usize },
    /// Instantiated by inference; splice after the generic candidate.
    Inferred { sig: Signature },
}

/// Decide how to instantiate a generic candidate for this call.
pub(crate) fn plan(
    compiler: &mut ExprCompiler<'_, '_>,
    sig: &Signature,
    call: &CallExpr<'_>,
    span: Span,
) -> Result<GenericPlan> {
    let type_args = leading_type_args(compiler, call)?;
    if !type_args.is_empty() {
        if type_args.len() != sig.type_params.len() {
            return Err(CompileError::new(
                ErrorKind::ArityMismatch {
                    target: "type arguments".to_string(),
                    have: type_args.iter().map(Type::to_string).collect(),
                    want: sig.type_params.clone(),
                },
                span,
            ));
        }
        let mut bindings = FxHashMap::default();
        for (param, ty) in sig.type_params.iter().zip(&type_args) {
            bindings.insert(param.clone(), ty.clone());
        }
        return Ok(GenericPlan::Explicit {
            sig: sig.instantiate(&bindings),
            skip: type_args.len(),
        });
    }

    // Inference: compile the non-lambda arguments for their types only,
    // rolling the emission back before the real attempt.
    let cp = compiler.builder().checkpoint();
    let snap = compiler.ctx().scope.snapshot();
    let mut arg_types: Vec<Option<Type>> = Vec::with_capacity(call.args.len());
    let mut failure: Option<CompileError> = None;
    for arg in call.args {
        if matches!(arg.value, Expr::Lambda(_)) {
            arg_types.push(None);
            continue;
        }
        match compiler.infer(arg.value) {
            Ok(info) => arg_types.push(Some(info.ty)),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    compiler.builder().rollback(cp);
    compiler.ctx_mut().scope.restore(snap);
    if let Some(e) = failure {
        return Err(e);
    }

    let inst = compiler
        .builder()
        .infer_signature(sig, &arg_types)
        .map_err(|e| from_build(e, span, "generic instantiation"))?;
    Ok(GenericPlan::Inferred { sig: inst })
}

/// Collect the leading call arguments that are type-valued: explicit
/// type syntax, or identifiers naming a type symbol.
fn leading_type_args(
    compiler: &mut ExprCompiler<'_, '_>,
    call: &CallExpr<'_>,
) -> Result<Vec<Type>> {
    let mut types = Vec::new();
    for arg in call.args {
        if arg.name.is_some() {
            break;
        }
        match arg.value {
            Expr::TypeRef(te) => types.push(resolve_type_expr(compiler.ctx(), te)?),
            Expr::Ident(ident) => {
                let resolved = resolver::resolve_name(compiler.ctx(), ident.ident.name, ident.span);
                match resolved {
                    Ok(
                        Resolution::Global { symbol, .. } | Resolution::Builtin { symbol },
                    ) if matches!(symbol.kind, SymbolKind::Type(_)) => {
                        let SymbolKind::Type(ty) = symbol.kind else {
                            unreachable!("matched type symbol");
                        };
                        types.push(ty);
                    }
                    _ => break,
                }
            }
            _ => break,
        }
    }
    Ok(types)
}
