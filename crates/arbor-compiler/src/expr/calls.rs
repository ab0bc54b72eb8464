//! Call compilation and overload candidate resolution.
//!
//! A callee may denote one or several signatures (a plain function, an
//! overload set, a receiver-bound method set, or a generic function).
//! The resolver walks the candidate chain in declaration order and
//! compiles the arguments against each candidate inside a transactional
//! boundary: a builder checkpoint plus a scope snapshot taken at the
//! attempt's entry, both restored on failure. The first candidate to
//! compile wins; when none does, the *first* candidate's error is
//! surfaced so diagnostics stay stable across runs.
//!
//! Special argument forms handled here:
//! - keyword arguments merge into a synthetic struct- or map-literal
//!   argument matching the candidate's expected parameter type
//! - the trailing variadic parameter absorbs excess arguments unless a
//!   spread marker supplies one pre-aggregated slice
//! - a single non-spread tuple-valued argument is unpacked when the
//!   candidate rejects the tuple but accepts the unpacked arity

use std::rc::Rc;

use arbor_core::{Candidate, CompileError, ErrorKind, Signature, Span, SymbolKind, Type};
use arbor_syntax::{Argument, CallExpr, Expr, IdentExpr, MemberAccess, MemberExpr};

use crate::builder::CodeBuilder;
use crate::resolver::{self, Resolution};

use super::{ExprCompiler, ExprInfo, describe_expr, from_build, generics, literal};

type Result<T> = std::result::Result<T, CompileError>;

/// How the callee value is emitted for each candidate attempt.
#[derive(Debug, Clone)]
pub(crate) enum TargetKind {
    /// A package-level or builtin function, loaded by qualified name.
    Global { qualified: String },
    /// A local binding of function type.
    Local { name: String },
    /// A method of the implicit receiver; the receiver binding is
    /// loaded and the method bound per attempt.
    ImplicitMethod {
        binding: String,
        binding_ty: Type,
        method: String,
    },
    /// A method of a receiver already compiled onto the stack.
    BoundMethod { method: String },
    /// The callee value is already on the stack (indirect calls).
    OnStack,
}

/// A resolved callee: how to emit it, and what to call it in errors.
#[derive(Debug, Clone)]
pub(crate) struct CallTarget {
    pub describe: String,
    pub kind: TargetKind,
}

/// Compile a call expression.
pub fn compile_call<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    call: &CallExpr<'ast>,
) -> Result<ExprInfo> {
    match call.callee {
        Expr::Ident(ident) => compile_named_call(compiler, ident, call),
        Expr::Member(member) => compile_member_call(compiler, member, call),
        other => compile_indirect_call(compiler, other, call),
    }
}

/// Compile a call whose callee is a bare name.
fn compile_named_call<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    ident: &IdentExpr<'ast>,
    call: &CallExpr<'ast>,
) -> Result<ExprInfo> {
    let name = ident.ident.name;
    let span = call.span;

    let resolution = resolver::resolve_callee(compiler.ctx(), name, ident.span)?;
    let was_builtin = matches!(resolution, Resolution::Builtin { .. });
    let was_receiver = matches!(resolution, Resolution::ReceiverMethods { .. });
    let (target, chain) = target_from_resolution(name, resolution, span)?;

    match resolve_chain(compiler, &target, chain, call, span) {
        Ok(info) => Ok(info),
        Err(first) if first.is_candidate_failure() => {
            // The callee name may independently match a builtin or an
            // implicit-receiver operation; those side channels are
            // attempted before giving up, but their own failures never
            // replace the first candidate's error.
            if !was_builtin
                && let Some(symbol) = compiler.ctx().env().builtin(name)
                && let SymbolKind::Func(sigs) = &symbol.kind
                && let Some(chain) = Candidate::from_signatures(sigs)
            {
                let target = CallTarget {
                    describe: name.to_string(),
                    kind: TargetKind::Global {
                        qualified: name.to_string(),
                    },
                };
                if let Ok(info) = resolve_chain(compiler, &target, chain, call, span) {
                    return Ok(info);
                }
            }
            if !was_receiver
                && let Some(info) = try_implicit_receiver(compiler, name, call, span)
            {
                return Ok(info);
            }
            Err(first)
        }
        Err(hard) => Err(hard),
    }
}

/// Attempt the implicit-receiver side channel for a failed named call.
fn try_implicit_receiver(
    compiler: &mut ExprCompiler<'_, '_>,
    name: &str,
    call: &CallExpr<'_>,
    span: Span,
) -> Option<ExprInfo> {
    let recv = compiler.ctx().receiver()?.clone();
    let def = recv.ty.struct_def()?.clone();
    for method in [name.to_string(), resolver::capitalize(name)] {
        let methods = def.methods_named(&method);
        if methods.is_empty() {
            continue;
        }
        let sigs: Vec<Rc<Signature>> = methods.iter().map(|m| Rc::clone(&m.sig)).collect();
        let chain = Candidate::from_signatures(&sigs)?;
        let target = CallTarget {
            describe: format!("{}.{}", recv.binding, method),
            kind: TargetKind::ImplicitMethod {
                binding: recv.binding.clone(),
                binding_ty: recv.ty.clone(),
                method,
            },
        };
        if let Ok(info) = resolve_chain(compiler, &target, chain, call, span) {
            return Some(info);
        }
    }
    None
}

/// Turn a callee resolution into a target and its candidate chain.
fn target_from_resolution(
    name: &str,
    resolution: Resolution,
    span: Span,
) -> Result<(CallTarget, Candidate)> {
    let not_callable = |ty: &Type| {
        CompileError::new(
            ErrorKind::NotCallable {
                type_name: ty.to_string(),
            },
            span,
        )
    };
    match resolution {
        Resolution::Local { name: lname, ty } => match &ty {
            Type::Func(sig) => Ok((
                CallTarget {
                    describe: name.to_string(),
                    kind: TargetKind::Local { name: lname },
                },
                Candidate::new(Rc::clone(sig)),
            )),
            other => Err(not_callable(other)),
        },
        Resolution::Global { qualified, symbol } => match &symbol.kind {
            SymbolKind::Func(sigs) => {
                let chain = Candidate::from_signatures(sigs).ok_or_else(|| {
                    CompileError::new(
                        ErrorKind::Internal {
                            message: format!("function symbol '{qualified}' has no signatures"),
                        },
                        span,
                    )
                })?;
                Ok((
                    CallTarget {
                        describe: name.to_string(),
                        kind: TargetKind::Global { qualified },
                    },
                    chain,
                ))
            }
            SymbolKind::Var(ty) => match ty {
                Type::Func(sig) => Ok((
                    CallTarget {
                        describe: name.to_string(),
                        kind: TargetKind::Global { qualified },
                    },
                    Candidate::new(Rc::clone(sig)),
                )),
                other => Err(not_callable(other)),
            },
            SymbolKind::Type(ty) => Err(not_callable(&Type::TypeValue(Rc::new(ty.clone())))),
        },
        Resolution::Builtin { symbol } => match &symbol.kind {
            SymbolKind::Func(sigs) => {
                let chain = Candidate::from_signatures(sigs).ok_or_else(|| {
                    CompileError::new(
                        ErrorKind::Internal {
                            message: format!("builtin '{name}' has no signatures"),
                        },
                        span,
                    )
                })?;
                Ok((
                    CallTarget {
                        describe: name.to_string(),
                        kind: TargetKind::Global {
                            qualified: symbol.name.clone(),
                        },
                    },
                    chain,
                ))
            }
            SymbolKind::Var(ty) => match ty {
                Type::Func(sig) => Ok((
                    CallTarget {
                        describe: name.to_string(),
                        kind: TargetKind::Global {
                            qualified: symbol.name.clone(),
                        },
                    },
                    Candidate::new(Rc::clone(sig)),
                )),
                other => Err(not_callable(other)),
            },
            SymbolKind::Type(ty) => Err(not_callable(&Type::TypeValue(Rc::new(ty.clone())))),
        },
        Resolution::ReceiverMethods {
            binding,
            recv_ty,
            name: method,
            sigs,
        } => {
            let chain = Candidate::from_signatures(&sigs).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::Internal {
                        message: format!("method set '{method}' is empty"),
                    },
                    span,
                )
            })?;
            Ok((
                CallTarget {
                    describe: format!("{binding}.{method}"),
                    kind: TargetKind::ImplicitMethod {
                        binding,
                        binding_ty: recv_ty,
                        method,
                    },
                },
                chain,
            ))
        }
        Resolution::ReceiverField {
            binding,
            recv_ty,
            field,
            ty,
        } => match &ty {
            Type::Func(sig) => Ok((
                CallTarget {
                    describe: format!("{binding}.{field}"),
                    kind: TargetKind::ImplicitMethod {
                        binding,
                        binding_ty: recv_ty,
                        method: field,
                    },
                },
                Candidate::new(Rc::clone(sig)),
            )),
            other => Err(not_callable(other)),
        },
        Resolution::ReceiverChild { .. } => Err(CompileError::new(
            ErrorKind::NotCallable {
                type_name: Type::NodeSet.to_string(),
            },
            span,
        )),
    }
}

/// Compile a method call `target.name(args)`.
fn compile_member_call<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    member: &MemberExpr<'ast>,
    call: &CallExpr<'ast>,
) -> Result<ExprInfo> {
    let MemberAccess::Name(ident) = member.access else {
        // Selector steps produce node sets, which are not callable;
        // compile the member so the error names the actual type.
        let info = super::query::compile_member(compiler, member)?;
        return Err(CompileError::new(
            ErrorKind::NotCallable {
                type_name: info.ty.to_string(),
            },
            call.span,
        ));
    };
    let name = ident.name;
    let span = call.span;

    let recv = compiler.infer(member.target)?;
    let recv_desc = describe_expr(member.target, &recv.ty);

    if let Some(def) = recv.ty.struct_def().cloned() {
        for method in [name.to_string(), resolver::capitalize(name)] {
            let methods = def.methods_named(&method);
            if methods.is_empty() {
                // A field of function type is callable too.
                if let Some((_, field)) = def.field(&method) {
                    let Type::Func(sig) = &field.ty else {
                        return Err(CompileError::new(
                            ErrorKind::NotCallable {
                                type_name: field.ty.to_string(),
                            },
                            span,
                        ));
                    };
                    let sig = Rc::clone(sig);
                    compiler
                        .builder()
                        .member(&method)
                        .map_err(|e| from_build(e, span, &method))?;
                    let target = CallTarget {
                        describe: format!("{recv_desc}.{method}"),
                        kind: TargetKind::OnStack,
                    };
                    return resolve_chain(compiler, &target, Candidate::new(sig), call, span);
                }
                continue;
            }
            let sigs: Vec<Rc<Signature>> = methods.iter().map(|m| Rc::clone(&m.sig)).collect();
            let chain = Candidate::from_signatures(&sigs).expect("non-empty method set");
            let target = CallTarget {
                describe: format!("{recv_desc}.{method}"),
                kind: TargetKind::BoundMethod { method },
            };
            return resolve_chain(compiler, &target, chain, call, span);
        }
        return Err(CompileError::new(
            ErrorKind::UnresolvedMember {
                target: recv_desc,
                name: name.to_string(),
            },
            span,
        ));
    }

    // Query-typed receivers answer the runtime protocol directly.
    let mut recv_ty = recv.ty.clone();
    if recv_ty.needs_lift() {
        compiler
            .builder()
            .lift_node()
            .map_err(|e| from_build(e, span, name))?;
        recv_ty = Type::Node;
    }
    if matches!(recv_ty, Type::Node | Type::NodeSet) {
        if let Some(sig) = arbor_core::query_member(name) {
            let target = CallTarget {
                describe: format!("{recv_desc}.{name}"),
                kind: TargetKind::BoundMethod {
                    method: name.to_string(),
                },
            };
            return resolve_chain(compiler, &target, Candidate::new(Rc::new(sig)), call, span);
        }
        return Err(CompileError::new(
            ErrorKind::NotCallable {
                type_name: Type::NodeSet.to_string(),
            },
            span,
        ));
    }

    Err(CompileError::new(
        ErrorKind::UnresolvedMember {
            target: recv_desc,
            name: name.to_string(),
        },
        span,
    ))
}

/// Compile an indirect call: the callee is an arbitrary expression.
fn compile_indirect_call<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    callee: &Expr<'ast>,
    call: &CallExpr<'ast>,
) -> Result<ExprInfo> {
    let span = call.span;
    let info = compiler.infer(callee)?;
    match &info.ty {
        Type::Func(sig) => {
            let target = CallTarget {
                describe: "call".to_string(),
                kind: TargetKind::OnStack,
            };
            resolve_chain(compiler, &target, Candidate::new(Rc::clone(sig)), call, span)
        }
        other => Err(CompileError::new(
            ErrorKind::NotCallable {
                type_name: other.to_string(),
            },
            span,
        )),
    }
}

/// Walk the candidate chain, attempting each inside a transactional
/// boundary. Generic candidates are instantiated first: explicitly
/// from leading type arguments, or by inference, in which case the
/// instantiated signature is spliced in right after the generic one.
pub(crate) fn resolve_chain(
    compiler: &mut ExprCompiler<'_, '_>,
    target: &CallTarget,
    chain: Candidate,
    call: &CallExpr<'_>,
    span: Span,
) -> Result<ExprInfo> {
    let mut first_err: Option<CompileError> = None;
    let mut current = Some(Box::new(chain));

    while let Some(mut cand) = current {
        if cand.sig.is_generic() {
            match generics::plan(compiler, &cand.sig, call, span) {
                Ok(generics::GenericPlan::Explicit { sig, skip }) => {
                    match try_candidate(compiler, &Rc::new(sig), target, call, skip, span) {
                        Ok(info) => return Ok(info),
                        Err(e) if e.is_candidate_failure() => {
                            first_err.get_or_insert(e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(generics::GenericPlan::Inferred { sig }) => {
                    cand.splice_after(Rc::new(sig));
                }
                Err(e) if e.is_candidate_failure() => {
                    first_err.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
            current = cand.next.take();
            continue;
        }

        match try_candidate(compiler, &cand.sig, target, call, 0, span) {
            Ok(info) => return Ok(info),
            Err(e) if e.is_candidate_failure() => {
                first_err.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
        current = cand.next.take();
    }

    Err(first_err.unwrap_or_else(|| {
        CompileError::new(
            ErrorKind::Internal {
                message: "empty candidate chain".to_string(),
            },
            span,
        )
    }))
}

/// Attempt one candidate. On failure the builder and the scope are
/// restored to the attempt's entry, so no partially emitted code or
/// stray scope entry survives into the next attempt.
fn try_candidate(
    compiler: &mut ExprCompiler<'_, '_>,
    sig: &Rc<Signature>,
    target: &CallTarget,
    call: &CallExpr<'_>,
    skip: usize,
    span: Span,
) -> Result<ExprInfo> {
    let cp = compiler.builder().checkpoint();
    let snap = compiler.ctx().scope.snapshot();
    let result = attempt_candidate(compiler, sig, target, call, skip, span);
    if result.is_err() {
        compiler.builder().rollback(cp);
        compiler.ctx_mut().scope.restore(snap);
    }
    result
}

fn attempt_candidate(
    compiler: &mut ExprCompiler<'_, '_>,
    sig: &Rc<Signature>,
    target: &CallTarget,
    call: &CallExpr<'_>,
    skip: usize,
    span: Span,
) -> Result<ExprInfo> {
    emit_callee(compiler, sig, target, span)?;

    let args = &call.args[skip..];
    let split = args.iter().position(|a| a.name.is_some()).unwrap_or(args.len());
    let (positional, keywords) = args.split_at(split);
    if keywords.iter().any(|a| a.name.is_none()) {
        return Err(CompileError::new(ErrorKind::MixedLiteralKeys, span));
    }

    if !keywords.is_empty() {
        return attempt_with_keywords(compiler, sig, target, positional, keywords, span);
    }

    let argc = positional.len();
    let count_ok = if sig.is_variadic() {
        if call.spread {
            argc == sig.params.len()
        } else {
            argc + 1 >= sig.params.len()
        }
    } else {
        !call.spread && argc == sig.params.len()
    };

    if !count_ok {
        // A single tuple-valued argument may still fit unpacked.
        if argc == 1 && !call.spread && !needs_expected_type(positional[0].value) {
            let info = compiler.infer(positional[0].value)?;
            if let Type::Tuple(elems) = &info.ty {
                let fits = if sig.is_variadic() {
                    elems.len() + 1 >= sig.params.len()
                } else {
                    elems.len() == sig.params.len()
                };
                if fits {
                    let count = compiler
                        .builder()
                        .unpack()
                        .map_err(|e| from_build(e, span, &target.describe))?;
                    let ty = compiler
                        .builder()
                        .call(count, false)
                        .map_err(|e| from_build(e, span, &target.describe))?;
                    return Ok(ExprInfo::rvalue(ty));
                }
            }
        }
        return Err(arity_error(compiler, sig, target, positional, span));
    }

    for (i, arg) in positional.iter().enumerate() {
        let expected = param_at(sig, i, argc, call.spread).ok_or_else(|| {
            arity_error(compiler, sig, target, positional, span)
        })?;
        compiler.check_expecting(
            arg.value,
            &expected,
            &format!("argument to {}", target.describe),
        )?;
    }

    let ty = compiler
        .builder()
        .call(argc, call.spread)
        .map_err(|e| from_build(e, span, &target.describe))?;
    Ok(ExprInfo::rvalue(ty))
}

/// Keyword arguments merge into one synthetic literal argument
/// compiled against the candidate's next expected parameter type.
fn attempt_with_keywords(
    compiler: &mut ExprCompiler<'_, '_>,
    sig: &Rc<Signature>,
    target: &CallTarget,
    positional: &[Argument<'_>],
    keywords: &[Argument<'_>],
    span: Span,
) -> Result<ExprInfo> {
    let merged_at = positional.len();
    let Some(expected) = sig.params.get(merged_at).cloned() else {
        return Err(arity_error(compiler, sig, target, positional, span));
    };

    for (i, arg) in positional.iter().enumerate() {
        let expected = param_at(sig, i, positional.len() + 1, false)
            .ok_or_else(|| arity_error(compiler, sig, target, positional, span))?;
        compiler.check_expecting(
            arg.value,
            &expected,
            &format!("argument to {}", target.describe),
        )?;
    }

    literal::compile_keyword_argument(compiler, keywords, &expected, span)?;

    let ty = compiler
        .builder()
        .call(merged_at + 1, false)
        .map_err(|e| from_build(e, span, &target.describe))?;
    Ok(ExprInfo::rvalue(ty))
}

/// Emit the callee value typed for this candidate.
fn emit_callee(
    compiler: &mut ExprCompiler<'_, '_>,
    sig: &Rc<Signature>,
    target: &CallTarget,
    span: Span,
) -> Result<()> {
    let callee_ty = Type::Func(Rc::clone(sig));
    match &target.kind {
        TargetKind::Global { qualified } => {
            compiler.builder().load_global(qualified, callee_ty);
        }
        TargetKind::Local { name } => {
            compiler.builder().load_local(name, callee_ty);
        }
        TargetKind::ImplicitMethod {
            binding,
            binding_ty,
            method,
        } => {
            let (binding, binding_ty, method) = (binding.clone(), binding_ty.clone(), method.clone());
            compiler.builder().load_local(&binding, binding_ty);
            compiler
                .builder()
                .bind_member(&method, callee_ty)
                .map_err(|e| from_build(e, span, &target.describe))?;
        }
        TargetKind::BoundMethod { method } => {
            let method = method.clone();
            compiler
                .builder()
                .bind_member(&method, callee_ty)
                .map_err(|e| from_build(e, span, &target.describe))?;
        }
        TargetKind::OnStack => {}
    }
    Ok(())
}

/// The expected type of the argument at `i`, honoring variadic and
/// spread rules.
fn param_at(sig: &Signature, i: usize, argc: usize, spread: bool) -> Option<Type> {
    if sig.is_variadic() {
        let fixed = sig.params.len() - 1;
        if i < fixed {
            sig.params.get(i).cloned()
        } else if spread && i + 1 == argc {
            sig.params.last().cloned()
        } else {
            match sig.params.last() {
                Some(Type::Slice(elem)) => Some((**elem).clone()),
                other => other.cloned(),
            }
        }
    } else {
        sig.params.get(i).cloned()
    }
}

/// Whether an argument can only compile in check mode (so the tuple
/// probe must not run it in infer mode).
fn needs_expected_type(expr: &Expr<'_>) -> bool {
    match expr {
        Expr::Lambda(_) => true,
        Expr::Composite(lit) => lit.ty.is_none(),
        Expr::Paren(p) => needs_expected_type(p.expr),
        _ => false,
    }
}

/// Build the have/want arity diagnostic, compiling the arguments in
/// infer mode for their types (best effort; the attempt is rolled back
/// wholesale anyway).
fn arity_error(
    compiler: &mut ExprCompiler<'_, '_>,
    sig: &Signature,
    target: &CallTarget,
    positional: &[Argument<'_>],
    span: Span,
) -> CompileError {
    let mut have = Vec::with_capacity(positional.len());
    for arg in positional {
        if needs_expected_type(arg.value) {
            have.push("?".to_string());
            continue;
        }
        match compiler.infer(arg.value) {
            Ok(info) => have.push(info.ty.to_string()),
            Err(_) => have.push("?".to_string()),
        }
    }
    let want = sig.params.iter().map(Type::to_string).collect();
    CompileError::new(
        ErrorKind::ArityMismatch {
            target: target.describe.clone(),
            have,
            want,
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CodeBuilder, Ir, IrBuilder};
    use crate::context::Context;
    use arbor_core::{Field, ModuleEnv, Span, StructDef, Symbol};
    use arbor_syntax::{Ident, LitExpr, LitKind};
    use bumpalo::Bump;

    fn lit_int(arena: &Bump, v: i64) -> &Expr<'_> {
        arena.alloc(Expr::Lit(LitExpr {
            kind: LitKind::Int(v),
            span: Span::default(),
        }))
    }

    fn lit_str<'a>(arena: &'a Bump, s: &'a str) -> &'a Expr<'a> {
        arena.alloc(Expr::Lit(LitExpr {
            kind: LitKind::Str(s),
            span: Span::default(),
        }))
    }

    fn ident<'a>(arena: &'a Bump, name: &'a str) -> &'a Expr<'a> {
        arena.alloc(Expr::Ident(arbor_syntax::IdentExpr {
            ident: Ident::new(name, Span::default()),
            span: Span::default(),
        }))
    }

    fn arg<'a>(value: &'a Expr<'a>) -> Argument<'a> {
        Argument {
            name: None,
            value,
            span: Span::default(),
        }
    }

    fn named_arg<'a>(name: &'a str, value: &'a Expr<'a>) -> Argument<'a> {
        Argument {
            name: Some(Ident::new(name, Span::default())),
            value,
            span: Span::default(),
        }
    }

    fn call_expr<'a>(
        arena: &'a Bump,
        callee: &'a Expr<'a>,
        args: Vec<Argument<'a>>,
        spread: bool,
    ) -> &'a CallExpr<'a> {
        arena.alloc(CallExpr {
            callee,
            args: arena.alloc_slice_clone(&args),
            spread,
            span: Span::default(),
        })
    }

    fn env_with_overloads() -> ModuleEnv {
        let mut env = ModuleEnv::new("main");
        env.declare(Symbol::func(
            "combine",
            vec![
                Signature::plain(vec![Type::Int, Type::Int], vec![Type::Int]),
                Signature::plain(vec![Type::Str, Type::Str], vec![Type::Str]),
            ],
        ));
        env.declare(Symbol::func(
            "pair",
            vec![Signature::plain(vec![], vec![Type::Int, Type::Int])],
        ));
        env.declare(Symbol::func(
            "sum",
            vec![Signature::plain(vec![Type::Int, Type::Int], vec![Type::Int])],
        ));
        env
    }

    fn compile<'a>(
        env: &ModuleEnv,
        builder: &mut IrBuilder,
        call: &CallExpr<'a>,
    ) -> Result<ExprInfo> {
        let mut ctx = Context::new(env);
        ctx.begin_unit("test", "test.ab", vec![]);
        let mut compiler = ExprCompiler::new(&mut ctx, builder);
        compile_call(&mut compiler, call)
    }

    #[test]
    fn second_candidate_wins_and_leaves_no_residue() {
        let arena = Bump::new();
        let env = env_with_overloads();
        let mut builder = IrBuilder::new();

        let call = call_expr(
            &arena,
            ident(&arena, "combine"),
            vec![
                arg(lit_str(&arena, "a")),
                arg(lit_str(&arena, "b")),
            ],
            false,
        );
        let info = compile(&env, &mut builder, call).unwrap();
        assert_eq!(info.ty, Type::Str);

        // The emitted stream is exactly one callee load, two constants
        // and the call; the failed int-candidate attempt left nothing.
        let loads: Vec<_> = builder
            .ops()
            .iter()
            .filter(|op| matches!(op, Ir::LoadGlobal(_)))
            .collect();
        assert_eq!(loads.len(), 1);
        assert_eq!(builder.depth(), 1);
        assert_eq!(builder.top_type(), Some(&Type::Str));
    }

    #[test]
    fn no_candidate_surfaces_first_error() {
        let arena = Bump::new();
        let env = env_with_overloads();
        let mut builder = IrBuilder::new();

        let call = call_expr(
            &arena,
            ident(&arena, "combine"),
            vec![
                arg(lit_int(&arena, 1)),
                arg(lit_str(&arena, "b")),
            ],
            false,
        );
        let err = compile(&env, &mut builder, call).unwrap_err();
        // The first candidate (int, int) fails on the second argument;
        // that is the error reported, not the string candidate's.
        match err.kind {
            ErrorKind::TypeMismatch { have, want, .. } => {
                assert_eq!(have, "string");
                assert_eq!(want, "int");
            }
            other => panic!("expected type mismatch, got {other:?}"),
        }
        // Everything was rolled back.
        assert_eq!(builder.depth(), 0);
        assert!(builder.ops().is_empty());
    }

    #[test]
    fn tuple_argument_unpacks_to_matching_arity() {
        let arena = Bump::new();
        let env = env_with_overloads();
        let mut builder = IrBuilder::new();

        // sum(pair()) - pair returns (int, int), sum wants two ints.
        let inner = call_expr(&arena, ident(&arena, "pair"), vec![], false);
        let inner_expr = arena.alloc(Expr::Call(inner));
        let call = call_expr(&arena, ident(&arena, "sum"), vec![arg(inner_expr)], false);

        let info = compile(&env, &mut builder, call).unwrap();
        assert_eq!(info.ty, Type::Int);
        assert!(builder.ops().iter().any(|op| matches!(op, Ir::Unpack { count: 2 })));
    }

    #[test]
    fn variadic_absorbs_excess_and_spread_passes_whole() {
        let arena = Bump::new();
        let mut env = ModuleEnv::new("main");
        env.declare(Symbol::func(
            "join",
            vec![Signature::variadic(
                vec![Type::Str, Type::slice(Type::Int)],
                vec![Type::Str],
            )],
        ));
        env.declare(Symbol::var("nums", Type::slice(Type::Int)));

        let mut builder = IrBuilder::new();
        let call = call_expr(
            &arena,
            ident(&arena, "join"),
            vec![
                arg(lit_str(&arena, "-")),
                arg(lit_int(&arena, 1)),
                arg(lit_int(&arena, 2)),
                arg(lit_int(&arena, 3)),
            ],
            false,
        );
        assert!(compile(&env, &mut builder, call).is_ok());

        let mut builder = IrBuilder::new();
        let spread_call = call_expr(
            &arena,
            ident(&arena, "join"),
            vec![
                arg(lit_str(&arena, "-")),
                arg(ident(&arena, "nums")),
            ],
            true,
        );
        assert!(compile(&env, &mut builder, spread_call).is_ok());
        assert!(
            builder
                .ops()
                .iter()
                .any(|op| matches!(op, Ir::Call { spread: true, .. }))
        );
    }

    #[test]
    fn keyword_arguments_merge_into_struct_literal() {
        let arena = Bump::new();
        let mut env = ModuleEnv::new("main");
        let def = Rc::new(StructDef::new(
            "main",
            "Options",
            vec![
                Field {
                    name: "Depth".to_string(),
                    ty: Type::Int,
                },
                Field {
                    name: "Trace".to_string(),
                    ty: Type::Bool,
                },
            ],
        ));
        env.declare(Symbol::type_name("Options", Type::Struct(Rc::clone(&def))));
        env.declare(Symbol::func(
            "walk",
            vec![Signature::plain(
                vec![Type::Str, Type::Struct(Rc::clone(&def))],
                vec![Type::Error],
            )],
        ));

        let mut builder = IrBuilder::new();
        let call = call_expr(
            &arena,
            ident(&arena, "walk"),
            vec![
                arg(lit_str(&arena, "root")),
                named_arg("depth", lit_int(&arena, 3)),
            ],
            false,
        );
        let info = compile(&env, &mut builder, call).unwrap();
        assert_eq!(info.ty, Type::Error);
        assert!(
            builder
                .ops()
                .iter()
                .any(|op| matches!(op, Ir::MakeStruct { fields: 2, .. }))
        );
    }

    #[test]
    fn keyword_arguments_against_plain_type_fail_candidate() {
        let arena = Bump::new();
        let mut env = ModuleEnv::new("main");
        env.declare(Symbol::func(
            "inc",
            vec![Signature::plain(vec![Type::Int], vec![Type::Int])],
        ));

        let mut builder = IrBuilder::new();
        let call = call_expr(
            &arena,
            ident(&arena, "inc"),
            vec![named_arg("by", lit_int(&arena, 2))],
            false,
        );
        let err = compile(&env, &mut builder, call).unwrap_err();
        assert!(err.is_candidate_failure());
        assert_eq!(builder.depth(), 0);
    }

    #[test]
    fn builtin_fallback_after_failed_package_candidates() {
        let arena = Bump::new();
        let mut env = ModuleEnv::new("main");
        // Package-level `size` only takes a string.
        env.declare(Symbol::func(
            "size",
            vec![Signature::plain(vec![Type::Str], vec![Type::Int])],
        ));
        // The builtin of the same name takes a slice.
        env.add_builtin(Symbol::func(
            "size",
            vec![Signature::plain(vec![Type::slice(Type::Int)], vec![Type::Int])],
        ));
        env.declare(Symbol::var("nums", Type::slice(Type::Int)));

        let mut builder = IrBuilder::new();
        let call = call_expr(
            &arena,
            ident(&arena, "size"),
            vec![arg(ident(&arena, "nums"))],
            false,
        );
        let info = compile(&env, &mut builder, call).unwrap();
        assert_eq!(info.ty, Type::Int);
    }

    #[test]
    fn arity_mismatch_reports_have_want() {
        let arena = Bump::new();
        let env = env_with_overloads();
        let mut builder = IrBuilder::new();

        let call = call_expr(
            &arena,
            ident(&arena, "sum"),
            vec![arg(lit_int(&arena, 1))],
            false,
        );
        let err = compile(&env, &mut builder, call).unwrap_err();
        match err.kind {
            ErrorKind::ArityMismatch { target, have, want } => {
                assert_eq!(target, "sum");
                assert_eq!(have, vec!["int".to_string()]);
                assert_eq!(want, vec!["int".to_string(), "int".to_string()]);
            }
            other => panic!("expected arity mismatch, got {other:?}"),
        }
    }

    #[test]
    fn unknown_callee_is_fatal() {
        let arena = Bump::new();
        let env = ModuleEnv::new("main");
        let mut builder = IrBuilder::new();
        let call = call_expr(&arena, ident(&arena, "nowhere"), vec![], false);
        let err = compile(&env, &mut builder, call).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnresolvedIdent { .. }));
        assert!(!err.is_candidate_failure());
    }
}
