//! End-to-end compilation tests over the public API.

use std::rc::Rc;

use bumpalo::Bump;

use arbor::syntax::{
    Argument, BinOp, BinaryExpr, CallExpr, CompositeElem, CompositeExpr, DescendantFilter,
    ErrWrapExpr, ErrWrapOp, Expr, Ident, IdentExpr, LambdaBody, LambdaExpr, LitExpr, LitKind,
    MemberAccess, MemberExpr,
};
use arbor::{
    CodeBuilder, Context, ErrorKind, ExprCompiler, Field, Ir, IrBuilder, MemoryRecorder,
    ModuleEnv, Signature, Span, StructDef, Symbol, Type, Value,
};

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
    arena.alloc(Expr::Ident(IdentExpr {
        ident: Ident::new(name, Span::default()),
        span: Span::default(),
    }))
}

fn call<'a>(
    arena: &'a Bump,
    callee: &'a Expr<'a>,
    values: &[&'a Expr<'a>],
) -> &'a Expr<'a> {
    let args: Vec<Argument<'a>> = values
        .iter()
        .map(|value| Argument {
            name: None,
            value,
            span: Span::default(),
        })
        .collect();
    arena.alloc(Expr::Call(arena.alloc(CallExpr {
        callee,
        args: arena.alloc_slice_clone(&args),
        spread: false,
        span: Span::default(),
    })))
}

fn point_def() -> Rc<StructDef> {
    Rc::new(StructDef::new(
        "main",
        "Point",
        vec![
            Field {
                name: "X".to_string(),
                ty: Type::Int,
            },
            Field {
                name: "Y".to_string(),
                ty: Type::Int,
            },
        ],
    ))
}

fn compile_expr<'a>(
    env: &ModuleEnv,
    results: Vec<Type>,
    expr: &Expr<'a>,
) -> (Result<Type, arbor::CompileError>, IrBuilder) {
    let mut ctx = Context::new(env);
    ctx.begin_unit("run", "main.ab", results.clone());
    let mut builder = IrBuilder::new();
    builder.begin_unit(results);
    let result = {
        let mut compiler = ExprCompiler::new(&mut ctx, &mut builder);
        compiler.infer(expr).map(|info| info.ty)
    };
    (result, builder)
}

#[test]
fn single_matching_overload_is_equivalent_to_direct_call() {
    let arena = Bump::new();

    // Two candidates; only the string one type-checks.
    let mut overloaded = ModuleEnv::new("main");
    overloaded.declare(Symbol::func(
        "f",
        vec![
            Signature::plain(vec![Type::Int], vec![Type::Int]),
            Signature::plain(vec![Type::Str], vec![Type::Str]),
        ],
    ));

    // The same function with the winning candidate alone.
    let mut direct = ModuleEnv::new("main");
    direct.declare(Symbol::func(
        "f",
        vec![Signature::plain(vec![Type::Str], vec![Type::Str])],
    ));

    let expr = call(&arena, ident(&arena, "f"), &[lit_str(&arena, "x")]);

    let (ty_a, builder_a) = compile_expr(&overloaded, vec![], expr);
    let (ty_b, builder_b) = compile_expr(&direct, vec![], expr);

    assert_eq!(ty_a.unwrap(), Type::Str);
    assert_eq!(ty_b.unwrap(), Type::Str);
    // No residual code from the failed attempt: both streams agree.
    assert_eq!(builder_a.ops(), builder_b.ops());
}

#[test]
fn struct_literal_arity_errors_report_type_name() {
    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    env.declare(Symbol::func(
        "draw",
        vec![Signature::plain(
            vec![Type::Struct(point_def())],
            vec![],
        )],
    ));

    let few = arena.alloc(Expr::Composite(arena.alloc(CompositeExpr {
        ty: None,
        elems: arena.alloc_slice_clone(&[CompositeElem {
            key: None,
            value: lit_int(&arena, 1),
            span: Span::default(),
        }]),
        span: Span::default(),
    })));
    let expr = call(&arena, ident(&arena, "draw"), &[few]);
    let (result, _) = compile_expr(&env, vec![], expr);
    let err = result.unwrap_err();
    let message = err.kind.render();
    assert!(message.contains("too few values"));
    assert!(message.contains("Point"));
}

#[test]
fn undefined_member_falls_through_selector_rewrite() {
    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    env.declare(Symbol::var(
        "x",
        Type::Struct(Rc::new(StructDef::new("main", "Plain", vec![]))),
    ));

    let expr = arena.alloc(Expr::Member(arena.alloc(MemberExpr {
        target: ident(&arena, "x"),
        access: MemberAccess::Name(Ident::new("name", Span::default())),
        span: Span::new(4, 2, 6),
    })));
    let (result, _) = compile_expr(&env, vec![], expr);
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "at 4:2: undefined: x.name");
}

#[test]
fn propagate_wraps_error_and_binds_value() {
    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    env.declare(Symbol::func(
        "f",
        vec![Signature::plain(vec![], vec![Type::Int, Type::Error])],
    ));

    let inner = call(&arena, ident(&arena, "f"), &[]);
    let expr = arena.alloc(Expr::ErrWrap(arena.alloc(ErrWrapExpr {
        op: ErrWrapOp::Propagate,
        call: inner,
        default: None,
        text: "f()",
        span: Span::new(2, 9, 4),
    })));

    let (result, builder) = compile_expr(&env, vec![Type::Int, Type::Error], expr);
    assert_eq!(result.unwrap(), Type::Int);

    // Error path: zero int pushed, error wrapped, both returned.
    assert!(builder.ops().iter().any(|op| matches!(op, Ir::Zero(Type::Int))));
    assert!(builder.ops().iter().any(|op| matches!(op, Ir::Return { arity: 2 })));
    let note = builder
        .ops()
        .iter()
        .find_map(|op| match op {
            Ir::WrapError(note) => Some(note.clone()),
            _ => None,
        })
        .expect("wrapped error annotation");
    assert_eq!(note.text, "f()");
    assert_eq!(note.unit, "run");
    assert_eq!(note.line, 2);
    // Success path continues with the bound int.
    assert_eq!(builder.top_type(), Some(&Type::Int));
}

#[test]
fn default_operator_evaluates_call_once() {
    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    env.declare(Symbol::func(
        "f",
        vec![Signature::plain(vec![], vec![Type::Int, Type::Error])],
    ));

    let inner = call(&arena, ident(&arena, "f"), &[]);
    let expr = arena.alloc(Expr::ErrWrap(arena.alloc(ErrWrapExpr {
        op: ErrWrapOp::Default,
        call: inner,
        default: Some(lit_int(&arena, 0)),
        text: "f()",
        span: Span::default(),
    })));

    let (result, builder) = compile_expr(&env, vec![], expr);
    assert_eq!(result.unwrap(), Type::Int);
    // The wrapped call is emitted exactly once.
    let calls = builder
        .ops()
        .iter()
        .filter(|op| matches!(op, Ir::Call { arity: 0, .. }))
        .count();
    // One call of `f`, one call of the synthesized closure.
    assert_eq!(calls, 2);
    let closure_calls = builder
        .ops()
        .iter()
        .filter(|op| matches!(op, Ir::BeginClosure(_)))
        .count();
    assert_eq!(closure_calls, 1);
}

#[test]
fn auto_referencing_inserts_address_of_for_pointer_expectation() {
    let arena = Bump::new();
    let def = point_def();
    let mut env = ModuleEnv::new("main");
    env.declare(Symbol::func(
        "plot",
        vec![Signature::plain(
            vec![Type::pointer(Type::Struct(Rc::clone(&def)))],
            vec![],
        )],
    ));
    env.declare(Symbol::func(
        "plot_value",
        vec![Signature::plain(vec![Type::Struct(def)], vec![])],
    ));

    let literal = arena.alloc(Expr::Composite(arena.alloc(CompositeExpr {
        ty: None,
        elems: arena.alloc_slice_clone(&[
            CompositeElem {
                key: None,
                value: lit_int(&arena, 1),
                span: Span::default(),
            },
            CompositeElem {
                key: None,
                value: lit_int(&arena, 2),
                span: Span::default(),
            },
        ]),
        span: Span::default(),
    })));

    let by_pointer = call(&arena, ident(&arena, "plot"), &[literal]);
    let (result, builder) = compile_expr(&env, vec![], by_pointer);
    assert!(result.is_ok());
    assert!(
        builder
            .ops()
            .iter()
            .any(|op| matches!(op, Ir::Unary(arbor_compiler::UnaryOp::AddrOf)))
    );

    let by_value = call(&arena, ident(&arena, "plot_value"), &[literal]);
    let (result, builder) = compile_expr(&env, vec![], by_value);
    assert!(result.is_ok());
    assert!(
        !builder
            .ops()
            .iter()
            .any(|op| matches!(op, Ir::Unary(arbor_compiler::UnaryOp::AddrOf)))
    );
}

#[test]
fn descendant_selectors_pass_name_filters() {
    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    env.declare(Symbol::var("x", Type::Node));

    // x.**.foo - only descendants named foo.
    let named = arena.alloc(Expr::Member(arena.alloc(MemberExpr {
        target: ident(&arena, "x"),
        access: MemberAccess::Descendant(DescendantFilter::Named(Ident::new(
            "foo",
            Span::default(),
        ))),
        span: Span::default(),
    })));
    let (result, builder) = compile_expr(&env, vec![], named);
    assert_eq!(result.unwrap(), Type::NodeSet);
    assert!(builder.ops().iter().any(|op| matches!(op, Ir::Member(m) if m == "AnyDescendant")));
    let filter = builder.ops().iter().find_map(|op| match op {
        Ir::Const(id) => builder.constants().get(*id).cloned(),
        _ => None,
    });
    assert_eq!(filter, Some(Value::str("foo")));

    // x.**."" - the empty filter enumerates every descendant.
    let quoted = arena.alloc(Expr::Member(arena.alloc(MemberExpr {
        target: ident(&arena, "x"),
        access: MemberAccess::Descendant(DescendantFilter::Quoted {
            raw: "\"\"",
            span: Span::default(),
        }),
        span: Span::default(),
    })));
    let (result, builder) = compile_expr(&env, vec![], quoted);
    assert_eq!(result.unwrap(), Type::NodeSet);
    let filter = builder.ops().iter().find_map(|op| match op {
        Ir::Const(id) => builder.constants().get(*id).cloned(),
        _ => None,
    });
    assert_eq!(filter, Some(Value::str("")));
}

#[test]
fn generic_call_infers_from_arguments_and_compiles_lambda() {
    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    env.declare(Symbol::func(
        "map",
        vec![Signature::generic(
            vec!["T".to_string()],
            vec![
                Type::slice(Type::Param("T".to_string())),
                Type::func(Signature::plain(
                    vec![Type::Param("T".to_string())],
                    vec![Type::Param("T".to_string())],
                )),
            ],
            vec![Type::slice(Type::Param("T".to_string()))],
        )],
    ));
    env.declare(Symbol::var("xs", Type::slice(Type::Int)));

    // map(xs, v => v + 1)
    let params = arena.alloc_slice_copy(&[Ident::new("v", Span::default())]);
    let bin = arena.alloc(BinaryExpr {
        left: ident(&arena, "v"),
        op: BinOp::Add,
        right: lit_int(&arena, 1),
        span: Span::default(),
    });
    let body_expr = arena.alloc(Expr::Binary(bin));
    let body: &[&Expr<'_>] = arena.alloc_slice_copy(&[&*body_expr]);
    let lambda = arena.alloc(Expr::Lambda(arena.alloc(LambdaExpr {
        params,
        body: LambdaBody::Exprs(body),
        span: Span::default(),
    })));

    let expr = call(&arena, ident(&arena, "map"), &[ident(&arena, "xs"), lambda]);
    let (result, builder) = compile_expr(&env, vec![], expr);
    assert_eq!(result.unwrap(), Type::slice(Type::Int));
    // The lambda compiled against the instantiated signature.
    let closure_sig = builder
        .ops()
        .iter()
        .find_map(|op| match op {
            Ir::BeginClosure(sig) => Some(Rc::clone(sig)),
            _ => None,
        })
        .expect("lambda closure emitted");
    assert_eq!(closure_sig.params, vec![Type::Int]);
}

#[test]
fn ambiguous_wildcard_import_is_reported() {
    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    let mut a = arbor::Package::new("alpha");
    a.insert(Symbol::var("level", Type::Int));
    let mut b = arbor::Package::new("beta");
    b.insert(Symbol::var("level", Type::Int));
    env.add_package(a);
    env.add_package(b);
    env.import_wildcard("alpha");
    env.import_wildcard("beta");

    let (result, _) = compile_expr(&env, vec![], ident(&arena, "level"));
    let err = result.unwrap_err();
    match err.kind {
        ErrorKind::AmbiguousImport { first, second, .. } => {
            assert_eq!(first, "alpha");
            assert_eq!(second, "beta");
        }
        other => panic!("expected ambiguous import, got {other:?}"),
    }
}

#[test]
fn recorder_receives_symbols_and_types() {
    use std::cell::RefCell;

    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    env.declare(Symbol::var("x", Type::Int));

    let mut ctx = Context::new(&env);
    ctx.begin_unit("run", "main.ab", vec![]);
    let recorder = Rc::new(RefCell::new(MemoryRecorder::new()));
    ctx.set_recorder(recorder.clone());
    let mut builder = IrBuilder::new();
    let mut compiler = ExprCompiler::new(&mut ctx, &mut builder);
    compiler.infer(ident(&arena, "x")).unwrap();

    let rec = recorder.borrow();
    assert!(rec.symbols.iter().any(|(_, name)| name == "x"));
    assert!(rec.types.iter().any(|(_, ty)| *ty == Type::Int));
}

#[test]
fn alias_fallback_compiles_capitalized_function_call() {
    let arena = Bump::new();
    let mut env = ModuleEnv::new("main");
    let mut fmt = arbor::Package::new("fmt");
    fmt.insert(Symbol::func(
        "Println",
        vec![Signature::variadic(
            vec![Type::slice(Type::Any)],
            vec![Type::Int, Type::Error],
        )],
    ));
    env.add_package(fmt);
    env.import_wildcard("fmt");

    let expr = call(&arena, ident(&arena, "println"), &[lit_str(&arena, "hi")]);
    let (result, builder) = compile_expr(&env, vec![], expr);
    assert_eq!(result.unwrap(), Type::Tuple(vec![Type::Int, Type::Error]));
    assert!(
        builder
            .ops()
            .iter()
            .any(|op| matches!(op, Ir::LoadGlobal(name) if name == "fmt.Println"))
    );
}
