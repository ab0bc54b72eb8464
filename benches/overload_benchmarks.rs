//! Overload resolution benchmarks.

use std::hint::black_box;

use bumpalo::Bump;
use criterion::{Criterion, criterion_group, criterion_main};

use arbor::syntax::{Argument, CallExpr, Expr, Ident, IdentExpr, LitExpr, LitKind};
use arbor::{Context, ExprCompiler, IrBuilder, ModuleEnv, Signature, Span, Symbol, Type};

/// An overload set whose last candidate is the only match, so every
/// earlier attempt is compiled and rolled back.
fn env_with_chain(len: usize) -> ModuleEnv {
    let mut env = ModuleEnv::new("main");
    let mut sigs: Vec<Signature> = (0..len.saturating_sub(1))
        .map(|i| Signature::plain(vec![Type::Int; i + 2], vec![Type::Int]))
        .collect();
    sigs.push(Signature::plain(vec![Type::Str], vec![Type::Str]));
    env.declare(Symbol::func("f", sigs));
    env
}

fn bench_overload_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("overload_resolution");
    for chain_len in [1usize, 4, 16] {
        let env = env_with_chain(chain_len);
        let arena = Bump::new();
        let callee = arena.alloc(Expr::Ident(IdentExpr {
            ident: Ident::new("f", Span::default()),
            span: Span::default(),
        }));
        let value = arena.alloc(Expr::Lit(LitExpr {
            kind: LitKind::Str("x"),
            span: Span::default(),
        }));
        let args = arena.alloc_slice_copy(&[Argument {
            name: None,
            value,
            span: Span::default(),
        }]);
        let call = arena.alloc(Expr::Call(arena.alloc(CallExpr {
            callee,
            args,
            spread: false,
            span: Span::default(),
        })));

        group.bench_function(format!("chain_{chain_len}"), |b| {
            b.iter(|| {
                let mut ctx = Context::new(&env);
                ctx.begin_unit("bench", "bench.ab", vec![]);
                let mut builder = IrBuilder::new();
                let mut compiler = ExprCompiler::new(&mut ctx, &mut builder);
                let info = compiler.infer(black_box(call)).unwrap();
                black_box(info.ty)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_overload_resolution);
criterion_main!(benches);
