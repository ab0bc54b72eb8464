//! Composite literal compilation.
//!
//! A literal's element type comes from its explicit annotation or from
//! the expected type at the use site (struct and map literals may elide
//! the type entirely). Struct literals take positional form (exact
//! field count) or keyed form (capitalization fallback for keys,
//! restricted to same-package struct types). Slice and array literals
//! accept constant integer indices with duplicate and out-of-bound
//! checks. Map literals require a key on every element.
//!
//! Auto-referencing: when the expected type is a pointer to exactly
//! the literal's resolved type, the literal compiles as a value and
//! address-of is applied, so pointer-typed call sites accept a plain
//! literal.

use std::collections::BTreeMap;
use std::rc::Rc;

use arbor_core::{CompileError, ErrorKind, Span, StructDef, Type, Value};
use arbor_syntax::{
    Argument, BinOp, CompositeExpr, CompositeKey, Expr, LitExpr, LitKind, UnOp,
};

use crate::builder::{CodeBuilder, UnaryOp};
use crate::resolver;

use super::{ExprCompiler, ExprInfo, from_build, resolve_type_expr};

type Result<T> = std::result::Result<T, CompileError>;

/// Compile a composite literal, positional or keyed, with type elision
/// against the expected type.
pub fn compile_composite<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    lit: &CompositeExpr<'ast>,
    expected: Option<&Type>,
) -> Result<ExprInfo> {
    let span = lit.span;
    let (target, auto_ref) = resolve_target(compiler, lit, expected, span)?;

    match &target {
        Type::Struct(def) => compile_struct(compiler, Rc::clone(def), lit)?,
        Type::Slice(elem) => compile_slice(compiler, elem, lit)?,
        Type::Array(len, elem) => compile_array(compiler, *len, elem, lit)?,
        Type::Map(key, value) => compile_map(compiler, key, value, lit)?,
        other => {
            return Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    target: "composite literal".to_string(),
                    have: "composite literal".to_string(),
                    want: other.to_string(),
                },
                span,
            ));
        }
    }

    let ty = if auto_ref {
        compiler
            .builder()
            .unary(UnaryOp::AddrOf)
            .map_err(|e| from_build(e, span, "composite literal"))?
    } else {
        target
    };
    Ok(ExprInfo::rvalue(ty))
}

/// Determine the literal's own type and whether address-of applies.
fn resolve_target(
    compiler: &mut ExprCompiler<'_, '_>,
    lit: &CompositeExpr<'_>,
    expected: Option<&Type>,
    span: Span,
) -> Result<(Type, bool)> {
    if let Some(te) = lit.ty {
        let ty = resolve_type_expr(compiler.ctx(), te)?;
        let auto_ref = matches!(expected, Some(Type::Pointer(inner)) if **inner == ty);
        return Ok((ty, auto_ref));
    }
    match expected {
        Some(Type::Pointer(inner)) => Ok(((**inner).clone(), true)),
        Some(other) => Ok((other.clone(), false)),
        None => Err(CompileError::new(
            ErrorKind::TypeMismatch {
                target: "composite literal".to_string(),
                have: "untyped literal".to_string(),
                want: "a composite type".to_string(),
            },
            span,
        )),
    }
}

fn compile_struct(
    compiler: &mut ExprCompiler<'_, '_>,
    def: Rc<StructDef>,
    lit: &CompositeExpr<'_>,
) -> Result<()> {
    let span = lit.span;

    if lit.elems.is_empty() {
        for field in &def.fields {
            compiler.builder().push_zero(&field.ty);
        }
        let count = def.fields.len();
        return compiler
            .builder()
            .make_struct(def, count)
            .map(drop)
            .map_err(|e| from_build(e, span, "struct literal"));
    }

    let keyed = lit.elems.iter().any(|e| e.key.is_some());
    if keyed && lit.elems.iter().any(|e| e.key.is_none()) {
        return Err(CompileError::new(ErrorKind::MixedLiteralKeys, span));
    }

    if !keyed {
        if lit.elems.len() > def.fields.len() {
            return Err(CompileError::new(
                ErrorKind::TooManyValues {
                    type_name: def.name.clone(),
                    have: lit.elems.len(),
                    want: def.fields.len(),
                },
                span,
            ));
        }
        if lit.elems.len() < def.fields.len() {
            return Err(CompileError::new(
                ErrorKind::TooFewValues {
                    type_name: def.name.clone(),
                    have: lit.elems.len(),
                    want: def.fields.len(),
                },
                span,
            ));
        }
        for (elem, field) in lit.elems.iter().zip(&def.fields) {
            compiler.check_expecting(
                elem.value,
                &field.ty,
                &format!("field {} of {}", field.name, def.name),
            )?;
        }
        let count = def.fields.len();
        return compiler
            .builder()
            .make_struct(def, count)
            .map(drop)
            .map_err(|e| from_build(e, span, "struct literal"));
    }

    // Keyed form: place every value at its field, then emit in field
    // order with zero fill for omitted fields.
    let mut provided: Vec<Option<&Expr<'_>>> = vec![None; def.fields.len()];
    for elem in lit.elems {
        let Some(CompositeKey::Name(ident)) = &elem.key else {
            return Err(CompileError::new(
                ErrorKind::UnknownField {
                    type_name: def.name.clone(),
                    field: "<expression>".to_string(),
                },
                elem.span,
            ));
        };
        let index = resolve_field_key(compiler, &def, ident.name).ok_or_else(|| {
            CompileError::new(
                ErrorKind::UnknownField {
                    type_name: def.name.clone(),
                    field: ident.name.to_string(),
                },
                elem.span,
            )
        })?;
        if provided[index].is_some() {
            return Err(CompileError::new(
                ErrorKind::DuplicateField {
                    field: def.fields[index].name.clone(),
                },
                elem.span,
            ));
        }
        provided[index] = Some(elem.value);
    }
    for (field, value) in def.fields.iter().zip(&provided) {
        match value {
            Some(expr) => {
                compiler.check_expecting(
                    expr,
                    &field.ty,
                    &format!("field {} of {}", field.name, def.name),
                )?;
            }
            None => compiler.builder().push_zero(&field.ty),
        }
    }
    let count = def.fields.len();
    compiler
        .builder()
        .make_struct(def, count)
        .map(drop)
        .map_err(|e| from_build(e, span, "struct literal"))
}

/// Resolve a literal key against the struct's fields, with the
/// capitalization fallback for literals compiled in the declaring
/// package.
fn resolve_field_key(
    compiler: &ExprCompiler<'_, '_>,
    def: &StructDef,
    name: &str,
) -> Option<usize> {
    if let Some((index, _)) = def.field(name) {
        return Some(index);
    }
    if compiler.ctx().env().current_package == def.package {
        let capitalized = resolver::capitalize(name);
        if let Some((index, _)) = def.field(&capitalized) {
            return Some(index);
        }
    }
    None
}

fn compile_slice(
    compiler: &mut ExprCompiler<'_, '_>,
    elem: &Type,
    lit: &CompositeExpr<'_>,
) -> Result<()> {
    let span = lit.span;
    let entries = index_elements(lit, None)?;
    let len = entries
        .keys()
        .next_back()
        .map(|max| (*max + 1) as usize)
        .unwrap_or(0);
    emit_indexed(compiler, elem, &entries, len)?;
    compiler
        .builder()
        .make_slice(elem.clone(), len)
        .map(drop)
        .map_err(|e| from_build(e, span, "slice literal"))
}

fn compile_array(
    compiler: &mut ExprCompiler<'_, '_>,
    len: u64,
    elem: &Type,
    lit: &CompositeExpr<'_>,
) -> Result<()> {
    let span = lit.span;
    let entries = index_elements(lit, Some(len))?;
    emit_indexed(compiler, elem, &entries, len as usize)?;
    compiler
        .builder()
        .make_array(elem.clone(), len)
        .map(drop)
        .map_err(|e| from_build(e, span, "array literal"))
}

/// Compile the provided elements in dense index order, zero-filling
/// the holes.
fn emit_indexed<'ast>(
    compiler: &mut ExprCompiler<'_, '_>,
    elem: &Type,
    entries: &BTreeMap<i64, &Expr<'ast>>,
    len: usize,
) -> Result<()> {
    for i in 0..len {
        match entries.get(&(i as i64)) {
            Some(expr) => {
                compiler.check_expecting(expr, elem, "literal element")?;
            }
            None => compiler.builder().push_zero(elem),
        }
    }
    Ok(())
}

/// Assign an index to every element, validating duplicates and the
/// declared bound.
fn index_elements<'ast>(
    lit: &CompositeExpr<'ast>,
    bound: Option<u64>,
) -> Result<BTreeMap<i64, &'ast Expr<'ast>>> {
    let mut entries = BTreeMap::new();
    let mut next: i64 = 0;
    for elem in lit.elems {
        let index = match &elem.key {
            None => next,
            Some(CompositeKey::Expr(expr)) => const_index(expr).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::TypeMismatch {
                        target: "literal index".to_string(),
                        have: "non-constant expression".to_string(),
                        want: "constant integer".to_string(),
                    },
                    elem.span,
                )
            })?,
            Some(CompositeKey::Name(_)) => {
                return Err(CompileError::new(
                    ErrorKind::TypeMismatch {
                        target: "literal index".to_string(),
                        have: "field name".to_string(),
                        want: "constant integer".to_string(),
                    },
                    elem.span,
                ));
            }
        };
        if index < 0 {
            return Err(CompileError::new(
                ErrorKind::IndexOutOfRange {
                    index,
                    len: bound.unwrap_or(0),
                },
                elem.span,
            ));
        }
        if let Some(bound) = bound
            && index as u64 >= bound
        {
            return Err(CompileError::new(
                ErrorKind::IndexOutOfRange { index, len: bound },
                elem.span,
            ));
        }
        if entries.contains_key(&index) {
            return Err(CompileError::new(
                ErrorKind::DuplicateIndex { index },
                elem.span,
            ));
        }
        entries.insert(index, elem.value);
        next = index + 1;
    }
    Ok(entries)
}

fn compile_map(
    compiler: &mut ExprCompiler<'_, '_>,
    key: &Type,
    value: &Type,
    lit: &CompositeExpr<'_>,
) -> Result<()> {
    let span = lit.span;
    for elem in lit.elems {
        match &elem.key {
            None => {
                return Err(CompileError::new(ErrorKind::MissingMapKey, elem.span));
            }
            Some(CompositeKey::Expr(expr)) => {
                compiler.check_expecting(expr, key, "map key")?;
            }
            Some(CompositeKey::Name(ident)) => {
                if *key == Type::Str {
                    compiler.builder().push_const(Value::str(ident.name));
                } else {
                    return Err(CompileError::new(
                        ErrorKind::TypeMismatch {
                            target: "map key".to_string(),
                            have: "field name".to_string(),
                            want: key.to_string(),
                        },
                        elem.span,
                    ));
                }
            }
        }
        compiler.check_expecting(elem.value, value, "map value")?;
    }
    compiler
        .builder()
        .make_map(key.clone(), value.clone(), lit.elems.len())
        .map(drop)
        .map_err(|e| from_build(e, span, "map literal"))
}

/// Merge keyword arguments into one synthetic literal argument against
/// the candidate's expected parameter type: a keyed struct literal for
/// struct (or pointer-to-struct) parameters, a string-keyed map literal
/// for map parameters. Anything else fails the candidate.
pub(crate) fn compile_keyword_argument(
    compiler: &mut ExprCompiler<'_, '_>,
    keywords: &[Argument<'_>],
    expected: &Type,
    span: Span,
) -> Result<ExprInfo> {
    if let Some(def) = expected.struct_def().cloned() {
        let mut provided: Vec<Option<&Expr<'_>>> = vec![None; def.fields.len()];
        for kw in keywords {
            let name = kw.name.as_ref().expect("keyword argument has a name").name;
            let index = resolve_field_key(compiler, &def, name).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::UnknownField {
                        type_name: def.name.clone(),
                        field: name.to_string(),
                    },
                    kw.span,
                )
            })?;
            if provided[index].is_some() {
                return Err(CompileError::new(
                    ErrorKind::DuplicateField {
                        field: def.fields[index].name.clone(),
                    },
                    kw.span,
                ));
            }
            provided[index] = Some(kw.value);
        }
        for (field, value) in def.fields.iter().zip(&provided) {
            match value {
                Some(expr) => {
                    compiler.check_expecting(
                        expr,
                        &field.ty,
                        &format!("field {} of {}", field.name, def.name),
                    )?;
                }
                None => compiler.builder().push_zero(&field.ty),
            }
        }
        let count = def.fields.len();
        let mut ty = compiler
            .builder()
            .make_struct(def, count)
            .map_err(|e| from_build(e, span, "keyword arguments"))?;
        if matches!(expected, Type::Pointer(_)) {
            ty = compiler
                .builder()
                .unary(UnaryOp::AddrOf)
                .map_err(|e| from_build(e, span, "keyword arguments"))?;
        }
        return Ok(ExprInfo::rvalue(ty));
    }

    if let Type::Map(key, value) = expected {
        if **key != Type::Str {
            return Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    target: "keyword arguments".to_string(),
                    have: "keyword arguments".to_string(),
                    want: expected.to_string(),
                },
                span,
            ));
        }
        for kw in keywords {
            let name = kw.name.as_ref().expect("keyword argument has a name").name;
            compiler.builder().push_const(Value::str(name));
            compiler.check_expecting(kw.value, value, "map value")?;
        }
        let ty = compiler
            .builder()
            .make_map((**key).clone(), (**value).clone(), keywords.len())
            .map_err(|e| from_build(e, span, "keyword arguments"))?;
        return Ok(ExprInfo::rvalue(ty));
    }

    Err(CompileError::new(
        ErrorKind::TypeMismatch {
            target: "keyword arguments".to_string(),
            have: "keyword arguments".to_string(),
            want: expected.to_string(),
        },
        span,
    ))
}

/// Evaluate a constant integer index expression.
fn const_index(expr: &Expr<'_>) -> Option<i64> {
    match expr {
        Expr::Lit(LitExpr {
            kind: LitKind::Int(v),
            ..
        }) => Some(*v),
        Expr::Paren(p) => const_index(p.expr),
        Expr::Unary(u) if u.op == UnOp::Neg => const_index(u.operand).map(|v| -v),
        Expr::Binary(b) => {
            let left = const_index(b.left)?;
            let right = const_index(b.right)?;
            match b.op {
                BinOp::Add => left.checked_add(right),
                BinOp::Sub => left.checked_sub(right),
                BinOp::Mul => left.checked_mul(right),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Ir, IrBuilder};
    use crate::context::Context;
    use arbor_core::{Field, ModuleEnv};
    use arbor_syntax::{CompositeElem, Ident};
    use bumpalo::Bump;

    fn point_type() -> Type {
        Type::Struct(Rc::new(StructDef::new(
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
        )))
    }

    fn lit_int(arena: &Bump, v: i64) -> &Expr<'_> {
        arena.alloc(Expr::Lit(LitExpr {
            kind: LitKind::Int(v),
            span: Span::default(),
        }))
    }

    fn elem<'a>(value: &'a Expr<'a>) -> CompositeElem<'a> {
        CompositeElem {
            key: None,
            value,
            span: Span::default(),
        }
    }

    fn keyed<'a>(_arena: &'a Bump, name: &'a str, value: &'a Expr<'a>) -> CompositeElem<'a> {
        CompositeElem {
            key: Some(CompositeKey::Name(Ident::new(name, Span::default()))),
            value,
            span: Span::default(),
        }
    }

    fn indexed<'a>(arena: &'a Bump, index: i64, value: &'a Expr<'a>) -> CompositeElem<'a> {
        CompositeElem {
            key: Some(CompositeKey::Expr(lit_int(arena, index))),
            value,
            span: Span::default(),
        }
    }

    fn composite<'a>(arena: &'a Bump, elems: Vec<CompositeElem<'a>>) -> &'a CompositeExpr<'a> {
        arena.alloc(CompositeExpr {
            ty: None,
            elems: arena.alloc_slice_clone(&elems),
            span: Span::default(),
        })
    }

    fn compile<'a>(
        builder: &mut IrBuilder,
        lit: &CompositeExpr<'a>,
        expected: &Type,
    ) -> Result<ExprInfo> {
        let env = ModuleEnv::new("main");
        let mut ctx = Context::new(&env);
        ctx.begin_unit("f", "f.ab", vec![]);
        let mut compiler = ExprCompiler::new(&mut ctx, builder);
        compile_composite(&mut compiler, lit, Some(expected))
    }

    #[test]
    fn positional_struct_exact_arity() {
        let arena = Bump::new();
        let mut builder = IrBuilder::new();
        let lit = composite(
            &arena,
            vec![elem(lit_int(&arena, 1)), elem(lit_int(&arena, 2))],
        );
        let info = compile(&mut builder, lit, &point_type()).unwrap();
        assert_eq!(info.ty, point_type());
        assert!(
            builder
                .ops()
                .iter()
                .any(|op| matches!(op, Ir::MakeStruct { fields: 2, .. }))
        );
    }

    #[test]
    fn too_few_and_too_many_values_name_the_type() {
        let arena = Bump::new();
        let mut builder = IrBuilder::new();
        let lit = composite(&arena, vec![elem(lit_int(&arena, 1))]);
        let err = compile(&mut builder, lit, &point_type()).unwrap_err();
        match err.kind {
            ErrorKind::TooFewValues {
                type_name,
                have,
                want,
            } => {
                assert_eq!(type_name, "Point");
                assert_eq!((have, want), (1, 2));
            }
            other => panic!("expected too few values, got {other:?}"),
        }
        assert!(err.kind.render().contains("too few values"));

        let mut builder = IrBuilder::new();
        let lit = composite(
            &arena,
            vec![
                elem(lit_int(&arena, 1)),
                elem(lit_int(&arena, 2)),
                elem(lit_int(&arena, 3)),
            ],
        );
        let err = compile(&mut builder, lit, &point_type()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TooManyValues { .. }));
        assert!(err.kind.render().contains("Point"));
    }

    #[test]
    fn keyed_struct_capitalization_same_package_only() {
        let arena = Bump::new();
        let mut builder = IrBuilder::new();
        let lit = composite(
            &arena,
            vec![
                keyed(&arena, "x", lit_int(&arena, 1)),
                keyed(&arena, "Y", lit_int(&arena, 2)),
            ],
        );
        // Same package ("main"): lower-case `x` reaches field `X`.
        assert!(compile(&mut builder, lit, &point_type()).is_ok());

        // Foreign package: the fallback is off.
        let foreign = Type::Struct(Rc::new(StructDef::new(
            "geom",
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
        )));
        let mut builder = IrBuilder::new();
        let err = compile(&mut builder, lit, &foreign).unwrap_err();
        match err.kind {
            ErrorKind::UnknownField { field, .. } => assert_eq!(field, "x"),
            other => panic!("expected unknown field, got {other:?}"),
        }
    }

    #[test]
    fn auto_reference_only_for_pointer_expectation() {
        let arena = Bump::new();
        let lit = composite(
            &arena,
            vec![elem(lit_int(&arena, 1)), elem(lit_int(&arena, 2))],
        );

        let expected = Type::pointer(point_type());
        let mut builder = IrBuilder::new();
        let info = compile(&mut builder, lit, &expected).unwrap();
        assert_eq!(info.ty, expected);
        assert!(
            builder
                .ops()
                .iter()
                .any(|op| matches!(op, Ir::Unary(UnaryOp::AddrOf)))
        );

        let mut builder = IrBuilder::new();
        let info = compile(&mut builder, lit, &point_type()).unwrap();
        assert_eq!(info.ty, point_type());
        assert!(
            !builder
                .ops()
                .iter()
                .any(|op| matches!(op, Ir::Unary(UnaryOp::AddrOf)))
        );
    }

    #[test]
    fn slice_literal_with_indices_zero_fills_holes() {
        let arena = Bump::new();
        let mut builder = IrBuilder::new();
        let lit = composite(
            &arena,
            vec![
                indexed(&arena, 2, lit_int(&arena, 9)),
                elem(lit_int(&arena, 10)),
            ],
        );
        let expected = Type::slice(Type::Int);
        let info = compile(&mut builder, lit, &expected).unwrap();
        assert_eq!(info.ty, expected);
        // Indices 0 and 1 are holes; 2 and 3 are provided.
        assert!(
            builder
                .ops()
                .iter()
                .any(|op| matches!(op, Ir::MakeSlice { len: 4, .. }))
        );
        let zeros = builder
            .ops()
            .iter()
            .filter(|op| matches!(op, Ir::Zero(_)))
            .count();
        assert_eq!(zeros, 2);
    }

    #[test]
    fn duplicate_and_out_of_bound_indices_are_errors() {
        let arena = Bump::new();
        let mut builder = IrBuilder::new();
        let lit = composite(
            &arena,
            vec![
                indexed(&arena, 1, lit_int(&arena, 9)),
                indexed(&arena, 1, lit_int(&arena, 8)),
            ],
        );
        let err = compile(&mut builder, lit, &Type::slice(Type::Int)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateIndex { index: 1 }));

        let mut builder = IrBuilder::new();
        let lit = composite(&arena, vec![indexed(&arena, 5, lit_int(&arena, 9))]);
        let err = compile(&mut builder, lit, &Type::array(3, Type::Int)).unwrap_err();
        match err.kind {
            ErrorKind::IndexOutOfRange { index, len } => {
                assert_eq!((index, len), (5, 3));
            }
            other => panic!("expected out-of-range index, got {other:?}"),
        }
        assert_eq!(err.kind.render(), "index 5 out of range [0, 3) in literal");
    }

    #[test]
    fn map_literal_requires_keys() {
        let arena = Bump::new();
        let mut builder = IrBuilder::new();
        let lit = composite(&arena, vec![elem(lit_int(&arena, 1))]);
        let expected = Type::map(Type::Str, Type::Int);
        let err = compile(&mut builder, lit, &expected).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MissingMapKey));

        let mut builder = IrBuilder::new();
        let lit = composite(&arena, vec![keyed(&arena, "depth", lit_int(&arena, 3))]);
        let info = compile(&mut builder, lit, &expected).unwrap();
        assert_eq!(info.ty, expected);
        assert!(
            builder
                .ops()
                .iter()
                .any(|op| matches!(op, Ir::MakeMap { pairs: 1, .. }))
        );
    }

    #[test]
    fn const_index_arithmetic() {
        let arena = Bump::new();
        let two = lit_int(&arena, 2);
        let three = lit_int(&arena, 3);
        let product = arena.alloc(arbor_syntax::BinaryExpr {
            left: two,
            op: BinOp::Mul,
            right: three,
            span: Span::default(),
        });
        let expr = Expr::Binary(product);
        assert_eq!(const_index(&expr), Some(6));
    }
}
