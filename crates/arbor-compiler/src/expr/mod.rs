//! Expression compiler with bidirectional type checking.
//!
//! [`ExprCompiler`] walks the surface tree depth-first and rewrites
//! every node into code-builder calls:
//! - `infer()` - synthesize the type from the expression (bottom-up)
//! - `check()` - compile against an expected type (top-down); the
//!   expected type drives lambda parameter typing, composite literal
//!   elision and auto-referencing
//!
//! Dispatch is an exhaustive match over the closed [`Expr`] sum type;
//! each syntactic family lives in its own module, and every module
//! re-enters `infer`/`check` for sub-expressions.

pub mod calls;
pub mod errwrap;
pub mod generics;
pub mod lambda;
pub mod literal;
pub mod query;

use arbor_core::{
    BuildError, CompileError, ErrorKind, Span, Symbol, SymbolKind, Type, Value, assignable,
};
use arbor_syntax::{
    BinOp, BinaryExpr, Expr, IdentExpr, LitExpr, LitKind, TypeExpr, UnOp, UnaryExpr,
};

use crate::builder::{BinaryOp, CodeBuilder, UnaryOp};
use crate::context::Context;
use crate::resolver::{self, Resolution};

type Result<T> = std::result::Result<T, CompileError>;

/// Type information of a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprInfo {
    pub ty: Type,
}

impl ExprInfo {
    pub fn rvalue(ty: Type) -> Self {
        Self { ty }
    }
}

/// Compiles expressions against a compilation context and a
/// code-builder.
pub struct ExprCompiler<'a, 'env> {
    ctx: &'a mut Context<'env>,
    builder: &'a mut dyn CodeBuilder,
}

impl<'a, 'env> ExprCompiler<'a, 'env> {
    pub fn new(ctx: &'a mut Context<'env>, builder: &'a mut dyn CodeBuilder) -> Self {
        Self { ctx, builder }
    }

    /// Synthesize the type of an expression (infer mode).
    pub fn infer<'ast>(&mut self, expr: &Expr<'ast>) -> Result<ExprInfo> {
        let info = self.infer_inner(expr)?;
        self.ctx.record_type(expr.span(), &info.ty);
        Ok(info)
    }

    fn infer_inner<'ast>(&mut self, expr: &Expr<'ast>) -> Result<ExprInfo> {
        match expr {
            Expr::Lit(lit) => self.compile_lit(lit),
            Expr::Ident(ident) => self.compile_ident(ident),
            Expr::Unary(un) => self.compile_unary(un),
            Expr::Binary(bin) => self.compile_binary(bin),
            Expr::Call(call) => calls::compile_call(self, call),
            Expr::Member(member) => query::compile_member(self, member),
            Expr::Lambda(lam) => lambda::compile_lambda(self, lam, None, lam.span),
            Expr::Composite(lit) => literal::compile_composite(self, lit, None),
            Expr::ErrWrap(wrap) => errwrap::compile_errwrap(self, wrap),
            Expr::Paren(p) => self.infer_inner(p.expr),
            Expr::TypeRef(te) => {
                let ty = resolve_type_expr(self.ctx, te)?;
                self.builder.push_type(ty.clone());
                Ok(ExprInfo::rvalue(Type::TypeValue(ty.into())))
            }
        }
    }

    /// Compile an expression against an expected type (check mode).
    pub fn check<'ast>(&mut self, expr: &Expr<'ast>, expected: &Type) -> Result<ExprInfo> {
        self.check_expecting(expr, expected, "expression")
    }

    /// Check mode with a description of the expectation's target for
    /// diagnostics ("argument to f", "field X of T", ...).
    pub fn check_expecting<'ast>(
        &mut self,
        expr: &Expr<'ast>,
        expected: &Type,
        target: &str,
    ) -> Result<ExprInfo> {
        match expr {
            Expr::Lambda(lam) => lambda::compile_lambda(self, lam, Some(expected), lam.span),
            Expr::Composite(lit) => literal::compile_composite(self, lit, Some(expected)),
            Expr::Paren(p) => self.check_expecting(p.expr, expected, target),
            _ => {
                let info = self.infer(expr)?;
                if info.ty == *expected {
                    return Ok(info);
                }
                if assignable(&info.ty, expected) {
                    self.builder
                        .convert(expected)
                        .map_err(|e| from_build(e, expr.span(), target))?;
                    return Ok(ExprInfo::rvalue(expected.clone()));
                }
                Err(CompileError::new(
                    ErrorKind::TypeMismatch {
                        target: target.to_string(),
                        have: info.ty.to_string(),
                        want: expected.to_string(),
                    },
                    expr.span(),
                ))
            }
        }
    }

    fn compile_lit(&mut self, lit: &LitExpr<'_>) -> Result<ExprInfo> {
        let value = match lit.kind {
            LitKind::Int(v) => Value::Int(v),
            LitKind::Float(v) => Value::Float(v),
            LitKind::Bool(v) => Value::Bool(v),
            LitKind::Str(s) => Value::str(s),
            LitKind::Nil => Value::Nil,
        };
        let ty = value.type_of();
        self.builder.push_const(value);
        Ok(ExprInfo::rvalue(ty))
    }

    fn compile_ident(&mut self, ident: &IdentExpr<'_>) -> Result<ExprInfo> {
        let span = ident.span;
        let resolution = resolver::resolve_name(self.ctx, ident.ident.name, span)?;
        self.emit_resolution(resolution, span)
    }

    /// Emit the code for a resolved name and return its type.
    pub(crate) fn emit_resolution(
        &mut self,
        resolution: Resolution,
        span: Span,
    ) -> Result<ExprInfo> {
        match resolution {
            Resolution::Local { name, ty } => {
                self.ctx.record_symbol(span, &name);
                self.builder.load_local(&name, ty.clone());
                Ok(ExprInfo::rvalue(ty))
            }
            Resolution::ReceiverField {
                binding,
                recv_ty,
                field,
                ..
            } => {
                self.ctx.record_symbol(span, &field);
                self.builder.load_local(&binding, recv_ty);
                let ty = self
                    .builder
                    .member(&field)
                    .map_err(|e| from_build(e, span, "receiver field"))?;
                Ok(ExprInfo::rvalue(ty))
            }
            Resolution::ReceiverMethods {
                binding,
                recv_ty,
                name,
                sigs,
            } => {
                self.ctx.record_symbol(span, &name);
                self.builder.load_local(&binding, recv_ty);
                let ty = Type::Func(sigs[0].clone());
                self.builder
                    .bind_member(&name, ty.clone())
                    .map_err(|e| from_build(e, span, "receiver method"))?;
                Ok(ExprInfo::rvalue(ty))
            }
            Resolution::ReceiverChild { binding, name } => {
                self.ctx.record_symbol(span, &name);
                let binding_ty = self
                    .ctx
                    .scope
                    .get(&binding)
                    .map(|b| b.ty.clone())
                    .unwrap_or(Type::Node);
                self.builder.load_local(&binding, binding_ty);
                self.builder
                    .member("ChildByName")
                    .map_err(|e| from_build(e, span, "child selection"))?;
                self.builder.push_const(Value::str(&name));
                let ty = self
                    .builder
                    .call(1, false)
                    .map_err(|e| from_build(e, span, "child selection"))?;
                Ok(ExprInfo::rvalue(ty))
            }
            Resolution::Global { qualified, symbol } => {
                self.ctx.record_symbol(span, &qualified);
                self.emit_symbol(&qualified, &symbol)
            }
            Resolution::Builtin { symbol } => {
                self.ctx.record_symbol(span, &symbol.name);
                let name = symbol.name.clone();
                self.emit_symbol(&name, &symbol)
            }
        }
    }

    fn emit_symbol(&mut self, qualified: &str, symbol: &Symbol) -> Result<ExprInfo> {
        match &symbol.kind {
            SymbolKind::Var(ty) => {
                self.builder.load_global(qualified, ty.clone());
                Ok(ExprInfo::rvalue(ty.clone()))
            }
            SymbolKind::Func(sigs) => {
                let ty = Type::Func(sigs[0].clone());
                self.builder.load_global(qualified, ty.clone());
                Ok(ExprInfo::rvalue(ty))
            }
            SymbolKind::Type(ty) => {
                self.builder.push_type(ty.clone());
                Ok(ExprInfo::rvalue(Type::TypeValue(ty.clone().into())))
            }
        }
    }

    fn compile_unary(&mut self, un: &UnaryExpr<'_>) -> Result<ExprInfo> {
        self.infer(un.operand)?;
        let op = match un.op {
            UnOp::Neg => UnaryOp::Neg,
            UnOp::Not => UnaryOp::Not,
        };
        let ty = self
            .builder
            .unary(op)
            .map_err(|e| from_build(e, un.span, "unary expression"))?;
        Ok(ExprInfo::rvalue(ty))
    }

    fn compile_binary(&mut self, bin: &BinaryExpr<'_>) -> Result<ExprInfo> {
        self.infer(bin.left)?;
        self.infer(bin.right)?;
        let ty = self
            .builder
            .binary(binary_op(bin.op))
            .map_err(|e| from_build(e, bin.span, "binary expression"))?;
        Ok(ExprInfo::rvalue(ty))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn ctx(&self) -> &Context<'env> {
        self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut Context<'env> {
        self.ctx
    }

    pub fn builder(&mut self) -> &mut dyn CodeBuilder {
        self.builder
    }
}

/// Map a surface binary operator onto the builder's.
fn binary_op(op: BinOp) -> BinaryOp {
    match op {
        BinOp::Add => BinaryOp::Add,
        BinOp::Sub => BinaryOp::Sub,
        BinOp::Mul => BinaryOp::Mul,
        BinOp::Div => BinaryOp::Div,
        BinOp::Eq => BinaryOp::Eq,
        BinOp::Ne => BinaryOp::Ne,
        BinOp::Lt => BinaryOp::Lt,
        BinOp::Le => BinaryOp::Le,
        BinOp::Gt => BinaryOp::Gt,
        BinOp::Ge => BinaryOp::Ge,
        BinOp::And => BinaryOp::And,
        BinOp::Or => BinaryOp::Or,
    }
}

/// Translate a builder failure into a positioned compile error.
pub(crate) fn from_build(err: BuildError, span: Span, target: &str) -> CompileError {
    let kind = match err {
        BuildError::UnknownMember { name, on } => ErrorKind::UnresolvedMember { target: on, name },
        BuildError::TypeMismatch { expected, found } => ErrorKind::TypeMismatch {
            target: target.to_string(),
            have: found,
            want: expected,
        },
        BuildError::Arity { have, want } => ErrorKind::ArityMismatch {
            target: target.to_string(),
            have: vec![have.to_string()],
            want: vec![want.to_string()],
        },
        BuildError::NotCallable { ty } => ErrorKind::NotCallable { type_name: ty },
        BuildError::Uninferable { name } => ErrorKind::UninferableTypeParam { name },
        BuildError::StackUnderflow => ErrorKind::Internal {
            message: "value stack underflow".to_string(),
        },
        BuildError::InvalidOp { message } => ErrorKind::Internal { message },
    };
    CompileError::new(kind, span)
}

/// Resolve surface type syntax into a semantic type.
pub(crate) fn resolve_type_expr(ctx: &Context<'_>, te: &TypeExpr<'_>) -> Result<Type> {
    match te {
        TypeExpr::Name(ident) => resolve_type_name(ctx, ident.name, ident.span),
        TypeExpr::Pointer(inner, _) => Ok(Type::pointer(resolve_type_expr(ctx, inner)?)),
        TypeExpr::Slice(elem, _) => Ok(Type::slice(resolve_type_expr(ctx, elem)?)),
        TypeExpr::Array(len, elem, _) => Ok(Type::array(*len, resolve_type_expr(ctx, elem)?)),
        TypeExpr::Map(key, value, _) => Ok(Type::map(
            resolve_type_expr(ctx, key)?,
            resolve_type_expr(ctx, value)?,
        )),
    }
}

fn resolve_type_name(ctx: &Context<'_>, name: &str, span: Span) -> Result<Type> {
    match name {
        "int" => return Ok(Type::Int),
        "float" => return Ok(Type::Float),
        "bool" => return Ok(Type::Bool),
        "string" => return Ok(Type::Str),
        "any" => return Ok(Type::Any),
        "error" => return Ok(Type::Error),
        "Node" => return Ok(Type::Node),
        "NodeSet" => return Ok(Type::NodeSet),
        _ => {}
    }
    let env = ctx.env();
    if let Some(Symbol {
        kind: SymbolKind::Type(ty),
        ..
    }) = env.current().get(name)
    {
        return Ok(ty.clone());
    }
    let mut found: Option<(&str, &Type)> = None;
    for package in env.wildcard_packages() {
        if let Some(Symbol {
            kind: SymbolKind::Type(ty),
            ..
        }) = package.get(name)
        {
            if let Some((first, _)) = found {
                return Err(CompileError::new(
                    ErrorKind::AmbiguousImport {
                        name: name.to_string(),
                        first: first.to_string(),
                        second: package.path.clone(),
                    },
                    span,
                ));
            }
            found = Some((package.path.as_str(), ty));
        }
    }
    if let Some((_, ty)) = found {
        return Ok(ty.clone());
    }
    if let Some(Symbol {
        kind: SymbolKind::Type(ty),
        ..
    }) = env.builtin(name)
    {
        return Ok(ty.clone());
    }
    Err(CompileError::new(
        ErrorKind::UnresolvedIdent {
            name: name.to_string(),
        },
        span,
    ))
}

/// Render a receiver expression for `undefined: x.name` diagnostics.
pub(crate) fn describe_expr(expr: &Expr<'_>, fallback: &Type) -> String {
    match expr {
        Expr::Ident(ident) => ident.ident.name.to_string(),
        Expr::Paren(p) => describe_expr(p.expr, fallback),
        _ => fallback.to_string(),
    }
}
