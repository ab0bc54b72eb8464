//! Expression AST nodes.
//!
//! Nodes borrow from the parser's arena (`'ast`). The compiler never
//! mutates them; it reads kind, span and children only.
//!
//! The surface language layers several forms onto ordinary expressions:
//! - calls with optional keyword arguments and a trailing spread marker
//! - member access doubling as the tree-query selector sublanguage
//!   (`x.name`, `x."name"`, `x.*`, `x.**.name`, `x.$attr`, conditional
//!   selection with a predicate)
//! - lambda literals with expression-list or block bodies
//! - composite literals with optional type elision
//! - the error-wrap operators `!`, `?` and `?:default`

use arbor_core::Span;

/// An expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr<'ast> {
    /// Literal value
    Lit(LitExpr<'ast>),
    /// Identifier reference
    Ident(IdentExpr<'ast>),
    /// Unary prefix operation
    Unary(&'ast UnaryExpr<'ast>),
    /// Binary operation
    Binary(&'ast BinaryExpr<'ast>),
    /// Call with optional keyword arguments and spread marker
    Call(&'ast CallExpr<'ast>),
    /// Member access or query-selector step
    Member(&'ast MemberExpr<'ast>),
    /// Lambda literal
    Lambda(&'ast LambdaExpr<'ast>),
    /// Composite literal (struct, slice, array, map)
    Composite(&'ast CompositeExpr<'ast>),
    /// Error-wrap operator applied to a call
    ErrWrap(&'ast ErrWrapExpr<'ast>),
    /// Parenthesized expression
    Paren(&'ast ParenExpr<'ast>),
    /// A type used in expression position (generic type arguments)
    TypeRef(&'ast TypeExpr<'ast>),
}

impl<'ast> Expr<'ast> {
    /// Get the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Self::Lit(e) => e.span,
            Self::Ident(e) => e.span,
            Self::Unary(e) => e.span,
            Self::Binary(e) => e.span,
            Self::Call(e) => e.span,
            Self::Member(e) => e.span,
            Self::Lambda(e) => e.span,
            Self::Composite(e) => e.span,
            Self::ErrWrap(e) => e.span,
            Self::Paren(e) => e.span,
            Self::TypeRef(t) => t.span(),
        }
    }
}

/// An identifier with its position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ident<'ast> {
    pub name: &'ast str,
    pub span: Span,
}

impl<'ast> Ident<'ast> {
    pub fn new(name: &'ast str, span: Span) -> Self {
        Self { name, span }
    }
}

/// A literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LitExpr<'ast> {
    pub kind: LitKind<'ast>,
    pub span: Span,
}

/// The kind of literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LitKind<'ast> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(&'ast str),
    Nil,
}

/// An identifier expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentExpr<'ast> {
    pub ident: Ident<'ast>,
    pub span: Span,
}

/// A unary prefix operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnaryExpr<'ast> {
    pub op: UnOp,
    pub operand: &'ast Expr<'ast>,
    pub span: Span,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// A binary operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryExpr<'ast> {
    pub left: &'ast Expr<'ast>,
    pub op: BinOp,
    pub right: &'ast Expr<'ast>,
    pub span: Span,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A call expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallExpr<'ast> {
    /// The callee (any expression).
    pub callee: &'ast Expr<'ast>,
    /// Arguments; keyword arguments carry a name and must trail the
    /// positional ones.
    pub args: &'ast [Argument<'ast>],
    /// Trailing spread marker: the last argument supplies the variadic
    /// parameter pre-aggregated.
    pub spread: bool,
    pub span: Span,
}

/// A call argument, optionally keyword-named.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Argument<'ast> {
    pub name: Option<Ident<'ast>>,
    pub value: &'ast Expr<'ast>,
    pub span: Span,
}

/// Member access, covering both ordinary members and selector steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberExpr<'ast> {
    pub target: &'ast Expr<'ast>,
    pub access: MemberAccess<'ast>,
    pub span: Span,
}

/// What follows the dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemberAccess<'ast> {
    /// `x.name` - plain member lookup first, child selection second.
    Name(Ident<'ast>),
    /// `x."name"` - quoted child selection; `raw` keeps the quotes.
    Quoted { raw: &'ast str, span: Span },
    /// `x.*` - all children.
    Wildcard,
    /// `x.**.name` / `x.**."name"` / `x.**.*` - descendant selection.
    Descendant(DescendantFilter<'ast>),
    /// `x.$attr` / `x.$"attr"` - attribute access.
    Attribute { raw: &'ast str, quoted: bool, span: Span },
    /// Conditional selection with an inline predicate.
    Select(&'ast Expr<'ast>),
}

/// The name filter of a descendant step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescendantFilter<'ast> {
    /// `x.**.*` - every descendant.
    Any,
    /// `x.**.name`
    Named(Ident<'ast>),
    /// `x.**."name"` - `raw` keeps the quotes.
    Quoted { raw: &'ast str, span: Span },
}

/// A lambda literal.
///
/// Parameters are names only; their types always come from the
/// expected function type at the use site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambdaExpr<'ast> {
    pub params: &'ast [Ident<'ast>],
    pub body: LambdaBody<'ast>,
    pub span: Span,
}

/// A lambda body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LambdaBody<'ast> {
    /// `=> e1, e2` - each trailing expression is one return value.
    Exprs(&'ast [&'ast Expr<'ast>]),
    /// `=> { ... }` - an ordinary function body.
    Block(&'ast Block<'ast>),
}

/// A statement block (lambda bodies).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block<'ast> {
    pub stmts: &'ast [Stmt<'ast>],
    pub span: Span,
}

/// A statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stmt<'ast> {
    /// An expression evaluated for effect.
    Expr(&'ast Expr<'ast>),
    /// A local binding.
    Var {
        name: Ident<'ast>,
        value: &'ast Expr<'ast>,
        span: Span,
    },
    /// Return from the enclosing function body.
    Return {
        values: &'ast [&'ast Expr<'ast>],
        span: Span,
    },
}

impl Stmt<'_> {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(e) => e.span(),
            Stmt::Var { span, .. } | Stmt::Return { span, .. } => *span,
        }
    }
}

/// A composite literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeExpr<'ast> {
    /// Explicit type annotation; `None` elides the type against the
    /// expected type at the use site.
    pub ty: Option<&'ast TypeExpr<'ast>>,
    pub elems: &'ast [CompositeElem<'ast>],
    pub span: Span,
}

/// One element of a composite literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeElem<'ast> {
    pub key: Option<CompositeKey<'ast>>,
    pub value: &'ast Expr<'ast>,
    pub span: Span,
}

/// A composite literal key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompositeKey<'ast> {
    /// A field name (struct literals).
    Name(Ident<'ast>),
    /// An index or map-key expression.
    Expr(&'ast Expr<'ast>),
}

/// The error-wrap operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrWrapOp {
    /// `expr!` - panic with the wrapped error.
    Panic,
    /// `expr?` - return the wrapped error from the enclosing unit.
    Propagate,
    /// `expr?:default` - evaluate the default instead.
    Default,
}

impl ErrWrapOp {
    /// Surface spelling, for diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            ErrWrapOp::Panic => "!",
            ErrWrapOp::Propagate => "?",
            ErrWrapOp::Default => "?:",
        }
    }
}

/// An error-wrap expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrWrapExpr<'ast> {
    pub op: ErrWrapOp,
    /// The wrapped call.
    pub call: &'ast Expr<'ast>,
    /// The default expression of `?:`.
    pub default: Option<&'ast Expr<'ast>>,
    /// Source text of the wrapped call, recorded into the error
    /// annotation.
    pub text: &'ast str,
    pub span: Span,
}

/// A parenthesized expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParenExpr<'ast> {
    pub expr: &'ast Expr<'ast>,
    pub span: Span,
}

/// Surface type syntax.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeExpr<'ast> {
    /// A named type, resolved through the symbol tables.
    Name(Ident<'ast>),
    Pointer(&'ast TypeExpr<'ast>, Span),
    Slice(&'ast TypeExpr<'ast>, Span),
    Array(u64, &'ast TypeExpr<'ast>, Span),
    Map(&'ast TypeExpr<'ast>, &'ast TypeExpr<'ast>, Span),
}

impl TypeExpr<'_> {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Name(ident) => ident.span,
            TypeExpr::Pointer(_, span)
            | TypeExpr::Slice(_, span)
            | TypeExpr::Array(_, _, span)
            | TypeExpr::Map(_, _, span) => *span,
        }
    }
}
