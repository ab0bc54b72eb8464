//! The semantic type model.
//!
//! Types here describe values of the *target* base language as the
//! compiler sees them: structs with exported fields and methods,
//! pointers, slices, arrays, maps, functions with multiple results,
//! plus the handful of special types the surface language's rewrites
//! depend on - `Any` (the empty interface), `Nil` (the untyped nil),
//! the query runtime's `Node`/`NodeSet`, the base `error` type,
//! type-valued expressions, and unresolved type parameters.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use xxhash_rust::xxh64::xxh64;

/// Stable identity of a named type, hashed from its qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u64);

impl TypeId {
    /// Hash a qualified name (`package.Name`) into an identity.
    pub fn from_name(name: &str) -> Self {
        Self(xxh64(name.as_bytes(), 0))
    }
}

/// A semantic type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// The unit / void type (no value).
    Unit,
    Bool,
    Int,
    Float,
    Str,
    /// A named struct type with fields and methods.
    Struct(Rc<StructDef>),
    Pointer(Rc<Type>),
    Slice(Rc<Type>),
    Array(u64, Rc<Type>),
    Map(Rc<Type>, Rc<Type>),
    Func(Rc<Signature>),
    /// Multiple values viewed as one (a call's result list).
    Tuple(Vec<Type>),
    /// The empty interface: holds any runtime value.
    Any,
    /// The type of the untyped `nil` constant.
    Nil,
    /// A single tree node of the query runtime.
    Node,
    /// A set of tree nodes of the query runtime.
    NodeSet,
    /// The base language's error type.
    Error,
    /// A type used as a value (positional type arguments).
    TypeValue(Rc<Type>),
    /// An unresolved type parameter of a generic signature.
    Param(String),
}

impl Type {
    pub fn pointer(inner: Type) -> Self {
        Type::Pointer(Rc::new(inner))
    }

    pub fn slice(elem: Type) -> Self {
        Type::Slice(Rc::new(elem))
    }

    pub fn array(len: u64, elem: Type) -> Self {
        Type::Array(len, Rc::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Rc::new(key), Rc::new(value))
    }

    pub fn func(sig: Signature) -> Self {
        Type::Func(Rc::new(sig))
    }

    /// Whether this type still mentions an unresolved type parameter.
    pub fn has_params(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::Pointer(t) | Type::Slice(t) | Type::Array(_, t) | Type::TypeValue(t) => {
                t.has_params()
            }
            Type::Map(k, v) => k.has_params() || v.has_params(),
            Type::Func(sig) => {
                sig.params.iter().any(Type::has_params) || sig.results.iter().any(Type::has_params)
            }
            Type::Tuple(ts) => ts.iter().any(Type::has_params),
            _ => false,
        }
    }

    /// The struct definition behind a struct or pointer-to-struct type.
    pub fn struct_def(&self) -> Option<&Rc<StructDef>> {
        match self {
            Type::Struct(def) => Some(def),
            Type::Pointer(inner) => match &**inner {
                Type::Struct(def) => Some(def),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether selector syntax applies to this receiver type.
    ///
    /// `Node` and `NodeSet` take selector steps directly; `Any` and map
    /// types are lifted into a `Node` first.
    pub fn is_queryable(&self) -> bool {
        matches!(self, Type::Node | Type::NodeSet | Type::Any | Type::Map(_, _))
    }

    /// Whether a receiver of this type must be lifted before a selector
    /// step can apply.
    pub fn needs_lift(&self) -> bool {
        matches!(self, Type::Any | Type::Map(_, _))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "()"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "string"),
            Type::Struct(def) => write!(f, "{}", def.name),
            Type::Pointer(t) => write!(f, "*{t}"),
            Type::Slice(t) => write!(f, "[]{t}"),
            Type::Array(n, t) => write!(f, "[{n}]{t}"),
            Type::Map(k, v) => write!(f, "map[{k}]{v}"),
            Type::Func(sig) => write!(f, "{sig}"),
            Type::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Type::Any => write!(f, "any"),
            Type::Nil => write!(f, "nil"),
            Type::Node => write!(f, "Node"),
            Type::NodeSet => write!(f, "NodeSet"),
            Type::Error => write!(f, "error"),
            Type::TypeValue(t) => write!(f, "type {t}"),
            Type::Param(name) => write!(f, "{name}"),
        }
    }
}

/// A struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// A method bound to a struct type.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub sig: Rc<Signature>,
}

/// A named struct type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    /// Path of the package declaring the type. Gates the
    /// capitalization fallback for literal keys: only literals compiled
    /// in the declaring package may address `x` as `X`.
    pub package: String,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub id: TypeId,
}

impl StructDef {
    pub fn new(package: &str, name: &str, fields: Vec<Field>) -> Self {
        Self {
            name: name.to_string(),
            package: package.to_string(),
            fields,
            methods: Vec::new(),
            id: TypeId::from_name(&format!("{package}.{name}")),
        }
    }

    pub fn with_method(mut self, name: &str, sig: Signature) -> Self {
        self.methods.push(Method {
            name: name.to_string(),
            sig: Rc::new(sig),
        });
        self
    }

    /// Find a field by exact name.
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// All methods with the given name, in declaration order.
    pub fn methods_named(&self, name: &str) -> Vec<&Method> {
        self.methods.iter().filter(|m| m.name == name).collect()
    }
}

bitflags! {
    /// Properties of a signature.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SigFlags: u8 {
        /// Trailing parameter absorbs excess arguments.
        const VARIADIC = 1;
        /// Signature mentions unresolved type parameters.
        const GENERIC = 1 << 1;
        /// Signature is receiver-bound.
        const METHOD = 1 << 2;
    }
}

/// A callable signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Parameter types in order. For variadic signatures the last
    /// entry is the slice type of the absorbing parameter.
    pub params: Vec<Type>,
    /// Result types in order.
    pub results: Vec<Type>,
    pub flags: SigFlags,
    /// Names of type parameters, in declaration order.
    pub type_params: Vec<String>,
    /// Arity offset contributed by a bound receiver.
    pub recv_offset: usize,
}

impl Signature {
    pub fn plain(params: Vec<Type>, results: Vec<Type>) -> Self {
        Self {
            params,
            results,
            flags: SigFlags::empty(),
            type_params: Vec::new(),
            recv_offset: 0,
        }
    }

    pub fn variadic(params: Vec<Type>, results: Vec<Type>) -> Self {
        Self {
            flags: SigFlags::VARIADIC,
            ..Self::plain(params, results)
        }
    }

    pub fn method(params: Vec<Type>, results: Vec<Type>) -> Self {
        Self {
            flags: SigFlags::METHOD,
            recv_offset: 1,
            ..Self::plain(params, results)
        }
    }

    pub fn generic(type_params: Vec<String>, params: Vec<Type>, results: Vec<Type>) -> Self {
        Self {
            flags: SigFlags::GENERIC,
            type_params,
            ..Self::plain(params, results)
        }
    }

    pub fn is_variadic(&self) -> bool {
        self.flags.contains(SigFlags::VARIADIC)
    }

    pub fn is_generic(&self) -> bool {
        self.flags.contains(SigFlags::GENERIC)
    }

    pub fn is_method(&self) -> bool {
        self.flags.contains(SigFlags::METHOD)
    }

    /// Whether the last declared result is the error type.
    pub fn returns_error(&self) -> bool {
        matches!(self.results.last(), Some(Type::Error))
    }

    /// The type a call against this signature leaves on the stack.
    pub fn result_type(&self) -> Type {
        match self.results.len() {
            0 => Type::Unit,
            1 => self.results[0].clone(),
            _ => Type::Tuple(self.results.clone()),
        }
    }

    /// Minimum number of call-site arguments.
    pub fn min_arity(&self) -> usize {
        if self.is_variadic() {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func(")?;
        let n = self.params.len();
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if self.is_variadic() && i + 1 == n {
                match p {
                    Type::Slice(elem) => write!(f, "...{elem}")?,
                    other => write!(f, "...{other}")?,
                }
            } else {
                write!(f, "{p}")?;
            }
        }
        write!(f, ")")?;
        match self.results.len() {
            0 => Ok(()),
            1 => write!(f, " {}", self.results[0]),
            _ => {
                write!(f, " (")?;
                for (i, r) in self.results.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{r}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// One link of an overload candidate chain.
///
/// A chain always holds at least one candidate; `next` owns the rest.
/// Declaration order is the chain order and is the tie-break for
/// ambiguous matches, so it is preserved end-to-end.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub sig: Rc<Signature>,
    pub next: Option<Box<Candidate>>,
}

impl Candidate {
    pub fn new(sig: Rc<Signature>) -> Self {
        Self { sig, next: None }
    }

    /// Build a chain from signatures in declaration order.
    pub fn from_signatures(sigs: &[Rc<Signature>]) -> Option<Candidate> {
        let mut chain: Option<Candidate> = None;
        for sig in sigs.iter().rev() {
            chain = Some(Candidate {
                sig: Rc::clone(sig),
                next: chain.map(Box::new),
            });
        }
        chain
    }

    /// Insert a candidate directly after this link.
    pub fn splice_after(&mut self, sig: Rc<Signature>) {
        let rest = self.next.take();
        self.next = Some(Box::new(Candidate { sig, next: rest }));
    }

    /// Number of candidates in the chain from this link on.
    pub fn len(&self) -> usize {
        let mut n = 1;
        let mut cur = self.next.as_deref();
        while let Some(c) = cur {
            n += 1;
            cur = c.next.as_deref();
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate the chain from this link on.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<Signature>> {
        std::iter::successors(Some(self), |c| c.next.as_deref()).map(|c| &c.sig)
    }
}

/// Whether a value of type `from` may be used where `to` is expected.
///
/// The base language is strict: no implicit numeric conversions. `Any`
/// absorbs every single value; `nil` matches every nilable type.
pub fn assignable(from: &Type, to: &Type) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (Type::Tuple(_), _) | (_, Type::Tuple(_)) => false,
        (Type::TypeValue(_), _) | (Type::Param(_), _) | (_, Type::Param(_)) => false,
        (_, Type::Any) => !matches!(from, Type::Unit),
        (Type::Nil, t) => matches!(
            t,
            Type::Pointer(_)
                | Type::Slice(_)
                | Type::Map(_, _)
                | Type::Func(_)
                | Type::Node
                | Type::NodeSet
                | Type::Error
        ),
        _ => false,
    }
}

/// Replace type parameters by their bindings, structurally.
pub fn substitute(ty: &Type, bindings: &rustc_hash::FxHashMap<String, Type>) -> Type {
    match ty {
        Type::Param(name) => bindings.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Pointer(t) => Type::pointer(substitute(t, bindings)),
        Type::Slice(t) => Type::slice(substitute(t, bindings)),
        Type::Array(n, t) => Type::array(*n, substitute(t, bindings)),
        Type::Map(k, v) => Type::map(substitute(k, bindings), substitute(v, bindings)),
        Type::Func(sig) => Type::Func(Rc::new(sig.instantiate(bindings))),
        Type::Tuple(ts) => Type::Tuple(ts.iter().map(|t| substitute(t, bindings)).collect()),
        Type::TypeValue(t) => Type::TypeValue(Rc::new(substitute(t, bindings))),
        other => other.clone(),
    }
}

impl Signature {
    /// Substitute type parameters, producing a concrete signature.
    ///
    /// Parameters without a binding stay as `Param`; callers decide
    /// whether that is an inference failure.
    pub fn instantiate(&self, bindings: &rustc_hash::FxHashMap<String, Type>) -> Signature {
        let params = self.params.iter().map(|t| substitute(t, bindings)).collect();
        let results = self
            .results
            .iter()
            .map(|t| substitute(t, bindings))
            .collect();
        let mut out = Signature {
            params,
            results,
            flags: self.flags - SigFlags::GENERIC,
            type_params: Vec::new(),
            recv_offset: self.recv_offset,
        };
        let leftover: Vec<String> = self
            .type_params
            .iter()
            .filter(|p| !bindings.contains_key(*p))
            .cloned()
            .collect();
        if !leftover.is_empty() {
            out.flags |= SigFlags::GENERIC;
            out.type_params = leftover;
        }
        out
    }
}

/// Compile-time protocol of the query runtime.
///
/// `Node` and `NodeSet` values answer the same selector methods; the
/// runtime's semantics (out of scope here) are: `AnyDescendant("")`
/// enumerates every descendant including the receiver, and a non-empty
/// filter keeps only those whose name matches.
pub fn query_member(name: &str) -> Option<Signature> {
    match name {
        "ChildByName" => Some(Signature::method(vec![Type::Str], vec![Type::NodeSet])),
        "Children" => Some(Signature::method(vec![], vec![Type::NodeSet])),
        "AnyDescendant" => Some(Signature::method(vec![Type::Str], vec![Type::NodeSet])),
        "Attribute" => Some(Signature::method(vec![Type::Str], vec![Type::NodeSet])),
        // First-match enumeration: stops at the first element whose
        // callback yields a non-empty set.
        "Match" => Some(Signature::method(
            vec![Type::func(Signature::plain(
                vec![Type::Node],
                vec![Type::NodeSet, Type::Error],
            ))],
            vec![Type::NodeSet],
        )),
        // Wrap a single node into a one-element set.
        "One" => Some(Signature::method(vec![], vec![Type::NodeSet])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_def() -> StructDef {
        StructDef::new(
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
        )
    }

    #[test]
    fn display_composite_types() {
        let p = Type::Struct(Rc::new(point_def()));
        assert_eq!(Type::pointer(p.clone()).to_string(), "*Point");
        assert_eq!(Type::slice(Type::Int).to_string(), "[]int");
        assert_eq!(Type::array(4, Type::Float).to_string(), "[4]float");
        assert_eq!(Type::map(Type::Str, p).to_string(), "map[string]Point");
    }

    #[test]
    fn display_variadic_signature() {
        let sig = Signature::variadic(
            vec![Type::Str, Type::slice(Type::Int)],
            vec![Type::Int, Type::Error],
        );
        assert_eq!(sig.to_string(), "func(string, ...int) (int, error)");
    }

    #[test]
    fn chain_preserves_declaration_order() {
        let a = Rc::new(Signature::plain(vec![Type::Int], vec![]));
        let b = Rc::new(Signature::plain(vec![Type::Str], vec![]));
        let c = Rc::new(Signature::plain(vec![], vec![]));
        let chain = Candidate::from_signatures(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let order: Vec<_> = chain.iter().cloned().collect();
        assert_eq!(order, vec![a, b, c]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn splice_after_inserts_between() {
        let a = Rc::new(Signature::plain(vec![Type::Int], vec![]));
        let b = Rc::new(Signature::plain(vec![Type::Str], vec![]));
        let inst = Rc::new(Signature::plain(vec![Type::Bool], vec![]));
        let mut chain = Candidate::from_signatures(&[a.clone(), b.clone()]).unwrap();
        chain.splice_after(inst.clone());
        let order: Vec<_> = chain.iter().cloned().collect();
        assert_eq!(order, vec![a, inst, b]);
    }

    #[test]
    fn nil_assignable_to_nilable_types() {
        assert!(assignable(&Type::Nil, &Type::pointer(Type::Int)));
        assert!(assignable(&Type::Nil, &Type::Error));
        assert!(assignable(&Type::Nil, &Type::NodeSet));
        assert!(!assignable(&Type::Nil, &Type::Int));
        assert!(!assignable(&Type::Nil, &Type::Str));
    }

    #[test]
    fn any_absorbs_values_but_not_unit() {
        assert!(assignable(&Type::Int, &Type::Any));
        assert!(assignable(&Type::Node, &Type::Any));
        assert!(!assignable(&Type::Unit, &Type::Any));
    }

    #[test]
    fn no_implicit_numeric_conversion() {
        assert!(!assignable(&Type::Int, &Type::Float));
        assert!(!assignable(&Type::Float, &Type::Int));
    }

    #[test]
    fn has_params_looks_through_composites() {
        let t = Type::slice(Type::Param("T".to_string()));
        assert!(t.has_params());
        assert!(!Type::slice(Type::Int).has_params());
        let f = Type::func(Signature::plain(
            vec![Type::Param("T".to_string())],
            vec![Type::Bool],
        ));
        assert!(f.has_params());
    }

    #[test]
    fn query_protocol_shapes() {
        let child = query_member("ChildByName").unwrap();
        assert_eq!(child.params, vec![Type::Str]);
        assert_eq!(child.results, vec![Type::NodeSet]);
        assert!(child.is_method());

        let m = query_member("Match").unwrap();
        match &m.params[0] {
            Type::Func(sig) => {
                assert_eq!(sig.params, vec![Type::Node]);
                assert_eq!(sig.results, vec![Type::NodeSet, Type::Error]);
            }
            other => panic!("expected callback parameter, got {other}"),
        }
        assert!(query_member("Frobnicate").is_none());
    }

    #[test]
    fn struct_field_lookup_is_positional() {
        let def = point_def();
        let (idx, f) = def.field("Y").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(f.ty, Type::Int);
        assert!(def.field("Z").is_none());
    }

    #[test]
    fn type_id_is_stable_per_qualified_name() {
        let a = TypeId::from_name("geom.Point");
        let b = TypeId::from_name("geom.Point");
        let c = TypeId::from_name("other.Point");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
