//! Symbols, package tables and the import-layer product.
//!
//! The import resolver (out of scope) hands the compiler a [`ModuleEnv`]:
//! resolved package symbol tables keyed by package path, the current
//! package, the list of wildcard-imported packages, and the builtin
//! namespace. The compiler only ever reads it.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::types::{Signature, Type};

/// What a name denotes at package level.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    /// A package-level variable or constant.
    Var(Type),
    /// A function name: one or more signatures in declaration order.
    Func(Vec<Rc<Signature>>),
    /// A named type.
    Type(Type),
}

/// A package-level symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn var(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Var(ty),
        }
    }

    pub fn func(name: &str, sigs: Vec<Signature>) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Func(sigs.into_iter().map(Rc::new).collect()),
        }
    }

    pub fn type_name(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Type(ty),
        }
    }

    /// Whether this symbol is function-valued (the alias fallback only
    /// redirects to these).
    pub fn is_func(&self) -> bool {
        matches!(self.kind, SymbolKind::Func(_))
    }

    /// The type of this symbol when used as a value.
    pub fn value_type(&self) -> Option<Type> {
        match &self.kind {
            SymbolKind::Var(ty) => Some(ty.clone()),
            SymbolKind::Func(sigs) => sigs.first().map(|s| Type::Func(Rc::clone(s))),
            SymbolKind::Type(ty) => Some(Type::TypeValue(Rc::new(ty.clone()))),
        }
    }
}

/// A resolved package symbol table.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub path: String,
    symbols: FxHashMap<String, Symbol>,
}

impl Package {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            symbols: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name.clone(), symbol);
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }
}

/// Everything the import layer resolved for one module.
#[derive(Debug, Default)]
pub struct ModuleEnv {
    packages: FxHashMap<String, Package>,
    /// Path of the package being compiled.
    pub current_package: String,
    /// Wildcard-imported package paths, in import order. Used only for
    /// lookup and cross-import conflict detection.
    wildcard_imports: Vec<String>,
    builtins: FxHashMap<String, Symbol>,
}

impl ModuleEnv {
    pub fn new(current_package: &str) -> Self {
        let mut env = Self {
            current_package: current_package.to_string(),
            ..Self::default()
        };
        env.packages
            .insert(current_package.to_string(), Package::new(current_package));
        env
    }

    /// Register a resolved package table.
    pub fn add_package(&mut self, package: Package) {
        self.packages.insert(package.path.clone(), package);
    }

    /// Mark a registered package as wildcard-imported.
    pub fn import_wildcard(&mut self, path: &str) {
        self.wildcard_imports.push(path.to_string());
    }

    pub fn add_builtin(&mut self, symbol: Symbol) {
        self.builtins.insert(symbol.name.clone(), symbol);
    }

    /// Add a symbol to the current package's table.
    pub fn declare(&mut self, symbol: Symbol) {
        let current = self
            .packages
            .get_mut(&self.current_package)
            .expect("current package is always registered");
        current.insert(symbol);
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.packages.get(path)
    }

    /// The package being compiled.
    pub fn current(&self) -> &Package {
        &self.packages[&self.current_package]
    }

    /// Wildcard-imported packages, in import order.
    pub fn wildcard_packages(&self) -> impl Iterator<Item = &Package> {
        self.wildcard_imports
            .iter()
            .filter_map(|p| self.packages.get(p))
    }

    pub fn builtin(&self, name: &str) -> Option<&Symbol> {
        self.builtins.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_lands_in_current_package() {
        let mut env = ModuleEnv::new("main");
        env.declare(Symbol::var("x", Type::Int));
        assert!(env.current().get("x").is_some());
        assert!(env.package("main").unwrap().get("x").is_some());
    }

    #[test]
    fn wildcard_order_is_import_order() {
        let mut env = ModuleEnv::new("main");
        let mut a = Package::new("alpha");
        a.insert(Symbol::var("v", Type::Int));
        let mut b = Package::new("beta");
        b.insert(Symbol::var("v", Type::Str));
        env.add_package(a);
        env.add_package(b);
        env.import_wildcard("beta");
        env.import_wildcard("alpha");
        let order: Vec<_> = env.wildcard_packages().map(|p| p.path.clone()).collect();
        assert_eq!(order, vec!["beta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn func_symbol_value_type_is_first_signature() {
        let sym = Symbol::func(
            "atoi",
            vec![Signature::plain(vec![Type::Str], vec![Type::Int, Type::Error])],
        );
        assert!(sym.is_func());
        match sym.value_type() {
            Some(Type::Func(sig)) => assert_eq!(sig.params, vec![Type::Str]),
            other => panic!("expected function type, got {other:?}"),
        }
    }
}
