//! Bare-name resolution.
//!
//! A name resolves against, in order: the lexical scope chain, the
//! implicit receiver's members (when a receiver binding is in effect),
//! the current package's symbols, wildcard-imported packages (with
//! conflict detection across imports), and the builtin namespace. A
//! final alias fallback lets a lower-case name resolve to an
//! equally-named, capitalized, function-valued symbol.

use std::rc::Rc;

use arbor_core::{CompileError, ErrorKind, Signature, Span, Symbol, Type};

use crate::context::Context;

type Result<T> = std::result::Result<T, CompileError>;

/// What a bare name turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A binding in the lexical scope chain.
    Local { name: String, ty: Type },
    /// A field of the implicit receiver.
    ReceiverField {
        binding: String,
        recv_ty: Type,
        field: String,
        ty: Type,
    },
    /// A method set of the implicit receiver.
    ReceiverMethods {
        binding: String,
        recv_ty: Type,
        name: String,
        sigs: Vec<Rc<Signature>>,
    },
    /// Child-by-name selection on a query-typed implicit subject.
    ReceiverChild { binding: String, name: String },
    /// A package-level symbol, with its qualified name.
    Global { qualified: String, symbol: Symbol },
    /// A symbol of the builtin namespace.
    Builtin { symbol: Symbol },
}

/// Resolve a bare name in value position.
pub fn resolve_name(ctx: &Context<'_>, name: &str, span: Span) -> Result<Resolution> {
    resolve_name_with(ctx, name, span, false)
}

/// Resolve a bare name in callee position: child-by-name selection is
/// skipped, since a selected child is never callable.
pub fn resolve_callee(ctx: &Context<'_>, name: &str, span: Span) -> Result<Resolution> {
    resolve_name_with(ctx, name, span, true)
}

fn resolve_name_with(
    ctx: &Context<'_>,
    name: &str,
    span: Span,
    skip_node_child: bool,
) -> Result<Resolution> {
    // Lexical scope chain.
    if let Some(binding) = ctx.scope.get(name) {
        return Ok(Resolution::Local {
            name: binding.name.clone(),
            ty: binding.ty.clone(),
        });
    }

    // Implicit receiver members.
    if let Some(recv) = ctx.receiver()
        && let Some(resolution) = resolve_receiver_member(recv, name, skip_node_child)
    {
        return Ok(resolution);
    }

    // Current package symbols.
    let env = ctx.env();
    if let Some(symbol) = env.current().get(name) {
        return Ok(Resolution::Global {
            qualified: format!("{}.{}", env.current_package, name),
            symbol: symbol.clone(),
        });
    }

    // Wildcard-imported packages, with conflict detection.
    if let Some(resolution) = resolve_wildcard(ctx, name, span, |_| true)? {
        return Ok(resolution);
    }

    // Builtin namespace.
    if let Some(symbol) = env.builtin(name) {
        return Ok(Resolution::Builtin {
            symbol: symbol.clone(),
        });
    }

    // Alias fallback: a lower-case name resolving to a capitalized,
    // function-valued symbol of the same spelling.
    let capitalized = capitalize(name);
    if capitalized != name {
        if let Some(symbol) = env.current().get(&capitalized)
            && symbol.is_func()
        {
            return Ok(Resolution::Global {
                qualified: format!("{}.{}", env.current_package, capitalized),
                symbol: symbol.clone(),
            });
        }
        if let Some(resolution) = resolve_wildcard(ctx, &capitalized, span, Symbol::is_func)? {
            return Ok(resolution);
        }
        if let Some(symbol) = env.builtin(&capitalized)
            && symbol.is_func()
        {
            return Ok(Resolution::Builtin {
                symbol: symbol.clone(),
            });
        }
    }

    Err(CompileError::new(
        ErrorKind::UnresolvedIdent {
            name: name.to_string(),
        },
        span,
    ))
}

fn resolve_receiver_member(
    recv: &crate::context::Receiver,
    name: &str,
    skip_node_child: bool,
) -> Option<Resolution> {
    if let Some(def) = recv.ty.struct_def() {
        let candidates = [name.to_string(), capitalize(name)];
        for member in &candidates {
            if let Some((_, field)) = def.field(member) {
                return Some(Resolution::ReceiverField {
                    binding: recv.binding.clone(),
                    recv_ty: recv.ty.clone(),
                    field: member.clone(),
                    ty: field.ty.clone(),
                });
            }
            let methods = def.methods_named(member);
            if !methods.is_empty() {
                return Some(Resolution::ReceiverMethods {
                    binding: recv.binding.clone(),
                    recv_ty: recv.ty.clone(),
                    name: member.clone(),
                    sigs: methods.iter().map(|m| Rc::clone(&m.sig)).collect(),
                });
            }
        }
        return None;
    }
    if matches!(recv.ty, Type::Node | Type::NodeSet) && !skip_node_child {
        return Some(Resolution::ReceiverChild {
            binding: recv.binding.clone(),
            name: name.to_string(),
        });
    }
    None
}

/// Look a name up across every wildcard-imported package. Two hits from
/// different imports are an ambiguity, whatever the symbol kinds.
fn resolve_wildcard(
    ctx: &Context<'_>,
    name: &str,
    span: Span,
    accept: impl Fn(&Symbol) -> bool,
) -> Result<Option<Resolution>> {
    let mut found: Option<(String, Symbol)> = None;
    for package in ctx.env().wildcard_packages() {
        let Some(symbol) = package.get(name) else {
            continue;
        };
        if !accept(symbol) {
            continue;
        }
        if let Some((first_path, _)) = &found {
            return Err(CompileError::new(
                ErrorKind::AmbiguousImport {
                    name: name.to_string(),
                    first: first_path.clone(),
                    second: package.path.clone(),
                },
                span,
            ));
        }
        found = Some((package.path.clone(), symbol.clone()));
    }
    Ok(found.map(|(path, symbol)| Resolution::Global {
        qualified: format!("{path}.{name}"),
        symbol,
    }))
}

/// Capitalize the first character.
pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
