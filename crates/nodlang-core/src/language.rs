//! The language: type table, native functions and operators.
//!
//! A [`Language`] is built once (see [`Language::standard`]) and then shared
//! read-only, usually behind an `Arc`, by the graph, parser and compiler.
//! Overloads are resolved exact-first: a signature whose argument types are
//! identical wins over one that is only implicitly compatible, and among
//! equals the first registered wins.

use std::fmt;

use tracing::trace;

use crate::error::EvalError;
use crate::id::InvokableId;
use crate::signature::{Arity, OperatorInfo, Signature};
use crate::type_id::{TypeId, TypeRegistry};
use crate::variant::Variant;

/// Native implementation of a function or operator.
///
/// Arguments arrive already coerced to the signature's argument kinds.
/// Arguments declared with a reference type may be written through; the
/// caller stores them back into their source slots.
pub type NativeFn = fn(&mut [Variant]) -> Result<Variant, EvalError>;

/// A callable entry: signature plus native implementation.
#[derive(Clone)]
pub struct Invokable {
    pub signature: Signature,
    pub func: NativeFn,
}

impl fmt::Debug for Invokable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invokable")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Type keywords recognized in declarations.
const TYPE_KEYWORDS: [(&str, TypeId); 5] = [
    ("bool", TypeId::BOOL),
    ("int", TypeId::INT),
    ("double", TypeId::DOUBLE),
    ("string", TypeId::STRING),
    ("any", TypeId::ANY),
];

/// Registry of everything the parser can resolve by name.
#[derive(Debug, Clone)]
pub struct Language {
    types: TypeRegistry,
    invokables: Vec<Invokable>,
}

impl Language {
    /// A language with the built-in types and no functions.
    pub fn new() -> Self {
        Language {
            types: TypeRegistry::new(),
            invokables: Vec::new(),
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Mutable access for registration. Only available while the language is
    /// still uniquely owned.
    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Registers a native function or operator.
    pub fn register(&mut self, signature: Signature, func: NativeFn) -> InvokableId {
        let id = InvokableId(self.invokables.len() as u32);
        self.invokables.push(Invokable { signature, func });
        id
    }

    pub fn invokable(&self, id: InvokableId) -> Option<&Invokable> {
        self.invokables.get(id.0 as usize)
    }

    pub fn invokables(&self) -> impl Iterator<Item = (InvokableId, &Invokable)> {
        self.invokables
            .iter()
            .enumerate()
            .map(|(i, inv)| (InvokableId(i as u32), inv))
    }

    /// Operator metadata for `identifier`, if any operator of that arity
    /// exists. Overloads share precedence, so the first one answers.
    pub fn find_operator(&self, identifier: &str, arity: Arity) -> Option<OperatorInfo> {
        self.invokables
            .iter()
            .filter_map(|inv| {
                let op = inv.signature.operator?;
                (inv.signature.identifier == identifier && op.arity == arity).then_some(op)
            })
            .next()
    }

    /// Resolves an overload for `identifier` called with `arg_types`.
    pub fn find_invokable(&self, identifier: &str, arg_types: &[TypeId]) -> Option<InvokableId> {
        let exact = self
            .invokables()
            .find(|(_, inv)| inv.signature.is_exactly(identifier, arg_types, &self.types));
        if let Some((id, _)) = exact {
            trace!(identifier, %id, "exact overload");
            return Some(id);
        }
        let compatible = self
            .invokables()
            .find(|(_, inv)| inv.signature.is_compatible(identifier, arg_types, &self.types));
        if let Some((id, _)) = compatible {
            trace!(identifier, %id, "compatible overload");
        }
        compatible.map(|(id, _)| id)
    }

    /// Returns `true` if any function or operator is named `identifier`.
    pub fn has_identifier(&self, identifier: &str) -> bool {
        self.invokables
            .iter()
            .any(|inv| inv.signature.identifier == identifier)
    }

    /// Maps a declaration keyword (`int`, `double`, ...) to its type.
    pub fn type_from_keyword(&self, keyword: &str) -> Option<TypeId> {
        TYPE_KEYWORDS
            .iter()
            .find(|(k, _)| *k == keyword)
            .map(|(_, ty)| *ty)
    }

    /// The keyword spelling of a type, used when synthesizing source text.
    pub fn keyword_of(&self, ty: TypeId) -> Option<&'static str> {
        let base = self.types.strip(ty);
        TYPE_KEYWORDS.iter().find(|(_, t)| *t == base).map(|(k, _)| *k)
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Associativity;

    fn first(args: &mut [Variant]) -> Result<Variant, EvalError> {
        Ok(args[0].clone())
    }

    fn language() -> Language {
        let mut lang = Language::new();
        lang.register(
            Signature::new("+", TypeId::INT)
                .arg(TypeId::INT, "lhs")
                .arg(TypeId::INT, "rhs")
                .operator(10, Associativity::Left),
            first,
        );
        lang.register(
            Signature::new("+", TypeId::DOUBLE)
                .arg(TypeId::DOUBLE, "lhs")
                .arg(TypeId::DOUBLE, "rhs")
                .operator(10, Associativity::Left),
            first,
        );
        lang.register(
            Signature::new("-", TypeId::DOUBLE)
                .arg(TypeId::DOUBLE, "value")
                .operator(30, Associativity::Right),
            first,
        );
        lang
    }

    #[test]
    fn exact_overload_wins() {
        let lang = language();
        assert_eq!(
            lang.find_invokable("+", &[TypeId::DOUBLE, TypeId::DOUBLE]),
            Some(InvokableId(1))
        );
        assert_eq!(lang.find_invokable("+", &[TypeId::INT, TypeId::INT]), Some(InvokableId(0)));
    }

    #[test]
    fn compatible_overload_falls_back_to_first() {
        let lang = language();
        assert_eq!(lang.find_invokable("+", &[TypeId::INT, TypeId::DOUBLE]), Some(InvokableId(0)));
        assert_eq!(lang.find_invokable("+", &[TypeId::STRING, TypeId::INT]), None);
    }

    #[test]
    fn operator_lookup_respects_arity() {
        let lang = language();
        assert_eq!(lang.find_operator("+", Arity::Binary).map(|op| op.precedence), Some(10));
        assert!(lang.find_operator("+", Arity::Unary).is_none());
        assert_eq!(lang.find_operator("-", Arity::Unary).map(|op| op.precedence), Some(30));
    }

    #[test]
    fn type_keywords() {
        let lang = Language::new();
        assert_eq!(lang.type_from_keyword("double"), Some(TypeId::DOUBLE));
        assert_eq!(lang.type_from_keyword("float"), None);
        assert_eq!(lang.keyword_of(TypeId::STRING), Some("string"));
    }
}
