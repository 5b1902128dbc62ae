//! TypeId and TypeRegistry for the runtime type table.
//!
//! Every type has a unique [`TypeId`] providing O(1) identity comparison. The
//! [`TypeRegistry`] pre-registers the built-in value types on construction.
//! Qualified types (`int&`, `const string`, ...) are registered as their own
//! descriptors whose first parent is the unqualified base type, so "is-a"
//! queries and qualifier stripping both walk the same parent links.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::error::GraphError;
use crate::variant::ValueKind;

/// Unique identifier for a type in the type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Pre-registered TypeId constants for built-in types.
impl TypeId {
    pub const ANY: TypeId = TypeId(0);
    pub const VOID: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const DOUBLE: TypeId = TypeId(4);
    pub const STRING: TypeId = TypeId(5);
}

/// Const, pointer and reference qualifiers of a type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_pointer: bool,
    pub is_reference: bool,
}

impl Qualifiers {
    pub const NONE: Qualifiers = Qualifiers {
        is_const: false,
        is_pointer: false,
        is_reference: false,
    };

    pub const REFERENCE: Qualifiers = Qualifiers {
        is_const: false,
        is_pointer: false,
        is_reference: true,
    };

    pub const POINTER: Qualifiers = Qualifiers {
        is_const: false,
        is_pointer: true,
        is_reference: false,
    };

    pub fn is_empty(&self) -> bool {
        *self == Qualifiers::NONE
    }
}

/// A registered type: display name, qualifiers and "is-a" parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub name: String,
    pub qualifiers: Qualifiers,
    /// For a qualified type the first parent is always its unqualified base.
    pub parents: SmallVec<[TypeId; 2]>,
}

/// Registry of all runtime types.
///
/// On construction, the registry pre-registers the 6 built-in types:
/// - `TypeId(0)` = any
/// - `TypeId(1)` = void
/// - `TypeId(2)` = bool
/// - `TypeId(3)` = int
/// - `TypeId(4)` = double
/// - `TypeId(5)` = string
///
/// Types are never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRegistry {
    /// Types indexed by TypeId.0
    types: Vec<TypeDescriptor>,
    /// Display name lookup
    names: HashMap<String, TypeId>,
    /// (base, qualifiers) -> qualified type
    qualified: HashMap<(TypeId, QualifierKey), TypeId>,
}

type QualifierKey = (bool, bool, bool);

fn qualifier_key(q: Qualifiers) -> QualifierKey {
    (q.is_const, q.is_pointer, q.is_reference)
}

impl TypeRegistry {
    /// Number of built-in types pre-registered on construction.
    const BUILTIN_COUNT: u32 = 6;

    /// Creates a registry with the built-in types pre-registered.
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            types: Vec::new(),
            names: HashMap::new(),
            qualified: HashMap::new(),
        };
        for name in ["any", "void", "bool", "int", "double", "string"] {
            registry.push(name.to_string(), Qualifiers::NONE, SmallVec::new());
        }
        debug_assert_eq!(registry.types.len() as u32, Self::BUILTIN_COUNT);
        registry
    }

    fn push(&mut self, name: String, qualifiers: Qualifiers, parents: SmallVec<[TypeId; 2]>) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.names.insert(name.clone(), id);
        self.types.push(TypeDescriptor {
            id,
            name,
            qualifiers,
            parents,
        });
        id
    }

    /// Registers a new unqualified type deriving from `parents`.
    ///
    /// Returns [`GraphError::DuplicateTypeName`] if the name is taken.
    pub fn register_named(&mut self, name: &str, parents: &[TypeId]) -> Result<TypeId, GraphError> {
        if self.names.contains_key(name) {
            return Err(GraphError::DuplicateTypeName {
                name: name.to_string(),
            });
        }
        for parent in parents {
            if self.get(*parent).is_none() {
                return Err(GraphError::TypeNotFound { id: *parent });
            }
        }
        Ok(self.push(name.to_string(), Qualifiers::NONE, parents.iter().copied().collect()))
    }

    /// Returns the qualified variant of `base`, registering it on first use.
    ///
    /// Qualifiers already present on `base` are merged with `qualifiers`, so
    /// `qualify(int&, REFERENCE)` returns `int&` again.
    pub fn qualify(&mut self, base: TypeId, qualifiers: Qualifiers) -> Result<TypeId, GraphError> {
        let base_desc = self.get(base).ok_or(GraphError::TypeNotFound { id: base })?;
        let merged = Qualifiers {
            is_const: base_desc.qualifiers.is_const || qualifiers.is_const,
            is_pointer: base_desc.qualifiers.is_pointer || qualifiers.is_pointer,
            is_reference: base_desc.qualifiers.is_reference || qualifiers.is_reference,
        };
        let root = self.strip(base);
        if merged.is_empty() {
            return Ok(root);
        }
        let key = (root, qualifier_key(merged));
        if let Some(id) = self.qualified.get(&key) {
            return Ok(*id);
        }

        let root_name = self.name(root).to_string();
        let mut name = String::new();
        if merged.is_const {
            name.push_str("const ");
        }
        name.push_str(&root_name);
        if merged.is_pointer {
            name.push('*');
        }
        if merged.is_reference {
            name.push('&');
        }
        let id = self.push(name, merged, smallvec![root]);
        self.qualified.insert(key, id);
        Ok(id)
    }

    /// Shorthand for `qualify(base, Qualifiers::REFERENCE)`.
    pub fn reference_to(&mut self, base: TypeId) -> Result<TypeId, GraphError> {
        self.qualify(base, Qualifiers::REFERENCE)
    }

    /// Looks up a type by its [`TypeId`].
    pub fn get(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.types.get(id.0 as usize)
    }

    /// Looks up a type by display name (`"int"`, `"double&"`, ...).
    pub fn get_by_name(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    /// Display name of a type, `"?"` for unknown ids.
    pub fn name(&self, id: TypeId) -> &str {
        self.get(id).map_or("?", |desc| desc.name.as_str())
    }

    pub fn qualifiers(&self, id: TypeId) -> Qualifiers {
        self.get(id).map_or(Qualifiers::NONE, |desc| desc.qualifiers)
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        self.qualifiers(id).is_reference
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        self.qualifiers(id).is_pointer
    }

    /// Removes every qualifier, returning the unqualified base type.
    pub fn strip(&self, id: TypeId) -> TypeId {
        let mut current = id;
        while let Some(desc) = self.get(current) {
            if desc.qualifiers.is_empty() {
                break;
            }
            match desc.parents.first() {
                Some(base) => current = *base,
                None => break,
            }
        }
        current
    }

    /// Returns `true` if `id` is `parent` or derives from it.
    pub fn is_a(&self, id: TypeId, parent: TypeId) -> bool {
        if id == parent {
            return true;
        }
        let mut stack: SmallVec<[TypeId; 4]> = smallvec![id];
        while let Some(current) = stack.pop() {
            if let Some(desc) = self.get(current) {
                for p in &desc.parents {
                    if *p == parent {
                        return true;
                    }
                    stack.push(*p);
                }
            }
        }
        false
    }

    /// Storage kind used once values leave the graph.
    pub fn value_kind(&self, id: TypeId) -> ValueKind {
        match self.strip(id) {
            TypeId::ANY => ValueKind::Any,
            TypeId::VOID => ValueKind::Void,
            TypeId::BOOL => ValueKind::Bool,
            TypeId::INT => ValueKind::Int,
            TypeId::DOUBLE => ValueKind::Double,
            TypeId::STRING => ValueKind::String,
            // user types carry no runtime representation of their own
            _ => ValueKind::Any,
        }
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_preregistered() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.len(), 6);
        assert_eq!(reg.get_by_name("int"), Some(TypeId::INT));
        assert_eq!(reg.get_by_name("double"), Some(TypeId::DOUBLE));
        assert_eq!(reg.name(TypeId::STRING), "string");
        assert_eq!(reg.name(TypeId(99)), "?");
    }

    #[test]
    fn reference_types_are_interned() {
        let mut reg = TypeRegistry::new();
        let a = reg.reference_to(TypeId::INT).unwrap();
        let b = reg.reference_to(TypeId::INT).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.name(a), "int&");
        assert!(reg.is_reference(a));
        assert_eq!(reg.strip(a), TypeId::INT);
        // qualifying an already qualified type is idempotent
        assert_eq!(reg.reference_to(a).unwrap(), a);
    }

    #[test]
    fn qualified_type_is_a_base() {
        let mut reg = TypeRegistry::new();
        let ptr = reg.qualify(TypeId::DOUBLE, Qualifiers::POINTER).unwrap();
        assert_eq!(reg.name(ptr), "double*");
        assert!(reg.is_a(ptr, TypeId::DOUBLE));
        assert!(!reg.is_a(TypeId::DOUBLE, ptr));
    }

    #[test]
    fn register_named_rejects_duplicates() {
        let mut reg = TypeRegistry::new();
        let vec2 = reg.register_named("vec2", &[]).unwrap();
        let vec3 = reg.register_named("vec3", &[vec2]).unwrap();
        assert!(reg.is_a(vec3, vec2));
        assert!(matches!(
            reg.register_named("vec2", &[]),
            Err(GraphError::DuplicateTypeName { .. })
        ));
        assert!(matches!(
            reg.register_named("vec4", &[TypeId(77)]),
            Err(GraphError::TypeNotFound { .. })
        ));
    }

    #[test]
    fn value_kind_strips_qualifiers() {
        let mut reg = TypeRegistry::new();
        let r = reg.reference_to(TypeId::STRING).unwrap();
        assert_eq!(reg.value_kind(r), ValueKind::String);
        assert_eq!(reg.value_kind(TypeId::ANY), ValueKind::Any);
    }
}
