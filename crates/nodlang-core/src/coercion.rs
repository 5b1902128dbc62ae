//! Implicit conversion rules.
//!
//! Two types are implicitly convertible when, after stripping qualifiers:
//!
//! - they are identical
//! - both are pointers
//! - either side is `any`
//! - one is an integer and the other a floating type
//!
//! The relation is symmetric. Whether a conversion loses information is a
//! separate question answered by [`is_narrowing`]; declarations and
//! assignments use it to refuse silent truncation.

use crate::type_id::{TypeId, TypeRegistry};

/// Returns `true` if a value of type `from` may flow into `to` without an
/// explicit conversion.
pub fn is_implicitly_convertible(from: TypeId, to: TypeId, registry: &TypeRegistry) -> bool {
    if registry.is_pointer(from) && registry.is_pointer(to) {
        return true;
    }

    let from = registry.strip(from);
    let to = registry.strip(to);

    if from == to {
        return true;
    }

    if from == TypeId::ANY || to == TypeId::ANY {
        return true;
    }

    (is_integer(from) && is_float(to)) || (is_float(from) && is_integer(to))
}

/// Returns `true` if converting `from` into `to` may lose information.
pub fn is_narrowing(from: TypeId, to: TypeId, registry: &TypeRegistry) -> bool {
    is_float(registry.strip(from)) && is_integer(registry.strip(to))
}

/// Returns `true` if the type is an integer type.
pub fn is_integer(type_id: TypeId) -> bool {
    type_id == TypeId::INT
}

/// Returns `true` if the type is a floating type.
pub fn is_float(type_id: TypeId) -> bool {
    type_id == TypeId::DOUBLE
}

/// Returns `true` if the type is numeric.
pub fn is_numeric(type_id: TypeId) -> bool {
    is_integer(type_id) || is_float(type_id)
}
