//! Function and operator signatures.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::coercion::is_implicitly_convertible;
use crate::type_id::{TypeId, TypeRegistry};

/// One named, typed argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub ty: TypeId,
    pub name: String,
}

/// Associativity used by the expression parser at equal precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Associativity {
    Left,
    Right,
}

/// Number of operands an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arity {
    Unary,
    Binary,
}

impl Arity {
    pub fn count(self) -> usize {
        match self {
            Arity::Unary => 1,
            Arity::Binary => 2,
        }
    }
}

/// Operator metadata attached to a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub precedence: u8,
    pub associativity: Associativity,
    pub arity: Arity,
}

/// An identifier, ordered arguments and a return type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub identifier: String,
    pub args: SmallVec<[Arg; 3]>,
    pub return_type: TypeId,
    pub operator: Option<OperatorInfo>,
}

impl Signature {
    pub fn new(identifier: &str, return_type: TypeId) -> Self {
        Signature {
            identifier: identifier.to_string(),
            args: SmallVec::new(),
            return_type,
            operator: None,
        }
    }

    /// Builder: appends an argument.
    pub fn arg(mut self, ty: TypeId, name: &str) -> Self {
        self.args.push(Arg {
            ty,
            name: name.to_string(),
        });
        self
    }

    /// Builder: tags the signature as an operator.
    pub fn operator(mut self, precedence: u8, associativity: Associativity) -> Self {
        let arity = if self.args.len() == 1 {
            Arity::Unary
        } else {
            Arity::Binary
        };
        self.operator = Some(OperatorInfo {
            precedence,
            associativity,
            arity,
        });
        self
    }

    pub fn arg_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.args.iter().map(|a| a.ty)
    }

    pub fn is_operator(&self) -> bool {
        self.operator.is_some()
    }

    /// Same identifier and identical argument types, in order. A reference
    /// parameter matches its referenced type.
    pub fn is_exactly(&self, identifier: &str, arg_types: &[TypeId], registry: &TypeRegistry) -> bool {
        self.identifier == identifier
            && self.args.len() == arg_types.len()
            && self
                .arg_types()
                .zip(arg_types)
                .all(|(param, arg)| registry.strip(param) == registry.strip(*arg))
    }

    /// Same identifier and every argument implicitly convertible.
    ///
    /// A reference parameter binds to storage of its own type, so it only
    /// accepts an identical type or `any`.
    pub fn is_compatible(&self, identifier: &str, arg_types: &[TypeId], registry: &TypeRegistry) -> bool {
        self.identifier == identifier
            && self.args.len() == arg_types.len()
            && self.arg_types().zip(arg_types).all(|(param, arg)| {
                if registry.is_reference(param) {
                    let (param, arg) = (registry.strip(param), registry.strip(*arg));
                    param == arg || param == TypeId::ANY || arg == TypeId::ANY
                } else {
                    is_implicitly_convertible(*arg, param, registry)
                }
            })
    }

    /// Renders the signature with type names, e.g. `double +(double, double)`.
    pub fn display<'a>(&'a self, registry: &'a TypeRegistry) -> SignatureDisplay<'a> {
        SignatureDisplay {
            signature: self,
            registry,
        }
    }
}

/// Helper returned by [`Signature::display`].
pub struct SignatureDisplay<'a> {
    signature: &'a Signature,
    registry: &'a TypeRegistry,
}

impl fmt::Display for SignatureDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sig = self.signature;
        write!(f, "{} {}(", self.registry.name(sig.return_type), sig.identifier)?;
        for (i, arg) in sig.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(self.registry.name(arg.ty))?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plus_double() -> Signature {
        Signature::new("+", TypeId::DOUBLE)
            .arg(TypeId::DOUBLE, "lhs")
            .arg(TypeId::DOUBLE, "rhs")
            .operator(10, Associativity::Left)
    }

    #[test]
    fn builder_infers_arity() {
        let neg = Signature::new("-", TypeId::INT)
            .arg(TypeId::INT, "value")
            .operator(30, Associativity::Right);
        assert_eq!(neg.operator.map(|op| op.arity), Some(Arity::Unary));
        assert_eq!(plus_double().operator.map(|op| op.arity), Some(Arity::Binary));
    }

    #[test]
    fn exact_match_requires_identical_types() {
        let reg = TypeRegistry::new();
        let sig = plus_double();
        assert!(sig.is_exactly("+", &[TypeId::DOUBLE, TypeId::DOUBLE], &reg));
        assert!(!sig.is_exactly("+", &[TypeId::INT, TypeId::DOUBLE], &reg));
        assert!(!sig.is_exactly("-", &[TypeId::DOUBLE, TypeId::DOUBLE], &reg));
        assert!(!sig.is_exactly("+", &[TypeId::DOUBLE], &reg));
    }

    #[test]
    fn reference_parameters_need_identical_types() {
        let mut reg = TypeRegistry::new();
        let int_ref = reg.reference_to(TypeId::INT).unwrap();
        let assign = Signature::new("=", TypeId::INT)
            .arg(int_ref, "lvalue")
            .arg(TypeId::INT, "rvalue")
            .operator(0, Associativity::Right);
        assert!(assign.is_exactly("=", &[TypeId::INT, TypeId::INT], &reg));
        assert!(assign.is_compatible("=", &[TypeId::INT, TypeId::DOUBLE], &reg));
        assert!(assign.is_compatible("=", &[TypeId::ANY, TypeId::INT], &reg));
        assert!(!assign.is_compatible("=", &[TypeId::DOUBLE, TypeId::INT], &reg));
    }

    #[test]
    fn compatible_match_allows_conversion() {
        let reg = TypeRegistry::new();
        let sig = plus_double();
        assert!(sig.is_compatible("+", &[TypeId::INT, TypeId::DOUBLE], &reg));
        assert!(sig.is_compatible("+", &[TypeId::ANY, TypeId::INT], &reg));
        assert!(!sig.is_compatible("+", &[TypeId::STRING, TypeId::DOUBLE], &reg));
    }

    #[test]
    fn display_uses_type_names() {
        let reg = TypeRegistry::new();
        assert_eq!(plus_double().display(&reg).to_string(), "double +(double, double)");
    }
}
