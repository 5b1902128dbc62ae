//! Runtime values held by properties and VM memory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Storage kind of a value, independent of type qualifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Any,
    Void,
    Bool,
    Int,
    Double,
    String,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Any => "any",
            ValueKind::Void => "void",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Double => "double",
            ValueKind::String => "string",
        };
        f.write_str(name)
    }
}

/// A tagged value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    /// No value yet (an `any` or `void` slot that was never written).
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl Variant {
    /// The zero value stored in a freshly declared slot of `kind`.
    pub fn default_for(kind: ValueKind) -> Variant {
        match kind {
            ValueKind::Any | ValueKind::Void => Variant::Null,
            ValueKind::Bool => Variant::Bool(false),
            ValueKind::Int => Variant::Int(0),
            ValueKind::Double => Variant::Double(0.0),
            ValueKind::String => Variant::String(String::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Variant::Null => ValueKind::Any,
            Variant::Bool(_) => ValueKind::Bool,
            Variant::Int(_) => ValueKind::Int,
            Variant::Double(_) => ValueKind::Double,
            Variant::String(_) => ValueKind::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Converts the value to `kind`.
    ///
    /// Integers and doubles convert into each other (doubles truncate toward
    /// zero). `Any` accepts every value unchanged. A null value becomes the
    /// default of `kind`. Everything else is a [`EvalError::TypeMismatch`].
    pub fn coerce(self, kind: ValueKind) -> Result<Variant, EvalError> {
        match (self, kind) {
            (value, ValueKind::Any) => Ok(value),
            (Variant::Null, kind) => Ok(Variant::default_for(kind)),
            (_, ValueKind::Void) => Ok(Variant::Null),
            (Variant::Int(i), ValueKind::Double) => Ok(Variant::Double(i as f64)),
            (Variant::Double(d), ValueKind::Int) => Ok(Variant::Int(d as i64)),
            (value, kind) if value.kind() == kind => Ok(value),
            (value, kind) => Err(EvalError::TypeMismatch {
                expected: kind.to_string(),
                got: value.kind().to_string(),
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Variant::Bool(b) => Ok(*b),
            other => Err(mismatch(ValueKind::Bool, other)),
        }
    }

    pub fn as_int(&self) -> Result<i64, EvalError> {
        match self {
            Variant::Int(i) => Ok(*i),
            Variant::Double(d) => Ok(*d as i64),
            other => Err(mismatch(ValueKind::Int, other)),
        }
    }

    pub fn as_double(&self) -> Result<f64, EvalError> {
        match self {
            Variant::Double(d) => Ok(*d),
            Variant::Int(i) => Ok(*i as f64),
            other => Err(mismatch(ValueKind::Double, other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, EvalError> {
        match self {
            Variant::String(s) => Ok(s),
            other => Err(mismatch(ValueKind::String, other)),
        }
    }
}

fn mismatch(expected: ValueKind, got: &Variant) -> EvalError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        got: got.kind().to_string(),
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => f.write_str("null"),
            Variant::Bool(b) => write!(f, "{b}"),
            Variant::Int(i) => write!(f, "{i}"),
            Variant::Double(d) => write!(f, "{d}"),
            Variant::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_per_kind() {
        assert_eq!(Variant::default_for(ValueKind::Int), Variant::Int(0));
        assert_eq!(Variant::default_for(ValueKind::String), Variant::String(String::new()));
        assert!(Variant::default_for(ValueKind::Any).is_null());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Variant::Int(3).coerce(ValueKind::Double), Ok(Variant::Double(3.0)));
        assert_eq!(Variant::Double(15.5).coerce(ValueKind::Int), Ok(Variant::Int(15)));
        assert_eq!(Variant::Double(-2.7).coerce(ValueKind::Int), Ok(Variant::Int(-2)));
    }

    #[test]
    fn bool_and_string_do_not_coerce() {
        let err = Variant::Bool(true).coerce(ValueKind::String).unwrap_err();
        assert_eq!(
            err,
            EvalError::TypeMismatch {
                expected: "string".into(),
                got: "bool".into()
            }
        );
        assert!(Variant::from("x").coerce(ValueKind::Bool).is_err());
    }

    #[test]
    fn any_accepts_everything() {
        assert_eq!(Variant::from("x").coerce(ValueKind::Any), Ok(Variant::from("x")));
        assert_eq!(Variant::Null.coerce(ValueKind::Double), Ok(Variant::Double(0.0)));
    }

    #[test]
    fn display() {
        assert_eq!(Variant::Double(15.6).to_string(), "15.6");
        assert_eq!(Variant::Double(10.0).to_string(), "10");
        assert_eq!(Variant::Bool(false).to_string(), "false");
        assert_eq!(Variant::from("hi").to_string(), "hi");
    }

    #[test]
    fn json_is_untagged() {
        assert_eq!(serde_json::to_string(&Variant::Int(4)).unwrap(), "4");
        assert_eq!(serde_json::to_string(&Variant::from("a")).unwrap(), "\"a\"");
        assert_eq!(serde_json::to_string(&Variant::Null).unwrap(), "null");
    }
}
