//! Typed, connectable value slots owned by nodes.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::PropertyId;
use crate::type_id::TypeId;
use crate::variant::Variant;

/// Whether a property is shown by editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Always,
    WhenConnected,
    Hidden,
}

/// Which edge directions a property allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionFlags {
    In,
    Out,
    InOut,
    None,
}

impl ConnectionFlags {
    pub fn accepts_input(self) -> bool {
        matches!(self, ConnectionFlags::In | ConnectionFlags::InOut)
    }

    pub fn accepts_output(self) -> bool {
        matches!(self, ConnectionFlags::Out | ConnectionFlags::InOut)
    }
}

/// A named, typed value slot.
///
/// At most one input feeds a property; any number of outputs may read it.
/// Both ends of every connection are recorded here and in the graph's edge
/// registry, and the graph keeps the two in sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    name: String,
    ty: TypeId,
    value: Variant,
    visibility: Visibility,
    flags: ConnectionFlags,
    pub(crate) input: Option<PropertyId>,
    pub(crate) outputs: SmallVec<[PropertyId; 2]>,
}

impl Property {
    pub fn new(name: &str, ty: TypeId, flags: ConnectionFlags) -> Self {
        Property {
            name: name.to_string(),
            ty,
            value: Variant::Null,
            visibility: Visibility::Always,
            flags,
            input: None,
            outputs: SmallVec::new(),
        }
    }

    /// Builder: sets the initial value.
    pub fn with_value(mut self, value: Variant) -> Self {
        self.value = value;
        self
    }

    /// Builder: sets the visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn value(&self) -> &Variant {
        &self.value
    }

    pub(crate) fn set_value(&mut self, value: Variant) {
        self.value = value;
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn flags(&self) -> ConnectionFlags {
        self.flags
    }

    /// The property feeding this one, if connected.
    pub fn input(&self) -> Option<PropertyId> {
        self.input
    }

    /// Properties reading from this one.
    pub fn outputs(&self) -> &[PropertyId] {
        &self.outputs
    }

    pub fn is_connected(&self) -> bool {
        self.input.is_some() || !self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert!(ConnectionFlags::InOut.accepts_input());
        assert!(ConnectionFlags::InOut.accepts_output());
        assert!(!ConnectionFlags::Out.accepts_input());
        assert!(!ConnectionFlags::In.accepts_output());
        assert!(!ConnectionFlags::None.accepts_input());
    }

    #[test]
    fn new_property_is_unconnected() {
        let prop = Property::new("value", TypeId::INT, ConnectionFlags::InOut)
            .with_value(Variant::Int(3))
            .with_visibility(Visibility::Hidden);
        assert_eq!(prop.name(), "value");
        assert_eq!(prop.value(), &Variant::Int(3));
        assert_eq!(prop.visibility(), Visibility::Hidden);
        assert!(!prop.is_connected());
    }
}
