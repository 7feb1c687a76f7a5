use std::fmt;

use crate::model::location::RegisterClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Reference,
    /// Synthetic operands that never hold a value worth tracking.
    Illegal
}

impl ValueKind {
    pub fn is_reference(&self) -> bool {
        match self {
            ValueKind::Reference => true,
            _ => false
        }
    }

    pub fn is_illegal(&self) -> bool {
        match self {
            ValueKind::Illegal => true,
            _ => false
        }
    }

    pub fn register_class(&self) -> RegisterClass {
        match self {
            ValueKind::Float => RegisterClass::Float,
            _ => RegisterClass::General
        }
    }
}

/// An abstract value together with its kind, as it occupies a physical location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiveValue {
    pub id: ValueId,
    pub kind: ValueKind
}

impl LiveValue {
    pub fn new(id: u32, kind: ValueKind) -> LiveValue {
        LiveValue {
            id: ValueId(id),
            kind
        }
    }

    pub fn reference(id: u32) -> LiveValue {
        LiveValue::new(id, ValueKind::Reference)
    }

    pub fn int(id: u32) -> LiveValue {
        LiveValue::new(id, ValueKind::Int)
    }

    /// Two values may share a location over a def/use pair only if they have the same kind.
    pub fn is_compatible(&self, other: &LiveValue) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for LiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.id, self.kind)
    }
}
