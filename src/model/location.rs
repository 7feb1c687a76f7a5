use std::fmt;

use iced_x86::Register;

use crate::compiler::stack_layout::STACK_ENTRY_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterClass {
    General,
    Float
}

impl RegisterClass {
    pub fn of(register: Register) -> RegisterClass {
        if register.is_xmm() {
            RegisterClass::Float
        } else {
            RegisterClass::General
        }
    }
}

/// A frame slot, addressed by its byte offset from the frame base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot {
    pub offset: i32
}

impl StackSlot {
    pub fn new(offset: i32) -> StackSlot {
        StackSlot {
            offset
        }
    }

    /// The dense index of the slot if it lies on a stack entry boundary.
    pub fn aligned_index(&self) -> Option<usize> {
        if self.offset >= 0 && self.offset % STACK_ENTRY_SIZE == 0 {
            Some((self.offset / STACK_ENTRY_SIZE) as usize)
        } else {
            None
        }
    }

    pub fn from_aligned_index(index: usize) -> StackSlot {
        StackSlot::new(index as i32 * STACK_ENTRY_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Register(Register),
    Stack(StackSlot)
}

impl Location {
    pub fn stack(offset: i32) -> Location {
        Location::Stack(StackSlot::new(offset))
    }

    pub fn is_register(&self) -> bool {
        match self {
            Location::Register(_) => true,
            Location::Stack(_) => false
        }
    }

    pub fn is_stack(&self) -> bool {
        !self.is_register()
    }

    pub fn register(&self) -> Option<Register> {
        match self {
            Location::Register(register) => Some(*register),
            Location::Stack(_) => None
        }
    }

    pub fn stack_slot(&self) -> Option<StackSlot> {
        match self {
            Location::Register(_) => None,
            Location::Stack(slot) => Some(*slot)
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(register) => write!(f, "{:?}", register),
            Location::Stack(slot) => write!(f, "stack[{}]", slot.offset)
        }
    }
}

#[test]
fn test_aligned_stack_slots() {
    assert_eq!(Some(0), StackSlot::new(0).aligned_index());
    assert_eq!(Some(3), StackSlot::new(24).aligned_index());
    assert_eq!(None, StackSlot::new(12).aligned_index());
    assert_eq!(None, StackSlot::new(-8).aligned_index());
    assert_eq!(StackSlot::new(24), StackSlot::from_aligned_index(3));
}

#[test]
fn test_register_class() {
    assert_eq!(RegisterClass::General, RegisterClass::of(Register::RAX));
    assert_eq!(RegisterClass::Float, RegisterClass::of(Register::XMM3));
}
