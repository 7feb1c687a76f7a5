use crate::model::location::StackSlot;

pub const STACK_ENTRY_SIZE: i32 = 8;

/// Hands out spill slots for one compilation unit.
pub struct StackSlotAllocator {
    next_offset: i32
}

impl StackSlotAllocator {
    pub fn new() -> StackSlotAllocator {
        StackSlotAllocator {
            next_offset: 0
        }
    }

    /// Starts allocating after the slots already used by the frame (arguments, locals).
    pub fn with_reserved(num_reserved_entries: usize) -> StackSlotAllocator {
        StackSlotAllocator {
            next_offset: num_reserved_entries as i32 * STACK_ENTRY_SIZE
        }
    }

    pub fn allocate(&mut self) -> StackSlot {
        let slot = StackSlot::new(self.next_offset);
        self.next_offset += STACK_ENTRY_SIZE;
        slot
    }

    pub fn frame_size(&self) -> i32 {
        self.next_offset
    }
}

impl Default for StackSlotAllocator {
    fn default() -> Self {
        StackSlotAllocator::new()
    }
}

#[test]
fn test_allocate_slots() {
    let mut allocator = StackSlotAllocator::with_reserved(2);
    assert_eq!(StackSlot::new(16), allocator.allocate());
    assert_eq!(StackSlot::new(24), allocator.allocate());
    assert_eq!(32, allocator.frame_size());
}
