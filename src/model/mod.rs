pub mod instruction;
pub mod location;
pub mod value;

/// Slot of an instruction in the linearized program order. Even positions are the instructions
/// themselves, odd positions sit between two instructions.
pub type Position = usize;

/// Marks "no position", for example the start of the terminal range of an interval.
pub const MAX_POSITION: Position = usize::MAX;
