use std::fmt;
use std::ops::{Index, IndexMut};

use iced_x86::Register;
use smallvec::SmallVec;

use crate::error::{AllocationError, AllocationErrorMessage, AllocationResult};
use crate::model::{MAX_POSITION, Position};
use crate::model::location::{Location, RegisterClass, StackSlot};
use crate::model::value::{LiveValue, ValueId, ValueKind};

/// Index of an interval in its `Intervals` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalId(u32);

impl IntervalId {
    /// Terminates every binding list. Never refers to a real interval.
    pub const END_MARKER: IntervalId = IntervalId(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_end_marker(self) -> bool {
        self == IntervalId::END_MARKER
    }
}

impl fmt::Display for IntervalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end_marker() {
            write!(f, "end")
        } else {
            write!(f, "i{}", self.0)
        }
    }
}

/// A half-open span `[from, to)` of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub from: Position,
    pub to: Position
}

impl Range {
    pub const END: Range = Range { from: MAX_POSITION, to: MAX_POSITION };

    pub fn new(from: Position, to: Position) -> Range {
        Range {
            from,
            to
        }
    }

    pub fn is_end(&self) -> bool {
        self.from == MAX_POSITION
    }

    pub fn covers(&self, position: Position) -> bool {
        self.from <= position && position < self.to
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// How badly a use wants its value in a register, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterPriority {
    None,
    LiveAtLoopEnd,
    ShouldHaveRegister,
    MustHaveRegister
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterBinding {
    /// Pre-assigned to a register, e.g. by the calling convention.
    Fixed,
    Any,
    /// Already resident in a stack slot.
    Stack
}

impl RegisterBinding {
    pub const VALUES: [RegisterBinding; 3] = [RegisterBinding::Fixed, RegisterBinding::Any, RegisterBinding::Stack];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalState {
    Unhandled,
    Active,
    /// Owns a location but is inside a lifetime hole.
    Inactive,
    Handled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpillState {
    NoDefinitionFound,
    /// One definition seen, at the spill definition position.
    NoSpillStore,
    /// Spilled once, a single store after the definition suffices.
    OneSpillStore,
    /// Spilled more than once, stored right at the definition.
    StoreAtDefinition,
    /// Parameters and other values that live in memory from the start.
    StartInMemory,
    /// More than one definition, so stores can not be moved.
    NoOptimization
}

impl SpillState {
    pub fn is_always_in_memory(self) -> bool {
        match self {
            SpillState::StoreAtDefinition | SpillState::StartInMemory => true,
            _ => false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandMode {
    Use,
    Def
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsePosition {
    pub position: Position,
    pub priority: RegisterPriority
}

/// Use positions in strictly descending order: the first use is the last entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsePosList {
    entries: SmallVec<[UsePosition; 4]>
}

impl UsePosList {
    pub fn new() -> UsePosList {
        UsePosList {
            entries: SmallVec::new()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> UsePosition {
        self.entries[index]
    }

    /// Iterates from the latest use to the earliest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item=&UsePosition> {
        self.entries.iter()
    }

    /// Iterates from the earliest use to the latest.
    pub fn iter_ascending(&self) -> impl Iterator<Item=&UsePosition> {
        self.entries.iter().rev()
    }

    fn add(&mut self, position: Position, priority: RegisterPriority) {
        self.entries.push(UsePosition { position, priority });
    }

    fn set_priority(&mut self, index: usize, priority: RegisterPriority) {
        self.entries[index].priority = priority;
    }

    /// Moves all uses at or after `split_position` into the returned list.
    fn split_at(&mut self, split_position: Position) -> UsePosList {
        let split_index = self.entries
            .iter()
            .position(|use_position| use_position.position < split_position)
            .unwrap_or(self.entries.len());

        UsePosList {
            entries: self.entries.drain(..split_index).collect()
        }
    }

    fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|pair| pair[0].position > pair[1].position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalOperand {
    Variable(ValueId),
    Fixed(Register)
}

/// The lifetime of one value, or of one physical register for fixed intervals.
#[derive(Debug, Clone)]
pub struct Interval {
    id: IntervalId,
    operand: IntervalOperand,
    kind: ValueKind,
    binding: RegisterBinding,
    pub(crate) state: IntervalState,
    location: Option<Location>,
    location_hint: Option<IntervalId>,
    ranges: Vec<Range>,
    current_range: usize,
    use_pos_list: UsePosList,
    split_parent: IntervalId,
    split_children: Vec<IntervalId>,
    spill_slot: Option<StackSlot>,
    spill_state: SpillState,
    spill_definition_position: Option<Position>,
    pub(crate) next: IntervalId
}

impl Interval {
    fn new(id: IntervalId, operand: IntervalOperand, kind: ValueKind, binding: RegisterBinding) -> Interval {
        Interval {
            id,
            operand,
            kind,
            binding,
            state: IntervalState::Unhandled,
            location: None,
            location_hint: None,
            ranges: Vec::new(),
            current_range: 0,
            use_pos_list: UsePosList::new(),
            split_parent: id,
            split_children: Vec::new(),
            spill_slot: None,
            spill_state: SpillState::NoDefinitionFound,
            spill_definition_position: None,
            next: IntervalId::END_MARKER
        }
    }

    pub fn id(&self) -> IntervalId {
        self.id
    }

    pub fn operand(&self) -> IntervalOperand {
        self.operand
    }

    /// The value this interval carries. Fixed intervals carry none.
    pub fn value(&self) -> Option<LiveValue> {
        match self.operand {
            IntervalOperand::Variable(id) => Some(LiveValue { id, kind: self.kind }),
            IntervalOperand::Fixed(_) => None
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn register_class(&self) -> RegisterClass {
        match self.operand {
            IntervalOperand::Fixed(register) => RegisterClass::of(register),
            IntervalOperand::Variable(_) => self.kind.register_class()
        }
    }

    pub fn is_fixed(&self) -> bool {
        match self.operand {
            IntervalOperand::Fixed(_) => true,
            IntervalOperand::Variable(_) => false
        }
    }

    pub fn binding(&self) -> RegisterBinding {
        self.binding
    }

    pub(crate) fn set_binding(&mut self, binding: RegisterBinding) {
        self.binding = binding;
    }

    pub fn state(&self) -> IntervalState {
        self.state
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn assign_location(&mut self, location: Location) {
        debug_assert!(
            match location {
                Location::Register(register) => RegisterClass::of(register) == self.register_class(),
                Location::Stack(_) => true
            },
            "{} can not live in {}", self.id, location
        );

        self.location = Some(location);
    }

    pub fn register(&self) -> Option<Register> {
        self.location.and_then(|location| location.register())
    }

    pub fn location_hint(&self) -> Option<IntervalId> {
        self.location_hint
    }

    pub fn set_location_hint(&mut self, hint: IntervalId) {
        self.location_hint = Some(hint);
    }

    pub fn split_parent(&self) -> IntervalId {
        self.split_parent
    }

    pub fn is_split_parent(&self) -> bool {
        self.split_parent == self.id
    }

    pub fn is_split_child(&self) -> bool {
        !self.is_split_parent()
    }

    pub fn split_children(&self) -> &[IntervalId] {
        &self.split_children
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The first range, or the terminal range for an empty interval.
    pub fn first(&self) -> Range {
        self.ranges.first().cloned().unwrap_or(Range::END)
    }

    pub fn from(&self) -> Position {
        self.first().from
    }

    pub fn to(&self) -> Position {
        self.ranges.last().map(|range| range.to).unwrap_or(MAX_POSITION)
    }

    /// The range at the cursor, or the terminal range once the cursor passed the last one.
    pub fn current(&self) -> Range {
        self.ranges.get(self.current_range).cloned().unwrap_or(Range::END)
    }

    pub fn current_from(&self) -> Position {
        self.current().from
    }

    pub fn current_to(&self) -> Position {
        self.current().to
    }

    pub fn current_at_end(&self) -> bool {
        self.current_range >= self.ranges.len()
    }

    pub fn next_range(&mut self) {
        debug_assert!(!self.current_at_end(), "{} has no range left", self.id);
        self.current_range += 1;
    }

    pub fn rewind_range(&mut self) {
        self.current_range = 0;
    }

    /// Adds a range in front of the existing ones, merging it with the first range if they touch.
    /// Ranges are built backwards, so every new range starts at or before the current first one.
    pub fn add_range(&mut self, from: Position, to: Position) {
        debug_assert!(from < to, "invalid range [{}, {})", from, to);

        match self.ranges.first_mut() {
            Some(first) if first.from <= to => {
                debug_assert!(from <= first.to, "not inserting at the beginning of {}", self.id);
                first.from = first.from.min(from);
                first.to = first.to.max(to);
            }
            _ => {
                self.ranges.insert(0, Range::new(from, to));
            }
        }
    }

    pub fn covers(&self, position: Position, mode: OperandMode) -> bool {
        self.ranges
            .iter()
            .find(|range| range.to >= position)
            .map(|range| {
                match mode {
                    OperandMode::Def => range.from <= position && position < range.to,
                    OperandMode::Use => range.from <= position && position <= range.to
                }
            })
            .unwrap_or(false)
    }

    /// Returns true if the interval is not live somewhere in `[hole_from, hole_to]`.
    pub fn has_hole_between(&self, hole_from: Position, hole_to: Position) -> bool {
        debug_assert!(hole_from < hole_to);

        for range in &self.ranges {
            if hole_from < range.from {
                return true;
            } else if hole_to <= range.to {
                return false;
            } else if hole_from <= range.to {
                return true;
            }
        }

        false
    }

    pub fn intersects(&self, other: &Interval) -> bool {
        intersects_at(&self.ranges, 0, &other.ranges, 0, MAX_POSITION).is_some()
    }

    /// The first position both intervals cover, starting from the range cursors of both.
    pub fn current_intersects_at(&self, other: &Interval) -> Option<Position> {
        if self.current_from() > other.to() {
            return None;
        }

        intersects_at(&self.ranges, self.current_range, &other.ranges, other.current_range, MAX_POSITION)
    }

    /// Like `current_intersects_at`, ignoring intersections that start after `limit`.
    pub fn current_intersects_at_limit(&self, other: &Interval, limit: Position) -> Option<Position> {
        if self.current_from() > limit || self.current_from() > other.to() {
            return None;
        }

        intersects_at(&self.ranges, self.current_range, &other.ranges, other.current_range, limit)
    }

    pub fn use_pos_list(&self) -> &UsePosList {
        &self.use_pos_list
    }

    /// Adds a use. Uses are added in descending order; a second use at the same position only
    /// raises the priority. Fixed intervals and uses without priority are not recorded.
    pub fn add_use_pos(&mut self, position: Position, priority: RegisterPriority) {
        if priority == RegisterPriority::None || self.is_fixed() {
            return;
        }

        let len = self.use_pos_list.len();
        if len == 0 || self.use_pos_list.get(len - 1).position > position {
            self.use_pos_list.add(position, priority);
        } else if self.use_pos_list.get(len - 1).priority < priority {
            debug_assert!(self.use_pos_list.get(len - 1).position == position, "use positions of {} not sorted", self.id);
            self.use_pos_list.set_priority(len - 1, priority);
        }
    }

    pub fn first_usage(&self, min_priority: RegisterPriority) -> Option<Position> {
        self.use_pos_list
            .iter_ascending()
            .find(|use_position| use_position.priority >= min_priority)
            .map(|use_position| use_position.position)
    }

    pub fn next_usage(&self, min_priority: RegisterPriority, from: Position) -> Option<Position> {
        self.use_pos_list
            .iter_ascending()
            .find(|use_position| use_position.position >= from && use_position.priority >= min_priority)
            .map(|use_position| use_position.position)
    }

    /// The last use at or before `from` with at least `min_priority`.
    pub fn previous_usage(&self, min_priority: RegisterPriority, from: Position) -> Option<Position> {
        self.use_pos_list
            .iter_ascending()
            .take_while(|use_position| use_position.position <= from)
            .filter(|use_position| use_position.priority >= min_priority)
            .last()
            .map(|use_position| use_position.position)
    }

    pub fn ranges_as_string(&self) -> String {
        self.ranges
            .iter()
            .map(|range| range.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            IntervalOperand::Variable(value) => write!(f, "{} {}", self.id, value)?,
            IntervalOperand::Fixed(register) => write!(f, "{} {:?}", self.id, register)?
        }

        if let Some(location) = self.location {
            write!(f, " @ {}", location)?;
        }

        write!(f, " {:?} {}", self.state, self.ranges_as_string())
    }
}

fn intersects_at(ranges: &[Range],
                 mut index: usize,
                 other_ranges: &[Range],
                 mut other_index: usize,
                 limit: Position) -> Option<Position> {
    while index < ranges.len() && other_index < other_ranges.len() {
        let range = ranges[index];
        let other = other_ranges[other_index];

        if range.from > limit && other.from > limit {
            return None;
        }

        if range.to <= other.from {
            index += 1;
        } else if other.to <= range.from {
            other_index += 1;
        } else {
            let position = range.from.max(other.from);
            return if position <= limit { Some(position) } else { None };
        }
    }

    None
}

/// Owns all intervals of one compilation unit, including the children created by splitting.
#[derive(Debug, Clone, Default)]
pub struct Intervals {
    intervals: Vec<Interval>
}

impl Intervals {
    pub fn new() -> Intervals {
        Intervals {
            intervals: Vec::new()
        }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item=&Interval> {
        self.intervals.iter()
    }

    pub fn get(&self, id: IntervalId) -> Option<&Interval> {
        self.intervals.get(id.index())
    }

    fn push(&mut self, operand: IntervalOperand, kind: ValueKind, binding: RegisterBinding) -> IntervalId {
        let id = IntervalId(self.intervals.len() as u32);
        self.intervals.push(Interval::new(id, operand, kind, binding));
        id
    }

    pub fn create_variable(&mut self, value: LiveValue) -> IntervalId {
        self.push(IntervalOperand::Variable(value.id), value.kind, RegisterBinding::Any)
    }

    pub fn create_fixed(&mut self, register: Register) -> IntervalId {
        let kind = match RegisterClass::of(register) {
            RegisterClass::Float => ValueKind::Float,
            RegisterClass::General => ValueKind::Int
        };

        let id = self.push(IntervalOperand::Fixed(register), kind, RegisterBinding::Fixed);
        self[id].location = Some(Location::Register(register));
        id
    }

    /// A value that lives in `slot` from its start, such as a stack argument.
    pub fn create_stack(&mut self, value: LiveValue, slot: StackSlot) -> IntervalId {
        let id = self.push(IntervalOperand::Variable(value.id), value.kind, RegisterBinding::Stack);
        let interval = &mut self[id];
        interval.location = Some(Location::Stack(slot));
        interval.spill_slot = Some(slot);
        interval.spill_state = SpillState::StartInMemory;
        id
    }

    /// `MAX_POSITION` for the end marker, so that list walks stop there.
    pub fn current_from(&self, id: IntervalId) -> Position {
        if id.is_end_marker() {
            MAX_POSITION
        } else {
            self[id].current_from()
        }
    }

    pub fn from(&self, id: IntervalId) -> Position {
        if id.is_end_marker() {
            MAX_POSITION
        } else {
            self[id].from()
        }
    }

    pub fn first_usage(&self, id: IntervalId, min_priority: RegisterPriority) -> Position {
        if id.is_end_marker() {
            MAX_POSITION
        } else {
            self[id].first_usage(min_priority).unwrap_or(MAX_POSITION)
        }
    }

    pub fn add_use_pos(&mut self, id: IntervalId, position: Position, priority: RegisterPriority, detailed_asserts: bool) -> AllocationResult<()> {
        let interval = &mut self[id];
        if detailed_asserts && !interval.covers(position, OperandMode::Use) {
            return Err(AllocationError::with_position(position, AllocationErrorMessage::InvalidUsePosition(id, position)));
        }

        interval.add_use_pos(position, priority);

        if detailed_asserts && !interval.use_pos_list.is_sorted() {
            return Err(AllocationError::with_position(position, AllocationErrorMessage::InvalidUsePosition(id, position)));
        }

        Ok(())
    }

    /// Splits `id` at `split_position` and returns the new child holding the remainder. All
    /// children hang off the root parent, which also owns the shared spill slot.
    pub fn split(&mut self, id: IntervalId, split_position: Position) -> AllocationResult<IntervalId> {
        let interval = &self[id];
        if interval.is_fixed() || split_position <= interval.from() || split_position >= interval.to() {
            return Err(AllocationError::with_position(split_position, AllocationErrorMessage::SplitOutsideInterval(id, split_position)));
        }

        let parent = interval.split_parent;
        let kind = interval.kind;
        let operand = interval.operand;

        let child = self.push(operand, kind, RegisterBinding::Any);

        let interval = &mut self.intervals[id.index()];
        let range_index = interval.ranges
            .iter()
            .position(|range| range.to > split_position)
            .unwrap_or(interval.ranges.len());

        let mut child_ranges = interval.ranges.split_off(range_index);
        if child_ranges[0].from < split_position {
            interval.ranges.push(Range::new(child_ranges[0].from, split_position));
            child_ranges[0].from = split_position;
        }

        interval.current_range = interval.current_range.min(interval.ranges.len());
        let child_uses = interval.use_pos_list.split_at(split_position);

        let child_interval = &mut self.intervals[child.index()];
        child_interval.ranges = child_ranges;
        child_interval.use_pos_list = child_uses;
        child_interval.split_parent = parent;
        child_interval.location_hint = Some(parent);

        let parent_interval = &mut self[parent];
        if parent_interval.split_children.is_empty() {
            parent_interval.split_children.push(id);
        }
        parent_interval.split_children.push(child);

        Ok(child)
    }

    /// The split child of `parent` that holds the value at `position`.
    pub fn split_child_at(&self, parent: IntervalId, position: Position, mode: OperandMode) -> AllocationResult<IntervalId> {
        let parent_interval = &self[parent];
        debug_assert!(parent_interval.is_split_parent(), "{} is not a split parent", parent);

        if parent_interval.split_children.is_empty() {
            return if parent_interval.covers(position, mode) {
                Ok(parent)
            } else {
                Err(AllocationError::with_position(position, AllocationErrorMessage::NoSplitChild(parent, position)))
            };
        }

        // the end of an interval is not a valid position for an output
        let to_offset = match mode {
            OperandMode::Def => 0,
            OperandMode::Use => 1
        };

        let mut candidates = parent_interval.split_children
            .iter()
            .cloned()
            .filter(|&child| {
                let child = &self[child];
                child.from() <= position && position < child.to() + to_offset
            });

        let result = candidates
            .next()
            .ok_or(AllocationError::with_position(position, AllocationErrorMessage::NoSplitChild(parent, position)))?;

        if let Some(other) = candidates.next() {
            // a use at the end of one child coincides with the start of the next
            if mode == OperandMode::Use && self[result].to() == position && self[other].from() == position {
                return Ok(other);
            }

            return Err(AllocationError::with_position(position, AllocationErrorMessage::OverlappingSplitChildren(result, other)));
        }

        Ok(result)
    }

    /// Checks that the split children of `parent` never overlap.
    pub fn check_split_children(&self, parent: IntervalId) -> AllocationResult<()> {
        let children = &self[parent].split_children;
        for (index, &first) in children.iter().enumerate() {
            for &second in &children[index + 1..] {
                let (first_interval, second_interval) = (&self[first], &self[second]);
                let ordered = first_interval.to() <= second_interval.from() || second_interval.to() <= first_interval.from();
                if !ordered || first_interval.intersects(second_interval) {
                    return Err(AllocationError::new(AllocationErrorMessage::OverlappingSplitChildren(first, second)));
                }
            }
        }

        Ok(())
    }

    /// The hinted interval, or with `search_split_child` the first part of it that got a register.
    pub fn location_hint(&self, id: IntervalId, search_split_child: bool) -> Option<IntervalId> {
        let hint = self[id].location_hint?;
        if !search_split_child {
            return Some(hint);
        }

        let hint_interval = &self[hint];
        if hint_interval.register().is_some() {
            return Some(hint);
        }

        hint_interval.split_children
            .iter()
            .cloned()
            .find(|&child| self[child].register().is_some())
    }

    pub fn spill_slot(&self, id: IntervalId) -> Option<StackSlot> {
        self[self[id].split_parent].spill_slot
    }

    pub fn set_spill_slot(&mut self, id: IntervalId, slot: StackSlot) {
        let parent = self[id].split_parent;
        debug_assert!(self[parent].spill_slot.is_none(), "{} already has a spill slot", parent);
        self[parent].spill_slot = Some(slot);
    }

    pub fn spill_state(&self, id: IntervalId) -> SpillState {
        self[self[id].split_parent].spill_state
    }

    pub fn set_spill_state(&mut self, id: IntervalId, state: SpillState) {
        let parent = self[id].split_parent;
        self[parent].spill_state = state;
    }

    /// Advances the spill state of the value when one of its parts is sent to the stack.
    pub fn change_spill_state(&mut self, id: IntervalId) {
        let next = match self.spill_state(id) {
            SpillState::NoSpillStore => SpillState::OneSpillStore,
            SpillState::OneSpillStore => SpillState::StoreAtDefinition,
            state => state
        };

        self.set_spill_state(id, next);
    }

    pub fn spill_definition_position(&self, id: IntervalId) -> Option<Position> {
        self[self[id].split_parent].spill_definition_position
    }

    /// Records a definition of the value at `position`. Definitions are seen in descending
    /// order; two adjacent definitions count as one.
    pub fn record_definition(&mut self, id: IntervalId, position: Position) {
        let parent = self[id].split_parent;
        let interval = &mut self[parent];

        match interval.spill_state {
            SpillState::NoDefinitionFound => {
                interval.spill_definition_position = Some(position);
                interval.spill_state = SpillState::NoSpillStore;
            }
            SpillState::NoSpillStore => {
                let previous = interval.spill_definition_position.unwrap_or(position);
                if position + 2 < previous {
                    interval.spill_state = SpillState::NoOptimization;
                } else {
                    interval.spill_definition_position = Some(position);
                }
            }
            _ => {}
        }
    }

    /// True if the value always has a valid copy in its spill slot.
    pub fn always_in_memory(&self, id: IntervalId) -> bool {
        self.spill_state(id).is_always_in_memory()
    }

    pub fn print_intervals(&self) {
        for interval in &self.intervals {
            println!("{}", interval);
        }
    }
}

impl Index<IntervalId> for Intervals {
    type Output = Interval;

    fn index(&self, id: IntervalId) -> &Interval {
        debug_assert!(!id.is_end_marker(), "the end marker is not an interval");
        &self.intervals[id.index()]
    }
}

impl IndexMut<IntervalId> for Intervals {
    fn index_mut(&mut self, id: IntervalId) -> &mut Interval {
        debug_assert!(!id.is_end_marker(), "the end marker is not an interval");
        &mut self.intervals[id.index()]
    }
}

#[cfg(test)]
fn create_interval(intervals: &mut Intervals, value: u32, ranges: &[(Position, Position)]) -> IntervalId {
    let id = intervals.create_variable(LiveValue::int(value));
    for &(from, to) in ranges.iter().rev() {
        intervals[id].add_range(from, to);
    }

    id
}

#[test]
fn test_add_range_merges() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 4), (10, 20)]);
    intervals[id].add_range(2, 8);

    assert_eq!(&[Range::new(0, 8), Range::new(10, 20)], intervals[id].ranges());
    assert_eq!(0, intervals[id].from());
    assert_eq!(20, intervals[id].to());
}

#[test]
fn test_range_cursor() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 10), (20, 30)]);
    let interval = &mut intervals[id];

    assert_eq!(Range::new(0, 10), interval.first());
    assert_eq!(10, interval.current_to());

    interval.next_range();
    assert_eq!(20, interval.current_from());
    assert_eq!(30, interval.current_to());

    interval.next_range();
    assert!(interval.current_at_end());
    assert!(interval.current().is_end());
    assert_eq!(MAX_POSITION, interval.current_from());

    interval.rewind_range();
    assert_eq!(0, interval.current_from());
}

#[test]
fn test_empty_interval() {
    let mut intervals = Intervals::new();
    let id = intervals.create_variable(LiveValue::int(0));

    assert!(intervals[id].is_empty());
    assert!(intervals[id].first().is_end());
    assert_eq!(MAX_POSITION, intervals[id].from());
    assert!(intervals[id].current_at_end());
    assert_eq!(MAX_POSITION, intervals.current_from(IntervalId::END_MARKER));
}

#[test]
fn test_covers_and_holes() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 10), (20, 30)]);
    let interval = &intervals[id];

    assert!(interval.covers(0, OperandMode::Def));
    assert!(!interval.covers(10, OperandMode::Def));
    assert!(interval.covers(10, OperandMode::Use));
    assert!(!interval.covers(15, OperandMode::Use));
    assert!(interval.covers(25, OperandMode::Def));

    assert!(interval.has_hole_between(8, 22));
    assert!(!interval.has_hole_between(2, 8));
    assert!(!interval.has_hole_between(22, 28));
}

#[test]
fn test_intersections() {
    let mut intervals = Intervals::new();
    let first = create_interval(&mut intervals, 0, &[(0, 10), (20, 30)]);
    let second = create_interval(&mut intervals, 1, &[(10, 20), (28, 40)]);
    let third = create_interval(&mut intervals, 2, &[(10, 20)]);

    assert!(intervals[first].intersects(&intervals[second]));
    assert_eq!(Some(28), intervals[first].current_intersects_at(&intervals[second]));
    assert_eq!(None, intervals[first].current_intersects_at_limit(&intervals[second], 25));
    assert!(!intervals[first].intersects(&intervals[third]));
}

#[test]
fn test_use_positions() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 40)]);

    intervals.add_use_pos(id, 30, RegisterPriority::MustHaveRegister, true).unwrap();
    intervals.add_use_pos(id, 20, RegisterPriority::ShouldHaveRegister, true).unwrap();
    intervals.add_use_pos(id, 20, RegisterPriority::MustHaveRegister, true).unwrap();
    intervals.add_use_pos(id, 10, RegisterPriority::LiveAtLoopEnd, true).unwrap();
    intervals.add_use_pos(id, 4, RegisterPriority::None, true).unwrap();

    let interval = &intervals[id];
    let positions = interval.use_pos_list().iter().map(|use_position| use_position.position).collect::<Vec<_>>();
    assert_eq!(vec![30, 20, 10], positions);

    assert_eq!(Some(10), interval.first_usage(RegisterPriority::None));
    assert_eq!(Some(20), interval.first_usage(RegisterPriority::MustHaveRegister));
    assert_eq!(Some(30), interval.next_usage(RegisterPriority::MustHaveRegister, 21));
    assert_eq!(Some(20), interval.previous_usage(RegisterPriority::ShouldHaveRegister, 25));
    assert_eq!(None, interval.previous_usage(RegisterPriority::ShouldHaveRegister, 15));
}

#[test]
fn test_use_position_outside_interval() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 10)]);

    let result = intervals.add_use_pos(id, 14, RegisterPriority::MustHaveRegister, true);
    assert_eq!(AllocationErrorMessage::InvalidUsePosition(id, 14), result.unwrap_err().message);
}

#[test]
fn test_split_inside_range() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 10), (20, 30)]);
    intervals[id].add_use_pos(26, RegisterPriority::MustHaveRegister);
    intervals[id].add_use_pos(4, RegisterPriority::MustHaveRegister);

    let child = intervals.split(id, 24).unwrap();

    assert_eq!(&[Range::new(0, 10), Range::new(20, 24)], intervals[id].ranges());
    assert_eq!(&[Range::new(24, 30)], intervals[child].ranges());
    assert_eq!(Some(4), intervals[id].first_usage(RegisterPriority::None));
    assert_eq!(1, intervals[id].use_pos_list().len());
    assert_eq!(Some(26), intervals[child].first_usage(RegisterPriority::None));

    assert_eq!(id, intervals[child].split_parent());
    assert!(intervals[child].is_split_child());
    assert_eq!(Some(id), intervals[child].location_hint());
    assert_eq!(&[id, child], intervals[id].split_children());
}

#[test]
fn test_split_between_ranges() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 10), (20, 30)]);

    let child = intervals.split(id, 14).unwrap();

    assert_eq!(&[Range::new(0, 10)], intervals[id].ranges());
    assert_eq!(&[Range::new(20, 30)], intervals[child].ranges());
}

#[test]
fn test_split_children_cover_original() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 10), (14, 18), (20, 30)]);
    let original = intervals[id].ranges().to_vec();

    let first_child = intervals.split(id, 6).unwrap();
    let second_child = intervals.split(first_child, 16).unwrap();

    assert_eq!(id, intervals[second_child].split_parent());
    assert_eq!(&[id, first_child, second_child], intervals[id].split_children());
    intervals.check_split_children(id).unwrap();

    let mut covered: Vec<Range> = Vec::new();
    for &child in intervals[id].split_children() {
        for range in intervals[child].ranges() {
            match covered.last_mut() {
                Some(Range { to, .. }) if *to == range.from => *to = range.to,
                _ => covered.push(*range)
            }
        }
    }

    assert_eq!(original, covered);
}

#[test]
fn test_split_outside_interval() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(4, 10)]);

    assert_eq!(AllocationErrorMessage::SplitOutsideInterval(id, 4), intervals.split(id, 4).unwrap_err().message);
    assert_eq!(AllocationErrorMessage::SplitOutsideInterval(id, 12), intervals.split(id, 12).unwrap_err().message);

    let fixed = intervals.create_fixed(Register::RAX);
    intervals[fixed].add_range(0, 10);
    assert!(intervals.split(fixed, 5).is_err());
}

#[test]
fn test_split_child_at() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 30)]);

    assert_eq!(id, intervals.split_child_at(id, 12, OperandMode::Use).unwrap());
    assert!(intervals.split_child_at(id, 40, OperandMode::Use).is_err());

    let child = intervals.split(id, 16).unwrap();

    assert_eq!(id, intervals.split_child_at(id, 12, OperandMode::Def).unwrap());
    assert_eq!(child, intervals.split_child_at(id, 16, OperandMode::Def).unwrap());
    assert_eq!(child, intervals.split_child_at(id, 16, OperandMode::Use).unwrap());
    assert_eq!(child, intervals.split_child_at(id, 30, OperandMode::Use).unwrap());
    assert!(intervals.split_child_at(id, 30, OperandMode::Def).is_err());
}

#[test]
fn test_location_hint_searches_children() {
    let mut intervals = Intervals::new();
    let hint = create_interval(&mut intervals, 0, &[(0, 20)]);
    let id = create_interval(&mut intervals, 1, &[(20, 30)]);
    intervals[id].set_location_hint(hint);

    assert_eq!(Some(hint), intervals.location_hint(id, false));
    assert_eq!(None, intervals.location_hint(id, true));

    let child = intervals.split(hint, 10).unwrap();
    intervals[child].assign_location(Location::Register(Register::RBX));

    assert_eq!(Some(child), intervals.location_hint(id, true));
}

#[test]
fn test_spill_state_after_stores() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 30)]);

    intervals.change_spill_state(id);
    assert_eq!(SpillState::NoDefinitionFound, intervals.spill_state(id));

    intervals.record_definition(id, 0);
    let child = intervals.split(id, 10).unwrap();
    intervals.change_spill_state(child);
    assert_eq!(SpillState::OneSpillStore, intervals.spill_state(id));
    assert!(!intervals.always_in_memory(child));

    let grandchild = intervals.split(child, 20).unwrap();
    intervals.change_spill_state(grandchild);
    assert_eq!(SpillState::StoreAtDefinition, intervals.spill_state(id));
    assert!(intervals.always_in_memory(grandchild));

    intervals.change_spill_state(id);
    assert_eq!(SpillState::StoreAtDefinition, intervals.spill_state(id));
}

#[test]
fn test_spill_state_transitions() {
    let mut intervals = Intervals::new();
    let id = create_interval(&mut intervals, 0, &[(0, 30)]);
    assert_eq!(SpillState::NoDefinitionFound, intervals.spill_state(id));

    intervals.record_definition(id, 10);
    assert_eq!(SpillState::NoSpillStore, intervals.spill_state(id));
    assert_eq!(Some(10), intervals.spill_definition_position(id));

    intervals.record_definition(id, 8);
    assert_eq!(SpillState::NoSpillStore, intervals.spill_state(id));
    assert_eq!(Some(8), intervals.spill_definition_position(id));

    intervals.record_definition(id, 2);
    assert_eq!(SpillState::NoOptimization, intervals.spill_state(id));
    assert!(!intervals.always_in_memory(id));

    let child = intervals.split(id, 20).unwrap();
    intervals.set_spill_slot(child, StackSlot::new(8));
    assert_eq!(Some(StackSlot::new(8)), intervals.spill_slot(id));

    let stack = intervals.create_stack(LiveValue::reference(1), StackSlot::new(0));
    intervals.change_spill_state(stack);
    assert_eq!(SpillState::StartInMemory, intervals.spill_state(stack));
    assert!(intervals.always_in_memory(stack));
    assert_eq!(RegisterBinding::Stack, intervals[stack].binding());
}
