use std::fmt;

use iced_x86::Register;
use rustc_hash::FxHashMap;

use crate::compiler::calling_conventions::RegisterConfig;
use crate::error::{AllocationError, AllocationErrorMessage, AllocationResult};
use crate::model::location::{Location, StackSlot};
use crate::model::value::LiveValue;

/// Values indexed by a dense location number. Trailing empty entries do not affect equality.
#[derive(Debug, Clone, Default)]
pub struct IndexedValueMap {
    values: Vec<Option<LiveValue>>
}

impl IndexedValueMap {
    pub fn new() -> IndexedValueMap {
        IndexedValueMap {
            values: Vec::new()
        }
    }

    pub fn get(&self, index: usize) -> Option<LiveValue> {
        self.values.get(index).cloned().flatten()
    }

    pub fn put(&mut self, index: usize, value: Option<LiveValue>) {
        if index >= self.values.len() {
            if value.is_none() {
                return;
            }

            self.values.resize(index + 1, None);
        }

        self.values[index] = value;
    }

    pub fn put_all(&mut self, other: &IndexedValueMap) {
        if other.values.len() > self.values.len() {
            self.values.resize(other.values.len(), None);
        }

        for (index, value) in other.values.iter().enumerate() {
            if value.is_some() {
                self.values[index] = *value;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item=(usize, LiveValue)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(index, value)| value.map(|value| (index, value)))
    }

    pub fn len(&self) -> usize {
        self.values.iter().filter(|value| value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|value| value.is_none())
    }
}

impl PartialEq for IndexedValueMap {
    fn eq(&self, other: &Self) -> bool {
        let length = self.values.len().max(other.values.len());
        (0..length).all(|index| self.get(index) == other.get(index))
    }
}

impl Eq for IndexedValueMap {}

/// Stack entries beyond this index go to the sparse map, so a large frame offset does not grow
/// every set.
const MAX_DENSE_STACK_ENTRIES: usize = 256;

/// The values occupying physical locations at one program point.
///
/// Registers and the first stack slots on a stack entry boundary are kept in dense maps, other
/// stack offsets in a sparse overflow map. Only allocatable registers and values of a legal kind are
/// tracked; everything else is silently skipped by `put` and `remove`.
#[derive(Clone)]
pub struct LiveValueSet<'a> {
    config: &'a RegisterConfig,
    registers: IndexedValueMap,
    stack: IndexedValueMap,
    extra_stack: FxHashMap<i32, LiveValue>
}

impl<'a> LiveValueSet<'a> {
    pub fn new(config: &'a RegisterConfig) -> LiveValueSet<'a> {
        LiveValueSet {
            config,
            registers: IndexedValueMap::new(),
            stack: IndexedValueMap::new(),
            extra_stack: FxHashMap::default()
        }
    }

    pub fn should_track(&self, location: &Location, value: &LiveValue) -> bool {
        if value.kind.is_illegal() {
            return false;
        }

        self.is_tracked_location(location)
    }

    fn is_tracked_location(&self, location: &Location) -> bool {
        match location {
            Location::Register(register) => self.config.is_allocatable(*register),
            Location::Stack(slot) => slot.offset >= 0
        }
    }

    pub fn get(&self, location: &Location) -> Option<LiveValue> {
        match location {
            Location::Register(register) => {
                self.config.register_index(*register).and_then(|index| self.registers.get(index))
            }
            Location::Stack(slot) => {
                match dense_stack_index(slot) {
                    Some(index) => self.stack.get(index),
                    None => self.extra_stack.get(&slot.offset).cloned()
                }
            }
        }
    }

    pub fn put(&mut self, location: Location, value: LiveValue) {
        if !self.should_track(&location, &value) {
            return;
        }

        self.set(&location, Some(value));
    }

    /// Clears a location that is defined with `value`.
    pub fn remove(&mut self, location: Location, value: LiveValue) -> AllocationResult<()> {
        if !self.should_track(&location, &value) {
            return Ok(());
        }

        if let Some(stored) = self.get(&location) {
            if !stored.is_compatible(&value) {
                return Err(AllocationError::new(AllocationErrorMessage::InconsistentValue {
                    location,
                    stored,
                    removed: value
                }));
            }
        }

        self.set(&location, None);
        Ok(())
    }

    /// Clears a location regardless of what it holds, e.g. a register destroyed by a call.
    pub fn kill(&mut self, location: Location) {
        if self.is_tracked_location(&location) {
            self.set(&location, None);
        }
    }

    fn set(&mut self, location: &Location, value: Option<LiveValue>) {
        match location {
            Location::Register(register) => {
                if let Some(index) = self.config.register_index(*register) {
                    self.registers.put(index, value);
                }
            }
            Location::Stack(slot) => {
                match (dense_stack_index(slot), value) {
                    (Some(index), _) => self.stack.put(index, value),
                    (None, Some(value)) => {
                        self.extra_stack.insert(slot.offset, value);
                    }
                    (None, None) => {
                        self.extra_stack.remove(&slot.offset);
                    }
                }
            }
        }
    }

    /// Merges all bindings of `other` into this set, the values of `other` winning on conflicts.
    pub fn put_all(&mut self, other: &LiveValueSet) {
        self.registers.put_all(&other.registers);
        self.stack.put_all(&other.stack);
        for (offset, value) in &other.extra_stack {
            self.extra_stack.insert(*offset, *value);
        }
    }

    pub fn union(&self, other: &LiveValueSet) -> LiveValueSet<'a> {
        let mut result = self.clone();
        result.put_all(other);
        result
    }

    pub fn contains_value(&self, value: &LiveValue) -> bool {
        self.iter().any(|(_, live_value)| &live_value == value)
    }

    pub fn iter(&self) -> impl Iterator<Item=(Location, LiveValue)> + '_ {
        let registers = self.registers
            .iter()
            .map(move |(index, value)| (Location::Register(self.config.register_at(index)), value));

        let stack = self.stack
            .iter()
            .map(|(index, value)| (Location::Stack(StackSlot::from_aligned_index(index)), value));

        let extra_stack = self.extra_stack
            .iter()
            .map(|(offset, value)| (Location::stack(*offset), *value));

        registers.chain(stack).chain(extra_stack)
    }

    pub fn registers(&self) -> impl Iterator<Item=(Register, LiveValue)> + '_ {
        self.registers
            .iter()
            .map(move |(index, value)| (self.config.register_at(index), value))
    }

    pub fn len(&self) -> usize {
        self.registers.len() + self.stack.len() + self.extra_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.stack.is_empty() && self.extra_stack.is_empty()
    }
}

impl<'a> PartialEq for LiveValueSet<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.registers == other.registers
        && self.stack == other.stack
        && self.extra_stack == other.extra_stack
    }
}

impl<'a> Eq for LiveValueSet<'a> {}

impl<'a> fmt::Debug for LiveValueSet<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries = self.iter().collect::<Vec<_>>();
        entries.sort_by_key(|(location, _)| *location);

        write!(f, "{{")?;
        for (index, (location, value)) in entries.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }

            write!(f, "{}: {}", location, value)?;
        }
        write!(f, "}}")
    }
}

fn dense_stack_index(slot: &StackSlot) -> Option<usize> {
    slot.aligned_index().filter(|&index| index < MAX_DENSE_STACK_ENTRIES)
}

#[test]
fn test_large_stack_offset() {
    let config = RegisterConfig::x64();
    let mut set = LiveValueSet::new(&config);

    let far = Location::stack(1 << 24);
    set.put(far, LiveValue::int(1));

    assert_eq!(Some(LiveValue::int(1)), set.get(&far));
    assert!(set.stack.values.is_empty());
    assert_eq!(vec![(far, LiveValue::int(1))], set.iter().collect::<Vec<_>>());

    set.remove(far, LiveValue::int(1)).unwrap();
    assert!(set.is_empty());
}

#[test]
fn test_put_and_get() {
    let config = RegisterConfig::x64();
    let mut set = LiveValueSet::new(&config);

    set.put(Location::Register(Register::RAX), LiveValue::reference(1));
    set.put(Location::stack(16), LiveValue::int(2));
    set.put(Location::stack(12), LiveValue::int(3));

    assert_eq!(Some(LiveValue::reference(1)), set.get(&Location::Register(Register::RAX)));
    assert_eq!(Some(LiveValue::int(2)), set.get(&Location::stack(16)));
    assert_eq!(Some(LiveValue::int(3)), set.get(&Location::stack(12)));
    assert_eq!(None, set.get(&Location::Register(Register::RBX)));
    assert_eq!(3, set.len());
}

#[test]
fn test_ignored_locations() {
    let config = RegisterConfig::x64();
    let mut set = LiveValueSet::new(&config);

    set.put(Location::Register(Register::RSP), LiveValue::reference(1));
    set.put(Location::Register(Register::RAX), LiveValue::new(2, crate::model::value::ValueKind::Illegal));
    set.put(Location::stack(-8), LiveValue::int(3));

    assert!(set.is_empty());
}

#[test]
fn test_overwrite() {
    let config = RegisterConfig::x64();
    let mut set = LiveValueSet::new(&config);

    set.put(Location::Register(Register::RCX), LiveValue::int(1));
    set.put(Location::Register(Register::RCX), LiveValue::int(2));

    assert_eq!(Some(LiveValue::int(2)), set.get(&Location::Register(Register::RCX)));
    assert_eq!(1, set.len());
}

#[test]
fn test_remove() {
    let config = RegisterConfig::x64();
    let mut set = LiveValueSet::new(&config);

    set.put(Location::Register(Register::RDX), LiveValue::int(1));
    set.put(Location::stack(4), LiveValue::int(2));

    set.remove(Location::Register(Register::RDX), LiveValue::int(1)).unwrap();
    set.remove(Location::stack(4), LiveValue::int(7)).unwrap();
    set.remove(Location::stack(8), LiveValue::reference(3)).unwrap();

    assert!(set.is_empty());
}

#[test]
fn test_remove_inconsistent_value() {
    let config = RegisterConfig::x64();
    let mut set = LiveValueSet::new(&config);

    set.put(Location::Register(Register::RSI), LiveValue::reference(1));
    let error = set.remove(Location::Register(Register::RSI), LiveValue::int(1)).unwrap_err();

    assert_eq!(
        AllocationErrorMessage::InconsistentValue {
            location: Location::Register(Register::RSI),
            stored: LiveValue::reference(1),
            removed: LiveValue::int(1)
        },
        error.message
    );

    assert_eq!(Some(LiveValue::reference(1)), set.get(&Location::Register(Register::RSI)));
}

#[test]
fn test_copy_is_independent() {
    let config = RegisterConfig::x64();
    let mut set = LiveValueSet::new(&config);
    set.put(Location::Register(Register::R8), LiveValue::int(1));

    let mut copy = set.clone();
    copy.put(Location::Register(Register::R9), LiveValue::int(2));
    copy.kill(Location::Register(Register::R8));

    assert_eq!(Some(LiveValue::int(1)), set.get(&Location::Register(Register::R8)));
    assert_eq!(None, set.get(&Location::Register(Register::R9)));
    assert_ne!(set, copy);
}

#[test]
fn test_put_all_last_writer_wins() {
    let config = RegisterConfig::x64();
    let mut first = LiveValueSet::new(&config);
    first.put(Location::Register(Register::RAX), LiveValue::int(1));
    first.put(Location::stack(0), LiveValue::int(2));

    let mut second = LiveValueSet::new(&config);
    second.put(Location::Register(Register::RAX), LiveValue::int(3));
    second.put(Location::stack(20), LiveValue::int(4));

    first.put_all(&second);

    assert_eq!(Some(LiveValue::int(3)), first.get(&Location::Register(Register::RAX)));
    assert_eq!(Some(LiveValue::int(2)), first.get(&Location::stack(0)));
    assert_eq!(Some(LiveValue::int(4)), first.get(&Location::stack(20)));
}

#[test]
fn test_structural_equality() {
    let config = RegisterConfig::x64();
    let mut first = LiveValueSet::new(&config);
    let mut second = LiveValueSet::new(&config);

    first.put(Location::Register(Register::XMM3), LiveValue::new(1, crate::model::value::ValueKind::Float));
    first.kill(Location::Register(Register::XMM3));
    assert_eq!(first, second);

    first.put(Location::stack(40), LiveValue::int(2));
    second.put(Location::stack(40), LiveValue::int(2));
    assert_eq!(first, second);

    second.put(Location::stack(40), LiveValue::int(3));
    assert_ne!(first, second);
}
