use iced_x86::Register;
use rustc_hash::FxHashMap;

use crate::analysis::live_value_set::LiveValueSet;
use crate::model::instruction::{Instruction, StateDescriptor, StateId};
use crate::model::location::{Location, StackSlot};

/// The locations holding live references at one state descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    registers: Vec<Register>,
    stack_slots: Vec<StackSlot>
}

impl ReferenceMap {
    pub fn new() -> ReferenceMap {
        ReferenceMap {
            registers: Vec::new(),
            stack_slots: Vec::new()
        }
    }

    pub fn from_live_values(live_values: &LiveValueSet) -> ReferenceMap {
        let mut reference_map = ReferenceMap::new();
        for (location, value) in live_values.iter() {
            if value.kind.is_reference() {
                reference_map.add(location);
            }
        }

        reference_map.registers.sort();
        reference_map.stack_slots.sort();
        reference_map
    }

    fn add(&mut self, location: Location) {
        match location {
            Location::Register(register) => self.registers.push(register),
            Location::Stack(slot) => self.stack_slots.push(slot)
        }
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn stack_slots(&self) -> &[StackSlot] {
        &self.stack_slots
    }

    pub fn contains(&self, location: &Location) -> bool {
        match location {
            Location::Register(register) => self.registers.contains(register),
            Location::Stack(slot) => self.stack_slots.contains(slot)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.stack_slots.is_empty()
    }
}

/// Collects one reference map per state descriptor reported by the liveness propagator.
#[derive(Debug, Default)]
pub struct ReferenceMapBuilder {
    maps: FxHashMap<StateId, ReferenceMap>
}

impl ReferenceMapBuilder {
    pub fn new() -> ReferenceMapBuilder {
        ReferenceMapBuilder {
            maps: FxHashMap::default()
        }
    }

    pub fn record(&mut self, _instruction: &Instruction, state: &StateDescriptor, live_values: &LiveValueSet) {
        self.maps.insert(state.id, ReferenceMap::from_live_values(live_values));
    }

    pub fn get(&self, state: StateId) -> Option<&ReferenceMap> {
        self.maps.get(&state)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn into_maps(self) -> FxHashMap<StateId, ReferenceMap> {
        self.maps
    }
}

#[test]
fn test_only_references_are_roots() {
    use crate::compiler::calling_conventions::RegisterConfig;
    use crate::model::value::LiveValue;

    let config = RegisterConfig::x64();
    let mut live_values = LiveValueSet::new(&config);
    live_values.put(Location::Register(Register::RBX), LiveValue::reference(1));
    live_values.put(Location::Register(Register::RAX), LiveValue::reference(2));
    live_values.put(Location::Register(Register::RCX), LiveValue::int(3));
    live_values.put(Location::stack(8), LiveValue::reference(4));
    live_values.put(Location::stack(16), LiveValue::int(5));

    let reference_map = ReferenceMap::from_live_values(&live_values);

    assert_eq!(&[Register::RAX, Register::RBX], reference_map.registers());
    assert_eq!(&[StackSlot::new(8)], reference_map.stack_slots());
    assert!(!reference_map.contains(&Location::Register(Register::RCX)));
}

#[test]
fn test_builder_keeps_latest_map() {
    use crate::compiler::calling_conventions::RegisterConfig;
    use crate::model::value::LiveValue;

    let config = RegisterConfig::x64();
    let instruction = Instruction::new(0, "call");
    let state = StateDescriptor::new(7);
    let mut builder = ReferenceMapBuilder::new();

    let mut live_values = LiveValueSet::new(&config);
    builder.record(&instruction, &state, &live_values);
    assert!(builder.get(StateId(7)).unwrap().is_empty());

    live_values.put(Location::Register(Register::R12), LiveValue::reference(1));
    builder.record(&instruction, &state, &live_values);

    assert_eq!(1, builder.len());
    assert!(builder.get(StateId(7)).unwrap().contains(&Location::Register(Register::R12)));
}
