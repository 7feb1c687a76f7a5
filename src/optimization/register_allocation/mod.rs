use iced_x86::Register;
use rustc_hash::FxHashMap;

use crate::model::Position;
use crate::model::location::{Location, StackSlot};
use crate::model::value::ValueId;
use crate::optimization::register_allocation::interval::{IntervalId, Intervals, Range};

pub mod interval;
pub mod binding_lists;
pub mod walker;
pub mod linear_scan;

#[derive(Debug, Clone, PartialEq)]
pub enum AllocatedRegister {
    Hardware { register: Register, interval: IntervalId, ranges: Vec<Range> },
    Stack { slot: StackSlot, interval: IntervalId, ranges: Vec<Range> }
}

impl AllocatedRegister {
    pub fn interval(&self) -> IntervalId {
        match self {
            AllocatedRegister::Hardware { interval, .. } => *interval,
            AllocatedRegister::Stack { interval, .. } => *interval
        }
    }

    pub fn ranges(&self) -> &[Range] {
        match self {
            AllocatedRegister::Hardware { ranges, .. } => ranges,
            AllocatedRegister::Stack { ranges, .. } => ranges
        }
    }

    pub fn is_stack(&self) -> bool {
        match self {
            AllocatedRegister::Hardware { .. } => false,
            AllocatedRegister::Stack { .. } => true
        }
    }

    pub fn hardware_register(&self) -> Option<Register> {
        match self {
            AllocatedRegister::Hardware { register, .. } => Some(*register),
            AllocatedRegister::Stack { .. } => None
        }
    }

    pub fn location(&self) -> Location {
        match self {
            AllocatedRegister::Hardware { register, .. } => Location::Register(*register),
            AllocatedRegister::Stack { slot, .. } => Location::Stack(*slot)
        }
    }

    pub fn covers(&self, position: Position) -> bool {
        self.ranges().iter().any(|range| range.covers(position))
    }
}

/// Where each value lives over its lifetime, one entry per interval that received a location.
pub struct RegisterAllocation {
    values: FxHashMap<ValueId, Vec<AllocatedRegister>>,
    frame_size: i32
}

impl RegisterAllocation {
    pub fn new(intervals: &Intervals, frame_size: i32) -> RegisterAllocation {
        let mut values = FxHashMap::default();
        for interval in intervals.iter() {
            let (value, location) = match (interval.value(), interval.location()) {
                (Some(value), Some(location)) => (value, location),
                _ => continue
            };

            let ranges = interval.ranges().to_vec();
            let allocated = match location {
                Location::Register(register) => AllocatedRegister::Hardware { register, interval: interval.id(), ranges },
                Location::Stack(slot) => AllocatedRegister::Stack { slot, interval: interval.id(), ranges }
            };

            values.entry(value.id).or_insert_with(Vec::new).push(allocated);
        }

        for parts in values.values_mut() {
            parts.sort_by_key(|part| part.ranges().first().map(|range| range.from));
        }

        RegisterAllocation {
            values,
            frame_size
        }
    }

    pub fn num_allocated_registers(&self) -> usize {
        self.parts().filter(|part| part.hardware_register().is_some()).count()
    }

    pub fn num_spilled_registers(&self) -> usize {
        self.parts().filter(|part| part.is_stack()).count()
    }

    pub fn frame_size(&self) -> i32 {
        self.frame_size
    }

    pub fn get(&self, value: ValueId) -> &[AllocatedRegister] {
        self.values.get(&value).map(|parts| parts.as_slice()).unwrap_or(&[])
    }

    pub fn location_at(&self, value: ValueId, position: Position) -> Option<Location> {
        self.get(value)
            .iter()
            .find(|part| part.covers(position))
            .map(|part| part.location())
    }

    pub fn alive_registers_at(&self, position: Position) -> Vec<(ValueId, Register)> {
        let mut registers = self.values
            .iter()
            .flat_map(|(value, parts)| parts.iter().map(move |part| (*value, part)))
            .filter(|(_, part)| part.covers(position))
            .filter_map(|(value, part)| part.hardware_register().map(|register| (value, register)))
            .collect::<Vec<_>>();

        registers.sort_by_key(|(value, _)| *value);
        registers
    }

    pub fn alive_hardware_registers_at(&self, position: Position) -> Vec<Register> {
        self.alive_registers_at(position).iter().map(|(_, register)| *register).collect::<Vec<_>>()
    }

    pub fn print_allocation(&self) {
        let mut values = self.values.keys().cloned().collect::<Vec<_>>();
        values.sort();

        for value in values {
            for part in self.get(value) {
                let ranges = part.ranges().iter().map(|range| range.to_string()).collect::<Vec<_>>().join(",");
                println!("{}: {} {}", value, part.location(), ranges);
            }
        }

        println!("frame size: {}", self.frame_size);
    }

    fn parts(&self) -> impl Iterator<Item=&AllocatedRegister> {
        self.values.values().flat_map(|parts| parts.iter())
    }
}
