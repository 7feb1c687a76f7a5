use iced_x86::Register;
use log::{debug, trace};

use crate::compiler::Settings;
use crate::compiler::calling_conventions::RegisterConfig;
use crate::compiler::stack_layout::StackSlotAllocator;
use crate::error::AllocationResult;
use crate::model::{MAX_POSITION, Position};
use crate::model::location::{Location, RegisterClass};
use crate::optimization::register_allocation::RegisterAllocation;
use crate::optimization::register_allocation::interval::{IntervalId, Intervals, RegisterBinding};
use crate::optimization::register_allocation::walker::{ActivationPolicy, IntervalWalker};

/// Assigns a register or a stack slot to every interval the walker activates.
pub struct LinearScanPolicy<'c> {
    config: &'c RegisterConfig,
    stack_slots: StackSlotAllocator,
    num_splits: usize,
    num_spills: usize
}

impl<'c> LinearScanPolicy<'c> {
    pub fn new(config: &'c RegisterConfig) -> LinearScanPolicy<'c> {
        LinearScanPolicy::with_stack_slots(config, StackSlotAllocator::new())
    }

    pub fn with_stack_slots(config: &'c RegisterConfig, stack_slots: StackSlotAllocator) -> LinearScanPolicy<'c> {
        LinearScanPolicy {
            config,
            stack_slots,
            num_splits: 0,
            num_spills: 0
        }
    }

    pub fn num_splits(&self) -> usize {
        self.num_splits
    }

    pub fn num_spills(&self) -> usize {
        self.num_spills
    }

    pub fn frame_size(&self) -> i32 {
        self.stack_slots.frame_size()
    }

    /// Tries to find a register that is free at the current position. If it is only free for a
    /// prefix of the interval, the rest is split off and handled later.
    fn allocate_free_register(&mut self, walker: &mut IntervalWalker<'_>, current: IntervalId) -> AllocationResult<bool> {
        let position = walker.current_position();
        let free_registers = collect_free_registers(self.config, walker, current, true);

        let intervals = walker.intervals();
        let current_to = intervals[current].to();
        let hint = intervals
            .location_hint(current, true)
            .and_then(|hint| intervals[hint].register());

        let (register, free_until) = match free_registers.select(hint, current_to) {
            Some((register, free_until)) if free_until > position => (register, free_until),
            _ => return Ok(false)
        };

        if free_until < current_to {
            let child = walker.intervals_mut().split(current, free_until)?;
            walker.add_to_unhandled(child);
            self.num_splits += 1;
            trace!("{} split at {}, {} continues", current, free_until, child);
        }

        walker.intervals_mut()[current].assign_location(Location::Register(register));
        trace!("{} assigned {:?}", current, register);
        Ok(true)
    }

    /// No register is free: takes the register of the active interval that ends furthest away,
    /// sending its remainder to the stack, or spills the current interval if it ends last.
    fn allocate_blocked_register(&mut self, walker: &mut IntervalWalker<'_>, current: IntervalId) -> AllocationResult<()> {
        let position = walker.current_position();
        let blocked_registers = collect_free_registers(self.config, walker, current, false);

        let intervals = walker.intervals();
        let current_to = intervals[current].to();
        let spill = walker
            .active(RegisterBinding::Any)
            .into_iter()
            .filter(|&id| {
                let interval = &intervals[id];
                let takeable = interval.register()
                    .map(|register| blocked_registers.free_until(register) >= current_to)
                    .unwrap_or(false);

                takeable && interval.from() < position
            })
            .fold(None, |furthest: Option<IntervalId>, id| {
                match furthest {
                    Some(furthest) if intervals[furthest].to() >= intervals[id].to() => Some(furthest),
                    _ => Some(id)
                }
            });

        let spill = spill.and_then(|id| {
            let interval = &intervals[id];
            match interval.register() {
                Some(register) if interval.to() > current_to => Some((id, register)),
                _ => None
            }
        });

        match spill {
            Some((spill, register)) => {
                let child = walker.intervals_mut().split(spill, position)?;
                walker.remove_from_list(spill)?;
                self.spill_to_stack(walker.intervals_mut(), child);
                walker.add_to_unhandled(child);
                self.num_splits += 1;

                walker.intervals_mut()[current].assign_location(Location::Register(register));
                trace!("{} takes {:?} from {}, {} spilled", current, register, spill, child);
            }
            None => {
                self.spill_to_stack(walker.intervals_mut(), current);
                trace!("{} spilled", current);
            }
        }

        Ok(())
    }

    fn spill_to_stack(&mut self, intervals: &mut Intervals, interval: IntervalId) {
        let slot = match intervals.spill_slot(interval) {
            Some(slot) => slot,
            None => {
                let slot = self.stack_slots.allocate();
                intervals.set_spill_slot(interval, slot);
                slot
            }
        };

        intervals.change_spill_state(interval);

        let interval = &mut intervals[interval];
        interval.assign_location(Location::Stack(slot));
        interval.set_binding(RegisterBinding::Stack);
        self.num_spills += 1;
    }
}

impl<'c> ActivationPolicy for LinearScanPolicy<'c> {
    fn activate_current(&mut self, walker: &mut IntervalWalker<'_>, current: IntervalId) -> AllocationResult<bool> {
        if walker.intervals()[current].location().is_some() {
            return Ok(true);
        }

        if !self.allocate_free_register(walker, current)? {
            self.allocate_blocked_register(walker, current)?;
        }

        Ok(true)
    }
}

/// For each register of one class, the position up to which it is free.
struct FreeRegisters {
    free_until: Vec<(Register, Position)>
}

impl FreeRegisters {
    pub fn new(config: &RegisterConfig, class: RegisterClass) -> FreeRegisters {
        FreeRegisters {
            free_until: config.allocatable_of_class(class).map(|register| (register, MAX_POSITION)).collect()
        }
    }

    pub fn block(&mut self, register: Register, position: Position) {
        if let Some(entry) = self.free_until.iter_mut().find(|(entry, _)| *entry == register) {
            entry.1 = entry.1.min(position);
        }
    }

    pub fn free_until(&self, register: Register) -> Position {
        self.free_until
            .iter()
            .find(|(entry, _)| *entry == register)
            .map(|(_, position)| *position)
            .unwrap_or(0)
    }

    /// The hinted register if it is free long enough, otherwise the one that stays free longest.
    pub fn select(&self, hint: Option<Register>, needed_until: Position) -> Option<(Register, Position)> {
        if let Some(hint) = hint {
            let free_until = self.free_until(hint);
            if free_until >= needed_until {
                return Some((hint, free_until));
            }
        }

        let mut best: Option<(Register, Position)> = None;
        for &(register, free_until) in &self.free_until {
            if best.map(|(_, best_until)| free_until > best_until).unwrap_or(true) {
                best = Some((register, free_until));
            }
        }

        best
    }
}

/// Active intervals block their register at the current position, inactive and not yet handled
/// fixed intervals from where they intersect `current`. With `include_active_any` false, only
/// the constraints that can not be moved out of the way are collected.
fn collect_free_registers(config: &RegisterConfig,
                          walker: &IntervalWalker<'_>,
                          current: IntervalId,
                          include_active_any: bool) -> FreeRegisters {
    let position = walker.current_position();
    let intervals = walker.intervals();
    let interval = &intervals[current];
    let mut free_registers = FreeRegisters::new(config, interval.register_class());

    for &binding in &RegisterBinding::VALUES {
        if binding == RegisterBinding::Any && !include_active_any {
            continue;
        }

        for id in walker.active_lists().iter(intervals, binding) {
            if let Some(register) = intervals[id].register() {
                free_registers.block(register, position);
            }
        }
    }

    let mut constraints = walker.unhandled_lists()
        .iter(intervals, RegisterBinding::Fixed)
        .collect::<Vec<_>>();

    for &binding in &RegisterBinding::VALUES {
        constraints.extend(walker.inactive_lists().iter(intervals, binding));
    }

    for id in constraints {
        let other = &intervals[id];
        if let Some(register) = other.register() {
            if let Some(intersection) = other.current_intersects_at(interval) {
                free_registers.block(register, intersection);
            }
        }
    }

    free_registers
}

/// Walks all intervals and assigns each a register or a stack slot.
pub fn allocate(intervals: &mut Intervals, max_position: Position, settings: &Settings) -> AllocationResult<RegisterAllocation> {
    let mut policy = LinearScanPolicy::new(&settings.register_config);

    {
        let mut walker = IntervalWalker::from_intervals(intervals, max_position, settings.detailed_asserts);
        walker.walk_to(max_position, &mut policy)?;
    }

    if settings.detailed_asserts {
        for interval in intervals.iter().filter(|interval| interval.is_split_parent()) {
            intervals.check_split_children(interval.id())?;
        }
    }

    debug!(
        "allocated {} intervals with {} splits and {} spills, frame size {}",
        intervals.len(),
        policy.num_splits(),
        policy.num_spills(),
        policy.frame_size()
    );

    Ok(RegisterAllocation::new(intervals, policy.frame_size()))
}

#[cfg(test)]
use crate::model::value::{LiveValue, ValueId, ValueKind};
#[cfg(test)]
use crate::optimization::register_allocation::interval::{IntervalState, SpillState};

#[cfg(test)]
fn create_settings(allocatable: Vec<Register>) -> Settings {
    Settings {
        register_config: RegisterConfig::new(allocatable.clone(), allocatable),
        max_liveness_iterations: 1000,
        detailed_asserts: true
    }
}

#[cfg(test)]
fn assert_no_shared_registers(allocation: &RegisterAllocation, intervals: &Intervals, max_position: Position) {
    for position in 0..max_position {
        let mut registers = allocation.alive_hardware_registers_at(position);
        let count = registers.len();
        registers.sort();
        registers.dedup();
        assert_eq!(count, registers.len(), "register shared at {}", position);

        for fixed in intervals.iter().filter(|interval| interval.is_fixed()) {
            let covered = fixed.ranges().iter().any(|range| range.covers(position));
            if let (true, Some(register)) = (covered, fixed.register()) {
                assert!(!registers.contains(&register), "{:?} used while fixed at {}", register, position);
            }
        }
    }
}

#[cfg(test)]
fn create_variable(intervals: &mut Intervals, value: LiveValue, ranges: &[(Position, Position)]) -> IntervalId {
    let id = intervals.create_variable(value);
    for &(from, to) in ranges.iter().rev() {
        intervals[id].add_range(from, to);
    }

    id
}

#[test]
fn test_allocate1() {
    let mut intervals = Intervals::new();
    let value = create_variable(&mut intervals, LiveValue::int(0), &[(0, 20)]);
    create_variable(&mut intervals, LiveValue::int(1), &[(4, 10)]);
    intervals.record_definition(value, 0);

    let allocation = allocate(&mut intervals, 20, &create_settings(vec![Register::RAX])).unwrap();
    assert_eq!(SpillState::OneSpillStore, intervals.spill_state(value));

    assert_eq!(2, allocation.num_allocated_registers());
    assert_eq!(1, allocation.num_spilled_registers());

    assert_eq!(Some(Location::Register(Register::RAX)), allocation.location_at(ValueId(0), 2));
    assert!(allocation.location_at(ValueId(0), 6).map(|location| location.is_stack()).unwrap_or(false));
    assert_eq!(Some(Location::Register(Register::RAX)), allocation.location_at(ValueId(1), 6));
    assert_eq!(vec![Register::RAX], allocation.alive_hardware_registers_at(6));
    assert_eq!(8, allocation.frame_size());

    allocation.print_allocation();
}

#[test]
fn test_allocate2() {
    let mut intervals = Intervals::new();
    create_variable(&mut intervals, LiveValue::int(0), &[(0, 10)]);
    create_variable(&mut intervals, LiveValue::int(1), &[(4, 30)]);

    let allocation = allocate(&mut intervals, 30, &create_settings(vec![Register::RAX])).unwrap();

    assert_eq!(1, allocation.num_allocated_registers());
    assert_eq!(1, allocation.num_spilled_registers());
    assert_eq!(Some(Location::Register(Register::RAX)), allocation.location_at(ValueId(0), 6));
    assert!(allocation.get(ValueId(1))[0].is_stack());
}

#[test]
fn test_allocate_float() {
    let mut intervals = Intervals::new();
    create_variable(&mut intervals, LiveValue::new(0, ValueKind::Float), &[(0, 10)]);
    create_variable(&mut intervals, LiveValue::int(1), &[(0, 10)]);

    let allocation = allocate(&mut intervals, 10, &create_settings(vec![Register::RAX, Register::XMM0])).unwrap();

    assert_eq!(2, allocation.num_allocated_registers());
    assert_eq!(Some(Location::Register(Register::XMM0)), allocation.location_at(ValueId(0), 4));
    assert_eq!(Some(Location::Register(Register::RAX)), allocation.location_at(ValueId(1), 4));
}

#[test]
fn test_avoids_fixed_interval() {
    let mut intervals = Intervals::new();
    let fixed = intervals.create_fixed(Register::RAX);
    intervals[fixed].add_range(8, 12);
    create_variable(&mut intervals, LiveValue::int(0), &[(0, 20)]);

    let allocation = allocate(&mut intervals, 20, &create_settings(vec![Register::RAX, Register::RBX])).unwrap();

    assert_eq!(1, allocation.num_allocated_registers());
    assert_eq!(Some(Location::Register(Register::RBX)), allocation.location_at(ValueId(0), 10));
}

#[test]
fn test_split_before_fixed_interval() {
    let mut intervals = Intervals::new();
    let fixed = intervals.create_fixed(Register::RAX);
    intervals[fixed].add_range(8, 12);
    let value = create_variable(&mut intervals, LiveValue::int(0), &[(0, 20)]);

    let allocation = allocate(&mut intervals, 20, &create_settings(vec![Register::RAX])).unwrap();

    assert_eq!(Some(Location::Register(Register::RAX)), allocation.location_at(ValueId(0), 4));
    assert!(allocation.location_at(ValueId(0), 10).map(|location| location.is_stack()).unwrap_or(false));
    assert_eq!(2, intervals[value].split_children().len());
}

#[test]
fn test_prefers_hint() {
    let mut intervals = Intervals::new();
    create_variable(&mut intervals, LiveValue::int(0), &[(0, 6)]);
    let hint = create_variable(&mut intervals, LiveValue::int(1), &[(2, 8)]);
    let value = create_variable(&mut intervals, LiveValue::int(2), &[(8, 12)]);
    intervals[value].set_location_hint(hint);

    let allocation = allocate(&mut intervals, 12, &create_settings(vec![Register::RAX, Register::RBX])).unwrap();

    assert_eq!(Some(Location::Register(Register::RAX)), allocation.location_at(ValueId(0), 2));
    assert_eq!(Some(Location::Register(Register::RBX)), allocation.location_at(ValueId(1), 4));
    assert_eq!(Some(Location::Register(Register::RBX)), allocation.location_at(ValueId(2), 10));
}

#[test]
fn test_never_shares_register() {
    let mut intervals = Intervals::new();
    let ranges: &[&[(Position, Position)]] = &[
        &[(0, 14)],
        &[(2, 6), (10, 22)],
        &[(4, 30)],
        &[(6, 10)],
        &[(12, 26)],
        &[(16, 20), (24, 28)]
    ];

    for (index, value_ranges) in ranges.iter().enumerate() {
        create_variable(&mut intervals, LiveValue::int(index as u32), value_ranges);
    }

    let allocation = allocate(&mut intervals, 30, &create_settings(vec![Register::RAX, Register::RBX])).unwrap();

    for position in 0..30 {
        let mut registers = allocation.alive_hardware_registers_at(position);
        let count = registers.len();
        registers.sort();
        registers.dedup();
        assert_eq!(count, registers.len(), "register shared at {}", position);
    }

    for (index, value_ranges) in ranges.iter().enumerate() {
        for &(from, to) in value_ranges.iter() {
            for position in from..to {
                assert!(allocation.location_at(ValueId(index as u32), position).is_some(), "v{} has no location at {}", index, position);
            }
        }
    }
}

#[test]
fn test_evicted_interval_is_retired() {
    for allocatable in vec![vec![Register::RAX, Register::RBX], vec![Register::RAX]] {
        let mut intervals = Intervals::new();
        let ranges: &[&[(Position, Position)]] = &[
            &[(6, 16), (18, 28)],
            &[(18, 26)],
            &[(0, 12), (18, 28)],
            &[(22, 34)]
        ];

        for (index, value_ranges) in ranges.iter().enumerate() {
            create_variable(&mut intervals, LiveValue::int(index as u32), value_ranges);
        }

        let allocation = allocate(&mut intervals, 80, &create_settings(allocatable)).unwrap();

        for interval in intervals.iter() {
            assert_eq!(IntervalState::Handled, interval.state(), "{} not handled", interval.id());
        }

        assert_no_shared_registers(&allocation, &intervals, 34);
    }
}

/// Linear congruential generator, enough to get reproducible interval shapes.
#[cfg(test)]
struct ShapeGenerator(u64);

#[cfg(test)]
impl ShapeGenerator {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) % bound as u64) as usize
    }

    /// Ascending, disjoint ranges on even positions below `max_position`.
    fn ranges(&mut self, max_position: Position, max_ranges: usize) -> Vec<(Position, Position)> {
        let mut ranges = Vec::new();
        let mut position = self.next(max_position / 4) * 2;
        for _ in 0..(1 + self.next(max_ranges)) {
            let from = position;
            let to = from + 2 + self.next(8) * 2;
            if to > max_position {
                break;
            }

            ranges.push((from, to));
            position = to + 2 + self.next(4) * 2;
        }

        ranges
    }
}

#[test]
fn test_generated_intervals() {
    let max_position = 64;
    let allocatable = vec![Register::RAX, Register::RBX, Register::RCX];

    for seed in 0..200 {
        let mut generator = ShapeGenerator(seed);
        let mut intervals = Intervals::new();

        for &register in &allocatable[..2] {
            let ranges = generator.ranges(max_position, 2);
            if ranges.is_empty() || generator.next(2) == 0 {
                continue;
            }

            let fixed = intervals.create_fixed(register);
            for &(from, to) in ranges.iter().rev() {
                intervals[fixed].add_range(from, to);
            }
        }

        let mut values = Vec::new();
        for index in 0..(1 + generator.next(8)) {
            let ranges = generator.ranges(max_position, 3);
            if ranges.is_empty() {
                continue;
            }

            create_variable(&mut intervals, LiveValue::int(index as u32), &ranges);
            values.push((ValueId(index as u32), ranges));
        }

        let allocation = allocate(&mut intervals, max_position + 2, &create_settings(allocatable.clone()))
            .unwrap_or_else(|error| panic!("seed {}: {:?}", seed, error));

        for interval in intervals.iter() {
            assert_eq!(IntervalState::Handled, interval.state(), "seed {}: {} not handled", seed, interval.id());
        }

        assert_no_shared_registers(&allocation, &intervals, max_position);

        for (value, ranges) in &values {
            for &(from, to) in ranges {
                for position in from..to {
                    assert!(allocation.location_at(*value, position).is_some(), "seed {}: {} has no location at {}", seed, value, position);
                }
            }
        }
    }
}
