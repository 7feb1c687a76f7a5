use log::{debug, trace};

use crate::analysis::live_value_set::LiveValueSet;
use crate::compiler::calling_conventions::RegisterConfig;
use crate::error::{AllocationError, AllocationErrorMessage, AllocationResult};
use crate::model::Position;
use crate::optimization::register_allocation::binding_lists::RegisterBindingLists;
use crate::optimization::register_allocation::interval::{IntervalId, Intervals, IntervalState, RegisterBinding};

/// Decides what happens to an interval when the walker activates it.
pub trait ActivationPolicy {
    /// Called with `current` already marked active. Returning false drops it from tracking.
    fn activate_current(&mut self, _walker: &mut IntervalWalker<'_>, _current: IntervalId) -> AllocationResult<bool> {
        Ok(true)
    }

    fn interval_moved(&mut self, _intervals: &Intervals, _interval: IntervalId, _from: IntervalState, _to: IntervalState) {

    }
}

/// Accepts every interval without assigning anything.
pub struct AcceptAll;

impl ActivationPolicy for AcceptAll {

}

/// Sweeps over intervals in order of their start positions, keeping each interval's state
/// consistent with the current position.
pub struct IntervalWalker<'a> {
    intervals: &'a mut Intervals,
    unhandled_lists: RegisterBindingLists,
    active_lists: RegisterBindingLists,
    inactive_lists: RegisterBindingLists,
    current_position: Position,
    current_binding: Option<RegisterBinding>,
    max_position: Position,
    detailed_asserts: bool
}

impl<'a> IntervalWalker<'a> {
    pub fn new(intervals: &'a mut Intervals,
               unhandled_lists: RegisterBindingLists,
               max_position: Position,
               detailed_asserts: bool) -> IntervalWalker<'a> {
        IntervalWalker {
            intervals,
            unhandled_lists,
            active_lists: RegisterBindingLists::empty(),
            inactive_lists: RegisterBindingLists::empty(),
            current_position: 0,
            current_binding: None,
            max_position,
            detailed_asserts
        }
    }

    /// Walks every non-empty unhandled interval of the arena.
    pub fn from_intervals(intervals: &'a mut Intervals, max_position: Position, detailed_asserts: bool) -> IntervalWalker<'a> {
        let unhandled_lists = create_unhandled_lists(intervals);
        IntervalWalker::new(intervals, unhandled_lists, max_position, detailed_asserts)
    }

    pub fn intervals(&self) -> &Intervals {
        self.intervals
    }

    pub fn intervals_mut(&mut self) -> &mut Intervals {
        self.intervals
    }

    pub fn unhandled_lists(&self) -> &RegisterBindingLists {
        &self.unhandled_lists
    }

    pub fn active_lists(&self) -> &RegisterBindingLists {
        &self.active_lists
    }

    pub fn inactive_lists(&self) -> &RegisterBindingLists {
        &self.inactive_lists
    }

    pub fn current_position(&self) -> Position {
        self.current_position
    }

    /// The binding of the interval that was activated last.
    pub fn current_binding(&self) -> Option<RegisterBinding> {
        self.current_binding
    }

    pub fn max_position(&self) -> Position {
        self.max_position
    }

    pub fn active(&self, binding: RegisterBinding) -> Vec<IntervalId> {
        self.active_lists.iter(self.intervals, binding).collect()
    }

    pub fn inactive(&self, binding: RegisterBinding) -> Vec<IntervalId> {
        self.inactive_lists.iter(self.intervals, binding).collect()
    }

    pub fn unhandled(&self, binding: RegisterBinding) -> Vec<IntervalId> {
        self.unhandled_lists.iter(self.intervals, binding).collect()
    }

    /// Activates every unhandled interval starting at or before `to` and moves the active and
    /// inactive intervals along.
    pub fn walk_to<P: ActivationPolicy + ?Sized>(&mut self, to: Position, policy: &mut P) -> AllocationResult<()> {
        if to < self.current_position {
            return Err(AllocationError::with_position(
                to,
                AllocationErrorMessage::WalkingBackwards { current: self.current_position, requested: to }
            ));
        }

        while let Some(current) = self.next_interval(to) {
            let position = self.intervals[current].from();
            self.current_position = position;

            self.update_unhandled_stack_intervals(position, policy);
            self.walk_lists_to(IntervalState::Active, position, policy)?;
            self.walk_lists_to(IntervalState::Inactive, position, policy)?;

            self.intervals[current].state = IntervalState::Active;
            trace!("activating {} at {}", self.intervals[current], position);

            if policy.activate_current(self, current)? {
                let binding = self.intervals[current].binding();
                self.active_lists.add_to_list_sorted_by_current_from_positions(self.intervals, binding, current);
                policy.interval_moved(self.intervals, current, IntervalState::Unhandled, IntervalState::Active);
            } else if self.intervals[current].state == IntervalState::Active {
                self.intervals[current].state = IntervalState::Handled;
                policy.interval_moved(self.intervals, current, IntervalState::Unhandled, IntervalState::Handled);
            }
        }

        self.current_position = to;
        if self.current_position <= self.max_position {
            self.update_unhandled_stack_intervals(to, policy);
            self.walk_lists_to(IntervalState::Active, to, policy)?;
            self.walk_lists_to(IntervalState::Inactive, to, policy)?;
        }

        if self.detailed_asserts {
            self.unhandled_lists.check_sorted(self.intervals)?;
            self.active_lists.check_sorted(self.intervals)?;
            self.inactive_lists.check_sorted(self.intervals)?;
        }

        debug!("walked to {}", to);
        Ok(())
    }

    /// Pops the unhandled interval that starts first, if it starts at or before `to`. A fixed
    /// interval wins against an any interval starting at the same position.
    fn next_interval(&mut self, to: Position) -> Option<IntervalId> {
        let any = self.unhandled_lists.get(RegisterBinding::Any);
        let fixed = self.unhandled_lists.get(RegisterBinding::Fixed);

        let binding = match (any.is_end_marker(), fixed.is_end_marker()) {
            (true, true) => return None,
            (true, false) => RegisterBinding::Fixed,
            (false, true) => RegisterBinding::Any,
            (false, false) => {
                if self.intervals.from(fixed) <= self.intervals.from(any) {
                    RegisterBinding::Fixed
                } else {
                    RegisterBinding::Any
                }
            }
        };

        let current = self.unhandled_lists.get(binding);
        if to < self.intervals.from(current) {
            return None;
        }

        debug_assert_eq!(IntervalState::Unhandled, self.intervals[current].state, "{} is not unhandled", current);

        self.current_binding = Some(binding);
        let interval = &mut self.intervals[current];
        self.unhandled_lists.set(binding, interval.next);
        interval.next = IntervalId::END_MARKER;
        interval.rewind_range();
        Some(current)
    }

    /// Stack intervals need no register, so they go straight to active, or to handled when their
    /// lifetime already ended.
    fn update_unhandled_stack_intervals<P: ActivationPolicy + ?Sized>(&mut self, position: Position, policy: &mut P) {
        let mut current = self.unhandled_lists.get(RegisterBinding::Stack);
        while self.intervals.from(current) <= position {
            let next = self.intervals[current].next;
            self.intervals[current].next = IntervalId::END_MARKER;

            if self.intervals[current].to() > position {
                self.intervals[current].state = IntervalState::Active;
                self.active_lists.add_to_list_sorted_by_current_from_positions(self.intervals, RegisterBinding::Stack, current);
                policy.interval_moved(self.intervals, current, IntervalState::Unhandled, IntervalState::Active);
            } else {
                self.intervals[current].state = IntervalState::Handled;
                policy.interval_moved(self.intervals, current, IntervalState::Unhandled, IntervalState::Handled);
            }

            current = next;
        }

        self.unhandled_lists.set(RegisterBinding::Stack, current);
    }

    fn walk_lists_to<P: ActivationPolicy + ?Sized>(&mut self,
                                                    state: IntervalState,
                                                    position: Position,
                                                    policy: &mut P) -> AllocationResult<()> {
        for &binding in &RegisterBinding::VALUES {
            self.walk_list_to(state, position, binding, policy)?;
        }

        Ok(())
    }

    fn walk_list_to<P: ActivationPolicy + ?Sized>(&mut self,
                                                   state: IntervalState,
                                                   position: Position,
                                                   binding: RegisterBinding,
                                                   policy: &mut P) -> AllocationResult<()> {
        let list = match state {
            IntervalState::Active => &self.active_lists,
            _ => &self.inactive_lists
        };

        // active entries are all visited, an interval cut short by a split may be past its last range
        let intervals = &*self.intervals;
        let candidates = list
            .iter(intervals, binding)
            .take_while(|&id| state == IntervalState::Active || intervals.current_from(id) <= position)
            .collect::<Vec<_>>();

        for current in candidates {
            let interval = &mut self.intervals[current];

            let mut range_has_changed = false;
            while interval.current_to() <= position {
                interval.next_range();
                range_has_changed = true;
            }

            // an inactive interval whose next range has been reached becomes active again
            range_has_changed = range_has_changed
                || interval.current_at_end()
                || (state == IntervalState::Inactive && interval.current_from() <= position);
            if !range_has_changed {
                continue;
            }

            let new_state = if interval.current_at_end() {
                IntervalState::Handled
            } else if interval.current_from() <= position {
                IntervalState::Active
            } else {
                IntervalState::Inactive
            };
            interval.state = new_state;

            match state {
                IntervalState::Active => self.active_lists.remove(self.intervals, binding, current)?,
                _ => self.inactive_lists.remove(self.intervals, binding, current)?
            }

            match new_state {
                IntervalState::Active => self.active_lists.add_to_list_sorted_by_current_from_positions(self.intervals, binding, current),
                IntervalState::Inactive => self.inactive_lists.add_to_list_sorted_by_current_from_positions(self.intervals, binding, current),
                _ => {}
            }

            trace!("{} moved from {:?} to {:?} at {}", current, state, new_state, position);
            policy.interval_moved(self.intervals, current, state, new_state);
        }

        Ok(())
    }

    /// Adds an interval created while walking, usually a split child, to the unhandled lists.
    pub fn add_to_unhandled(&mut self, interval: IntervalId) {
        debug_assert_eq!(IntervalState::Unhandled, self.intervals[interval].state, "{} is not unhandled", interval);
        debug_assert!(self.intervals[interval].from() >= self.current_position, "{} starts before the current position", interval);

        match self.intervals[interval].binding() {
            RegisterBinding::Stack => {
                self.unhandled_lists.add_to_list_sorted_by_current_from_positions(self.intervals, RegisterBinding::Stack, interval);
            }
            binding => {
                self.unhandled_lists.add_to_list_sorted_by_start_and_use_positions(self.intervals, binding, interval);
            }
        }
    }

    /// Removes an active or inactive interval from its list and marks it handled.
    pub fn remove_from_list(&mut self, interval: IntervalId) -> AllocationResult<()> {
        let binding = self.intervals[interval].binding();
        match self.intervals[interval].state {
            IntervalState::Active => self.active_lists.remove(self.intervals, binding, interval)?,
            IntervalState::Inactive => self.inactive_lists.remove(self.intervals, binding, interval)?,
            _ => {
                return Err(AllocationError::new(AllocationErrorMessage::IntervalNotInList(interval, binding)));
            }
        }

        self.intervals[interval].state = IntervalState::Handled;
        Ok(())
    }

    /// The values held by the active intervals at the current position.
    pub fn live_value_set_at<'c>(&self, config: &'c RegisterConfig) -> LiveValueSet<'c> {
        let mut live = LiveValueSet::new(config);
        for &binding in &RegisterBinding::VALUES {
            for id in self.active_lists.iter(self.intervals, binding) {
                let interval = &self.intervals[id];
                if let (Some(location), Some(value)) = (interval.location(), interval.value()) {
                    live.put(location, value);
                }
            }
        }

        live
    }

    /// Checks that every tracked interval's state agrees with the current position.
    pub fn is_consistent(&self) -> bool {
        let position = self.current_position;
        RegisterBinding::VALUES.iter().all(|&binding| {
            let active_consistent = self.active_lists
                .iter(self.intervals, binding)
                .all(|id| {
                    let interval = &self.intervals[id];
                    interval.state() == IntervalState::Active && interval.current().covers(position)
                });

            let inactive_consistent = self.inactive_lists
                .iter(self.intervals, binding)
                .all(|id| {
                    let interval = &self.intervals[id];
                    interval.state() == IntervalState::Inactive
                        && !interval.current_at_end()
                        && interval.current_from() > position
                });

            active_consistent && inactive_consistent
        })
    }
}

/// Links the non-empty unhandled intervals into lists sorted by start position, one per binding.
pub fn create_unhandled_lists(intervals: &mut Intervals) -> RegisterBindingLists {
    let mut lists = RegisterBindingLists::empty();

    for &binding in &RegisterBinding::VALUES {
        let mut ids = intervals
            .iter()
            .filter(|interval| interval.binding() == binding && interval.state() == IntervalState::Unhandled && !interval.is_empty())
            .map(|interval| interval.id())
            .collect::<Vec<_>>();

        ids.sort_by_key(|&id| intervals.from(id));

        let mut next = IntervalId::END_MARKER;
        for &id in ids.iter().rev() {
            intervals[id].next = next;
            next = id;
        }

        lists.set(binding, next);
    }

    lists
}

#[cfg(test)]
use crate::model::location::{Location, StackSlot};
#[cfg(test)]
use crate::model::value::LiveValue;
#[cfg(test)]
use iced_x86::Register;

#[cfg(test)]
struct RecordMoves {
    moves: Vec<(IntervalId, IntervalState, IntervalState)>,
    activated: Vec<IntervalId>
}

#[cfg(test)]
impl RecordMoves {
    fn new() -> RecordMoves {
        RecordMoves {
            moves: Vec::new(),
            activated: Vec::new()
        }
    }
}

#[cfg(test)]
impl ActivationPolicy for RecordMoves {
    fn activate_current(&mut self, _walker: &mut IntervalWalker<'_>, current: IntervalId) -> AllocationResult<bool> {
        self.activated.push(current);
        Ok(true)
    }

    fn interval_moved(&mut self, _intervals: &Intervals, interval: IntervalId, from: IntervalState, to: IntervalState) {
        self.moves.push((interval, from, to));
    }
}

#[cfg(test)]
fn create_variable(intervals: &mut Intervals, value: u32, ranges: &[(Position, Position)]) -> IntervalId {
    let id = intervals.create_variable(LiveValue::int(value));
    for &(from, to) in ranges.iter().rev() {
        intervals[id].add_range(from, to);
    }

    id
}

#[test]
fn test_lifetime_hole() {
    let mut intervals = Intervals::new();
    let value = create_variable(&mut intervals, 0, &[(0, 10), (20, 30)]);
    intervals[value].assign_location(Location::Register(Register::RBX));
    let fixed = intervals.create_fixed(Register::RBX);
    intervals[fixed].add_range(10, 20);

    let mut walker = IntervalWalker::from_intervals(&mut intervals, 40, true);
    walker.walk_to(15, &mut AcceptAll).unwrap();

    assert_eq!(IntervalState::Inactive, walker.intervals()[value].state());
    assert_eq!(IntervalState::Active, walker.intervals()[fixed].state());
    assert_eq!(vec![value], walker.inactive(RegisterBinding::Any));
    assert_eq!(vec![fixed], walker.active(RegisterBinding::Fixed));
    assert!(walker.is_consistent());

    walker.walk_to(25, &mut AcceptAll).unwrap();

    assert_eq!(IntervalState::Active, walker.intervals()[value].state());
    assert_eq!(IntervalState::Handled, walker.intervals()[fixed].state());
    assert_eq!(vec![value], walker.active(RegisterBinding::Any));
    assert!(walker.active(RegisterBinding::Fixed).is_empty());
    assert!(walker.is_consistent());

    walker.walk_to(30, &mut AcceptAll).unwrap();
    assert_eq!(IntervalState::Handled, walker.intervals()[value].state());
    assert!(walker.active(RegisterBinding::Any).is_empty());
}

#[test]
fn test_walk_to_is_idempotent() {
    let mut intervals = Intervals::new();
    create_variable(&mut intervals, 0, &[(0, 10), (20, 30)]);
    create_variable(&mut intervals, 1, &[(4, 24)]);
    create_variable(&mut intervals, 2, &[(12, 16)]);

    let mut policy = RecordMoves::new();
    let mut walker = IntervalWalker::from_intervals(&mut intervals, 40, true);
    walker.walk_to(14, &mut policy).unwrap();

    let moves = policy.moves.len();
    let activated = policy.activated.len();
    let active = walker.active(RegisterBinding::Any);
    let inactive = walker.inactive(RegisterBinding::Any);

    walker.walk_to(14, &mut policy).unwrap();

    assert_eq!(moves, policy.moves.len());
    assert_eq!(activated, policy.activated.len());
    assert_eq!(active, walker.active(RegisterBinding::Any));
    assert_eq!(inactive, walker.inactive(RegisterBinding::Any));
}

#[test]
fn test_walking_backwards() {
    let mut intervals = Intervals::new();
    create_variable(&mut intervals, 0, &[(0, 10)]);

    let mut walker = IntervalWalker::from_intervals(&mut intervals, 20, true);
    walker.walk_to(8, &mut AcceptAll).unwrap();

    let error = walker.walk_to(4, &mut AcceptAll).unwrap_err();
    assert_eq!(AllocationErrorMessage::WalkingBackwards { current: 8, requested: 4 }, error.message);
}

#[test]
fn test_fixed_wins_tie() {
    let mut intervals = Intervals::new();
    let any = create_variable(&mut intervals, 0, &[(6, 10)]);
    let fixed = intervals.create_fixed(Register::RAX);
    intervals[fixed].add_range(6, 8);
    let early = create_variable(&mut intervals, 1, &[(2, 10)]);

    let mut policy = RecordMoves::new();
    let mut walker = IntervalWalker::from_intervals(&mut intervals, 20, true);
    walker.walk_to(6, &mut policy).unwrap();

    assert_eq!(vec![early, fixed, any], policy.activated);
    assert_eq!(Some(RegisterBinding::Any), walker.current_binding());
}

#[test]
fn test_sweep_monotonicity() {
    let mut intervals = Intervals::new();
    create_variable(&mut intervals, 0, &[(0, 6), (10, 14), (30, 34)]);
    create_variable(&mut intervals, 1, &[(2, 22)]);
    create_variable(&mut intervals, 2, &[(8, 12), (16, 40)]);
    let fixed = intervals.create_fixed(Register::RCX);
    intervals[fixed].add_range(18, 20);
    intervals[fixed].add_range(4, 6);

    let mut walker = IntervalWalker::from_intervals(&mut intervals, 40, true);
    for position in (0..=40).step_by(3) {
        walker.walk_to(position, &mut AcceptAll).unwrap();
        assert!(walker.is_consistent(), "inconsistent at {}", position);

        for interval in walker.intervals().iter() {
            if interval.state() == IntervalState::Handled {
                assert!(interval.current_at_end() || interval.to() <= position);
            }
        }
    }

    walker.walk_to(40, &mut AcceptAll).unwrap();
    assert!(walker.intervals().iter().all(|interval| interval.state() == IntervalState::Handled));
}

#[test]
fn test_stack_intervals() {
    let mut intervals = Intervals::new();
    let argument = intervals.create_stack(LiveValue::reference(0), StackSlot::new(16));
    intervals[argument].add_range(0, 12);
    let short = intervals.create_stack(LiveValue::int(1), StackSlot::new(24));
    intervals[short].add_range(0, 2);
    let value = create_variable(&mut intervals, 2, &[(4, 8)]);

    let mut policy = RecordMoves::new();
    let mut walker = IntervalWalker::from_intervals(&mut intervals, 20, true);
    walker.walk_to(4, &mut policy).unwrap();

    assert_eq!(vec![value], policy.activated);
    assert_eq!(vec![argument], walker.active(RegisterBinding::Stack));
    assert_eq!(IntervalState::Handled, walker.intervals()[short].state());

    let config = RegisterConfig::x64();
    let live = walker.live_value_set_at(&config);
    assert_eq!(Some(LiveValue::reference(0)), live.get(&Location::stack(16)));
    assert_eq!(1, live.len());
}

#[test]
fn test_rejected_interval_is_dropped() {
    struct RejectAll;

    impl ActivationPolicy for RejectAll {
        fn activate_current(&mut self, _walker: &mut IntervalWalker<'_>, _current: IntervalId) -> AllocationResult<bool> {
            Ok(false)
        }
    }

    let mut intervals = Intervals::new();
    let value = create_variable(&mut intervals, 0, &[(0, 10)]);

    let mut walker = IntervalWalker::from_intervals(&mut intervals, 20, true);
    walker.walk_to(2, &mut RejectAll).unwrap();

    assert_eq!(IntervalState::Handled, walker.intervals()[value].state());
    assert!(walker.active(RegisterBinding::Any).is_empty());
}

#[test]
fn test_remove_from_list() {
    let mut intervals = Intervals::new();
    let value = create_variable(&mut intervals, 0, &[(0, 10)]);

    let mut walker = IntervalWalker::from_intervals(&mut intervals, 20, true);
    walker.walk_to(2, &mut AcceptAll).unwrap();
    walker.remove_from_list(value).unwrap();

    assert_eq!(IntervalState::Handled, walker.intervals()[value].state());
    assert!(walker.active(RegisterBinding::Any).is_empty());
    assert!(walker.remove_from_list(value).is_err());
}
