use crate::error::{AllocationError, AllocationErrorMessage, AllocationResult};
use crate::optimization::register_allocation::interval::{IntervalId, Intervals, RegisterBinding, RegisterPriority};

/// Three interval chains, one per binding, linked through `Interval::next` and terminated by
/// `IntervalId::END_MARKER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBindingLists {
    fixed: IntervalId,
    any: IntervalId,
    stack: IntervalId
}

impl RegisterBindingLists {
    pub fn new(fixed: IntervalId, any: IntervalId, stack: IntervalId) -> RegisterBindingLists {
        RegisterBindingLists {
            fixed,
            any,
            stack
        }
    }

    pub fn empty() -> RegisterBindingLists {
        RegisterBindingLists::new(IntervalId::END_MARKER, IntervalId::END_MARKER, IntervalId::END_MARKER)
    }

    pub fn get(&self, binding: RegisterBinding) -> IntervalId {
        match binding {
            RegisterBinding::Fixed => self.fixed,
            RegisterBinding::Any => self.any,
            RegisterBinding::Stack => self.stack
        }
    }

    pub fn set(&mut self, binding: RegisterBinding, head: IntervalId) {
        match binding {
            RegisterBinding::Fixed => self.fixed = head,
            RegisterBinding::Any => self.any = head,
            RegisterBinding::Stack => self.stack = head
        }
    }

    pub fn iter<'i>(&self, intervals: &'i Intervals, binding: RegisterBinding) -> BindingListIter<'i> {
        BindingListIter {
            intervals,
            current: self.get(binding)
        }
    }

    pub fn is_empty(&self, binding: RegisterBinding) -> bool {
        self.get(binding).is_end_marker()
    }

    pub fn contains(&self, intervals: &Intervals, binding: RegisterBinding, interval: IntervalId) -> bool {
        self.iter(intervals, binding).any(|id| id == interval)
    }

    /// Inserts `interval` in front of the first entry whose current range starts at or after it.
    pub fn add_to_list_sorted_by_current_from_positions(&mut self,
                                                         intervals: &mut Intervals,
                                                         binding: RegisterBinding,
                                                         interval: IntervalId) {
        let from = intervals.current_from(interval);
        self.insert_where(intervals, binding, interval, |intervals, cursor| intervals.current_from(cursor) < from);
    }

    /// Inserts by start position, and among equal starts by first use. Used for split children
    /// entering the unhandled list.
    pub fn add_to_list_sorted_by_start_and_use_positions(&mut self,
                                                         intervals: &mut Intervals,
                                                         binding: RegisterBinding,
                                                         interval: IntervalId) {
        let from = intervals.from(interval);
        let first_usage = intervals.first_usage(interval, RegisterPriority::None);

        self.insert_where(intervals, binding, interval, |intervals, cursor| {
            let cursor_from = intervals.from(cursor);
            cursor_from < from || (cursor_from == from && intervals.first_usage(cursor, RegisterPriority::None) < first_usage)
        });
    }

    fn insert_where<F>(&mut self, intervals: &mut Intervals, binding: RegisterBinding, interval: IntervalId, before: F)
        where F: Fn(&Intervals, IntervalId) -> bool {
        debug_assert!(!interval.is_end_marker());

        let mut previous = IntervalId::END_MARKER;
        let mut cursor = self.get(binding);
        while !cursor.is_end_marker() && before(intervals, cursor) {
            previous = cursor;
            cursor = intervals[cursor].next;
        }

        intervals[interval].next = cursor;
        if previous.is_end_marker() {
            self.set(binding, interval);
        } else {
            intervals[previous].next = interval;
        }
    }

    /// Unlinks `interval` from the chain of `binding`.
    pub fn remove(&mut self, intervals: &mut Intervals, binding: RegisterBinding, interval: IntervalId) -> AllocationResult<()> {
        let mut previous = IntervalId::END_MARKER;
        let mut cursor = self.get(binding);
        while !cursor.is_end_marker() && cursor != interval {
            previous = cursor;
            cursor = intervals[cursor].next;
        }

        if cursor.is_end_marker() {
            return Err(AllocationError::new(AllocationErrorMessage::IntervalNotInList(interval, binding)));
        }

        let next = intervals[interval].next;
        if previous.is_end_marker() {
            self.set(binding, next);
        } else {
            intervals[previous].next = next;
        }

        intervals[interval].next = IntervalId::END_MARKER;
        Ok(())
    }

    /// Checks that the chain of `binding` ascends by current range start.
    pub fn is_sorted(&self, intervals: &Intervals, binding: RegisterBinding) -> bool {
        let positions = self.iter(intervals, binding)
            .map(|id| intervals.current_from(id))
            .collect::<Vec<_>>();

        positions.windows(2).all(|pair| pair[0] <= pair[1])
    }

    pub fn check_sorted(&self, intervals: &Intervals) -> AllocationResult<()> {
        for &binding in &RegisterBinding::VALUES {
            if !self.is_sorted(intervals, binding) {
                return Err(AllocationError::new(AllocationErrorMessage::UnsortedBindingList(binding)));
            }
        }

        Ok(())
    }
}

pub struct BindingListIter<'i> {
    intervals: &'i Intervals,
    current: IntervalId
}

impl<'i> Iterator for BindingListIter<'i> {
    type Item = IntervalId;

    fn next(&mut self) -> Option<IntervalId> {
        if self.current.is_end_marker() {
            return None;
        }

        let current = self.current;
        self.current = self.intervals[current].next;
        Some(current)
    }
}

#[cfg(test)]
use crate::model::value::LiveValue;

#[cfg(test)]
fn create_intervals(ranges: &[(usize, usize)]) -> (Intervals, Vec<IntervalId>) {
    let mut intervals = Intervals::new();
    let ids = ranges
        .iter()
        .enumerate()
        .map(|(index, &(from, to))| {
            let id = intervals.create_variable(LiveValue::int(index as u32));
            intervals[id].add_range(from, to);
            id
        })
        .collect();

    (intervals, ids)
}

#[test]
fn test_sorted_insert() {
    let (mut intervals, ids) = create_intervals(&[(10, 20), (0, 4), (6, 8), (6, 12)]);
    let mut lists = RegisterBindingLists::empty();
    for &id in &ids {
        lists.add_to_list_sorted_by_current_from_positions(&mut intervals, RegisterBinding::Any, id);
        assert!(lists.is_sorted(&intervals, RegisterBinding::Any));
    }

    let order = lists.iter(&intervals, RegisterBinding::Any).collect::<Vec<_>>();
    assert_eq!(vec![ids[1], ids[3], ids[2], ids[0]], order);
    assert!(lists.is_empty(RegisterBinding::Fixed));
    assert!(lists.is_empty(RegisterBinding::Stack));
}

#[test]
fn test_sorted_insert_uses_current_range() {
    let (mut intervals, ids) = create_intervals(&[(0, 4), (6, 8)]);
    let late = intervals.create_variable(LiveValue::int(2));
    intervals[late].add_range(20, 30);
    intervals[late].add_range(0, 2);
    intervals[late].next_range();

    let mut lists = RegisterBindingLists::empty();
    lists.add_to_list_sorted_by_current_from_positions(&mut intervals, RegisterBinding::Any, late);
    lists.add_to_list_sorted_by_current_from_positions(&mut intervals, RegisterBinding::Any, ids[1]);
    lists.add_to_list_sorted_by_current_from_positions(&mut intervals, RegisterBinding::Any, ids[0]);

    let order = lists.iter(&intervals, RegisterBinding::Any).collect::<Vec<_>>();
    assert_eq!(vec![ids[0], ids[1], late], order);
}

#[test]
fn test_sorted_by_start_and_use_positions() {
    let (mut intervals, ids) = create_intervals(&[(4, 20), (4, 20), (2, 10)]);
    intervals[ids[0]].add_use_pos(12, RegisterPriority::MustHaveRegister);
    intervals[ids[1]].add_use_pos(6, RegisterPriority::MustHaveRegister);

    let mut lists = RegisterBindingLists::empty();
    for &id in &ids {
        lists.add_to_list_sorted_by_start_and_use_positions(&mut intervals, RegisterBinding::Any, id);
    }

    let order = lists.iter(&intervals, RegisterBinding::Any).collect::<Vec<_>>();
    assert_eq!(vec![ids[2], ids[1], ids[0]], order);
}

#[test]
fn test_remove() {
    let (mut intervals, ids) = create_intervals(&[(0, 4), (2, 8), (6, 10)]);
    let mut lists = RegisterBindingLists::empty();
    for &id in &ids {
        lists.add_to_list_sorted_by_current_from_positions(&mut intervals, RegisterBinding::Fixed, id);
    }

    lists.remove(&mut intervals, RegisterBinding::Fixed, ids[1]).unwrap();
    assert_eq!(vec![ids[0], ids[2]], lists.iter(&intervals, RegisterBinding::Fixed).collect::<Vec<_>>());
    assert_eq!(IntervalId::END_MARKER, intervals[ids[1]].next);

    lists.remove(&mut intervals, RegisterBinding::Fixed, ids[0]).unwrap();
    assert_eq!(ids[2], lists.get(RegisterBinding::Fixed));
    assert!(!lists.contains(&intervals, RegisterBinding::Fixed, ids[0]));

    let error = lists.remove(&mut intervals, RegisterBinding::Fixed, ids[1]).unwrap_err();
    assert_eq!(AllocationErrorMessage::IntervalNotInList(ids[1], RegisterBinding::Fixed), error.message);

    let error = lists.remove(&mut intervals, RegisterBinding::Any, ids[2]).unwrap_err();
    assert_eq!(AllocationErrorMessage::IntervalNotInList(ids[2], RegisterBinding::Any), error.message);
}

#[test]
fn test_check_sorted() {
    let (mut intervals, ids) = create_intervals(&[(0, 4), (6, 10)]);
    let mut lists = RegisterBindingLists::empty();
    lists.set(RegisterBinding::Stack, ids[1]);
    intervals[ids[1]].next = ids[0];

    assert!(!lists.is_sorted(&intervals, RegisterBinding::Stack));
    assert_eq!(
        AllocationErrorMessage::UnsortedBindingList(RegisterBinding::Stack),
        lists.check_sorted(&intervals).unwrap_err().message
    );
}
