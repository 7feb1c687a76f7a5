use iced_x86::Register;

use crate::analysis::basic_block::BasicBlock;
use crate::analysis::control_flow_graph::ControlFlowGraph;
use crate::analysis::liveness::compute_liveness;
use crate::compiler::Settings;
use crate::model::Position;
use crate::model::instruction::{Instruction, StateDescriptor};
use crate::model::location::Location;
use crate::model::value::LiveValue;
use crate::optimization::register_allocation::interval::{IntervalId, Intervals, IntervalState, RegisterBinding};
use crate::optimization::register_allocation::linear_scan::LinearScanPolicy;
use crate::optimization::register_allocation::walker::{AcceptAll, IntervalWalker};

fn create_variable(intervals: &mut Intervals, value: LiveValue, ranges: &[(Position, Position)]) -> IntervalId {
    let id = intervals.create_variable(value);
    for &(from, to) in ranges.iter().rev() {
        intervals[id].add_range(from, to);
    }

    id
}

#[test]
fn test_hole_with_fixed_register() {
    let mut intervals = Intervals::new();
    let value = create_variable(&mut intervals, LiveValue::int(0), &[(0, 10), (20, 30)]);
    intervals[value].assign_location(Location::Register(Register::RAX));
    let fixed = intervals.create_fixed(Register::RAX);
    intervals[fixed].add_range(10, 20);

    let settings = Settings::x64();
    let mut walker = IntervalWalker::from_intervals(&mut intervals, 30, true);

    walker.walk_to(15, &mut AcceptAll).unwrap();
    assert_eq!(IntervalState::Inactive, walker.intervals()[value].state());
    assert_eq!(IntervalState::Active, walker.intervals()[fixed].state());
    assert!(walker.live_value_set_at(&settings.register_config).is_empty());

    walker.walk_to(25, &mut AcceptAll).unwrap();
    assert_eq!(IntervalState::Active, walker.intervals()[value].state());
    assert_eq!(
        Some(LiveValue::int(0)),
        walker.live_value_set_at(&settings.register_config).get(&Location::Register(Register::RAX))
    );
}

#[test]
fn test_repeated_walk_performs_no_transitions() {
    let settings = Settings::x64();
    let mut intervals = Intervals::new();
    create_variable(&mut intervals, LiveValue::int(0), &[(0, 8), (16, 24)]);
    create_variable(&mut intervals, LiveValue::int(1), &[(2, 20)]);
    create_variable(&mut intervals, LiveValue::reference(2), &[(10, 14)]);
    let fixed = intervals.create_fixed(Register::RAX);
    intervals[fixed].add_range(12, 13);

    let mut policy = LinearScanPolicy::new(&settings.register_config);
    let mut walker = IntervalWalker::from_intervals(&mut intervals, 24, true);
    walker.walk_to(12, &mut policy).unwrap();

    let snapshot = walker.intervals().clone();
    let lists = (*walker.unhandled_lists(), *walker.active_lists(), *walker.inactive_lists());

    walker.walk_to(12, &mut policy).unwrap();

    assert_eq!(lists, (*walker.unhandled_lists(), *walker.active_lists(), *walker.inactive_lists()));
    for (before, after) in snapshot.iter().zip(walker.intervals().iter()) {
        assert_eq!(before.state(), after.state());
        assert_eq!(before.location(), after.location());
        assert_eq!(before.current(), after.current());
    }
}

#[test]
fn test_walker_matches_liveness_at_safepoint() {
    let settings = Settings::x64();
    let object = LiveValue::reference(0);
    let array = LiveValue::reference(1);

    let graph = ControlFlowGraph::from_blocks(vec![
        BasicBlock::new(0, vec![
            Instruction::new(0, "new_object").with_output(Location::Register(Register::RBX), object),
            Instruction::new(2, "new_array").with_output(Location::stack(8), array),
            Instruction::new(4, "safepoint").with_state(StateDescriptor::new(0)),
            Instruction::new(6, "load").with_input(Location::stack(8), array),
            Instruction::new(8, "store").with_input(Location::Register(Register::RBX), object)
        ])
    ]).unwrap();

    let mut snapshot = None;
    compute_liveness(&graph, &settings, |_, _, live| snapshot = Some(live.clone())).unwrap();
    let snapshot = snapshot.unwrap();

    let mut intervals = Intervals::new();
    let object_interval = create_variable(&mut intervals, object, &[(0, 8)]);
    intervals[object_interval].assign_location(Location::Register(Register::RBX));
    let array_interval = create_variable(&mut intervals, array, &[(2, 6)]);
    intervals[array_interval].assign_location(Location::stack(8));

    let mut walker = IntervalWalker::from_intervals(&mut intervals, graph.max_position(), true);
    walker.walk_to(4, &mut AcceptAll).unwrap();

    assert_eq!(snapshot, walker.live_value_set_at(&settings.register_config));
}

#[test]
fn test_linear_scan_keeps_walker_consistent() {
    let settings = Settings::x64();
    let mut intervals = Intervals::new();
    for index in 0..24 {
        let from = (index % 6) * 4;
        create_variable(&mut intervals, LiveValue::int(index as u32), &[(from, from + 10 + index as usize), (60, 62 + index as usize)]);
    }

    let mut policy = LinearScanPolicy::new(&settings.register_config);
    let mut walker = IntervalWalker::from_intervals(&mut intervals, 90, true);

    for position in (0..=90).step_by(5) {
        walker.walk_to(position, &mut policy).unwrap();
        assert!(walker.is_consistent(), "inconsistent at {}", position);

        let mut registers = walker
            .active(RegisterBinding::Any)
            .into_iter()
            .filter_map(|id| walker.intervals()[id].register())
            .collect::<Vec<_>>();

        let count = registers.len();
        registers.sort();
        registers.dedup();
        assert_eq!(count, registers.len(), "register shared at {}", position);
    }

    assert!(policy.num_spills() > 0);
    assert!(walker.intervals().iter().all(|interval| interval.state() == IntervalState::Handled));
}
