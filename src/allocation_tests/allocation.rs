use iced_x86::Register;

use crate::analysis::basic_block::BasicBlock;
use crate::analysis::control_flow_graph::{ControlFlowEdge, ControlFlowGraph};
use crate::analysis::liveness::compute_reference_maps;
use crate::compiler::Settings;
use crate::compiler::calling_conventions::register_call_arguments;
use crate::model::Position;
use crate::model::instruction::{Instruction, StateDescriptor, StateId};
use crate::model::location::{Location, StackSlot};
use crate::model::value::{LiveValue, ValueId};
use crate::optimization::register_allocation::interval::{IntervalId, Intervals, RegisterPriority};
use crate::optimization::register_allocation::linear_scan::allocate;

fn create_variable(intervals: &mut Intervals, value: LiveValue, ranges: &[(Position, Position)]) -> IntervalId {
    let id = intervals.create_variable(value);
    for &(from, to) in ranges.iter().rev() {
        intervals[id].add_range(from, to);
    }

    id
}

#[test]
fn test_value_across_call_gets_callee_saved_register() {
    let settings = Settings::x64();
    let mut intervals = Intervals::new();
    let value = create_variable(&mut intervals, LiveValue::reference(0), &[(0, 20)]);
    intervals.add_use_pos(value, 20, RegisterPriority::MustHaveRegister, true).unwrap();

    for &register in settings.register_config.caller_saved() {
        let fixed = intervals.create_fixed(register);
        intervals[fixed].add_range(10, 11);
    }

    let allocation = allocate(&mut intervals, 20, &settings).unwrap();

    assert_eq!(Some(Location::Register(Register::RBX)), allocation.location_at(ValueId(0), 10));
    assert_eq!(0, allocation.num_spilled_registers());
    assert_eq!(0, allocation.frame_size());
}

#[test]
fn test_register_pressure() {
    let settings = Settings::x64();
    let mut intervals = Intervals::new();
    for index in 0..20 {
        create_variable(&mut intervals, LiveValue::int(index), &[(index as usize * 2, 60 - index as usize)]);
    }

    let allocation = allocate(&mut intervals, 60, &settings).unwrap();

    let num_general = settings.register_config.allocatable().iter().filter(|register| !register.is_xmm()).count();
    for position in 0..60 {
        let mut registers = allocation.alive_hardware_registers_at(position);
        assert!(registers.len() <= num_general);

        let count = registers.len();
        registers.sort();
        registers.dedup();
        assert_eq!(count, registers.len(), "register shared at {}", position);
    }

    for index in 0..20 {
        for position in index as usize * 2..60 - index as usize {
            assert!(allocation.location_at(ValueId(index), position).is_some(), "v{} has no location at {}", index, position);
        }
    }

    assert!(allocation.num_spilled_registers() > 0);
    assert!(allocation.frame_size() > 0);
}

#[test]
fn test_arguments_and_stack_parameters() {
    let settings = Settings::x64();
    let mut intervals = Intervals::new();

    let argument = intervals.create_fixed(register_call_arguments::get_argument(0).unwrap());
    intervals[argument].add_range(0, 1);
    let parameter = intervals.create_stack(LiveValue::reference(1), StackSlot::new(16));
    intervals[parameter].add_range(0, 12);
    create_variable(&mut intervals, LiveValue::int(0), &[(1, 12)]);

    let allocation = allocate(&mut intervals, 12, &settings).unwrap();

    assert_eq!(Some(Location::stack(16)), allocation.location_at(ValueId(1), 6));
    assert!(allocation.location_at(ValueId(0), 6).map(|location| location.is_register()).unwrap_or(false));
    assert_eq!(1, allocation.num_spilled_registers());
}

#[test]
fn test_reference_maps_and_allocation() {
    let settings = Settings::x64();
    let object = LiveValue::reference(0);
    let counter = LiveValue::int(1);

    let graph = ControlFlowGraph::new(
        vec![
            BasicBlock::new(0, vec![
                Instruction::new(0, "new_object").with_output(Location::Register(Register::RBX), object),
                Instruction::new(2, "const").with_output(Location::Register(Register::R12), counter),
            ]),
            BasicBlock::new(1, vec![
                Instruction::new(4, "call")
                    .with_state(StateDescriptor::new(0))
                    .destroying_caller_saved_registers(),
                Instruction::new(6, "decrement")
                    .with_input(Location::Register(Register::R12), counter)
                    .with_output(Location::Register(Register::R12), counter),
                Instruction::new(8, "branch").with_input(Location::Register(Register::R12), counter)
            ]),
            BasicBlock::new(2, vec![
                Instruction::new(10, "return").with_input(Location::Register(Register::RBX), object)
            ])
        ],
        &[
            ControlFlowEdge { from: 0, to: 1 },
            ControlFlowEdge { from: 1, to: 1 },
            ControlFlowEdge { from: 1, to: 2 }
        ]
    ).unwrap();

    let (_, reference_maps) = compute_reference_maps(&graph, &settings).unwrap();
    assert_eq!(&[Register::RBX], reference_maps.get(StateId(0)).unwrap().registers());

    let mut intervals = Intervals::new();
    create_variable(&mut intervals, object, &[(0, 10)]);
    create_variable(&mut intervals, counter, &[(2, 10)]);
    for &register in settings.register_config.caller_saved() {
        let fixed = intervals.create_fixed(register);
        intervals[fixed].add_range(4, 5);
    }

    let allocation = allocate(&mut intervals, graph.max_position(), &settings).unwrap();

    let registers = allocation.alive_registers_at(4);
    assert_eq!(2, registers.len());
    assert!(registers.iter().all(|(_, register)| !settings.register_config.caller_saved().contains(register)));
}
