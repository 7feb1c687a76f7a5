use iced_x86::Register;

use crate::analysis::basic_block::BasicBlock;
use crate::analysis::control_flow_graph::{ControlFlowEdge, ControlFlowGraph};
use crate::analysis::liveness::{compute_liveness, IterationLimit, LivenessPropagator};
use crate::compiler::Settings;
use crate::error::AllocationErrorMessage;
use crate::model::instruction::{Instruction, Operand, StateDescriptor};
use crate::model::location::Location;
use crate::model::value::{LiveValue, ValueKind};

fn create_graph(blocks: Vec<Vec<Instruction>>, edges: &[(usize, usize)]) -> ControlFlowGraph {
    let blocks = blocks
        .into_iter()
        .enumerate()
        .map(|(index, instructions)| BasicBlock::new(index, instructions))
        .collect();

    let edges = edges
        .iter()
        .map(|&(from, to)| ControlFlowEdge { from, to })
        .collect::<Vec<_>>();

    ControlFlowGraph::new(blocks, &edges).unwrap()
}

fn rax() -> Location {
    Location::Register(Register::RAX)
}

fn rbx() -> Location {
    Location::Register(Register::RBX)
}

#[test]
fn test_value_live_across_edge() {
    let settings = Settings::x64();
    let graph = create_graph(
        vec![
            vec![
                Instruction::new(0, "const").with_output(rbx(), LiveValue::int(0)),
                Instruction::new(2, "jump")
            ],
            vec![
                Instruction::new(4, "print").with_input(rbx(), LiveValue::int(0)),
                Instruction::new(6, "return")
            ]
        ],
        &[(0, 1)]
    );

    let result = compute_liveness(&graph, &settings, |_, _, _| {}).unwrap();

    assert_eq!(Some(LiveValue::int(0)), result.live_out(0).get(&rbx()));
    assert_eq!(Some(LiveValue::int(0)), result.live_in(1).get(&rbx()));
    assert!(!result.live_in(0).contains_value(&LiveValue::int(0)));
    assert!(result.live_out(1).is_empty());
}

#[test]
fn test_kill_before_gen() {
    let settings = Settings::x64();
    let graph = create_graph(
        vec![
            vec![
                Instruction::new(0, "const").with_output(rax(), LiveValue::int(0)),
            ],
            vec![
                Instruction::new(2, "increment")
                    .with_input(rax(), LiveValue::int(0))
                    .with_output(rax(), LiveValue::int(1)),
            ],
            vec![
                Instruction::new(4, "return").with_input(rax(), LiveValue::int(1))
            ]
        ],
        &[(0, 1), (1, 2)]
    );

    let result = compute_liveness(&graph, &settings, |_, _, _| {}).unwrap();

    assert_eq!(Some(LiveValue::int(0)), result.live_in(1).get(&rax()));
    assert_eq!(Some(LiveValue::int(1)), result.live_out(1).get(&rax()));
    assert!(result.live_in(0).is_empty());
}

#[test]
fn test_loop_reaches_fixed_point() {
    let settings = Settings::x64();
    let value = LiveValue::reference(0);
    let graph = create_graph(
        vec![
            vec![
                Instruction::new(0, "new_object").with_output(rbx(), value),
            ],
            vec![
                Instruction::new(2, "branch")
            ],
            vec![
                Instruction::new(4, "touch").with_input(rbx(), value),
                Instruction::new(6, "const").with_output(Location::stack(8), LiveValue::int(1)),
                Instruction::new(8, "jump")
            ],
            vec![
                Instruction::new(10, "return")
            ]
        ],
        &[(0, 1), (1, 2), (2, 1), (1, 3)]
    );

    let result = compute_liveness(&graph, &settings, |_, _, _| {}).unwrap();
    result.verify_fixed_point(&graph).unwrap();

    for block in 1..=2 {
        assert_eq!(Some(value), result.live_in(block).get(&rbx()), "B{}", block);
    }

    assert_eq!(Some(value), result.live_out(2).get(&rbx()));
    assert!(result.live_in(3).is_empty());
    assert!(result.live_out(0).contains_value(&value));
    assert!(!result.live_in(0).contains_value(&value));

    let rerun = compute_liveness(&graph, &settings, |_, _, _| {}).unwrap();
    for block in 0..graph.len() {
        assert_eq!(result.live_in(block), rerun.live_in(block));
        assert_eq!(result.live_out(block), rerun.live_out(block));
    }
}

#[test]
fn test_states_reported_once() {
    let settings = Settings::x64();
    let value = LiveValue::reference(0);
    let graph = create_graph(
        vec![
            vec![
                Instruction::new(0, "new_object").with_output(rbx(), value),
            ],
            vec![
                Instruction::new(2, "safepoint").with_state(StateDescriptor::new(0)),
                Instruction::new(4, "touch").with_input(rbx(), value),
            ],
            vec![
                Instruction::new(6, "safepoint").with_state(StateDescriptor::new(1)),
                Instruction::new(8, "jump")
            ],
            vec![
                Instruction::new(10, "return")
            ]
        ],
        &[(0, 1), (1, 2), (2, 1), (2, 3)]
    );

    let mut reported = Vec::new();
    compute_liveness(&graph, &settings, |instruction, state, live| {
        reported.push((instruction.id, state.id.0, live.get(&rbx())));
    }).unwrap();

    reported.sort_by_key(|&(id, _, _)| id);
    assert_eq!(
        vec![
            (2, 0, Some(value)),
            (6, 1, Some(value))
        ],
        reported
    );
}

#[test]
fn test_inconsistent_definition() {
    let settings = Settings::x64();
    let graph = create_graph(
        vec![
            vec![
                Instruction::new(0, "const").with_output(rax(), LiveValue::int(0)),
                Instruction::new(2, "touch").with_input(rax(), LiveValue::reference(0))
            ]
        ],
        &[]
    );

    let error = compute_liveness(&graph, &settings, |_, _, _| {}).err().unwrap();
    assert_eq!(Some(0), error.position);
    assert!(error.is_internal_error());
    assert_eq!(
        AllocationErrorMessage::InconsistentValue { location: rax(), stored: LiveValue::reference(0), removed: LiveValue::int(0) },
        error.message
    );
}

#[test]
fn test_untracked_values() {
    let settings = Settings::x64();
    let graph = create_graph(
        vec![
            vec![
                Instruction::new(0, "touch")
                    .with_input(Location::Register(Register::RSP), LiveValue::int(0))
                    .with_input(rax(), LiveValue::new(1, ValueKind::Illegal))
                    .with_input(Location::stack(-8), LiveValue::int(2))
                    .with_input(Location::stack(12), LiveValue::int(3))
            ]
        ],
        &[]
    );

    let result = compute_liveness(&graph, &settings, |_, _, _| {}).unwrap();
    assert_eq!(1, result.live_in(0).len());
    assert_eq!(Some(LiveValue::int(3)), result.live_in(0).get(&Location::stack(12)));
}

#[test]
fn test_alive_and_state_values_precede_snapshot() {
    let settings = Settings::x64();
    let graph = create_graph(
        vec![
            vec![
                Instruction::new(0, "call")
                    .with_input(Location::Register(Register::RDI), LiveValue::reference(0))
                    .with_alive(Location::Register(Register::RSI), LiveValue::reference(1))
                    .with_temp(Location::Register(Register::R11), LiveValue::int(2))
                    .with_output(rax(), LiveValue::reference(3))
                    .with_state(
                        StateDescriptor::new(0)
                            .with_value(Operand::new(Location::Register(Register::R12), LiveValue::reference(4)))
                    )
                    .destroying_caller_saved_registers(),
                Instruction::new(2, "return").with_input(rax(), LiveValue::reference(3))
            ]
        ],
        &[]
    );

    let mut snapshots = Vec::new();
    let result = compute_liveness(&graph, &settings, |_, _, live| {
        let mut locations = live.iter().map(|(location, _)| location).collect::<Vec<_>>();
        locations.sort();
        snapshots.push(locations);
    }).unwrap();

    let mut expected = vec![Location::Register(Register::RSI), Location::Register(Register::R12)];
    expected.sort();
    assert_eq!(vec![expected], snapshots);

    assert_eq!(Some(LiveValue::reference(0)), result.live_in(0).get(&Location::Register(Register::RDI)));
    assert_eq!(None, result.live_in(0).get(&rax()));
}

#[test]
fn test_progress_alarm() {
    let settings = Settings::x64();
    let graph = create_graph(
        vec![
            vec![Instruction::new(0, "jump")],
            vec![Instruction::new(2, "jump")],
            vec![Instruction::new(4, "return")]
        ],
        &[(0, 1), (1, 2)]
    );

    let mut alarm = IterationLimit::new(2);
    let error = LivenessPropagator::new(&graph, &settings.register_config)
        .compute(&mut alarm, |_, _, _| {})
        .err()
        .unwrap();

    assert_eq!(AllocationErrorMessage::IterationLimitExceeded(2), error.message);
    assert!(!error.is_internal_error());

    let mut alarm = IterationLimit::new(3);
    LivenessPropagator::new(&graph, &settings.register_config)
        .compute(&mut alarm, |_, _, _| {})
        .unwrap();
    assert_eq!(3, alarm.iterations());
}
