use iced_x86::Register;

use crate::analysis::basic_block::BasicBlock;
use crate::analysis::control_flow_graph::{ControlFlowEdge, ControlFlowGraph};
use crate::analysis::liveness::compute_reference_maps;
use crate::compiler::Settings;
use crate::model::instruction::{Instruction, Operand, StateDescriptor, StateId};
use crate::model::location::{Location, StackSlot};
use crate::model::value::LiveValue;

#[test]
fn test_reference_map_at_call() {
    let settings = Settings::x64();
    let object = LiveValue::reference(0);
    let array = LiveValue::reference(1);
    let length = LiveValue::int(2);
    let result = LiveValue::reference(3);

    let graph = ControlFlowGraph::new(
        vec![
            BasicBlock::new(0, vec![
                Instruction::new(0, "new_object").with_output(Location::Register(Register::RBX), object),
                Instruction::new(2, "new_array").with_output(Location::stack(8), array),
                Instruction::new(4, "load_int").with_output(Location::Register(Register::RDI), length),
                Instruction::new(6, "call")
                    .with_input(Location::Register(Register::RDI), length)
                    .with_output(Location::Register(Register::RAX), result)
                    .with_state(StateDescriptor::new(0))
                    .destroying_caller_saved_registers(),
            ]),
            BasicBlock::new(1, vec![
                Instruction::new(8, "store_element")
                    .with_input(Location::Register(Register::RBX), object)
                    .with_input(Location::stack(8), array)
                    .with_input(Location::Register(Register::RAX), result),
                Instruction::new(10, "return")
            ])
        ],
        &[ControlFlowEdge { from: 0, to: 1 }]
    ).unwrap();

    let (liveness, reference_maps) = compute_reference_maps(&graph, &settings).unwrap();

    assert_eq!(1, reference_maps.len());
    let reference_map = reference_maps.get(StateId(0)).unwrap();
    assert_eq!(&[Register::RBX], reference_map.registers());
    assert_eq!(&[StackSlot::new(8)], reference_map.stack_slots());
    assert!(!reference_map.contains(&Location::Register(Register::RAX)));
    assert!(!reference_map.contains(&Location::Register(Register::RDI)));

    assert_eq!(3, liveness.live_in(1).len());
    assert!(liveness.live_in(0).is_empty());
}

#[test]
fn test_call_kills_caller_saved_registers() {
    let settings = Settings::x64();
    let value = LiveValue::reference(0);

    let graph = ControlFlowGraph::new(
        vec![
            BasicBlock::new(0, vec![
                Instruction::new(0, "new_object").with_output(Location::Register(Register::RCX), value),
                Instruction::new(2, "call")
                    .with_state(StateDescriptor::new(0))
                    .destroying_caller_saved_registers(),
                Instruction::new(4, "safepoint").with_state(StateDescriptor::new(1)),
                Instruction::new(6, "return").with_input(Location::Register(Register::RCX), value)
            ])
        ],
        &[]
    ).unwrap();

    let (_, reference_maps) = compute_reference_maps(&graph, &settings).unwrap();

    assert!(reference_maps.get(StateId(0)).unwrap().is_empty());
    assert_eq!(&[Register::RCX], reference_maps.get(StateId(1)).unwrap().registers());
}

#[test]
fn test_state_values_are_roots() {
    let settings = Settings::x64();
    let value = LiveValue::reference(0);
    let frame_value = LiveValue::reference(1);

    let graph = ControlFlowGraph::new(
        vec![
            BasicBlock::new(0, vec![
                Instruction::new(0, "new_object").with_output(Location::Register(Register::R12), value),
                Instruction::new(2, "new_object").with_output(Location::stack(16), frame_value),
                Instruction::new(4, "call")
                    .with_state(
                        StateDescriptor::new(0)
                            .with_value(Operand::new(Location::Register(Register::R12), value))
                            .with_value(Operand::new(Location::stack(16), frame_value))
                    )
                    .destroying_caller_saved_registers(),
                Instruction::new(6, "return")
            ])
        ],
        &[]
    ).unwrap();

    let (liveness, reference_maps) = compute_reference_maps(&graph, &settings).unwrap();

    let reference_map = reference_maps.get(StateId(0)).unwrap();
    assert!(reference_map.contains(&Location::Register(Register::R12)));
    assert!(reference_map.contains(&Location::stack(16)));
    assert!(liveness.live_in(0).is_empty());
}

#[test]
fn test_reference_maps_in_loop() {
    let settings = Settings::x64();
    let list = LiveValue::reference(0);
    let element = LiveValue::reference(1);

    let graph = ControlFlowGraph::new(
        vec![
            BasicBlock::new(0, vec![
                Instruction::new(0, "new_list").with_output(Location::Register(Register::RBX), list),
            ]),
            BasicBlock::new(1, vec![
                Instruction::new(2, "safepoint").with_state(StateDescriptor::new(0)),
                Instruction::new(4, "branch")
            ]),
            BasicBlock::new(2, vec![
                Instruction::new(6, "new_object").with_output(Location::Register(Register::R13), element),
                Instruction::new(8, "call")
                    .with_state(StateDescriptor::new(1))
                    .destroying_caller_saved_registers(),
                Instruction::new(10, "add")
                    .with_input(Location::Register(Register::RBX), list)
                    .with_input(Location::Register(Register::R13), element),
            ]),
            BasicBlock::new(3, vec![
                Instruction::new(12, "return")
            ])
        ],
        &[
            ControlFlowEdge { from: 0, to: 1 },
            ControlFlowEdge { from: 1, to: 2 },
            ControlFlowEdge { from: 2, to: 1 },
            ControlFlowEdge { from: 1, to: 3 }
        ]
    ).unwrap();

    let (_, reference_maps) = compute_reference_maps(&graph, &settings).unwrap();

    assert_eq!(2, reference_maps.len());
    assert_eq!(&[Register::RBX], reference_maps.get(StateId(0)).unwrap().registers());

    let mut expected = vec![Register::RBX, Register::R13];
    expected.sort();
    assert_eq!(expected.as_slice(), reference_maps.get(StateId(1)).unwrap().registers());
}
