use lsra::{AllocationError, AllocationErrorMessage, AllocationResult};
use lsra::analysis::basic_block::BasicBlock;
use lsra::analysis::control_flow_graph::{ControlFlowEdge, ControlFlowGraph};
use lsra::analysis::liveness::compute_reference_maps;
use lsra::compiler::Settings;
use lsra::model::Position;
use lsra::model::instruction::{Instruction, StateDescriptor, StateId};
use lsra::model::location::Location;
use lsra::model::value::LiveValue;
use lsra::optimization::register_allocation::interval::{IntervalId, Intervals, OperandMode, RegisterPriority};
use lsra::optimization::register_allocation::linear_scan::allocate;

fn create_variable(intervals: &mut Intervals, value: LiveValue, from: Position, to: Position, uses: &[Position]) -> AllocationResult<IntervalId> {
    let id = intervals.create_variable(value);
    intervals[id].add_range(from, to);
    intervals.record_definition(id, from);

    for &position in uses.iter().rev() {
        intervals.add_use_pos(id, position, RegisterPriority::MustHaveRegister, true)?;
    }

    Ok(id)
}

/// The location of the split child of `interval` that holds the operand at `position`.
fn location(intervals: &Intervals, interval: IntervalId, position: Position, mode: OperandMode) -> AllocationResult<Location> {
    let child = intervals.split_child_at(interval, position, mode)?;
    intervals[child]
        .location()
        .ok_or(AllocationError::with_position(position, AllocationErrorMessage::NoSplitChild(interval, position)))
}

fn main() -> AllocationResult<()> {
    env_logger::init();

    let settings = Settings::x64();
    let array = LiveValue::reference(0);
    let counter = LiveValue::int(1);
    let element = LiveValue::reference(2);

    let mut intervals = Intervals::new();
    let array_interval = create_variable(&mut intervals, array, 0, 13, &[6, 12])?;
    let counter_interval = create_variable(&mut intervals, counter, 2, 12, &[8, 10])?;
    let element_interval = create_variable(&mut intervals, element, 4, 7, &[6])?;

    for &register in settings.register_config.caller_saved() {
        let fixed = intervals.create_fixed(register);
        intervals[fixed].add_range(4, 5);
    }

    let allocation = allocate(&mut intervals, 12, &settings)?;

    println!("Intervals:");
    intervals.print_intervals();
    println!();

    println!("Allocation:");
    allocation.print_allocation();
    println!();

    let at = |interval: IntervalId, position: Position, mode: OperandMode| location(&intervals, interval, position, mode);
    let graph = ControlFlowGraph::new(
        vec![
            BasicBlock::new(0, vec![
                Instruction::new(0, "new_array").with_output(at(array_interval, 0, OperandMode::Def)?, array),
                Instruction::new(2, "const").with_output(at(counter_interval, 2, OperandMode::Def)?, counter)
            ]),
            BasicBlock::new(1, vec![
                Instruction::new(4, "new_object")
                    .with_output(at(element_interval, 4, OperandMode::Def)?, element)
                    .with_state(StateDescriptor::new(0))
                    .destroying_caller_saved_registers(),
                Instruction::new(6, "store_element")
                    .with_input(at(array_interval, 6, OperandMode::Use)?, array)
                    .with_input(at(element_interval, 6, OperandMode::Use)?, element),
                Instruction::new(8, "decrement")
                    .with_input(at(counter_interval, 8, OperandMode::Use)?, counter)
                    .with_output(at(counter_interval, 8, OperandMode::Def)?, counter),
                Instruction::new(10, "branch").with_input(at(counter_interval, 10, OperandMode::Use)?, counter)
            ]),
            BasicBlock::new(2, vec![
                Instruction::new(12, "return").with_input(at(array_interval, 12, OperandMode::Use)?, array)
            ])
        ],
        &[
            ControlFlowEdge { from: 0, to: 1 },
            ControlFlowEdge { from: 1, to: 1 },
            ControlFlowEdge { from: 1, to: 2 }
        ]
    )?;

    println!("Program:");
    graph.print_graph();
    println!();

    let (liveness, reference_maps) = compute_reference_maps(&graph, &settings)?;
    for block in graph.blocks() {
        println!("B{} live-in: {:?}", block.index, liveness.live_in(block.index));
    }

    if let Some(reference_map) = reference_maps.get(StateId(0)) {
        println!("Reference map at state 0: {:?} {:?}", reference_map.registers(), reference_map.stack_slots());
    }

    Ok(())
}
