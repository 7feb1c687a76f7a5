use std::collections::VecDeque;

use log::{debug, trace};

use crate::analysis::control_flow_graph::ControlFlowGraph;
use crate::analysis::live_value_set::LiveValueSet;
use crate::analysis::reference_map::ReferenceMapBuilder;
use crate::compiler::Settings;
use crate::compiler::calling_conventions::RegisterConfig;
use crate::error::{AllocationError, AllocationErrorMessage, AllocationResult};
use crate::model::instruction::{Instruction, StateDescriptor};
use crate::model::location::Location;

/// Polled once per work list iteration to abort runaway fixed point computations.
pub trait ProgressAlarm {
    fn check(&mut self) -> AllocationResult<()>;
}

pub struct IterationLimit {
    limit: usize,
    iterations: usize
}

impl IterationLimit {
    pub fn new(limit: usize) -> IterationLimit {
        IterationLimit {
            limit,
            iterations: 0
        }
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl ProgressAlarm for IterationLimit {
    fn check(&mut self) -> AllocationResult<()> {
        self.iterations += 1;
        if self.iterations > self.limit {
            return Err(AllocationError::new(AllocationErrorMessage::IterationLimitExceeded(self.limit)));
        }

        Ok(())
    }
}

/// Live-in and live-out sets of every block at the fixed point.
pub struct LivenessResult<'a> {
    config: &'a RegisterConfig,
    live_in: Vec<LiveValueSet<'a>>,
    live_out: Vec<LiveValueSet<'a>>
}

impl<'a> LivenessResult<'a> {
    pub fn live_in(&self, block: usize) -> &LiveValueSet<'a> {
        &self.live_in[block]
    }

    pub fn live_out(&self, block: usize) -> &LiveValueSet<'a> {
        &self.live_out[block]
    }

    /// Checks that the live-out of every block is the union of the live-in of its successors.
    pub fn verify_fixed_point(&self, control_flow_graph: &ControlFlowGraph) -> AllocationResult<()> {
        for block in control_flow_graph.blocks() {
            let mut expected = LiveValueSet::new(self.config);
            for &successor in &block.successors {
                expected.put_all(&self.live_in[successor]);
            }

            if expected != self.live_out[block.index] {
                return Err(AllocationError::new(AllocationErrorMessage::FixedPointViolation(block.index)));
            }
        }

        Ok(())
    }
}

type StateConsumer<'c, 'a> = dyn FnMut(&Instruction, &StateDescriptor, &LiveValueSet<'a>) + 'c;

/// Backward dataflow over the blocks of a compilation unit.
pub struct LivenessPropagator<'a> {
    control_flow_graph: &'a ControlFlowGraph,
    config: &'a RegisterConfig,
    live_in: Vec<LiveValueSet<'a>>,
    live_out: Vec<Option<LiveValueSet<'a>>>
}

impl<'a> LivenessPropagator<'a> {
    pub fn new(control_flow_graph: &'a ControlFlowGraph, config: &'a RegisterConfig) -> LivenessPropagator<'a> {
        LivenessPropagator {
            control_flow_graph,
            config,
            live_in: (0..control_flow_graph.len()).map(|_| LiveValueSet::new(config)).collect(),
            live_out: (0..control_flow_graph.len()).map(|_| None).collect()
        }
    }

    /// Runs the work list to its fixed point, then replays every block once and reports the live
    /// values at each state descriptor to `state_consumer`.
    pub fn compute<F>(mut self,
                      alarm: &mut dyn ProgressAlarm,
                      mut state_consumer: F) -> AllocationResult<LivenessResult<'a>>
        where F: FnMut(&Instruction, &StateDescriptor, &LiveValueSet<'a>) {
        let num_blocks = self.control_flow_graph.len();
        let mut work_list = VecDeque::with_capacity(num_blocks);
        let mut in_work_list = vec![false; num_blocks];

        for block_index in (0..num_blocks).rev() {
            work_list.push_back(block_index);
            in_work_list[block_index] = true;
        }

        let mut iterations = 0;
        while let Some(block_index) = work_list.pop_front() {
            in_work_list[block_index] = false;
            alarm.check()?;
            iterations += 1;

            self.process_block(block_index, &mut work_list, &mut in_work_list)?;
        }

        debug!("liveness converged after {} block iterations", iterations);

        let LivenessPropagator { control_flow_graph, config, live_in, live_out } = self;
        let live_out = live_out
            .into_iter()
            .map(|live_out| live_out.unwrap_or_else(|| LiveValueSet::new(config)))
            .collect::<Vec<_>>();

        let state_consumer: &mut StateConsumer<'_, 'a> = &mut state_consumer;
        for block in control_flow_graph.blocks() {
            let mut live = live_out[block.index].clone();
            for instruction in block.instructions.iter().rev() {
                process_instruction(config, instruction, &mut live, Some(&mut *state_consumer))?;
            }

            debug_assert!(live == live_in[block.index], "replay of B{} diverged from the fixed point", block.index);
        }

        Ok(
            LivenessResult {
                config,
                live_in,
                live_out
            }
        )
    }

    fn process_block(&mut self,
                     block_index: usize,
                     work_list: &mut VecDeque<usize>,
                     in_work_list: &mut [bool]) -> AllocationResult<()> {
        let control_flow_graph = self.control_flow_graph;
        let block = control_flow_graph.block(block_index);

        let mut live_out = LiveValueSet::new(self.config);
        for &successor in &block.successors {
            live_out.put_all(&self.live_in[successor]);
        }

        if self.live_out[block_index].as_ref() == Some(&live_out) {
            trace!("B{}: live-out unchanged", block_index);
            return Ok(());
        }

        let mut live = live_out.clone();
        self.live_out[block_index] = Some(live_out);

        for instruction in block.instructions.iter().rev() {
            process_instruction(self.config, instruction, &mut live, None)?;
        }

        trace!("B{}: live-in {:?}", block_index, live);

        if live != self.live_in[block_index] {
            self.live_in[block_index] = live;

            for &predecessor in &block.predecessors {
                if !in_work_list[predecessor] {
                    in_work_list[predecessor] = true;
                    work_list.push_back(predecessor);
                }
            }
        }

        Ok(())
    }
}

/// Applies the backward transfer function of one instruction to `live`.
///
/// Temps, outputs and destroyed caller-saved registers are killed first. Values that must stay
/// alive across the instruction and the values referenced by its states are then added, the
/// states are reported, and finally the inputs are added.
fn process_instruction<'a>(config: &RegisterConfig,
                           instruction: &Instruction,
                           live: &mut LiveValueSet<'a>,
                           state_consumer: Option<&mut StateConsumer<'_, 'a>>) -> AllocationResult<()> {
    for operand in instruction.defs() {
        live.remove(operand.location, operand.value)
            .map_err(|error| AllocationError::with_position(instruction.id, error.message))?;
    }

    if instruction.destroys_caller_saved_registers {
        for &register in config.caller_saved() {
            live.kill(Location::Register(register));
        }
    }

    for operand in &instruction.alive {
        live.put(operand.location, operand.value);
    }

    for state in &instruction.states {
        for operand in &state.values {
            live.put(operand.location, operand.value);
        }
    }

    if let Some(state_consumer) = state_consumer {
        for state in &instruction.states {
            trace!("{}: state {:?} live {:?}", instruction.id, state.id, live);
            state_consumer(instruction, state, live);
        }
    }

    for operand in &instruction.inputs {
        live.put(operand.location, operand.value);
    }

    Ok(())
}

pub fn compute_liveness<'a, F>(control_flow_graph: &'a ControlFlowGraph,
                               settings: &'a Settings,
                               state_consumer: F) -> AllocationResult<LivenessResult<'a>>
    where F: FnMut(&Instruction, &StateDescriptor, &LiveValueSet<'a>) {
    let mut alarm = IterationLimit::new(settings.max_liveness_iterations);
    let result = LivenessPropagator::new(control_flow_graph, &settings.register_config)
        .compute(&mut alarm, state_consumer)?;

    if settings.detailed_asserts {
        result.verify_fixed_point(control_flow_graph)?;
    }

    Ok(result)
}

/// Computes liveness and the reference map of every state descriptor in the graph.
pub fn compute_reference_maps<'a>(control_flow_graph: &'a ControlFlowGraph,
                                  settings: &'a Settings) -> AllocationResult<(LivenessResult<'a>, ReferenceMapBuilder)> {
    let mut builder = ReferenceMapBuilder::new();
    let result = compute_liveness(
        control_flow_graph,
        settings,
        |instruction, state, live_values| builder.record(instruction, state, live_values)
    )?;

    Ok((result, builder))
}
