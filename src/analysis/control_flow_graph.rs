use log::debug;

use crate::analysis::basic_block::BasicBlock;
use crate::error::{AllocationError, AllocationErrorMessage, AllocationResult};
use crate::model::Position;
use crate::model::instruction::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlFlowEdge {
    pub from: usize,
    pub to: usize
}

/// The blocks of one compilation unit in linear-scan order.
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>
}

impl ControlFlowGraph {
    /// Creates the graph from blocks and the edges between them. The successor and predecessor
    /// lists of the blocks are filled in from the edges.
    pub fn new(blocks: Vec<BasicBlock>, edges: &[ControlFlowEdge]) -> AllocationResult<ControlFlowGraph> {
        let mut blocks = blocks;

        for edge in edges {
            if edge.from >= blocks.len() || edge.to >= blocks.len() {
                return Err(AllocationError::new(AllocationErrorMessage::DanglingEdge(edge.from, edge.to)));
            }

            if !blocks[edge.from].successors.contains(&edge.to) {
                blocks[edge.from].successors.push(edge.to);
            }

            if !blocks[edge.to].predecessors.contains(&edge.from) {
                blocks[edge.to].predecessors.push(edge.from);
            }
        }

        ControlFlowGraph::from_blocks(blocks)
    }

    /// Creates the graph from blocks whose successor and predecessor lists are already set.
    pub fn from_blocks(blocks: Vec<BasicBlock>) -> AllocationResult<ControlFlowGraph> {
        for (block_index, block) in blocks.iter().enumerate() {
            for &successor in &block.successors {
                let target = blocks
                    .get(successor)
                    .ok_or(AllocationError::new(AllocationErrorMessage::DanglingEdge(block_index, successor)))?;

                if !target.predecessors.contains(&block_index) {
                    return Err(AllocationError::new(AllocationErrorMessage::AsymmetricEdge(block_index, successor)));
                }
            }

            for &predecessor in &block.predecessors {
                let source = blocks
                    .get(predecessor)
                    .ok_or(AllocationError::new(AllocationErrorMessage::DanglingEdge(predecessor, block_index)))?;

                if !source.successors.contains(&block_index) {
                    return Err(AllocationError::new(AllocationErrorMessage::AsymmetricEdge(predecessor, block_index)));
                }
            }
        }

        debug!("control flow graph with {} blocks", blocks.len());

        Ok(
            ControlFlowGraph {
                blocks
            }
        )
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> &BasicBlock {
        &self.blocks[index]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item=ControlFlowEdge> + '_ {
        self.blocks.iter().flat_map(|block| {
            block.successors.iter().map(move |&to| ControlFlowEdge { from: block.index, to })
        })
    }

    pub fn instructions(&self) -> impl Iterator<Item=&Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }

    /// The position of the last instruction in the graph.
    pub fn max_position(&self) -> Position {
        self.blocks
            .iter()
            .filter_map(|block| block.last_position())
            .max()
            .unwrap_or(0)
    }

    pub fn print_graph(&self) {
        for block in &self.blocks {
            println!(
                "B{} {:?}..{:?} -> {:?}",
                block.index,
                block.first_position(),
                block.last_position(),
                block.successors
            );

            for instruction in &block.instructions {
                println!("\t{}", instruction);
            }
        }
    }
}

#[test]
fn test_edges_fill_block_lists() {
    let blocks = vec![
        BasicBlock::new(0, vec![Instruction::new(0, "branch")]),
        BasicBlock::new(1, vec![Instruction::new(2, "a")]),
        BasicBlock::new(2, vec![Instruction::new(4, "b")]),
        BasicBlock::new(3, vec![Instruction::new(6, "return")])
    ];

    let control_flow_graph = ControlFlowGraph::new(
        blocks,
        &[
            ControlFlowEdge { from: 0, to: 1 },
            ControlFlowEdge { from: 0, to: 2 },
            ControlFlowEdge { from: 1, to: 3 },
            ControlFlowEdge { from: 2, to: 3 }
        ]
    ).unwrap();

    assert_eq!(vec![1, 2], control_flow_graph.block(0).successors);
    assert_eq!(vec![1, 2], control_flow_graph.block(3).predecessors);
    assert_eq!(4, control_flow_graph.edges().count());
    assert_eq!(6, control_flow_graph.max_position());
}

#[test]
fn test_dangling_edge() {
    let blocks = vec![BasicBlock::new(0, vec![Instruction::new(0, "return")])];
    let result = ControlFlowGraph::new(blocks, &[ControlFlowEdge { from: 0, to: 1 }]);
    assert_eq!(AllocationErrorMessage::DanglingEdge(0, 1), result.err().unwrap().message);
}

#[test]
fn test_asymmetric_edge() {
    let mut first = BasicBlock::new(0, vec![Instruction::new(0, "jump")]);
    first.successors.push(1);
    let second = BasicBlock::new(1, vec![Instruction::new(2, "return")]);

    let result = ControlFlowGraph::from_blocks(vec![first, second]);
    assert_eq!(AllocationErrorMessage::AsymmetricEdge(0, 1), result.err().unwrap().message);
}
