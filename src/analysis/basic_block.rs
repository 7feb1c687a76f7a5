use crate::model::Position;
use crate::model::instruction::Instruction;

pub struct BasicBlock {
    pub index: usize,
    pub instructions: Vec<Instruction>,
    pub successors: Vec<usize>,
    pub predecessors: Vec<usize>
}

impl BasicBlock {
    pub fn new(index: usize, instructions: Vec<Instruction>) -> BasicBlock {
        BasicBlock {
            index,
            instructions,
            successors: Vec::new(),
            predecessors: Vec::new()
        }
    }

    pub fn first(&self) -> Option<&Instruction> {
        self.instructions.first()
    }

    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    pub fn first_position(&self) -> Option<Position> {
        self.first().map(|instruction| instruction.id)
    }

    pub fn last_position(&self) -> Option<Position> {
        self.last().map(|instruction| instruction.id)
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[test]
fn test_block_positions() {
    let block = BasicBlock::new(
        0,
        vec![
            Instruction::new(0, "label"),
            Instruction::new(2, "add"),
            Instruction::new(4, "return")
        ]
    );

    assert_eq!(Some(0), block.first_position());
    assert_eq!(Some(4), block.last_position());
    assert_eq!("return", block.last().unwrap().name);

    let empty = BasicBlock::new(1, Vec::new());
    assert!(empty.is_empty());
    assert_eq!(None, empty.first_position());
}
