use std::fmt;

use smallvec::SmallVec;

use crate::model::Position;
use crate::model::location::Location;
use crate::model::value::LiveValue;

/// A value at the location it occupies for one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub location: Location,
    pub value: LiveValue
}

impl Operand {
    pub fn new(location: Location, value: LiveValue) -> Operand {
        Operand {
            location,
            value
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

/// A program point that needs a reference map, together with the values it keeps alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDescriptor {
    pub id: StateId,
    pub values: SmallVec<[Operand; 4]>
}

impl StateDescriptor {
    pub fn new(id: usize) -> StateDescriptor {
        StateDescriptor {
            id: StateId(id),
            values: SmallVec::new()
        }
    }

    pub fn with_value(mut self, operand: Operand) -> StateDescriptor {
        self.values.push(operand);
        self
    }
}

/// An instruction of the linearized program, after locations have been assigned.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub id: Position,
    pub name: &'static str,
    pub inputs: SmallVec<[Operand; 4]>,
    /// Inputs that must stay intact until the outputs have been written.
    pub alive: SmallVec<[Operand; 2]>,
    pub temps: SmallVec<[Operand; 2]>,
    pub outputs: SmallVec<[Operand; 2]>,
    pub states: Vec<StateDescriptor>,
    pub destroys_caller_saved_registers: bool
}

impl Instruction {
    pub fn new(id: Position, name: &'static str) -> Instruction {
        Instruction {
            id,
            name,
            inputs: SmallVec::new(),
            alive: SmallVec::new(),
            temps: SmallVec::new(),
            outputs: SmallVec::new(),
            states: Vec::new(),
            destroys_caller_saved_registers: false
        }
    }

    pub fn with_input(mut self, location: Location, value: LiveValue) -> Instruction {
        self.inputs.push(Operand::new(location, value));
        self
    }

    pub fn with_alive(mut self, location: Location, value: LiveValue) -> Instruction {
        self.alive.push(Operand::new(location, value));
        self
    }

    pub fn with_temp(mut self, location: Location, value: LiveValue) -> Instruction {
        self.temps.push(Operand::new(location, value));
        self
    }

    pub fn with_output(mut self, location: Location, value: LiveValue) -> Instruction {
        self.outputs.push(Operand::new(location, value));
        self
    }

    pub fn with_state(mut self, state: StateDescriptor) -> Instruction {
        self.states.push(state);
        self
    }

    /// Marks a call-like instruction.
    pub fn destroying_caller_saved_registers(mut self) -> Instruction {
        self.destroys_caller_saved_registers = true;
        self
    }

    pub fn defs(&self) -> impl Iterator<Item=&Operand> {
        self.temps.iter().chain(self.outputs.iter())
    }

    pub fn uses(&self) -> impl Iterator<Item=&Operand> {
        self.inputs.iter()
            .chain(self.alive.iter())
            .chain(self.states.iter().flat_map(|state| state.values.iter()))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.name)?;

        let mut separator = " ";
        for output in &self.outputs {
            write!(f, "{}{} = {}", separator, output.location, output.value)?;
            separator = ", ";
        }

        for input in self.inputs.iter().chain(self.alive.iter()) {
            write!(f, "{}{}({})", separator, input.location, input.value)?;
            separator = ", ";
        }

        if self.destroys_caller_saved_registers {
            write!(f, " [call]")?;
        }

        Ok(())
    }
}
