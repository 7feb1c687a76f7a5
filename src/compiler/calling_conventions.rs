use iced_x86::Register;

use crate::model::location::RegisterClass;

lazy_static! {
    static ref ALLOCATABLE_X64: Vec<Register> = {
        vec![
            Register::RAX,
            Register::RCX,
            Register::RDX,
            Register::RBX,
            Register::RSI,
            Register::RDI,
            Register::R8,
            Register::R9,
            Register::R10,
            Register::R11,
            Register::R12,
            Register::R13,
            Register::R14,
            Register::R15,
            Register::XMM0,
            Register::XMM1,
            Register::XMM2,
            Register::XMM3,
            Register::XMM4,
            Register::XMM5,
            Register::XMM6,
            Register::XMM7,
            Register::XMM8,
            Register::XMM9,
            Register::XMM10,
            Register::XMM11,
            Register::XMM12,
            Register::XMM13,
            Register::XMM14,
            Register::XMM15
        ]
    };

    static ref CALLER_SAVED_X64: Vec<Register> = {
        vec![
            Register::RAX,
            Register::RCX,
            Register::RDX,
            Register::RSI,
            Register::RDI,
            Register::R8,
            Register::R9,
            Register::R10,
            Register::R11,
            Register::XMM0,
            Register::XMM1,
            Register::XMM2,
            Register::XMM3,
            Register::XMM4,
            Register::XMM5,
            Register::XMM6,
            Register::XMM7,
            Register::XMM8,
            Register::XMM9,
            Register::XMM10,
            Register::XMM11,
            Register::XMM12,
            Register::XMM13,
            Register::XMM14,
            Register::XMM15
        ]
    };
}

const NUM_REGISTER_NUMBERS: usize = 256;

/// The registers the allocator may hand out and the ones a call destroys.
#[derive(Debug, Clone)]
pub struct RegisterConfig {
    allocatable: Vec<Register>,
    caller_saved: Vec<Register>,
    dense_index: Vec<Option<usize>>
}

impl RegisterConfig {
    pub fn new(allocatable: Vec<Register>, caller_saved: Vec<Register>) -> RegisterConfig {
        let mut dense_index = vec![None; NUM_REGISTER_NUMBERS];
        for (index, register) in allocatable.iter().enumerate() {
            dense_index[*register as usize] = Some(index);
        }

        RegisterConfig {
            allocatable,
            caller_saved,
            dense_index
        }
    }

    /// The System V configuration. RSP and RBP are never allocatable.
    pub fn x64() -> RegisterConfig {
        RegisterConfig::new(ALLOCATABLE_X64.clone(), CALLER_SAVED_X64.clone())
    }

    pub fn allocatable(&self) -> &[Register] {
        &self.allocatable
    }

    pub fn allocatable_of_class<'a>(&'a self, class: RegisterClass) -> impl Iterator<Item=Register> + 'a {
        self.allocatable.iter().cloned().filter(move |register| RegisterClass::of(*register) == class)
    }

    pub fn caller_saved(&self) -> &[Register] {
        &self.caller_saved
    }

    pub fn is_allocatable(&self, register: Register) -> bool {
        self.register_index(register).is_some()
    }

    /// Index of the register among the allocatable ones.
    pub fn register_index(&self, register: Register) -> Option<usize> {
        self.dense_index.get(register as usize).cloned().flatten()
    }

    pub fn register_at(&self, index: usize) -> Register {
        self.allocatable[index]
    }
}

/// Integer argument registers of the System V calling convention.
pub mod register_call_arguments {
    use iced_x86::Register;

    const ARGUMENTS: [Register; 6] = [Register::RDI, Register::RSI, Register::RDX, Register::RCX, Register::R8, Register::R9];

    pub fn get_argument(index: usize) -> Option<Register> {
        ARGUMENTS.get(index).cloned()
    }

    pub const RETURN_VALUE: Register = Register::RAX;
}

#[test]
fn test_x64_config() {
    let config = RegisterConfig::x64();
    assert!(config.is_allocatable(Register::RAX));
    assert!(config.is_allocatable(Register::XMM15));
    assert!(!config.is_allocatable(Register::RSP));
    assert!(!config.is_allocatable(Register::RBP));
    assert_eq!(Some(0), config.register_index(Register::RAX));
    assert_eq!(Register::RCX, config.register_at(1));
    assert_eq!(14, config.allocatable_of_class(RegisterClass::General).count());
    assert_eq!(16, config.allocatable_of_class(RegisterClass::Float).count());
    assert!(config.caller_saved().contains(&register_call_arguments::RETURN_VALUE));
    assert_eq!(Some(Register::R9), register_call_arguments::get_argument(5));
    assert_eq!(None, register_call_arguments::get_argument(6));
    assert!(!config.caller_saved().contains(&Register::RBX));
}
