pub mod calling_conventions;
pub mod stack_layout;

use crate::compiler::calling_conventions::RegisterConfig;

pub struct Settings {
    pub register_config: RegisterConfig,
    /// Upper bound on the work list iterations of the liveness fixed point.
    pub max_liveness_iterations: usize,
    /// Enables the expensive consistency checks (sorted binding lists, use positions, fixed point).
    pub detailed_asserts: bool
}

impl Settings {
    pub fn x64() -> Settings {
        Settings {
            register_config: RegisterConfig::x64(),
            max_liveness_iterations: 100_000,
            detailed_asserts: cfg!(debug_assertions)
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::x64()
    }
}
