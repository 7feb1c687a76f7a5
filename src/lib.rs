#[macro_use]
extern crate lazy_static;

pub mod error;
pub mod model;
pub mod compiler;
pub mod analysis;
pub mod optimization;

#[cfg(test)]
mod allocation_tests;

pub use crate::error::{AllocationError, AllocationErrorMessage, AllocationResult};
