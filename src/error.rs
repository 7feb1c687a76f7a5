use std::fmt;

use thiserror::Error;

use crate::model::Position;
use crate::model::location::Location;
use crate::model::value::LiveValue;
use crate::optimization::register_allocation::interval::{IntervalId, RegisterBinding};

/// Aborts the allocation of the current compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationError {
    pub position: Option<Position>,
    pub message: AllocationErrorMessage
}

impl AllocationError {
    pub fn new(message: AllocationErrorMessage) -> AllocationError {
        AllocationError {
            position: None,
            message
        }
    }

    pub fn with_position(position: Position, message: AllocationErrorMessage) -> AllocationError {
        AllocationError {
            position: Some(position),
            message
        }
    }

    /// Running out of iterations fails the unit but says nothing about a bug in the allocator.
    pub fn is_internal_error(&self) -> bool {
        match self.message {
            AllocationErrorMessage::IterationLimitExceeded(_) => false,
            _ => true
        }
    }
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} (at position {})", self.message, position),
            None => write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AllocationError {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationErrorMessage {
    #[error("location {location} holds {stored} but {removed} was defined there")]
    InconsistentValue { location: Location, stored: LiveValue, removed: LiveValue },
    #[error("can not walk backwards from {current} to {requested}")]
    WalkingBackwards { current: Position, requested: Position },
    #[error("interval {0} has not been found in the {1:?} list")]
    IntervalNotInList(IntervalId, RegisterBinding),
    #[error("the {0:?} list is not sorted")]
    UnsortedBindingList(RegisterBinding),
    #[error("interval {0} can not be split at {1}")]
    SplitOutsideInterval(IntervalId, Position),
    #[error("interval {0} has no split child at {1}")]
    NoSplitChild(IntervalId, Position),
    #[error("split children {0} and {1} overlap")]
    OverlappingSplitChildren(IntervalId, IntervalId),
    #[error("use position {1} of interval {0} is out of order or not covered")]
    InvalidUsePosition(IntervalId, Position),
    #[error("edge from block {0} to block {1} leaves the graph")]
    DanglingEdge(usize, usize),
    #[error("edge from block {0} to block {1} has no matching predecessor entry")]
    AsymmetricEdge(usize, usize),
    #[error("live-out of block {0} is not the union of its successors' live-in")]
    FixedPointViolation(usize),
    #[error("liveness did not converge within {0} iterations")]
    IterationLimitExceeded(usize)
}

pub type AllocationResult<T> = Result<T, AllocationError>;

#[test]
fn test_display() {
    let error = AllocationError::with_position(
        12,
        AllocationErrorMessage::WalkingBackwards { current: 12, requested: 4 }
    );

    assert_eq!("can not walk backwards from 12 to 4 (at position 12)", error.to_string());
    assert!(error.is_internal_error());
    assert!(!AllocationError::new(AllocationErrorMessage::IterationLimitExceeded(10)).is_internal_error());
}
