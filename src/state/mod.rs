//! Ordered identifiers for browser builds and the spaces they live in.

pub mod build;
pub mod space;

pub use build::{Browser, State, StateError, StateType};
pub use space::{ReleaseIndex, StateSpace};
