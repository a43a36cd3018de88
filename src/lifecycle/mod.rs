//! Contest lifecycle scheduling

pub mod scheduler;

pub use scheduler::{ContestScheduler, Transition};
