pub mod config;
pub mod core;
pub mod scenario;
pub mod utils;

pub use crate::core::engine::Simulation;
pub use crate::core::job::{Job, JobState};
pub use crate::core::vm::{Vm, VmSpec, VmState};
