pub mod engine;
pub mod event;
pub mod job;
pub mod port;
pub mod trace;
pub mod vm;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Simulated time in seconds.
pub type SimTime = f64;

/// How many seconds there are in one hour
pub const SECONDS_PER_HOUR: f64 = 60.0 * 60.0;

pub const DEFAULT_PROVISIONING_DELAY: f64 = 60.0;

pub const DEFAULT_DEPROVISIONING_DELAY: f64 = 10.0;

/// Identifier of a simulation entity (VM, owner, cloud).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a job, unique within one simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out entity and job ids for a single simulation run.
///
/// Every run owns its own allocator, so two independent simulations in the
/// same process never share numbering.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_entity: u32,
    next_job: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_entity(&mut self) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        id
    }

    pub fn next_job(&mut self) -> JobId {
        let id = JobId(self.next_job);
        self.next_job += 1;
        id
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))
        .map(|p| p.join("vmsim"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocators_are_independent() {
        let mut a = IdAllocator::new();
        let mut b = IdAllocator::new();

        assert_eq!(a.next_entity(), EntityId(0));
        assert_eq!(a.next_entity(), EntityId(1));
        assert_eq!(b.next_entity(), EntityId(0));

        assert_eq!(a.next_job(), JobId(0));
        assert_eq!(b.next_job(), JobId(0));
        assert_eq!(b.next_job(), JobId(1));
    }
}
