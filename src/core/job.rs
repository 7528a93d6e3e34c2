use crate::core::{EntityId, JobId, SimTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, FromRepr};

#[derive(
    Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Display, EnumIter, FromRepr,
)]
pub enum JobState {
    #[strum(to_string = "Queued")]
    Queued,
    #[strum(to_string = "Running")]
    Running,
    #[strum(to_string = "Success")]
    Success,
    #[strum(to_string = "Failure")]
    Failure,
}

impl JobState {
    /// Whether the job has left the VM for good in its current submission.
    pub fn is_final(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }

    /// Legal state transitions.
    ///
    /// A finished job may go back to `Queued` when its owner resubmits it.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (*self, next),
            (Queued, Running)
                | (Queued, Failure)
                | (Running, Success)
                | (Running, Failure)
                | (Success, Queued)
                | (Failure, Queued)
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Number of instructions to execute
    pub size: u64,
    pub state: JobState,

    /// Entity that submitted the job (set by the VM on admission)
    pub owner: Option<EntityId>,
    /// VM the job was last queued on
    pub vm: Option<EntityId>,

    /// When the owner released the job
    pub submit_time: Option<SimTime>,
    /// When the job arrived in the VM queue
    pub remote_queue_time: Option<SimTime>,
    pub start_time: Option<SimTime>,
    pub finish_time: Option<SimTime>,
}

impl Job {
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    /// Execution time on the VM, available once the job completed.
    pub fn duration(&self) -> Option<f64> {
        Some(self.finish_time? - self.start_time?)
    }

    /// Time spent waiting in the VM queue before a core picked it up.
    pub fn wait_time(&self) -> Option<f64> {
        Some(self.start_time? - self.remote_queue_time?)
    }

    /// Move to `next`, logging and ignoring illegal transitions.
    pub(crate) fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "Job {} cannot transition from {} to {}",
                self.id,
                self.state,
                next
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Clear per-run stamps before handing the job to a VM again.
    pub fn reset_for_resubmit(&mut self) {
        if self.state.is_final() {
            self.state = JobState::Queued;
        }
        self.remote_queue_time = None;
        self.start_time = None;
        self.finish_time = None;
    }
}

#[derive(Default)]
pub struct JobBuilder {
    id: Option<JobId>,
    size: u64,
    owner: Option<EntityId>,
    submit_time: Option<SimTime>,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn owner(mut self, owner: EntityId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn submit_time(mut self, submit_time: SimTime) -> Self {
        self.submit_time = Some(submit_time);
        self
    }

    pub fn build(self) -> Job {
        Job {
            id: self.id.unwrap_or(JobId(0)),
            size: self.size,
            state: JobState::Queued,
            owner: self.owner,
            vm: None,
            submit_time: self.submit_time,
            remote_queue_time: None,
            start_time: None,
            finish_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_builder_defaults() {
        let job = JobBuilder::new().id(JobId(7)).size(1000).build();
        assert_eq!(job.id, JobId(7));
        assert_eq!(job.size, 1000);
        assert_eq!(job.state, JobState::Queued);
        assert!(job.owner.is_none());
        assert!(job.vm.is_none());
        assert!(job.duration().is_none());
    }

    #[test]
    fn test_duration_and_wait_time() {
        let mut job = Job::builder().size(10).build();
        job.remote_queue_time = Some(1.0);
        job.start_time = Some(3.0);
        assert_eq!(job.wait_time(), Some(2.0));
        assert_eq!(job.duration(), None);
        job.finish_time = Some(7.5);
        assert_eq!(job.duration(), Some(4.5));
    }

    #[test]
    fn test_state_transitions() {
        assert!(JobState::Queued.can_transition_to(JobState::Running));
        assert!(JobState::Queued.can_transition_to(JobState::Failure));
        assert!(JobState::Running.can_transition_to(JobState::Success));
        assert!(JobState::Running.can_transition_to(JobState::Failure));
        assert!(!JobState::Queued.can_transition_to(JobState::Success));
        assert!(!JobState::Success.can_transition_to(JobState::Running));
        assert!(!JobState::Failure.can_transition_to(JobState::Success));

        for state in JobState::iter() {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut job = Job::builder().size(1).build();
        assert!(!job.transition(JobState::Success));
        assert_eq!(job.state, JobState::Queued);
        assert!(job.transition(JobState::Running));
        assert!(job.transition(JobState::Success));
    }

    #[test]
    fn test_reset_for_resubmit() {
        let mut job = Job::builder().size(1).build();
        job.state = JobState::Failure;
        job.start_time = Some(1.0);
        job.remote_queue_time = Some(0.5);
        job.reset_for_resubmit();
        assert_eq!(job.state, JobState::Queued);
        assert!(job.start_time.is_none());
        assert!(job.remote_queue_time.is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(JobState::Success.to_string(), "Success");
        assert_eq!(JobState::from_repr(3), Some(JobState::Failure));
    }
}
