//! Execution log of a simulation run.
//!
//! Records when each job started and finished and when each VM was launched
//! and terminated, can be exported as CSV, and can be checked for basic
//! ordering violations after a run.

use crate::core::job::{Job, JobState};
use crate::core::{EntityId, JobId, SimTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub job: JobId,
    /// 1 for the first submission, bumped on every resubmission
    pub attempt: u32,
    pub vm: Option<EntityId>,
    pub submitted: Option<SimTime>,
    pub started: Option<SimTime>,
    pub finished: Option<SimTime>,
    pub state: JobState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmRecord {
    pub vm: EntityId,
    /// Billing start
    pub launched: Option<SimTime>,
    /// When the VM started accepting jobs
    pub ready: Option<SimTime>,
    /// Billing end
    pub terminated: Option<SimTime>,
}

#[derive(Debug, Default)]
pub struct ExecutionLog {
    tasks: BTreeMap<JobId, Vec<TaskRecord>>,
    vms: BTreeMap<EntityId, VmRecord>,
}

/// One line of the CSV export.
#[derive(Debug, Serialize)]
struct TraceRow {
    kind: &'static str,
    id: u64,
    host: Option<u32>,
    started: Option<SimTime>,
    finished: Option<SimTime>,
    state: String,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt of every job, ordered by job id then attempt.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values().flatten()
    }

    /// Latest attempt of `job`.
    pub fn task(&self, job: JobId) -> Option<&TaskRecord> {
        self.tasks.get(&job).and_then(|attempts| attempts.last())
    }

    pub fn attempts(&self, job: JobId) -> &[TaskRecord] {
        self.tasks.get(&job).map(|a| a.as_slice()).unwrap_or(&[])
    }

    pub fn vms(&self) -> impl Iterator<Item = &VmRecord> {
        self.vms.values()
    }

    pub fn vm(&self, vm: EntityId) -> Option<&VmRecord> {
        self.vms.get(&vm)
    }

    pub(crate) fn vm_record(&mut self, vm: EntityId) -> &mut VmRecord {
        self.vms.entry(vm).or_insert(VmRecord {
            vm,
            launched: None,
            ready: None,
            terminated: None,
        })
    }

    pub(crate) fn job_submitted(&mut self, job: &Job, vm: EntityId, now: SimTime) {
        let attempts = self.tasks.entry(job.id).or_default();
        let attempt = attempts.len() as u32 + 1;
        attempts.push(TaskRecord {
            job: job.id,
            attempt,
            vm: Some(vm),
            submitted: Some(now),
            started: None,
            finished: None,
            state: job.state,
        });
    }

    pub(crate) fn job_started(&mut self, job: &Job, now: SimTime) {
        let record = self.record_for(job);
        record.started = Some(now);
        record.state = job.state;
    }

    pub(crate) fn job_finished(&mut self, job: &Job, now: SimTime) {
        let record = self.record_for(job);
        record.finished = Some(now);
        record.state = job.state;
    }

    fn record_for(&mut self, job: &Job) -> &mut TaskRecord {
        let attempts = self.tasks.entry(job.id).or_default();
        if attempts.is_empty() {
            attempts.push(TaskRecord {
                job: job.id,
                attempt: 1,
                vm: job.vm,
                submitted: job.submit_time,
                started: None,
                finished: None,
                state: job.state,
            });
        }
        let last = attempts.len() - 1;
        &mut attempts[last]
    }

    /// Check that every task and VM both started and finished, in order.
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        for task in self.tasks() {
            let name = if task.attempt > 1 {
                format!("job {} (attempt {})", task.job, task.attempt)
            } else {
                format!("job {}", task.job)
            };
            match (task.started, task.finished) {
                (None, _) => errors.push(format!("{name} hasn't started computation at all")),
                (_, None) => errors.push(format!("{name} hasn't finished computation at all")),
                (Some(started), Some(finished)) if started > finished => {
                    errors.push(format!("{name} didn't hold time order"))
                }
                _ => {}
            }
        }

        for vm in self.vms.values() {
            match (vm.launched, vm.terminated) {
                (None, _) => errors.push(format!("VM {} hasn't been launched at all", vm.vm)),
                (_, None) => errors.push(format!("VM {} hasn't been terminated at all", vm.vm)),
                (Some(launched), Some(terminated)) if launched > terminated => errors.push(
                    format!("VM {} provisioning didn't hold time order", vm.vm),
                ),
                _ => {}
            }
        }

        ValidationResult { errors }
    }

    /// Write tasks then VMs as CSV rows.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for task in self.tasks() {
            wtr.serialize(TraceRow {
                kind: "task",
                id: task.job.0,
                host: task.vm.map(|vm| vm.0),
                started: task.started,
                finished: task.finished,
                state: task.state.to_string(),
            })?;
        }
        for vm in self.vms.values() {
            wtr.serialize(TraceRow {
                kind: "vm",
                id: vm.vm.0 as u64,
                host: None,
                started: vm.launched,
                finished: vm.terminated,
                state: if vm.terminated.is_some() {
                    "Terminated".to_string()
                } else {
                    "Running".to_string()
                },
            })?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(io::BufWriter::new(file))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u64, state: JobState) -> Job {
        let mut job = Job::builder().id(JobId(id)).size(10).build();
        job.state = state;
        job
    }

    #[test]
    fn test_complete_run_is_valid() {
        let mut log = ExecutionLog::new();
        log.vm_record(EntityId(0)).launched = Some(0.0);
        log.vm_record(EntityId(0)).terminated = Some(10.0);
        log.job_submitted(&job(1, JobState::Queued), EntityId(0), 0.0);
        log.job_started(&job(1, JobState::Running), 1.0);
        log.job_finished(&job(1, JobState::Success), 2.0);

        assert!(log.validate().is_valid());
        let task = log.task(JobId(1)).unwrap();
        assert_eq!(task.state, JobState::Success);
        assert_eq!(task.submitted, Some(0.0));
    }

    #[test]
    fn test_validation_errors() {
        let mut log = ExecutionLog::new();
        log.vm_record(EntityId(0)).launched = Some(5.0);
        log.vm_record(EntityId(0)).terminated = Some(1.0);
        log.vm_record(EntityId(1)).launched = Some(0.0);
        log.job_submitted(&job(1, JobState::Queued), EntityId(0), 0.0);
        log.job_finished(&job(1, JobState::Failure), 3.0);
        log.job_started(&job(2, JobState::Running), 1.0);
        log.job_started(&job(3, JobState::Running), 4.0);
        log.job_finished(&job(3, JobState::Success), 2.0);

        let result = log.validate();
        assert_eq!(
            result.errors,
            vec![
                "job 1 hasn't started computation at all".to_string(),
                "job 2 hasn't finished computation at all".to_string(),
                "job 3 didn't hold time order".to_string(),
                "VM 0 provisioning didn't hold time order".to_string(),
                "VM 1 hasn't been terminated at all".to_string(),
            ]
        );
    }

    #[test]
    fn test_resubmission_keeps_failed_attempt() {
        let mut log = ExecutionLog::new();
        log.job_submitted(&job(1, JobState::Queued), EntityId(0), 0.0);
        log.job_finished(&job(1, JobState::Failure), 5.0);
        log.job_submitted(&job(1, JobState::Queued), EntityId(0), 10.0);
        log.job_started(&job(1, JobState::Running), 10.0);
        log.job_finished(&job(1, JobState::Success), 12.0);

        let attempts = log.attempts(JobId(1));
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].attempt, 1);
        assert_eq!(attempts[0].state, JobState::Failure);
        assert_eq!(attempts[0].started, None);
        assert_eq!(attempts[1].attempt, 2);
        assert_eq!(attempts[1].submitted, Some(10.0));
        assert_eq!(attempts[1].started, Some(10.0));

        assert_eq!(log.task(JobId(1)).unwrap().state, JobState::Success);
        assert_eq!(log.tasks().count(), 2);
        assert_eq!(
            log.validate().errors,
            vec!["job 1 hasn't started computation at all".to_string()]
        );
    }

    #[test]
    fn test_write_csv() {
        let mut log = ExecutionLog::new();
        log.vm_record(EntityId(0)).launched = Some(0.0);
        log.job_submitted(&job(1, JobState::Queued), EntityId(0), 0.0);
        log.job_started(&job(1, JobState::Running), 0.0);
        log.job_finished(&job(1, JobState::Success), 1.5);

        let mut buf = Vec::new();
        log.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "kind,id,host,started,finished,state");
        assert_eq!(lines[1], "task,1,0,0.0,1.5,Success");
        assert_eq!(lines[2], "vm,0,,0.0,,Running");
    }

    #[test]
    fn test_save_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let log = ExecutionLog::new();
        log.save_csv(&path).unwrap();
        assert!(path.exists());
    }
}
