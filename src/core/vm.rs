use crate::core::event::{Event, EventKind, Outgoing, Payload};
use crate::core::job::{Job, JobState};
use crate::core::port::Port;
use crate::core::{
    EntityId, JobId, SimTime, DEFAULT_DEPROVISIONING_DELAY, DEFAULT_PROVISIONING_DELAY,
    SECONDS_PER_HOUR,
};
use compact_str::{format_compact, CompactString};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use strum::Display;

/// Static description of a VM, as found in scenario files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSpec {
    /// Processing rate of one core, in instructions per second
    pub mips: u32,
    #[serde(default = "default_cores")]
    pub cores: u32,
    /// Bandwidth of both the input and output port
    #[serde(default)]
    pub bandwidth: f64,
    /// Price per hour of usage
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_provisioning_delay")]
    pub provisioning_delay: f64,
    #[serde(default = "default_deprovisioning_delay")]
    pub deprovisioning_delay: f64,
}

fn default_cores() -> u32 {
    1
}

fn default_provisioning_delay() -> f64 {
    DEFAULT_PROVISIONING_DELAY
}

fn default_deprovisioning_delay() -> f64 {
    DEFAULT_DEPROVISIONING_DELAY
}

impl VmSpec {
    pub fn new(mips: u32, cores: u32, bandwidth: f64, price: f64) -> Self {
        Self {
            mips,
            cores,
            bandwidth,
            price,
            provisioning_delay: DEFAULT_PROVISIONING_DELAY,
            deprovisioning_delay: DEFAULT_DEPROVISIONING_DELAY,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mips == 0 {
            anyhow::bail!("VM processing rate (mips) must be greater than 0");
        }
        if self.cores == 0 {
            anyhow::bail!("VM must have at least one core");
        }
        for (name, value) in [
            ("bandwidth", self.bandwidth),
            ("price", self.price),
            ("provisioning_delay", self.provisioning_delay),
            ("deprovisioning_delay", self.deprovisioning_delay),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("VM {name} must be a non-negative number, got {value}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum VmState {
    Created,
    Running,
    Terminated,
}

/// A virtual machine that executes jobs.
///
/// Each of its cores runs one job at a time to completion (space-shared);
/// jobs wait in a FIFO queue until a core frees up. The VM is driven purely by
/// [`Vm::handle`], which returns the events it wants delivered instead of
/// scheduling them itself.
///
/// Billing covers the interval between the launch and terminate stamps set by
/// the provisioning layer, rounded up to whole hours.
#[derive(Debug)]
pub struct Vm {
    id: EntityId,
    name: CompactString,
    mips: u32,
    cores: u32,
    input_port: Port,
    output_port: Port,

    /// Jobs admitted but not yet dispatched, oldest first
    waiting: VecDeque<Job>,
    /// Jobs occupying a core, in dispatch order
    running: Vec<Job>,

    owner: Option<EntityId>,
    cloud: Option<EntityId>,

    launch_time: Option<SimTime>,
    terminate_time: Option<SimTime>,
    price: f64,
    provisioning_delay: f64,
    deprovisioning_delay: f64,

    state: VmState,
    launch_epoch: u32,
    cpu_seconds_consumed: f64,
}

impl Vm {
    pub fn new(id: EntityId, spec: &VmSpec) -> anyhow::Result<Self> {
        spec.validate()?;
        Ok(Self {
            id,
            name: format_compact!("VM{}", id.0),
            mips: spec.mips,
            cores: spec.cores,
            input_port: Port::new(spec.bandwidth),
            output_port: Port::new(spec.bandwidth),
            waiting: VecDeque::new(),
            running: Vec::with_capacity(spec.cores as usize),
            owner: None,
            cloud: None,
            launch_time: None,
            terminate_time: None,
            price: spec.price,
            provisioning_delay: spec.provisioning_delay,
            deprovisioning_delay: spec.deprovisioning_delay,
            state: VmState::Created,
            launch_epoch: 0,
            cpu_seconds_consumed: 0.0,
        })
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mips(&self) -> u32 {
        self.mips
    }

    pub fn cores(&self) -> u32 {
        self.cores
    }

    #[inline]
    pub fn idle_cores(&self) -> u32 {
        self.cores - self.running.len() as u32
    }

    pub fn input_port(&self) -> &Port {
        &self.input_port
    }

    pub fn input_port_mut(&mut self) -> &mut Port {
        &mut self.input_port
    }

    pub fn output_port(&self) -> &Port {
        &self.output_port
    }

    pub fn output_port_mut(&mut self) -> &mut Port {
        &mut self.output_port
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: EntityId) {
        self.owner = Some(owner);
    }

    pub fn cloud(&self) -> Option<EntityId> {
        self.cloud
    }

    pub fn set_cloud(&mut self, cloud: EntityId) {
        self.cloud = Some(cloud);
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn set_price(&mut self, price: f64) {
        self.price = price;
    }

    pub fn provisioning_delay(&self) -> f64 {
        self.provisioning_delay
    }

    pub fn set_provisioning_delay(&mut self, delay: f64) {
        self.provisioning_delay = delay;
    }

    pub fn deprovisioning_delay(&self) -> f64 {
        self.deprovisioning_delay
    }

    pub fn set_deprovisioning_delay(&mut self, delay: f64) {
        self.deprovisioning_delay = delay;
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    /// Whether the VM currently accepts jobs.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == VmState::Running
    }

    pub fn launch_epoch(&self) -> u32 {
        self.launch_epoch
    }

    pub fn cpu_seconds_consumed(&self) -> f64 {
        self.cpu_seconds_consumed
    }

    /// Jobs admitted but not yet started, oldest first.
    pub fn waiting_jobs(&self) -> impl Iterator<Item = &Job> {
        self.waiting.iter()
    }

    /// Jobs currently occupying a core, in dispatch order.
    pub fn running_jobs(&self) -> &[Job] {
        &self.running
    }

    /// Every job held by the VM that has not finished yet: running jobs
    /// first, then waiting ones. Note this includes jobs already running.
    pub fn queued_jobs(&self) -> impl Iterator<Item = &Job> {
        self.running.iter().chain(self.waiting.iter())
    }

    /// Number of unfinished jobs held by the VM, running ones included.
    pub fn queue_length(&self) -> usize {
        self.running.len() + self.waiting.len()
    }

    pub fn launch_time(&self) -> Option<SimTime> {
        self.launch_time
    }

    /// Record when billing for this VM starts.
    ///
    /// A VM may only be stamped again once it has been terminated, in which
    /// case the previous terminate stamp is cleared as well.
    pub fn set_launch_time(&mut self, time: SimTime) -> anyhow::Result<()> {
        if self.is_running() {
            anyhow::bail!("Cannot set launch time of {}: VM is running", self.name);
        }
        if self.launch_time.is_some() && self.state != VmState::Terminated {
            anyhow::bail!("Launch time of {} is already set", self.name);
        }
        self.launch_time = Some(time);
        self.terminate_time = None;
        Ok(())
    }

    pub fn terminate_time(&self) -> Option<SimTime> {
        self.terminate_time
    }

    /// Record when billing for this VM stops.
    pub fn set_terminate_time(&mut self, time: SimTime) -> anyhow::Result<()> {
        let Some(launch_time) = self.launch_time else {
            anyhow::bail!("Cannot set terminate time of {}: VM was never launched", self.name);
        };
        if self.terminate_time.is_some() {
            anyhow::bail!("Terminate time of {} is already set", self.name);
        }
        if time < launch_time {
            anyhow::bail!(
                "Terminate time {time} of {} precedes its launch time {launch_time}",
                self.name
            );
        }
        self.terminate_time = Some(time);
        Ok(())
    }

    /// Runtime in seconds.
    ///
    /// Zero if the VM was never launched, measured up to `now` while it has
    /// not been terminated, and frozen once it has.
    pub fn runtime(&self, now: SimTime) -> f64 {
        match (self.launch_time, self.terminate_time) {
            (None, _) => 0.0,
            (Some(launch), None) => now - launch,
            (Some(launch), Some(terminate)) => terminate - launch,
        }
    }

    /// Runtime rounded up to whole hours, times the hourly price.
    pub fn cost(&self, now: SimTime) -> f64 {
        let hours = (self.runtime(now) / SECONDS_PER_HOUR).ceil();
        hours * self.price
    }

    /// `cpu_seconds / (runtime * cores)`, or `None` when the VM has no runtime.
    pub fn utilization(&self, now: SimTime) -> Option<f64> {
        let total_cpu_seconds = self.runtime(now) * self.cores as f64;
        if total_cpu_seconds <= 0.0 {
            return None;
        }
        Some(self.cpu_seconds_consumed / total_cpu_seconds)
    }

    /// Process one event delivered at `now`.
    ///
    /// Returns the events to schedule in response. An `Err` means the caller
    /// broke the event protocol and the run must be aborted.
    pub fn handle(&mut self, now: SimTime, event: Event) -> anyhow::Result<Vec<Outgoing>> {
        if event.target != self.id {
            anyhow::bail!(
                "Event {} addressed to entity {} was delivered to {}",
                event.kind,
                event.target,
                self.name
            );
        }

        let mut out = Vec::new();
        match (event.kind, event.payload) {
            (EventKind::VmLaunch, _) => self.launch(now)?,
            (EventKind::VmTerminate, _) => self.terminate(now, &mut out),
            (EventKind::JobSubmit, Payload::Job(job)) => {
                self.queue_job(now, event.source, job, &mut out)?
            }
            (EventKind::JobFinished, Payload::Completion { job, epoch }) => {
                self.finish_job(now, job, epoch, &mut out)
            }
            (kind, payload) => {
                anyhow::bail!("Unknown event for {}: {} with {:?}", self.name, kind, payload)
            }
        }

        debug_assert!(self.running.len() <= self.cores as usize);
        debug_assert!(
            self.waiting.is_empty() || self.idle_cores() == 0,
            "{} has idle cores while jobs are waiting",
            self.name
        );
        Ok(out)
    }

    fn launch(&mut self, now: SimTime) -> anyhow::Result<()> {
        if self.is_running() {
            anyhow::bail!("Cannot launch {}: VM is already running", self.name);
        }

        // Reset dynamic state
        self.waiting.clear();
        self.running.clear();
        self.cpu_seconds_consumed = 0.0;
        self.launch_epoch += 1;

        self.state = VmState::Running;
        tracing::info!(
            "{} launched at {} (epoch {}, {} cores @ {} mips)",
            self.name,
            now,
            self.launch_epoch,
            self.cores,
            self.mips
        );
        Ok(())
    }

    fn terminate(&mut self, now: SimTime, out: &mut Vec<Outgoing>) {
        if !self.is_running() {
            tracing::warn!(
                "Ignoring terminate for {} at {}: VM is {}",
                self.name,
                now,
                self.state
            );
            return;
        }

        self.state = VmState::Terminated;

        // Fail everything still held, running jobs first
        let held: Vec<Job> = self.running.drain(..).chain(self.waiting.drain(..)).collect();
        let failed = held.len();
        for mut job in held {
            job.transition(JobState::Failure);
            if let Some(owner) = job.owner {
                out.push(Outgoing::now(owner, EventKind::JobFinished, Payload::Job(job)));
            }
        }

        tracing::info!(
            "{} terminated at {} ({} held jobs failed)",
            self.name,
            now,
            failed
        );
    }

    fn queue_job(
        &mut self,
        now: SimTime,
        owner: EntityId,
        mut job: Job,
        out: &mut Vec<Outgoing>,
    ) -> anyhow::Result<()> {
        if !self.is_running() {
            anyhow::bail!("Cannot execute job {}: {} not running", job.id, self.name);
        }
        if job.state == JobState::Running {
            anyhow::bail!(
                "Cannot queue job {} on {}: job is already running",
                job.id,
                self.name
            );
        }
        // Completions are matched by job id
        if self.queued_jobs().any(|held| held.id == job.id) {
            anyhow::bail!(
                "Cannot queue job {} on {}: a job with this id is already held",
                job.id,
                self.name
            );
        }

        job.owner = Some(owner);
        job.vm = Some(self.id);
        job.remote_queue_time = Some(now);
        job.state = JobState::Queued;

        tracing::debug!("{} queued job {} from {} at {}", self.name, job.id, owner, now);
        self.waiting.push_back(job);

        // No-op while every core is busy
        self.start_jobs(now, out);
        Ok(())
    }

    fn start_jobs(&mut self, now: SimTime, out: &mut Vec<Outgoing>) {
        while self.idle_cores() > 0 {
            let Some(job) = self.waiting.pop_front() else {
                break;
            };
            self.start_job(now, job, out);
        }
    }

    fn start_job(&mut self, now: SimTime, mut job: Job, out: &mut Vec<Outgoing>) {
        job.start_time = Some(now);
        job.transition(JobState::Running);

        if let Some(owner) = job.owner {
            out.push(Outgoing::now(
                owner,
                EventKind::JobStarted,
                Payload::Job(job.clone()),
            ));
        }

        let duration = job.size as f64 / self.mips as f64;
        out.push(Outgoing::after(
            self.id,
            duration,
            EventKind::JobFinished,
            Payload::Completion {
                job: job.id,
                epoch: self.launch_epoch,
            },
        ));

        tracing::debug!(
            "{} started job {} at {} (expected duration {})",
            self.name,
            job.id,
            now,
            duration
        );
        self.running.push(job);
    }

    fn finish_job(&mut self, now: SimTime, job_id: JobId, epoch: u32, out: &mut Vec<Outgoing>) {
        let position = if epoch == self.launch_epoch && self.is_running() {
            self.running.iter().position(|job| job.id == job_id)
        } else {
            None
        };
        let Some(position) = position else {
            // The job was failed by a terminate before its completion fired.
            tracing::debug!(
                "{} ignoring stale completion of job {} (epoch {}, current {})",
                self.name,
                job_id,
                epoch,
                self.launch_epoch
            );
            return;
        };

        let mut job = self.running.remove(position);
        job.finish_time = Some(now);
        job.transition(JobState::Success);

        self.cpu_seconds_consumed += job.duration().unwrap_or(0.0);
        tracing::debug!("{} finished job {} at {}", self.name, job.id, now);

        if let Some(owner) = job.owner {
            out.push(Outgoing::now(owner, EventKind::JobFinished, Payload::Job(job)));
        }

        // The freed core may pick up the next waiting job
        self.start_jobs(now, out);
    }
}
