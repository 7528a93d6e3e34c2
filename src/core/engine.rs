//! Minimal single-threaded event driver for VMs.
//!
//! `Simulation` keeps a global clock and a queue of pending events ordered by
//! `(time, sequence)`. Events scheduled for the same instant are delivered in
//! the order they were scheduled. It also acts as the cloud that provisions
//! VMs: it stamps launch/terminate times and applies provisioning delays.
//! Entities that are not VMs (job owners) simply collect what they receive in
//! a mailbox.

use crate::core::event::{Event, EventKind, Outgoing, Payload};
use crate::core::job::{Job, JobState};
use crate::core::trace::ExecutionLog;
use crate::core::vm::{Vm, VmSpec};
use crate::core::{EntityId, IdAllocator, SimTime};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// An event received by a job owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub time: SimTime,
    pub source: EntityId,
    pub kind: EventKind,
    pub job: Job,
}

#[derive(Debug)]
enum Action {
    Deliver(Event),
    Launch(EntityId),
    Terminate(EntityId),
}

#[derive(Debug)]
struct Scheduled {
    time: SimTime,
    seq: u64,
    action: Action,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap, so the earliest (time, seq) must compare greatest
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Simulation {
    clock: SimTime,
    next_seq: u64,
    queue: BinaryHeap<Scheduled>,
    ids: IdAllocator,
    cloud: EntityId,
    vms: BTreeMap<EntityId, Vm>,
    mailboxes: BTreeMap<EntityId, Vec<Delivery>>,
    log: ExecutionLog,
    processed: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        let mut ids = IdAllocator::new();
        let cloud = ids.next_entity();
        Self {
            clock: 0.0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            ids,
            cloud,
            vms: BTreeMap::new(),
            mailboxes: BTreeMap::new(),
            log: ExecutionLog::new(),
            processed: 0,
        }
    }

    /// Current simulated time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.clock
    }

    /// Id of the provisioning entity played by the simulation itself.
    pub fn cloud_id(&self) -> EntityId {
        self.cloud
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// Number of events processed so far.
    pub fn processed_events(&self) -> u64 {
        self.processed
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Register an entity that submits jobs and receives notifications.
    pub fn add_owner(&mut self) -> EntityId {
        let id = self.ids.next_entity();
        self.mailboxes.insert(id, Vec::new());
        id
    }

    pub fn add_vm(&mut self, spec: &VmSpec) -> anyhow::Result<EntityId> {
        let id = self.ids.next_entity();
        let mut vm = Vm::new(id, spec)?;
        vm.set_cloud(self.cloud);
        tracing::debug!("Registered {} ({:?})", vm.name(), spec);
        self.vms.insert(id, vm);
        Ok(id)
    }

    pub fn vm(&self, id: EntityId) -> Option<&Vm> {
        self.vms.get(&id)
    }

    /// Mutable access for configuration setters (price, delays, ports).
    pub fn vm_mut(&mut self, id: EntityId) -> Option<&mut Vm> {
        self.vms.get_mut(&id)
    }

    pub fn vms(&self) -> impl Iterator<Item = &Vm> {
        self.vms.values()
    }

    /// Create a job with a fresh id.
    pub fn new_job(&mut self, size: u64) -> Job {
        Job::builder().id(self.ids.next_job()).size(size).build()
    }

    pub fn mailbox(&self, owner: EntityId) -> &[Delivery] {
        self.mailboxes
            .get(&owner)
            .map(|m| m.as_slice())
            .unwrap_or(&[])
    }

    /// Hand the received notifications over to the owner.
    pub fn take_mailbox(&mut self, owner: EntityId) -> Vec<Delivery> {
        self.mailboxes
            .get_mut(&owner)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn push(&mut self, time: SimTime, action: Action) -> anyhow::Result<()> {
        if !time.is_finite() || time < self.clock {
            anyhow::bail!(
                "Cannot schedule {:?} at {} (current time {})",
                action,
                time,
                self.clock
            );
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled { time, seq, action });
        Ok(())
    }

    /// Schedule an event emitted by `source`.
    pub fn schedule(&mut self, source: EntityId, outgoing: Outgoing) -> anyhow::Result<()> {
        if !(outgoing.delay >= 0.0) {
            anyhow::bail!("Invalid delay {} for {}", outgoing.delay, outgoing.kind);
        }
        let time = self.clock + outgoing.delay;
        self.push(time, Action::Deliver(outgoing.into_event(source)))
    }

    /// Ask the cloud to launch `vm` at `at`; it accepts jobs after its
    /// provisioning delay.
    pub fn request_launch(&mut self, vm: EntityId, at: SimTime) -> anyhow::Result<()> {
        self.ensure_vm(vm)?;
        self.push(at, Action::Launch(vm))
    }

    /// Ask the cloud to terminate `vm` at `at`; billing stops after its
    /// deprovisioning delay.
    pub fn request_terminate(&mut self, vm: EntityId, at: SimTime) -> anyhow::Result<()> {
        self.ensure_vm(vm)?;
        self.push(at, Action::Terminate(vm))
    }

    /// Submit `job` from `owner` to `vm` at `at`.
    pub fn submit(
        &mut self,
        owner: EntityId,
        vm: EntityId,
        mut job: Job,
        at: SimTime,
    ) -> anyhow::Result<()> {
        self.ensure_vm(vm)?;
        if !self.mailboxes.contains_key(&owner) {
            anyhow::bail!("Unknown job owner {owner}");
        }
        if job.state.is_final() {
            job.reset_for_resubmit();
        }
        job.submit_time = Some(at);
        let event = Event::new(owner, vm, EventKind::JobSubmit, Payload::Job(job));
        self.push(at, Action::Deliver(event))
    }

    fn ensure_vm(&self, vm: EntityId) -> anyhow::Result<()> {
        if !self.vms.contains_key(&vm) {
            anyhow::bail!("Unknown VM {vm}");
        }
        Ok(())
    }

    /// Time of the next pending event, if any.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|s| s.time)
    }

    /// Process the next event. Returns `false` once the queue is empty.
    pub fn step(&mut self) -> anyhow::Result<bool> {
        let Some(Scheduled { time, action, .. }) = self.queue.pop() else {
            return Ok(false);
        };
        debug_assert!(time >= self.clock, "time went backwards");
        self.clock = time;
        self.processed += 1;

        match action {
            Action::Launch(vm) => self.provision_launch(vm)?,
            Action::Terminate(vm) => self.provision_terminate(vm)?,
            Action::Deliver(event) => self.deliver(event)?,
        }
        Ok(true)
    }

    /// Run until no events are left.
    pub fn run(&mut self) -> anyhow::Result<()> {
        while self.step()? {}
        tracing::info!(
            "Simulation finished at {} after {} events",
            self.clock,
            self.processed
        );
        Ok(())
    }

    /// Process every event due at or before `until`, then advance the clock
    /// to `until`.
    pub fn run_until(&mut self, until: SimTime) -> anyhow::Result<()> {
        while self.peek_time().is_some_and(|t| t <= until) {
            self.step()?;
        }
        if until > self.clock {
            self.clock = until;
        }
        Ok(())
    }

    fn vm_entry(&mut self, vm: EntityId) -> anyhow::Result<&mut Vm> {
        self.vms
            .get_mut(&vm)
            .ok_or_else(|| anyhow::anyhow!("Unknown VM {vm}"))
    }

    fn provision_launch(&mut self, id: EntityId) -> anyhow::Result<()> {
        let now = self.clock;
        let cloud = self.cloud;
        let vm = self.vm_entry(id)?;
        vm.set_launch_time(now)?;
        let delay = vm.provisioning_delay();
        tracing::info!("Provisioning {} at {} (ready in {}s)", vm.name(), now, delay);

        let record = self.log.vm_record(id);
        record.launched = Some(now);
        record.terminated = None;
        record.ready = None;

        // Without a delay the VM must be up before anything else due now
        if delay == 0.0 {
            return self.deliver(Event::new(cloud, id, EventKind::VmLaunch, Payload::None));
        }
        let launch = Outgoing::after(id, delay, EventKind::VmLaunch, Payload::None);
        self.schedule(cloud, launch)
    }

    fn provision_terminate(&mut self, id: EntityId) -> anyhow::Result<()> {
        let now = self.clock;
        let cloud = self.cloud;
        let vm = self.vm_entry(id)?;
        if !vm.is_running() {
            anyhow::bail!(
                "Cannot terminate {} at {}: VM is {}",
                vm.name(),
                now,
                vm.state()
            );
        }
        let billed_until = now + vm.deprovisioning_delay();

        self.deliver(Event::new(cloud, id, EventKind::VmTerminate, Payload::None))?;

        self.vm_entry(id)?.set_terminate_time(billed_until)?;
        self.log.vm_record(id).terminated = Some(billed_until);
        Ok(())
    }

    fn deliver(&mut self, event: Event) -> anyhow::Result<()> {
        let now = self.clock;
        let target = event.target;

        if let Some(vm) = self.vms.get_mut(&target) {
            if event.kind == EventKind::VmLaunch {
                self.log.vm_record(target).ready = Some(now);
            }
            if let (EventKind::JobSubmit, Payload::Job(job)) = (event.kind, &event.payload) {
                self.log.job_submitted(job, target, now);
            }
            let out = vm.handle(now, event)?;
            for outgoing in out {
                self.schedule(target, outgoing)?;
            }
            return Ok(());
        }

        let Some(mailbox) = self.mailboxes.get_mut(&target) else {
            anyhow::bail!("Event {} addressed to unknown entity {}", event.kind, target);
        };
        let Payload::Job(job) = event.payload else {
            anyhow::bail!("Owner {} received {} without a job", target, event.kind);
        };
        match event.kind {
            EventKind::JobStarted => self.log.job_started(&job, now),
            EventKind::JobFinished => {
                self.log.job_finished(&job, now);
                if job.state == JobState::Failure {
                    tracing::warn!("Job {} failed on VM {:?} at {}", job.id, job.vm, now);
                }
            }
            kind => anyhow::bail!("Owner {} cannot handle {}", target, kind),
        }
        mailbox.push(Delivery {
            time: now,
            source: event.source,
            kind: event.kind,
            job,
        });
        Ok(())
    }
}
