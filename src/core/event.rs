use crate::core::job::Job;
use crate::core::{EntityId, JobId, SimTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Tags carried by simulation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    VmLaunch,
    VmTerminate,
    JobSubmit,
    JobStarted,
    JobFinished,
}

/// Data attached to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Job(Job),
    /// Self-addressed marker for a job scheduled to complete on a VM.
    ///
    /// `epoch` is the VM launch epoch the job was dispatched in, so that a
    /// completion outliving a terminate/relaunch cycle is recognised as stale.
    Completion { job: JobId, epoch: u32 },
}

impl Payload {
    pub fn job(&self) -> Option<&Job> {
        match self {
            Payload::Job(job) => Some(job),
            _ => None,
        }
    }
}

/// An event as delivered to an entity's handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: EventKind,
    pub payload: Payload,
}

impl Event {
    pub fn new(source: EntityId, target: EntityId, kind: EventKind, payload: Payload) -> Self {
        Self {
            source,
            target,
            kind,
            payload,
        }
    }
}

/// An event an entity asks the engine to deliver after `delay` seconds.
///
/// A zero delay means "deliver now", after events already pending at the
/// current instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub target: EntityId,
    pub delay: SimTime,
    pub kind: EventKind,
    pub payload: Payload,
}

impl Outgoing {
    pub fn now(target: EntityId, kind: EventKind, payload: Payload) -> Self {
        Self::after(target, 0.0, kind, payload)
    }

    pub fn after(target: EntityId, delay: SimTime, kind: EventKind, payload: Payload) -> Self {
        Self {
            target,
            delay,
            kind,
            payload,
        }
    }

    pub fn into_event(self, source: EntityId) -> Event {
        Event::new(source, self.target, self.kind, self.payload)
    }
}
