use crate::config::ScenarioConfig;
use crate::core::engine::Simulation;
use crate::core::event::EventKind;
use crate::core::job::{Job, JobState};
use crate::core::trace::ValidationResult;
use crate::core::vm::Vm;
use crate::core::{EntityId, SimTime};
use serde::Serialize;

/// Billing and usage figures of a VM at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmSummary {
    pub name: String,
    pub cores: u32,
    pub mips: u32,
    pub launch_time: Option<SimTime>,
    pub terminate_time: Option<SimTime>,
    pub runtime: f64,
    pub cost: f64,
    pub cpu_seconds: f64,
    pub utilization: Option<f64>,
}

impl VmSummary {
    pub fn of(vm: &Vm, now: SimTime) -> Self {
        Self {
            name: vm.name().to_string(),
            cores: vm.cores(),
            mips: vm.mips(),
            launch_time: vm.launch_time(),
            terminate_time: vm.terminate_time(),
            runtime: vm.runtime(now),
            cost: vm.cost(now),
            cpu_seconds: vm.cpu_seconds_consumed(),
            utilization: vm.utilization(now),
        }
    }
}

/// A finished scenario run.
pub struct ScenarioRun {
    pub sim: Simulation,
    pub vm: EntityId,
    pub owner: EntityId,
}

impl ScenarioRun {
    pub fn summary(&self) -> anyhow::Result<VmSummary> {
        let vm = self
            .sim
            .vm(self.vm)
            .ok_or_else(|| anyhow::anyhow!("VM {} disappeared", self.vm))?;
        Ok(VmSummary::of(vm, self.sim.now()))
    }

    /// Jobs as last returned to their owner, in completion order.
    pub fn finished_jobs(&self) -> Vec<&Job> {
        self.sim
            .mailbox(self.owner)
            .iter()
            .filter(|d| d.kind == EventKind::JobFinished)
            .map(|d| &d.job)
            .collect()
    }

    pub fn count(&self, state: JobState) -> usize {
        self.finished_jobs()
            .iter()
            .filter(|job| job.state == state)
            .count()
    }

    pub fn validate(&self) -> ValidationResult {
        self.sim.log().validate()
    }
}

/// Build and run the simulation described by `config`.
///
/// Jobs without an explicit submission time are submitted as soon as the VM
/// is ready. Without a terminate time, the VM is terminated once the last job
/// has finished.
pub fn run_scenario(config: &ScenarioConfig) -> anyhow::Result<ScenarioRun> {
    let mut sim = Simulation::new();
    let owner = sim.add_owner();
    let vm = sim.add_vm(&config.vm)?;

    let launch_at = config.schedule.launch_at;
    let ready_at = launch_at + config.vm.provisioning_delay;
    sim.request_launch(vm, launch_at)?;
    // Jobs due at the ready instant must arrive after the VM came up
    sim.run_until(ready_at)?;

    let mut submitted = 0usize;
    for job_config in &config.jobs {
        let at = job_config.submit_at.unwrap_or(ready_at);
        if at < ready_at {
            anyhow::bail!(
                "Job of size {} submitted at {} but the VM is only ready at {}",
                job_config.size,
                at,
                ready_at
            );
        }
        for _ in 0..job_config.count {
            let job = sim.new_job(job_config.size);
            sim.submit(owner, vm, job, at)?;
            submitted += 1;
        }
    }
    tracing::info!("Submitted {} jobs to VM {}", submitted, vm);

    match config.schedule.terminate_at {
        Some(terminate_at) => {
            if terminate_at < ready_at {
                anyhow::bail!(
                    "Terminate requested at {} before the VM is ready at {}",
                    terminate_at,
                    ready_at
                );
            }
            sim.request_terminate(vm, terminate_at)?;
            sim.run()?;
        }
        None => {
            sim.run()?;
            let at = sim.now().max(ready_at);
            sim.request_terminate(vm, at)?;
            sim.run()?;
        }
    }

    Ok(ScenarioRun { sim, vm, owner })
}
