use tabled::{settings::Style, Table, Tabled};
use vmsim::scenario::{ScenarioRun, VmSummary};
use vmsim::utils::{format_opt_time, format_sim_time};
use vmsim::Job;

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "JOBID")]
    id: String,
    #[tabled(rename = "SIZE")]
    size: u64,
    #[tabled(rename = "ST")]
    state: String,
    #[tabled(rename = "SUBMITTED")]
    submitted: String,
    #[tabled(rename = "STARTED")]
    started: String,
    #[tabled(rename = "FINISHED")]
    finished: String,
    #[tabled(rename = "WAIT")]
    wait: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            size: job.size,
            state: job.state.to_string(),
            submitted: format_opt_time(job.submit_time),
            started: format_opt_time(job.start_time),
            finished: format_opt_time(job.finish_time),
            wait: format_opt_time(job.wait_time()),
        }
    }
}

pub fn print_jobs(run: &ScenarioRun) {
    let rows: Vec<JobRow> = run.finished_jobs().into_iter().map(JobRow::from).collect();
    if rows.is_empty() {
        println!("No jobs were submitted.");
        return;
    }
    let table = Table::new(&rows).with(Style::empty()).to_string();
    println!("{}", table);
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "VM")]
    name: String,
    #[tabled(rename = "CORES")]
    cores: u32,
    #[tabled(rename = "MIPS")]
    mips: u32,
    #[tabled(rename = "LAUNCHED")]
    launched: String,
    #[tabled(rename = "TERMINATED")]
    terminated: String,
    #[tabled(rename = "RUNTIME")]
    runtime: String,
    #[tabled(rename = "CPU(s)")]
    cpu_seconds: String,
    #[tabled(rename = "UTIL")]
    utilization: String,
    #[tabled(rename = "COST")]
    cost: String,
}

impl From<&VmSummary> for SummaryRow {
    fn from(summary: &VmSummary) -> Self {
        Self {
            name: summary.name.clone(),
            cores: summary.cores,
            mips: summary.mips,
            launched: format_opt_time(summary.launch_time),
            terminated: format_opt_time(summary.terminate_time),
            runtime: format_sim_time(summary.runtime),
            cpu_seconds: format!("{:.3}", summary.cpu_seconds),
            utilization: summary
                .utilization
                .map(|u| format!("{:.1}%", u * 100.0))
                .unwrap_or_else(|| "-".to_string()),
            cost: format!("{:.2}", summary.cost),
        }
    }
}

pub fn print_summary(summary: &VmSummary) {
    println!();
    let table = Table::new([SummaryRow::from(summary)])
        .with(Style::empty())
        .to_string();
    println!("{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmsim::core::JobId;
    use vmsim::JobState;

    #[test]
    fn test_job_row_formats_missing_times() {
        let mut job = Job::builder().id(JobId(7)).size(1000).submit_time(60.0).build();
        job.state = JobState::Failure;

        let row = JobRow::from(&job);
        assert_eq!(row.id, "7");
        assert_eq!(row.state, JobState::Failure.to_string());
        assert_eq!(row.submitted, "00:01:00");
        assert_eq!(row.started, "-");
        assert_eq!(row.finished, "-");
    }

    #[test]
    fn test_summary_row_without_runtime() {
        let summary = VmSummary {
            name: "VM1".to_string(),
            cores: 2,
            mips: 1000,
            launch_time: None,
            terminate_time: None,
            runtime: 0.0,
            cost: 0.0,
            cpu_seconds: 0.0,
            utilization: None,
        };
        let row = SummaryRow::from(&summary);
        assert_eq!(row.utilization, "-");
        assert_eq!(row.cost, "0.00");
        assert_eq!(row.runtime, "00:00:00");
    }
}
