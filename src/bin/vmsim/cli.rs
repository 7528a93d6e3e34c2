use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};

#[derive(Debug, Parser)]
#[command(name = "vmsim", author, version, about = "Simulate a cloud VM running a FIFO job queue")]
#[command(styles=vmsim::utils::STYLES)]
pub struct VmSim {
    /// The scenario file to use
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the execution log as CSV to this file
    #[arg(short, long, value_name = "FILE")]
    pub trace: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Override the terminate time (e.g., "7200", "2h" or "02:00:00")
    #[arg(long, value_name = "TIME", value_parser = vmsim::utils::parse_sim_time)]
    pub terminate_at: Option<f64>,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,
}
