use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vmsim::scenario::run_scenario;

mod cli;
mod report;

fn main() -> ExitCode {
    let args = cli::VmSim::parse();

    let _guard = match init_tracing(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("vmsim: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(
    args: &cli::VmSim,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = args.verbosity.tracing_level_filter();
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(log_dir) = &args.log_dir else {
        tracing_subscriber::registry()
            .with(level)
            .with(console_layer)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {log_dir:?}"))?;
    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("vmsim")
        .filename_suffix("log")
        .max_log_files(7)
        .build(log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(level)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(Some(guard))
}

fn run(args: &cli::VmSim) -> anyhow::Result<()> {
    let mut config =
        vmsim::config::load_config(args.config.as_ref()).context("Failed to load scenario")?;

    // CLI flag overrides config file
    if let Some(terminate_at) = args.terminate_at {
        config.schedule.terminate_at = Some(terminate_at);
    }

    let run = run_scenario(&config)?;

    report::print_jobs(&run);
    report::print_summary(&run.summary()?);

    let validation = run.validate();
    for error in &validation.errors {
        tracing::warn!("{}", error);
    }

    if let Some(path) = &args.trace {
        run.sim.log().save_csv(path)?;
        tracing::info!("Execution log written to {:?}", path);
    }

    Ok(())
}
