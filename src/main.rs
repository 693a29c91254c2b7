use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use leo_pool::config::Config;
use leo_pool::pipeline::{
    Controller, RunOptions, RunReport, RunState, SnapshotManager, StageId,
};
use leo_pool::tle::PipelineInput;

#[derive(Parser)]
#[command(name = "leo-pool")]
#[command(about = "LEO satellite pool planning pipeline")]
struct Cli {
    /// Pipeline configuration file
    #[arg(short, long, global = true, default_value = "leo-pool.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the configuration and the TLE sources
    Validate,
    /// Run the pipeline
    Run {
        #[arg(long)]
        run_id: Option<String>,
        /// Continue from the last good snapshot of --run-id
        #[arg(long, requires = "run_id")]
        resume: bool,
        /// Stop once this stage (1-6) has been snapshotted
        #[arg(long, value_parser = parse_stage)]
        stop_after: Option<StageId>,
    },
    /// Re-plan the pools of an existing run from its stage-5 artifact
    Pool {
        #[arg(long)]
        run_id: String,
    },
    /// Show the snapshot chain of a run
    Status {
        #[arg(long)]
        run_id: String,
    },
}

fn parse_stage(s: &str) -> Result<StageId, String> {
    let n: u8 = s.parse().map_err(|e| format!("{}", e))?;
    StageId::from_number(n).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Validate => validate(&config),
        Commands::Run {
            run_id,
            resume,
            stop_after,
        } => run(
            config,
            run_id,
            RunOptions {
                resume,
                stop_after,
                only_stage: None,
            },
        ),
        Commands::Pool { run_id } => run(
            config,
            Some(run_id),
            RunOptions {
                only_stage: Some(StageId::Pool),
                ..Default::default()
            },
        ),
        Commands::Status { run_id } => status(&config, &run_id),
    }
}

fn load_input(config: &Config) -> Option<PipelineInput> {
    match PipelineInput::load(config) {
        Ok(input) => Some(input),
        Err(e) => {
            eprintln!("Error loading TLEs: {}", e);
            None
        }
    }
}

fn validate(config: &Config) -> ExitCode {
    let Some(input) = load_input(config) else {
        return ExitCode::FAILURE;
    };

    println!(
        "Configuration is valid ({} constellations)",
        config.constellations.len()
    );
    for (name, constellation) in &config.constellations {
        println!(
            "  {}: {} records, {} malformed, {} samples every {}",
            name,
            input.constellations.get(name).map_or(0, Vec::len),
            input.malformed_count(name),
            constellation.sample_count,
            humantime::format_duration(constellation.sample_interval)
        );
    }
    for bad in &input.malformed {
        println!(
            "  ! {}:{} {}",
            bad.source, bad.line_number, bad.message
        );
    }
    ExitCode::SUCCESS
}

fn run(config: Config, run_id: Option<String>, options: RunOptions) -> ExitCode {
    let Some(input) = load_input(&config) else {
        return ExitCode::FAILURE;
    };

    let controller = match Controller::new(config, run_id) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error starting run: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("Run {}", controller.run_id());

    match controller.run(&input, options) {
        Ok(report) => {
            print_report(&report);
            if report.is_completed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_report(report: &RunReport) {
    if let Some(stage) = report.resumed_from {
        println!("Resumed after {}", stage.label());
    }
    for snapshot in &report.snapshots {
        println!(
            "  {} attempt {}: {}",
            snapshot.stage.label(),
            snapshot.attempt,
            snapshot.status
        );
    }
    for plan in &report.recovery_plans {
        println!(
            "  recovery {} attempt {}: {} ({})",
            plan.stage.label(),
            plan.attempt,
            plan.action,
            plan.reason
        );
    }
    if let Some(pools) = &report.pools {
        for (name, pool) in &pools.pools {
            println!(
                "  pool {}: {} of {} satellites, coverage {:.3}{}",
                name,
                pool.size(),
                pool.candidate_count,
                pool.coverage_ratio,
                if pool.target_met { "" } else { " (goal not met)" }
            );
        }
    }
    println!("Final state: {}", report.state);
}

fn status(config: &Config, run_id: &str) -> ExitCode {
    let log = match SnapshotManager::load_run_log(&config.pipeline.state_dir, run_id) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Error reading run {}: {}", run_id, e);
            return ExitCode::FAILURE;
        }
    };

    println!("Run {}: {}", log.run_id, log.state);
    println!("  started {}, updated {}", log.started_at, log.updated_at);
    for snapshot in &log.snapshots {
        let failed: Vec<&str> = snapshot
            .verdict
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        println!(
            "  {} attempt {}: {} at {}{}",
            snapshot.stage.label(),
            snapshot.attempt,
            snapshot.status,
            snapshot.created_at,
            if failed.is_empty() {
                String::new()
            } else {
                format!(" [{}]", failed.join(", "))
            }
        );
    }
    if matches!(log.state, RunState::Aborted { .. }) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
