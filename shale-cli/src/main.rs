//! Command-line front-end for the shale solver.
//!
//! Reads a JSON problem file, applies `-o Category.Name=value` options,
//! runs the solver and emits the structured result record as JSON.
//!
//! Exit codes: 0 = solved (optimal or feasible), 1 = infeasible or
//! unbounded, 2 = error.

mod input;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use shale_oa::{ResultStatus, Settings, Solver};

#[derive(Parser)]
#[command(name = "shale")]
#[command(about = "Outer-approximation solver for convex MINLP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a problem file
    Solve {
        /// Path to the JSON problem file
        problem: PathBuf,
        /// Options as Category.Name=value pairs
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,
        /// Write the JSON result record here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List all recognized options with their current defaults
    Options,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Options => {
            let settings = Settings::default();
            for (key, value) in settings.iter() {
                println!("{} = {}", key, value);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Solve {
            problem,
            options,
            output,
        } => {
            let text = std::fs::read_to_string(&problem)
                .with_context(|| format!("reading {}", problem.display()))?;
            let file: input::ProblemFile =
                serde_json::from_str(&text).context("parsing the problem file")?;
            let model = input::build_problem(&file).context("building the problem")?;
            log::info!("{}", model);

            let mut settings = Settings::default();
            for pair in &options {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("option '{}' is not Key=Value", pair))?;
                settings.set_from_str(key.trim(), value.trim())?;
            }

            let mut solver = Solver::new(model, settings)?;
            let report = solver.solve()?;

            let rendered = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("writing {}", path.display()))?;
                }
                None => println!("{}", rendered),
            }

            log::info!(
                "{:?}: primal {:.8e}, dual {:.8e}, gap {:.2e}",
                report.status,
                report.primal_bound,
                report.dual_bound,
                report.absolute_gap
            );

            Ok(match report.status {
                ResultStatus::Optimal | ResultStatus::Feasible => ExitCode::SUCCESS,
                ResultStatus::Infeasible | ResultStatus::Unbounded => ExitCode::from(1),
                ResultStatus::Error => ExitCode::from(2),
            })
        }
    }
}
