mod demo;
mod report;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flexplane::{solve, SolveReport, SolveRequest, SolveStatus};

use report::{render_comparison, render_summary};

/// Steady fluid-structure solver for flexible planing surfaces
#[derive(Parser)]
#[command(name = "flexplane", version, about, long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace); `RUST_LOG` takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve the request stored in a JSON file
    Solve {
        /// Request file
        request: PathBuf,
        /// Write the full report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Solve the rigid 4° flat plate and compare with the closed form
    Demo {
        /// Write the full report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a request with every default filled in
    Template,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command {
        Command::Solve { request, output } => {
            let request = SolveRequest::load(&request)
                .with_context(|| format!("failed to load request {}", request.display()))?;
            let report = run(&request, output.as_deref())?;
            println!("{}", render_summary(&report));
            finish(&report)
        }
        Command::Demo { output } => {
            let request = demo::classic_plate();
            log::info!("demo plate at {:.4} m/s", request.flow.speed);
            let report = run(&request, output.as_deref())?;
            println!("{}", render_summary(&report));
            print!(
                "{}",
                render_comparison(&report, &demo::reference(&request), request.body.weight)
            );
            finish(&report)
        }
        Command::Template => {
            println!("{}", SolveRequest::default().to_json()?);
            Ok(())
        }
    }
}

fn run(request: &SolveRequest, output: Option<&Path>) -> Result<SolveReport> {
    let cancel = AtomicBool::new(false);
    let report = SolveReport::from_outcome(&solve(request, &cancel));
    if let Some(path) = output {
        fs::write(path, report.to_json()?)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }
    Ok(report)
}

fn finish(report: &SolveReport) -> Result<()> {
    if report.status == SolveStatus::Converged {
        Ok(())
    } else {
        bail!(
            "solve ended with status {:?}: {}",
            report.status,
            report.diagnostic.as_deref().unwrap_or("no diagnostic")
        )
    }
}
