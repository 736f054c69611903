//! toolpath-nc - CLI tool to turn job files into NC code.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use toolpath_nc::{validate_instruction, Job, MachineInstruction, SaveOutcome};

/// Process toolpaths and write NC code for 2-, 3- and 5-axis machines.
#[derive(Parser, Debug)]
#[command(name = "toolpath-nc")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input job file (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Output code file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ignore errors containing this text when saving (repeatable)
    #[arg(long)]
    ignore: Vec<String>,

    /// Validate only, don't generate output
    #[arg(long)]
    validate: bool,

    /// Output processed paths as JSON
    #[arg(long)]
    debug: bool,

    /// Read a code file back with the job's machine and print its points as JSON
    #[arg(long)]
    read: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Processing: {}", args.input.display());

    let job = Job::from_file(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    let mut instruction = job
        .into_instruction()
        .with_context(|| format!("Failed to build instruction from {}", args.input.display()))?;

    info!(
        "Loaded {} operation(s) for {}",
        instruction.operations.len(),
        instruction.machine.name()
    );

    // Read-back mode
    if let Some(code_path) = &args.read {
        let code = std::fs::read_to_string(code_path)
            .with_context(|| format!("Failed to read {}", code_path.display()))?;
        let read = MachineInstruction::read_code(Arc::clone(&instruction.machine), &code)?;
        println!("{}", serde_json::to_string_pretty(&read.operations)?);
        return Ok(());
    }

    // Validate
    let validation = validate_instruction(&instruction)?;

    for warning in &validation.warnings {
        warn!("{}", warning);
    }

    for err in &validation.errors {
        error!("{}", err);
    }

    if !validation.passed {
        anyhow::bail!("Validation failed");
    }

    // Validate-only mode
    if args.validate {
        info!("Validation passed");
        return Ok(());
    }

    instruction
        .process_additions()
        .context("Failed to process toolpaths")?;

    // Debug output
    if args.debug {
        let json = serde_json::to_string_pretty(&instruction)?;
        println!("{}", json);
        return Ok(());
    }

    let code = instruction.write_code().context("Failed to write code")?;

    let warnings = code.warnings_report();
    if !warnings.is_empty() {
        warn!("Warnings:\n{}", warnings);
    }
    let ignored = code.ignored_report(&args.ignore);
    if !ignored.is_empty() {
        info!("Ignored errors:\n{}", ignored);
    }
    info!("Axis ranges:\n{}", code.range_report());

    let output_path = args.output.unwrap_or_else(|| {
        let mut path = args.input.clone();
        path.set_extension(&code.style().extension);
        path
    });

    match code
        .save(&output_path, &args.ignore)
        .with_context(|| format!("Failed to write {}", output_path.display()))?
    {
        SaveOutcome::Saved => info!("Generated: {} ({} lines)", output_path.display(), code.line_count()),
        SaveOutcome::Blocked(_) => {
            error!("Errors:\n{}", code.errors_report(&args.ignore));
            anyhow::bail!("Code has errors; nothing written to {}", output_path.display());
        }
    }

    Ok(())
}
