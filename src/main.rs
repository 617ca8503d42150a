//! Lecture Cleaner - batch command line front end

use std::collections::HashMap;
use std::process;

use anyhow::{Context, bail};
use clap::Parser;
use lecture_cleaner::{Args, Config, EventKind, Scheduler, ShutdownMode, TaskId, init_logging};

fn main() {
    let args = Args::parse();

    match run(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when at least one file could not be cleaned.
fn run(args: Args) -> anyhow::Result<bool> {
    if let Some(path) = &args.write_config {
        Config::create_default_config(path)
            .with_context(|| format!("Cannot write default config to {}", path.display()))?;
        println!("Default config written to {}", path.display());
        return Ok(true);
    }

    if args.inputs.is_empty() {
        bail!("No input files given");
    }
    if args.output.is_some() && args.inputs.len() > 1 {
        bail!("--output can only be used with a single input file");
    }

    let config = Config::from_args_and_config(&args).context("Invalid configuration")?;
    init_logging(config.processing.verbose);

    if config.processing.verbose {
        println!("{}", lecture_cleaner::get_library_info());
        println!();
    }

    let (scheduler, events) = Scheduler::new(&config).context("Cannot create scheduler")?;
    let mut names: HashMap<TaskId, String> = HashMap::new();

    for input in &args.inputs {
        let mut options = config.defaults.options_for(input);
        options.output_path = args.output.clone();
        let id = scheduler
            .enqueue(input.clone(), options)
            .with_context(|| format!("Cannot queue {}", input.display()))?;
        names.insert(id, input.display().to_string());
    }

    println!("=== Lecture Cleaner ===");
    println!("Files: {}", names.len());
    println!("Workers: {}", config.scheduler.workers);
    println!("=======================\n");

    scheduler.start().context("Cannot start workers")?;

    let total = names.len();
    let mut finished = 0;
    for event in events.iter() {
        let name = names.get(&event.task_id).map(String::as_str).unwrap_or("?");
        match event.kind {
            EventKind::Progress(value) => println!("[{:>3.0}%] {}", value * 100.0, name),
            EventKind::Succeeded { output_path } => {
                finished += 1;
                println!("✅ {} -> {}", name, output_path.display());
            }
            EventKind::Failed(err) => {
                finished += 1;
                println!("❌ {} failed in {}: {}", name, err.stage, err.message);
            }
            EventKind::Cancelled => {
                finished += 1;
                println!("⏹  {} cancelled", name);
            }
        }
        if finished == total {
            break;
        }
    }

    let stats = scheduler.shutdown(ShutdownMode::Graceful);

    println!("\n=== Summary ===");
    println!("Succeeded: {}", stats.succeeded);
    println!("Failed: {}", stats.failed);
    if stats.cancelled > 0 {
        println!("Cancelled: {}", stats.cancelled);
    }

    Ok(stats.failed == 0)
}
