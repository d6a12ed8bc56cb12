use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

mod jobs;
mod trace_parser;

use trace_parser::{load_file, print_summary, summarize, write_timeline, CoreTrace};

/// Developer utility tasks.
#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Decode raw per-core trace buffers into a timeline.
    Decode {
        /// Buffer images, one per core, in core order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Time of the first delta, in microseconds.
        #[arg(long, default_value_t = 0)]
        start_us: u64,
        /// Write the timeline to this file instead of stdout.
        #[arg(long)]
        events_out: Option<PathBuf>,
    },
    /// Print event counts and the task table.
    Summary {
        /// Buffer images, one per core, in core order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Time of the first delta, in microseconds.
        #[arg(long, default_value_t = 0)]
        start_us: u64,
    },
    /// Rebuild per-task jobs and report response times.
    Tasks {
        /// Buffer images, one per core, in core order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Time of the first delta, in microseconds.
        #[arg(long, default_value_t = 0)]
        start_us: u64,
        /// Length of one scheduler tick, in microseconds.
        #[arg(long, default_value_t = 1000)]
        tick_us: u64,
        /// List every job and execution interval.
        #[arg(long)]
        jobs: bool,
        /// Write the events of each task to this file.
        #[arg(long)]
        events_out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    match Cli::parse().cmd {
        Cmd::Decode {
            files,
            start_us,
            events_out,
        } => decode(&files, start_us, events_out),
        Cmd::Summary { files, start_us } => summary(&files, start_us),
        Cmd::Tasks {
            files,
            start_us,
            tick_us,
            jobs,
            events_out,
        } => tasks(&files, start_us, tick_us, jobs, events_out),
    }
}

fn load_all(files: &[PathBuf]) -> Result<Vec<CoreTrace>> {
    files
        .iter()
        .enumerate()
        .map(|(core, path)| load_file(core, path))
        .collect()
}

fn decode(files: &[PathBuf], start_us: u64, events_out: Option<PathBuf>) -> Result<()> {
    let traces = load_all(files)?;

    let mut out: Box<dyn Write> = match &events_out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create events file: {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut total = 0;
    let mut failed = 0;
    for trace in &traces {
        match write_timeline(trace, start_us, &mut out) {
            Ok(records) => total += records,
            Err(err) => {
                eprintln!("error: {:#}", err);
                failed += 1;
            }
        }
    }
    out.flush()?;
    drop(out);

    if let Some(path) = &events_out {
        println!("Wrote {} records to: {}", total, path.display());
    }
    if failed > 0 {
        bail!("{} of {} buffers did not decode cleanly", failed, traces.len());
    }
    Ok(())
}

fn summary(files: &[PathBuf], start_us: u64) -> Result<()> {
    let traces = load_all(files)?;
    let summary = summarize(&traces, start_us)?;
    print_summary(&summary);
    Ok(())
}

fn tasks(
    files: &[PathBuf],
    start_us: u64,
    tick_us: u64,
    list_jobs: bool,
    events_out: Option<PathBuf>,
) -> Result<()> {
    let traces = load_all(files)?;
    let events = jobs::collect_events(&traces, start_us)?;
    let model = jobs::build(&events, tick_us);

    if let Some(path) = &events_out {
        let mut out = BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create events file: {}", path.display()))?,
        );
        jobs::write_task_events(&model, &mut out)?;
        out.flush()?;
        println!("Wrote task events to: {}", path.display());
    }

    jobs::print_tasks(&model, list_jobs);
    Ok(())
}
