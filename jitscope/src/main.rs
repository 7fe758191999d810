//! # jitscope - Main Entry Point
//!
//! Monitors ART processes given by name, pid, or thread id and writes the
//! JIT code and dex files they register as JSON lines.
//!
//! The reader is single-threaded. Its periodic read event is driven by an
//! [`IntervalScheduler`]; the loop sleeps on the scheduler's next delay and
//! stops on Ctrl+C, the duration limit, or when no process remains.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

use jitscope::cli::Args;
use jitscope::domain::{Pid, Tid};
use jitscope::export::DebugInfoWriter;
use jitscope::jit_debug::{JitDebugReader, ReaderConfig};
use jitscope::preflight::run_preflight_checks;
use jitscope::process_lookup::{find_processes_by_name, process_of_thread};
use jitscope::profiling::IntervalScheduler;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    std::process::exit(match run().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Collect target pids from the name, `--pid`, and `--tid` arguments.
fn resolve_pids(args: &Args) -> Result<Vec<Pid>> {
    if !args.has_target() {
        bail!(
            "Missing required argument: PROCESS, --pid or --tid\n\n\
             Usage:\n  \
             jitscope com.example.app      Monitor processes by name\n  \
             jitscope --pid 1234           Monitor one process\n\n\
             Run 'jitscope --help' for more options"
        );
    }

    let mut pids: Vec<Pid> = args.pid.iter().copied().map(Pid).collect();
    if let Some(ref name) = args.process {
        pids.extend(find_processes_by_name(name)?.into_iter().map(|info| info.pid));
    }
    for tid in &args.tid {
        pids.push(process_of_thread(Tid(*tid))?);
    }

    pids.sort_unstable();
    pids.dedup();
    Ok(pids)
}

fn open_output(args: &Args) -> Result<Box<dyn Write>> {
    Ok(match args.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let pids = resolve_pids(&args)?;
    for pid in &pids {
        run_preflight_checks(*pid)?;
    }

    let mut config = ReaderConfig::default()
        .keep_symfiles(args.keep_symfiles)
        .read_interval(Duration::from_millis(args.interval_ms));
    if let Some(ref dir) = args.symfile_dir {
        config = config.symfile_dir(dir);
    }

    if !quiet {
        eprintln!("jitscope v{}", env!("CARGO_PKG_VERSION"));
        let list: Vec<String> = pids.iter().map(|pid| pid.0.to_string()).collect();
        eprintln!("pids: {}", list.join(", "));
        eprintln!("symfiles: {}", config.symfile_dir.display());
    }

    let writer = Rc::new(RefCell::new(DebugInfoWriter::new(open_output(&args)?)));
    let mut scheduler = IntervalScheduler::new();
    let mut reader = JitDebugReader::new(config);

    let sink = Rc::clone(&writer);
    reader.register_debug_info_callback(&mut scheduler, move |infos, periodic| {
        let mut writer = sink.borrow_mut();
        writer.write_batch(&infos, periodic)?;
        writer.flush()
    });

    for pid in &pids {
        reader.monitor_process(*pid);
    }
    reader.read_all_processes().context("Failed to write debug info")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let start = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };

    // Track why we exited the loop
    let exit_reason;

    loop {
        if reader.monitored_pids().is_empty() {
            exit_reason = "all processes exited";
            break;
        }
        if duration_limit.is_some_and(|limit| start.elapsed() >= limit) {
            exit_reason = "duration limit reached";
            break;
        }
        let Some(delay) = scheduler.next_delay() else {
            exit_reason = "no periodic read registered";
            break;
        };

        tokio::select! {
            () = tokio::time::sleep(delay) => {
                if scheduler.is_event_enabled() {
                    reader.read_all_processes().context("Failed to write debug info")?;
                }
            }
            _ = &mut ctrl_c => {
                exit_reason = "interrupted";
                break;
            }
        }
    }

    reader.flush_all().context("Failed to write debug info")?;
    let written = {
        let mut writer = writer.borrow_mut();
        if let Err(e) = writer.flush() {
            warn!("{e:#}");
        }
        writer.written()
    };
    info!("Stopped monitoring {} processes", pids.len());

    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} debug info records",
            exit_reason,
            start.elapsed().as_secs_f64(),
            written
        );
        if let Some(ref path) = args.output {
            eprintln!("saved: {}", path.display());
        }
    }

    // Dropping the reader removes temporary symfiles
    drop(reader);
    Ok(())
}
