//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "jitscope",
    about = "Collect JIT code and dex file debug info from running ART processes",
    after_help = "\
EXAMPLES:
    sudo jitscope com.example.app                 Monitor every process of an app
    sudo jitscope --pid 1234 --duration 10        Monitor one process for 10 seconds
    sudo jitscope --tid 1240 --keep-symfiles      Monitor the process owning a thread"
)]
pub struct Args {
    /// Process name to monitor (matched against command line and comm)
    #[arg(value_name = "PROCESS")]
    pub process: Option<String>,

    /// Process ID to monitor (repeatable)
    #[arg(short, long, value_name = "PID")]
    pub pid: Vec<i32>,

    /// Thread ID whose process to monitor (repeatable)
    #[arg(short, long, value_name = "TID")]
    pub tid: Vec<i32>,

    /// Stop after N seconds (0 = until every process exits)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Periodic read interval in milliseconds
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Keep extracted JIT symfiles after exit
    #[arg(long)]
    pub keep_symfiles: bool,

    /// Directory for extracted JIT symfiles (default: system temp dir)
    #[arg(long, value_name = "DIR")]
    pub symfile_dir: Option<PathBuf>,

    /// Write JSON lines to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Was any target given?
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.process.is_some() || !self.pid.is_empty() || !self.tid.is_empty()
    }
}
