//! Map process names and thread ids to the pids the reader monitors.
//!
//! Android app processes all run `app_process64`, so names are matched
//! against the command line the runtime sets (the package name) as well as
//! the kernel `comm`.

use anyhow::{bail, Context, Result};
use std::fs;

use crate::domain::{Pid, Tid};

/// A process found by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    /// First command-line argument, e.g. `com.example.app`
    pub name: String,
    /// Kernel thread name of the main thread
    pub command: String,
}

/// Find every process whose name matches `name`.
///
/// # Errors
/// - `/proc` can't be listed
/// - No process matches
pub fn find_processes_by_name(name: &str) -> Result<Vec<ProcessInfo>> {
    let mut matches = Vec::new();

    for entry in fs::read_dir("/proc").context("Failed to read /proc")?.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
            continue;
        };

        // Processes may exit while we scan
        let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
            continue;
        };
        let Some(command) = extract_comm(&stat) else {
            continue;
        };
        let cmdline = fs::read(format!("/proc/{pid}/cmdline")).unwrap_or_default();
        let process_name = first_argument(&cmdline);

        if is_match(&process_name, command, name) {
            matches.push(ProcessInfo { pid: Pid(pid), name: process_name, command: command.into() });
        }
    }

    if matches.is_empty() {
        bail!(
            "No process matching '{name}' found.\n\
             Check running processes with: ps -A | grep {name}"
        );
    }
    matches.sort_by_key(|info| info.pid);
    Ok(matches)
}

/// The process a thread belongs to, from `Tgid:` in `/proc/<tid>/status`.
///
/// # Errors
/// Returns an error if the thread doesn't exist or its status is unreadable.
pub fn process_of_thread(tid: Tid) -> Result<Pid> {
    let status_path = format!("/proc/{}/status", tid.0);
    let status = fs::read_to_string(&status_path)
        .with_context(|| format!("Thread {} not found (cannot read {status_path})", tid.0))?;
    parse_tgid(&status).with_context(|| format!("No Tgid in {status_path}"))
}

fn parse_tgid(status: &str) -> Option<Pid> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Tgid:"))
        .and_then(|value| value.trim().parse().ok())
        .map(Pid)
}

/// Command name from a stat line: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Option<&str> {
    let open = stat_line.find('(')?;
    let close = stat_line.rfind(')')?;
    (open < close).then(|| &stat_line[open + 1..close])
}

/// Basename of the first NUL-separated argument
fn first_argument(cmdline: &[u8]) -> String {
    let arg0 = cmdline.split(|b| *b == 0).next().unwrap_or_default();
    let arg0 = String::from_utf8_lossy(arg0);
    arg0.rsplit('/').next().unwrap_or_default().to_string()
}

fn is_match(process_name: &str, command: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    process_name == pattern
        || command == pattern
        // comm is truncated to 15 bytes by the kernel
        || (command.len() == 15 && pattern.starts_with(command))
        || process_name.contains(pattern)
}
