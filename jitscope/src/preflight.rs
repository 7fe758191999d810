//! Pre-flight checks for jitscope
//!
//! Validates that target processes exist and that their memory can be read
//! before monitoring starts. Provides clear, actionable error messages.

use anyhow::{bail, Context, Result};
use std::io;
use std::path::Path;

use crate::domain::{Pid, RemoteReadError};
use crate::remote_memory::{ProcessVmReader, RemoteMemory};
use crate::symbolization::{MemoryMapSource, ProcMaps};

/// Run all pre-flight checks for one target process
///
/// # Errors
/// Returns the first failed check.
pub fn run_preflight_checks(pid: Pid) -> Result<()> {
    check_process_exists(pid)?;
    check_remote_read_access(pid)?;
    Ok(())
}

/// Check if the target process exists
///
/// # Errors
/// Returns an error if `/proc/<pid>` is missing.
pub fn check_process_exists(pid: Pid) -> Result<()> {
    if !Path::new(&format!("/proc/{}", pid.0)).exists() {
        bail!(
            "Process {} not found.\n\n\
             Is the process still running? Check with: ps -p {}",
            pid.0,
            pid.0
        );
    }
    Ok(())
}

/// Check that we may read the process's memory
///
/// Reads a few bytes from its first readable mapping, the same way the
/// reader will.
///
/// # Errors
/// Errors mentioning "permission denied" map to exit code 77.
pub fn check_remote_read_access(pid: Pid) -> Result<()> {
    let maps = ProcMaps.memory_map(pid).with_context(|| {
        format!(
            "Cannot read /proc/{}/maps\n\n\
             This usually means:\n\
             - The process doesn't exist (check: ps -p {})\n\
             - Permission denied (run as root or as the app's user)",
            pid.0, pid.0
        )
    })?;

    let Some(map) = maps.iter().find(|map| map.readable && !map.is_empty()) else {
        // Nothing mapped readable (zombie); the reader will notice
        return Ok(());
    };

    let mut probe = [0u8; 8];
    match ProcessVmReader.read(pid, map.start, &mut probe) {
        Err(RemoteReadError::Failed { source, .. })
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            bail!(
                "Permission denied reading memory of {pid}.\n\n\
                 process_vm_readv needs ptrace access: run as root, as the app's user,\n\
                 or relax /proc/sys/kernel/yama/ptrace_scope"
            )
        }
        // Other failures are races with the process exiting or unmapping
        _ => Ok(()),
    }
}
