//! Debug info records handed to the consumer

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::domain::Pid;

/// One discovery, moved to the consumer by value
///
/// `timestamp` is the entry's registration time on the target's monotonic
/// clock, comparable with profiling record timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebugInfo {
    /// JIT-compiled code whose symfile was copied to a local file
    JitCode { pid: Pid, timestamp: u64, code_addr: u64, code_len: u64, file_path: PathBuf },
    /// Dex file backed by a file (or archive entry) on the target's filesystem
    DexFile { pid: Pid, timestamp: u64, dex_file_offset: u64, file_path: PathBuf },
}

impl DebugInfo {
    #[must_use]
    pub fn pid(&self) -> Pid {
        match self {
            DebugInfo::JitCode { pid, .. } | DebugInfo::DexFile { pid, .. } => *pid,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        match self {
            DebugInfo::JitCode { timestamp, .. } | DebugInfo::DexFile { timestamp, .. } => {
                *timestamp
            }
        }
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        match self {
            DebugInfo::JitCode { file_path, .. } | DebugInfo::DexFile { file_path, .. } => {
                file_path
            }
        }
    }
}
