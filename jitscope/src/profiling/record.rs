//! # Profiling Records
//!
//! The slice of the sampling record stream the reader cares about. The
//! recorder translates its own records into these before handing them to
//! [`JitDebugReader::observe_record`](crate::jit_debug::JitDebugReader::observe_record).
//!
//! ## Record Kinds
//!
//! - `Mmap` / `Mmap2` → a file was mapped; may be the runtime library
//! - `Fork` → child inherits the parent's runtime
//! - `Sample` → a sample was taken; first one from a runtime process
//!   triggers an immediate read

use crate::domain::{Pid, Tid};

/// One profiling record, timestamped on the target's monotonic clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Mmap { pid: Pid, tid: Tid, filename: String, timestamp: u64 },
    Mmap2 { pid: Pid, tid: Tid, filename: String, timestamp: u64 },
    Fork { pid: Pid, ppid: Pid, timestamp: u64 },
    Sample { pid: Pid, tid: Tid, timestamp: u64 },
}

impl Record {
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        match self {
            Record::Mmap { timestamp, .. }
            | Record::Mmap2 { timestamp, .. }
            | Record::Fork { timestamp, .. }
            | Record::Sample { timestamp, .. } => *timestamp,
        }
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        match self {
            Record::Mmap { pid, .. }
            | Record::Mmap2 { pid, .. }
            | Record::Fork { pid, .. }
            | Record::Sample { pid, .. } => *pid,
        }
    }

    /// Mapped file name for mmap records
    #[must_use]
    pub fn mapped_filename(&self) -> Option<&str> {
        match self {
            Record::Mmap { filename, .. } | Record::Mmap2 { filename, .. } => Some(filename),
            Record::Fork { .. } | Record::Sample { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accessors() {
        let mmap = Record::Mmap2 {
            pid: Pid(10),
            tid: Tid(11),
            filename: "/system/lib64/libart.so".into(),
            timestamp: 500,
        };
        assert_eq!(mmap.pid(), Pid(10));
        assert_eq!(mmap.timestamp(), 500);
        assert_eq!(mmap.mapped_filename(), Some("/system/lib64/libart.so"));

        let fork = Record::Fork { pid: Pid(12), ppid: Pid(10), timestamp: 600 };
        assert_eq!(fork.pid(), Pid(12));
        assert_eq!(fork.mapped_filename(), None);
    }
}
