//! Structured error types for jitscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::Pid;
use thiserror::Error;

/// A cross-process read failed. The owning process is treated as dead.
#[derive(Error, Debug)]
pub enum RemoteReadError {
    #[error("Failed to read {len} bytes at 0x{addr:x} in process {pid}: {source}")]
    Failed {
        pid: Pid,
        addr: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Short read from process {pid} at 0x{addr:x}: got {got} of {len} bytes")]
    ShortRead { pid: Pid, addr: u64, got: usize, len: usize },
}

/// Remote descriptor or entry bytes do not match any known layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Buffer holds {got} bytes, layout needs {need}")]
    Truncated { need: usize, got: usize },

    #[error("Bad descriptor magic {0:02x?}")]
    BadMagic([u8; 8]),

    #[error("Unsupported descriptor version {0}")]
    BadVersion(u32),

    #[error("Descriptor declares size {declared}, expected {expected}")]
    DescriptorSize { declared: u32, expected: usize },

    #[error("Descriptor declares entry size {0}, unknown for this address width")]
    EntrySize(u32),
}

/// Walking a code entry list failed. Nothing from the walk may be used.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Entry 0x{0:x} visited twice, list has a cycle")]
    Cycle(u64),

    #[error("Entry 0x{addr:x} links back to 0x{found:x}, expected 0x{expected:x}")]
    BrokenLink { addr: u64, found: u64, expected: u64 },

    #[error("Entry 0x{0:x} has no symfile")]
    InvalidEntry(u64),

    #[error("Entry 0x{addr:x} is malformed: {source}")]
    Decode {
        addr: u64,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Remote(#[from] RemoteReadError),
}

/// Failures that escape the reader's public entry points.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// The debug info consumer rejected a batch.
    #[error(transparent)]
    Delivery(#[from] anyhow::Error),
}
