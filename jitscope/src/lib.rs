//! # jitscope - JIT and dex debug info reader for ART processes
//!
//! A sampling profiler can only symbolize Java frames if it knows which JIT
//! code regions and dex files a process has registered. The ART runtime
//! publishes both through two linked lists in its own memory, each headed
//! by a descriptor guarded by a sequence lock. jitscope reads those lists
//! from live processes with `process_vm_readv`, never pausing them, and
//! tolerates the target mutating or exiting mid-read.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Target ART Process                         │
//! │   __jit_debug_descriptor ──▶ entry ──▶ entry ──▶ ...            │
//! │   __dex_debug_descriptor ──▶ entry ──▶ ...                      │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ process_vm_readv, /proc/<pid>/maps
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   jitscope (This Crate)                         │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Process    │──▶│    Walker    │──▶│  Extractor   │         │
//! │  │   Tracker    │   │ (seqlock'd)  │   │ (symfile/dex)│         │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘         │
//! │         ▲                                     │                 │
//! │         │                                     ▼                 │
//! │  ┌──────────────┐                     ┌──────────────┐          │
//! │  │   Records /  │                     │  Sync Queue  │──▶ callback
//! │  │   Periodic   │                     │  (min-heap)  │          │
//! │  └──────────────┘                     └──────────────┘          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`jit_debug`]: the reader. Descriptor decoding, process state, list
//!   walking, debug info extraction and the [`jit_debug::JitDebugReader`]
//!   orchestrator
//! - [`remote_memory`]: cross-process reads
//! - [`symbolization`]: `/proc/<pid>/maps` parsing and ELF inspection
//! - [`profiling`]: profiling records the reader observes, periodic trigger
//! - [`export`]: JSON lines output
//! - [`cli`], [`preflight`], [`process_lookup`]: the `jitscope` binary
//! - [`domain`]: core types (Pid, Tid) and errors
//!
//! ## Consistency
//!
//! The runtime bumps a descriptor's sequence lock before and after every
//! change. A read pass only trusts a walk if the lock was even and
//! unchanged across it; otherwise the results are dropped and picked up on
//! the next pass. A failed remote read means the process is gone.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Monitor every process of an app for 30 seconds
//! sudo ./jitscope com.example.app --duration 30 --output jit.jsonl
//!
//! # Keep the extracted JIT symfiles for offline symbolization
//! sudo ./jitscope --pid 1234 --keep-symfiles --symfile-dir /data/local/tmp
//! ```

pub mod cli;
pub mod domain;
pub mod export;
pub mod jit_debug;
pub mod preflight;
pub mod process_lookup;
pub mod profiling;
pub mod remote_memory;
pub mod symbolization;
