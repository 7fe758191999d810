//! JIT and dex debug info discovery
//!
//! The ART runtime keeps two registration lists, one for JIT-compiled
//! code and one for loaded dex files. Each is headed by a descriptor
//! guarded by a sequence lock. This module reads both lists out of live
//! processes without stopping them.
//!
//! ```text
//! descriptor.rs   bytes -> Descriptor / CodeEntry (32- or 64-bit)
//! process.rs      per-process state, descriptor location cache
//! walker.rs       bounded walk of the remote entry list
//! extractor.rs    entries -> DebugInfo (symfile copy, dex offset)
//! queue.rs        timestamp-ordered release for sync mode
//! reader.rs       JitDebugReader, the entry points
//! ```

pub mod config;
pub mod debug_info;
pub mod descriptor;
pub mod extractor;
pub mod process;
pub mod queue;
pub mod reader;
pub mod walker;

pub use config::ReaderConfig;
pub use debug_info::DebugInfo;
pub use descriptor::{decode_descriptor, decode_entry, CodeEntry, Descriptor, EntryLayout};
pub use process::{
    DescriptorKind, DescriptorLocation, DescriptorLocationCache, MonitoredProcess, ProcessTracker,
};
pub use queue::DebugInfoQueue;
pub use reader::{DebugInfoCallback, JitDebugReader};
pub use walker::{entry_budget, walk_code_entries};
