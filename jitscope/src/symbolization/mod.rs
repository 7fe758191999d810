//! # Address Space and Object Inspection
//!
//! Everything the reader needs to know about a target process that does not
//! come from its memory directly:
//!
//! - **`memory_maps`**: `/proc/<pid>/maps` parsing, the binary search used to
//!   find the mapping backing a dex file, and recognition of dex files the
//!   runtime extracted from an archive into anonymous memory.
//! - **`object_inspector`**: ELF parsing through the `object` crate, used to
//!   locate the runtime's descriptor symbols and to measure JIT symfiles.
//!
//! ## Address Translation
//!
//! The descriptor symbols are link-time virtual addresses. The runtime
//! library is loaded at a random base, so the reader translates through the
//! executable mapping of the library:
//!
//! ```text
//! load_bias  = map.start - (exec_vaddr - exec_file_offset + map.pgoff)
//! descriptor = load_bias + symbol_vaddr
//! ```
//!
//! When the executable segment is page aligned (the common case) this
//! reduces to `map.start + (symbol_vaddr - exec_vaddr)`.

pub mod memory_maps;
pub mod object_inspector;

pub use memory_maps::{
    find_containing, maps_only_in_memory, parse_extracted_in_memory_path, parse_maps,
    url_in_archive, MapEntry, MemoryMapSource, ProcMaps,
};
pub use object_inspector::{DescriptorSymbols, ElfInspector, ObjectInspector};
