//! ELF inspection for the runtime library and JIT symfiles
//!
//! Two jobs, both through the `object` crate:
//! - locate `__jit_debug_descriptor` / `__dex_debug_descriptor` in a local
//!   copy of the runtime library
//! - check a JIT symfile pulled out of the target and compute the address
//!   span its function symbols cover

use jitscope_common::{DEX_DEBUG_DESCRIPTOR_SYMBOL, JIT_DEBUG_DESCRIPTOR_SYMBOL};
use log::debug;
use object::{Object, ObjectSegment, ObjectSymbol, SegmentFlags, SymbolKind};
use std::fs;
use std::path::Path;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Where the two descriptors live in a runtime library file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSymbols {
    /// Virtual address of the first executable segment
    pub exec_vaddr: u64,
    /// File offset of the first executable segment
    pub exec_file_offset: u64,
    pub jit_descriptor: u64,
    pub dex_descriptor: u64,
}

/// Binary object inspection used by the reader
pub trait ObjectInspector {
    /// Does `data` start with the ELF magic?
    fn is_valid_object_magic(&self, data: &[u8]) -> bool;

    /// `(min, max)` virtual address span of the function symbols in `data`.
    ///
    /// Returns `None` when there are no function symbols.
    fn symbol_address_range(&self, data: &[u8]) -> Option<(u64, u64)>;

    /// Look up both descriptor symbols in the library at `path`.
    fn find_descriptor_symbols(&self, path: &Path) -> Option<DescriptorSymbols>;
}

/// [`ObjectInspector`] backed by the `object` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfInspector;

impl ObjectInspector for ElfInspector {
    fn is_valid_object_magic(&self, data: &[u8]) -> bool {
        data.starts_with(ELF_MAGIC)
    }

    fn symbol_address_range(&self, data: &[u8]) -> Option<(u64, u64)> {
        let obj = object::File::parse(data).ok()?;

        let mut min_addr = u64::MAX;
        let mut max_addr = 0u64;
        for symbol in obj.symbols().chain(obj.dynamic_symbols()) {
            if symbol.kind() != SymbolKind::Text || symbol.address() == 0 {
                continue;
            }
            min_addr = min_addr.min(symbol.address());
            max_addr = max_addr.max(symbol.address().saturating_add(symbol.size()));
        }

        (min_addr < max_addr).then_some((min_addr, max_addr))
    }

    fn find_descriptor_symbols(&self, path: &Path) -> Option<DescriptorSymbols> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                debug!("Failed to read {}: {e}", path.display());
                return None;
            }
        };
        let obj = object::File::parse(&*data).ok()?;

        let (exec_vaddr, exec_file_offset) = obj
            .segments()
            .filter(|segment| is_executable(segment.flags()))
            .map(|segment| (segment.address(), segment.file_range().0))
            .min_by_key(|(vaddr, _)| *vaddr)?;

        let lookup = |name: &str| {
            obj.symbols()
                .chain(obj.dynamic_symbols())
                .find(|symbol| symbol.name().is_ok_and(|n| n == name))
                .map(|symbol| symbol.address())
        };
        let jit_descriptor = lookup(JIT_DEBUG_DESCRIPTOR_SYMBOL)?;
        let dex_descriptor = lookup(DEX_DEBUG_DESCRIPTOR_SYMBOL)?;

        Some(DescriptorSymbols { exec_vaddr, exec_file_offset, jit_descriptor, dex_descriptor })
    }
}

fn is_executable(flags: SegmentFlags) -> bool {
    matches!(flags, SegmentFlags::Elf { p_flags } if p_flags & object::elf::PF_X != 0)
}
