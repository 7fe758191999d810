//! Turning new code entries into debug info
//!
//! JIT entries point at an in-memory ELF symfile that is copied out of the
//! target into a local temp file. Dex entries point into a mapping whose
//! backing file already exists on disk, so only the file offset is needed.
//!
//! A bad individual entry is skipped. A failed remote read or maps query
//! marks the process dead and ends the batch.

use log::{debug, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

use super::debug_info::DebugInfo;
use super::descriptor::CodeEntry;
use super::process::MonitoredProcess;
use crate::remote_memory::RemoteMemory;
use crate::symbolization::{
    find_containing, maps_only_in_memory, parse_extracted_in_memory_path, url_in_archive,
    MemoryMapSource, ObjectInspector,
};

const SYMFILE_PREFIX: &str = "jit_symfile_";

/// Local copies of JIT symfiles
///
/// Unless `keep` is set, every file is removed when the store is dropped.
#[derive(Debug)]
pub struct SymfileStore {
    dir: PathBuf,
    keep: bool,
    temp_paths: Vec<TempPath>,
}

impl SymfileStore {
    #[must_use]
    pub fn new(dir: PathBuf, keep: bool) -> Self {
        Self { dir, keep, temp_paths: Vec::new() }
    }

    /// Write `data` to a fresh file and return its path
    ///
    /// # Errors
    /// Returns an error if the file can't be created or written.
    pub fn persist(&mut self, data: &[u8]) -> io::Result<PathBuf> {
        let mut file = tempfile::Builder::new().prefix(SYMFILE_PREFIX).tempfile_in(&self.dir)?;
        file.write_all(data)?;
        file.flush()?;

        let temp_path = file.into_temp_path();
        if self.keep {
            return Ok(temp_path.keep()?);
        }
        let path = temp_path.to_path_buf();
        self.temp_paths.push(temp_path);
        Ok(path)
    }

    /// Files this store will delete on drop
    #[must_use]
    pub fn pending_cleanup(&self) -> usize {
        self.temp_paths.len()
    }
}

/// Copy out the symfiles of new JIT entries, oldest first
pub fn extract_jit_code(
    process: &mut MonitoredProcess,
    entries: &[CodeEntry],
    memory: &dyn RemoteMemory,
    inspector: &dyn ObjectInspector,
    symfiles: &mut SymfileStore,
    max_symfile_size: u64,
) -> Vec<DebugInfo> {
    let mut infos = Vec::new();

    for entry in entries {
        if entry.symfile_size > max_symfile_size {
            debug!(
                "Skipping {}-byte JIT symfile at 0x{:x} in {}",
                entry.symfile_size,
                entry.symfile_addr,
                process.pid()
            );
            continue;
        }
        let Ok(len) = usize::try_from(entry.symfile_size) else {
            continue;
        };
        let Ok(data) = process.read_remote(memory, entry.symfile_addr, len) else {
            break;
        };

        if !inspector.is_valid_object_magic(&data) {
            debug!("JIT symfile at 0x{:x} is not an ELF file", entry.symfile_addr);
            continue;
        }
        let Some((min_addr, max_addr)) = inspector
            .symbol_address_range(&data)
            .filter(|(min_addr, max_addr)| min_addr < max_addr)
        else {
            debug!("JIT symfile at 0x{:x} has no code symbols", entry.symfile_addr);
            continue;
        };

        let file_path = match symfiles.persist(&data) {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to write JIT symfile: {e}");
                break;
            }
        };

        infos.push(DebugInfo::JitCode {
            pid: process.pid(),
            timestamp: entry.register_timestamp,
            code_addr: min_addr,
            code_len: max_addr - min_addr,
            file_path,
        });
    }

    infos
}

/// Resolve new dex entries to their backing files, oldest first
pub fn extract_dex_files(
    process: &mut MonitoredProcess,
    entries: &[CodeEntry],
    maps: &dyn MemoryMapSource,
) -> Vec<DebugInfo> {
    if entries.is_empty() {
        return Vec::new();
    }

    let map_entries = match maps.memory_map(process.pid()) {
        Ok(map_entries) => map_entries,
        Err(e) => {
            debug!("Failed to read maps of {}: {e}", process.pid());
            process.mark_dead();
            return Vec::new();
        }
    };

    let mut infos = Vec::new();
    for entry in entries {
        let Some(map) = find_containing(&map_entries, entry.symfile_addr)
            .filter(|map| map.contains_range(entry.symfile_addr, entry.symfile_size))
        else {
            debug!("Dex file at 0x{:x} is outside any mapping", entry.symfile_addr);
            continue;
        };

        let file_path = if let Some((archive, name)) = parse_extracted_in_memory_path(&map.name) {
            PathBuf::from(url_in_archive(archive, name))
        } else if !maps_only_in_memory(&map.name) && is_regular_file(Path::new(&map.name)) {
            PathBuf::from(&map.name)
        } else {
            // Dex files living only in anonymous memory aren't supported
            debug!("Dex file at 0x{:x} has no backing file ({})", entry.symfile_addr, map.name);
            continue;
        };

        infos.push(DebugInfo::DexFile {
            pid: process.pid(),
            timestamp: entry.register_timestamp,
            dex_file_offset: entry.symfile_addr - map.start + map.pgoff,
            file_path,
        });
    }

    infos
}

fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file())
}
