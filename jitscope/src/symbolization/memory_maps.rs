//! Memory mapping utilities for process address space analysis
//!
//! This module parses `/proc/pid/maps` into ordered [`MapEntry`] lists. The
//! reader uses them twice: to find where the ART runtime library is loaded,
//! and to find which file backs a registered dex file.

use log::debug;
use std::fs;
use std::io;

use crate::domain::Pid;

/// One line of `/proc/pid/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub start: u64,
    pub end: u64,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    /// File offset the mapping starts at
    pub pgoff: u64,
    /// Backing path, `[anon:...]` name, or empty for anonymous memory
    pub name: String,
}

impl MapEntry {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if an address falls within this mapping
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Check if `[addr, addr + size)` lies entirely inside this mapping
    #[must_use]
    pub fn contains_range(&self, addr: u64, size: u64) -> bool {
        addr >= self.start && addr.checked_add(size).is_some_and(|end| end <= self.end)
    }
}

/// Source of process memory maps
pub trait MemoryMapSource {
    /// Current mappings of `pid`, ordered by start address.
    ///
    /// # Errors
    /// Returns an error if the process has exited or its maps are unreadable.
    fn memory_map(&self, pid: Pid) -> io::Result<Vec<MapEntry>>;
}

/// Reads `/proc/<pid>/maps`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMaps;

impl MemoryMapSource for ProcMaps {
    fn memory_map(&self, pid: Pid) -> io::Result<Vec<MapEntry>> {
        let maps_path = format!("/proc/{}/maps", pid.0);
        let content = fs::read_to_string(&maps_path)?;
        Ok(parse_maps(&content))
    }
}

/// Parse the text of a maps file
///
/// Lines that don't parse are skipped. Kernel order (ascending start
/// address) is preserved, which [`find_containing`] relies on.
#[must_use]
pub fn parse_maps(content: &str) -> Vec<MapEntry> {
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for line in content.lines() {
        match parse_line(line) {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("Skipped {skipped} unparsable maps lines");
    }
    entries
}

/// Parse the line: "start-end perms offset dev inode pathname"
fn parse_line(line: &str) -> Option<MapEntry> {
    let mut fields = line.splitn(6, char::is_whitespace);
    let (start, end) = fields.next()?.split_once('-')?;
    let perms = fields.next()?.as_bytes();
    let pgoff = fields.next()?;
    let _dev = fields.next()?;
    let _inode = fields.next()?;
    let name = fields.next().map(str::trim).unwrap_or_default();

    if perms.len() < 3 {
        return None;
    }
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if end < start {
        return None;
    }

    Some(MapEntry {
        start,
        end,
        readable: perms[0] == b'r',
        writable: perms[1] == b'w',
        executable: perms[2] == b'x',
        pgoff: u64::from_str_radix(pgoff, 16).ok()?,
        name: name.to_string(),
    })
}

/// Binary search for the mapping containing `addr`
///
/// `maps` must be ordered by start address.
#[must_use]
pub fn find_containing(maps: &[MapEntry], addr: u64) -> Option<&MapEntry> {
    let idx = maps.partition_point(|map| map.start <= addr);
    let candidate = maps.get(idx.checked_sub(1)?)?;
    candidate.contains(addr).then_some(candidate)
}

/// Mappings with no file on disk behind them
///
/// Covers anonymous memory, `[anon:...]` regions (including the JIT code
/// cache), `[stack]`-style kernel names, and `//anon`.
#[must_use]
pub fn maps_only_in_memory(name: &str) -> bool {
    name.is_empty() || name.starts_with('[') || name.starts_with("//")
}

const EXTRACTED_PREFIX: &str = "[anon:dalvik-";
const EXTRACTED_SEPARATOR: &str = " extracted in memory from ";

/// Split a dex mapping extracted from an archive into `(archive, entry)`
///
/// ```text
/// [anon:dalvik-classes2.dex extracted in memory from /data/app/base.apk]
/// [anon:dalvik-classes2.dex extracted in memory from /data/app/base.apk!classes2.dex]
///   -> ("/data/app/base.apk", "classes2.dex")
/// ```
#[must_use]
pub fn parse_extracted_in_memory_path(name: &str) -> Option<(&str, &str)> {
    let inner = name.strip_prefix(EXTRACTED_PREFIX)?.strip_suffix(']')?;
    let (entry, archive) = inner.split_once(EXTRACTED_SEPARATOR)?;
    let archive = archive.split_once('!').map_or(archive, |(path, _)| path);
    if entry.is_empty() || archive.is_empty() {
        return None;
    }
    Some((archive, entry))
}

/// Path naming an entry inside an archive, e.g. `base.apk!/classes.dex`
#[must_use]
pub fn url_in_archive(archive: &str, entry: &str) -> String {
    format!("{archive}!/{entry}")
}
