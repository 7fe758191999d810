//! Per-process reader state and descriptor location
//!
//! A process moves through `Uninitialized -> Initialized -> Dead`.
//! Initialization finds the runtime library in the process's maps and
//! computes where its two descriptors live. It is retried on every pass
//! until the runtime shows up or the process dies. Dead is terminal; the
//! reader drops dead processes at the end of each sweep.

use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::config::ReaderConfig;
use super::descriptor::{decode_descriptor, descriptor_size, Descriptor};
use crate::domain::{DecodeError, Pid, RemoteReadError};
use crate::remote_memory::RemoteMemory;
use crate::symbolization::{DescriptorSymbols, MemoryMapSource, ObjectInspector};

/// Which of the two registration lists a descriptor heads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Jit,
    Dex,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 2] = [DescriptorKind::Jit, DescriptorKind::Dex];
}

/// Furthest apart the two descriptors may be and still be read together
const MAX_DESCRIPTOR_GAP: usize = 4096;

/// Where both descriptors sit relative to the runtime library's first
/// executable segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorLocation {
    /// Start of the region holding both descriptors, relative to the
    /// lowest executable virtual address
    pub relative_addr: u64,
    /// Bytes covering both descriptors
    pub size: usize,
    pub jit_offset: usize,
    pub dex_offset: usize,
    /// File offset of the lowest executable segment
    pub exec_file_offset: u64,
}

impl DescriptorLocation {
    /// Build the combined read region from the two symbol addresses.
    ///
    /// Returns `None` if the symbols precede the executable segment or lie
    /// too far apart to read in one go.
    #[must_use]
    pub fn from_symbols(symbols: &DescriptorSymbols, is_64bit: bool) -> Option<Self> {
        let low = symbols.jit_descriptor.min(symbols.dex_descriptor);
        let high = symbols.jit_descriptor.max(symbols.dex_descriptor);
        let relative_addr = low.checked_sub(symbols.exec_vaddr)?;
        let span = usize::try_from(high - low).ok().filter(|gap| *gap <= MAX_DESCRIPTOR_GAP)?;

        Some(Self {
            relative_addr,
            size: span.checked_add(descriptor_size(is_64bit))?,
            jit_offset: usize::try_from(symbols.jit_descriptor - low).ok()?,
            dex_offset: usize::try_from(symbols.dex_descriptor - low).ok()?,
            exec_file_offset: symbols.exec_file_offset,
        })
    }
}

/// Runtime library path to descriptor location, shared by all processes
///
/// Failed lookups are cached too, so a library without the symbols is
/// only parsed once.
#[derive(Debug, Default)]
pub struct DescriptorLocationCache {
    locations: HashMap<PathBuf, Option<DescriptorLocation>>,
}

impl DescriptorLocationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached location for `library`, looking it up on first use
    pub fn resolve(
        &mut self,
        library: &Path,
        is_64bit: bool,
        inspector: &dyn ObjectInspector,
    ) -> Option<DescriptorLocation> {
        if let Some(cached) = self.locations.get(library) {
            return *cached;
        }

        let location = inspector
            .find_descriptor_symbols(library)
            .and_then(|symbols| DescriptorLocation::from_symbols(&symbols, is_64bit));
        if location.is_none() {
            debug!("No JIT debug descriptors found in {}", library.display());
        }
        self.locations.insert(library.to_path_buf(), location);
        location
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Both descriptors decoded from one combined read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorPair {
    pub jit: Result<Descriptor, DecodeError>,
    pub dex: Result<Descriptor, DecodeError>,
}

impl DescriptorPair {
    #[must_use]
    pub fn get(&self, kind: DescriptorKind) -> &Result<Descriptor, DecodeError> {
        match kind {
            DescriptorKind::Jit => &self.jit,
            DescriptorKind::Dex => &self.dex,
        }
    }
}

/// Reader state for one monitored process
#[derive(Debug, Clone)]
pub struct MonitoredProcess {
    pid: Pid,
    initialized: bool,
    dead: bool,
    is_64bit: bool,
    descriptors_addr: u64,
    descriptors_size: usize,
    jit_offset: usize,
    dex_offset: usize,
    last_jit: Descriptor,
    last_dex: Descriptor,
}

impl MonitoredProcess {
    #[must_use]
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            initialized: false,
            dead: false,
            is_64bit: false,
            descriptors_addr: 0,
            descriptors_size: 0,
            jit_offset: 0,
            dex_offset: 0,
            last_jit: Descriptor::default(),
            last_dex: Descriptor::default(),
        }
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn mark_dead(&mut self) {
        self.dead = true;
    }

    #[must_use]
    pub fn is_64bit(&self) -> bool {
        self.is_64bit
    }

    /// Remote address of the combined descriptor region
    #[must_use]
    pub fn descriptors_addr(&self) -> u64 {
        self.descriptors_addr
    }

    #[must_use]
    pub fn last_known(&self, kind: DescriptorKind) -> &Descriptor {
        match kind {
            DescriptorKind::Jit => &self.last_jit,
            DescriptorKind::Dex => &self.last_dex,
        }
    }

    pub fn set_last_known(&mut self, kind: DescriptorKind, descriptor: Descriptor) {
        match kind {
            DescriptorKind::Jit => self.last_jit = descriptor,
            DescriptorKind::Dex => self.last_dex = descriptor,
        }
    }

    /// Locate the runtime library and its descriptors
    ///
    /// Returns `false` when the runtime isn't mapped yet or its descriptors
    /// can't be found; both are retried on a later pass. An unreadable maps
    /// file means the process is gone, so it is also marked dead.
    pub fn initialize(
        &mut self,
        maps: &dyn MemoryMapSource,
        inspector: &dyn ObjectInspector,
        cache: &mut DescriptorLocationCache,
        config: &ReaderConfig,
    ) -> bool {
        let entries = match maps.memory_map(self.pid) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Failed to read maps of {}: {e}", self.pid);
                self.mark_dead();
                return false;
            }
        };

        let Some(runtime) =
            entries.iter().find(|map| map.executable && config.is_runtime_library(&map.name))
        else {
            return false;
        };

        let is_64bit = runtime.name.contains("lib64");
        let Some(location) = cache.resolve(Path::new(&runtime.name), is_64bit, inspector) else {
            return false;
        };

        self.is_64bit = is_64bit;
        self.descriptors_addr = runtime
            .start
            .wrapping_add(location.relative_addr)
            .wrapping_add(location.exec_file_offset)
            .wrapping_sub(runtime.pgoff);
        self.descriptors_size = location.size;
        self.jit_offset = location.jit_offset;
        self.dex_offset = location.dex_offset;
        self.initialized = true;

        debug!(
            "Initialized {} ({}-bit, {}): descriptors at 0x{:x}",
            self.pid,
            if is_64bit { 64 } else { 32 },
            runtime.name,
            self.descriptors_addr
        );
        true
    }

    /// Read both descriptors in one remote read
    ///
    /// # Errors
    /// A failed read marks the process dead and is returned. Decoding
    /// problems are reported per descriptor inside the pair.
    pub fn read_descriptors(
        &mut self,
        memory: &dyn RemoteMemory,
    ) -> Result<DescriptorPair, RemoteReadError> {
        let bytes = self.read_remote(memory, self.descriptors_addr, self.descriptors_size)?;
        let decode = |offset: usize| {
            bytes.get(offset..).map_or(
                Err(DecodeError::Truncated { need: offset, got: bytes.len() }),
                |slice| decode_descriptor(self.is_64bit, slice),
            )
        };
        Ok(DescriptorPair { jit: decode(self.jit_offset), dex: decode(self.dex_offset) })
    }

    /// Read `len` bytes at `addr`, marking the process dead on failure
    ///
    /// # Errors
    /// Returns the underlying read error.
    pub fn read_remote(
        &mut self,
        memory: &dyn RemoteMemory,
        addr: u64,
        len: usize,
    ) -> Result<Vec<u8>, RemoteReadError> {
        memory.read_vec(self.pid, addr, len).inspect_err(|e| {
            debug!("{e}");
            self.mark_dead();
        })
    }
}

/// Owns every monitored process, keyed by pid
#[derive(Debug, Default)]
pub struct ProcessTracker {
    processes: HashMap<Pid, MonitoredProcess>,
}

impl ProcessTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing state for `pid`, or a fresh uninitialized entry
    pub fn add_or_get(&mut self, pid: Pid) -> &mut MonitoredProcess {
        self.processes.entry(pid).or_insert_with(|| MonitoredProcess::new(pid))
    }

    #[must_use]
    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    #[must_use]
    pub fn get(&self, pid: Pid) -> Option<&MonitoredProcess> {
        self.processes.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut MonitoredProcess> {
        self.processes.get_mut(&pid)
    }

    /// Tracked pids in ascending order
    #[must_use]
    pub fn pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.processes.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn remove(&mut self, pid: Pid) -> Option<MonitoredProcess> {
        self.processes.remove(&pid)
    }

    /// Drop every dead process, returning their pids in ascending order
    pub fn remove_dead(&mut self) -> Vec<Pid> {
        let mut dead: Vec<Pid> =
            self.processes.values().filter(|p| p.is_dead()).map(MonitoredProcess::pid).collect();
        dead.sort_unstable();
        for pid in &dead {
            self.processes.remove(pid);
        }
        dead
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fake maps and ELF inspection for reader tests.

    use std::cell::Cell;
    use std::collections::HashMap;
    use std::io;
    use std::path::Path;

    use crate::domain::Pid;
    use crate::symbolization::{DescriptorSymbols, MapEntry, MemoryMapSource, ObjectInspector};

    #[derive(Default)]
    pub struct FakeMaps {
        pub maps: HashMap<Pid, Vec<MapEntry>>,
    }

    impl MemoryMapSource for FakeMaps {
        fn memory_map(&self, pid: Pid) -> io::Result<Vec<MapEntry>> {
            self.maps
                .get(&pid)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such process"))
        }
    }

    /// Payloads starting with `ELF!` are "objects" whose symbol range is
    /// stored in the next 16 bytes as two little-endian u64s.
    #[derive(Default)]
    pub struct FakeInspector {
        pub symbols: Option<DescriptorSymbols>,
        pub lookups: Cell<usize>,
    }

    pub const FAKE_OBJECT_MAGIC: &[u8; 4] = b"ELF!";

    pub fn fake_object(min: u64, max: u64) -> Vec<u8> {
        let mut bytes = FAKE_OBJECT_MAGIC.to_vec();
        bytes.extend_from_slice(&min.to_le_bytes());
        bytes.extend_from_slice(&max.to_le_bytes());
        bytes
    }

    impl ObjectInspector for FakeInspector {
        fn is_valid_object_magic(&self, data: &[u8]) -> bool {
            data.starts_with(FAKE_OBJECT_MAGIC)
        }

        fn symbol_address_range(&self, data: &[u8]) -> Option<(u64, u64)> {
            let min = u64::from_le_bytes(data.get(4..12)?.try_into().ok()?);
            let max = u64::from_le_bytes(data.get(12..20)?.try_into().ok()?);
            Some((min, max))
        }

        fn find_descriptor_symbols(&self, _path: &Path) -> Option<DescriptorSymbols> {
            self.lookups.set(self.lookups.get() + 1);
            self.symbols
        }
    }
}
