//! Synthetic ART processes for driving the reader end to end.
//!
//! Each fake process renders its descriptors, entry lists, and JIT symfile
//! payloads into a sparse address space on every read, so tests can mutate
//! a process between (or during) read passes.

#![allow(dead_code)]

use jitscope::domain::{Pid, RemoteReadError};
use jitscope::jit_debug::DebugInfo;
use jitscope::profiling::{PeriodicScheduler, PeriodicTrigger};
use jitscope::remote_memory::RemoteMemory;
use jitscope::symbolization::{DescriptorSymbols, MapEntry, MemoryMapSource, ObjectInspector};
use jitscope_common::{
    DescriptorLayout, EntryLayout, DESCRIPTOR_LAYOUT_32, DESCRIPTOR_LAYOUT_64, ENTRY_LAYOUT_32,
    ENTRY_LAYOUT_32_PAD, ENTRY_LAYOUT_64, JIT_DESCRIPTOR_MAGIC, JIT_DESCRIPTOR_VERSION,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

pub const LIBART_64: &str = "/apex/com.android.art/lib64/libart.so";
pub const LIBART_32: &str = "/apex/com.android.art/lib/libart.so";

/// Where the fake runtime's descriptors land once loaded
pub const DESCRIPTORS_ADDR: u64 = 0x7038_0000;
const DEX_DESCRIPTOR_OFFSET: u64 = 0x100;

const RUNTIME_MAP_START: u64 = 0x7010_0000;
const RUNTIME_PGOFF: u64 = 0x10_0000;
const JIT_ENTRIES: u64 = 0x1_0000;
const DEX_ENTRIES: u64 = 0x2_0000;
const SYMFILES: u64 = 0x10_0000;
const EXTRACTED_DEX_START: u64 = 0x5000_0000;
pub const EXTRACTED_DEX_NAME: &str =
    "[anon:dalvik-classes.dex extracted in memory from /data/app/base.apk]";

pub const FAKE_ELF_MAGIC: &[u8; 4] = b"ELF!";

#[derive(Debug, Clone, Copy)]
struct Entry {
    symfile_addr: u64,
    symfile_size: u64,
    timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum List {
    Jit,
    Dex,
}

/// One fake ART process
#[derive(Debug)]
pub struct ArtProcess {
    is_64bit: bool,
    /// 32-bit entries with the 64-bit field padding some ABIs use
    padded_entries: bool,
    runtime_loaded: bool,
    jit: Vec<Entry>,
    dex: Vec<Entry>,
    jit_seqlock: u32,
    dex_seqlock: u32,
    jit_timestamp: u64,
    dex_timestamp: u64,
    payloads: BTreeMap<u64, Vec<u8>>,
    /// Corrupt the prev link of the JIT list tail
    broken_jit_list: bool,
    /// Lists whose descriptor carries a wrong magic
    corrupt_magic: Vec<List>,
    descriptor_reads: usize,
    /// Descriptor read count at which to register JIT code, and its timestamp
    race_at: Option<(usize, u64)>,
}

impl ArtProcess {
    pub fn new(is_64bit: bool) -> Self {
        Self {
            is_64bit,
            padded_entries: false,
            runtime_loaded: true,
            jit: Vec::new(),
            dex: Vec::new(),
            jit_seqlock: 0,
            dex_seqlock: 0,
            jit_timestamp: 0,
            dex_timestamp: 0,
            payloads: BTreeMap::new(),
            broken_jit_list: false,
            corrupt_magic: Vec::new(),
            descriptor_reads: 0,
            race_at: None,
        }
    }

    pub fn without_runtime(mut self) -> Self {
        self.runtime_loaded = false;
        self
    }

    /// Lay out 32-bit entries with padding before the 64-bit fields
    pub fn with_padded_entries(mut self) -> Self {
        self.padded_entries = true;
        self
    }

    pub fn load_runtime(&mut self) {
        self.runtime_loaded = true;
    }

    /// Register JIT code covering `[code_addr, code_addr + code_len)`
    pub fn add_jit(&mut self, timestamp: u64, code_addr: u64, code_len: u64) {
        let symfile_addr = SYMFILES + 0x1000 * self.jit.len() as u64;
        let payload = fake_elf(code_addr, code_addr + code_len);
        let entry = Entry { symfile_addr, symfile_size: payload.len() as u64, timestamp };
        self.payloads.insert(symfile_addr, payload);
        self.jit.push(entry);
        self.jit_seqlock += 2;
        self.jit_timestamp = timestamp;
    }

    /// Register a JIT entry whose payload is `payload`
    pub fn add_raw_jit(&mut self, timestamp: u64, payload: Vec<u8>) {
        let symfile_addr = SYMFILES + 0x1000 * self.jit.len() as u64;
        let entry = Entry { symfile_addr, symfile_size: payload.len() as u64, timestamp };
        self.payloads.insert(symfile_addr, payload);
        self.jit.push(entry);
        self.jit_seqlock += 2;
        self.jit_timestamp = timestamp;
    }

    /// Register a dex file inside the extracted-in-memory mapping
    pub fn add_dex(&mut self, timestamp: u64) {
        let symfile_addr = EXTRACTED_DEX_START + 0x1000 * self.dex.len() as u64;
        self.dex.push(Entry { symfile_addr, symfile_size: 0x800, timestamp });
        self.dex_seqlock += 2;
        self.dex_timestamp = timestamp;
    }

    /// Leave `list` mid-update (odd sequence lock)
    pub fn begin_update(&mut self, list: List) {
        match list {
            List::Jit => self.jit_seqlock |= 1,
            List::Dex => self.dex_seqlock |= 1,
        }
    }

    pub fn end_update(&mut self, list: List) {
        match list {
            List::Jit => self.jit_seqlock = (self.jit_seqlock | 1) + 1,
            List::Dex => self.dex_seqlock = (self.dex_seqlock | 1) + 1,
        }
    }

    /// Scribble over the magic of `list`'s descriptor, or restore it
    pub fn corrupt_magic(&mut self, list: List, corrupt: bool) {
        self.corrupt_magic.retain(|l| *l != list);
        if corrupt {
            self.corrupt_magic.push(list);
        }
    }

    pub fn break_jit_list(&mut self, broken: bool) {
        self.broken_jit_list = broken;
    }

    /// Register JIT code at `timestamp` just before the `n`-th descriptor
    /// read from now, e.g. `n = 2` lands between a walk and its re-check
    pub fn race_on_descriptor_read(&mut self, n: usize, timestamp: u64) {
        self.race_at = Some((self.descriptor_reads + n, timestamp));
    }

    fn maps(&self) -> Vec<MapEntry> {
        let runtime_name = if self.is_64bit { LIBART_64 } else { LIBART_32 };
        let mut maps = vec![map(0x1000_0000, 0x1001_0000, true, 0, "/system/bin/app_process64")];
        if self.runtime_loaded {
            maps.push(map(0x7000_0000, RUNTIME_MAP_START, false, 0, runtime_name));
            maps.push(map(RUNTIME_MAP_START, 0x7050_0000, true, RUNTIME_PGOFF, runtime_name));
        }
        maps.push(map(
            EXTRACTED_DEX_START,
            EXTRACTED_DEX_START + 0x10_0000,
            false,
            0,
            EXTRACTED_DEX_NAME,
        ));
        maps.sort_by_key(|m| m.start);
        maps
    }

    fn descriptor_layout(&self) -> &'static DescriptorLayout {
        if self.is_64bit {
            &DESCRIPTOR_LAYOUT_64
        } else {
            &DESCRIPTOR_LAYOUT_32
        }
    }

    fn entry_layout(&self) -> &'static EntryLayout {
        if self.is_64bit {
            &ENTRY_LAYOUT_64
        } else if self.padded_entries {
            &ENTRY_LAYOUT_32_PAD
        } else {
            &ENTRY_LAYOUT_32
        }
    }

    fn render(&self) -> BTreeMap<u64, Vec<u8>> {
        let mut memory = self.payloads.clone();
        if !self.runtime_loaded {
            return memory;
        }

        let entry_layout = self.entry_layout();
        let descriptor_layout = self.descriptor_layout();
        let mut descriptors = vec![0u8; DEX_DESCRIPTOR_OFFSET as usize + descriptor_layout.size];

        for (kind, list, base, seqlock, timestamp, offset) in [
            (List::Jit, &self.jit, JIT_ENTRIES, self.jit_seqlock, self.jit_timestamp, 0),
            (
                List::Dex,
                &self.dex,
                DEX_ENTRIES,
                self.dex_seqlock,
                self.dex_timestamp,
                DEX_DESCRIPTOR_OFFSET,
            ),
        ] {
            let addr_of = |i: usize| base + 0x100 * i as u64;
            // Newest entry is the head
            let n = list.len();
            for (i, entry) in list.iter().enumerate() {
                let next = if i == 0 { 0 } else { addr_of(i - 1) };
                let mut prev = if i + 1 == n { 0 } else { addr_of(i + 1) };
                if base == JIT_ENTRIES && self.broken_jit_list && i == 0 && n > 1 {
                    prev = 0xdead_0000;
                }
                let bytes = encode_entry(
                    entry_layout,
                    next,
                    prev,
                    entry.symfile_addr,
                    entry.symfile_size,
                    entry.timestamp,
                );
                memory.insert(addr_of(i), bytes);
            }
            let head = if n == 0 { 0 } else { addr_of(n - 1) };
            let mut bytes =
                encode_descriptor(descriptor_layout, entry_layout.size, seqlock, timestamp, head);
            if self.corrupt_magic.contains(&kind) {
                put(&mut bytes, descriptor_layout.magic, b"Android0");
            }
            let offset = offset as usize;
            descriptors[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }
        memory.insert(DESCRIPTORS_ADDR, descriptors);
        memory
    }
}

fn map(start: u64, end: u64, executable: bool, pgoff: u64, name: &str) -> MapEntry {
    MapEntry {
        start,
        end,
        readable: true,
        writable: false,
        executable,
        pgoff,
        name: name.to_string(),
    }
}

fn put(bytes: &mut [u8], offset: usize, value: &[u8]) {
    bytes[offset..offset + value.len()].copy_from_slice(value);
}

fn put_addr(bytes: &mut [u8], offset: usize, addr_size: usize, value: u64) {
    if addr_size == 8 {
        put(bytes, offset, &value.to_le_bytes());
    } else {
        put(bytes, offset, &u32::try_from(value).unwrap().to_le_bytes());
    }
}

fn encode_descriptor(
    layout: &DescriptorLayout,
    entry_size: usize,
    seqlock: u32,
    timestamp: u64,
    first_entry: u64,
) -> Vec<u8> {
    let mut bytes = vec![0u8; layout.size];
    put(&mut bytes, layout.version, &JIT_DESCRIPTOR_VERSION.to_le_bytes());
    put(&mut bytes, layout.magic, &JIT_DESCRIPTOR_MAGIC);
    put(&mut bytes, layout.sizeof_descriptor, &u32::try_from(layout.size).unwrap().to_le_bytes());
    put(&mut bytes, layout.sizeof_entry, &u32::try_from(entry_size).unwrap().to_le_bytes());
    put(&mut bytes, layout.action_seqlock, &seqlock.to_le_bytes());
    put(&mut bytes, layout.action_timestamp, &timestamp.to_le_bytes());
    put_addr(&mut bytes, layout.first_entry, layout.addr_size, first_entry);
    bytes
}

fn encode_entry(
    layout: &EntryLayout,
    next: u64,
    prev: u64,
    symfile_addr: u64,
    symfile_size: u64,
    timestamp: u64,
) -> Vec<u8> {
    let mut bytes = vec![0u8; layout.size];
    put_addr(&mut bytes, layout.next, layout.addr_size, next);
    put_addr(&mut bytes, layout.prev, layout.addr_size, prev);
    put_addr(&mut bytes, layout.symfile_addr, layout.addr_size, symfile_addr);
    put(&mut bytes, layout.symfile_size, &symfile_size.to_le_bytes());
    put(&mut bytes, layout.register_timestamp, &timestamp.to_le_bytes());
    bytes
}

/// Payload the fake inspector accepts: magic, then min and max address
pub fn fake_elf(min: u64, max: u64) -> Vec<u8> {
    let mut bytes = FAKE_ELF_MAGIC.to_vec();
    bytes.extend_from_slice(&min.to_le_bytes());
    bytes.extend_from_slice(&max.to_le_bytes());
    bytes
}

/// All fake processes, shared between the test and the reader's backends
#[derive(Clone, Default)]
pub struct World {
    processes: Rc<RefCell<HashMap<Pid, ArtProcess>>>,
    reads: Rc<RefCell<HashMap<Pid, usize>>>,
}

impl World {
    pub fn spawn(&self, pid: Pid, process: ArtProcess) {
        self.processes.borrow_mut().insert(pid, process);
    }

    pub fn kill(&self, pid: Pid) {
        self.processes.borrow_mut().remove(&pid);
    }

    pub fn with<R>(&self, pid: Pid, f: impl FnOnce(&mut ArtProcess) -> R) -> R {
        let mut processes = self.processes.borrow_mut();
        f(processes.get_mut(&pid).expect("no such fake process"))
    }

    /// Remote reads attempted against `pid`
    pub fn reads(&self, pid: Pid) -> usize {
        self.reads.borrow().get(&pid).copied().unwrap_or(0)
    }
}

impl RemoteMemory for World {
    fn read(&self, pid: Pid, addr: u64, buf: &mut [u8]) -> Result<(), RemoteReadError> {
        *self.reads.borrow_mut().entry(pid).or_default() += 1;

        let mut processes = self.processes.borrow_mut();
        let Some(process) = processes.get_mut(&pid) else {
            return Err(RemoteReadError::Failed {
                pid,
                addr,
                len: buf.len(),
                source: io::Error::from_raw_os_error(3), // ESRCH
            });
        };

        if addr == DESCRIPTORS_ADDR {
            process.descriptor_reads += 1;
            if let Some((at, timestamp)) = process.race_at {
                if at == process.descriptor_reads {
                    process.race_at = None;
                    process.add_jit(timestamp, 0xbeef_0000, 0x10);
                }
            }
        }

        let memory = process.render();
        let found = memory.range(..=addr).next_back().and_then(|(start, bytes)| {
            let offset = usize::try_from(addr - start).ok()?;
            bytes.get(offset..offset + buf.len())
        });
        match found {
            Some(bytes) => {
                buf.copy_from_slice(bytes);
                Ok(())
            }
            None => Err(RemoteReadError::ShortRead { pid, addr, got: 0, len: buf.len() }),
        }
    }
}

impl MemoryMapSource for World {
    fn memory_map(&self, pid: Pid) -> io::Result<Vec<MapEntry>> {
        self.processes
            .borrow()
            .get(&pid)
            .map(ArtProcess::maps)
            .ok_or_else(|| io::Error::from_raw_os_error(3))
    }
}

/// Inspector matching the fake runtime library and payloads
#[derive(Default)]
pub struct FakeElf;

impl ObjectInspector for FakeElf {
    fn is_valid_object_magic(&self, data: &[u8]) -> bool {
        data.starts_with(FAKE_ELF_MAGIC)
    }

    fn symbol_address_range(&self, data: &[u8]) -> Option<(u64, u64)> {
        let min = u64::from_le_bytes(data.get(4..12)?.try_into().ok()?);
        let max = u64::from_le_bytes(data.get(12..20)?.try_into().ok()?);
        Some((min, max))
    }

    fn find_descriptor_symbols(&self, path: &Path) -> Option<DescriptorSymbols> {
        path.to_str().filter(|p| *p == LIBART_64 || *p == LIBART_32)?;
        Some(DescriptorSymbols {
            exec_vaddr: 0x10_0000,
            exec_file_offset: RUNTIME_PGOFF,
            jit_descriptor: 0x38_0000,
            dex_descriptor: 0x38_0000 + DEX_DESCRIPTOR_OFFSET,
        })
    }
}

/// Trigger state observable from tests
#[derive(Default)]
pub struct TriggerState {
    pub enabled: Cell<bool>,
    pub registered: Cell<Option<Duration>>,
}

struct SharedTrigger(Rc<TriggerState>);

impl PeriodicTrigger for SharedTrigger {
    fn enable(&mut self) {
        self.0.enabled.set(true);
    }

    fn disable(&mut self) {
        self.0.enabled.set(false);
    }

    fn is_enabled(&self) -> bool {
        self.0.enabled.get()
    }
}

#[derive(Default)]
pub struct TestScheduler {
    pub state: Rc<TriggerState>,
}

impl PeriodicScheduler for TestScheduler {
    fn register_periodic(&mut self, interval: Duration) -> Box<dyn PeriodicTrigger> {
        self.state.registered.set(Some(interval));
        Box::new(SharedTrigger(Rc::clone(&self.state)))
    }
}

/// Everything a callback received
pub type Delivered = Rc<RefCell<Vec<(Vec<DebugInfo>, bool)>>>;
