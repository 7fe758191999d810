//! # Reader Orchestration
//!
//! [`JitDebugReader`] decides which processes to poll, runs read passes, and
//! hands the resulting [`DebugInfo`] to a registered callback.
//!
//! ## Entry Points
//!
//! - `read_all_processes` → periodic sweep over every monitored process
//! - `read_one_process` → on-demand read of a single process
//! - `observe_record` → infers processes from the profiling record stream
//! - `flush_up_to` / `flush_all` → release queued info in sync mode
//!
//! ## Read Pass
//!
//! For each descriptor kind: skip if the sequence lock is unchanged or odd,
//! walk entries newer than the last-known timestamp, re-read the descriptor
//! and drop the walk if the lock moved, then extract. The last-known
//! snapshot only advances when the walk was consistent.

use log::debug;
use std::collections::HashMap;

use super::config::ReaderConfig;
use super::debug_info::DebugInfo;
use super::extractor::{extract_dex_files, extract_jit_code, SymfileStore};
use super::process::{DescriptorKind, DescriptorLocationCache, ProcessTracker};
use super::queue::DebugInfoQueue;
use super::walker::{entry_budget, walk_code_entries};
use crate::domain::{Pid, ReaderError, WalkError};
use crate::profiling::{PeriodicScheduler, PeriodicTrigger, Record};
use crate::remote_memory::{ProcessVmReader, RemoteMemory};
use crate::symbolization::{ElfInspector, MemoryMapSource, ObjectInspector, ProcMaps};

/// Consumer of debug info batches; the flag is set for periodic sweeps
pub type DebugInfoCallback = Box<dyn FnMut(Vec<DebugInfo>, bool) -> anyhow::Result<()>>;

/// Discovers JIT code and dex files in live processes
pub struct JitDebugReader {
    config: ReaderConfig,

    // Backends
    memory: Box<dyn RemoteMemory>,
    maps: Box<dyn MemoryMapSource>,
    inspector: Box<dyn ObjectInspector>,

    // State
    processes: ProcessTracker,
    locations: DescriptorLocationCache,
    symfiles: SymfileStore,
    queue: DebugInfoQueue,
    /// Processes seen mapping the runtime; `true` once monitored
    pids_with_runtime: HashMap<Pid, bool>,

    // Outputs
    callback: Option<DebugInfoCallback>,
    trigger: Option<Box<dyn PeriodicTrigger>>,
}

impl JitDebugReader {
    /// Reader over live processes (`process_vm_readv`, `/proc`, ELF files)
    #[must_use]
    pub fn new(config: ReaderConfig) -> Self {
        Self::with_backends(
            config,
            Box::new(ProcessVmReader),
            Box::new(ProcMaps),
            Box::new(ElfInspector),
        )
    }

    #[must_use]
    pub fn with_backends(
        config: ReaderConfig,
        memory: Box<dyn RemoteMemory>,
        maps: Box<dyn MemoryMapSource>,
        inspector: Box<dyn ObjectInspector>,
    ) -> Self {
        let symfiles = SymfileStore::new(config.symfile_dir.clone(), config.keep_symfiles);
        Self {
            config,
            memory,
            maps,
            inspector,
            processes: ProcessTracker::new(),
            locations: DescriptorLocationCache::new(),
            symfiles,
            queue: DebugInfoQueue::new(),
            pids_with_runtime: HashMap::new(),
            callback: None,
            trigger: None,
        }
    }

    /// Register the consumer and the periodic read event
    ///
    /// The event starts disabled and is enabled while any process is
    /// monitored. Whoever runs `scheduler` calls
    /// [`read_all_processes`](Self::read_all_processes) when it fires.
    pub fn register_debug_info_callback<F>(
        &mut self,
        scheduler: &mut dyn PeriodicScheduler,
        callback: F,
    ) where
        F: FnMut(Vec<DebugInfo>, bool) -> anyhow::Result<()> + 'static,
    {
        let mut trigger = scheduler.register_periodic(self.config.read_interval);
        trigger.disable();
        self.trigger = Some(trigger);
        self.callback = Some(Box::new(callback));
        if !self.processes.is_empty() {
            self.set_trigger(true);
        }
    }

    /// Start monitoring `pid`; repeated calls are no-ops
    pub fn monitor_process(&mut self, pid: Pid) {
        if self.processes.contains(pid) {
            return;
        }
        let was_empty = self.processes.is_empty();
        self.processes.add_or_get(pid);
        debug!("Start monitoring {pid}");
        if was_empty {
            self.set_trigger(true);
        }
    }

    #[must_use]
    pub fn is_monitoring(&self, pid: Pid) -> bool {
        self.processes.contains(pid)
    }

    /// Monitored pids in ascending order
    #[must_use]
    pub fn monitored_pids(&self) -> Vec<Pid> {
        self.processes.pids()
    }

    /// Is the periodic read event currently enabled?
    #[must_use]
    pub fn is_periodic_read_enabled(&self) -> bool {
        self.trigger.as_ref().is_some_and(|trigger| trigger.is_enabled())
    }

    /// Records waiting for the record stream to catch up
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Learn about runtime processes from one profiling record
    ///
    /// # Errors
    /// Returns [`ReaderError::Delivery`] if the consumer rejects a batch.
    pub fn observe_record(&mut self, record: &Record) -> Result<(), ReaderError> {
        match record {
            Record::Mmap { .. } | Record::Mmap2 { .. } => {
                let filename = record.mapped_filename().unwrap_or_default();
                if self.config.is_runtime_library(filename) {
                    self.pids_with_runtime.entry(record.pid()).or_insert(false);
                }
            }
            Record::Fork { pid, ppid, .. } => {
                if pid != ppid && self.pids_with_runtime.contains_key(ppid) {
                    self.pids_with_runtime.entry(*pid).or_insert(false);
                }
            }
            Record::Sample { pid, .. } => {
                if self.pids_with_runtime.get(pid) == Some(&false) {
                    self.pids_with_runtime.insert(*pid, true);
                    self.monitor_process(*pid);
                    self.read_one_process(*pid)?;
                }
            }
        }

        if self.config.sync_with_records {
            self.flush_up_to(record.timestamp())?;
        }
        Ok(())
    }

    /// Periodic sweep over every monitored process
    ///
    /// Dead processes are dropped afterwards. The periodic event is
    /// re-enabled only while something is left to monitor.
    ///
    /// # Errors
    /// Returns [`ReaderError::Delivery`] if the consumer rejects the batch.
    pub fn read_all_processes(&mut self) -> Result<(), ReaderError> {
        self.set_trigger(false);

        let mut infos = Vec::new();
        for pid in self.processes.pids() {
            infos.extend(self.read_process(pid));
        }
        for pid in self.processes.remove_dead() {
            debug!("Stop monitoring {pid}: process is gone");
        }

        self.add_debug_info(infos, true)?;
        if !self.processes.is_empty() {
            self.set_trigger(true);
        }
        Ok(())
    }

    /// Read a single monitored process right now
    ///
    /// Unknown pids are ignored.
    ///
    /// # Errors
    /// Returns [`ReaderError::Delivery`] if the consumer rejects the batch.
    pub fn read_one_process(&mut self, pid: Pid) -> Result<(), ReaderError> {
        if !self.processes.contains(pid) {
            return Ok(());
        }
        let infos = self.read_process(pid);
        self.add_debug_info(infos, false)
    }

    /// Release queued info with `timestamp < limit`, oldest first
    ///
    /// # Errors
    /// Returns [`ReaderError::Delivery`] if the consumer rejects the batch.
    pub fn flush_up_to(&mut self, limit: u64) -> Result<(), ReaderError> {
        let ready = self.queue.pop_before(limit);
        self.deliver(ready, false)
    }

    /// Release everything still queued
    ///
    /// # Errors
    /// Returns [`ReaderError::Delivery`] if the consumer rejects the batch.
    pub fn flush_all(&mut self) -> Result<(), ReaderError> {
        let ready = self.queue.drain_all();
        self.deliver(ready, false)
    }

    fn set_trigger(&mut self, enabled: bool) {
        if let Some(trigger) = self.trigger.as_mut() {
            if enabled {
                trigger.enable();
            } else {
                trigger.disable();
            }
        }
    }

    fn add_debug_info(&mut self, infos: Vec<DebugInfo>, periodic: bool) -> Result<(), ReaderError> {
        if self.config.sync_with_records {
            for info in infos {
                self.queue.push(info);
            }
            return Ok(());
        }
        self.deliver(infos, periodic)
    }

    fn deliver(&mut self, infos: Vec<DebugInfo>, periodic: bool) -> Result<(), ReaderError> {
        if infos.is_empty() {
            return Ok(());
        }
        match self.callback.as_mut() {
            Some(callback) => callback(infos, periodic).map_err(ReaderError::Delivery),
            None => {
                debug!("No debug info consumer, dropping {} records", infos.len());
                Ok(())
            }
        }
    }

    /// One read pass over both descriptors of `pid`
    fn read_process(&mut self, pid: Pid) -> Vec<DebugInfo> {
        let Self { config, memory, maps, inspector, processes, locations, symfiles, .. } = self;
        let Some(process) = processes.get_mut(pid) else {
            return Vec::new();
        };
        if process.is_dead() {
            return Vec::new();
        }
        if !process.is_initialized()
            && !process.initialize(maps.as_ref(), inspector.as_ref(), locations, config)
        {
            return Vec::new();
        }

        let Ok(current) = process.read_descriptors(memory.as_ref()) else {
            return Vec::new();
        };

        let mut infos = Vec::new();
        for kind in DescriptorKind::ALL {
            let descriptor = match current.get(kind) {
                Ok(descriptor) => *descriptor,
                Err(e) => {
                    debug!("Bad {kind:?} descriptor in {pid}: {e}");
                    continue;
                }
            };
            let last = *process.last_known(kind);
            if descriptor.action_seqlock == last.action_seqlock || descriptor.is_being_modified() {
                continue;
            }

            let budget = entry_budget(last.action_seqlock, descriptor.action_seqlock);
            let walked = walk_code_entries(
                memory.as_ref(),
                pid,
                &descriptor,
                last.action_timestamp,
                budget,
            );
            let mut entries = match walked {
                Ok(entries) => entries,
                Err(WalkError::Remote(e)) => {
                    debug!("{e}");
                    process.mark_dead();
                    break;
                }
                Err(e) => {
                    debug!("Corrupt {kind:?} entry list in {pid}: {e}");
                    continue;
                }
            };

            let Ok(after) = process.read_descriptors(memory.as_ref()) else {
                break;
            };
            if !matches!(after.get(kind), Ok(d) if d.action_seqlock == descriptor.action_seqlock) {
                debug!("{kind:?} entry list of {pid} changed while reading, retrying later");
                continue;
            }

            // Walked newest first; consumers want registration order
            entries.reverse();
            let found = match kind {
                DescriptorKind::Jit => extract_jit_code(
                    process,
                    &entries,
                    memory.as_ref(),
                    inspector.as_ref(),
                    symfiles,
                    config.max_symfile_size,
                ),
                DescriptorKind::Dex => extract_dex_files(process, &entries, maps.as_ref()),
            };
            infos.extend(found);
            process.set_last_known(kind, descriptor);

            if process.is_dead() {
                break;
            }
        }
        infos
    }
}
