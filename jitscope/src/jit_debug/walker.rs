//! Walking the remote code entry list
//!
//! The runtime prepends new entries, so the list runs newest to oldest. The
//! walk stops at the first entry not newer than the caller's watermark, at
//! the end of the list, or after `max_entries` nodes. Any structural damage
//! fails the whole walk.

use std::collections::HashSet;

use super::descriptor::{decode_entry, CodeEntry, Descriptor};
use crate::domain::{Pid, WalkError};
use crate::remote_memory::RemoteMemory;

/// Upper bound on entries added between two descriptor snapshots
///
/// Every add or remove bumps the sequence lock twice.
#[must_use]
pub fn entry_budget(old_seqlock: u32, new_seqlock: u32) -> usize {
    (new_seqlock.wrapping_sub(old_seqlock) / 2) as usize
}

/// Collect entries registered after `since_timestamp`, head first
///
/// # Errors
/// - [`WalkError::Cycle`] if an entry is reached twice
/// - [`WalkError::BrokenLink`] if an entry's `prev` isn't the node before it
/// - [`WalkError::InvalidEntry`] if an entry has no symfile
/// - [`WalkError::Remote`] if the process memory can't be read
pub fn walk_code_entries(
    memory: &dyn RemoteMemory,
    pid: Pid,
    descriptor: &Descriptor,
    since_timestamp: u64,
    max_entries: usize,
) -> Result<Vec<CodeEntry>, WalkError> {
    let layout = descriptor.entry_layout;
    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut buf = vec![0u8; layout.size()];
    let mut prev_addr = 0u64;
    let mut current = descriptor.first_entry;

    for _ in 0..max_entries {
        if current == 0 {
            break;
        }
        if !visited.insert(current) {
            return Err(WalkError::Cycle(current));
        }

        memory.read(pid, current, &mut buf)?;
        let entry = decode_entry(layout, current, &buf)
            .map_err(|source| WalkError::Decode { addr: current, source })?;

        if entry.prev != prev_addr {
            return Err(WalkError::BrokenLink {
                addr: current,
                found: entry.prev,
                expected: prev_addr,
            });
        }
        if !entry.is_valid() {
            return Err(WalkError::InvalidEntry(current));
        }
        if entry.register_timestamp <= since_timestamp {
            break;
        }

        entries.push(entry);
        prev_addr = current;
        current = entry.next;
    }

    Ok(entries)
}
