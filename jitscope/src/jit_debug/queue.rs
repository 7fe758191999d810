//! Timestamp-ordered holding area for time-synchronized delivery
//!
//! Records wait here until the profiling record stream has moved past
//! their timestamp, so no sample ever sees debug info from its future.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::debug_info::DebugInfo;

/// Heap slot; `seq` keeps equal timestamps in arrival order
#[derive(Debug)]
struct Queued {
    timestamp: u64,
    seq: u64,
    info: DebugInfo,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.seq).cmp(&(other.timestamp, other.seq))
    }
}

/// Min-heap of debug info keyed by timestamp
#[derive(Debug, Default)]
pub struct DebugInfoQueue {
    // BinaryHeap is a max-heap; Reverse makes the oldest record the top
    heap: BinaryHeap<Reverse<Queued>>,
    next_seq: u64,
}

impl DebugInfoQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, info: DebugInfo) {
        let queued = Queued { timestamp: info.timestamp(), seq: self.next_seq, info };
        self.next_seq += 1;
        self.heap.push(Reverse(queued));
    }

    /// Remove every record with `timestamp < limit`, oldest first
    pub fn pop_before(&mut self, limit: u64) -> Vec<DebugInfo> {
        let mut ready = Vec::new();
        while self.heap.peek().is_some_and(|Reverse(top)| top.timestamp < limit) {
            if let Some(Reverse(queued)) = self.heap.pop() {
                ready.push(queued.info);
            }
        }
        ready
    }

    /// Remove everything, oldest first
    pub fn drain_all(&mut self) -> Vec<DebugInfo> {
        let mut ready = Vec::with_capacity(self.heap.len());
        while let Some(Reverse(queued)) = self.heap.pop() {
            ready.push(queued.info);
        }
        ready
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
