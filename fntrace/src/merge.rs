use crate::error::Result;
use protocol::{Event, TraceError};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Pending {
    key: (u64, i32, u64),
    stream: usize,
    event: Event,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Merges per-thread streams into one sequence ordered by timestamp, then
/// thread id, then position within the thread's stream.
///
/// Holds at most one pending event per stream.
pub struct MergedEvents<I> {
    streams: Vec<I>,
    positions: Vec<u64>,
    heap: BinaryHeap<Reverse<Pending>>,
    failed: bool,
}

impl<I> MergedEvents<I>
where
    I: Iterator<Item = std::result::Result<Event, TraceError>>,
{
    pub fn new(streams: Vec<I>) -> Result<Self> {
        let positions = vec![0; streams.len()];
        let mut merged = Self {
            streams,
            positions,
            heap: BinaryHeap::new(),
            failed: false,
        };
        for index in 0..merged.streams.len() {
            merged.refill(index)?;
        }
        Ok(merged)
    }

    fn refill(&mut self, index: usize) -> Result<()> {
        if let Some(event) = self.streams[index].next().transpose()? {
            let position = self.positions[index];
            self.positions[index] += 1;
            self.heap.push(Reverse(Pending {
                key: (event.timestamp, event.tid, position),
                stream: index,
                event,
            }));
        }
        Ok(())
    }
}

impl<I> Iterator for MergedEvents<I>
where
    I: Iterator<Item = std::result::Result<Event, TraceError>>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let Reverse(pending) = self.heap.pop()?;
        if let Err(e) = self.refill(pending.stream) {
            self.failed = true;
            return Some(Err(e));
        }
        Some(Ok(pending.event))
    }
}
