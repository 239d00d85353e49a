use protocol::{Event, TaskStream, TraceError, TraceReader};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

/// Ordered per-thread event streams a replay is built from.
///
/// `open_stream` must start from the first event every time it is called,
/// and each stream must be ordered by timestamp.
pub trait EventSource {
    type Stream: Iterator<Item = Result<Event, TraceError>>;

    fn task_ids(&self) -> Vec<i32>;

    fn open_stream(&self, tid: i32) -> Result<Self::Stream, TraceError>;
}

impl EventSource for TraceReader {
    type Stream = TaskStream<BufReader<File>>;

    fn task_ids(&self) -> Vec<i32> {
        TraceReader::task_ids(self)
    }

    fn open_stream(&self, tid: i32) -> Result<Self::Stream, TraceError> {
        self.stream(tid)
    }
}

/// In-memory source, mostly for tests and benchmarks.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    tasks: BTreeMap<i32, Vec<Event>>,
}

impl VecSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the stream of `event.tid`; push in timestamp order.
    pub fn push(&mut self, event: Event) -> &mut Self {
        self.tasks.entry(event.tid).or_default().push(event);
        self
    }
}

impl FromIterator<Event> for VecSource {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let mut source = VecSource::new();
        for event in iter {
            source.push(event);
        }
        source
    }
}

impl EventSource for VecSource {
    type Stream = std::iter::Map<std::vec::IntoIter<Event>, fn(Event) -> Result<Event, TraceError>>;

    fn task_ids(&self) -> Vec<i32> {
        self.tasks.keys().copied().collect()
    }

    fn open_stream(&self, tid: i32) -> Result<Self::Stream, TraceError> {
        let events = self.tasks.get(&tid).cloned().unwrap_or_default();
        Ok(events.into_iter().map(Ok as fn(Event) -> Result<Event, TraceError>))
    }
}
