use crate::error::{ReplayError, Result};
use crate::tracker::MetadataTracker;
use protocol::{Event, EventKind};
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Enter,
    Exit,
}

/// One side of a reconstructed frame, emitted in open/close order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub boundary: Boundary,
    pub tid: i32,
    pub function: String,
    pub depth: usize,
    /// Entry time for `Enter`, exit time for `Exit`.
    pub timestamp: u64,
    pub enter_timestamp: u64,
    /// Closed at end of stream without a recorded exit.
    pub unterminated: bool,
    /// Values of the requested metadata fields, in request order.
    pub annotation: Vec<Option<String>>,
}

impl Announcement {
    pub fn is_enter(&self) -> bool {
        self.boundary == Boundary::Enter
    }

    pub fn duration(&self) -> Option<u64> {
        match self.boundary {
            Boundary::Enter => None,
            Boundary::Exit => Some(self.timestamp.saturating_sub(self.enter_timestamp)),
        }
    }
}

#[derive(Debug)]
struct OpenFrame {
    function: String,
    enter_timestamp: u64,
}

#[derive(Debug, Default)]
struct TaskState {
    stack: Vec<OpenFrame>,
    last_timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Draining,
    Done,
}

/// Turns the merged event sequence into enter/exit announcements using an
/// explicit call stack per thread.
pub struct Reconstructor<I> {
    events: I,
    fields: Vec<String>,
    tracker: MetadataTracker,
    tasks: BTreeMap<i32, TaskState>,
    drained: VecDeque<Announcement>,
    phase: Phase,
}

impl<I> Reconstructor<I>
where
    I: Iterator<Item = Result<Event>>,
{
    pub fn new(events: I, fields: Vec<String>, tracker: MetadataTracker) -> Self {
        Self {
            events,
            fields,
            tracker,
            tasks: BTreeMap::new(),
            drained: VecDeque::new(),
            phase: Phase::Running,
        }
    }

    pub fn into_tracker(self) -> MetadataTracker {
        self.tracker
    }

    fn process(&mut self, event: Event) -> Result<Option<Announcement>> {
        let tid = event.tid;
        let task = self.tasks.entry(tid).or_default();
        task.last_timestamp = event.timestamp;

        match event.kind {
            EventKind::Entry { function } => {
                let depth = task.stack.len();
                task.stack.push(OpenFrame {
                    function: function.clone(),
                    enter_timestamp: event.timestamp,
                });
                Ok(Some(Announcement {
                    boundary: Boundary::Enter,
                    tid,
                    function,
                    depth,
                    timestamp: event.timestamp,
                    enter_timestamp: event.timestamp,
                    unterminated: false,
                    annotation: self.tracker.snapshot(tid, &self.fields),
                }))
            }
            EventKind::Exit { function } => {
                let frame = match task.stack.pop() {
                    Some(open) if open.function == function => open,
                    open => {
                        return Err(ReplayError::UnbalancedCallStack {
                            tid,
                            timestamp: event.timestamp,
                            function,
                            expected: open.map(|open| open.function),
                        });
                    }
                };
                let annotation = self.tracker.snapshot(tid, &self.fields);
                Ok(Some(Announcement {
                    boundary: Boundary::Exit,
                    tid,
                    function,
                    depth: task.stack.len(),
                    timestamp: event.timestamp,
                    enter_timestamp: frame.enter_timestamp,
                    unterminated: false,
                    annotation,
                }))
            }
            EventKind::Meta { field, value } => {
                self.tracker.update(tid, &field, &value);
                Ok(None)
            }
        }
    }

    fn close_open_frames(&mut self) {
        for (&tid, task) in self.tasks.iter_mut() {
            while let Some(frame) = task.stack.pop() {
                warn!(
                    tid,
                    function = %frame.function,
                    timestamp = task.last_timestamp,
                    "closing call without a recorded exit"
                );
                self.drained.push_back(Announcement {
                    boundary: Boundary::Exit,
                    tid,
                    function: frame.function,
                    depth: task.stack.len(),
                    timestamp: task.last_timestamp,
                    enter_timestamp: frame.enter_timestamp,
                    unterminated: true,
                    annotation: self.tracker.snapshot(tid, &self.fields),
                });
            }
        }
    }
}

impl<I> Iterator for Reconstructor<I>
where
    I: Iterator<Item = Result<Event>>,
{
    type Item = Result<Announcement>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Running => match self.events.next() {
                    Some(Ok(event)) => match self.process(event) {
                        Ok(Some(announcement)) => return Some(Ok(announcement)),
                        Ok(None) => continue,
                        Err(e) => {
                            self.phase = Phase::Done;
                            return Some(Err(e));
                        }
                    },
                    Some(Err(e)) => {
                        self.phase = Phase::Done;
                        return Some(Err(e));
                    }
                    None => {
                        self.close_open_frames();
                        self.phase = Phase::Draining;
                    }
                },
                Phase::Draining => match self.drained.pop_front() {
                    Some(announcement) => return Some(Ok(announcement)),
                    None => self.phase = Phase::Done,
                },
                Phase::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(events: Vec<Event>, fields: &[&str]) -> Result<Vec<Announcement>> {
        let fields = fields.iter().map(|f| f.to_string()).collect();
        Reconstructor::new(events.into_iter().map(Ok), fields, MetadataTracker::new()).collect()
    }

    fn outline(announcements: &[Announcement]) -> Vec<String> {
        announcements
            .iter()
            .map(|a| {
                let side = if a.is_enter() { ">" } else { "<" };
                let note = a.annotation.first().cloned().flatten().unwrap_or_default();
                format!("{}{}{} {}", " ".repeat(a.depth), side, a.function, note)
            })
            .collect()
    }

    #[test]
    fn test_nesting_and_durations() {
        let announcements = reconstruct(
            vec![
                Event::entry(1, 10, "main"),
                Event::entry(1, 20, "leaf"),
                Event::exit(1, 25, "leaf"),
                Event::exit(1, 40, "main"),
            ],
            &[],
        )
        .unwrap();

        assert_eq!(outline(&announcements), [">main ", " >leaf ", " <leaf ", "<main "]);
        assert_eq!(announcements[2].duration(), Some(5));
        assert_eq!(announcements[3].duration(), Some(30));
        assert_eq!(announcements[0].duration(), None);
    }

    #[test]
    fn test_exit_annotation_is_frozen_at_exit() {
        let announcements = reconstruct(
            vec![
                Event::entry(1, 1, "main"),
                Event::entry(1, 2, "rename"),
                Event::meta(1, 3, "task", "foo"),
                Event::exit(1, 4, "rename"),
                Event::meta(1, 5, "task", "bar"),
                Event::exit(1, 6, "main"),
            ],
            &["task"],
        )
        .unwrap();

        assert_eq!(
            outline(&announcements),
            [">main ", " >rename ", " <rename foo", "<main bar"]
        );
    }

    #[test]
    fn test_mismatched_exit_is_fatal() {
        let err = reconstruct(
            vec![
                Event::entry(4, 1, "main"),
                Event::entry(4, 2, "a"),
                Event::exit(4, 3, "b"),
            ],
            &[],
        )
        .unwrap_err();

        match err {
            ReplayError::UnbalancedCallStack {
                tid,
                function,
                expected,
                timestamp,
            } => {
                assert_eq!((tid, timestamp), (4, 3));
                assert_eq!(function, "b");
                assert_eq!(expected.as_deref(), Some("a"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exit_on_empty_stack_is_fatal() {
        let err = reconstruct(vec![Event::exit(4, 3, "b")], &[]).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::UnbalancedCallStack { expected: None, .. }
        ));
    }

    #[test]
    fn test_open_frames_are_closed_at_end() {
        let mut reconstructor = Reconstructor::new(
            vec![
                Event::entry(2, 1, "worker"),
                Event::entry(1, 2, "main"),
                Event::entry(1, 3, "child"),
                Event::meta(1, 4, "task", "late"),
            ]
            .into_iter()
            .map(Ok),
            vec!["task".to_string()],
            MetadataTracker::new(),
        );
        let announcements: Vec<Announcement> =
            reconstructor.by_ref().collect::<Result<_>>().unwrap();

        let closes: Vec<_> = announcements
            .iter()
            .filter(|a| !a.is_enter())
            .map(|a| (a.tid, a.function.as_str(), a.depth, a.timestamp))
            .collect();
        assert_eq!(closes, [(1, "child", 1, 4), (1, "main", 0, 4), (2, "worker", 0, 1)]);
        assert!(announcements.iter().filter(|a| !a.is_enter()).all(|a| a.unterminated));
        assert_eq!(announcements[3].annotation, vec![Some("late".to_string())]);
    }
}
