use crate::error::Result;
use crate::reconstruct::{Announcement, Boundary};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Only frames inside one of these functions are kept.
    pub anchors: Vec<String>,
    /// These functions and everything they call are hidden.
    pub notrace: Vec<String>,
    /// Frames at or below this rendered depth are hidden.
    pub max_depth: Option<usize>,
    /// Empty keeps every thread.
    pub tids: Vec<i32>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
            && self.notrace.is_empty()
            && self.max_depth.is_none()
            && self.tids.is_empty()
    }
}

#[derive(Debug, Default)]
struct TaskFilter {
    inside: usize,
    base_depth: usize,
    hidden: usize,
}

/// Keeps the announcements selected by [`FilterOptions`], renumbering
/// depths relative to the outermost open anchor.
///
/// Every decision for an exit mirrors the one made for its entry, so
/// kept lines stay paired.
pub struct SubtreeFilter<I> {
    inner: I,
    options: FilterOptions,
    tasks: HashMap<i32, TaskFilter>,
}

impl<I> SubtreeFilter<I> {
    pub fn new(inner: I, options: FilterOptions) -> Self {
        Self {
            inner,
            options,
            tasks: HashMap::new(),
        }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }

    fn admit(&mut self, announcement: &mut Announcement) -> bool {
        let options = &self.options;
        if !options.tids.is_empty() && !options.tids.contains(&announcement.tid) {
            return false;
        }
        let task = self.tasks.entry(announcement.tid).or_default();
        let function = announcement.function.as_str();
        let is_notrace = options.notrace.iter().any(|f| f == function);
        let is_anchor = options.anchors.iter().any(|f| f == function);
        let anchored = !options.anchors.is_empty();

        match announcement.boundary {
            Boundary::Enter => {
                if is_notrace {
                    task.hidden += 1;
                    return false;
                }
                if task.hidden > 0 {
                    return false;
                }
                if is_anchor {
                    if task.inside == 0 {
                        task.base_depth = announcement.depth;
                    }
                    task.inside += 1;
                }
                if anchored && task.inside == 0 {
                    return false;
                }
            }
            Boundary::Exit => {
                if is_notrace {
                    task.hidden = task.hidden.saturating_sub(1);
                    return false;
                }
                if task.hidden > 0 || (anchored && task.inside == 0) {
                    return false;
                }
            }
        }

        let depth = announcement.depth.saturating_sub(task.base_depth);
        if is_anchor && announcement.boundary == Boundary::Exit {
            task.inside -= 1;
        }
        announcement.depth = depth;
        options.max_depth.map_or(true, |max| depth < max)
    }
}

impl<I> Iterator for SubtreeFilter<I>
where
    I: Iterator<Item = Result<Announcement>>,
{
    type Item = Result<Announcement>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(mut announcement) => {
                    if self.admit(&mut announcement) {
                        return Some(Ok(announcement));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::Reconstructor;
    use crate::tracker::MetadataTracker;
    use protocol::Event;
    use rstest::rstest;

    fn calls(tid: i32, start: u64, script: &str) -> Vec<Event> {
        // "a(b()c(d()))" style call outline
        let mut events = Vec::new();
        let mut stack = Vec::new();
        let mut name = String::new();
        let mut ts = start;
        for ch in script.chars() {
            match ch {
                '(' => {
                    ts += 1;
                    events.push(Event::entry(tid, ts, name.clone()));
                    stack.push(std::mem::take(&mut name));
                }
                ')' => {
                    ts += 1;
                    let function = stack.pop().expect("unbalanced script");
                    events.push(Event::exit(tid, ts, function));
                }
                c => name.push(c),
            }
        }
        events
    }

    fn run(events: Vec<Event>, options: FilterOptions) -> Vec<String> {
        let reconstructor =
            Reconstructor::new(events.into_iter().map(Ok), Vec::new(), MetadataTracker::new());
        SubtreeFilter::new(reconstructor, options)
            .map(|a| {
                let a = a.unwrap();
                let side = if a.is_enter() { ">" } else { "<" };
                format!("{}{}{}", " ".repeat(a.depth), side, a.function)
            })
            .collect()
    }

    fn anchors(names: &[&str]) -> FilterOptions {
        FilterOptions {
            anchors: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_filter_passes_everything() {
        let events = calls(1, 0, "a(b()c())");
        assert_eq!(run(events, FilterOptions::default()).len(), 6);
    }

    #[test]
    fn test_anchor_renumbers_depth() {
        let events = calls(1, 0, "start(main(task(leaf()))other())");
        assert_eq!(
            run(events, anchors(&["main"])),
            [">main", " >task", "  >leaf", "  <leaf", " <task", "<main"]
        );
    }

    #[test]
    fn test_recurring_anchor_is_independent() {
        let events = calls(1, 0, "top(work(x())idle()work(y()))");
        assert_eq!(
            run(events, anchors(&["work"])),
            [">work", " >x", " <x", "<work", ">work", " >y", " <y", "<work"]
        );
    }

    #[test]
    fn test_nested_anchor_keeps_outer_base() {
        let events = calls(1, 0, "main(a(main(b())))");
        assert_eq!(
            run(events, anchors(&["main"])),
            [">main", " >a", "  >main", "   >b", "   <b", "  <main", " <a", "<main"]
        );
    }

    #[test]
    fn test_anchor_matching_nothing_is_empty() {
        let events = calls(1, 0, "main(a())");
        assert!(run(events, anchors(&["missing"])).is_empty());
    }

    #[test]
    fn test_notrace_hides_subtree() {
        let events = calls(1, 0, "main(noisy(inner())quiet())");
        let options = FilterOptions {
            notrace: vec!["noisy".to_string()],
            ..Default::default()
        };
        assert_eq!(run(events, options), [">main", " >quiet", " <quiet", "<main"]);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 2)]
    #[case(2, 6)]
    #[case(3, 8)]
    fn test_depth_limit(#[case] max_depth: usize, #[case] expected_lines: usize) {
        let events = calls(1, 0, "main(a(b(c()))d())");
        let options = FilterOptions {
            anchors: vec!["main".to_string()],
            max_depth: Some(max_depth),
            ..Default::default()
        };
        let lines = run(events, options);
        assert_eq!(lines.len(), expected_lines);
        assert!(lines.iter().all(|l| l.len() - l.trim_start().len() < max_depth));
    }

    #[test]
    fn test_tid_filter() {
        let mut events = calls(1, 0, "one()");
        events.extend(calls(2, 10, "two()"));
        let options = FilterOptions {
            tids: vec![2],
            ..Default::default()
        };
        assert_eq!(run(events, options), [">two", "<two"]);
    }

    #[test]
    fn test_kept_lines_are_a_subsequence_of_unfiltered() {
        let mut events = calls(1, 0, "init(main(a(b())c())main(d()))");
        events.extend(calls(2, 100, "main(e(f()))"));
        events.sort_by_key(|e| (e.timestamp, e.tid));

        let unfiltered: Vec<String> = run(events.clone(), FilterOptions::default())
            .into_iter()
            .map(|l| l.trim_start().to_string())
            .collect();
        let filtered: Vec<String> = run(events, anchors(&["main"]))
            .into_iter()
            .map(|l| l.trim_start().to_string())
            .collect();

        let mut rest = unfiltered.iter();
        for line in &filtered {
            assert!(rest.any(|u| u == line), "{line} out of order");
        }
        assert_eq!(
            filtered.iter().filter(|l| l.starts_with('>')).count(),
            filtered.iter().filter(|l| l.starts_with('<')).count()
        );
    }
}
