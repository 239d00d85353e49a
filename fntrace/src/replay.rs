use crate::error::Result;
use crate::field::{meta_fields, parse_fields, Field, DEFAULT_FIELDS};
use crate::filter::{FilterOptions, SubtreeFilter};
use crate::merge::MergedEvents;
use crate::reconstruct::Reconstructor;
use crate::render::{FlatRenderer, GraphRenderer};
use crate::source::EventSource;
use crate::tracker::MetadataTracker;
use std::io::Write;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOptions {
    pub filter: FilterOptions,
    pub fields: Vec<Field>,
    pub header: bool,
    pub task_newline: bool,
    /// Dump merged events instead of the call graph.
    pub flat: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            filter: FilterOptions::default(),
            fields: parse_fields(DEFAULT_FIELDS),
            header: true,
            task_newline: false,
            flat: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub tasks: usize,
    pub events: u64,
    pub first_timestamp: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub tasks: usize,
    pub events: u64,
    pub lines: u64,
    /// Rendered closes of calls that never recorded an exit.
    pub unterminated: u64,
}

/// Decodes every stream once without producing output.
pub fn verify<S: EventSource>(source: &S) -> Result<TraceStats> {
    let mut stats = TraceStats::default();
    for tid in source.task_ids() {
        stats.tasks += 1;
        for event in source.open_stream(tid)? {
            let event = event?;
            stats.events += 1;
            stats.first_timestamp = Some(
                stats
                    .first_timestamp
                    .map_or(event.timestamp, |first| first.min(event.timestamp)),
            );
        }
    }
    Ok(stats)
}

fn merged<S: EventSource>(source: &S) -> Result<MergedEvents<S::Stream>> {
    let streams = source
        .task_ids()
        .into_iter()
        .map(|tid| source.open_stream(tid))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    MergedEvents::new(streams)
}

/// Replays `source` into `out`.
///
/// A malformed stream fails before anything is written. An unbalanced
/// call stack fails at the point it is reached, after the lines before it.
pub fn replay<S, W>(source: &S, options: &ReplayOptions, out: W) -> Result<ReplaySummary>
where
    S: EventSource,
    W: Write,
{
    let stats = verify(source)?;
    debug!(tasks = stats.tasks, events = stats.events, "trace verified");

    let mut summary = ReplaySummary {
        tasks: stats.tasks,
        events: stats.events,
        ..Default::default()
    };

    if options.flat {
        let mut renderer = FlatRenderer::new(out);
        for event in merged(source)? {
            renderer.render(&event?)?;
        }
        renderer.flush()?;
        summary.lines = renderer.events();
        return Ok(summary);
    }

    let requested = meta_fields(&options.fields);
    let reconstructor = Reconstructor::new(merged(source)?, requested.clone(), MetadataTracker::new());
    let mut filter = SubtreeFilter::new(reconstructor, options.filter.clone());
    let mut renderer = GraphRenderer::new(
        out,
        options.fields.clone(),
        stats.first_timestamp.unwrap_or(0),
    )
    .with_header(options.header)
    .with_task_newline(options.task_newline);

    let mut result = Ok(());
    for announcement in filter.by_ref() {
        match announcement {
            Ok(announcement) => {
                if !announcement.is_enter() && announcement.unterminated {
                    summary.unterminated += 1;
                }
                renderer.render(&announcement)?;
            }
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    renderer.flush()?;
    result?;

    let reconstructor = filter.into_inner();
    summary.lines = renderer.lines();
    let tracker = reconstructor.into_tracker();
    for field in requested.iter().filter(|field| !tracker.is_known(field)) {
        debug!(field = %field, "metadata field never set; rendered blank");
    }
    Ok(summary)
}
