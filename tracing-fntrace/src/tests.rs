use crate::{set_task_name, FntraceLayer, META_TARGET, TASK_FIELD};
use protocol::{data_file_name, Event, EventKind, TaskStream, TraceInfo};
use rstest::{fixture, rstest};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tempfile::TempDir;
use tracing::{info_span, Dispatch};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[fixture]
fn trace_dir() -> TempDir {
    TempDir::new().expect("failed to create temp dir")
}

fn record<F: FnOnce()>(dir: &Path, f: F) {
    let (layer, guard) = FntraceLayer::new(dir).expect("failed to create layer");
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::with_default(subscriber, f);
    guard.flush().expect("failed to flush");
}

fn read_task(dir: &Path, tid: i32) -> Vec<Event> {
    let path = dir.join(data_file_name(tid));
    let file = File::open(&path).expect("missing data file");
    TaskStream::new(BufReader::new(file), path)
        .expect("bad header")
        .map(|event| event.expect("bad record"))
        .collect()
}

fn current_tid() -> i32 {
    nix::unistd::gettid().as_raw()
}

fn describe(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|event| match &event.kind {
            EventKind::Entry { function } => format!("> {}", function),
            EventKind::Exit { function } => format!("< {}", function),
            EventKind::Meta { field, value } => format!("{}={}", field, value),
        })
        .collect()
}

#[rstest]
fn test_nested_spans(trace_dir: TempDir) {
    record(trace_dir.path(), || {
        let outer = info_span!("outer");
        let _outer = outer.enter();
        let inner = info_span!("inner");
        let _inner = inner.enter();
    });

    let events = read_task(trace_dir.path(), current_tid());
    assert_eq!(describe(&events), ["> outer", "> inner", "< inner", "< outer"]);
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[rstest]
fn test_task_name_is_recorded_as_metadata(trace_dir: TempDir) {
    record(trace_dir.path(), || {
        let span = info_span!("prctl");
        let _guard = span.enter();
        set_task_name("foo");
        tracing::info!("ordinary events are not recorded");
        tracing::info!(target: META_TARGET, answer = 42, "with a message");
    });

    let events = read_task(trace_dir.path(), current_tid());
    assert_eq!(
        describe(&events),
        ["> prctl", format!("{}=foo", TASK_FIELD).as_str(), "answer=42", "< prctl"]
    );
}

#[rstest]
fn test_threads_get_their_own_files(trace_dir: TempDir) {
    let (layer, guard) = FntraceLayer::new(trace_dir.path()).expect("failed to create layer");
    let dispatch = Dispatch::new(Registry::default().with(layer));

    let main_tid = current_tid();
    let worker_tid = tracing::dispatcher::with_default(&dispatch, || {
        let span = info_span!("main");
        let _guard = span.enter();
        std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    tracing::dispatcher::with_default(&dispatch, || {
                        let span = info_span!("worker");
                        let _guard = span.enter();
                        current_tid()
                    })
                })
                .join()
                .expect("worker panicked")
        })
    });
    guard.flush().expect("failed to flush");

    let tids: Vec<i32> = TraceInfo::scan_tasks(trace_dir.path())
        .unwrap()
        .iter()
        .map(|task| task.tid)
        .collect();
    let mut expected = vec![main_tid, worker_tid];
    expected.sort_unstable();
    assert_eq!(tids, expected);

    assert_eq!(describe(&read_task(trace_dir.path(), worker_tid)), ["> worker", "< worker"]);
    assert_eq!(describe(&read_task(trace_dir.path(), main_tid)), ["> main", "< main"]);
}

#[rstest]
fn test_records_reach_disk_before_flush(trace_dir: TempDir) {
    let (layer, guard) = FntraceLayer::new(trace_dir.path()).expect("failed to create layer");
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        let span = info_span!("stuck");
        let _guard = span.enter();
        set_task_name("late");
    });

    // no flush: as if the process had exited inside the span
    let events = read_task(trace_dir.path(), current_tid());
    assert_eq!(describe(&events), ["> stuck", "task=late", "< stuck"]);
    drop(guard);
}

#[rstest]
fn test_failed_thread_is_reported(trace_dir: TempDir) {
    let dir = trace_dir.path().join("gone");
    let (layer, guard) = FntraceLayer::new(&dir).expect("failed to create layer");
    std::fs::remove_dir(&dir).expect("failed to remove trace dir");

    let subscriber = Registry::default().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        let span = info_span!("lost");
        let _guard = span.enter();
    });

    assert_eq!(guard.stopped_tasks(), 1);
    assert!(matches!(
        guard.flush(),
        Err(protocol::TraceError::Incomplete { tasks: 1 })
    ));
}
