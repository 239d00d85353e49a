use crate::visitor::MetaVisitor;
use crate::{META_TARGET, RECORDER_TARGET};
use protocol::{TaskWriter, TraceError};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thread_local::ThreadLocal;
use tracing::{Id, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

type Writer = TaskWriter<BufWriter<File>>;

fn get_timestamp() -> u64 {
    nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC)
        .map(|ts| (ts.tv_sec() as u64) * 1_000_000_000 + (ts.tv_nsec() as u64))
        .unwrap_or(0)
}

fn get_thread_id() -> i32 {
    nix::unistd::gettid().as_raw()
}

/// Writer of one thread. `writer` is `None` once opening or writing failed,
/// which stops recording for that thread only.
struct TaskSlot {
    tid: i32,
    writer: Option<Writer>,
}

impl TaskSlot {
    fn open(shared: &Shared, tid: i32) -> Self {
        let writer = match TaskWriter::create(&shared.dir, shared.pid, tid) {
            Ok(writer) => Some(writer),
            Err(e) => {
                shared.stop_recording(tid, &e);
                None
            }
        };
        Self { tid, writer }
    }
}

struct Shared {
    dir: PathBuf,
    pid: i32,
    slots: ThreadLocal<Mutex<TaskSlot>>,
    stopped: AtomicUsize,
}

impl Shared {
    fn stop_recording(&self, tid: i32, error: &TraceError) {
        self.stopped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(target: RECORDER_TARGET, tid, %error, "recording stopped for thread");
    }
}

/// Records entered spans as call entries, exited spans as call exits and
/// events on [`META_TARGET`] as metadata updates of the current thread.
pub struct FntraceLayer {
    shared: Arc<Shared>,
}

/// Flushes every thread's buffered records when dropped.
pub struct FlushGuard {
    shared: Arc<Shared>,
}

impl FntraceLayer {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<(Self, FlushGuard)> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let shared = Arc::new(Shared {
            dir,
            pid: nix::unistd::getpid().as_raw(),
            slots: ThreadLocal::new(),
            stopped: AtomicUsize::new(0),
        });
        let guard = FlushGuard {
            shared: shared.clone(),
        };
        Ok((Self { shared }, guard))
    }

    fn with_writer<F>(&self, f: F)
    where
        F: FnOnce(&mut Writer, u64) -> Result<(), TraceError>,
    {
        let tid = get_thread_id();
        let slot = self
            .shared
            .slots
            .get_or(|| Mutex::new(TaskSlot::open(&self.shared, tid)));
        let Ok(mut slot) = slot.lock() else {
            return;
        };

        // thread_local hands the slot of an exited thread to the next new one
        if slot.tid != tid {
            *slot = TaskSlot::open(&self.shared, tid);
        }

        // flushed per record so a process that dies mid-call leaves whole frames
        let result = match slot.writer.as_mut() {
            Some(writer) => f(writer, get_timestamp()).and_then(|()| writer.flush()),
            None => return,
        };
        if let Err(e) = result {
            self.shared.stop_recording(tid, &e);
            slot.writer = None;
        }
    }
}

impl<S> Layer<S> for FntraceLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let name = span.metadata().name();
            self.with_writer(|writer, timestamp| writer.write_entry(timestamp, name));
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let name = span.metadata().name();
            self.with_writer(|writer, timestamp| writer.write_exit(timestamp, name));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != META_TARGET {
            return;
        }

        let mut visitor = MetaVisitor::default();
        event.record(&mut visitor);
        if visitor.fields.is_empty() {
            return;
        }
        self.with_writer(|writer, timestamp| {
            for (field, value) in &visitor.fields {
                writer.write_meta(timestamp, field, value)?;
            }
            Ok(())
        });
    }
}

impl FlushGuard {
    /// Flushes every thread's writer. Fails if any thread stopped recording
    /// early, since its data file is then incomplete.
    pub fn flush(&self) -> Result<(), TraceError> {
        for slot in self.shared.slots.iter() {
            if let Ok(mut slot) = slot.lock() {
                if let Some(writer) = slot.writer.as_mut() {
                    writer.flush()?;
                }
            }
        }
        match self.stopped_tasks() {
            0 => Ok(()),
            tasks => Err(TraceError::Incomplete { tasks }),
        }
    }

    /// Threads whose recording stopped because their data file failed.
    pub fn stopped_tasks(&self) -> usize {
        self.shared.stopped.load(Ordering::Relaxed)
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
