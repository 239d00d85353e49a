//! Recording side of fntrace.
//!
//! Install [`FntraceLayer`] (or call [`init`] when running under
//! `fntrace record`) and every entered span becomes a call entry, every
//! exited span a call exit. Metadata such as the task name is recorded with
//! [`set_task_name`] or any event on the [`META_TARGET`] target.
//!
//! ```no_run
//! #[tracing::instrument]
//! fn worker() {
//!     tracing_fntrace::set_task_name("worker");
//! }
//!
//! let _guard = tracing_fntrace::init()?;
//! worker();
//! # Ok::<(), tracing_fntrace::InitError>(())
//! ```

use std::path::PathBuf;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

mod layer;
mod visitor;

#[cfg(test)]
mod tests;

pub use layer::{FlushGuard, FntraceLayer};

/// Events with this target are recorded as metadata updates, one per field.
pub const META_TARGET: &str = "fntrace::meta";

pub const TASK_FIELD: &str = "task";

/// Diagnostics of the recorder itself; never written to the trace.
pub const RECORDER_TARGET: &str = "fntrace::recorder";

#[derive(Error, Debug)]
pub enum InitError {
    #[error("cannot create trace directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot install subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Installs the layer as global subscriber if the process runs under
/// `fntrace record`. Keep the guard alive until the traced work is done.
///
/// Recorder warnings on [`RECORDER_TARGET`] go to stderr.
pub fn init() -> Result<Option<FlushGuard>, InitError> {
    let Some(dir) = std::env::var_os(protocol::TRACE_DIR_ENV) else {
        return Ok(None);
    };
    let (layer, guard) = FntraceLayer::new(PathBuf::from(dir))?;
    let diagnostics = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(Targets::new().with_target(RECORDER_TARGET, Level::WARN));
    tracing_subscriber::registry()
        .with(layer)
        .with(diagnostics)
        .try_init()?;
    Ok(Some(guard))
}

/// Records a change of the current thread's task name.
pub fn set_task_name(name: &str) {
    tracing::info!(target: META_TARGET, task = name);
}
