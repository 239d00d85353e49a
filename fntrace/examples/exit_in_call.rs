//! Exits the process from inside nested calls, so the recorded trace never
//! sees them return. Replay closes them at the end of the trace.

use tracing::instrument;
use tracing_fntrace::set_task_name;

#[instrument]
fn stuck() {
    set_task_name("late");
    std::process::exit(0);
}

#[instrument(name = "main")]
fn run() {
    stuck();
}

fn main() -> eyre::Result<()> {
    let _guard = tracing_fntrace::init()?;
    run();
    Ok(())
}
