//! Renames its task twice from nested calls. Run it under `fntrace record`
//! and replay with `-F main -f task` to see which name every call closed with.

use std::thread::{self, ThreadId};
use tracing::instrument;
use tracing_fntrace::set_task_name;

#[instrument(skip_all)]
fn prctl(name: &str) {
    set_task_name(name);
}

#[instrument]
fn task_name1() {
    prctl("foo");
}

#[instrument]
fn pthread_self() -> ThreadId {
    thread::current().id()
}

#[instrument(skip_all)]
fn pthread_setname_np(_thread: ThreadId, name: &str) {
    set_task_name(name);
}

#[instrument]
fn task_name2() {
    pthread_setname_np(pthread_self(), "bar");
}

#[instrument(name = "main")]
fn run() {
    task_name1();
    task_name2();
}

fn main() -> eyre::Result<()> {
    let _guard = tracing_fntrace::init()?;
    run();
    Ok(())
}
