use protocol::TraceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("malformed trace: {0}")]
    MalformedTrace(#[from] TraceError),

    #[error(
        "unbalanced call stack on task {tid} at {timestamp}: exit of {function} {}",
        describe_open(.expected)
    )]
    UnbalancedCallStack {
        tid: i32,
        timestamp: u64,
        function: String,
        expected: Option<String>,
    },

    #[error("cannot write output: {0}")]
    Output(#[from] std::io::Error),
}

fn describe_open(expected: &Option<String>) -> String {
    match expected {
        Some(open) => format!("while {} is the innermost open call", open),
        None => "while no call is open".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ReplayError>;
