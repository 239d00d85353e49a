pub mod config;
pub mod error;
pub mod field;
pub mod filter;
pub mod merge;
pub mod reconstruct;
pub mod record;
pub mod render;
pub mod replay;
pub mod source;
pub mod tracker;

pub use error::{ReplayError, Result};
pub use field::{parse_fields, Field};
pub use filter::{FilterOptions, SubtreeFilter};
pub use reconstruct::{Announcement, Boundary, Reconstructor};
pub use replay::{replay, verify, ReplayOptions, ReplaySummary};
pub use source::{EventSource, VecSource};
pub use tracker::MetadataTracker;

/// Trace directory used when `-d` is not given.
pub const DEFAULT_DATA_DIR: &str = "fntrace.data";
