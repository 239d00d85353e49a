use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FIELDS: &str = "duration,tid";

const TIME_UNITS: [&str; 4] = ["ns", "us", "ms", " s"];

/// A column printed before the call graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Duration,
    Tid,
    Time,
    Delta,
    Elapsed,
    /// Value of a metadata field, e.g. `task`.
    Meta(String),
}

impl Field {
    /// Names that are not builtin columns select a metadata field.
    pub fn from_name(name: &str) -> Self {
        match name {
            "duration" => Field::Duration,
            "tid" => Field::Tid,
            "time" => Field::Time,
            "delta" => Field::Delta,
            "elapsed" => Field::Elapsed,
            other => Field::Meta(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Field::Duration => "duration",
            Field::Tid => "tid",
            Field::Time => "time",
            Field::Delta => "delta",
            Field::Elapsed => "elapsed",
            Field::Meta(name) => name,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Field::Duration | Field::Delta | Field::Elapsed => 10,
            Field::Tid => 8,
            Field::Time => 18,
            Field::Meta(name) => name.len().max(15),
        }
    }

    pub fn header(&self) -> String {
        match self {
            Field::Duration => " DURATION ".to_string(),
            Field::Tid => "   TID  ".to_string(),
            Field::Time => "     TIMESTAMP    ".to_string(),
            Field::Delta => " TIMEDELTA".to_string(),
            Field::Elapsed => "  ELAPSED ".to_string(),
            Field::Meta(name) if name == "task" => "      TASK NAME".to_string(),
            Field::Meta(name) => format!("{:>width$}", name.to_uppercase(), width = self.width()),
        }
    }

    pub fn meta_name(&self) -> Option<&str> {
        match self {
            Field::Meta(name) => Some(name),
            _ => None,
        }
    }
}

impl FromStr for Field {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Field::from_name(s))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses a comma separated field list.
///
/// `none` selects nothing and a leading `+` appends to [`DEFAULT_FIELDS`].
/// Duplicates are dropped.
pub fn parse_fields(list: &str) -> Vec<Field> {
    let list = list.trim();
    let (defaults, extra) = match list.strip_prefix('+') {
        Some(extra) => (DEFAULT_FIELDS, extra),
        None => ("", list),
    };
    let names = defaults
        .split(',')
        .chain(extra.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "none");

    let mut fields: Vec<Field> = Vec::new();
    for name in names {
        let field = Field::from_name(name);
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    fields
}

/// Names of the metadata fields in `fields`, in order.
pub fn meta_fields(fields: &[Field]) -> Vec<String> {
    fields
        .iter()
        .filter_map(Field::meta_name)
        .map(str::to_string)
        .collect()
}

/// Formats a nanosecond span as `%3d.%03d unit`; zero prints blank.
pub fn format_time_unit(nsec: u64) -> String {
    if nsec == 0 {
        return " ".repeat(10);
    }
    let mut value = nsec;
    let mut fraction = 0;
    let mut unit = 0;
    while value >= 1000 && unit < TIME_UNITS.len() - 1 {
        fraction = value % 1000;
        value /= 1000;
        unit += 1;
    }
    format!("{:3}.{:03} {}", value, fraction, TIME_UNITS[unit])
}

/// Formats an absolute timestamp as `sec.nanosec`.
pub fn format_timestamp(nsec: u64) -> String {
    format!("{:8}.{:09}", nsec / 1_000_000_000, nsec % 1_000_000_000)
}
