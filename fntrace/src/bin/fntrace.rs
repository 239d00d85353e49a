use clap::{Parser, Subcommand};
use eyre::{bail, Context, Result};
use fntrace::config::{Config, ReplayConfig};
use fntrace::{parse_fields, FilterOptions, ReplayOptions, DEFAULT_DATA_DIR};
use protocol::TraceReader;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static LONG_VERSION: OnceLock<String> = OnceLock::new();

fn get_long_version() -> &'static str {
    LONG_VERSION.get_or_init(|| {
        format!(
            "{} (commit: {}, protocol: {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_REVISION", "unknown"),
            protocol::VERSION
        )
    })
}

#[derive(Parser)]
#[command(name = "fntrace")]
#[command(about = "record function calls and replay them as call graphs")]
#[command(version = None, long_version = get_long_version())]
struct Args {
    #[arg(long, global = true, help = "configuration file path (toml format)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program and record its function calls
    Record {
        #[arg(short, long, default_value = DEFAULT_DATA_DIR, help = "trace directory")]
        data: PathBuf,

        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            help = "program to run, with its arguments"
        )]
        command: Vec<String>,
    },
    /// Print recorded function calls
    Replay(ReplayArgs),
}

#[derive(clap::Args)]
struct ReplayArgs {
    #[arg(short, long, default_value = DEFAULT_DATA_DIR, help = "trace directory")]
    data: PathBuf,

    #[arg(short = 'F', long = "filter", value_name = "FUNC", help = "only show calls inside FUNC")]
    filter: Vec<String>,

    #[arg(short = 'N', long, value_name = "FUNC", help = "hide FUNC and its callees")]
    notrace: Vec<String>,

    #[arg(
        short = 'f',
        long = "output-fields",
        value_name = "FIELDS",
        help = "fields to show: duration,tid,time,delta,elapsed or a metadata name; none or +FIELD"
    )]
    fields: Option<String>,

    #[arg(short = 'D', long, help = "hide calls nested DEPTH or more levels deep")]
    depth: Option<usize>,

    #[arg(long, value_delimiter = ',', help = "only show these threads")]
    tid: Vec<i32>,

    #[arg(long, help = "print raw events instead of the call graph")]
    flat: bool,

    #[arg(long, help = "print a blank line when the thread changes")]
    task_newline: bool,

    #[arg(long, help = "do not print the header line")]
    no_header: bool,
}

impl ReplayArgs {
    fn options(&self, defaults: &ReplayConfig) -> ReplayOptions {
        let fields = self.fields.as_deref().unwrap_or(&defaults.fields);
        let mut notrace = defaults.notrace.clone();
        notrace.extend(self.notrace.iter().cloned());
        ReplayOptions {
            filter: FilterOptions {
                anchors: self.filter.clone(),
                notrace,
                max_depth: self.depth.or(defaults.depth),
                tids: self.tid.clone(),
            },
            fields: parse_fields(fields),
            header: defaults.header && !self.no_header,
            task_newline: defaults.task_newline || self.task_newline,
            flat: self.flat,
        }
    }
}

fn run_record(data: &Path, command: &[String]) -> Result<()> {
    let outcome = fntrace::record::record(data, command)?;
    tracing::info!(
        dir = %data.display(),
        tasks = outcome.info.tasks.len(),
        "recording complete"
    );
    if !outcome.status.success() {
        bail!("`{}` exited with {}", command.join(" "), outcome.status);
    }
    Ok(())
}

fn run_replay(config: &Config, args: &ReplayArgs) -> Result<()> {
    let options = args.options(&config.replay);
    let reader = TraceReader::open(&args.data)
        .with_context(|| format!("failed to open trace dir={}", args.data.display()))?;

    let stdout = std::io::stdout().lock();
    let summary = fntrace::replay(&reader, &options, BufWriter::new(stdout))
        .with_context(|| format!("failed to replay {}", args.data.display()))?;

    tracing::debug!(
        tasks = summary.tasks,
        events = summary.events,
        lines = summary.lines,
        unterminated = summary.unterminated,
        "replay complete"
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config path={}", path.display()))?,
        None => Config::default(),
    };

    match &args.command {
        Command::Record { data, command } => run_record(data, command),
        Command::Replay(replay) => run_replay(&config, replay),
    }
}
