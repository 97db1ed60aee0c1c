//! Log output for the footprint commands.
//!
//! Every line names the component that emitted it and, on pool threads,
//! the worker:
//!
//! ```text
//! [WARN ] acquire acquire-3: 0a1_buildings.parquet: attempt 1/4 failed: HTTP 503
//! [INFO ] partition: KEN: 2 artifacts
//! ```
//!
//! On a terminal, lines are printed above the progress bars. `RUST_LOG`
//! replaces the default filter.

use std::fmt::{self, Write as _};

use indicatif::MultiProgress;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Workspace crates; foreign crates (reqwest, hyper, object_store) stay
/// at `warn` whatever the chosen level
const WORKSPACE_CRATES: [&str; 4] = [
    "footprint",
    "footprint_core",
    "footprint_acquire",
    "footprint_partition",
];

fn default_filter(level: LevelFilter) -> String {
    let own: Vec<_> = WORKSPACE_CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect();
    format!("warn,{}", own.join(","))
}

/// `footprint_acquire::worker` -> `acquire`; the binary is `cli`
fn component(target: &str) -> &str {
    let krate = target.split("::").next().unwrap_or(target);
    match krate {
        "footprint" => "cli",
        _ => krate.strip_prefix("footprint_").unwrap_or(krate),
    }
}

/// Pool threads are named `<stage>-<n>`
fn worker_name(thread: Option<&str>) -> Option<&str> {
    let name = thread?;
    let (_, n) = name.rsplit_once('-')?;
    (!n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())).then_some(name)
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31m",
        Level::Warn => "\x1b[33m",
        Level::Info => "\x1b[32m",
        Level::Debug => "\x1b[36m",
        Level::Trace => "\x1b[35m",
    }
}

fn render(
    level: Level,
    target: &str,
    thread: Option<&str>,
    message: impl fmt::Display,
    color: bool,
) -> String {
    let mut line = String::new();
    if color {
        let _ = write!(line, "[{}{level:<5}\x1b[0m]", level_color(level));
    } else {
        let _ = write!(line, "[{level:<5}]");
    }
    let _ = write!(line, " {}", component(target));
    if let Some(worker) = worker_name(thread) {
        let _ = write!(line, " {worker}");
    }
    let _ = write!(line, ": {message}");
    line
}

fn render_record(record: &Record, color: bool) -> String {
    let current = std::thread::current();
    render(
        record.level(),
        record.target(),
        current.name(),
        record.args(),
        color,
    )
}

/// Terminal logger: env_logger decides what passes, lines are printed
/// while the progress bars are suspended
struct ProgressLogger {
    filter: env_logger::Logger,
    multi: MultiProgress,
}

impl Log for ProgressLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.filter.matches(record) {
            let line = render_record(record, true);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {}
}

/// Install the global logger at `level` for the workspace crates.
///
/// With `multi` (stderr is a terminal) lines are colored and drawn above
/// the bars; without it they are plain.
pub fn init_logging(level: LevelFilter, multi: Option<&MultiProgress>) {
    let env = env_logger::Env::default().default_filter_or(default_filter(level));
    let mut builder = env_logger::Builder::from_env(env);

    match multi {
        Some(multi) => {
            let filter = builder.build();
            let max_level = filter.filter();
            let logger = ProgressLogger {
                filter,
                multi: multi.clone(),
            };
            if log::set_boxed_logger(Box::new(logger)).is_ok() {
                log::set_max_level(max_level);
            }
        }
        None => {
            use std::io::Write;
            let _ = builder
                .format(|buf, record| writeln!(buf, "{}", render_record(record, false)))
                .try_init();
        }
    }
}
