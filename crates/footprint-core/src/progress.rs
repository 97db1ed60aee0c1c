//! Terminal progress for acquisition and partitioning.
//!
//! On a TTY each provider gets a shard counter, each in-flight shard a
//! byte bar that turns into a stage line after download, and the country
//! being partitioned a spinner. Off a TTY every bar is hidden and the
//! runners log instead.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::config::Provider;

/// Width of the shard-name column; keys are cut from the left
const KEY_WIDTH: usize = 28;

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).expect("invalid template")
}

fn download_style() -> ProgressStyle {
    style("  {prefix:<28.dim} {bar:30.green/dim} {binary_bytes:>9}/{binary_total_bytes:9} {eta:>4}")
        .progress_chars("━━")
}

fn stage_style() -> ProgressStyle {
    style("  {prefix:<28.dim} {wide_msg:.dim}")
}

/// Switch a shard line to a byte bar once the body length is known
pub fn upgrade_to_bar(pb: &ProgressBar, total: u64) {
    pb.set_length(total);
    pb.set_style(download_style());
}

/// Back to a message-only line for the stages after download
pub fn downgrade_to_pending(pb: &ProgressBar) {
    pb.set_style(stage_style());
}

pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Draw bars only when stderr is a terminal
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    fn add(&self, pb: ProgressBar) -> ProgressBar {
        if self.is_tty {
            self.multi.add(pb)
        } else {
            ProgressBar::hidden()
        }
    }

    /// Shards finished out of `total` for one provider
    pub fn provider_bar(&self, provider: Provider, total: u64) -> ProgressBar {
        let pb = self.add(ProgressBar::new(total));
        pb.set_style(style(
            "{spinner:.green} {prefix:<10.cyan.bold} {pos:>6}/{len:6} shards {elapsed_precise} {wide_msg:.red}",
        ));
        pb.set_prefix(provider.name());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// One in-flight shard, labelled by its target key
    pub fn shard_bar(&self, target_key: &str) -> ProgressBar {
        let pb = self.add(ProgressBar::new(0));
        pb.set_style(stage_style());
        pb.set_prefix(key_tail(target_key).to_string());
        pb
    }

    /// Spinner for the country being partitioned
    pub fn country_line(&self, provider: Provider, iso3: &str) -> ProgressBar {
        let pb = self.add(ProgressBar::new_spinner());
        pb.set_style(style("{spinner:.green} {prefix:.cyan.bold} {wide_msg}"));
        pb.set_prefix(format!("{provider} {iso3}"));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// For the log bridge, so log lines print above the bars
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedProgress = Arc<ProgressContext>;

/// Target keys differ at the end (`.../tile=123/part-4.parquet`)
fn key_tail(key: &str) -> &str {
    let count = key.chars().count();
    if count <= KEY_WIDTH {
        return key;
    }
    let start = key
        .char_indices()
        .nth(count - KEY_WIDTH)
        .map_or(0, |(i, _)| i);
    &key[start..]
}

/// Thousands separated with commas
pub fn fmt_num(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Binary units with one decimal, e.g. `1.5 GiB`
pub fn fmt_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if n < 1024 {
        return format!("{n} B");
    }
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
