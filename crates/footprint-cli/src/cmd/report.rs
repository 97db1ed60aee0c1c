//! End-of-run tables on stderr

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use footprint_acquire::AcquireSummary;
use footprint_core::progress::{fmt_bytes, fmt_num};
use footprint_partition::PartitionSummary;

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = table(&[title, "Value"]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

pub fn acquisition(summary: &AcquireSummary) {
    print_summary(
        &format!("Acquire {}", summary.provider),
        &[
            (
                "Shards",
                format!(
                    "{}/{} ({} present, {} failed, {} cancelled)",
                    summary.completed,
                    summary.total,
                    summary.skipped,
                    summary.failures.len(),
                    summary.cancelled
                ),
            ),
            ("Downloaded", fmt_bytes(summary.bytes_downloaded)),
            ("Rows", fmt_num(summary.rows)),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );

    if summary.failures.is_empty() {
        return;
    }
    let mut failures = table(&["Shard", "Stage", "Kind", "Error"]);
    for f in &summary.failures {
        failures.add_row(vec![
            Cell::new(&f.source_url),
            Cell::new(f.stage),
            Cell::new(f.kind).fg(Color::Red),
            Cell::new(&f.message),
        ]);
    }
    eprintln!("{failures}");
}

pub fn partition(summary: &PartitionSummary) {
    print_summary(
        &format!("Partition {}", summary.provider),
        &[
            (
                "Countries",
                format!(
                    "{} delivered ({} empty, {} failed, {} cancelled)",
                    summary.delivered.len(),
                    summary.empty.len(),
                    summary.failures.len(),
                    summary.cancelled
                ),
            ),
            (
                "Artifacts",
                format!(
                    "{} ({})",
                    summary.artifact_count(),
                    fmt_bytes(summary.total_bytes())
                ),
            ),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );

    if summary.failures.is_empty() {
        return;
    }
    let mut failures = table(&["Country", "Kind", "Error"]);
    for f in &summary.failures {
        failures.add_row(vec![
            Cell::new(&f.iso3),
            Cell::new(f.kind).fg(Color::Red),
            Cell::new(&f.message),
        ]);
    }
    eprintln!("{failures}");
}
