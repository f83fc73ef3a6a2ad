//! Output formatting utilities for CLI commands

use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use stockgate_db::{ActionStatus, ConfidenceTier};

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format a timestamp relative to now
///
/// Examples:
/// - "5 seconds ago"
/// - "3 hours ago"
/// - "2026-10-01 14:30" (if older than a week)
pub fn format_time(time: DateTime<Utc>) -> String {
    let secs = (Utc::now() - time).num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if secs < 60 {
        format!("{} second{} ago", secs, plural(secs))
    } else if secs < 3600 {
        format!("{} minute{} ago", secs / 60, plural(secs / 60))
    } else if secs < 86400 {
        format!("{} hour{} ago", secs / 3600, plural(secs / 3600))
    } else if secs < 604800 {
        format!("{} day{} ago", secs / 86400, plural(secs / 86400))
    } else {
        time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Quantities without a trailing `.0` when whole.
pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

pub fn status_color(status: ActionStatus) -> Color {
    match status {
        ActionStatus::Proposed => Color::Yellow,
        ActionStatus::Confirmed => Color::Cyan,
        ActionStatus::Executed => Color::Green,
        ActionStatus::Failed => Color::Red,
        ActionStatus::Cancelled => Color::DarkGrey,
    }
}

pub fn tier_color(tier: ConfidenceTier) -> Color {
    match tier {
        ConfidenceTier::Exact | ConfidenceTier::High => Color::Green,
        ConfidenceTier::Medium => Color::Yellow,
        ConfidenceTier::Low => Color::Magenta,
        ConfidenceTier::Manual => Color::Red,
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);
    table
}

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = new_table(headers);
    for row in rows {
        table.add_row(row);
    }
    println!("{}", table);
}

/// Print a table with custom column colors
pub fn print_table_colored(headers: &[&str], rows: Vec<Vec<(String, Option<Color>)>>) {
    let mut table = new_table(headers);
    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .map(|(text, color)| match color {
                Some(c) => Cell::new(text).fg(c),
                None => Cell::new(text),
            })
            .collect();
        table.add_row(cells);
    }
    println!("{}", table);
}
