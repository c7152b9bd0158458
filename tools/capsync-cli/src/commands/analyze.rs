//! Summarize a cursor log.

use std::collections::BTreeMap;
use std::path::PathBuf;

use capsync_project_model::event::{parse_cursor_log, CursorLog};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogSummary {
    format: String,
    session_timestamp: Option<u64>,
    events: usize,
    clicks: usize,
    coordinate_systems: BTreeMap<String, usize>,
    outside_ratio: f64,
    duration_ms: u64,
    clean_shutdown: bool,
}

fn summarize(log: &CursorLog) -> LogSummary {
    let mut coordinate_systems = BTreeMap::new();
    for event in &log.events {
        *coordinate_systems
            .entry(event.coordinate_system.to_string())
            .or_insert(0) += 1;
    }

    let outside = log
        .events
        .iter()
        .filter(|e| e.coordinate_system.is_outside())
        .count();
    let outside_ratio = if log.events.is_empty() {
        0.0
    } else {
        outside as f64 / log.events.len() as f64
    };

    let duration_ms = match (log.events.first(), log.events.last()) {
        (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
        _ => 0,
    };

    LogSummary {
        format: format!("{:?}", log.format),
        session_timestamp: log.header.as_ref().map(|h| h.session_timestamp),
        events: log.events.len(),
        clicks: log.events.iter().filter(|e| e.event_type.is_click()).count(),
        coordinate_systems,
        outside_ratio,
        duration_ms,
        clean_shutdown: log.clean_shutdown,
    }
}

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read cursor log {}: {e}", path.display()))?;
    let log = parse_cursor_log(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse cursor log: {e}"))?;
    let summary = summarize(&log);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Cursor log: {}", path.display());
    println!("  Format: {}", summary.format);
    if let Some(ts) = summary.session_timestamp {
        println!("  Session timestamp: {ts}");
    }
    println!("  Events: {} ({} clicks)", summary.events, summary.clicks);
    println!("  Duration: {:.2}s", summary.duration_ms as f64 / 1000.0);
    println!("  Outside frame: {:.1}%", summary.outside_ratio * 100.0);
    for (system, count) in &summary.coordinate_systems {
        println!("    {system}: {count}");
    }
    if !summary.clean_shutdown {
        println!("  Log was not closed cleanly; the last sample may be missing.");
    }
    Ok(())
}
