//! Table formatting for CLI output.

use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::types::{CollectionInfo, HealthReport, SearchHit};

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

/// Key/value table describing one collection.
pub fn collection_info_table(info: &CollectionInfo) -> String {
    let mut table = new_table(&["Property", "Value"]);
    table.add_row(vec!["Name", &info.name]);
    table.add_row(vec!["Vector size", &info.vector_size.to_string()]);
    table.add_row(vec!["Points", &info.point_count.to_string()]);
    table.add_row(vec!["Unique files", &info.unique_file_count.to_string()]);
    table.add_row(vec!["Created", &info.created_at]);

    let (stale_text, color) = if info.stale {
        ("stale (rebuild on next query)", Color::Yellow)
    } else {
        ("fresh", Color::Green)
    };
    table.add_row(vec![
        Cell::new("ANN index"),
        Cell::new(stale_text).fg(color),
    ]);

    if let Some(ann) = &info.ann {
        table.add_row(vec!["ANN vectors", &ann.vector_count.to_string()]);
        table.add_row(vec![
            "ANN parameters",
            &format!(
                "M={} ef_construction={} space={}",
                ann.m,
                ann.ef_construction,
                ann.space.as_str()
            ),
        ]);
        table.add_row(vec!["Last rebuild", &ann.last_rebuild]);
        table.add_row(vec!["ANN file size", &format!("{} bytes", ann.file_size_bytes)]);
    }
    table.to_string()
}

/// Ranked search results.
pub fn search_results_table(hits: &[SearchHit]) -> String {
    let mut table = new_table(&["#", "Score", "Id", "Path", "Content"]);
    for (rank, hit) in hits.iter().enumerate() {
        let path = hit
            .payload
            .get(crate::types::payload_keys::PATH)
            .and_then(serde_json::Value::as_str)
            .unwrap_or("-");
        let content = hit.content.as_ref().map_or_else(String::new, |content| {
            let first = content.text.lines().next().unwrap_or_default();
            if content.is_stale() {
                format!("{first} (stale)")
            } else {
                first.to_string()
            }
        });
        table.add_row(vec![
            (rank + 1).to_string(),
            format!("{:.4}", hit.score),
            hit.id.clone(),
            path.to_string(),
            content,
        ]);
    }
    table.to_string()
}

pub fn health_table(report: &HealthReport) -> String {
    let mut table = new_table(&["Check", "Result"]);
    let status = |ok: bool| {
        if ok {
            Cell::new("ok").fg(Color::Green)
        } else {
            Cell::new("failed")
                .fg(Color::Red)
                .add_attribute(Attribute::Bold)
        }
    };
    table.add_row(vec![Cell::new("Index path"), Cell::new(&report.index_path)]);
    table.add_row(vec![Cell::new("Reachable"), status(report.reachable)]);
    table.add_row(vec![Cell::new("Writable"), status(report.writable)]);
    table.add_row(vec![
        Cell::new("Collections"),
        Cell::new(report.collections),
    ]);
    table.to_string()
}
