//! Plain-text rendering of items for the terminal.

use std::fmt::Write;

use sref_core::item::Item;
use sref_core::state::ViewMode;

const GRID_COLUMNS: usize = 3;
const CELL_WIDTH: usize = 26;

pub fn items(items: &[Item], mode: ViewMode) -> String {
    if items.is_empty() {
        return "No items found.\n".to_string();
    }
    match mode {
        ViewMode::Grid => grid(items),
        ViewMode::List => list(items),
    }
}

fn grid(items: &[Item]) -> String {
    let mut out = String::new();
    for row in items.chunks(GRID_COLUMNS) {
        for line in [
            row.iter().map(|i| i.code.as_str()).collect::<Vec<_>>(),
            row.iter().map(|i| i.title.as_str()).collect(),
        ] {
            let cells: Vec<String> = line
                .iter()
                .map(|text| format!("{:<width$}", truncate(text, CELL_WIDTH - 2), width = CELL_WIDTH))
                .collect();
            let _ = writeln!(out, "{}", cells.join("").trim_end());
        }
        out.push('\n');
    }
    out
}

fn list(items: &[Item]) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(
            out,
            "{}  {}  {}",
            item.created_at.format("%Y-%m-%d"),
            item.code,
            item.title
        );
        if let Some(description) = &item.description {
            let _ = writeln!(out, "    {description}");
        }
        if !item.tags.is_empty() {
            let _ = writeln!(out, "    #{}", item.tags.iter().collect::<Vec<_>>().join(" #"));
        }
    }
    out
}

/// Every field of one item.
pub fn detail(item: &Item) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "id:          {}", item.id);
    let _ = writeln!(out, "code:        {}", item.code);
    let _ = writeln!(out, "title:       {}", item.title);
    let _ = writeln!(out, "description: {}", item.description.as_deref().unwrap_or("-"));
    let _ = writeln!(out, "image:       {}", item.image_url.as_deref().unwrap_or("-"));
    let _ = writeln!(out, "tags:        {}", item.tags.iter().collect::<Vec<_>>().join(", "));
    let _ = writeln!(out, "created:     {}", item.created_at.to_rfc3339());
    if let Some(owner) = &item.owner_id {
        let _ = writeln!(out, "owner:       {owner}");
    }
    out
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
