//! Terminal rendering for registry results
//!
//! Tables use the prettytable clean format; colour is applied only when
//! enabled and `NO_COLOR` is unset.

use colored::{ColoredString, Colorize};
use prettytable::{format, Cell, Row, Table};

use crate::plugin::{ActionListing, MutationOutcome, OperationResult, PluginCacheEntry, RegistryStatus};

/// Colour handling for CLI output
#[derive(Debug, Clone, Copy)]
pub struct ColourManager {
    enabled: bool,
}

impl ColourManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: enabled && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    pub fn colours_enabled(&self) -> bool {
        self.enabled
    }

    pub fn success(&self, text: &str) -> ColoredString {
        if self.enabled { text.green() } else { text.normal() }
    }

    pub fn warning(&self, text: &str) -> ColoredString {
        if self.enabled { text.yellow() } else { text.normal() }
    }

    pub fn error(&self, text: &str) -> ColoredString {
        if self.enabled { text.red().bold() } else { text.normal() }
    }

    pub fn highlight(&self, text: &str) -> ColoredString {
        if self.enabled { text.cyan().bold() } else { text.normal() }
    }
}

/// Compact table with a header row, indented two spaces
pub fn format_compact_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.add_row(Row::new(headers.iter().map(|header| Cell::new(header)).collect()));
    for row in rows {
        table.add_row(Row::new(row.iter().map(|cell| Cell::new(cell)).collect()));
    }

    table
        .to_string()
        .lines()
        .map(|line| format!("  {}\n", line))
        .collect()
}

pub fn listing_table(listings: &[ActionListing]) -> String {
    let rows: Vec<Vec<String>> = listings
        .iter()
        .map(|listing| {
            vec![
                listing.package.clone(),
                listing.key.clone(),
                listing.literal.clone(),
                listing.source.to_string(),
            ]
        })
        .collect();
    format_compact_table(&["Package", "Key", "Literal", "Source"], &rows)
}

/// Multi-line description of one cache entry
pub fn entry_details(entry: &PluginCacheEntry, colours: &ColourManager) -> String {
    let descriptor = entry.descriptor();
    let mut rows = vec![
        vec!["Literal".to_string(), descriptor.literal().to_string()],
        vec!["Source".to_string(), descriptor.source().to_string()],
        vec!["Verb".to_string(), descriptor.verb().as_str().to_string()],
    ];
    if !descriptor.entity().description.is_empty() {
        rows.push(vec!["Description".to_string(), descriptor.entity().description.clone()]);
    }
    if !descriptor.entity().aliases.is_empty() {
        rows.push(vec!["Aliases".to_string(), descriptor.entity().aliases.join(", ")]);
    }
    if let Some(directory) = entry.directory() {
        rows.push(vec!["Package".to_string(), directory.to_string()]);
    }
    if let Some(path) = entry.path() {
        rows.push(vec!["File".to_string(), path.display().to_string()]);
    }

    let mut text = format!("{}\n", colours.highlight(descriptor.key()));
    text.push_str(&format_compact_table(&["Field", "Value"], &rows));
    if let Some(specification) = entry.specification() {
        text.push('\n');
        text.push_str(specification.trim_end());
        text.push('\n');
    }
    text
}

pub fn status_report(status: &RegistryStatus, colours: &ColourManager) -> String {
    let built_at = status
        .built_at
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let rows = vec![
        vec!["Root".to_string(), status.root.display().to_string()],
        vec!["Generation".to_string(), status.generation.to_string()],
        vec!["Built".to_string(), built_at],
        vec!["State".to_string(), status.state.clone()],
        vec!["Packages".to_string(), status.packages.to_string()],
        vec!["Actions".to_string(), status.actions.to_string()],
        vec!["File backed".to_string(), status.file_backed_actions.to_string()],
        vec!["Skipped".to_string(), status.skipped.to_string()],
    ];

    let mut text = format!("{}\n", colours.highlight("Plugin Registry"));
    text.push_str(&format_compact_table(&["Field", "Value"], &rows));
    if let Some(reason) = &status.stale {
        text.push_str(&format!("{} {}\n", colours.warning("Cache is stale:"), reason));
    }
    text
}

/// One line summary of a storage mutation
pub fn mutation_summary(verb: &str, outcome: &MutationOutcome, colours: &ColourManager) -> String {
    let noun = if outcome.affected == 1 { "item" } else { "items" };
    let mut text = format!("{} {} {}", colours.success(verb), outcome.affected, noun);
    if let Some(reason) = &outcome.stale {
        text.push_str(&format!("\n{} {}", colours.warning("Cache is stale:"), reason));
    }
    text
}

pub fn operation_line(result: &OperationResult, json: &str, colours: &ColourManager) -> String {
    if result.is_success() {
        json.to_string()
    } else {
        colours.error(json).to_string()
    }
}
