//! Rhino Specification Parser
//!
//! Minimal reader for the sectioned plugin document format:
//!
//! ```text
//! [test-id] ClickButton
//! [test-scenario] Clicks a button located by the given locator
//! [test-actions]
//! 1. click on {{$ --locator:xpath}}
//! [test-parameters]
//! |Parameter|Description|
//! |---------|-----------|
//! |locator  |element locator|
//! ```
//!
//! Unknown sections are ignored so richer documents still parse.

use regex::Regex;
use std::sync::OnceLock;

use crate::plugin::error::{RegistryError, RegistryResult};
use crate::plugin::traits::{ParsedPlugin, PluginParameter, PluginParser};

/// Separator line between specifications in a bulk payload
pub const SPECIFICATION_SEPARATOR: &str = ">>>";

fn section_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[(test-[a-z-]+)\]\s*(.*)$").expect("valid section regex"))
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid name regex"))
}

/// Parser for Rhino plugin specification documents
#[derive(Debug, Default, Clone, Copy)]
pub struct RhinoSpecParser;

impl RhinoSpecParser {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Default)]
struct Sections {
    id: Option<String>,
    scenario: Vec<String>,
    actions: Vec<String>,
    parameters: Vec<String>,
}

impl PluginParser for RhinoSpecParser {
    fn parse(&self, raw_text: &str) -> RegistryResult<ParsedPlugin> {
        let text = normalize_line_breaks(raw_text);
        let mut sections = Sections::default();
        let mut current: Option<String> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(captures) = section_pattern().captures(trimmed) {
                let section = captures[1].to_string();
                let inline = captures[2].trim().to_string();
                match section.as_str() {
                    "test-id" => sections.id = Some(inline),
                    "test-scenario" if !inline.is_empty() => sections.scenario.push(inline),
                    _ => {}
                }
                current = Some(section);
                continue;
            }

            if trimmed.is_empty() {
                continue;
            }

            match current.as_deref() {
                Some("test-scenario") => sections.scenario.push(trimmed.to_string()),
                Some("test-actions") => sections.actions.push(trimmed.to_string()),
                Some("test-parameters") => sections.parameters.push(trimmed.to_string()),
                _ => {}
            }
        }

        let name = sections
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RegistryError::bad_request("missing [test-id] section or plugin name"))?;

        if !name_pattern().is_match(&name) {
            return Err(RegistryError::bad_request(format!(
                "invalid plugin name '{}': must start with a letter and contain only letters, digits or '_'",
                name
            )));
        }

        if sections.actions.is_empty() {
            return Err(RegistryError::bad_request(format!(
                "plugin '{}' has no [test-actions]",
                name
            )));
        }

        let scenario = if sections.scenario.is_empty() {
            None
        } else {
            Some(sections.scenario.join(" "))
        };

        Ok(ParsedPlugin {
            name,
            scenario,
            actions: sections.actions,
            parameters: parse_parameter_rows(&sections.parameters),
            specification: text.trim().to_string(),
        })
    }
}

/// Read `|name|description|` rows, skipping the header and separator rows
fn parse_parameter_rows(rows: &[String]) -> Vec<PluginParameter> {
    rows.iter()
        .filter_map(|row| {
            let cells: Vec<&str> = row
                .trim()
                .trim_matches('|')
                .split('|')
                .map(str::trim)
                .collect();
            let name = cells.first().copied().unwrap_or_default();
            if name.is_empty() || name.eq_ignore_ascii_case("parameter") || name.chars().all(|c| c == '-' || c == ':') {
                return None;
            }
            Some(PluginParameter {
                name: name.to_string(),
                description: cells.get(1).copied().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Convert CRLF and lone CR line endings to LF
pub fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Split a bulk payload into individual specifications
pub fn split_specifications(text: &str) -> Vec<String> {
    let normalized = normalize_line_breaks(text);
    let mut specs = Vec::new();
    let mut current = Vec::new();

    for line in normalized.lines() {
        if line.trim() == SPECIFICATION_SEPARATOR {
            specs.push(current.join("\n"));
            current.clear();
        } else {
            current.push(line);
        }
    }
    specs.push(current.join("\n"));

    specs
        .into_iter()
        .map(|spec| spec.trim().to_string())
        .filter(|spec| !spec.is_empty())
        .collect()
}

/// Short label naming a specification in diagnostics.
///
/// Prefers the declared `[test-id]`, falling back to the first non-empty line.
pub fn specification_label(text: &str) -> String {
    let normalized = normalize_line_breaks(text);
    for line in normalized.lines() {
        if let Some(captures) = section_pattern().captures(line.trim()) {
            if &captures[1] == "test-id" && !captures[2].trim().is_empty() {
                return captures[2].trim().to_string();
            }
        }
    }

    let first = normalized.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("<empty>");
    if first.chars().count() > 48 {
        format!("{}...", first.chars().take(48).collect::<String>())
    } else {
        first.to_string()
    }
}
