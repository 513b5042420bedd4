//! Output formatters for query results.

use std::collections::BTreeSet;

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use fedq_core::proto::{Entry, Value};
use fedq_core::{attributes_of, QueryResult};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format a query result.
    fn format_result(&self, result: &QueryResult) -> String;

    /// Format an attribute listing.
    fn format_attributes(&self, attributes: &BTreeSet<String>) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_result(&self, result: &QueryResult) -> String {
        match result {
            QueryResult::Entries(entries) if entries.is_empty() => "No results".to_string(),
            QueryResult::Entries(entries) => format_entries_as_table(entries),
            QueryResult::Count(n) => format!("{} row(s)", n),
            QueryResult::Groups(groups) if groups.is_empty() => "No results".to_string(),
            QueryResult::Groups(groups) => groups
                .iter()
                .map(|group| format!("group {}\n{}", group.key, format_entries_as_table(&group.entries)))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    fn format_attributes(&self, attributes: &BTreeSet<String>) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Attribute"]);

        for attribute in attributes {
            table.add_row(vec![attribute]);
        }

        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_result(&self, result: &QueryResult) -> String {
        let json = match result {
            QueryResult::Entries(entries) => serde_json::to_string_pretty(entries),
            QueryResult::Count(n) => serde_json::to_string_pretty(&serde_json::json!({ "count": n })),
            QueryResult::Groups(groups) => serde_json::to_string_pretty(groups),
        };
        json.unwrap_or_else(|_| "[]".to_string())
    }

    fn format_attributes(&self, attributes: &BTreeSet<String>) -> String {
        serde_json::to_string_pretty(attributes).unwrap_or_else(|_| "[]".to_string())
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_result(&self, result: &QueryResult) -> String {
        match result {
            QueryResult::Entries(entries) => format_entries_as_csv(entries),
            QueryResult::Count(n) => format!("count\n{}\n", n),
            // CSV has no nesting: flatten groups with their key as first column.
            QueryResult::Groups(groups) => {
                let columns: BTreeSet<String> = groups.iter().flat_map(|g| attributes_of(&g.entries)).collect();
                let mut output = String::from("group");
                for column in &columns {
                    output.push(',');
                    output.push_str(&escape_csv_cell(column));
                }
                output.push('\n');
                for group in groups {
                    for entry in &group.entries {
                        let mut cells = vec![format_value_csv(&group.key)];
                        cells.extend(columns.iter().map(|c| format_value_csv(cell(entry, c))));
                        output.push_str(&cells.join(","));
                        output.push('\n');
                    }
                }
                output
            }
        }
    }

    fn format_attributes(&self, attributes: &BTreeSet<String>) -> String {
        let mut output = String::from("attribute\n");
        for attribute in attributes {
            output.push_str(&format!("{}\n", escape_csv_cell(attribute)));
        }
        output
    }
}

static NULL: Value = Value::Null;

fn cell<'a>(entry: &'a Entry, column: &str) -> &'a Value {
    entry.get(column).unwrap_or(&NULL)
}

/// Format entries as a table, one column per attribute.
fn format_entries_as_table(entries: &[Entry]) -> String {
    let columns = attributes_of(entries);
    let mut table = Table::new();
    table.set_header(columns.iter().map(Cell::new).collect::<Vec<_>>());

    for entry in entries {
        table.add_row(
            columns
                .iter()
                .map(|c| Cell::new(format_value(cell(entry, c))))
                .collect::<Vec<_>>(),
        );
    }

    format!("{}\n{} row(s)", table, entries.len())
}

/// Format entries as CSV.
fn format_entries_as_csv(entries: &[Entry]) -> String {
    let columns = attributes_of(entries);
    let mut output = columns
        .iter()
        .map(|c| escape_csv_cell(c))
        .collect::<Vec<_>>()
        .join(",");
    output.push('\n');

    for entry in entries {
        let cells: Vec<String> = columns.iter().map(|c| format_value_csv(cell(entry, c))).collect();
        output.push_str(&cells.join(","));
        output.push('\n');
    }

    output
}

/// Format a Value as a display string.
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Format a Value for CSV output.
fn format_value_csv(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => escape_csv_cell(s),
        other => escape_csv_cell(&other.to_string()),
    }
}

/// Quote a cell if it contains a separator, quote or newline.
fn escape_csv_cell(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_core::Group;

    fn entries() -> Vec<Entry> {
        vec![
            Entry::from([("name", Value::from("ada")), ("tags", Value::from(vec!["x", "y"]))]),
            Entry::from([("name", Value::from("bob, jr")), ("age", Value::Int(7))]),
        ]
    }

    #[test]
    fn test_escape_csv_cell() {
        assert_eq!(escape_csv_cell("hello"), "hello");
        assert_eq!(escape_csv_cell("hello, world"), "\"hello, world\"");
        assert_eq!(escape_csv_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_entries() {
        let csv = CsvFormatter.format_result(&QueryResult::Entries(entries()));
        assert_eq!(csv, "age,name,tags\n,ada,\"[\"\"x\"\",\"\"y\"\"]\"\n7,\"bob, jr\",\n");
    }

    #[test]
    fn test_table_fills_missing_cells() {
        let table = TableFormatter.format_result(&QueryResult::Entries(entries()));
        assert!(table.contains("NULL"));
        assert!(table.ends_with("2 row(s)"));
        assert_eq!(TableFormatter.format_result(&QueryResult::Entries(vec![])), "No results");
    }

    #[test]
    fn test_json_result_kinds() {
        let json = JsonFormatter.format_result(&QueryResult::Count(4));
        assert_eq!(serde_json::from_str::<serde_json::Value>(&json).unwrap()["count"], 4);

        let groups = QueryResult::Groups(vec![Group {
            key: Value::from("k"),
            entries: entries(),
        }]);
        let json: serde_json::Value = serde_json::from_str(&JsonFormatter.format_result(&groups)).unwrap();
        assert_eq!(json[0]["key"], "k");
        assert_eq!(json[0]["entries"][1]["age"], 7);
    }
}
