use anyhow::Result;
use comfy_table::Table;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Table,
}

pub fn print_output<T: Serialize>(data: T, format: OutputFormat) -> Result<()> {
    let json_value = serde_json::to_value(data)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json_value)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(&json_value)?);
        }
        OutputFormat::Table => {
            println!("{}", render_table(&json_value));
        }
    }

    Ok(())
}

/// Render JSON as a table
///
/// A list becomes one row per element with a column for every field seen in
/// any element; a single object becomes `Field | Value` rows. Nested objects
/// are flattened into dotted field names (`tracking.timeout_secs`).
fn render_table(value: &Value) -> String {
    match value {
        Value::Array(items) if items.iter().any(Value::is_object) => {
            let rows: Vec<Vec<(String, String)>> = items.iter().map(flatten).collect();
            let mut headers: Vec<String> = Vec::new();
            for (field, _) in rows.iter().flatten() {
                if !headers.contains(field) {
                    headers.push(field.clone());
                }
            }

            let mut table = Table::new();
            table.set_header(&headers);
            for row in &rows {
                table.add_row(headers.iter().map(|h| {
                    row.iter()
                        .find(|(field, _)| field == h)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| "-".to_string())
                }));
            }
            table.to_string()
        }
        Value::Array(items) if items.is_empty() => "(none)".to_string(),
        Value::Object(_) => {
            let mut table = Table::new();
            table.set_header(vec!["Field", "Value"]);
            for (field, cell) in flatten(value) {
                table.add_row(vec![field, cell]);
            }
            table.to_string()
        }
        _ => cell_text(value),
    }
}

/// Leaf fields of a value as `(dotted.path, text)` pairs
fn flatten(value: &Value) -> Vec<(String, String)> {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
        match value {
            Value::Object(obj) if !obj.is_empty() => {
                for (key, child) in obj {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&path, child, out);
                }
            }
            leaf => out.push((prefix.to_string(), cell_text(leaf))),
        }
    }

    let mut out = Vec::new();
    match value {
        Value::Object(_) => walk("", value, &mut out),
        other => out.push(("value".to_string(), cell_text(other))),
    }
    out
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => items
            .iter()
            .map(cell_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => format!("[{} entries]", items.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}
