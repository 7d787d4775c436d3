use crate::config::RolesConfig;
use crate::types::{ColumnRole, RoleBinding, Roles, Row, Value};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Loads host rows from a CSV or JSON file, chosen by extension.
pub fn load_rows(path: &Path) -> Result<Vec<Row>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input data file has no extension"))?;

    let rows = match extension.as_str() {
        "csv" => load_csv_rows(path)?,
        "json" => load_json_rows(path)?,
        _ => return Err(anyhow!("Unsupported data format: {}", extension)),
    };

    info!("Loaded {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

// Cells stay text; parsing happens where a role needs a number.
fn load_csv_rows(path: &Path) -> Result<Vec<Row>> {
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header in {:?}", path))?
        .clone();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read CSV record in {:?}", path))?;
        let cells: HashMap<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::Text(cell.to_string())
                };
                (header.to_string(), value)
            })
            .collect();
        rows.push(Row::new(cells));
    }

    Ok(rows)
}

fn load_json_rows(path: &Path) -> Result<Vec<Row>> {
    let file = File::open(path).with_context(|| format!("Failed to open JSON file: {:?}", path))?;
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON data: {:?}", path))?;
    rows_from_json(json)
}

/// Converts an array of JSON objects into rows.
pub fn rows_from_json(json: serde_json::Value) -> Result<Vec<Row>> {
    let records = match json {
        serde_json::Value::Array(records) => records,
        _ => return Err(anyhow!("JSON data must be an array of objects")),
    };

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| match record {
            serde_json::Value::Object(fields) => Ok(fields
                .into_iter()
                .map(|(column, value)| (column, json_cell(value)))
                .collect::<Row>()),
            _ => Err(anyhow!("JSON record {} is not an object", i)),
        })
        .collect()
}

fn json_cell(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Bool(b) => Value::Text(b.to_string()),
        serde_json::Value::Null => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

/// Binds configured roles to columns present in the data.
///
/// A role whose column is missing is left unbound.
pub fn resolve_roles(config: &RolesConfig, rows: &[Row]) -> Roles {
    let columns: HashSet<&str> = rows.iter().flat_map(|row| row.columns()).collect();

    let mut roles = Roles::default();
    for role in ColumnRole::ALL {
        let Some(role_config) = config.get(role) else {
            continue;
        };
        if !rows.is_empty() && !columns.contains(role_config.column.as_str()) {
            warn!(
                "Column '{}' for role '{}' not found in data, leaving it unbound",
                role_config.column,
                role.token()
            );
            continue;
        }
        let label = role_config
            .label
            .clone()
            .unwrap_or_else(|| role_config.column.clone());
        roles.set(role, Some(RoleBinding::new(role_config.column.clone(), label)));
    }

    roles
}
