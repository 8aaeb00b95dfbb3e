use crate::error::{ImportExportError, Result};
use crate::models::{FieldValue, UnifiedRow, UnifiedTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DATE_COLUMN: &str = "date";

fn csv_err(e: csv::Error) -> crate::error::ReadyRsError {
    ImportExportError::Csv(e).into()
}

/// Value type of a persisted column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Number,
    Text,
}

/// Column types written next to a table CSV
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: BTreeMap<String, ColumnKind>,
}

impl TableSchema {
    /// A column is numeric when every non-null value is a number
    pub fn of(table: &UnifiedTable) -> Self {
        let columns = table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let numeric = table
                    .rows
                    .iter()
                    .filter_map(|r| r.values.get(idx).and_then(Option::as_ref))
                    .all(FieldValue::is_number);
                let kind = if numeric { ColumnKind::Number } else { ColumnKind::Text };
                (name.clone(), kind)
            })
            .collect();
        Self { columns }
    }
}

/// `merged.csv` -> `merged.schema.json`
pub fn schema_path(table_path: &Path) -> PathBuf {
    table_path.with_extension("schema.json")
}

/// Write a table as `date,<columns...>`; null cells are left empty.
/// Column types go to a sidecar file so text columns stay text on reload.
pub fn write_table<P: AsRef<Path>>(table: &UnifiedTable, output_path: P) -> Result<()> {
    if let Some(parent) = output_path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(&output_path).map_err(csv_err)?;

    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push(DATE_COLUMN.to_string());
    header.extend(table.columns.iter().cloned());
    writer.write_record(&header).map_err(csv_err)?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(header.len());
        record.push(row.date.format("%Y-%m-%d").to_string());
        record.extend(
            row.values
                .iter()
                .map(|v| v.as_ref().map_or_else(String::new, |v| v.to_string())),
        );
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer.flush()?;

    let schema = serde_json::to_string_pretty(&TableSchema::of(table))
        .map_err(ImportExportError::Serialization)?;
    std::fs::write(schema_path(output_path.as_ref()), schema)?;

    tracing::info!(
        rows = table.len(),
        columns = table.columns.len(),
        path = %output_path.as_ref().display(),
        "Table written"
    );
    Ok(())
}

fn load_schema(table_path: &Path) -> Result<Option<TableSchema>> {
    let path = schema_path(table_path);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No table schema, inferring column types");
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let schema = serde_json::from_str(&content).map_err(ImportExportError::Serialization)?;
    Ok(Some(schema))
}

/// Numeric cell; `NaN` and infinities read as null
fn parse_number(cell: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    let n = cell.trim().parse::<f64>()?;
    Ok(n.is_finite().then_some(n))
}

/// Text columns hold any unparsable cell
fn infer_kind(cells: &[Vec<String>], col: usize) -> ColumnKind {
    let numeric = cells
        .iter()
        .filter_map(|row| row.get(col))
        .filter(|cell| !cell.trim().is_empty())
        .all(|cell| parse_number(cell).is_ok());
    if numeric {
        ColumnKind::Number
    } else {
        ColumnKind::Text
    }
}

/// Read a table written by [`write_table`]. Without a schema file a
/// column is numeric only when every non-empty cell parses as a number.
pub fn read_table<P: AsRef<Path>>(input_path: P) -> Result<UnifiedTable> {
    let mut reader = csv::Reader::from_path(&input_path).map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    match headers.get(0) {
        Some(first) if first == DATE_COLUMN => {}
        _ => {
            return Err(ImportExportError::MissingColumn {
                column: DATE_COLUMN.to_string(),
            }
            .into())
        }
    }

    let mut dates = Vec::new();
    let mut cells: Vec<Vec<String>> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        // header is line 1
        let row = i + 2;

        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
            ImportExportError::ParseError {
                row,
                reason: format!("invalid date {:?}: {}", raw_date, e),
            }
        })?;
        dates.push(date);
        cells.push(
            (1..headers.len())
                .map(|col| record.get(col).unwrap_or_default().to_string())
                .collect(),
        );
    }

    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let schema = load_schema(input_path.as_ref())?;
    let kinds: Vec<ColumnKind> = columns
        .iter()
        .enumerate()
        .map(|(col, name)| {
            schema
                .as_ref()
                .and_then(|s| s.columns.get(name).copied())
                .unwrap_or_else(|| infer_kind(&cells, col))
        })
        .collect();

    let mut table = UnifiedTable::new(columns);
    for (i, (date, row_cells)) in dates.into_iter().zip(cells).enumerate() {
        let mut values = Vec::with_capacity(kinds.len());
        for (col, cell) in row_cells.into_iter().enumerate() {
            if cell.trim().is_empty() {
                values.push(None);
                continue;
            }
            let value = match kinds[col] {
                ColumnKind::Text => Some(FieldValue::Text(cell)),
                ColumnKind::Number => {
                    let parsed = parse_number(&cell).map_err(|e| ImportExportError::ParseError {
                        row: i + 2,
                        reason: format!("column {}: {:?} is not a number: {}", table.columns[col], cell, e),
                    })?;
                    if parsed.is_none() {
                        tracing::warn!(
                            row = i + 2,
                            column = %table.columns[col],
                            cell = %cell,
                            "Non-finite number read as null"
                        );
                    }
                    parsed.map(FieldValue::Number)
                }
            };
            values.push(value);
        }
        table.rows.push(UnifiedRow { date, values });
    }
    table.rows.sort_by_key(|r| r.date);

    tracing::info!(
        rows = table.len(),
        columns = table.columns.len(),
        path = %input_path.as_ref().display(),
        "Table loaded"
    );
    Ok(table)
}

/// Write any serializable rows (baselines, anomaly flags) with a header
pub fn write_records<T, P>(records: &[T], output_path: P) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    if let Some(parent) = output_path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(&output_path).map_err(csv_err)?;
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}
