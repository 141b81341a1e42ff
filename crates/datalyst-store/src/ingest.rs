use std::collections::HashSet;
use std::io::Read;

use datalyst_core::error::{AnalystError, Result};

/// SQL column affinity inferred from CSV values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A CSV file parsed into columns, inferred types, and string rows,
/// ready to be written into the dataset table.
#[derive(Debug)]
pub struct CsvDataset {
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<String>>,
}

impl CsvDataset {
    /// Parse CSV from a reader. Column names are sanitized for SQL
    /// (trimmed, spaces replaced with underscores).
    pub fn parse(reader: impl Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(|e| AnalystError::Ingest(format!("failed to read CSV header: {}", e)))?
            .iter()
            .enumerate()
            .map(|(i, h)| sanitize_column_name(h, i))
            .collect();

        if columns.is_empty() {
            return Err(AnalystError::Ingest("CSV has no columns".into()));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record =
                record.map_err(|e| AnalystError::Ingest(format!("malformed CSV row: {}", e)))?;
            rows.push(record.iter().map(|v| v.to_string()).collect());
        }

        let types = infer_column_types(columns.len(), &rows);

        Ok(Self {
            columns,
            types,
            rows,
        })
    }

    /// Build "column: value" entity strings from distinct values of
    /// text-typed columns. These feed the entity index.
    pub fn entity_strings(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut entities = Vec::new();

        for (i, (name, ty)) in self.columns.iter().zip(&self.types).enumerate() {
            if *ty != ColumnType::Text {
                continue;
            }
            for row in &self.rows {
                let value = row.get(i).map(|s| s.trim()).unwrap_or("");
                if value.is_empty() {
                    continue;
                }
                let entry = format!("{}: {}", name, value);
                if seen.insert(entry.clone()) {
                    entities.push(entry);
                }
            }
        }

        entities
    }
}

fn sanitize_column_name(raw: &str, index: usize) -> String {
    let name = raw.trim().replace(' ', "_");
    if name.is_empty() {
        format!("column_{}", index)
    } else {
        name
    }
}

/// Infer INTEGER / REAL / TEXT per column by scanning values. Empty cells
/// are ignored; an all-empty column is TEXT.
fn infer_column_types(column_count: usize, rows: &[Vec<String>]) -> Vec<ColumnType> {
    (0..column_count)
        .map(|i| {
            let mut saw_value = false;
            let mut all_int = true;
            let mut all_real = true;

            for row in rows {
                let value = match row.get(i) {
                    Some(v) if !v.trim().is_empty() => v.trim(),
                    _ => continue,
                };
                saw_value = true;
                if value.parse::<i64>().is_err() {
                    all_int = false;
                }
                if value.parse::<f64>().is_err() {
                    all_real = false;
                }
            }

            if !saw_value {
                ColumnType::Text
            } else if all_int {
                ColumnType::Integer
            } else if all_real {
                ColumnType::Real
            } else {
                ColumnType::Text
            }
        })
        .collect()
}
