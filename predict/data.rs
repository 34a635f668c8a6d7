//! Delimited patient tables for batch prediction.
//!
//! The header row names the fields. An optional `sample_id` column identifies
//! rows; without it rows are numbered from 1. Empty cells are treated as
//! missing, so they zero-fill during alignment like any absent field. Short
//! rows are accepted; their absent trailing cells count as empty.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::pipeline::PredictionResponse;
use crate::record::{FieldValue, PatientRecord};

pub const SAMPLE_ID_COLUMN: &str = "sample_id";

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed delimited input: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Header column '{0}' appears more than once.")]
    DuplicateColumn(String),
    #[error("The input file has a header but no data rows.")]
    NoRows,
}

/// Records read from a delimited file, in file order.
#[derive(Debug)]
pub struct PatientTable {
    pub sample_ids: Vec<String>,
    pub records: Vec<PatientRecord>,
}

impl PatientTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

fn parse_cell(cell: &str) -> Option<FieldValue> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(number) => Some(FieldValue::Number(number)),
        Err(_) => Some(FieldValue::Text(trimmed.to_string())),
    }
}

/// Reads a `.csv` (comma) or any other (tab) delimited patient table.
pub fn load_patient_table(path: &Path) -> Result<PatientTable, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let mut seen = std::collections::HashSet::new();
    for name in headers.iter() {
        if !seen.insert(name) {
            return Err(DataError::DuplicateColumn(name.to_string()));
        }
    }
    let id_column = headers.iter().position(|h| h == SAMPLE_ID_COLUMN);

    let mut sample_ids = Vec::new();
    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let row_values = result?;
        let id = id_column
            .and_then(|i| row_values.get(i))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| (row + 1).to_string());

        let record: PatientRecord = headers
            .iter()
            .zip(row_values.iter())
            .enumerate()
            .filter(|(i, _)| Some(*i) != id_column)
            .filter_map(|(_, (name, cell))| parse_cell(cell).map(|v| (name, v)))
            .collect();

        sample_ids.push(id);
        records.push(record);
    }

    if records.is_empty() {
        return Err(DataError::NoRows);
    }
    Ok(PatientTable {
        sample_ids,
        records,
    })
}

/// Writes one tab-separated row per sample.
///
/// Failed rows keep their place: label, probability and tier are `NA` and the
/// `error` column carries the failure code.
pub fn save_predictions(
    path: &Path,
    sample_ids: &[String],
    responses: &[PredictionResponse],
) -> Result<(), std::io::Error> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "sample_id\tlabel\tprobability\trisk_tier\terror")?;
    for (id, response) in sample_ids.iter().zip(responses) {
        let label = response
            .label
            .map_or_else(|| "NA".to_string(), |l| u8::from(l).to_string());
        let probability = response
            .probability
            .map_or_else(|| "NA".to_string(), |p| format!("{p:.6}"));
        let tier = response
            .risk_tier
            .map_or_else(|| "NA".to_string(), |t| t.to_string());
        let error = response
            .error
            .as_ref()
            .map_or("", |e| e.code.as_str());
        writeln!(file, "{id}\t{label}\t{probability}\t{tier}\t{error}")?;
    }
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn table_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{content}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn tsv_rows_become_records() {
        let file = table_file(
            ".tsv",
            "sample_id\tage\thtn\tbgr\np1\t48\tyes\t121\np2\t62\tno\t\n",
        );
        let table = load_patient_table(file.path()).unwrap();
        assert_eq!(table.sample_ids, ["p1", "p2"]);
        assert_eq!(table.records[0].get("htn"), Some(&FieldValue::Text("yes".into())));
        assert_eq!(table.records[0].get("age"), Some(&FieldValue::Number(48.0)));
        assert!(table.records[1].get("bgr").is_none());
        assert!(table.records[0].get(SAMPLE_ID_COLUMN).is_none());
    }

    #[test]
    fn csv_without_ids_is_numbered() {
        let file = table_file(".csv", "glucose,bmi\n148,33.6\n85,26.6\n");
        let table = load_patient_table(file.path()).unwrap();
        assert_eq!(table.sample_ids, ["1", "2"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn short_rows_leave_trailing_fields_missing() {
        let file = table_file(
            ".tsv",
            "sample_id\tage\thtn\np1\t48\tyes\np2\t62\np3\t55\tno\n",
        );
        let table = load_patient_table(file.path()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.sample_ids, ["p1", "p2", "p3"]);
        assert_eq!(table.records[1].get("age"), Some(&FieldValue::Number(62.0)));
        assert!(table.records[1].get("htn").is_none());
        assert_eq!(table.records[2].get("htn"), Some(&FieldValue::Text("no".into())));
    }

    #[test]
    fn header_only_file_is_rejected() {
        let file = table_file(".tsv", "age\tsex\n");
        assert!(matches!(load_patient_table(file.path()), Err(DataError::NoRows)));
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        let file = table_file(".tsv", "age\tage\n1\t2\n");
        assert!(matches!(
            load_patient_table(file.path()),
            Err(DataError::DuplicateColumn(name)) if name == "age"
        ));
    }
}
