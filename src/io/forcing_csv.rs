//! Forcing CSV reader.
//!
//! The first column holds the timestamp; every other column is numeric.
//! Empty cells and `NaN` are read as missing values.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::SnobalError;
use crate::forcing::ForcingTable;

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads a forcing table from a CSV file.
///
/// # Errors
///
/// `SnobalError::Io` if the file cannot be opened, `Csv` for malformed CSV,
/// `Data` for unparseable timestamps or values.
pub fn read_forcing_csv(path: &Path) -> Result<ForcingTable, SnobalError> {
    let file = File::open(path)?;
    read_forcing(io::BufReader::new(file))
}

/// Reads a forcing table from any reader.
///
/// # Errors
///
/// See [`read_forcing_csv`].
pub fn read_forcing(reader: impl Read) -> Result<ForcingTable, SnobalError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err(SnobalError::Data(
            "forcing file needs a timestamp column and at least one value column".to_string(),
        ));
    }
    let names: Vec<String> = headers.iter().skip(1).map(String::from).collect();

    let mut timestamps = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        timestamps.push(parse_timestamp(record.get(0).unwrap_or(""), row)?);
        for (j, column) in columns.iter_mut().enumerate() {
            let raw = record.get(j + 1).unwrap_or("");
            column.push(parse_value(raw).ok_or_else(|| {
                SnobalError::Data(format!("row {}: column {}: not a number: {raw:?}", row + 1, names[j]))
            })?);
        }
    }

    let mut table = ForcingTable::new(timestamps);
    for (name, values) in names.into_iter().zip(columns) {
        table.insert_column(name, values);
    }
    Ok(table)
}

fn parse_timestamp(raw: &str, row: usize) -> Result<NaiveDateTime, SnobalError> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| SnobalError::Data(format!("row {}: invalid timestamp {raw:?}", row + 1)))
}

fn parse_value(raw: &str) -> Option<f64> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    raw.parse().ok()
}
