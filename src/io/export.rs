//! CSV export for the simulation output table.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::output::{DATETIME_COLUMN, OutputTable};

/// Timestamp format of the `Datetime` column.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exports the output table to a CSV file at the given path.
///
/// Writes a `Datetime` header followed by the external column names, then
/// one row per output record. Produces deterministic output for identical
/// inputs.
///
/// # Arguments
///
/// * `table` - Output table of a completed run
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(table: &OutputTable, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(table, buf)
}

/// Writes the output table as CSV to any writer.
///
/// Floats use Rust's shortest round-trip formatting.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(table: &OutputTable, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(std::iter::once(DATETIME_COLUMN).chain(table.column_names()))?;

    for (i, timestamp) in table.datetime().iter().enumerate() {
        let mut record = Vec::with_capacity(1 + table.column_names().count());
        record.push(timestamp.format(DATETIME_FORMAT).to_string());
        record.extend(table.row(i).map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
