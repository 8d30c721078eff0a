//! Forcing data: the external time-indexed table, its validation, and the
//! per-sample records handed to the integration kernel.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, TimeDelta};

use crate::error::SnobalError;
use crate::names::{self, FORCING_NAMES};

/// Forcing variables consumed by the integration kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ForcingField {
    NetSolar,
    Thermal,
    AirTemp,
    GroundTemp,
    VaporPressure,
    WindSpeed,
    PrecipMass,
    PrecipTemp,
    PercentSnow,
    SnowDensity,
}

impl ForcingField {
    /// All required forcing fields, in table order.
    pub const ALL: [ForcingField; 10] = [
        ForcingField::NetSolar,
        ForcingField::Thermal,
        ForcingField::AirTemp,
        ForcingField::GroundTemp,
        ForcingField::VaporPressure,
        ForcingField::WindSpeed,
        ForcingField::PrecipMass,
        ForcingField::PrecipTemp,
        ForcingField::PercentSnow,
        ForcingField::SnowDensity,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Unit-suffixed column name used in forcing files.
    pub fn external_name(self) -> &'static str {
        FORCING_NAMES[self.index()].0
    }

    /// Field name used by the kernel.
    pub fn internal_name(self) -> &'static str {
        FORCING_NAMES[self.index()].1
    }

    pub fn from_internal_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.internal_name() == name)
    }
}

/// One forcing sample in kernel names and units.
///
/// Each field holds either one value per grid cell or a single value that
/// applies to every cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingRecord {
    values: [Vec<f64>; 10],
}

impl ForcingRecord {
    /// Builds a single-site record from values already in kernel units.
    pub fn point(values: [f64; 10]) -> Self {
        Self {
            values: values.map(|v| vec![v]),
        }
    }

    /// Builds a gridded record; each field must have one value or one per cell.
    ///
    /// # Errors
    ///
    /// `SnobalError::Data` if a field is empty, or if two fields disagree on
    /// the number of cells.
    pub fn grid(values: [Vec<f64>; 10]) -> Result<Self, SnobalError> {
        let width = values.iter().map(Vec::len).max().unwrap_or_default();
        for (field, column) in ForcingField::ALL.iter().zip(&values) {
            if column.is_empty() || (column.len() != 1 && column.len() != width) {
                return Err(SnobalError::Data(format!(
                    "forcing field {} has {} values, expected 1 or {width}",
                    field.internal_name(),
                    column.len()
                )));
            }
        }
        Ok(Self { values })
    }

    /// Number of cells the record covers; 1 when every field broadcasts.
    pub fn width(&self) -> usize {
        self.values.iter().map(Vec::len).max().unwrap_or(1)
    }

    /// Value of `field` for grid cell `cell`, broadcasting single values.
    ///
    /// # Panics
    ///
    /// If `cell` is not below [`ForcingRecord::width`].
    pub fn get(&self, field: ForcingField, cell: usize) -> f64 {
        let column = &self.values[field.index()];
        if column.len() == 1 {
            column[0]
        } else {
            column[cell]
        }
    }

    /// Values of a field looked up by its kernel name.
    pub fn by_internal_name(&self, name: &str) -> Option<&[f64]> {
        ForcingField::from_internal_name(name).map(|f| self.values[f.index()].as_slice())
    }
}

/// Uniformly sampled forcing series keyed by external column names.
///
/// Missing values are stored as `NaN`. Columns beyond the required set are
/// carried but ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForcingTable {
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl ForcingTable {
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Self {
        Self {
            timestamps,
            columns: BTreeMap::new(),
        }
    }

    /// Adds or replaces a column.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Checks that the table can drive a run and returns its interval in seconds.
///
/// Checked in order: required columns present, column lengths match the
/// index, exactly one positive sampling interval, no missing values.
///
/// # Errors
///
/// `SnobalError::Schema` listing every missing column, or
/// `SnobalError::Data` for sampling and completeness problems.
pub fn validate_forcing(table: &ForcingTable) -> Result<f64, SnobalError> {
    let missing: Vec<String> = ForcingField::ALL
        .iter()
        .map(|f| f.external_name())
        .filter(|name| !table.columns.contains_key(*name))
        .map(String::from)
        .collect();
    if !missing.is_empty() {
        return Err(SnobalError::Schema { missing });
    }

    for field in ForcingField::ALL {
        let name = field.external_name();
        let len = table.columns[name].len();
        if len != table.len() {
            return Err(SnobalError::Data(format!(
                "column {name} has {len} values for {} timestamps",
                table.len()
            )));
        }
    }

    if table.len() < 2 {
        return Err(SnobalError::Data(
            "at least two samples are needed to form a time step".to_string(),
        ));
    }

    let intervals: BTreeSet<TimeDelta> = table.timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    if intervals.len() > 1 {
        let secs: Vec<f64> = intervals.iter().map(|d| seconds(*d)).collect();
        return Err(SnobalError::Data(format!(
            "non-uniform time step, found intervals (s): {secs:?}"
        )));
    }
    let interval = intervals.first().copied().unwrap_or_else(TimeDelta::zero);
    if interval <= TimeDelta::zero() {
        return Err(SnobalError::Data(format!(
            "timestamps must be strictly increasing, found interval {} s",
            seconds(interval)
        )));
    }

    for field in ForcingField::ALL {
        let name = field.external_name();
        if table.columns[name].iter().any(|v| v.is_nan()) {
            return Err(SnobalError::Data(format!(
                "column {name} is not serially complete (contains missing values)"
            )));
        }
    }

    Ok(seconds(interval))
}

fn seconds(interval: TimeDelta) -> f64 {
    interval.num_milliseconds() as f64 / 1000.0
}

/// Translates one external sample to a kernel record.
///
/// Renames every key and converts the forcing temperatures to Kelvin.
///
/// # Errors
///
/// `SnobalError::Schema` if any required external name is absent.
pub fn translate_sample(sample: &BTreeMap<String, f64>) -> Result<ForcingRecord, SnobalError> {
    let missing: Vec<String> = ForcingField::ALL
        .iter()
        .map(|f| f.external_name())
        .filter(|name| !sample.contains_key(*name))
        .map(String::from)
        .collect();
    if !missing.is_empty() {
        return Err(SnobalError::Schema { missing });
    }

    let values = ForcingField::ALL.map(|f| {
        let value = sample[f.external_name()];
        names::forcing_to_kernel_units(f.internal_name(), value)
    });
    Ok(ForcingRecord::point(values))
}

/// Translates every row of the table into kernel records, in order.
///
/// Temperatures are converted exactly once here; the table itself is left
/// in external units.
///
/// # Errors
///
/// `SnobalError::Schema` if a required column is absent.
pub fn translate_forcing(table: &ForcingTable) -> Result<Vec<ForcingRecord>, SnobalError> {
    let mut columns = Vec::with_capacity(ForcingField::ALL.len());
    let mut missing = Vec::new();
    for field in ForcingField::ALL {
        match table.column(field.external_name()) {
            Some(values) => columns.push((field, values)),
            None => missing.push(field.external_name().to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(SnobalError::Schema { missing });
    }

    let records = (0..table.len())
        .map(|i| {
            let mut values = [0.0; 10];
            for (slot, (field, column)) in values.iter_mut().zip(&columns) {
                *slot = names::forcing_to_kernel_units(field.internal_name(), column[i]);
            }
            ForcingRecord::point(values)
        })
        .collect();
    Ok(records)
}
