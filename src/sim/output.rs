//! Output accumulation: one externally named row per completed data interval.

use chrono::NaiveDateTime;

use crate::names::{self, ENERGY_BALANCE_OUTPUT, SNOWPACK_OUTPUT};

use super::state::{SnowState, StateField};

/// Cell whose values are written to the output table.
const OUTPUT_CELL: usize = 0;

/// Name of the timestamp column.
pub const DATETIME_COLUMN: &str = "Datetime";

/// Time-ordered output with a fixed column set.
///
/// Columns are created once and always grow together, one row per
/// [`OutputTable::append`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    datetime: Vec<NaiveDateTime>,
    columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    field: StateField,
    name: &'static str,
    values: Vec<f64>,
}

impl Default for OutputTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputTable {
    /// Empty table holding the energy-balance then the snowpack columns.
    pub fn new() -> Self {
        let columns = ENERGY_BALANCE_OUTPUT
            .iter()
            .chain(SNOWPACK_OUTPUT.iter())
            .filter_map(|internal| {
                let field = StateField::from_internal_name(internal)?;
                let name = names::output_name(internal)?;
                Some(Column {
                    field,
                    name,
                    values: Vec::new(),
                })
            })
            .collect();
        Self {
            datetime: Vec::new(),
            columns,
        }
    }

    /// Empty table with room for `rows` rows.
    pub fn with_capacity(rows: usize) -> Self {
        let mut table = Self::new();
        table.datetime.reserve(rows);
        for column in &mut table.columns {
            column.values.reserve(rows);
        }
        table
    }

    /// Appends one row read from `state`, converting names and units.
    pub fn append(&mut self, timestamp: NaiveDateTime, state: &SnowState) {
        self.datetime.push(timestamp);
        for column in &mut self.columns {
            let internal = column.field.internal_name();
            let raw = state.get(column.field, OUTPUT_CELL);
            let value = names::translate_output(internal, raw).map_or(raw, |(_, v)| v);
            column.values.push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.datetime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datetime.is_empty()
    }

    pub fn datetime(&self) -> &[NaiveDateTime] {
        &self.datetime
    }

    /// External names of the value columns, in order.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    /// Values of a column looked up by its external name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Values of row `row`, in column order.
    pub fn row(&self, row: usize) -> impl Iterator<Item = f64> + '_ {
        self.columns.iter().map(move |c| c.values[row])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 19)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .expect("valid time")
    }

    #[test]
    fn column_set_is_fixed() {
        let table = OutputTable::new();
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names.len(), 26);
        assert_eq!(names[0], "net_radiation_Wm-2");
        assert_eq!(names[8], "density_snow_kgm-3");
        assert_eq!(names[25], "surface_Water_input_kg");
        assert!(table.is_empty());
    }

    #[test]
    fn append_grows_columns_in_lockstep() {
        let mut table = OutputTable::new();
        let state = SnowState::zeros(1);
        table.append(ts(0), &state);
        table.append(ts(1), &state);
        assert_eq!(table.len(), 2);
        for name in table.column_names() {
            assert_eq!(table.column(name).map(<[f64]>::len), Some(2));
        }
        assert_eq!(table.datetime(), &[ts(0), ts(1)]);
    }

    #[test]
    fn temperatures_are_written_in_celsius() {
        let mut state = SnowState::zeros(1);
        state.set(StateField::TS0, 0, names::C_TO_K - 2.5);
        state.set(StateField::Rho, 0, 310.0);
        let mut table = OutputTable::new();
        table.append(ts(0), &state);

        let t = table.column("temp_active_layer_degC").expect("column");
        assert!((t[0] + 2.5).abs() < 1e-9);
        assert_eq!(table.column("density_snow_kgm-3"), Some(&[310.0][..]));
    }

    #[test]
    fn reads_first_cell() {
        let mut state = SnowState::zeros(2);
        state.set(StateField::MS, 0, 10.0);
        state.set(StateField::MS, 1, 99.0);
        let mut table = OutputTable::new();
        table.append(ts(0), &state);
        assert_eq!(table.column("specific_mass_snow_kgm-2"), Some(&[10.0][..]));
    }
}
