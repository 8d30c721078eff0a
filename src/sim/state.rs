//! Simulation state: one value per grid cell for every kernel field.

use std::ops::{Index, IndexMut};

use crate::config::RunConfig;
use crate::names;

/// Fields of the simulation state, named as the kernel names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateField {
    Rho,
    TS0,
    TSL,
    TS,
    CcS0,
    CcSL,
    CcS,
    MS,
    MS0,
    MSL,
    ZS,
    ZS0,
    ZSL,
    H2oSat,
    LayerCount,
    H2o,
    H2oMax,
    H2oVol,
    H2oTotal,
    RNBar,
    HBar,
    LVEBar,
    GBar,
    G0Bar,
    MBar,
    DeltaQBar,
    DeltaQ0Bar,
    ESSum,
    MeltSum,
    RoPredSum,
    CurrentTime,
    TimeSinceOut,
    Elevation,
    Mask,
    Z0,
}

impl StateField {
    pub const COUNT: usize = 35;

    pub const ALL: [StateField; Self::COUNT] = [
        StateField::Rho,
        StateField::TS0,
        StateField::TSL,
        StateField::TS,
        StateField::CcS0,
        StateField::CcSL,
        StateField::CcS,
        StateField::MS,
        StateField::MS0,
        StateField::MSL,
        StateField::ZS,
        StateField::ZS0,
        StateField::ZSL,
        StateField::H2oSat,
        StateField::LayerCount,
        StateField::H2o,
        StateField::H2oMax,
        StateField::H2oVol,
        StateField::H2oTotal,
        StateField::RNBar,
        StateField::HBar,
        StateField::LVEBar,
        StateField::GBar,
        StateField::G0Bar,
        StateField::MBar,
        StateField::DeltaQBar,
        StateField::DeltaQ0Bar,
        StateField::ESSum,
        StateField::MeltSum,
        StateField::RoPredSum,
        StateField::CurrentTime,
        StateField::TimeSinceOut,
        StateField::Elevation,
        StateField::Mask,
        StateField::Z0,
    ];

    /// Kernel name of the field.
    pub fn internal_name(self) -> &'static str {
        match self {
            StateField::Elevation => "elevation",
            StateField::Mask => "mask",
            StateField::Z0 => "z_0",
            // the first 32 fields follow the output name table
            other => names::OUTPUT_NAMES[other as usize].0,
        }
    }

    pub fn from_internal_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.internal_name() == name)
    }
}

/// Every state field for a single grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    values: [f64; StateField::COUNT],
}

impl Default for CellState {
    fn default() -> Self {
        Self {
            values: [0.0; StateField::COUNT],
        }
    }
}

impl Index<StateField> for CellState {
    type Output = f64;

    fn index(&self, field: StateField) -> &f64 {
        &self.values[field as usize]
    }
}

impl IndexMut<StateField> for CellState {
    fn index_mut(&mut self, field: StateField) -> &mut f64 {
        &mut self.values[field as usize]
    }
}

/// Mutable state of a run, stored field-major over `cells` grid cells.
#[derive(Debug, Clone, PartialEq)]
pub struct SnowState {
    cells: usize,
    fields: Vec<Vec<f64>>,
}

impl SnowState {
    /// Zero-filled state over `cells` grid cells.
    pub fn zeros(cells: usize) -> Self {
        Self {
            cells,
            fields: vec![vec![0.0; cells]; StateField::COUNT],
        }
    }

    pub fn cells(&self) -> usize {
        self.cells
    }

    pub fn get(&self, field: StateField, cell: usize) -> f64 {
        self.fields[field as usize][cell]
    }

    pub fn set(&mut self, field: StateField, cell: usize, value: f64) {
        self.fields[field as usize][cell] = value;
    }

    /// All cells of one field.
    pub fn field(&self, field: StateField) -> &[f64] {
        &self.fields[field as usize]
    }

    /// Sets one field to the same value in every cell.
    pub fn fill(&mut self, field: StateField, value: f64) {
        self.fields[field as usize].fill(value);
    }

    /// Whether the kernel should advance this cell.
    pub fn is_active(&self, cell: usize) -> bool {
        self.get(StateField::Mask, cell) != 0.0
    }

    /// Copies out every field of one cell.
    pub fn cell(&self, cell: usize) -> CellState {
        let mut out = CellState::default();
        for field in StateField::ALL {
            out[field] = self.get(field, cell);
        }
        out
    }

    /// Writes every field of one cell back.
    pub fn store(&mut self, cell: usize, values: &CellState) {
        for field in StateField::ALL {
            self.set(field, cell, values[field]);
        }
    }
}

/// Builds the initial state of a single-site run.
///
/// Every field starts at zero; site parameters and the five initial
/// snowpack values (translated to kernel names and units) are written on
/// top. `current_time` and `time_since_out` stay at zero.
pub fn init_state(config: &RunConfig) -> SnowState {
    let mut state = SnowState::zeros(1);
    state.fill(StateField::Elevation, config.site.elevation_m);
    state.fill(StateField::Z0, config.site.roughness_length_m);
    state.fill(StateField::Mask, 1.0);

    for (external, value) in config.init.entries() {
        let field = names::translate_init(external, value)
            .and_then(|(internal, v)| StateField::from_internal_name(internal).map(|f| (f, v)));
        if let Some((field, v)) = field {
            state.fill(field, v);
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnobalConfig;

    fn config(init: &str) -> RunConfig {
        let toml = format!(
            r#"
[io]
output_path = "out.csv"
[z]
air_temp_m = 3.0
soil_temp_m = 0.5
wind_speed_m = 5.0
[params]
elevation_m = 2000.0
roughness_length_m = 0.01
{init}
"#
        );
        SnobalConfig::from_toml_str(&toml)
            .and_then(SnobalConfig::validate)
            .expect("valid config")
    }

    #[test]
    fn field_names_follow_output_table() {
        for (i, (internal, _)) in names::OUTPUT_NAMES.iter().enumerate() {
            assert_eq!(StateField::ALL[i].internal_name(), *internal);
        }
        assert_eq!(StateField::from_internal_name("z_0"), Some(StateField::Z0));
        assert_eq!(StateField::from_internal_name("S_n"), None);
    }

    #[test]
    fn omitted_init_gives_zero_snowpack() {
        let state = init_state(&config(""));
        assert_eq!(state.cells(), 1);
        assert_eq!(state.get(StateField::ZS, 0), 0.0);
        assert_eq!(state.get(StateField::Rho, 0), 0.0);
        assert_eq!(state.get(StateField::H2oSat, 0), 0.0);
        // zero degrees Celsius in kernel units
        assert_eq!(state.get(StateField::TS, 0), names::C_TO_K);
        assert_eq!(state.get(StateField::TS0, 0), names::C_TO_K);
        assert_eq!(state.get(StateField::CurrentTime, 0), 0.0);
        assert_eq!(state.get(StateField::TimeSinceOut, 0), 0.0);
    }

    #[test]
    fn init_values_are_translated() {
        let state = init_state(&config(
            "[init]\nsnow_depth_cm = 120\n\"bulk_snow_density_kgm-3\" = 300\navg_snow_temp_degC = -4\n",
        ));
        assert!((state.get(StateField::ZS, 0) - 1.2).abs() < 1e-12);
        assert_eq!(state.get(StateField::Rho, 0), 300.0);
        assert!((state.get(StateField::TS, 0) - (names::C_TO_K - 4.0)).abs() < 1e-12);
    }

    #[test]
    fn saturation_percent_becomes_fraction() {
        let state = init_state(&config("[init]\nsnow_depth_cm = 30\n\"h2o_sat_%\" = 50\n"));
        assert_eq!(state.get(StateField::H2oSat, 0), 0.5);
    }

    #[test]
    fn site_fields_are_set() {
        let state = init_state(&config(""));
        assert_eq!(state.get(StateField::Elevation, 0), 2000.0);
        assert_eq!(state.get(StateField::Z0, 0), 0.01);
        assert!(state.is_active(0));
        assert_eq!(state.get(StateField::RNBar, 0), 0.0);
    }

    #[test]
    fn cell_copy_round_trips() {
        let mut state = SnowState::zeros(3);
        state.set(StateField::MS, 2, 42.0);
        let mut cell = state.cell(2);
        assert_eq!(cell[StateField::MS], 42.0);
        cell[StateField::H2o] = 1.5;
        state.store(2, &cell);
        assert_eq!(state.get(StateField::H2o, 2), 1.5);
        assert_eq!(state.field(StateField::H2o), &[0.0, 0.0, 1.5]);
    }
}
