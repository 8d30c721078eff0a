//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use snobal_sim::config::SnobalConfig;
use snobal_sim::forcing::{ForcingField, ForcingTable};

/// Minimal valid configuration: 30 cm of settled snow at 2000 m.
pub const BASE_CONFIG: &str = r#"
[io]
forcing_path = "forcing.csv"
output_path = "output.csv"

[z]
air_temp_m = 3.0
soil_temp_m = 0.5
wind_speed_m = 5.0

[params]
elevation_m = 2000.0
roughness_length_m = 0.005

[init]
snow_depth_cm = 30.0
"bulk_snow_density_kgm-3" = 250.0
active_layer_temp_degC = -3.0
avg_snow_temp_degC = -3.0
"h2o_sat_%" = 0.0
"#;

pub fn default_config() -> SnobalConfig {
    SnobalConfig::from_toml_str(BASE_CONFIG).expect("base config should parse")
}

/// `n` hourly timestamps starting at 2024-01-01 00:00.
pub fn hourly_timestamps(n: usize) -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid start");
    (0..n).map(|i| start + Duration::hours(i as i64)).collect()
}

/// Seeded cold-winter forcing with a light snowfall in the afternoon.
///
/// Air stays between -8 and -2 degC and wind above 1 m/s, so the kernel
/// never sees degenerate turbulence inputs.
pub fn default_forcing(n: usize, seed: u64) -> ForcingTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let timestamps = hourly_timestamps(n);
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n); ForcingField::ALL.len()];

    for hour in 0..n {
        let hour_of_day = hour % 24;
        let daylight = (6..18).contains(&hour_of_day);
        let snowing = (14..17).contains(&hour_of_day);
        let t_a: f64 = rng.random_range(-8.0..-2.0);
        let row = [
            if daylight { rng.random_range(20.0..150.0) } else { 0.0 },
            rng.random_range(200.0..280.0),
            t_a,
            rng.random_range(-1.0..0.0),
            rng.random_range(200.0..300.0),
            rng.random_range(1.0..5.0),
            if snowing { rng.random_range(0.5..2.0) } else { 0.0 },
            t_a,
            if snowing { 1.0 } else { 0.0 },
            if snowing { rng.random_range(80.0..120.0) } else { 0.0 },
        ];
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }

    let mut table = ForcingTable::new(timestamps);
    for (field, values) in ForcingField::ALL.iter().zip(columns) {
        table.insert_column(field.external_name(), values);
    }
    table
}

/// Serializes a forcing table the way forcing files are laid out.
pub fn forcing_csv(table: &ForcingTable) -> String {
    let mut out = String::from("date_time");
    for field in ForcingField::ALL {
        out.push(',');
        out.push_str(field.external_name());
    }
    out.push('\n');
    for (i, ts) in table.timestamps.iter().enumerate() {
        write!(out, "{}", ts.format("%Y-%m-%d %H:%M:%S")).expect("write to string");
        for field in ForcingField::ALL {
            let column = table.column(field.external_name()).expect("column present");
            write!(out, ",{}", column[i]).expect("write to string");
        }
        out.push('\n');
    }
    out
}

/// Fresh per-test scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("snobal-sim-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}
