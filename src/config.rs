//! TOML run configuration: loading, dotted-path overrides, and validation.
//!
//! A configuration file carries five groups:
//!
//! ```toml
//! [io]
//! forcing_path = "forcing.csv"
//! output_path = "output.csv"
//!
//! [z]
//! air_temp_m = 3.0
//! soil_temp_m = 0.5
//! wind_speed_m = 5.0
//!
//! [params]
//! elevation_m = 2101.0
//! roughness_length_m = 0.005
//!
//! [init]            # optional, zero snowpack when omitted
//! snow_depth_cm = 0
//!
//! [defaults]        # optional, backfilled key by key
//! max_h2o_vol_frac = 0.01
//! ```
//!
//! Keys that validation must be able to report as missing are optional at
//! the parser level; [`SnobalConfig::validate`] turns a parsed document
//! into a fully backfilled [`RunConfig`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub use crate::error::ConfigError;
use crate::names;
use crate::sim::timestep::OutputMode;
use crate::sim::types::{MeasurementHeights, RunParams};

/// Configuration document as parsed, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnobalConfig {
    /// Input and output locations.
    pub io: Option<IoConfig>,
    /// Instrument heights (m).
    pub z: Option<HeightsConfig>,
    /// Site parameters.
    pub params: Option<SiteConfig>,
    /// Initial snowpack state.
    pub init: Option<InitConfig>,
    /// Tunable run parameters.
    pub defaults: Option<DefaultsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    /// Forcing CSV, required by the command-line runner only.
    pub forcing_path: Option<PathBuf>,
    /// Output CSV destination.
    pub output_path: Option<PathBuf>,
    /// `"data"`, `"normal"` or `"all"`.
    pub output_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeightsConfig {
    pub air_temp_m: Option<f64>,
    pub soil_temp_m: Option<f64>,
    pub wind_speed_m: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub elevation_m: Option<f64>,
    pub roughness_length_m: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    pub snow_depth_cm: Option<f64>,
    #[serde(rename = "bulk_snow_density_kgm-3")]
    pub bulk_snow_density_kgm3: Option<f64>,
    #[serde(rename = "active_layer_temp_degC")]
    pub active_layer_temp_c: Option<f64>,
    #[serde(rename = "avg_snow_temp_degC")]
    pub avg_snow_temp_c: Option<f64>,
    #[serde(rename = "h2o_sat_%")]
    pub h2o_sat_pct: Option<f64>,
}

impl InitConfig {
    fn is_empty(&self) -> bool {
        self.snow_depth_cm.is_none()
            && self.bulk_snow_density_kgm3.is_none()
            && self.active_layer_temp_c.is_none()
            && self.avg_snow_temp_c.is_none()
            && self.h2o_sat_pct.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    pub relative_heights: Option<bool>,
    pub max_h2o_vol_frac: Option<f64>,
    pub max_active_layer_thickness_m: Option<f64>,
    #[serde(rename = "normal_tstep_mass_thresh_kgm-2")]
    pub normal_tstep_mass_thresh: Option<f64>,
    #[serde(rename = "medium_tstep_mass_thresh_kgm-2")]
    pub medium_tstep_mass_thresh: Option<f64>,
    #[serde(rename = "small_tstep_mass_thresh_kgm-2")]
    pub small_tstep_mass_thresh: Option<f64>,
    pub normal_tstep_min: Option<f64>,
    pub medium_tstep_min: Option<f64>,
    pub small_tstep_min: Option<f64>,
}

/// Initial snowpack in external units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialSnowpack {
    pub snow_depth_cm: f64,
    pub bulk_snow_density_kgm3: f64,
    pub active_layer_temp_c: f64,
    pub avg_snow_temp_c: f64,
    pub h2o_sat_pct: f64,
}

impl InitialSnowpack {
    /// Entries keyed by their external names.
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            (names::INIT_NAMES[0].0, self.snow_depth_cm),
            (names::INIT_NAMES[1].0, self.bulk_snow_density_kgm3),
            (names::INIT_NAMES[2].0, self.active_layer_temp_c),
            (names::INIT_NAMES[3].0, self.avg_snow_temp_c),
            (names::INIT_NAMES[4].0, self.h2o_sat_pct),
        ]
    }
}

/// Tunable run parameters with every key resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDefaults {
    pub relative_heights: bool,
    pub max_h2o_vol_frac: f64,
    pub max_active_layer_thickness_m: f64,
    pub normal_tstep_mass_thresh: f64,
    pub medium_tstep_mass_thresh: f64,
    pub small_tstep_mass_thresh: f64,
    pub normal_tstep_min: f64,
    pub medium_tstep_min: f64,
    pub small_tstep_min: f64,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            relative_heights: false,
            max_h2o_vol_frac: 0.01,
            max_active_layer_thickness_m: 0.25,
            normal_tstep_mass_thresh: 60.0,
            medium_tstep_mass_thresh: 10.0,
            small_tstep_mass_thresh: 1.0,
            normal_tstep_min: 60.0,
            medium_tstep_min: 15.0,
            small_tstep_min: 1.0,
        }
    }
}

impl DefaultsConfig {
    /// Fills every absent key from [`RunDefaults::default`].
    fn backfill(&self) -> RunDefaults {
        let d = RunDefaults::default();
        RunDefaults {
            relative_heights: self.relative_heights.unwrap_or(d.relative_heights),
            max_h2o_vol_frac: self.max_h2o_vol_frac.unwrap_or(d.max_h2o_vol_frac),
            max_active_layer_thickness_m: self
                .max_active_layer_thickness_m
                .unwrap_or(d.max_active_layer_thickness_m),
            normal_tstep_mass_thresh: self
                .normal_tstep_mass_thresh
                .unwrap_or(d.normal_tstep_mass_thresh),
            medium_tstep_mass_thresh: self
                .medium_tstep_mass_thresh
                .unwrap_or(d.medium_tstep_mass_thresh),
            small_tstep_mass_thresh: self
                .small_tstep_mass_thresh
                .unwrap_or(d.small_tstep_mass_thresh),
            normal_tstep_min: self.normal_tstep_min.unwrap_or(d.normal_tstep_min),
            medium_tstep_min: self.medium_tstep_min.unwrap_or(d.medium_tstep_min),
            small_tstep_min: self.small_tstep_min.unwrap_or(d.small_tstep_min),
        }
    }
}

/// Site parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub elevation_m: f64,
    pub roughness_length_m: f64,
}

/// Validated configuration with all optional groups backfilled.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub forcing_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub output_mode: OutputMode,
    pub heights: MeasurementHeights,
    pub site: Site,
    pub init: InitialSnowpack,
    pub defaults: RunDefaults,
}

impl RunConfig {
    /// Parameters forwarded to the kernel on every step.
    pub fn run_params(&self) -> RunParams {
        RunParams {
            relative_heights: self.defaults.relative_heights,
            max_h2o_vol: self.defaults.max_h2o_vol_frac,
            max_z_s_0: self.defaults.max_active_layer_thickness_m,
        }
    }
}

fn missing(field: &str, example: &str) -> ConfigError {
    ConfigError::new(field, format!("must be provided, e.g. {example}"))
}

impl SnobalConfig {
    /// Reads a TOML file and applies `key=value` overrides before parsing.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read, is not valid
    /// TOML, an override is rejected, or the document has unknown fields.
    pub fn load(path: &Path, overrides: &[String]) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        let mut table = parse_table(&content)?;
        apply_overrides(&mut table, overrides)?;
        Self::from_table(table)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Self::from_table(parse_table(s)?)
    }

    /// Converts an already loaded (and possibly overridden) table.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` on unknown fields or mistyped values.
    pub fn from_table(table: toml::Table) -> Result<Self, ConfigError> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::new("toml", e.message().to_string()))
    }

    /// `io.forcing_path`, read without validating anything else.
    pub fn forcing_path(&self) -> Option<&Path> {
        self.io.as_ref()?.forcing_path.as_deref()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.io.as_ref()?.output_path.as_deref()
    }

    /// Checks required groups and keys, then backfills optional groups.
    ///
    /// Rules apply in order and the first violation is returned: `io`,
    /// `z` and `params` exist; `io.output_path` is set; every instrument
    /// height is set and non-negative; elevation and roughness length are
    /// set. A missing or empty `init` becomes the zero snowpack; missing
    /// `defaults` keys take their documented values, and every timestep
    /// length must then be positive.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the offending key.
    pub fn validate(self) -> Result<RunConfig, ConfigError> {
        let io = self
            .io
            .ok_or_else(|| ConfigError::new("io", "config must contain an [io] table"))?;
        let z = self
            .z
            .ok_or_else(|| ConfigError::new("z", "config must contain a [z] table"))?;
        let params = self
            .params
            .ok_or_else(|| ConfigError::new("params", "config must contain a [params] table"))?;

        let output_path = io
            .output_path
            .ok_or_else(|| missing("io.output_path", "output_path = \"output.csv\""))?;

        let air_temp_m = height(z.air_temp_m, "z.air_temp_m")?;
        let soil_temp_m = height(z.soil_temp_m, "z.soil_temp_m")?;
        let wind_speed_m = height(z.wind_speed_m, "z.wind_speed_m")?;

        let elevation_m = params
            .elevation_m
            .ok_or_else(|| missing("params.elevation_m", "elevation_m = 2000.0"))?;
        let roughness_length_m = params
            .roughness_length_m
            .ok_or_else(|| missing("params.roughness_length_m", "roughness_length_m = 0.005"))?;

        let init = match self.init {
            Some(init) if !init.is_empty() => InitialSnowpack {
                snow_depth_cm: init.snow_depth_cm.unwrap_or_default(),
                bulk_snow_density_kgm3: init.bulk_snow_density_kgm3.unwrap_or_default(),
                active_layer_temp_c: init.active_layer_temp_c.unwrap_or_default(),
                avg_snow_temp_c: init.avg_snow_temp_c.unwrap_or_default(),
                h2o_sat_pct: init.h2o_sat_pct.unwrap_or_default(),
            },
            _ => InitialSnowpack::default(),
        };

        let defaults = match self.defaults {
            Some(d) => d.backfill(),
            None => RunDefaults::default(),
        };
        for (field, minutes) in [
            ("defaults.normal_tstep_min", defaults.normal_tstep_min),
            ("defaults.medium_tstep_min", defaults.medium_tstep_min),
            ("defaults.small_tstep_min", defaults.small_tstep_min),
        ] {
            if !(minutes > 0.0) {
                return Err(ConfigError::new(field, format!("must be > 0, got {minutes}")));
            }
        }

        Ok(RunConfig {
            forcing_path: io.forcing_path,
            output_path,
            output_mode: io
                .output_mode
                .as_deref()
                .map(OutputMode::from_config)
                .unwrap_or_default(),
            heights: MeasurementHeights {
                z_t: air_temp_m,
                z_g: soil_temp_m,
                z_u: wind_speed_m,
            },
            site: Site {
                elevation_m,
                roughness_length_m,
            },
            init,
            defaults,
        })
    }
}

fn height(value: Option<f64>, field: &str) -> Result<f64, ConfigError> {
    let h = value.ok_or_else(|| missing(field, "<instrument height in meters>"))?;
    if !(h >= 0.0) {
        return Err(ConfigError::new(field, format!("must be >= 0, got {h}")));
    }
    Ok(h)
}

fn parse_table(s: &str) -> Result<toml::Table, ConfigError> {
    s.parse::<toml::Table>()
        .map_err(|e| ConfigError::new("toml", e.message().to_string()))
}

/// Applies `dotted.path=value` overrides to a loaded configuration table.
///
/// Every intermediate key must already name a table and the leaf key must
/// already exist; overrides never create keys. Values are read as literals
/// (see [`parse_literal`]).
///
/// # Errors
///
/// Returns a `ConfigError` for a missing `=` or a path that does not exist.
pub fn apply_overrides(table: &mut toml::Table, overrides: &[String]) -> Result<(), ConfigError> {
    for raw in overrides {
        let (key, value) = raw.split_once('=').ok_or_else(|| {
            ConfigError::new(raw.as_str(), "invalid override, expected key=value")
        })?;
        let key = key.trim();
        let path: Vec<&str> = key.split('.').collect();
        let Some((leaf, parents)) = path.split_last() else {
            return Err(ConfigError::new(key, "invalid override, empty key"));
        };

        let mut current = &mut *table;
        for segment in parents {
            current = current
                .get_mut(*segment)
                .and_then(toml::Value::as_table_mut)
                .ok_or_else(|| ConfigError::new(key, "parameter not accepted in config"))?;
        }

        let Some(slot) = current.get_mut(*leaf) else {
            return Err(ConfigError::new(key, "parameter not accepted in config"));
        };
        *slot = parse_literal(value);
    }
    Ok(())
}

/// Reads an override value as a boolean, integer, float, or string, in that
/// order. Quoted strings have their quotes removed. Nothing is evaluated.
pub fn parse_literal(raw: &str) -> toml::Value {
    let s = raw.trim();
    match s {
        "true" | "True" => return toml::Value::Boolean(true),
        "false" | "False" => return toml::Value::Boolean(false),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            return toml::Value::Float(f);
        }
    }
    let unquoted = s
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(s);
    toml::Value::String(unquoted.to_string())
}
