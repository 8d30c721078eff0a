//! Fixed name tables between the external (unit-suffixed) schema and the
//! field names the integration kernel works with, plus the temperature
//! conversions that go with them.
//!
//! The tables are process-wide constants. Each is injective over its
//! domain, so every lookup has a unique inverse.

/// Offset between Celsius and the kernel's Kelvin convention.
pub const C_TO_K: f64 = 273.16;

/// Centimetres per metre, for the initial snow depth.
const CM_PER_M: f64 = 100.0;

/// Percent per unit fraction, for the initial liquid water saturation.
const PERCENT: f64 = 100.0;

/// Substring marking an external output name as a temperature.
const TEMPERATURE_MARKER: &str = "temp";

/// Forcing columns, external name to kernel name.
pub const FORCING_NAMES: [(&str, &str); 10] = [
    ("net_solar_Wm-2", "S_n"),
    ("downwelling_thermal_Wm-2", "I_lw"),
    ("temp_air_degC", "T_a"),
    ("temp_ground_degC", "T_g"),
    ("vapor_pressure_Pa", "e_a"),
    ("wind_speed_ms-1", "u"),
    ("precip_mass_mm", "m_pp"),
    ("precip_temp_degC", "T_pp"),
    ("snow_precip_fraction", "percent_snow"),
    ("snow_precip_density_kgm-3", "rho_snow"),
];

/// Forcing fields delivered in Celsius and converted to Kelvin on input.
pub const FORCING_TEMPERATURES: [&str; 3] = ["T_a", "T_g", "T_pp"];

/// Initial snowpack keys, external name to state field.
pub const INIT_NAMES: [(&str, &str); 5] = [
    ("snow_depth_cm", "z_s"),
    ("bulk_snow_density_kgm-3", "rho"),
    ("active_layer_temp_degC", "T_s_0"),
    ("avg_snow_temp_degC", "T_s"),
    ("h2o_sat_%", "h2o_sat"),
];

/// State fields, kernel name to external output name.
pub const OUTPUT_NAMES: [(&str, &str); 32] = [
    ("rho", "density_snow_kgm-3"),
    ("T_s_0", "temp_active_layer_degC"),
    ("T_s_l", "temp_lower_layer_degC"),
    ("T_s", "temp_snow_degC"),
    ("cc_s_0", "coldcontent_active_layer_Jm-2"),
    ("cc_s_l", "coldcontent_lower_layer_Jm-2"),
    ("cc_s", "coldcontent_snow_Jm-2"),
    ("m_s", "specific_mass_snow_kgm-2"),
    ("m_s_0", "specific_mass_active_layer_kgm-2"),
    ("m_s_l", "specific_mass_lower_layer_kgm-2"),
    ("z_s", "thickness_snow_m"),
    ("z_s_0", "thickness_active_layer_m"),
    ("z_s_l", "thickness_lower_layer_m"),
    ("h2o_sat", "h2o_sat_%"),
    ("layer_count", "layer_count"),
    ("h2o", "liquid_h2o_kgm-2"),
    ("h2o_max", "max_h2o_kgm-2"),
    ("h2o_vol", "h2o_vol_frac"),
    ("h2o_total", "total_h2o_kgm-2"),
    ("R_n_bar", "net_radiation_Wm-2"),
    ("H_bar", "sensible_heat_flux_Wm-2"),
    ("L_v_E_bar", "latent_heat_flux_Wm-2"),
    ("G_bar", "ground_heat_flux_Wm-2"),
    ("G_0_bar", "inter_layer_heat_flux_Wm-2"),
    ("M_bar", "advective_heat_flux_Wm-2"),
    ("delta_Q_bar", "delta_snow_energy_Wm-2"),
    ("delta_Q_0_bar", "delta_active_layer_energy_Wm-2"),
    ("E_s_sum", "evap_kgm-2"),
    ("melt_sum", "snowmelt_kgm-2"),
    ("ro_pred_sum", "surface_Water_input_kg"),
    ("current_time", "current_time"),
    ("time_since_out", "time_since_out"),
];

/// Energy-balance fields emitted on every output row, in column order.
pub const ENERGY_BALANCE_OUTPUT: [&str; 8] = [
    "R_n_bar",
    "H_bar",
    "L_v_E_bar",
    "M_bar",
    "G_bar",
    "G_0_bar",
    "delta_Q_bar",
    "delta_Q_0_bar",
];

/// Snowpack fields emitted on every output row, in column order.
pub const SNOWPACK_OUTPUT: [&str; 18] = [
    "rho",
    "T_s",
    "T_s_0",
    "T_s_l",
    "z_s",
    "z_s_0",
    "z_s_l",
    "cc_s",
    "cc_s_0",
    "cc_s_l",
    "m_s",
    "m_s_0",
    "m_s_l",
    "h2o",
    "h2o_sat",
    "E_s_sum",
    "melt_sum",
    "ro_pred_sum",
];

fn lookup<'a>(table: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn reverse_lookup<'a>(table: &[(&'a str, &'a str)], value: &str) -> Option<&'a str> {
    table.iter().find(|(_, v)| *v == value).map(|(k, _)| *k)
}

/// Kernel name for an external forcing column.
pub fn forcing_internal_name(external: &str) -> Option<&'static str> {
    lookup(&FORCING_NAMES, external)
}

/// External column name for a kernel forcing field.
pub fn forcing_external_name(internal: &str) -> Option<&'static str> {
    reverse_lookup(&FORCING_NAMES, internal)
}

/// External output name for a state field.
pub fn output_name(internal: &str) -> Option<&'static str> {
    lookup(&OUTPUT_NAMES, internal)
}

/// State field behind an external output name.
pub fn output_internal_name(external: &str) -> Option<&'static str> {
    reverse_lookup(&OUTPUT_NAMES, external)
}

/// Converts a kernel forcing value to Kelvin when the field is a temperature.
pub fn forcing_to_kernel_units(internal: &str, value: f64) -> f64 {
    if FORCING_TEMPERATURES.contains(&internal) {
        value + C_TO_K
    } else {
        value
    }
}

/// Translates a state value to its external name and unit.
///
/// Temperature outputs (external name containing `temp`) are converted
/// from Kelvin back to Celsius; everything else passes through.
pub fn translate_output(internal: &str, value: f64) -> Option<(&'static str, f64)> {
    let external = output_name(internal)?;
    if external.contains(TEMPERATURE_MARKER) {
        Some((external, value - C_TO_K))
    } else {
        Some((external, value))
    }
}

/// Translates an initial-snowpack entry to its state field and kernel unit.
pub fn translate_init(external: &str, value: f64) -> Option<(&'static str, f64)> {
    let internal = lookup(&INIT_NAMES, external)?;
    let value = match internal {
        "z_s" => value / CM_PER_M,
        "T_s_0" | "T_s" => value + C_TO_K,
        "h2o_sat" => value / PERCENT,
        _ => value,
    };
    Some((internal, value))
}
