//! Physical constants used by the point kernel (SI units).

pub const FREEZE: f64 = 273.16; // Freezing point of water (K)
pub const BOIL: f64 = 373.15; // Boiling point of water at sea level (K)
pub const SEA_LEVEL: f64 = 1.013246e5; // Standard sea-level pressure (Pa)
pub const STD_AIRTMP: f64 = 288.0; // Standard sea-level air temperature (K)
pub const STD_LAPSE: f64 = -6.5; // Standard lapse rate (K/km)
pub const GRAVITY: f64 = 9.80665; // Acceleration due to gravity (m/s^2)
pub const MOL_AIR: f64 = 28.9644; // Molecular weight of dry air (kg/kmol)
pub const MOL_H2O: f64 = 18.0153; // Molecular weight of water vapour (kg/kmol)
pub const RGAS: f64 = 8.31432e3; // Universal gas constant (J/kmol/K)
pub const CP_AIR: f64 = 1.005e3; // Specific heat of dry air (J/kg/K)
pub const CP_WATER: f64 = 4.1868e3; // Specific heat of liquid water (J/kg/K)
pub const CP_ICE: f64 = 2.1e3; // Specific heat of ice (J/kg/K)
pub const VON_KARMAN: f64 = 0.41; // Von Karman constant
pub const STEF_BOLTZ: f64 = 5.67e-8; // Stefan-Boltzmann constant (W/m^2/K^4)
pub const SNOW_EMISSIVITY: f64 = 0.98; // Longwave emissivity of snow
pub const RHO_W0: f64 = 1.0e3; // Density of liquid water (kg/m^3)
pub const RHO_ICE: f64 = 917.0; // Density of ice (kg/m^3)
pub const HCON_ICE: f64 = 2.24; // Thermal conductivity of ice (W/m/K)
pub const HCON_GROUND: f64 = 1.57; // Thermal conductivity of wet sandy soil (W/m/K)

/// Dry adiabatic lapse rate (K/m).
pub const DALR: f64 = GRAVITY / CP_AIR;

/// Ratio of the molecular weights of water vapour and dry air.
const EPSILON: f64 = MOL_H2O / MOL_AIR;

/// Latent heat of vaporization at `t` (J/kg).
pub fn lh_vap(t: f64) -> f64 {
    2.5e6 - 2.95573e3 * (t - FREEZE)
}

/// Latent heat of fusion at `t` (J/kg).
pub fn lh_fus(t: f64) -> f64 {
    3.336e5 + 1.6667e2 * (FREEZE - t)
}

/// Hydrostatic pressure at height `h_km` above a base of pressure `pb` (Pa)
/// and temperature `tb` (K) with lapse rate `lapse` (K/km).
pub fn hystat(pb: f64, tb: f64, lapse: f64, h_km: f64, g: f64, m: f64) -> f64 {
    if lapse == 0.0 {
        pb * (-g * m * h_km * 1.0e3 / (RGAS * tb)).exp()
    } else {
        pb * (tb / (tb + lapse * h_km)).powf(g * m / (RGAS * lapse * 1.0e-3))
    }
}

/// Standard-atmosphere air pressure at `elevation_m` (Pa).
pub fn air_pressure(elevation_m: f64) -> f64 {
    hystat(SEA_LEVEL, STD_AIRTMP, STD_LAPSE, elevation_m / 1.0e3, GRAVITY, MOL_AIR)
}

/// Specific humidity from vapour pressure `e` and air pressure `p`.
pub fn spec_hum(e: f64, p: f64) -> f64 {
    EPSILON * e / (p - (1.0 - EPSILON) * e)
}

/// Virtual temperature of air at `t` with vapour pressure `e` and pressure `p`.
pub fn vir_temp(t: f64, e: f64, p: f64) -> f64 {
    t / (1.0 - (1.0 - EPSILON) * (e / p))
}

/// Gas density (kg/m^3) at pressure `p`, molecular weight `m`, temperature `t`.
pub fn gas_den(p: f64, m: f64, t: f64) -> f64 {
    p * m / (RGAS * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sea_level_pressure_at_zero_elevation() {
        assert!((air_pressure(0.0) - SEA_LEVEL).abs() < 1e-6);
    }

    #[test]
    fn pressure_drops_with_elevation() {
        let p = air_pressure(2000.0);
        assert!(p < SEA_LEVEL);
        assert!((p - 79_500.0).abs() < 500.0, "got {p}");
    }

    #[test]
    fn latent_heats_at_freezing() {
        assert_eq!(lh_vap(FREEZE), 2.5e6);
        assert_eq!(lh_fus(FREEZE), 3.336e5);
    }

    #[test]
    fn dry_air_density_near_sea_level() {
        let rho = gas_den(SEA_LEVEL, MOL_AIR, 288.0);
        assert!((rho - 1.225).abs() < 0.01);
    }
}
