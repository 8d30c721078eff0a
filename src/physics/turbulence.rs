//! Bulk turbulent transfer of sensible and latent heat at one height.
//!
//! Monin-Obukhov similarity following Brutsaert (1982), *Evaporation into
//! the Atmosphere*, chapter 4. The stability length is found by fixed-point
//! iteration starting from neutral conditions.

use std::f64::consts::FRAC_PI_2;

use super::PhysicsError;
use super::constants::{
    CP_AIR, DALR, FREEZE, GRAVITY, MOL_AIR, VON_KARMAN, gas_den, lh_fus, lh_vap, spec_hum,
    vir_temp,
};
use super::vapor::{sati, satw};

const AH: f64 = 1.0; // ratio sensible/momentum phi function
const AV: f64 = 1.0; // ratio latent/momentum phi function
const MAX_ITERATIONS: usize = 50;
const PAESCHKE: f64 = 7.35; // displacement height factor (eq. 5.3)
const THRESH: f64 = 1.0e-5;
const BETA_S: f64 = 5.2;
const BETA_U: f64 = 16.0;
/// Tolerance (Pa) on vapour pressures above saturation.
const SATURATION_TOLERANCE: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flux {
    Momentum,
    Heat,
}

/// Stability correction (eq. 4.92) for `zeta = z / L`.
fn psi(zeta: f64, flux: Flux) -> f64 {
    if zeta > 0.0 {
        -BETA_S * zeta.min(1.0)
    } else if zeta < 0.0 {
        let x = (1.0 - BETA_U * zeta).sqrt().sqrt();
        match flux {
            Flux::Momentum => {
                2.0 * ((1.0 + x) / 2.0).ln() + ((1.0 + x * x) / 2.0).ln() - 2.0 * x.atan()
                    + FRAC_PI_2
            }
            Flux::Heat => 2.0 * ((1.0 + x * x) / 2.0).ln(),
        }
    } else {
        0.0
    }
}

/// Inputs to [`hle1`]; heights are above the surface.
#[derive(Debug, Clone, Copy)]
pub struct TurbulenceInput {
    /// Air pressure (Pa).
    pub press: f64,
    /// Air temperature at `za` (K).
    pub ta: f64,
    /// Surface temperature (K).
    pub ts: f64,
    /// Height of the air temperature measurement (m).
    pub za: f64,
    /// Vapour pressure at `zq` (Pa).
    pub ea: f64,
    /// Vapour pressure at the surface (Pa).
    pub es: f64,
    /// Height of the humidity measurement (m).
    pub zq: f64,
    /// Wind speed at `zu` (m/s).
    pub u: f64,
    /// Height of the wind measurement (m).
    pub zu: f64,
    /// Roughness length (m).
    pub z0: f64,
}

/// Turbulent fluxes, positive toward the surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurbulentFlux {
    /// Sensible heat (W/m^2).
    pub h: f64,
    /// Latent heat (W/m^2).
    pub le: f64,
    /// Mass flux (kg/m^2/s).
    pub e: f64,
}

/// Sensible and latent heat flux from measurements at one height.
///
/// # Errors
///
/// `Heights`, `Temperature`, `Pressure` or `Supersaturated` for invalid
/// inputs, `NoConvergence` when the stability iteration does not settle.
pub fn hle1(input: &TurbulenceInput) -> Result<TurbulentFlux, PhysicsError> {
    let TurbulenceInput {
        press,
        ta,
        ts,
        za,
        ea,
        es,
        zq,
        u,
        zu,
        z0,
    } = *input;

    if z0 <= 0.0 || zq <= z0 || zu <= z0 || za <= z0 {
        return Err(PhysicsError::Heights { z0, za, zu });
    }
    if ta <= 0.0 || ts <= 0.0 {
        return Err(PhysicsError::Temperature(ta.min(ts)));
    }
    if ea <= 0.0 || es <= 0.0 || press <= 0.0 || ea >= press || es >= press {
        return Err(PhysicsError::Pressure { ea, es, press });
    }

    let es_sat = sati(ts)?;
    let ea_sat = satw(ta)?;
    if es - SATURATION_TOLERANCE > es_sat || ea - SATURATION_TOLERANCE > ea_sat {
        return Err(PhysicsError::Supersaturated { ea, es });
    }
    let es = es.min(es_sat);
    let ea = ea.min(ea_sat);

    let d0 = 2.0 * PAESCHKE * z0 / 3.0;
    let ltsm = ((zu - d0) / z0).ln();
    let ltsh = ((za - d0) / z0).ln();
    let ltsv = ((zq - d0) / z0).ln();

    let qa = spec_hum(ea, press);
    let qs = spec_hum(es, press);

    // potential temperature
    let ta = ta + DALR * za;

    let dens = gas_den(press, MOL_AIR, vir_temp((ta * ts).sqrt(), (ea * es).sqrt(), press));

    // neutral start
    let k = VON_KARMAN;
    let mut ustar = k * u / ltsm;
    let mut factor = k * ustar * dens;
    let mut e = (qa - qs) * factor * AV / ltsv;
    let mut h = (ta - ts) * factor * CP_AIR * AH / ltsh;

    let mut iter = 0;
    if ta != ts {
        let mut lo = f64::INFINITY;
        loop {
            let last = lo;
            lo = ustar * ustar * ustar * dens / (k * GRAVITY * (h / (ta * CP_AIR) + 0.61 * e));

            ustar = k * u / (ltsm - psi(zu / lo, Flux::Momentum));
            factor = k * ustar * dens;
            e = (qa - qs) * factor * AV / (ltsv - psi(zq / lo, Flux::Heat));
            h = (ta - ts) * factor * AH * CP_AIR / (ltsh - psi(za / lo, Flux::Heat));

            let remainder = last - lo;
            iter += 1;
            let settled = !(remainder.abs() > THRESH && (remainder / lo).abs() > THRESH);
            if settled {
                break;
            }
            if iter >= MAX_ITERATIONS {
                return Err(PhysicsError::NoConvergence { remainder });
            }
        }
    }

    let mut xlh = lh_vap(ts);
    if ts <= FREEZE {
        xlh += lh_fus(ts);
    }

    Ok(TurbulentFlux { h, le: xlh * e, e })
}
