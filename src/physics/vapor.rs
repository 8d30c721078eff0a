//! Saturation vapour pressure over ice and over water.

use super::constants::{BOIL, FREEZE, SEA_LEVEL};
use super::PhysicsError;

/// Saturation vapour pressure (Pa) over water at `tk` kelvin.
///
/// # Errors
///
/// `PhysicsError::Temperature` when `tk` is not positive.
pub fn satw(tk: f64) -> Result<f64, PhysicsError> {
    if !(tk > 0.0) {
        return Err(PhysicsError::Temperature(tk));
    }
    let l10 = 10f64.ln();
    let exponent = -7.90298 * (BOIL / tk - 1.0) + 5.02808 * (BOIL / tk).ln() / l10
        - 1.3816e-7 * (10f64.powf(1.1344e1 * (1.0 - tk / BOIL)) - 1.0)
        + 8.1328e-3 * (10f64.powf(-3.49149 * (BOIL / tk - 1.0)) - 1.0)
        + SEA_LEVEL.ln() / l10;
    finite(10f64.powf(exponent))
}

/// Saturation vapour pressure (Pa) over ice at `tk` kelvin.
///
/// Above freezing this is the pressure over water.
///
/// # Errors
///
/// `PhysicsError::Temperature` when `tk` is not positive.
pub fn sati(tk: f64) -> Result<f64, PhysicsError> {
    if !(tk > 0.0) {
        return Err(PhysicsError::Temperature(tk));
    }
    if tk > FREEZE {
        return satw(tk);
    }
    let l10 = 10f64.ln();
    let exponent = -9.09718 * (FREEZE / tk - 1.0) - 3.56654 * (FREEZE / tk).ln() / l10
        + 8.76793e-1 * (1.0 - tk / FREEZE)
        + 6.1071f64.ln() / l10;
    finite(10f64.powf(exponent) * 1.0e2)
}

fn finite(x: f64) -> Result<f64, PhysicsError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(PhysicsError::NonFinite("saturation vapour pressure"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ice_and_water_agree_at_freezing() {
        let ice = sati(FREEZE).expect("valid");
        let water = satw(FREEZE).expect("valid");
        assert!((ice - 611.0).abs() < 2.0, "ice {ice}");
        assert!((ice - water).abs() < 2.0);
    }

    #[test]
    fn water_boils_at_sea_level_pressure() {
        let p = satw(BOIL).expect("valid");
        assert!((p - SEA_LEVEL).abs() < 1.0);
    }

    #[test]
    fn colder_means_lower_pressure() {
        let cold = sati(FREEZE - 20.0).expect("valid");
        let warm = sati(FREEZE - 5.0).expect("valid");
        assert!(cold < warm);
        assert!((cold - 103.0).abs() < 3.0, "cold {cold}");
    }

    #[test]
    fn non_positive_temperature_is_rejected() {
        assert!(matches!(sati(0.0), Err(PhysicsError::Temperature(_))));
        assert!(matches!(satw(-3.0), Err(PhysicsError::Temperature(_))));
    }
}
