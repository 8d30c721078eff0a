//! Reference two-layer point energy and mass balance kernel.

pub mod constants;
pub mod kernel;
pub mod turbulence;
pub mod vapor;

pub use kernel::PointKernel;

use thiserror::Error;

/// A fault that stops the kernel from advancing a cell.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("temperature {0} K is not positive")]
    Temperature(f64),

    #[error("measurement heights must exceed roughness length (z0 {z0}, za {za}, zu {zu})")]
    Heights { z0: f64, za: f64, zu: f64 },

    #[error("invalid pressures (ea {ea}, es {es}, press {press})")]
    Pressure { ea: f64, es: f64, press: f64 },

    #[error("vapour pressure exceeds saturation (ea {ea}, es {es})")]
    Supersaturated { ea: f64, es: f64 },

    #[error("turbulent transfer did not converge (last difference {remainder})")]
    NoConvergence { remainder: f64 },

    #[error("snowfall with non-positive density {0} kg/m^3")]
    SnowDensity(f64),

    #[error("non-finite {0}")]
    NonFinite(&'static str),
}
