//! Kernel call contract: heights, run parameters, step context and status.

use std::fmt;

use crate::forcing::ForcingRecord;

use super::state::SnowState;
use super::timestep::TimestepHierarchy;

/// Instrument heights above the ground (or snow surface, for relative heights).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementHeights {
    /// Air temperature and humidity (m).
    pub z_t: f64,
    /// Soil temperature depth (m).
    pub z_g: f64,
    /// Wind speed (m).
    pub z_u: f64,
}

/// Per-run kernel parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParams {
    /// Heights are measured from the snow surface rather than the ground.
    pub relative_heights: bool,
    /// Maximum liquid water content as a fraction of pore volume.
    pub max_h2o_vol: f64,
    /// Maximum active layer thickness (m).
    pub max_z_s_0: f64,
}

/// Everything the kernel needs besides forcing and state for one call.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub hierarchy: &'a TimestepHierarchy,
    pub heights: &'a MeasurementHeights,
    pub params: &'a RunParams,
    /// Resets the kernel's accumulators before stepping.
    pub first_step: bool,
}

/// Integer status returned by a kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStatus(pub i32);

impl KernelStatus {
    /// The single success sentinel.
    pub const SUCCESS: Self = Self(-1);
    pub const FAILURE: Self = Self(0);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical integration over one data interval.
///
/// The kernel advances `state` from the time of `input1` to the time of
/// `input2`, subdividing as the hierarchy in `ctx` allows. It has exclusive
/// access to the state for the duration of the call.
pub trait Kernel {
    fn step(
        &self,
        input1: &ForcingRecord,
        input2: &ForcingRecord,
        state: &mut SnowState,
        ctx: &StepContext<'_>,
    ) -> KernelStatus;
}

impl<K: Kernel + ?Sized> Kernel for &K {
    fn step(
        &self,
        input1: &ForcingRecord,
        input2: &ForcingRecord,
        state: &mut SnowState,
        ctx: &StepContext<'_>,
    ) -> KernelStatus {
        (**self).step(input1, input2, state, ctx)
    }
}
