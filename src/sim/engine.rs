//! Simulation driver: steps the kernel over consecutive forcing pairs.

use chrono::NaiveDateTime;

use crate::config::{RunConfig, SnobalConfig};
use crate::error::SnobalError;
use crate::forcing::{self, ForcingRecord, ForcingTable};

use super::output::OutputTable;
use super::state::{SnowState, init_state};
use super::timestep::{TimestepHierarchy, build_hierarchy};
use super::types::{Kernel, KernelStatus, MeasurementHeights, RunParams, StepContext};

/// Loop index on which the kernel is told it is taking its first step.
const FIRST_STEP_INDEX: usize = 1;

/// Simulation engine owning the kernel, the run policy and the state.
///
/// Generic over `K: Kernel` for static dispatch. Steps are strictly
/// sequential; the state is lent to the kernel for one call at a time.
pub struct Engine<K: Kernel> {
    kernel: K,
    hierarchy: TimestepHierarchy,
    heights: MeasurementHeights,
    params: RunParams,
    state: SnowState,
}

impl<K: Kernel> Engine<K> {
    /// Creates an engine for a validated configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated run configuration
    /// * `data_tstep_secs` - Forcing sampling interval in seconds
    /// * `kernel` - Physical integration kernel
    pub fn new(config: &RunConfig, data_tstep_secs: f64, kernel: K) -> Self {
        Self {
            kernel,
            hierarchy: build_hierarchy(data_tstep_secs, &config.defaults, config.output_mode),
            heights: config.heights,
            params: config.run_params(),
            state: init_state(config),
        }
    }

    /// Advances the state across one data interval.
    ///
    /// # Arguments
    ///
    /// * `i` - Index of the pair's first sample
    /// * `input1` - Sample at the start of the interval
    /// * `input2` - Sample at the end of the interval
    ///
    /// # Returns
    ///
    /// The kernel's status for this interval.
    pub fn step(&mut self, i: usize, input1: &ForcingRecord, input2: &ForcingRecord) -> KernelStatus {
        let ctx = StepContext {
            hierarchy: &self.hierarchy,
            heights: &self.heights,
            params: &self.params,
            first_step: i == FIRST_STEP_INDEX,
        };
        self.kernel.step(input1, input2, &mut self.state, &ctx)
    }

    /// Runs every consecutive pair of samples and returns the output table.
    ///
    /// Row `i` holds the state after the interval starting at
    /// `timestamps[i]`, so `n` samples produce `n - 1` rows.
    ///
    /// # Errors
    ///
    /// `SnobalError::Kernel` naming the start of the first interval the
    /// kernel fails on; rows produced before the failure are dropped.
    pub fn run(
        &mut self,
        timestamps: &[NaiveDateTime],
        records: &[ForcingRecord],
    ) -> Result<OutputTable, SnobalError> {
        let steps = records.len().min(timestamps.len()).saturating_sub(1);
        let mut output = OutputTable::with_capacity(steps);
        for (i, pair) in records.windows(2).take(steps).enumerate() {
            let status = self.step(i, &pair[0], &pair[1]);
            if !status.is_success() {
                return Err(SnobalError::Kernel {
                    timestamp: timestamps[i],
                    status: status.0,
                });
            }
            output.append(timestamps[i], &self.state);
        }
        Ok(output)
    }

    pub fn state(&self) -> &SnowState {
        &self.state
    }

    pub fn hierarchy(&self) -> &TimestepHierarchy {
        &self.hierarchy
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

/// Validates inputs, builds the run and drives `kernel` over the forcing.
///
/// Forcing and configuration are checked before any step executes.
///
/// # Errors
///
/// `Schema` or `Data` for unusable forcing, `Config` for an invalid
/// configuration, `Kernel` if a step fails.
pub fn run_snobal<K: Kernel>(
    forcing: &ForcingTable,
    config: SnobalConfig,
    kernel: K,
) -> Result<OutputTable, SnobalError> {
    let data_tstep_secs = forcing::validate_forcing(forcing)?;
    let config = config.validate()?;
    let records = forcing::translate_forcing(forcing)?;

    let mut engine = Engine::new(&config, data_tstep_secs, kernel);
    engine.run(&forcing.timestamps, &records)
}
