//! Point kernel: advances every active cell across one data interval.
//!
//! Each cell carries a snowpack of up to two layers, an active surface layer
//! no thicker than `max_z_s_0` over a lower layer holding the rest. One
//! elementary step interpolates the forcing, adds precipitation, solves the
//! surface energy balance, applies the energy to the layers' cold content
//! (melting or cooling them), then moves evaporation and excess liquid water
//! out of the pack. Thin layers make the kernel retreat to finer timestep
//! levels.

use rayon::prelude::*;

use crate::forcing::{ForcingField, ForcingRecord};
use crate::sim::state::{CellState, SnowState, StateField};
use crate::sim::timestep::{Level, TimestepHierarchy};
use crate::sim::types::{Kernel, KernelStatus, MeasurementHeights, RunParams, StepContext};

use super::PhysicsError;
use super::constants::{
    CP_ICE, CP_WATER, FREEZE, HCON_GROUND, HCON_ICE, RHO_ICE, RHO_W0, SNOW_EMISSIVITY,
    STEF_BOLTZ, air_pressure, lh_fus,
};
use super::turbulence::{TurbulenceInput, hle1};
use super::vapor::sati;

/// Coldest snow temperature the kernel allows (K).
const MIN_SNOW_TEMP: f64 = FREEZE - 75.0;
/// Snow mass below which the pack is considered gone (kg/m^2).
const MIN_SNOW_MASS: f64 = 1.0e-6;
/// Thinnest lower layer kept separate from the active layer (m).
const MIN_LOWER_LAYER: f64 = 0.01;
/// Temperature offset (K) for the energy balance sensitivity.
const SENSITIVITY_STEP: f64 = 1.0;

/// Reference kernel: explicit two-layer energy and mass balance per cell.
///
/// Cells are independent within a data interval and run in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointKernel;

impl Kernel for PointKernel {
    fn step(
        &self,
        input1: &ForcingRecord,
        input2: &ForcingRecord,
        state: &mut SnowState,
        ctx: &StepContext<'_>,
    ) -> KernelStatus {
        for record in [input1, input2] {
            let width = record.width();
            if width != 1 && width != state.cells() {
                eprintln!(
                    "error: forcing covers {width} cells but the state has {}",
                    state.cells()
                );
                return KernelStatus::FAILURE;
            }
        }

        let mut cells: Vec<(usize, CellState)> = (0..state.cells())
            .filter(|&n| state.is_active(n))
            .map(|n| (n, state.cell(n)))
            .collect();

        let faults: Vec<(usize, PhysicsError)> = cells
            .par_iter_mut()
            .filter_map(|(n, cell)| {
                let env = StepEnv {
                    hierarchy: ctx.hierarchy,
                    heights: ctx.heights,
                    params: ctx.params,
                    forcing: CellForcing::new(input1, input2, *n),
                    data_secs: ctx.hierarchy.level(Level::Data).duration_secs,
                    pressure: air_pressure(cell[StateField::Elevation]),
                };
                advance_cell(cell, &env, ctx.first_step)
                    .err()
                    .map(|e| (*n, e))
            })
            .collect();

        for (n, cell) in &cells {
            state.store(*n, cell);
        }

        if faults.is_empty() {
            return KernelStatus::SUCCESS;
        }
        for (n, fault) in &faults {
            eprintln!("error: processing cell {n}: {fault}");
        }
        KernelStatus::FAILURE
    }
}

fn advance_cell(cell: &mut CellState, env: &StepEnv<'_>, first_step: bool) -> Result<(), PhysicsError> {
    let mut pack = Snowpack::load(cell, env.params);
    if first_step || pack.time_since_out >= env.hierarchy.output_interval_secs() {
        pack.reset_accumulators();
    }
    let result = pack.advance(Level::Data, 0.0, env.data_secs, env);
    pack.store(cell);
    result
}

/// Forcing at both ends of a data interval, for one cell.
#[derive(Debug, Clone, Copy)]
struct CellForcing {
    start: [f64; 10],
    end: [f64; 10],
}

impl CellForcing {
    fn new(input1: &ForcingRecord, input2: &ForcingRecord, cell: usize) -> Self {
        Self {
            start: ForcingField::ALL.map(|f| input1.get(f, cell)),
            end: ForcingField::ALL.map(|f| input2.get(f, cell)),
        }
    }

    /// Linear interpolation at `frac` of the interval.
    fn at(&self, field: ForcingField, frac: f64) -> f64 {
        let i = field as usize;
        self.start[i] + (self.end[i] - self.start[i]) * frac
    }

    fn start(&self, field: ForcingField) -> f64 {
        self.start[field as usize]
    }
}

struct StepEnv<'a> {
    hierarchy: &'a TimestepHierarchy,
    heights: &'a MeasurementHeights,
    params: &'a RunParams,
    forcing: CellForcing,
    data_secs: f64,
    pressure: f64,
}

/// Energy fluxes for one elementary step (W/m^2, positive into the pack).
#[derive(Debug, Clone, Copy, Default)]
struct EnergyBalance {
    r_n: f64,
    h: f64,
    l_v_e: f64,
    /// Mass flux from turbulent transfer (kg/m^2/s).
    e: f64,
    g: f64,
    g_0: f64,
    m: f64,
    delta_q: f64,
    delta_q_0: f64,
}

/// Precipitation falling during one elementary step.
#[derive(Debug, Clone, Copy)]
struct Precip {
    m_snow: f64,
    m_rain: f64,
    t_snow: f64,
    t_rain: f64,
    rho_snow: f64,
}

impl Precip {
    fn for_step(forcing: &CellForcing, share: f64) -> Self {
        let m_pp = forcing.start(ForcingField::PrecipMass).max(0.0) * share;
        let percent_snow = forcing.start(ForcingField::PercentSnow).clamp(0.0, 1.0);
        let t_pp = forcing.start(ForcingField::PrecipTemp);
        Self {
            m_snow: m_pp * percent_snow,
            m_rain: m_pp * (1.0 - percent_snow),
            t_snow: t_pp.min(FREEZE).max(MIN_SNOW_TEMP),
            t_rain: t_pp.max(FREEZE),
            rho_snow: forcing.start(ForcingField::SnowDensity),
        }
    }
}

/// One cell's snowpack with named fields.
#[derive(Debug, Clone, Default)]
struct Snowpack {
    z_0: f64,
    layer_count: u8,
    z_s: f64,
    z_s_0: f64,
    z_s_l: f64,
    rho: f64,
    m_s: f64,
    m_s_0: f64,
    m_s_l: f64,
    t_s: f64,
    t_s_0: f64,
    t_s_l: f64,
    cc_s: f64,
    cc_s_0: f64,
    cc_s_l: f64,
    h2o_sat: f64,
    h2o: f64,
    h2o_max: f64,
    h2o_vol: f64,
    h2o_total: f64,
    r_n_bar: f64,
    h_bar: f64,
    l_v_e_bar: f64,
    g_bar: f64,
    g_0_bar: f64,
    m_bar: f64,
    delta_q_bar: f64,
    delta_q_0_bar: f64,
    e_s_sum: f64,
    melt_sum: f64,
    ro_pred_sum: f64,
    current_time: f64,
    time_since_out: f64,
}

impl Snowpack {
    /// Reads a cell and rebuilds layers, masses and liquid water from depth,
    /// density, temperatures and saturation.
    fn load(cell: &CellState, params: &RunParams) -> Self {
        use StateField as F;
        let mut pack = Self {
            z_0: cell[F::Z0],
            layer_count: cell[F::LayerCount] as u8,
            z_s: cell[F::ZS],
            rho: cell[F::Rho],
            t_s: cell[F::TS],
            t_s_0: cell[F::TS0],
            t_s_l: cell[F::TSL],
            h2o_sat: cell[F::H2oSat],
            r_n_bar: cell[F::RNBar],
            h_bar: cell[F::HBar],
            l_v_e_bar: cell[F::LVEBar],
            g_bar: cell[F::GBar],
            g_0_bar: cell[F::G0Bar],
            m_bar: cell[F::MBar],
            delta_q_bar: cell[F::DeltaQBar],
            delta_q_0_bar: cell[F::DeltaQ0Bar],
            e_s_sum: cell[F::ESSum],
            melt_sum: cell[F::MeltSum],
            ro_pred_sum: cell[F::RoPredSum],
            current_time: cell[F::CurrentTime],
            time_since_out: cell[F::TimeSinceOut],
            ..Self::default()
        };
        pack.init_snow(params);
        pack
    }

    fn init_snow(&mut self, params: &RunParams) {
        if !(self.z_s > 0.0 && self.rho > 0.0) {
            self.clear();
            return;
        }
        self.m_s = self.rho * self.z_s;
        self.t_s = valid_snow_temp(self.t_s, FREEZE);
        self.t_s_0 = valid_snow_temp(self.t_s_0, self.t_s);
        let stored_t_s_l = self.t_s_l;

        self.set_layer_geometry(params.max_z_s_0);
        self.t_s_l = if self.layer_count == 2 {
            if stored_t_s_l > 0.0 {
                valid_snow_temp(stored_t_s_l, self.t_s)
            } else {
                // lower layer temperature implied by the bulk average
                let implied = (self.m_s * self.t_s - self.m_s_0 * self.t_s_0) / self.m_s_l;
                valid_snow_temp(implied, self.t_s)
            }
        } else {
            self.t_s_0
        };

        self.h2o_max = self.water_capacity(params.max_h2o_vol);
        self.h2o = self.h2o_sat * self.h2o_max;
        self.update_derived();
    }

    /// Removes the pack, leaving temperatures at freezing.
    fn clear(&mut self) {
        self.layer_count = 0;
        self.z_s = 0.0;
        self.z_s_0 = 0.0;
        self.z_s_l = 0.0;
        self.rho = 0.0;
        self.m_s = 0.0;
        self.m_s_0 = 0.0;
        self.m_s_l = 0.0;
        self.t_s = FREEZE;
        self.t_s_0 = FREEZE;
        self.t_s_l = FREEZE;
        self.cc_s = 0.0;
        self.cc_s_0 = 0.0;
        self.cc_s_l = 0.0;
        self.h2o_sat = 0.0;
        self.h2o = 0.0;
        self.h2o_max = 0.0;
        self.h2o_vol = 0.0;
        self.h2o_total = 0.0;
    }

    fn reset_accumulators(&mut self) {
        self.r_n_bar = 0.0;
        self.h_bar = 0.0;
        self.l_v_e_bar = 0.0;
        self.g_bar = 0.0;
        self.g_0_bar = 0.0;
        self.m_bar = 0.0;
        self.delta_q_bar = 0.0;
        self.delta_q_0_bar = 0.0;
        self.e_s_sum = 0.0;
        self.melt_sum = 0.0;
        self.ro_pred_sum = 0.0;
        self.time_since_out = 0.0;
    }

    /// Splits the pack into layers at uniform density.
    fn set_layer_geometry(&mut self, max_z_s_0: f64) {
        let max_z_s_0 = max_z_s_0.max(MIN_LOWER_LAYER);
        if self.z_s - max_z_s_0 > MIN_LOWER_LAYER {
            self.layer_count = 2;
            self.z_s_0 = max_z_s_0;
            self.z_s_l = self.z_s - max_z_s_0;
        } else {
            self.layer_count = 1;
            self.z_s_0 = self.z_s;
            self.z_s_l = 0.0;
        }
        self.m_s_0 = self.rho * self.z_s_0;
        self.m_s_l = self.rho * self.z_s_l;
    }

    /// Re-splits after the pack changed, carrying layer temperatures across
    /// a change in layer count.
    fn relayer(&mut self, max_z_s_0: f64) {
        let before = self.layer_count;
        let (m0, ml) = (self.m_s_0, self.m_s_l);
        self.set_layer_geometry(max_z_s_0);
        match (before, self.layer_count) {
            (2, 1) => {
                if m0 + ml > 0.0 {
                    self.t_s_0 = (m0 * self.t_s_0 + ml * self.t_s_l) / (m0 + ml);
                }
                self.t_s_l = self.t_s_0;
            }
            (0 | 1, 2) => self.t_s_l = self.t_s_0,
            _ => {}
        }
    }

    fn water_capacity(&self, max_h2o_vol: f64) -> f64 {
        (max_h2o_vol * self.z_s * RHO_W0 * (1.0 - self.rho / RHO_ICE)).max(0.0)
    }

    fn update_derived(&mut self) {
        if self.layer_count < 2 {
            self.t_s_l = self.t_s_0;
        }
        self.t_s = if self.m_s > 0.0 {
            (self.m_s_0 * self.t_s_0 + self.m_s_l * self.t_s_l) / self.m_s
        } else {
            self.t_s_0
        };
        self.cc_s_0 = CP_ICE * self.m_s_0 * (self.t_s_0 - FREEZE);
        self.cc_s_l = CP_ICE * self.m_s_l * (self.t_s_l - FREEZE);
        self.cc_s = self.cc_s_0 + self.cc_s_l;
        self.h2o_vol = if self.z_s > 0.0 {
            self.h2o / (self.z_s * RHO_W0)
        } else {
            0.0
        };
        self.h2o_sat = if self.h2o_max > 0.0 {
            self.h2o / self.h2o_max
        } else {
            0.0
        };
        self.h2o_total = self.h2o;
    }

    /// Whether any layer is too thin for a step at a level with this threshold.
    fn below_threshold(&self, threshold: f64) -> bool {
        match self.layer_count {
            0 => false,
            1 => self.m_s < threshold,
            _ => self.m_s_0 < threshold || self.m_s_l < threshold,
        }
    }

    /// Advances `dt` seconds starting `t0` seconds into the data interval,
    /// dividing into finer levels while the pack is below their thresholds.
    fn advance(&mut self, level: Level, t0: f64, dt: f64, env: &StepEnv<'_>) -> Result<(), PhysicsError> {
        if let Some(finer) = level.finer() {
            let next = env.hierarchy.level(finer);
            if let (Some(threshold), Some(intervals)) = (next.mass_threshold, next.intervals) {
                if intervals > 0 && self.below_threshold(threshold) {
                    let sub = dt / intervals as f64;
                    for k in 0..intervals {
                        self.advance(finer, t0 + k as f64 * sub, sub, env)?;
                    }
                    return Ok(());
                }
            }
        }
        self.run_step(t0, dt, env)
    }

    fn run_step(&mut self, t0: f64, dt: f64, env: &StepEnv<'_>) -> Result<(), PhysicsError> {
        let max_z_s_0 = env.params.max_z_s_0;
        let precip = Precip::for_step(&env.forcing, dt / env.data_secs);
        let mut runoff = 0.0;

        if precip.m_snow > 0.0 {
            if !(precip.rho_snow > 0.0) {
                return Err(PhysicsError::SnowDensity(precip.rho_snow));
            }
            if self.layer_count == 0 {
                self.t_s_0 = precip.t_snow;
                self.t_s_l = precip.t_snow;
            }
            self.z_s += precip.m_snow / precip.rho_snow;
            self.m_s += precip.m_snow;
            self.rho = self.m_s / self.z_s;
            self.relayer(max_z_s_0);
        }
        if precip.m_rain > 0.0 {
            if self.layer_count > 0 {
                self.h2o += precip.m_rain;
            } else {
                runoff += precip.m_rain;
            }
        }

        let frac = (t0 + 0.5 * dt) / env.data_secs;
        let eb = if self.layer_count > 0 {
            self.energy_balance(env, frac, &precip, dt)?
        } else {
            EnergyBalance::default()
        };

        let mut melt = 0.0;
        let mut e_s = 0.0;
        if self.layer_count > 0 {
            let q_0 = self.active_layer_heat(env, frac, &precip, dt, &eb)?;
            melt += apply_heat(&mut self.m_s_0, &mut self.t_s_0, q_0);
            if self.layer_count == 2 {
                melt += apply_heat(&mut self.m_s_l, &mut self.t_s_l, (eb.g - eb.g_0) * dt);
            }
            self.h2o += melt;
            self.refreeze();

            e_s = eb.e * dt;
            if e_s < 0.0 {
                let from_water = (-e_s).min(self.h2o);
                self.h2o -= from_water;
                let from_ice = (-e_s - from_water).min(self.m_s_0);
                self.m_s_0 -= from_ice;
                e_s = -(from_water + from_ice);
            } else {
                self.m_s_0 += e_s;
            }

            self.m_s = self.m_s_0 + self.m_s_l;
            if self.m_s <= MIN_SNOW_MASS {
                runoff += self.h2o + self.m_s;
                self.clear();
            } else {
                self.z_s = self.m_s / self.rho;
                self.relayer(max_z_s_0);
                self.h2o_max = self.water_capacity(env.params.max_h2o_vol);
                if self.h2o > self.h2o_max {
                    runoff += self.h2o - self.h2o_max;
                    self.h2o = self.h2o_max;
                }
                self.update_derived();
            }
        }

        let tso = self.time_since_out;
        let total = tso + dt;
        let avg = |bar: f64, x: f64| (bar * tso + x * dt) / total;
        self.r_n_bar = avg(self.r_n_bar, eb.r_n);
        self.h_bar = avg(self.h_bar, eb.h);
        self.l_v_e_bar = avg(self.l_v_e_bar, eb.l_v_e);
        self.g_bar = avg(self.g_bar, eb.g);
        self.g_0_bar = avg(self.g_0_bar, eb.g_0);
        self.m_bar = avg(self.m_bar, eb.m);
        self.delta_q_bar = avg(self.delta_q_bar, eb.delta_q);
        self.delta_q_0_bar = avg(self.delta_q_0_bar, eb.delta_q_0);
        self.e_s_sum += e_s;
        self.melt_sum += melt;
        self.ro_pred_sum += runoff;
        self.current_time += dt;
        self.time_since_out = total;

        self.check_finite()
    }

    fn energy_balance(
        &self,
        env: &StepEnv<'_>,
        frac: f64,
        precip: &Precip,
        dt: f64,
    ) -> Result<EnergyBalance, PhysicsError> {
        let f = &env.forcing;
        let s_n = f.at(ForcingField::NetSolar, frac);
        let i_lw = f.at(ForcingField::Thermal, frac);
        let t_a = f.at(ForcingField::AirTemp, frac);
        let t_g = f.at(ForcingField::GroundTemp, frac);
        let u = f.at(ForcingField::WindSpeed, frac);

        let r_n = s_n + SNOW_EMISSIVITY * (i_lw - STEF_BOLTZ * self.t_s_0.powi(4));

        let e_s = sati(self.t_s_0)?;
        let e_a = f.at(ForcingField::VaporPressure, frac).min(sati(t_a)?);
        let MeasurementHeights { z_t, z_g, z_u } = *env.heights;
        let (rel_z_t, rel_z_u) = if env.params.relative_heights {
            (z_t, z_u)
        } else {
            (z_t - self.z_s, z_u - self.z_s)
        };
        let flux = hle1(&TurbulenceInput {
            press: env.pressure,
            ta: t_a,
            ts: self.t_s_0,
            za: rel_z_t,
            ea: e_a,
            es: e_s,
            zq: rel_z_t,
            u,
            zu: rel_z_u,
            z0: self.z_0,
        })?;

        let (g, g_0) = if self.layer_count == 1 {
            let g = g_soil(self.rho, self.t_s_0, t_g, self.z_s_0, z_g);
            (g, g)
        } else {
            (
                g_soil(self.rho, self.t_s_l, t_g, self.z_s_l, z_g),
                g_snow(self.rho, self.t_s_0, self.t_s_l, self.z_s_0, self.z_s_l),
            )
        };

        let m = (CP_WATER * precip.m_rain * (precip.t_rain - self.t_s_0)
            + CP_ICE * precip.m_snow * (precip.t_snow - self.t_s_0))
            / dt;

        let delta_q_0 = r_n + flux.h + flux.le + g_0 + m;
        let delta_q = if self.layer_count == 1 {
            delta_q_0
        } else {
            delta_q_0 + g - g_0
        };

        Ok(EnergyBalance {
            r_n,
            h: flux.h,
            l_v_e: flux.le,
            e: flux.e,
            g,
            g_0,
            m,
            delta_q,
            delta_q_0,
        })
    }

    /// Heat (J/m^2) the active layer takes up over `dt`.
    ///
    /// The balance is linearized in the layer temperature and stepped
    /// backward, so a thin layer relaxes toward equilibrium instead of
    /// overshooting it. A layer driven past freezing keeps the energy left
    /// at the freezing point for melt.
    fn active_layer_heat(
        &self,
        env: &StepEnv<'_>,
        frac: f64,
        precip: &Precip,
        dt: f64,
        eb: &EnergyBalance,
    ) -> Result<f64, PhysicsError> {
        let q = eb.delta_q_0 * dt;
        let capacity = CP_ICE * self.m_s_0;
        if !(capacity > 0.0) {
            return Ok(q);
        }

        let mut cooler = self.clone();
        cooler.t_s_0 -= SENSITIVITY_STEP;
        let shifted = cooler.energy_balance(env, frac, precip, dt)?;
        let lambda = ((shifted.delta_q_0 - eb.delta_q_0) / SENSITIVITY_STEP).max(0.0);

        let cc = capacity * (self.t_s_0 - FREEZE);
        let damped = q * capacity / (capacity + lambda * dt);
        if cc + damped < 0.0 {
            Ok(damped)
        } else {
            Ok((q - lambda * dt * (FREEZE - self.t_s_0)).max(-cc))
        }
    }

    /// Freezes liquid water into a cold active layer.
    fn refreeze(&mut self) {
        let cc = CP_ICE * self.m_s_0 * (self.t_s_0 - FREEZE);
        if cc >= 0.0 || self.h2o <= 0.0 {
            return;
        }
        let lf = lh_fus(FREEZE);
        let frozen = self.h2o.min(-cc / lf);
        self.h2o -= frozen;
        self.m_s_0 += frozen;
        self.t_s_0 = FREEZE + (cc + frozen * lf) / (CP_ICE * self.m_s_0);
    }

    fn check_finite(&self) -> Result<(), PhysicsError> {
        let values = [
            self.z_s,
            self.m_s,
            self.t_s_0,
            self.t_s_l,
            self.h2o,
            self.delta_q_bar,
            self.e_s_sum,
            self.ro_pred_sum,
        ];
        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(PhysicsError::NonFinite("snowpack state"))
        }
    }

    fn store(&self, cell: &mut CellState) {
        use StateField as F;
        cell[F::Rho] = self.rho;
        cell[F::TS0] = self.t_s_0;
        cell[F::TSL] = self.t_s_l;
        cell[F::TS] = self.t_s;
        cell[F::CcS0] = self.cc_s_0;
        cell[F::CcSL] = self.cc_s_l;
        cell[F::CcS] = self.cc_s;
        cell[F::MS] = self.m_s;
        cell[F::MS0] = self.m_s_0;
        cell[F::MSL] = self.m_s_l;
        cell[F::ZS] = self.z_s;
        cell[F::ZS0] = self.z_s_0;
        cell[F::ZSL] = self.z_s_l;
        cell[F::H2oSat] = self.h2o_sat;
        cell[F::LayerCount] = f64::from(self.layer_count);
        cell[F::H2o] = self.h2o;
        cell[F::H2oMax] = self.h2o_max;
        cell[F::H2oVol] = self.h2o_vol;
        cell[F::H2oTotal] = self.h2o_total;
        cell[F::RNBar] = self.r_n_bar;
        cell[F::HBar] = self.h_bar;
        cell[F::LVEBar] = self.l_v_e_bar;
        cell[F::GBar] = self.g_bar;
        cell[F::G0Bar] = self.g_0_bar;
        cell[F::MBar] = self.m_bar;
        cell[F::DeltaQBar] = self.delta_q_bar;
        cell[F::DeltaQ0Bar] = self.delta_q_0_bar;
        cell[F::ESSum] = self.e_s_sum;
        cell[F::MeltSum] = self.melt_sum;
        cell[F::RoPredSum] = self.ro_pred_sum;
        cell[F::CurrentTime] = self.current_time;
        cell[F::TimeSinceOut] = self.time_since_out;
    }
}

/// A usable snow temperature, or `fallback` when `t` is not positive.
fn valid_snow_temp(t: f64, fallback: f64) -> f64 {
    let t = if t > 0.0 { t } else { fallback };
    t.clamp(MIN_SNOW_TEMP, FREEZE)
}

/// Adds `q` joules to a layer; returns the mass melted.
fn apply_heat(mass: &mut f64, temp: &mut f64, q: f64) -> f64 {
    if *mass <= 0.0 {
        return 0.0;
    }
    let cc = CP_ICE * *mass * (*temp - FREEZE) + q;
    if cc > 0.0 {
        let melt = (cc / lh_fus(FREEZE)).min(*mass);
        *mass -= melt;
        *temp = FREEZE;
        melt
    } else {
        *temp = (FREEZE + cc / (CP_ICE * *mass)).max(MIN_SNOW_TEMP);
        0.0
    }
}

/// Effective thermal conductivity of snow at density `rho` (W/m/K).
fn snow_conductivity(rho: f64) -> f64 {
    HCON_ICE * (rho / RHO_W0).powi(2)
}

/// Conductive flux from two half-thickness resistances in series.
fn series_flux(k1: f64, k2: f64, t1: f64, t2: f64, d1: f64, d2: f64) -> f64 {
    let resistance = k2 * d1 + k1 * d2;
    if resistance > 0.0 {
        2.0 * k1 * k2 * (t2 - t1) / resistance
    } else {
        0.0
    }
}

/// Ground heat flux into a snow layer at `tsno` over soil at `tg`.
fn g_soil(rho: f64, tsno: f64, tg: f64, ds: f64, dg: f64) -> f64 {
    series_flux(snow_conductivity(rho), HCON_GROUND, tsno.min(FREEZE), tg, ds, dg)
}

/// Heat flux from the lower layer into the active layer.
fn g_snow(rho: f64, t_0: f64, t_l: f64, d_0: f64, d_l: f64) -> f64 {
    let k = snow_conductivity(rho);
    series_flux(k, k, t_0, t_l, d_0, d_l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunConfig, SnobalConfig};
    use crate::names;
    use crate::sim::state::init_state;
    use crate::sim::timestep::build_hierarchy;

    /// Forcing in external units (Celsius).
    #[derive(Clone, Copy)]
    struct Weather {
        s_n: f64,
        i_lw: f64,
        t_a: f64,
        t_g: f64,
        e_a: f64,
        u: f64,
        m_pp: f64,
        t_pp: f64,
        percent_snow: f64,
        rho_snow: f64,
    }

    impl Weather {
        fn calm_cold() -> Self {
            Self {
                s_n: 0.0,
                i_lw: 250.0,
                t_a: -5.0,
                t_g: 0.0,
                e_a: 300.0,
                u: 2.0,
                m_pp: 0.0,
                t_pp: -5.0,
                percent_snow: 1.0,
                rho_snow: 100.0,
            }
        }

        fn warm() -> Self {
            Self {
                s_n: 300.0,
                i_lw: 320.0,
                t_a: 8.0,
                t_g: 0.0,
                e_a: 800.0,
                u: 3.0,
                m_pp: 0.0,
                t_pp: 8.0,
                percent_snow: 0.0,
                rho_snow: 0.0,
            }
        }

        fn record(self) -> ForcingRecord {
            let external = [
                self.s_n,
                self.i_lw,
                self.t_a,
                self.t_g,
                self.e_a,
                self.u,
                self.m_pp,
                self.t_pp,
                self.percent_snow,
                self.rho_snow,
            ];
            let mut values = [0.0; 10];
            for (slot, (field, v)) in values.iter_mut().zip(ForcingField::ALL.iter().zip(external)) {
                *slot = names::forcing_to_kernel_units(field.internal_name(), v);
            }
            ForcingRecord::point(values)
        }
    }

    fn run_config(init: &str) -> RunConfig {
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
roughness_length_m = 0.005
{init}
"#
        );
        SnobalConfig::from_toml_str(&toml)
            .and_then(SnobalConfig::validate)
            .expect("valid config")
    }

    /// Runs `hours` data intervals of constant weather; returns the final state.
    fn run_hours(cfg: &RunConfig, weather: Weather, hours: usize) -> (SnowState, KernelStatus) {
        let mut state = init_state(cfg);
        let hierarchy = build_hierarchy(3600.0, &cfg.defaults, cfg.output_mode);
        let params = cfg.run_params();
        let record = weather.record();
        let mut status = KernelStatus::SUCCESS;
        for i in 0..hours {
            let ctx = StepContext {
                hierarchy: &hierarchy,
                heights: &cfg.heights,
                params: &params,
                first_step: i == 1,
            };
            status = PointKernel.step(&record, &record, &mut state, &ctx);
            if !status.is_success() {
                break;
            }
        }
        (state, status)
    }

    #[test]
    fn bare_ground_stays_bare() {
        let cfg = run_config("");
        let (state, status) = run_hours(&cfg, Weather::calm_cold(), 3);
        assert!(status.is_success());
        assert_eq!(state.get(StateField::MS, 0), 0.0);
        assert_eq!(state.get(StateField::ZS, 0), 0.0);
        assert_eq!(state.get(StateField::RNBar, 0), 0.0);
        assert_eq!(state.get(StateField::DeltaQBar, 0), 0.0);
        assert_eq!(state.get(StateField::CurrentTime, 0), 3.0 * 3600.0);
    }

    #[test]
    fn snowfall_builds_mass() {
        let cfg = run_config("");
        let weather = Weather {
            m_pp: 10.0,
            ..Weather::calm_cold()
        };
        let (state, status) = run_hours(&cfg, weather, 1);
        assert!(status.is_success());

        let m_s = state.get(StateField::MS, 0);
        let h2o = state.get(StateField::H2o, 0);
        let runoff = state.get(StateField::RoPredSum, 0);
        let e_s = state.get(StateField::ESSum, 0);
        assert!((m_s + h2o + runoff - e_s - 10.0).abs() < 1e-9);
        assert!(m_s > 9.0);
        assert!(state.get(StateField::ZS, 0) > 0.09);
        assert!(state.get(StateField::TS0, 0) < FREEZE);
        assert_eq!(state.get(StateField::LayerCount, 0), 1.0);
    }

    #[test]
    fn thin_new_snow_stays_near_equilibrium() {
        let cfg = run_config("");
        let weather = Weather {
            m_pp: 1.5,
            ..Weather::calm_cold()
        };
        let (state, status) = run_hours(&cfg, weather, 3);
        assert!(status.is_success());

        let t_s_0 = state.get(StateField::TS0, 0);
        assert!(t_s_0 > FREEZE - 30.0, "active layer at {t_s_0} K");
        assert!(t_s_0 < FREEZE);
        assert!(state.get(StateField::MS, 0) > 4.0);
    }

    #[test]
    fn warm_forcing_melts_a_ripe_pack() {
        let cfg = run_config(
            "[init]\nsnow_depth_cm = 50\n\"bulk_snow_density_kgm-3\" = 300\n",
        );
        let (state, status) = run_hours(&cfg, Weather::warm(), 1);
        assert!(status.is_success());
        assert!(state.get(StateField::MeltSum, 0) > 0.0);
        assert!(state.get(StateField::MS, 0) < 150.0);
        assert_eq!(state.get(StateField::TS0, 0), FREEZE);
        assert_eq!(state.get(StateField::LayerCount, 0), 2.0);
    }

    #[test]
    fn thin_pack_conserves_mass_through_subdivision() {
        let cfg = run_config("[init]\nsnow_depth_cm = 2\n\"bulk_snow_density_kgm-3\" = 100\nactive_layer_temp_degC = -2\navg_snow_temp_degC = -2\n");
        let weather = Weather {
            m_pp: 1.0,
            percent_snow: 0.5,
            t_pp: 1.0,
            ..Weather::calm_cold()
        };
        let (state, status) = run_hours(&cfg, weather, 1);
        assert!(status.is_success());

        let m_s = state.get(StateField::MS, 0);
        let h2o = state.get(StateField::H2o, 0);
        let runoff = state.get(StateField::RoPredSum, 0);
        let e_s = state.get(StateField::ESSum, 0);
        // 2 kg/m^2 initial plus 1 mm of mixed precipitation
        assert!((m_s + h2o + runoff - e_s - 3.0).abs() < 1e-9);
    }

    #[test]
    fn initial_liquid_water_is_conserved() {
        let cfg = run_config("[init]\nsnow_depth_cm = 30\n\"bulk_snow_density_kgm-3\" = 250\n\"h2o_sat_%\" = 50\n");
        let h2o_max = cfg.defaults.max_h2o_vol_frac * 0.3 * RHO_W0 * (1.0 - 250.0 / RHO_ICE);
        let (state, status) = run_hours(&cfg, Weather::calm_cold(), 1);
        assert!(status.is_success());

        let m_s = state.get(StateField::MS, 0);
        let h2o = state.get(StateField::H2o, 0);
        let runoff = state.get(StateField::RoPredSum, 0);
        let e_s = state.get(StateField::ESSum, 0);
        assert!((m_s + h2o + runoff - e_s - (75.0 + 0.5 * h2o_max)).abs() < 1e-9);
        // half-saturated pack holds its water
        assert!(runoff < 1e-9, "runoff {runoff}");
        assert!(state.get(StateField::H2oSat, 0) <= 1.0);
    }

    #[test]
    fn invalid_humidity_fails_the_step() {
        let cfg = run_config("[init]\nsnow_depth_cm = 30\n\"bulk_snow_density_kgm-3\" = 250\n");
        let weather = Weather {
            e_a: -10.0,
            ..Weather::calm_cold()
        };
        let (_, status) = run_hours(&cfg, weather, 1);
        assert_eq!(status, KernelStatus::FAILURE);
    }

    #[test]
    fn forcing_wider_than_the_grid_fails_the_step() {
        let cfg = run_config("");
        let mut state = init_state(&cfg);
        let hierarchy = build_hierarchy(3600.0, &cfg.defaults, cfg.output_mode);
        let params = cfg.run_params();
        let ctx = StepContext {
            hierarchy: &hierarchy,
            heights: &cfg.heights,
            params: &params,
            first_step: false,
        };
        let point = Weather::calm_cold().record();
        let mut columns: [Vec<f64>; 10] = Default::default();
        for (column, field) in columns.iter_mut().zip(ForcingField::ALL) {
            *column = vec![point.get(field, 0); 3];
        }
        let wide = ForcingRecord::grid(columns).expect("consistent widths");
        let before = state.clone();
        assert_eq!(PointKernel.step(&point, &wide, &mut state, &ctx), KernelStatus::FAILURE);
        assert_eq!(state, before);
    }

    #[test]
    fn masked_cells_are_untouched() {
        let cfg = run_config("");
        let mut state = SnowState::zeros(2);
        state.fill(StateField::Mask, 1.0);
        state.set(StateField::Mask, 1, 0.0);
        state.fill(StateField::Elevation, 2000.0);
        state.fill(StateField::Z0, 0.005);
        let hierarchy = build_hierarchy(3600.0, &cfg.defaults, cfg.output_mode);
        let params = cfg.run_params();
        let ctx = StepContext {
            hierarchy: &hierarchy,
            heights: &cfg.heights,
            params: &params,
            first_step: false,
        };
        let record = Weather::calm_cold().record();
        let status = PointKernel.step(&record, &record, &mut state, &ctx);
        assert!(status.is_success());
        assert_eq!(state.get(StateField::CurrentTime, 0), 3600.0);
        assert_eq!(state.get(StateField::CurrentTime, 1), 0.0);
    }

    #[test]
    fn thresholds_follow_layers() {
        let mut pack = Snowpack::default();
        assert!(!pack.below_threshold(1.0));
        pack.layer_count = 1;
        pack.m_s = 5.0;
        assert!(pack.below_threshold(10.0));
        assert!(!pack.below_threshold(1.0));
        pack.layer_count = 2;
        pack.m_s_0 = 20.0;
        pack.m_s_l = 0.5;
        assert!(pack.below_threshold(1.0));
    }

    #[test]
    fn heat_melts_only_above_zero_cold_content() {
        let mut mass = 10.0;
        let mut temp = FREEZE - 1.0;
        // warming by 0.5 K worth of energy melts nothing
        let melt = apply_heat(&mut mass, &mut temp, CP_ICE * 10.0 * 0.5);
        assert_eq!(melt, 0.0);
        assert!((temp - (FREEZE - 0.5)).abs() < 1e-9);

        let melt = apply_heat(&mut mass, &mut temp, CP_ICE * 10.0 * 0.5 + lh_fus(FREEZE));
        assert!((melt - 1.0).abs() < 1e-9);
        assert_eq!(temp, FREEZE);
        assert!((mass - 9.0).abs() < 1e-9);
    }
}
