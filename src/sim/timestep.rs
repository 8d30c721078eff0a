//! Four-level adaptive timestep policy (data, normal, medium, small).
//!
//! The driver only builds the policy; the kernel decides when to retreat
//! to a finer level.

use crate::config::RunDefaults;

const SECONDS_PER_MINUTE: f64 = 60.0;

/// Output emission selected in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Once per data interval.
    #[default]
    Data,
    /// At the normal level, whole and divided steps.
    Normal,
    /// Whole steps at every run level.
    All,
}

impl OutputMode {
    /// Reads a configured mode; anything unrecognized means [`OutputMode::Data`].
    pub fn from_config(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Self::Normal,
            "all" => Self::All,
            _ => Self::Data,
        }
    }
}

/// When a level emits output: after an undivided step, after a divided one, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputFlags(u8);

impl OutputFlags {
    pub const NONE: Self = Self(0);
    pub const WHOLE: Self = Self(1);
    pub const DIVIDED: Self = Self(2);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Index of each level in a [`TimestepHierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Data = 0,
    Normal = 1,
    Medium = 2,
    Small = 3,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Data, Level::Normal, Level::Medium, Level::Small];

    /// The next finer level, if any.
    pub fn finer(self) -> Option<Level> {
        match self {
            Level::Data => Some(Level::Normal),
            Level::Normal => Some(Level::Medium),
            Level::Medium => Some(Level::Small),
            Level::Small => None,
        }
    }
}

/// One level of the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepLevel {
    pub level: Level,
    /// Step length in seconds.
    pub duration_secs: f64,
    /// Mass (kg/m^2) below which a layer forces retreat to this level.
    pub mass_threshold: Option<f64>,
    /// Steps of this level per step of the coarser level.
    pub intervals: Option<usize>,
    pub output: OutputFlags,
}

/// The full four-level policy handed to the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepHierarchy {
    levels: [TimestepLevel; 4],
}

impl TimestepHierarchy {
    pub fn level(&self, level: Level) -> &TimestepLevel {
        &self.levels[level as usize]
    }

    pub fn levels(&self) -> &[TimestepLevel; 4] {
        &self.levels
    }

    /// Duration of the coarsest level that emits output.
    ///
    /// Accumulated averages cover this span before they are reset.
    pub fn output_interval_secs(&self) -> f64 {
        self.levels
            .iter()
            .find(|l| !l.output.is_none())
            .unwrap_or(&self.levels[0])
            .duration_secs
    }
}

/// Builds the hierarchy for a forcing interval of `data_secs` seconds.
///
/// Level 0 runs at the data interval; levels 1 to 3 take their durations
/// (minutes) and mass thresholds from `defaults`. A level is never longer
/// than the level above it: a configured duration coarser than its parent
/// is clamped to the parent's, so every count is at least 1. Subdivision
/// counts are the truncated ratios of consecutive durations.
pub fn build_hierarchy(data_secs: f64, defaults: &RunDefaults, mode: OutputMode) -> TimestepHierarchy {
    let mut levels = [
        TimestepLevel {
            level: Level::Data,
            duration_secs: data_secs,
            mass_threshold: None,
            intervals: None,
            output: OutputFlags::NONE,
        },
        TimestepLevel {
            level: Level::Normal,
            duration_secs: defaults.normal_tstep_min * SECONDS_PER_MINUTE,
            mass_threshold: Some(defaults.normal_tstep_mass_thresh),
            intervals: None,
            output: OutputFlags::NONE,
        },
        TimestepLevel {
            level: Level::Medium,
            duration_secs: defaults.medium_tstep_min * SECONDS_PER_MINUTE,
            mass_threshold: Some(defaults.medium_tstep_mass_thresh),
            intervals: None,
            output: OutputFlags::NONE,
        },
        TimestepLevel {
            level: Level::Small,
            duration_secs: defaults.small_tstep_min * SECONDS_PER_MINUTE,
            mass_threshold: Some(defaults.small_tstep_mass_thresh),
            intervals: None,
            output: OutputFlags::NONE,
        },
    ];

    for i in 1..levels.len() {
        let parent = levels[i - 1].duration_secs;
        levels[i].duration_secs = levels[i].duration_secs.min(parent);
        let ratio = levels[i - 1].duration_secs / levels[i].duration_secs;
        levels[i].intervals = Some(ratio as usize);
    }

    match mode {
        OutputMode::Data => levels[0].output = OutputFlags::DIVIDED,
        OutputMode::Normal => {
            levels[1].output = OutputFlags::WHOLE.union(OutputFlags::DIVIDED);
        }
        OutputMode::All => {
            for level in &mut levels[1..] {
                level.output = OutputFlags::WHOLE;
            }
        }
    }

    TimestepHierarchy { levels }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly() -> TimestepHierarchy {
        build_hierarchy(3600.0, &RunDefaults::default(), OutputMode::Data)
    }

    #[test]
    fn default_hierarchy_for_hourly_data() {
        let h = hourly();
        let durations: Vec<f64> = h.levels().iter().map(|l| l.duration_secs).collect();
        let counts: Vec<Option<usize>> = h.levels().iter().map(|l| l.intervals).collect();
        let thresholds: Vec<Option<f64>> = h.levels().iter().map(|l| l.mass_threshold).collect();
        assert_eq!(durations, vec![3600.0, 3600.0, 900.0, 60.0]);
        assert_eq!(counts, vec![None, Some(1), Some(4), Some(15)]);
        assert_eq!(thresholds, vec![None, Some(60.0), Some(10.0), Some(1.0)]);
    }

    #[test]
    fn durations_never_increase() {
        let h = build_hierarchy(10_800.0, &RunDefaults::default(), OutputMode::Data);
        for pair in h.levels().windows(2) {
            assert!(pair[0].duration_secs >= pair[1].duration_secs);
        }
        assert_eq!(h.level(Level::Normal).intervals, Some(3));
    }

    #[test]
    fn half_hourly_data_clamps_the_normal_level() {
        let h = build_hierarchy(1800.0, &RunDefaults::default(), OutputMode::Normal);
        let durations: Vec<f64> = h.levels().iter().map(|l| l.duration_secs).collect();
        let counts: Vec<Option<usize>> = h.levels().iter().map(|l| l.intervals).collect();
        assert_eq!(durations, vec![1800.0, 1800.0, 900.0, 60.0]);
        assert_eq!(counts, vec![None, Some(1), Some(2), Some(15)]);
        assert_eq!(h.output_interval_secs(), 1800.0);
    }

    #[test]
    fn clamping_cascades_to_finer_levels() {
        let h = build_hierarchy(600.0, &RunDefaults::default(), OutputMode::All);
        let durations: Vec<f64> = h.levels().iter().map(|l| l.duration_secs).collect();
        assert_eq!(durations, vec![600.0, 600.0, 600.0, 60.0]);
        for level in &h.levels()[1..] {
            assert!(level.intervals.is_some_and(|n| n >= 1));
        }
        assert_eq!(h.output_interval_secs(), 600.0);
    }

    #[test]
    fn non_integer_ratio_truncates() {
        let defaults = RunDefaults {
            medium_tstep_min: 25.0,
            ..RunDefaults::default()
        };
        let h = build_hierarchy(3600.0, &defaults, OutputMode::Data);
        assert_eq!(h.level(Level::Medium).intervals, Some(2));
    }

    #[test]
    fn output_modes_select_levels() {
        let d = RunDefaults::default();

        let data = build_hierarchy(3600.0, &d, OutputMode::Data);
        assert_eq!(data.level(Level::Data).output, OutputFlags::DIVIDED);
        assert!(data.level(Level::Normal).output.is_none());

        let normal = build_hierarchy(3600.0, &d, OutputMode::Normal);
        assert!(normal.level(Level::Data).output.is_none());
        assert!(normal.level(Level::Normal).output.contains(OutputFlags::WHOLE));
        assert!(normal.level(Level::Normal).output.contains(OutputFlags::DIVIDED));

        let all = build_hierarchy(3600.0, &d, OutputMode::All);
        assert!(all.level(Level::Data).output.is_none());
        for level in [Level::Normal, Level::Medium, Level::Small] {
            assert_eq!(all.level(level).output, OutputFlags::WHOLE);
        }
        assert_eq!(all.output_interval_secs(), 3600.0);
    }

    #[test]
    fn output_mode_parsing() {
        assert_eq!(OutputMode::from_config("normal"), OutputMode::Normal);
        assert_eq!(OutputMode::from_config("ALL"), OutputMode::All);
        assert_eq!(OutputMode::from_config("data"), OutputMode::Data);
        assert_eq!(OutputMode::from_config("weekly"), OutputMode::Data);
    }

    #[test]
    fn finer_levels_chain() {
        assert_eq!(Level::Data.finer(), Some(Level::Normal));
        assert_eq!(Level::Small.finer(), None);
    }
}
