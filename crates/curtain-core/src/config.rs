//! Game configuration
//!
//! Configuration is validated once, when it is loaded. The scheduler and the
//! judge assume a valid configuration and have no runtime failure paths.
//!
//! Every field has a default matching the classic tuning, so a RON file only
//! needs to name the values it changes:
//!
//! ```
//! use curtain_core::GameConfig;
//!
//! let config = GameConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.judge.window.full_deadline_ms, 1000);
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// An inclusive range of milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsRange {
    pub min: u64,
    pub max: u64,
}

impl MsRange {
    /// Create a range; validity is checked by [`MsRange::validate`]
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// A range containing a single value
    pub const fn fixed(ms: u64) -> Self {
        Self { min: ms, max: ms }
    }

    /// Check whether `ms` lies inside the range
    pub fn contains(&self, ms: u64) -> bool {
        (self.min..=self.max).contains(&ms)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::EmptyRange {
                field,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// How a delay exactly equal to a deadline is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeadlineBound {
    /// `delay == deadline` counts as inside the window
    #[default]
    Inclusive,
    /// `delay == deadline` counts as too late
    Exclusive,
}

/// Reaction deadlines, measured from the moment the exposure opens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionWindow {
    /// Guards within this delay reflect
    pub perfect_deadline_ms: u64,
    /// Guards within this delay block; past it the defender burns
    pub full_deadline_ms: u64,
    /// Tie-break rule at both deadlines
    pub bound: DeadlineBound,
}

impl ReactionWindow {
    /// Create an inclusive window
    pub const fn new(perfect_deadline_ms: u64, full_deadline_ms: u64) -> Self {
        Self {
            perfect_deadline_ms,
            full_deadline_ms,
            bound: DeadlineBound::Inclusive,
        }
    }

    /// Use a different tie-break rule
    pub const fn with_bound(mut self, bound: DeadlineBound) -> Self {
        self.bound = bound;
        self
    }

    fn within(&self, delay_ms: u64, deadline_ms: u64) -> bool {
        match self.bound {
            DeadlineBound::Inclusive => delay_ms <= deadline_ms,
            DeadlineBound::Exclusive => delay_ms < deadline_ms,
        }
    }

    /// Check whether a guard `delay_ms` after opening is perfect
    pub fn within_perfect(&self, delay_ms: u64) -> bool {
        self.within(delay_ms, self.perfect_deadline_ms)
    }

    /// Check whether a guard `delay_ms` after opening still counts
    pub fn within_full(&self, delay_ms: u64) -> bool {
        self.within(delay_ms, self.full_deadline_ms)
    }

    /// Check whether the window has closed `elapsed_ms` after opening
    pub fn expired(&self, elapsed_ms: u64) -> bool {
        !self.within_full(elapsed_ms)
    }

    /// Validate deadline ordering
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.full_deadline_ms == 0 {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.perfect_deadline_ms > self.full_deadline_ms {
            return Err(ConfigError::DeadlineOrder {
                perfect_ms: self.perfect_deadline_ms,
                full_ms: self.full_deadline_ms,
            });
        }
        Ok(())
    }
}

impl Default for ReactionWindow {
    fn default() -> Self {
        Self::new(300, 1000)
    }
}

/// Exposure cycle tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Probability that a committed cycle is a feint
    pub feint_rate: f64,
    /// Tell beats shown before each commit
    pub preamble_beat_count: u32,
    /// How long each tell beat is shown
    pub preamble_beat_duration_ms: u64,
    /// How long a feint is shown before it resolves
    pub feint_duration_ms: u64,
    /// Gap between scheduling references and the next step of the cycle
    pub cycle_interval_ms: MsRange,
    /// How long a genuine exposure stays open
    pub exposure_duration_ms: MsRange,
}

impl SchedulerConfig {
    /// Validate ranges and probabilities
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cycle_interval_ms.validate("cycle_interval_ms")?;
        if self.cycle_interval_ms.min == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "cycle_interval_ms",
            });
        }
        self.exposure_duration_ms
            .validate("exposure_duration_ms")?;

        if !(0.0..=1.0).contains(&self.feint_rate) {
            return Err(ConfigError::ProbabilityOutOfRange {
                field: "feint_rate",
                value: self.feint_rate,
            });
        }

        if self.preamble_beat_count > 0
            && self.preamble_beat_duration_ms >= self.cycle_interval_ms.min
        {
            return Err(ConfigError::BeatTooLong {
                field: "preamble_beat_duration_ms",
                duration_ms: self.preamble_beat_duration_ms,
                interval_ms: self.cycle_interval_ms.min,
            });
        }

        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            feint_rate: 0.25,
            preamble_beat_count: 2,
            preamble_beat_duration_ms: 500,
            feint_duration_ms: 500,
            cycle_interval_ms: MsRange::new(1000, 3000),
            exposure_duration_ms: MsRange::new(1000, 3000),
        }
    }
}

/// Reaction judging and progress tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub window: ReactionWindow,
    /// Burns that end the run
    pub max_burn_count: u32,
    /// Progress needed to clear the run
    pub clear_target: f64,
    /// Added to the clear target after every reflect
    pub clear_target_growth: Option<f64>,
    /// Fraction of the target that fires the one-shot "smile" threshold
    pub smile_threshold_fraction: f64,
    /// Progress gained per second of unguarded idle time
    pub progress_per_second: f64,
    /// An exposure that opens on an unguarded defender is an instant loss
    pub instant_fail_on_exposure: bool,
    /// A block or reflect clears the burn counter
    pub reset_burns_on_success: bool,
    /// How long each judged reaction is presented before the round resolves
    pub reaction_presentation_ms: u64,
    /// Extra presentation time after the run-ending burn
    pub final_presentation_ms: u64,
}

impl JudgeConfig {
    /// Validate deadlines, counters and progress parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;

        if self.max_burn_count == 0 {
            return Err(ConfigError::ZeroBurnCount);
        }

        positive("clear_target", self.clear_target)?;
        positive("progress_per_second", self.progress_per_second)?;

        if let Some(growth) = self.clear_target_growth {
            if !growth.is_finite() || growth < 0.0 {
                return Err(ConfigError::NegativeGrowth(growth));
            }
        }

        let fraction = self.smile_threshold_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::FractionOutOfRange {
                field: "smile_threshold_fraction",
                value: fraction,
            });
        }

        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            window: ReactionWindow::default(),
            max_burn_count: 3,
            clear_target: 60.0,
            clear_target_growth: None,
            smile_threshold_fraction: 0.7,
            progress_per_second: 1.0,
            instant_fail_on_exposure: false,
            reset_burns_on_success: false,
            reaction_presentation_ms: 3000,
            final_presentation_ms: 3000,
        }
    }
}

/// Complete configuration for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    pub scheduler: SchedulerConfig,
    pub judge: JudgeConfig,
}

impl GameConfig {
    /// Validate both halves and the constraints between them
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.judge.validate()?;

        // The exposure must stay open for the whole reaction window
        let exposure_ms = self.scheduler.exposure_duration_ms.min;
        let deadline_ms = self.judge.window.full_deadline_ms;
        if exposure_ms < deadline_ms {
            return Err(ConfigError::ExposureShorterThanDeadline {
                exposure_ms,
                deadline_ms,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(GameConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_reversed_interval_rejected() {
        let mut config = GameConfig::default();
        config.scheduler.cycle_interval_ms = MsRange::new(3000, 1000);

        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyRange {
                field: "cycle_interval_ms",
                min: 3000,
                max: 1000,
            })
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = GameConfig::default();
        config.scheduler.preamble_beat_count = 0;
        config.scheduler.cycle_interval_ms = MsRange::new(0, 100);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                field: "cycle_interval_ms"
            })
        );
    }

    #[test]
    fn test_deadline_order_rejected() {
        let mut config = GameConfig::default();
        config.judge.window = ReactionWindow::new(1200, 1000);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DeadlineOrder {
                perfect_ms: 1200,
                full_ms: 1000
            })
        ));
    }

    #[test]
    fn test_equal_deadlines_allowed() {
        let mut config = GameConfig::default();
        config.judge.window = ReactionWindow::new(1000, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_probability_and_fraction_bounds() {
        let mut config = GameConfig::default();
        config.scheduler.feint_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProbabilityOutOfRange { .. })
        ));

        let mut config = GameConfig::default();
        config.scheduler.feint_rate = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = GameConfig::default();
        config.judge.smile_threshold_fraction = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FractionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_progress_parameters() {
        let mut config = GameConfig::default();
        config.judge.clear_target = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "clear_target",
                ..
            })
        ));

        let mut config = GameConfig::default();
        config.judge.clear_target_growth = Some(-1.0);
        assert_eq!(config.validate(), Err(ConfigError::NegativeGrowth(-1.0)));

        let mut config = GameConfig::default();
        config.judge.max_burn_count = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroBurnCount));
    }

    #[test]
    fn test_beat_must_fit_in_interval() {
        let mut config = GameConfig::default();
        config.scheduler.preamble_beat_duration_ms = 1000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BeatTooLong { .. })
        ));

        // Irrelevant when there are no beats
        config.scheduler.preamble_beat_count = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_exposure_covers_deadline() {
        let mut config = GameConfig::default();
        config.scheduler.exposure_duration_ms = MsRange::new(500, 3000);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ExposureShorterThanDeadline {
                exposure_ms: 500,
                deadline_ms: 1000,
            })
        );
    }

    #[test]
    fn test_window_bounds() {
        let window = ReactionWindow::new(500, 1000);
        assert!(window.within_perfect(500));
        assert!(!window.within_perfect(501));
        assert!(window.within_full(1000));
        assert!(!window.expired(1000));
        assert!(window.expired(1001));

        let strict = window.with_bound(DeadlineBound::Exclusive);
        assert!(!strict.within_perfect(500));
        assert!(strict.within_full(999));
        assert!(strict.expired(1000));
    }

    #[test]
    fn test_config_ron() {
        let ron_str = r#"
        (
            scheduler: (
                feint_rate: 0.5,
                cycle_interval_ms: (min: 800, max: 1600),
            ),
            judge: (
                window: (perfect_deadline_ms: 250, full_deadline_ms: 700, bound: Exclusive),
                max_burn_count: 5,
                clear_target_growth: Some(10.0),
                instant_fail_on_exposure: true,
            ),
        )
        "#;

        let config: GameConfig = ron::from_str(ron_str).unwrap();
        assert_eq!(config.scheduler.feint_rate, 0.5);
        assert_eq!(config.scheduler.cycle_interval_ms, MsRange::new(800, 1600));
        // Unnamed fields keep their defaults
        assert_eq!(config.scheduler.preamble_beat_count, 2);
        assert_eq!(config.judge.window.bound, DeadlineBound::Exclusive);
        assert_eq!(config.judge.max_burn_count, 5);
        assert_eq!(config.judge.clear_target_growth, Some(10.0));
        assert!(config.judge.instant_fail_on_exposure);
        assert!(config.validate().is_ok());
    }
}
