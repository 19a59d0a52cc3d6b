//! Exposure scheduling
//!
//! The scheduler owns the exposure cycle:
//!
//! ```text
//! Hidden ──beat──▶ Preamble ──▶ Hidden ──…──▶ commit ─┬─▶ Feinting ──▶ Hidden
//!                                                     └─▶ Exposed ──▶ Hidden
//!                                                            │          ▲
//!                                                            └▶ Cooldown┘
//! ```
//!
//! Every step of the cycle is placed one `cycle_interval_ms` after the
//! latest scheduling reference (last close, last feint, last tell beat, last
//! round resolution), never after "now". A slow or variable-length previous
//! round therefore cannot produce overlapping or negative-length cycles.
//!
//! Delays are deadlines checked on each tick; nothing sleeps.

use crate::config::SchedulerConfig;
use crate::error::{ConfigError, ProtocolViolation};
use crate::event::{Event, Step};
use crate::rng::RandomSource;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Where the exposure actor is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureState {
    /// Waiting for the next step of the cycle
    Hidden,
    /// Showing a tell beat
    Preamble,
    /// Showing a feint; no reaction window
    Feinting,
    /// Exposed; the reaction window is running
    Exposed,
    /// Exposure closed, waiting for the round to finish presenting
    Cooldown,
}

impl ExposureState {
    /// Check whether a new cycle may be armed in this state
    pub fn can_arm(&self) -> bool {
        matches!(self, ExposureState::Hidden | ExposureState::Cooldown)
    }
}

/// Drives the exposure cycle from ticks
#[derive(Debug)]
pub struct ExposureScheduler {
    config: SchedulerConfig,
    rng: Box<dyn RandomSource>,
    state: ExposureState,
    /// Interval drawn by the last `arm`
    cycle_interval_ms: u64,
    /// Duration drawn by the last `open_exposure`
    exposure_duration_ms: u64,
    /// When the scheduler was started; the first scheduling reference
    origin: Timestamp,
    last_close: Option<Timestamp>,
    last_feint: Option<Timestamp>,
    last_preamble: Option<Timestamp>,
    last_resolved: Option<Timestamp>,
    last_open: Option<Timestamp>,
    /// Next beat or commit, while hidden
    next_at: Timestamp,
    /// End of the current beat, feint or exposure
    ready_at: Option<Timestamp>,
    beats_done: u32,
    cycles: u64,
}

impl ExposureScheduler {
    /// Create a scheduler started at `now` and arm the first cycle
    pub fn new(
        config: SchedulerConfig,
        rng: Box<dyn RandomSource>,
        now: Timestamp,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut scheduler = Self {
            config,
            rng,
            state: ExposureState::Hidden,
            cycle_interval_ms: 0,
            exposure_duration_ms: 0,
            origin: now,
            last_close: None,
            last_feint: None,
            last_preamble: None,
            last_resolved: None,
            last_open: None,
            next_at: now,
            ready_at: None,
            beats_done: 0,
            cycles: 0,
        };
        scheduler.arm();
        Ok(scheduler)
    }

    /// Current cycle state
    pub fn state(&self) -> ExposureState {
        self.state
    }

    /// Whether the exposure is visible; consumed by rendering
    pub fn is_exposed(&self) -> bool {
        self.state == ExposureState::Exposed
    }

    /// Interval drawn by the last arm
    pub fn cycle_interval_ms(&self) -> u64 {
        self.cycle_interval_ms
    }

    /// Duration drawn for the current or last exposure
    pub fn exposure_duration_ms(&self) -> u64 {
        self.exposure_duration_ms
    }

    /// When the next beat or commit is due
    pub fn next_at(&self) -> Timestamp {
        self.next_at
    }

    /// When the current beat, feint or exposure ends
    pub fn ready_at(&self) -> Option<Timestamp> {
        self.ready_at
    }

    /// When the exposure last closed
    pub fn last_close(&self) -> Option<Timestamp> {
        self.last_close
    }

    /// When the last feint resolved
    pub fn last_feint(&self) -> Option<Timestamp> {
        self.last_feint
    }

    /// When the last tell beat started
    pub fn last_preamble(&self) -> Option<Timestamp> {
        self.last_preamble
    }

    /// When the exposure last opened
    pub fn last_open(&self) -> Option<Timestamp> {
        self.last_open
    }

    /// Tell beats shown in the current cycle
    pub fn beats_done(&self) -> u32 {
        self.beats_done
    }

    /// Cycles committed so far (feints and exposures)
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// The latest scheduling reference
    pub fn reference(&self) -> Timestamp {
        [
            self.last_close,
            self.last_feint,
            self.last_preamble,
            self.last_resolved,
        ]
        .into_iter()
        .flatten()
        .fold(self.origin, Timestamp::max)
    }

    /// Draw a new cycle interval and schedule the next step after the
    /// latest reference
    ///
    /// Returns the new `next_at`, or `None` if the current state cannot arm.
    pub fn arm(&mut self) -> Option<Timestamp> {
        if !self.state.can_arm() {
            warn!(state = ?self.state, "arm requested outside hidden/cooldown, ignoring");
            return None;
        }

        let range = self.config.cycle_interval_ms;
        self.cycle_interval_ms = self.rng.range_u64(range.min, range.max);
        self.next_at = self.reference().add_ms(self.cycle_interval_ms);
        debug!(
            interval_ms = self.cycle_interval_ms,
            next_at = %self.next_at,
            "cycle armed"
        );
        Some(self.next_at)
    }

    /// Advance the cycle to `now`
    pub fn tick(&mut self, now: Timestamp) -> Step {
        let mut step = Step::new();

        // Every transition either waits on a deadline later than `now` or
        // moves to a state that does; the bound only guards misuse.
        for _ in 0..8 {
            if !self.advance(now, &mut step) {
                break;
            }
        }

        step
    }

    /// Perform at most one due transition
    fn advance(&mut self, now: Timestamp, step: &mut Step) -> bool {
        match self.state {
            ExposureState::Hidden => {
                if now < self.next_at {
                    return false;
                }
                if self.beats_done < self.config.preamble_beat_count {
                    self.start_beat(now, step);
                } else {
                    self.commit(now, step);
                }
                true
            }
            ExposureState::Preamble => match self.ready_at {
                Some(ready_at) if now >= ready_at => {
                    self.ready_at = None;
                    self.state = ExposureState::Hidden;
                    step.push(Event::PreambleEnded { at: now });
                    true
                }
                _ => false,
            },
            ExposureState::Feinting => match self.ready_at {
                Some(ready_at) if now >= ready_at => {
                    self.resolve_feint(now, step);
                    true
                }
                _ => false,
            },
            ExposureState::Exposed => match self.ready_at {
                Some(ready_at) if now >= ready_at => {
                    step.merge(self.close_exposure(now));
                    true
                }
                _ => false,
            },
            ExposureState::Cooldown => false,
        }
    }

    fn start_beat(&mut self, now: Timestamp, step: &mut Step) {
        self.beats_done += 1;
        self.last_preamble = Some(now);
        self.state = ExposureState::Preamble;
        self.ready_at = Some(now.add_ms(self.config.preamble_beat_duration_ms));
        self.next_at = self.reference().add_ms(self.cycle_interval_ms);

        debug!(beat = self.beats_done, at = %now, "preamble beat");
        step.push(Event::PreambleBeat {
            at: now,
            beat: self.beats_done,
        });
    }

    /// All tells shown: either feint or open for real
    fn commit(&mut self, now: Timestamp, step: &mut Step) {
        self.beats_done = 0;
        self.cycles += 1;

        if self.rng.chance(self.config.feint_rate) {
            self.state = ExposureState::Feinting;
            self.ready_at = Some(now.add_ms(self.config.feint_duration_ms));
            info!(at = %now, cycle = self.cycles, "feint started");
            step.push(Event::FeintStarted { at: now });
        } else {
            step.merge(self.open_exposure(now));
        }
    }

    fn resolve_feint(&mut self, now: Timestamp, step: &mut Step) {
        self.ready_at = None;
        self.last_feint = Some(now);
        self.state = ExposureState::Hidden;
        step.push(Event::FeintResolved { at: now });
        self.arm();
    }

    /// Open the exposure at `now`
    ///
    /// Normally reached through [`tick`](Self::tick) once the tells are
    /// done; callable directly from `Hidden` to force an exposure.
    pub fn open_exposure(&mut self, now: Timestamp) -> Step {
        if self.state != ExposureState::Hidden {
            let violation = ProtocolViolation::OpenWhileBusy { at: now };
            warn!(%violation, state = ?self.state, "ignoring exposure open");
            return Step::violation(violation);
        }

        let range = self.config.exposure_duration_ms;
        self.exposure_duration_ms = self.rng.range_u64(range.min, range.max);
        self.state = ExposureState::Exposed;
        self.beats_done = 0;
        self.last_open = Some(now);
        self.ready_at = Some(now.add_ms(self.exposure_duration_ms));

        info!(at = %now, duration_ms = self.exposure_duration_ms, "exposure opened");
        let mut step = Step::new();
        step.push(Event::ExposureOpened {
            at: now,
            duration_ms: self.exposure_duration_ms,
        });
        step
    }

    /// Close the exposure at `now`
    ///
    /// Only permitted while exposed. The cycle re-arms right away unless
    /// the round it opened is still presenting, in which case the scheduler
    /// waits in `Cooldown` for [`on_round_resolved`](Self::on_round_resolved).
    pub fn close_exposure(&mut self, now: Timestamp) -> Step {
        self.close(now, true)
    }

    fn close(&mut self, now: Timestamp, round_pending: bool) -> Step {
        if self.state != ExposureState::Exposed {
            let violation = ProtocolViolation::CloseWithoutExposure { at: now };
            warn!(%violation, state = ?self.state, "ignoring exposure close");
            return Step::violation(violation);
        }

        self.ready_at = None;
        self.last_close = Some(now);
        info!(at = %now, "exposure closed");

        let mut step = Step::new();
        step.push(Event::ExposureClosed { at: now });

        if round_pending {
            self.state = ExposureState::Cooldown;
        } else {
            self.state = ExposureState::Hidden;
            self.arm();
        }
        step
    }

    /// The round opened by the last exposure finished presenting
    ///
    /// Closes a still-open exposure, or leaves `Cooldown`, and re-arms.
    pub fn on_round_resolved(&mut self, now: Timestamp) -> Step {
        match self.state {
            ExposureState::Exposed => {
                self.last_resolved = Some(now);
                self.close(now, false)
            }
            ExposureState::Cooldown => {
                self.last_resolved = Some(now);
                self.state = ExposureState::Hidden;
                self.arm();
                Step::new()
            }
            _ => {
                let violation = ProtocolViolation::RoundNotPending { at: now };
                warn!(%violation, state = ?self.state, "ignoring round resolution");
                Step::violation(violation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MsRange;
    use crate::rng::{GameRng, ScriptedRandom};
    use proptest::prelude::*;

    const LOW: u64 = ScriptedRandom::LOW;
    const HIGH: u64 = ScriptedRandom::HIGH;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            feint_rate: 0.25,
            preamble_beat_count: 2,
            preamble_beat_duration_ms: 500,
            feint_duration_ms: 500,
            cycle_interval_ms: MsRange::new(1000, 3000),
            exposure_duration_ms: MsRange::new(1000, 3000),
        }
    }

    fn scripted(config: SchedulerConfig, values: Vec<u64>) -> ExposureScheduler {
        ExposureScheduler::new(config, Box::new(ScriptedRandom::new(values)), Timestamp::ZERO)
            .unwrap()
    }

    fn t(ms: u64) -> Timestamp {
        Timestamp(ms)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config();
        bad.exposure_duration_ms = MsRange::new(2000, 1000);
        let result = ExposureScheduler::new(bad, Box::new(GameRng::new(1)), Timestamp::ZERO);
        assert!(matches!(result, Err(ConfigError::EmptyRange { .. })));
    }

    #[test]
    fn test_full_cycle_opens_after_beats() {
        // interval=min, no feint (HIGH fails chance), exposure=min
        let mut s = scripted(config(), vec![LOW, HIGH, LOW]);
        assert_eq!(s.next_at(), t(1000));

        assert!(s.tick(t(999)).is_empty());

        let step = s.tick(t(1000));
        assert_eq!(step.events, vec![Event::PreambleBeat { at: t(1000), beat: 1 }]);
        assert_eq!(s.state(), ExposureState::Preamble);
        assert_eq!(s.next_at(), t(2000));

        let step = s.tick(t(1500));
        assert_eq!(step.events, vec![Event::PreambleEnded { at: t(1500) }]);
        assert_eq!(s.state(), ExposureState::Hidden);

        s.tick(t(2000));
        assert_eq!(s.beats_done(), 2);
        s.tick(t(2500));

        // One more interval after the last beat, the cycle commits
        assert!(s.tick(t(2999)).is_empty());
        let step = s.tick(t(3000));
        assert_eq!(
            step.events,
            vec![Event::ExposureOpened {
                at: t(3000),
                duration_ms: 1000
            }]
        );
        assert!(s.is_exposed());
        assert_eq!(s.last_open(), Some(t(3000)));
        assert_eq!(s.cycles(), 1);
    }

    #[test]
    fn test_feint_resolves_and_rearms() {
        let mut cfg = config();
        cfg.preamble_beat_count = 0;
        // interval=min, feint (LOW passes chance), next interval=max
        let mut s = scripted(cfg, vec![LOW, LOW, HIGH]);

        let step = s.tick(t(1000));
        assert_eq!(step.events, vec![Event::FeintStarted { at: t(1000) }]);
        assert_eq!(s.state(), ExposureState::Feinting);
        assert!(!s.is_exposed());

        let step = s.tick(t(1500));
        assert_eq!(step.events, vec![Event::FeintResolved { at: t(1500) }]);
        assert_eq!(s.state(), ExposureState::Hidden);
        assert_eq!(s.last_feint(), Some(t(1500)));
        assert_eq!(s.cycle_interval_ms(), 3000);
        assert_eq!(s.next_at(), t(4500));
    }

    #[test]
    fn test_duration_close_waits_in_cooldown() {
        let mut cfg = config();
        cfg.preamble_beat_count = 0;
        let mut s = scripted(cfg, vec![LOW, HIGH, LOW]);

        s.tick(t(1000));
        assert!(s.is_exposed());

        let step = s.tick(t(2000));
        assert_eq!(step.events, vec![Event::ExposureClosed { at: t(2000) }]);
        assert_eq!(s.state(), ExposureState::Cooldown);

        // Nothing happens until the round resolves
        assert!(s.tick(t(3500)).is_empty());

        let step = s.on_round_resolved(t(4000));
        assert!(step.is_empty());
        assert_eq!(s.state(), ExposureState::Hidden);
        // Scheduled after the resolution, the latest reference
        assert!(s.next_at() >= t(5000));
    }

    #[test]
    fn test_resolution_closes_open_exposure() {
        let mut cfg = config();
        cfg.preamble_beat_count = 0;
        let mut s = scripted(cfg, vec![LOW, HIGH, HIGH]);

        s.tick(t(1000));
        assert_eq!(s.exposure_duration_ms(), 3000);

        let step = s.on_round_resolved(t(1800));
        assert_eq!(step.events, vec![Event::ExposureClosed { at: t(1800) }]);
        assert_eq!(s.state(), ExposureState::Hidden);
        assert_eq!(s.last_close(), Some(t(1800)));
    }

    #[test]
    fn test_out_of_state_requests_are_dropped() {
        let mut s = scripted(config(), vec![LOW]);

        let step = s.close_exposure(t(10));
        assert_eq!(
            step.violation,
            Some(ProtocolViolation::CloseWithoutExposure { at: t(10) })
        );
        assert_eq!(s.state(), ExposureState::Hidden);

        let step = s.on_round_resolved(t(20));
        assert_eq!(step.violation, Some(ProtocolViolation::RoundNotPending { at: t(20) }));

        s.open_exposure(t(30));
        let step = s.open_exposure(t(40));
        assert_eq!(step.violation, Some(ProtocolViolation::OpenWhileBusy { at: t(40) }));
        assert_eq!(s.arm(), None);
    }

    #[test]
    fn test_forced_open_from_hidden() {
        let mut s = scripted(config(), vec![LOW]);
        let step = s.open_exposure(t(5));
        assert_eq!(step.events.len(), 1);
        assert!(s.is_exposed());
        assert_eq!(s.ready_at(), Some(t(1005)));
    }

    #[test]
    fn test_large_tick_gap_catches_up() {
        let mut cfg = config();
        cfg.preamble_beat_duration_ms = 100;
        let mut s = scripted(cfg, vec![LOW]);

        s.tick(t(1200));
        assert_eq!(s.next_at(), t(2200));

        // A single late tick ends the beat and runs the next due one
        let step = s.tick(t(5000));
        assert_eq!(
            step.events,
            vec![
                Event::PreambleEnded { at: t(5000) },
                Event::PreambleBeat { at: t(5000), beat: 2 },
            ]
        );
        assert_eq!(s.state(), ExposureState::Preamble);
        assert_eq!(s.next_at(), t(6000));
    }

    #[test]
    fn test_interval_samples_are_uniform() {
        let mut s = ExposureScheduler::new(config(), Box::new(GameRng::new(99)), Timestamp::ZERO)
            .unwrap();

        let n = 10_000;
        let samples: Vec<f64> = (0..n)
            .map(|_| {
                s.arm();
                let v = s.cycle_interval_ms();
                assert!((1000..=3000).contains(&v));
                v as f64
            })
            .collect();

        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;

        // Uniform on [1000, 3000]: mean 2000, variance (2001^2 - 1) / 12
        let expected_var = (2001.0f64.powi(2) - 1.0) / 12.0;
        assert!((mean - 2000.0).abs() < 25.0, "mean {mean}");
        assert!((var / expected_var - 1.0).abs() < 0.05, "variance {var}");
    }

    proptest! {
        #[test]
        fn prop_arm_stays_in_range(min in 1u64..5000, span in 0u64..5000, seed: u64) {
            let mut cfg = config();
            cfg.preamble_beat_count = 0;
            cfg.cycle_interval_ms = MsRange::new(min, min + span);
            let mut s = ExposureScheduler::new(cfg, Box::new(GameRng::new(seed)), Timestamp::ZERO)
                .unwrap();
            for _ in 0..64 {
                s.arm();
                prop_assert!((min..=min + span).contains(&s.cycle_interval_ms()));
            }
        }

        #[test]
        fn prop_next_step_never_precedes_references(
            seed: u64,
            gaps in proptest::collection::vec(1u64..4000, 1..60),
        ) {
            let mut cfg = config();
            cfg.feint_rate = 0.5;
            let mut s = ExposureScheduler::new(cfg, Box::new(GameRng::new(seed)), Timestamp::ZERO)
                .unwrap();

            let mut now = Timestamp::ZERO;
            for gap in gaps {
                now = now.add_ms(gap);
                s.tick(now);
                if s.state() == ExposureState::Cooldown || (s.is_exposed() && gap % 3 == 0) {
                    s.on_round_resolved(now);
                }
                if s.state().can_arm() {
                    prop_assert!(s.next_at() >= s.reference());
                    for r in [s.last_close(), s.last_feint(), s.last_preamble()].into_iter().flatten() {
                        prop_assert!(s.next_at() >= r);
                    }
                }
            }
        }
    }
}
