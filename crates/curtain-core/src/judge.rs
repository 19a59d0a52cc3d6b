//! Reaction judging
//!
//! The judge owns the defender's side of the round:
//! - the guard state, toggled by external guard-start / guard-cancel edges
//! - classification of a guard against the reaction window
//! - the presentation gate that holds the scheduler while a result shows
//! - the progress resource that wins the run
//!
//! Classification uses the absolute difference between the guard timestamp
//! and the exposure timestamp, never a frame count, so results do not depend
//! on the tick rate.

use crate::config::{JudgeConfig, ReactionWindow};
use crate::error::{ConfigError, ProtocolViolation};
use crate::event::{Event, GameResult, Outcome, Step};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Name of the one-shot threshold fired part-way to the clear target
pub const SMILE_THRESHOLD: &str = "smile";

/// Where the judge is in the round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JudgeState {
    /// No round in flight; progress accumulates
    Idle,
    /// Exposure open, waiting for a guard or the full deadline
    AwaitingReaction,
    /// Outcome decided, presentation running
    Resolving,
    /// The run is over
    Terminal,
}

/// The defender's guard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardState {
    pub is_guarding: bool,
    /// Start of the most recent guard
    pub started_at: Option<Timestamp>,
}

/// Classify a guard landing `delay_ms` after the exposure opened
///
/// Degrades monotonically with the delay: `Reflected`, then `Blocked`, then
/// `Burned`.
pub fn classify(window: &ReactionWindow, delay_ms: u64) -> Outcome {
    if window.within_perfect(delay_ms) {
        Outcome::Reflected
    } else if window.within_full(delay_ms) {
        Outcome::Blocked
    } else {
        Outcome::Burned
    }
}

/// Accumulates unguarded idle time toward the clear target
///
/// Time is kept in whole milliseconds so the value reached after a given
/// amount of play does not depend on how it was split into ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResource {
    accumulated_ms: u64,
    per_second: f64,
    target: f64,
    smile_fraction: f64,
    smile_fired: bool,
    running_since: Option<Timestamp>,
}

impl ProgressResource {
    /// Create an empty resource
    pub fn new(target: f64, per_second: f64, smile_fraction: f64) -> Self {
        Self {
            accumulated_ms: 0,
            per_second,
            target,
            smile_fraction,
            smile_fired: false,
            running_since: None,
        }
    }

    /// Current value, clamped to `[0, target]`
    pub fn value(&self) -> f64 {
        (self.accumulated_ms as f64 / 1000.0 * self.per_second).min(self.target)
    }

    /// Current clear target
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Value as a fraction of the target
    pub fn fraction(&self) -> f64 {
        self.value() / self.target
    }

    /// Check whether the target has been reached
    pub fn is_cleared(&self) -> bool {
        self.value() >= self.target
    }

    /// Check whether time is currently accumulating
    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Start accumulating from `at`; no-op if already running
    pub fn resume(&mut self, at: Timestamp) {
        if self.running_since.is_none() {
            self.running_since = Some(at);
        }
    }

    /// Bank time up to `at` and stop accumulating
    pub fn pause(&mut self, at: Timestamp) -> bool {
        let changed = self.settle(at);
        self.running_since = None;
        changed
    }

    /// Bank time up to `now`; returns true if the value moved
    pub fn settle(&mut self, now: Timestamp) -> bool {
        match self.running_since {
            Some(since) if now > since => {
                self.accumulated_ms += now.saturating_since(since);
                self.running_since = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Raise the target
    pub fn grow_target(&mut self, growth: f64) {
        self.target += growth;
    }

    /// Fire the one-shot threshold if it has been reached
    pub fn take_threshold(&mut self) -> bool {
        if !self.smile_fired && self.value() >= self.target * self.smile_fraction {
            self.smile_fired = true;
            return true;
        }
        false
    }
}

/// A decided round waiting for its presentation to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    outcome: Outcome,
    ready_at: Timestamp,
    ends_run: bool,
}

/// Classifies guards and drives progress
#[derive(Debug)]
pub struct ReactionJudge {
    config: JudgeConfig,
    state: JudgeState,
    guard: GuardState,
    progress: ProgressResource,
    opened_at: Option<Timestamp>,
    pending: Option<Pending>,
    burns: u32,
    rounds: u32,
    result: Option<GameResult>,
}

impl ReactionJudge {
    /// Create an idle judge; progress starts accumulating at `now`
    pub fn new(config: JudgeConfig, now: Timestamp) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut progress = ProgressResource::new(
            config.clear_target,
            config.progress_per_second,
            config.smile_threshold_fraction,
        );
        progress.resume(now);

        Ok(Self {
            config,
            state: JudgeState::Idle,
            guard: GuardState::default(),
            progress,
            opened_at: None,
            pending: None,
            burns: 0,
            rounds: 0,
            result: None,
        })
    }

    pub fn state(&self) -> JudgeState {
        self.state
    }

    pub fn guard(&self) -> GuardState {
        self.guard
    }

    pub fn is_guarding(&self) -> bool {
        self.guard.is_guarding
    }

    pub fn progress(&self) -> &ProgressResource {
        &self.progress
    }

    /// Burns so far; renderers use it as the damage level
    pub fn burns(&self) -> u32 {
        self.burns
    }

    /// Rounds judged so far
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Opening time of the round in flight
    pub fn opened_at(&self) -> Option<Timestamp> {
        self.opened_at
    }

    /// Outcome currently being presented
    pub fn pending_outcome(&self) -> Option<Outcome> {
        self.pending.map(|p| p.outcome)
    }

    /// How the run ended, once terminal
    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn is_terminal(&self) -> bool {
        self.state == JudgeState::Terminal
    }

    fn dropped(&self, violation: ProtocolViolation) -> Step {
        warn!(%violation, state = ?self.state, "ignoring out-of-state event");
        Step::violation(violation)
    }

    /// The exposure opened at `t_open`
    pub fn on_exposure_opened(&mut self, t_open: Timestamp) -> Step {
        match self.state {
            JudgeState::Terminal => {
                return self.dropped(ProtocolViolation::AfterGameOver { at: t_open })
            }
            JudgeState::Idle => {}
            JudgeState::AwaitingReaction | JudgeState::Resolving => {
                return self.dropped(ProtocolViolation::ExposureDuringRound { at: t_open })
            }
        }

        // A target crossed before the opening wins the run
        let mut step = self.settle_progress(t_open);
        if self.is_terminal() {
            return step;
        }
        if self.progress.pause(t_open) {
            step.push(self.progress_event());
        }
        self.opened_at = Some(t_open);
        self.state = JudgeState::AwaitingReaction;
        self.rounds += 1;

        if self.guard.is_guarding {
            // Held through the opening: judged at the opening instant
            debug!(at = %t_open, "guard held through opening");
            step.merge(self.judge(classify(&self.config.window, 0), t_open, 0));
        } else if self.config.instant_fail_on_exposure {
            step.merge(self.judge(Outcome::Missed, t_open, 0));
        }
        step
    }

    /// The exposure closed at `at`
    ///
    /// Informational: the reaction deadline runs from the opening, so a
    /// close never changes a classification.
    pub fn on_exposure_closed(&mut self, at: Timestamp) -> Step {
        if self.state == JudgeState::AwaitingReaction {
            debug!(%at, "exposure closed before a reaction");
        }
        Step::new()
    }

    /// The defender started guarding at `at`
    pub fn guard_started(&mut self, at: Timestamp) -> Step {
        if self.state == JudgeState::Terminal {
            return self.dropped(ProtocolViolation::AfterGameOver { at });
        }
        if let (true, Some(since)) = (self.guard.is_guarding, self.guard.started_at) {
            return self.dropped(ProtocolViolation::GuardAlreadyActive { at, since });
        }

        let mut step = self.settle_progress(at);
        if self.is_terminal() {
            return step;
        }

        self.guard = GuardState {
            is_guarding: true,
            started_at: Some(at),
        };

        match self.state {
            JudgeState::Idle => {
                debug!(%at, "guard with no exposure");
                if self.progress.pause(at) {
                    step.push(self.progress_event());
                }
            }
            JudgeState::AwaitingReaction => {
                if let Some(t_open) = self.opened_at {
                    let delay_ms = at.saturating_since(t_open);
                    step.merge(self.judge(classify(&self.config.window, delay_ms), at, delay_ms));
                }
            }
            JudgeState::Resolving | JudgeState::Terminal => {}
        }
        step
    }

    /// The defender released the guard at `at`
    ///
    /// Never undoes a classification already made.
    pub fn guard_cancelled(&mut self, at: Timestamp) -> Step {
        if self.state == JudgeState::Terminal {
            return self.dropped(ProtocolViolation::AfterGameOver { at });
        }
        if !self.guard.is_guarding {
            return self.dropped(ProtocolViolation::NoActiveGuard { at });
        }

        self.guard.is_guarding = false;
        if self.state == JudgeState::Idle {
            self.progress.resume(at);
        }
        Step::new()
    }

    /// Advance deadlines and progress to `now`
    pub fn tick(&mut self, now: Timestamp) -> Step {
        match self.state {
            JudgeState::Idle => self.settle_progress(now),
            JudgeState::AwaitingReaction => match self.opened_at {
                Some(t_open) if self.config.window.expired(now.saturating_since(t_open)) => {
                    self.judge(Outcome::Burned, now, now.saturating_since(t_open))
                }
                _ => Step::new(),
            },
            JudgeState::Resolving => match self.pending {
                Some(pending) if now >= pending.ready_at => self.complete(pending, now),
                _ => Step::new(),
            },
            JudgeState::Terminal => Step::new(),
        }
    }

    /// Bank idle progress up to `now`, firing the threshold and the clear
    ///
    /// Does nothing outside `Idle`.
    pub fn settle_progress(&mut self, now: Timestamp) -> Step {
        let mut step = Step::new();
        if self.state != JudgeState::Idle || !self.progress.settle(now) {
            return step;
        }
        step.push(self.progress_event());

        if self.progress.take_threshold() {
            debug!(at = %now, value = self.progress.value(), "progress threshold crossed");
            step.push(Event::ThresholdCrossed {
                name: SMILE_THRESHOLD.to_string(),
                at: now,
            });
        }

        if self.progress.is_cleared() {
            self.progress.pause(now);
            step.push(Event::RoundResolved {
                outcome: Outcome::Cleared,
                at: now,
            });
            step.merge(self.finish(GameResult::Win, now));
        }
        step
    }

    /// Record a decided outcome and start its presentation
    fn judge(&mut self, outcome: Outcome, at: Timestamp, delay_ms: u64) -> Step {
        let mut step = Step::new();
        info!(?outcome, %at, delay_ms, burns = self.burns, "reaction judged");
        step.push(Event::ReactionJudged {
            outcome,
            at,
            delay_ms,
        });

        match outcome {
            Outcome::Missed => {
                self.opened_at = None;
                step.push(Event::RoundResolved { outcome, at });
                step.merge(self.finish(GameResult::Lose, at));
                return step;
            }
            Outcome::Burned => self.burns += 1,
            Outcome::Reflected | Outcome::Blocked => {
                if self.config.reset_burns_on_success {
                    self.burns = 0;
                }
            }
            Outcome::Cleared => {}
        }

        if outcome == Outcome::Reflected {
            if let Some(growth) = self.config.clear_target_growth {
                self.progress.grow_target(growth);
                step.push(self.progress_event());
            }
        }

        let ends_run = outcome == Outcome::Burned && self.burns >= self.config.max_burn_count;
        let mut hold_ms = self.config.reaction_presentation_ms;
        if ends_run {
            hold_ms += self.config.final_presentation_ms;
        }

        self.pending = Some(Pending {
            outcome,
            ready_at: at.add_ms(hold_ms),
            ends_run,
        });
        self.state = JudgeState::Resolving;
        step
    }

    /// The presentation finished
    fn complete(&mut self, pending: Pending, now: Timestamp) -> Step {
        let mut step = Step::new();
        self.pending = None;
        self.opened_at = None;
        self.guard.is_guarding = false;

        step.push(Event::RoundResolved {
            outcome: pending.outcome,
            at: now,
        });

        if pending.ends_run {
            step.merge(self.finish(GameResult::Lose, now));
        } else {
            self.state = JudgeState::Idle;
            self.progress.resume(now);
        }
        step
    }

    fn finish(&mut self, result: GameResult, at: Timestamp) -> Step {
        self.state = JudgeState::Terminal;
        self.result = Some(result);
        self.pending = None;
        info!(?result, %at, burns = self.burns, "game over");

        let mut step = Step::new();
        step.push(Event::GameOver { result, at });
        step
    }

    fn progress_event(&self) -> Event {
        Event::ProgressChanged {
            value: self.progress.value(),
            target: self.progress.target(),
        }
    }
}
