//! Game loop wiring the scheduler and the judge together
//!
//! One [`Game::tick`] runs, in order:
//! 1. queued guard inputs stamped at or before `now`
//! 2. the judge's idle progress, so a clear ends the run before anything
//!    else is scheduled
//! 3. the exposure scheduler, whose openings and closings feed the judge
//! 4. the judge's own deadlines and presentations
//!
//! Round resolutions from the judge are handed back to the scheduler so the
//! next cycle is measured from them. Everything emitted is delivered to the
//! [`EventSink`] in order once the tick is complete.

use crate::config::GameConfig;
use crate::error::ProtocolViolation;
use crate::event::{Event, EventSink, GameResult, Step};
use crate::judge::ReactionJudge;
use crate::rng::RandomSource;
use crate::scheduler::ExposureScheduler;
use crate::time::{Clock, TimeSource};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// An edge of the defender's guard input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardSignal {
    Started,
    Cancelled,
}

/// A source of timestamped guard edges
pub trait GuardInput {
    /// Take the next pending edge, if any
    fn poll(&mut self) -> Option<(GuardSignal, Timestamp)>;
}

impl GuardInput for VecDeque<(GuardSignal, Timestamp)> {
    fn poll(&mut self) -> Option<(GuardSignal, Timestamp)> {
        self.pop_front()
    }
}

/// A running game
pub struct Game<S: EventSink> {
    config: GameConfig,
    scheduler: ExposureScheduler,
    judge: ReactionJudge,
    clock: Clock,
    sink: S,
    inputs: VecDeque<(GuardSignal, Timestamp)>,
    violations: u64,
}

impl<S: EventSink> Game<S> {
    /// Validate `config` and start a game at `now`
    pub fn new(
        config: GameConfig,
        rng: Box<dyn RandomSource>,
        sink: S,
        now: Timestamp,
    ) -> crate::Result<Self> {
        config.validate()?;

        let scheduler = ExposureScheduler::new(config.scheduler.clone(), rng, now)?;
        let judge = ReactionJudge::new(config.judge.clone(), now)?;
        info!(
            at = %now,
            first_step = %scheduler.next_at(),
            max_burns = config.judge.max_burn_count,
            "game started"
        );

        Ok(Self {
            config,
            scheduler,
            judge,
            clock: Clock::new(now),
            sink,
            inputs: VecDeque::new(),
            violations: 0,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &ExposureScheduler {
        &self.scheduler
    }

    pub fn judge(&self) -> &ReactionJudge {
        &self.judge
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the game, returning the sink
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Out-of-state events dropped so far
    pub fn violations(&self) -> u64 {
        self.violations
    }

    pub fn is_over(&self) -> bool {
        self.judge.is_terminal()
    }

    pub fn result(&self) -> Option<GameResult> {
        self.judge.result()
    }

    /// Queue a guard start
    pub fn guard_started(&mut self, at: Timestamp) {
        self.inputs.push_back((GuardSignal::Started, at));
    }

    /// Queue a guard release
    pub fn guard_cancelled(&mut self, at: Timestamp) {
        self.inputs.push_back((GuardSignal::Cancelled, at));
    }

    /// Queue everything `input` has pending
    pub fn pump(&mut self, input: &mut impl GuardInput) {
        while let Some(edge) = input.poll() {
            self.inputs.push_back(edge);
        }
    }

    /// Tick at the time reported by `time`
    pub fn advance(&mut self, time: &impl TimeSource) -> Step {
        self.tick(time.now())
    }

    /// Advance everything to `now`
    pub fn tick(&mut self, now: Timestamp) -> Step {
        let previous = self.clock.now;
        if self.clock.advance_to(now).is_none() {
            let violation = ProtocolViolation::TimeWentBackwards { at: now, previous };
            warn!(%violation, "ignoring tick");
            self.violations += 1;
            return Step::violation(violation);
        }

        let mut step = Step::new();

        while let Some(&(signal, at)) = self.inputs.front() {
            if at > now {
                break;
            }
            self.inputs.pop_front();
            let judged = match signal {
                GuardSignal::Started => self.judge.guard_started(at),
                GuardSignal::Cancelled => self.judge.guard_cancelled(at),
            };
            self.absorb_judge(judged, &mut step);
        }

        // Idle progress is settled first so a clear pre-empts the cycle
        let settled = self.judge.settle_progress(now);
        self.absorb_judge(settled, &mut step);

        if !self.judge.is_terminal() {
            let scheduled = self.scheduler.tick(now);
            self.absorb_scheduler(scheduled, &mut step);
        }

        let judged = self.judge.tick(now);
        self.absorb_judge(judged, &mut step);

        for event in &step.events {
            self.sink.emit(event);
        }
        if let Some(result) = step.game_over() {
            info!(?result, tick = self.clock.tick, "run finished");
        }
        step
    }

    /// Record scheduler output and let the judge react to it
    fn absorb_scheduler(&mut self, scheduled: Step, step: &mut Step) {
        self.note_violation(scheduled.violation, step);
        for event in scheduled.events {
            let reaction = match &event {
                Event::ExposureOpened { at, .. } => self.judge.on_exposure_opened(*at),
                Event::ExposureClosed { at } => self.judge.on_exposure_closed(*at),
                _ => Step::new(),
            };
            step.push(event);
            self.absorb_judge(reaction, step);
        }
    }

    /// Record judge output and hand round resolutions to the scheduler
    fn absorb_judge(&mut self, judged: Step, step: &mut Step) {
        self.note_violation(judged.violation, step);
        let resolved_at = judged.events.iter().find_map(|e| match e {
            Event::RoundResolved { at, .. } => Some(*at),
            _ => None,
        });
        step.events.extend(judged.events);

        if let Some(at) = resolved_at {
            if self.judge.is_terminal() {
                return;
            }
            debug!(%at, "round resolved, resuming cycle");
            let scheduled = self.scheduler.on_round_resolved(at);
            self.absorb_scheduler(scheduled, step);
        }
    }

    fn note_violation(&mut self, violation: Option<ProtocolViolation>, step: &mut Step) {
        if let Some(violation) = violation {
            self.violations += 1;
            if step.violation.is_none() {
                step.violation = Some(violation);
            }
        }
    }
}

impl<S: EventSink> std::fmt::Debug for Game<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("scheduler", &self.scheduler)
            .field("judge", &self.judge)
            .field("clock", &self.clock)
            .field("pending_inputs", &self.inputs.len())
            .finish()
    }
}
