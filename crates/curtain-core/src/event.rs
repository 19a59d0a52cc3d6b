//! Events produced by the timing core
//!
//! Events are delivered synchronously, in emission order, exactly once per
//! transition. Collaborators (rendering, audio, UI) observe them through an
//! [`EventSink`].

use crate::error::{ProtocolViolation, Result};
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// The result of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Guard landed inside the full deadline
    Blocked,
    /// Guard landed inside the perfect deadline
    Reflected,
    /// No qualifying guard before the full deadline
    Burned,
    /// Exposure opened on an unguarded defender (instant-fail variant)
    Missed,
    /// Progress reached its target
    Cleared,
}

impl Outcome {
    /// Check whether the defender survived the round
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Blocked | Outcome::Reflected)
    }

    /// Check whether this outcome ends the run on its own
    pub fn is_terminal(&self) -> bool {
        matches!(self, Outcome::Missed | Outcome::Cleared)
    }

    /// Quality rank, higher is better; used for ordering guard outcomes
    pub fn rank(&self) -> u8 {
        match self {
            Outcome::Missed => 0,
            Outcome::Burned => 1,
            Outcome::Blocked => 2,
            Outcome::Reflected => 3,
            Outcome::Cleared => 4,
        }
    }
}

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    Win,
    Lose,
}

/// An event emitted by the scheduler or the judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A tell beat started
    PreambleBeat { at: Timestamp, beat: u32 },
    /// The current tell beat finished showing
    PreambleEnded { at: Timestamp },
    /// A feint started showing
    FeintStarted { at: Timestamp },
    /// A feint finished without opening the reaction window
    FeintResolved { at: Timestamp },
    /// The exposure opened and the reaction window started
    ExposureOpened { at: Timestamp, duration_ms: u64 },
    /// The exposure closed
    ExposureClosed { at: Timestamp },
    /// A reaction was classified; the presentation starts now
    ReactionJudged {
        outcome: Outcome,
        at: Timestamp,
        delay_ms: u64,
    },
    /// The round finished presenting; the scheduler may resume
    RoundResolved { outcome: Outcome, at: Timestamp },
    /// The progress value changed
    ProgressChanged { value: f64, target: f64 },
    /// A one-shot progress threshold was crossed
    ThresholdCrossed { name: String, at: Timestamp },
    /// The run is over
    GameOver { result: GameResult, at: Timestamp },
}

impl Event {
    /// Timestamp carried by the event, if any
    pub fn at(&self) -> Option<Timestamp> {
        match self {
            Event::PreambleBeat { at, .. }
            | Event::PreambleEnded { at }
            | Event::FeintStarted { at }
            | Event::FeintResolved { at }
            | Event::ExposureOpened { at, .. }
            | Event::ExposureClosed { at }
            | Event::ReactionJudged { at, .. }
            | Event::RoundResolved { at, .. }
            | Event::ThresholdCrossed { at, .. }
            | Event::GameOver { at, .. } => Some(*at),
            Event::ProgressChanged { .. } => None,
        }
    }
}

/// Observer for emitted events
pub trait EventSink {
    /// Receive one event
    fn emit(&mut self, event: &Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: &Event) {
        self.push(event.clone());
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &Event) {
        (**self).emit(event)
    }
}

/// Adapts a closure into an [`EventSink`]
pub struct FnSink<F>(pub F);

impl<F: FnMut(&Event)> EventSink for FnSink<F> {
    fn emit(&mut self, event: &Event) {
        (self.0)(event)
    }
}

/// A sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &Event) {}
}

/// The outcome of one operation: events emitted and any ignored violation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    /// Events in emission order
    pub events: Vec<Event>,
    /// Set when the operation was dropped as out-of-state
    pub violation: Option<ProtocolViolation>,
}

impl Step {
    /// Create an empty step
    pub fn new() -> Self {
        Self::default()
    }

    /// A step that only records a dropped event
    pub fn violation(violation: ProtocolViolation) -> Self {
        Self {
            events: Vec::new(),
            violation: Some(violation),
        }
    }

    /// Append an event
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Append everything from another step, keeping order
    pub fn merge(&mut self, other: Step) {
        self.events.extend(other.events);
        if self.violation.is_none() {
            self.violation = other.violation;
        }
    }

    /// Check whether nothing happened
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.violation.is_none()
    }

    /// Find the first outcome announced in this step
    pub fn judged(&self) -> Option<Outcome> {
        self.events.iter().find_map(|e| match e {
            Event::ReactionJudged { outcome, .. } => Some(*outcome),
            _ => None,
        })
    }

    /// Find the game result announced in this step
    pub fn game_over(&self) -> Option<GameResult> {
        self.events.iter().find_map(|e| match e {
            Event::GameOver { result, .. } => Some(*result),
            _ => None,
        })
    }

    /// Convert into a strict result, failing on a dropped event
    pub fn into_result(self) -> Result<Vec<Event>> {
        match self.violation {
            Some(violation) => Err(violation.into()),
            None => Ok(self.events),
        }
    }
}
