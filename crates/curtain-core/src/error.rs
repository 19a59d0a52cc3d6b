//! Error types for curtain-core
//!
//! Two families exist and they never mix:
//! - [`ConfigError`] is raised once, when a configuration is validated at
//!   load time. A game cannot be constructed from an invalid configuration.
//! - [`ProtocolViolation`] describes an event delivered in a state that
//!   cannot accept it. These are logged and dropped by the components; they
//!   are surfaced on [`Step`](crate::Step) for inspection, never returned as
//!   failures.

use crate::Timestamp;
use thiserror::Error;

/// Invalid configuration, detected at load time
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field}: range min {min}ms is greater than max {max}ms")]
    EmptyRange {
        field: &'static str,
        min: u64,
        max: u64,
    },

    #[error("{field}: minimum must be greater than zero")]
    ZeroInterval { field: &'static str },

    #[error("perfect deadline {perfect_ms}ms exceeds full deadline {full_ms}ms")]
    DeadlineOrder { perfect_ms: u64, full_ms: u64 },

    #[error("full deadline must be greater than zero")]
    ZeroDeadline,

    #[error("{field}: probability {value} is outside [0, 1]")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },

    #[error("{field}: fraction {value} is outside (0, 1]")]
    FractionOutOfRange { field: &'static str, value: f64 },

    #[error("{field}: expected a positive finite value, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("clear target growth must be finite and non-negative, got {0}")]
    NegativeGrowth(f64),

    #[error("max burn count must be at least 1")]
    ZeroBurnCount,

    #[error("{field} ({duration_ms}ms) must be shorter than the minimum cycle interval ({interval_ms}ms)")]
    BeatTooLong {
        field: &'static str,
        duration_ms: u64,
        interval_ms: u64,
    },

    #[error("minimum exposure duration {exposure_ms}ms is shorter than the full deadline {deadline_ms}ms")]
    ExposureShorterThanDeadline { exposure_ms: u64, deadline_ms: u64 },
}

/// An event delivered in a state that cannot accept it
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("guard started at {at} while already guarding since {since}")]
    GuardAlreadyActive { at: Timestamp, since: Timestamp },

    #[error("guard cancelled at {at} with no active guard")]
    NoActiveGuard { at: Timestamp },

    #[error("exposure open requested at {at} while a cycle step is active")]
    OpenWhileBusy { at: Timestamp },

    #[error("exposure close requested at {at} while not exposed")]
    CloseWithoutExposure { at: Timestamp },

    #[error("exposure opened at {at} while a round is still in flight")]
    ExposureDuringRound { at: Timestamp },

    #[error("round resolution delivered at {at} with no round in flight")]
    RoundNotPending { at: Timestamp },

    #[error("event at {at} delivered after game over")]
    AfterGameOver { at: Timestamp },

    #[error("tick at {at} is earlier than the previous tick at {previous}")]
    TimeWentBackwards { at: Timestamp, previous: Timestamp },
}

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
