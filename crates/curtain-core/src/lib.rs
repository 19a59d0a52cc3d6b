//! Curtain Core - Timing core for a reflex game
//!
//! An attacker hides behind a curtain, shows a few tells, then either feints
//! or exposes itself. The defender must guard within a short window after a
//! real exposure. This crate provides:
//! - Millisecond timestamps and injectable time sources
//! - A deterministic, injectable random source
//! - Validated configuration loaded through serde
//! - `ExposureScheduler` - when the attacker exposes, tells or feints
//! - `ReactionJudge` - how a guard is classified and how the run ends
//! - `Game` - a tick loop wiring both to an `EventSink`
//!
//! ## Driving a game
//!
//! Nothing runs on its own. Call [`Game::tick`] once per frame with the
//! current time; every delay is a deadline resolved on the first tick at or
//! past it.
//!
//! ```
//! use curtain_core::{Event, Game, GameConfig, GameRng, Timestamp};
//!
//! let mut game = Game::new(
//!     GameConfig::default(),
//!     Box::new(GameRng::new(7)),
//!     Vec::<Event>::new(),
//!     Timestamp::ZERO,
//! )
//! .unwrap();
//!
//! game.guard_started(Timestamp::from_millis(16));
//! game.tick(Timestamp::from_millis(16));
//! assert!(game.judge().is_guarding());
//! ```

pub mod config;
mod error;
pub mod event;
pub mod game;
pub mod judge;
mod rng;
pub mod scheduler;
pub mod time;

pub use config::{DeadlineBound, GameConfig, JudgeConfig, MsRange, ReactionWindow, SchedulerConfig};
pub use error::{ConfigError, Error, ProtocolViolation, Result};
pub use event::{Event, EventSink, FnSink, GameResult, NullSink, Outcome, Step};
pub use game::{Game, GuardInput, GuardSignal};
pub use judge::{classify, GuardState, JudgeState, ProgressResource, ReactionJudge, SMILE_THRESHOLD};
pub use rng::{GameRng, RandomSource, ScriptedRandom};
pub use scheduler::{ExposureScheduler, ExposureState};
pub use time::{Clock, ManualClock, MonotonicClock, Tick, TimeSource, Timestamp};
