//! Curtain Script - RON preset loader
//!
//! Loads game tuning from RON files:
//! - A single configuration, named after its file
//! - Preset files holding several named configurations
//!
//! Every configuration is validated as it is loaded, so anything handed out
//! by [`Presets`] can start a game.

mod error;
mod loader;

pub use error::{Error, Result};
pub use loader::{parse_config, Loader, PresetEntry, PresetFile, Presets};
