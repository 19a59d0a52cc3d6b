//! RON preset loader

use crate::error::{Error, Result};
use curtain_core::GameConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One named configuration in a preset file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetEntry {
    pub name: String,
    #[serde(default)]
    pub config: GameConfig,
}

/// On-disk layout of a preset file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetFile {
    pub presets: Vec<PresetEntry>,
}

/// Parse and validate a single configuration
pub fn parse_config(content: &str) -> Result<GameConfig> {
    let config: GameConfig = ron::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Loaded presets, in load order
#[derive(Debug, Clone, Default)]
pub struct Presets {
    presets: IndexMap<String, GameConfig>,
}

impl Presets {
    /// Create an empty preset set
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a preset by name
    pub fn get(&self, name: &str) -> Option<&GameConfig> {
        self.presets.get(name)
    }

    /// Get a preset by name, failing if it does not exist
    pub fn require(&self, name: &str) -> Result<&GameConfig> {
        self.get(name)
            .ok_or_else(|| Error::UnknownPreset(name.to_string()))
    }

    /// The first preset loaded
    pub fn first(&self) -> Option<(&str, &GameConfig)> {
        self.presets
            .first()
            .map(|(name, config)| (name.as_str(), config))
    }

    /// Preset names in load order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GameConfig)> {
        self.presets
            .iter()
            .map(|(name, config)| (name.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// Loader for RON preset files
pub struct Loader {
    presets: Presets,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self {
            presets: Presets::new(),
        }
    }

    /// Load a single RON file
    ///
    /// A file that parses as a preset list adds every entry; anything else
    /// is read as one configuration named after the file stem.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading preset file");

        if let Ok(file) = ron::from_str::<PresetFile>(&content) {
            return self.load_preset_file(file);
        }

        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidSchema(format!("No preset name for {:?}", path)))?;
        self.load_config_str(name, &content)
    }

    /// Load a preset file from a RON string
    pub fn load_str(&mut self, content: &str) -> Result<()> {
        let file: PresetFile = ron::from_str(content)?;
        self.load_preset_file(file)
    }

    fn load_preset_file(&mut self, file: PresetFile) -> Result<()> {
        if file.presets.is_empty() {
            return Err(Error::InvalidSchema("Preset file has no presets".to_string()));
        }
        for entry in file.presets {
            self.insert(entry.name, entry.config)?;
        }
        Ok(())
    }

    /// Load one configuration under `name`
    pub fn load_config_str(&mut self, name: &str, content: &str) -> Result<()> {
        let config: GameConfig = ron::from_str(content)?;
        self.insert(name.to_string(), config)
    }

    /// Validate and register a configuration
    pub fn insert(&mut self, name: String, config: GameConfig) -> Result<()> {
        if self.presets.presets.contains_key(&name) {
            return Err(Error::DuplicatePreset(name));
        }
        if let Err(source) = config.validate() {
            return Err(Error::InvalidPreset { name, source });
        }
        info!(preset = %name, "preset loaded");
        self.presets.presets.insert(name, config);
        Ok(())
    }

    /// Load all RON files from a directory
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {:?}", path),
            )));
        }

        // Sorted so load order and duplicate detection do not depend on the
        // filesystem
        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for file_path in entries {
            if file_path.extension().map(|e| e == "ron").unwrap_or(false) {
                self.load_file(&file_path)?;
            } else if file_path.is_dir() {
                self.load_directory(&file_path)?;
            }
        }

        Ok(())
    }

    /// Finish loading and return the presets
    pub fn finish(self) -> Presets {
        self.presets
    }

    /// Get the current presets (for inspection during loading)
    pub fn presets(&self) -> &Presets {
        &self.presets
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtain_core::{ConfigError, DeadlineBound, MsRange};

    #[test]
    fn test_load_presets() {
        let content = r#"
        (
            presets: [
                (
                    name: "classic",
                    config: (),
                ),
                (
                    name: "sudden_death",
                    config: (
                        judge: (
                            max_burn_count: 1,
                            instant_fail_on_exposure: true,
                        ),
                    ),
                ),
                (
                    name: "strict",
                    config: (
                        scheduler: (
                            feint_rate: 0.5,
                            cycle_interval_ms: (min: 800, max: 2000),
                        ),
                        judge: (
                            window: (
                                perfect_deadline_ms: 200,
                                full_deadline_ms: 600,
                                bound: Exclusive,
                            ),
                            clear_target_growth: Some(15.0),
                        ),
                    ),
                ),
            ]
        )
        "#;

        let mut loader = Loader::new();
        loader.load_str(content).unwrap();

        let presets = loader.finish();
        assert_eq!(
            presets.names().collect::<Vec<_>>(),
            vec!["classic", "sudden_death", "strict"]
        );
        assert_eq!(presets.get("classic"), Some(&GameConfig::default()));

        let sudden = presets.require("sudden_death").unwrap();
        assert_eq!(sudden.judge.max_burn_count, 1);
        assert!(sudden.judge.instant_fail_on_exposure);

        let strict = presets.require("strict").unwrap();
        assert_eq!(strict.scheduler.cycle_interval_ms, MsRange::new(800, 2000));
        assert_eq!(strict.judge.window.bound, DeadlineBound::Exclusive);
        assert_eq!(strict.judge.clear_target_growth, Some(15.0));
        // Untouched fields keep their defaults
        assert_eq!(strict.scheduler.preamble_beat_count, 2);
    }

    #[test]
    fn test_duplicate_preset_rejected() {
        let content = r#"(presets: [(name: "a", config: ()), (name: "a", config: ())])"#;
        let mut loader = Loader::new();
        assert!(matches!(
            loader.load_str(content),
            Err(Error::DuplicatePreset(name)) if name == "a"
        ));
    }

    #[test]
    fn test_invalid_preset_rejected() {
        let content = r#"
        (presets: [(
            name: "broken",
            config: (judge: (window: (perfect_deadline_ms: 900, full_deadline_ms: 500))),
        )])
        "#;
        let mut loader = Loader::new();
        let err = loader.load_str(content).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPreset {
                ref name,
                source: ConfigError::DeadlineOrder { .. },
            } if name == "broken"
        ));
        assert!(loader.presets().is_empty());
    }

    #[test]
    fn test_unknown_preset() {
        let presets = Loader::new().finish();
        assert!(matches!(
            presets.require("missing"),
            Err(Error::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_parse_config() {
        let config = parse_config("(judge: (clear_target: 100.0))").unwrap();
        assert_eq!(config.judge.clear_target, 100.0);

        assert!(matches!(
            parse_config("(judge: (max_burn_count: 0))"),
            Err(Error::Config(ConfigError::ZeroBurnCount))
        ));
        assert!(matches!(parse_config("(judge: "), Err(Error::Ron(_))));
    }

    #[test]
    fn test_load_file_picks_format_by_content() {
        let dir = std::env::temp_dir().join(format!("curtain-script-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        // A comment mentioning the list key does not make it a preset file
        let single = dir.join("solo.ron");
        fs::write(
            &single,
            "// tuned from the presets: list\n(judge: (max_burn_count: 2))\n",
        )
        .unwrap();
        let listed = dir.join("listed.ron");
        fs::write(&listed, r#"(presets: [(name: "quick", config: ())])"#).unwrap();

        let mut loader = Loader::new();
        loader.load_file(&single).unwrap();
        loader.load_file(&listed).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        let presets = loader.finish();
        assert_eq!(presets.require("solo").unwrap().judge.max_burn_count, 2);
        assert!(presets.get("quick").is_some());
        assert!(presets.get("listed").is_none());
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        assert!(matches!(
            parse_config(r#"(presets: [(name: "x")])"#),
            Err(Error::Ron(_))
        ));
    }

    #[test]
    fn test_load_bundled_presets() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/curtain_game/data");
        let mut loader = Loader::new();
        loader.load_directory(dir).unwrap();

        let presets = loader.finish();
        assert_eq!(presets.first().map(|(name, _)| name), Some("classic"));
        assert!(presets.get("sudden_death").is_some());
    }
}
