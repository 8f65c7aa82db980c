//! Configuration loading for Arbor.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.arbor/config.toml`)
//! 3. User config (`~/.arbor/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. Thresholds and day counts that drive the
//! companion state machine are tunable here; nothing in the engine hardcodes
//! them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::CompanionStage;
use crate::error::{ArborError, FailOpen, Result};

/// Main configuration struct for Arbor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The closed set of specialization tracks.
    pub tracks: TracksConfig,
    /// Companion state machine thresholds.
    pub companion: CompanionConfig,
    /// Course data location.
    pub course: CourseConfig,
    /// Student record and event log location.
    pub storage: StorageConfig,
    /// Log filter defaults.
    pub logging: LoggingConfig,
}

/// Track configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TracksConfig {
    /// Track names accepted in course weights and events.
    pub names: Vec<String>,
}

impl Default for TracksConfig {
    fn default() -> Self {
        Self {
            names: vec![
                "engineer".to_string(),
                "data-scientist".to_string(),
                "pure-math".to_string(),
                "applied-math".to_string(),
            ],
        }
    }
}

impl TracksConfig {
    /// The configured names as a set.
    pub fn to_set(&self) -> BTreeSet<String> {
        self.names.iter().cloned().collect()
    }
}

/// Rule for leaving a stage forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AdvanceRule {
    /// Minimum consistency score that counts as a qualifying day.
    pub consistency_threshold: f64,
    /// Consecutive qualifying days required to advance.
    pub min_days: u32,
}

impl AdvanceRule {
    /// Create a new advance rule.
    pub const fn new(consistency_threshold: f64, min_days: u32) -> Self {
        Self {
            consistency_threshold,
            min_days,
        }
    }
}

/// Companion state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompanionConfig {
    /// Scores strictly below this count as a neglected day.
    pub neglect_threshold: f64,
    /// Consecutive neglected days before decaying one stage.
    pub neglect_days: u32,
    /// Rule for Egg -> Hatchling.
    pub egg: AdvanceRule,
    /// Rule for Hatchling -> Juvenile.
    pub hatchling: AdvanceRule,
    /// Rule for Juvenile -> Adult.
    pub juvenile: AdvanceRule,
    /// Rule for Adult -> Evolved.
    pub adult: AdvanceRule,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            neglect_threshold: 0.3,
            neglect_days: 3,
            egg: AdvanceRule::new(0.5, 2),
            hatchling: AdvanceRule::new(0.6, 3),
            juvenile: AdvanceRule::new(0.7, 5),
            adult: AdvanceRule::new(0.8, 7),
        }
    }
}

impl CompanionConfig {
    /// Get the rule for advancing out of `stage`.
    ///
    /// Returns `None` for `Evolved`, which has no forward transition.
    pub fn advance_rule(&self, stage: CompanionStage) -> Option<&AdvanceRule> {
        match stage {
            CompanionStage::Egg => Some(&self.egg),
            CompanionStage::Hatchling => Some(&self.hatchling),
            CompanionStage::Juvenile => Some(&self.juvenile),
            CompanionStage::Adult => Some(&self.adult),
            CompanionStage::Evolved => None,
        }
    }

    /// Check if a score threshold is valid (finite and in [0.0, 1.0]).
    pub fn is_valid_threshold(value: f64) -> bool {
        value.is_finite() && (0.0..=1.0).contains(&value)
    }

    /// Fail with a config error naming every problem, if there are any.
    pub fn check(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ArborError::config(problems.join("; ")))
        }
    }

    /// Validate thresholds and day counts, collecting every problem.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !Self::is_valid_threshold(self.neglect_threshold) {
            problems.push(format!(
                "companion.neglect_threshold {} must be in [0.0, 1.0]",
                self.neglect_threshold
            ));
        }
        if self.neglect_days == 0 {
            problems.push("companion.neglect_days must be >= 1".to_string());
        }

        for stage in CompanionStage::ALL {
            let Some(rule) = self.advance_rule(stage) else {
                continue;
            };
            let key = stage.config_key();
            if !Self::is_valid_threshold(rule.consistency_threshold) {
                problems.push(format!(
                    "companion.{}.consistency_threshold {} must be in [0.0, 1.0]",
                    key, rule.consistency_threshold
                ));
            } else if rule.consistency_threshold <= self.neglect_threshold {
                problems.push(format!(
                    "companion.{}.consistency_threshold {} must be above neglect_threshold {}",
                    key, rule.consistency_threshold, self.neglect_threshold
                ));
            }
            if rule.min_days == 0 {
                problems.push(format!("companion.{}.min_days must be >= 1", key));
            }
        }

        problems
    }
}

/// Course data configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CourseConfig {
    /// Path to the course data JSON file.
    pub path: Option<PathBuf>,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for student records and the event log.
    pub data_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.arbor/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = arbor_home()?;
        Self::load_optional(&home.join("config.toml"))
    }

    /// Load project config from `.arbor/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        Self::load_optional(&cwd.join(".arbor").join("config.toml"))
    }

    /// Load a config layer that may legitimately be absent.
    ///
    /// A missing file is silent; an unreadable or malformed one is warned
    /// about and skipped.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        Self::load_from_file(path)
            .map(Some)
            .fail_open_with(&format!("ignoring config layer {}", path.display()), None)
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| ArborError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| ArborError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // ARBOR_TRACKS
        if let Ok(val) = env::var("ARBOR_TRACKS") {
            let names: Vec<String> = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if names.is_empty() {
                tracing::warn!(
                    "Invalid ARBOR_TRACKS value '{}'. Expected a comma-separated list. \
                    Using {:?}.",
                    val,
                    self.tracks.names
                );
            } else {
                self.tracks.names = names;
            }
        }

        // ARBOR_NEGLECT_THRESHOLD
        if let Ok(val) = env::var("ARBOR_NEGLECT_THRESHOLD") {
            match val.parse::<f64>() {
                Ok(n) if CompanionConfig::is_valid_threshold(n) => {
                    self.companion.neglect_threshold = n;
                }
                _ => tracing::warn!(
                    "Invalid ARBOR_NEGLECT_THRESHOLD value '{}'. \
                    Must be a number in [0.0, 1.0]. Using '{}'.",
                    val,
                    self.companion.neglect_threshold
                ),
            }
        }

        // ARBOR_NEGLECT_DAYS
        if let Ok(val) = env::var("ARBOR_NEGLECT_DAYS") {
            match val.parse::<u32>() {
                Ok(n) if n >= 1 => self.companion.neglect_days = n,
                _ => tracing::warn!(
                    "Invalid ARBOR_NEGLECT_DAYS value '{}'. \
                    Expected a positive integer. Using '{}'.",
                    val,
                    self.companion.neglect_days
                ),
            }
        }

        // ARBOR_COURSE
        if let Ok(val) = env::var("ARBOR_COURSE") {
            if !val.is_empty() {
                self.course.path = Some(PathBuf::from(val));
            }
        }

        // ARBOR_DATA_DIR
        if let Ok(val) = env::var("ARBOR_DATA_DIR") {
            if !val.is_empty() {
                self.storage.data_dir = Some(PathBuf::from(val));
            }
        }

        // ARBOR_LOG
        if let Ok(val) = env::var("ARBOR_LOG") {
            if !val.is_empty() {
                self.logging.filter = val;
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// The `other` config takes precedence field by field: each value that
    /// differs from the default replaces the value in `self`. A layer cannot
    /// set a value back to its default to undo a lower layer.
    fn merge(mut self, other: Config) -> Self {
        if other.tracks.names != TracksConfig::default().names {
            self.tracks.names = other.tracks.names;
        }

        let default_companion = CompanionConfig::default();
        if other.companion.neglect_threshold != default_companion.neglect_threshold {
            self.companion.neglect_threshold = other.companion.neglect_threshold;
        }
        if other.companion.neglect_days != default_companion.neglect_days {
            self.companion.neglect_days = other.companion.neglect_days;
        }
        if other.companion.egg != default_companion.egg {
            self.companion.egg = other.companion.egg;
        }
        if other.companion.hatchling != default_companion.hatchling {
            self.companion.hatchling = other.companion.hatchling;
        }
        if other.companion.juvenile != default_companion.juvenile {
            self.companion.juvenile = other.companion.juvenile;
        }
        if other.companion.adult != default_companion.adult {
            self.companion.adult = other.companion.adult;
        }

        if other.course.path.is_some() {
            self.course.path = other.course.path;
        }
        if other.storage.data_dir.is_some() {
            self.storage.data_dir = other.storage.data_dir;
        }
        if other.logging.filter != LoggingConfig::default().filter {
            self.logging.filter = other.logging.filter;
        }

        self
    }

    /// Validate the loaded configuration.
    ///
    /// Returns a config error naming every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.tracks.names.is_empty() {
            problems.push("tracks.names must not be empty".to_string());
        }
        let unique: BTreeSet<&String> = self.tracks.names.iter().collect();
        if unique.len() != self.tracks.names.len() {
            problems.push("tracks.names contains duplicates".to_string());
        }
        if self.tracks.names.iter().any(|t| t.trim().is_empty()) {
            problems.push("tracks.names contains a blank name".to_string());
        }

        problems.extend(self.companion.problems());

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ArborError::config(problems.join("; ")))
        }
    }

    /// Resolve the data directory (configured, or `$ARBOR_HOME/data`).
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.storage
            .data_dir
            .clone()
            .or_else(|| arbor_home().map(|home| home.join("data")))
    }
}

/// Get the Arbor home directory.
///
/// Checks `ARBOR_HOME` first, then falls back to `~/.arbor`.
pub fn arbor_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("ARBOR_HOME") {
        if home.is_empty() {
            tracing::warn!("ARBOR_HOME is empty, using default");
        } else {
            return Some(PathBuf::from(home));
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".arbor"));
    }

    let fallback = env::temp_dir().join("arbor");
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback.display()
    );
    Some(fallback)
}

/// Directory holding one JSON record per student.
pub fn students_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("students")
}

/// Path of the append-only notification log.
pub fn event_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("events.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "ARBOR_HOME",
        "ARBOR_TRACKS",
        "ARBOR_NEGLECT_THRESHOLD",
        "ARBOR_NEGLECT_DAYS",
        "ARBOR_COURSE",
        "ARBOR_DATA_DIR",
        "ARBOR_LOG",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    fn set_env(key: &str, value: &str) {
        env::set_var(key, value);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(
            config.tracks.names,
            vec!["engineer", "data-scientist", "pure-math", "applied-math"]
        );
        assert!((config.companion.neglect_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.companion.neglect_days, 3);
        assert_eq!(config.companion.egg, AdvanceRule::new(0.5, 2));
        assert_eq!(config.companion.adult, AdvanceRule::new(0.8, 7));
        assert!(config.course.path.is_none());
        assert!(config.storage.data_dir.is_none());
        assert_eq!(config.logging.filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_advance_rule_per_stage() {
        let config = CompanionConfig::default();
        assert_eq!(config.advance_rule(CompanionStage::Egg), Some(&config.egg));
        assert_eq!(
            config.advance_rule(CompanionStage::Juvenile),
            Some(&config.juvenile)
        );
        assert!(config.advance_rule(CompanionStage::Evolved).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[tracks]
names = ["engineer", "designer"]

[companion]
neglect_days = 5

[companion.hatchling]
consistency_threshold = 0.65
min_days = 4
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.tracks.names, vec!["engineer", "designer"]);
        assert_eq!(config.companion.neglect_days, 5);
        assert_eq!(config.companion.hatchling, AdvanceRule::new(0.65, 4));
        // Untouched sections keep their defaults
        assert_eq!(config.companion.egg, AdvanceRule::new(0.5, 2));
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "tracks = [[[").unwrap();

        let result = Config::load_from_file(&path);
        assert!(matches!(result, Err(ArborError::Config { .. })));
    }

    #[test]
    fn test_merge_is_field_by_field() {
        let mut user = Config::default();
        user.companion.neglect_days = 10;
        user.logging.filter = "debug".to_string();

        let mut project = Config::default();
        project.companion.neglect_threshold = 0.1;

        let merged = Config::default().merge(user).merge(project);
        assert_eq!(merged.companion.neglect_days, 10);
        assert!((merged.companion.neglect_threshold - 0.1).abs() < f64::EPSILON);
        assert_eq!(merged.logging.filter, "debug");
    }

    #[test]
    fn test_validate_rejects_overlapping_thresholds() {
        let mut config = Config::default();
        config.companion.neglect_threshold = 0.55;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("companion.egg.consistency_threshold"));
        assert!(!err.contains("companion.adult"));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = Config::default();
        config.tracks.names = vec!["a".to_string(), "a".to_string()];
        config.companion.neglect_days = 0;
        config.companion.adult.min_days = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicates"));
        assert!(err.contains("neglect_days"));
        assert!(err.contains("companion.adult.min_days"));
    }

    #[test]
    fn test_companion_check() {
        assert!(CompanionConfig::default().check().is_ok());

        let mut config = CompanionConfig::default();
        config.hatchling.min_days = 0;
        let err = config.check().unwrap_err();
        assert!(matches!(err, ArborError::Config { .. }));
        assert!(err.to_string().contains("companion.hatchling.min_days"));
    }

    #[test]
    fn test_validate_rejects_empty_tracks() {
        let mut config = Config::default();
        config.tracks.names.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        set_env("ARBOR_TRACKS", "engineer, artist");
        set_env("ARBOR_NEGLECT_THRESHOLD", "0.15");
        set_env("ARBOR_NEGLECT_DAYS", "4");
        set_env("ARBOR_DATA_DIR", "/tmp/arbor-data");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.tracks.names, vec!["engineer", "artist"]);
        assert!((config.companion.neglect_threshold - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.companion.neglect_days, 4);
        assert_eq!(
            config.storage.data_dir,
            Some(PathBuf::from("/tmp/arbor-data"))
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_overrides_ignore_invalid_values() {
        clear_env();
        set_env("ARBOR_NEGLECT_THRESHOLD", "1.5");
        set_env("ARBOR_NEGLECT_DAYS", "zero");
        set_env("ARBOR_TRACKS", " , ");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_from_cwd_layers_project_over_user() {
        clear_env();
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        set_env("ARBOR_HOME", home.path().to_str().unwrap());

        fs::write(
            home.path().join("config.toml"),
            "[companion]\nneglect_days = 6\n[logging]\nfilter = \"warn\"\n",
        )
        .unwrap();
        fs::create_dir_all(project.path().join(".arbor")).unwrap();
        fs::write(
            project.path().join(".arbor").join("config.toml"),
            "[companion]\nneglect_days = 2\n",
        )
        .unwrap();

        let config = Config::load_from_cwd(project.path());
        assert_eq!(config.companion.neglect_days, 2);
        assert_eq!(config.logging.filter, "warn");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_malformed_layer_is_skipped() {
        clear_env();
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        set_env("ARBOR_HOME", home.path().to_str().unwrap());

        fs::write(home.path().join("config.toml"), "[companion]\nneglect_days = 6\n").unwrap();
        fs::create_dir_all(project.path().join(".arbor")).unwrap();
        fs::write(project.path().join(".arbor").join("config.toml"), "companion = [[[").unwrap();

        let config = Config::load_from_cwd(project.path());
        assert_eq!(config.companion.neglect_days, 6);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_data_dir_defaults_under_home() {
        clear_env();
        set_env("ARBOR_HOME", "/tmp/arbor-home");

        let config = Config::default();
        assert_eq!(
            config.data_dir(),
            Some(PathBuf::from("/tmp/arbor-home/data"))
        );

        clear_env();
    }

    #[test]
    fn test_paths() {
        let data = Path::new("/var/arbor");
        assert_eq!(students_dir(data), PathBuf::from("/var/arbor/students"));
        assert_eq!(event_log_path(data), PathBuf::from("/var/arbor/events.log"));
    }
}
