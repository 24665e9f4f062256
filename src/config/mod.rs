//! Configuration System for atp
//!
//! Provides a flexible configuration system supporting:
//! - TOML configuration files
//! - Environment variable overrides
//! - Named search profiles (built-in and user-defined)
//! - Multiple config file locations
//!
//! # Configuration File Locations
//!
//! Configuration files are searched in order (first found wins):
//! 1. `./atp.toml` - Project-local configuration
//! 2. `~/.config/atp/config.toml` - User configuration (XDG)
//! 3. `~/.atp/config.toml` - User configuration (legacy)
//!
//! # Environment Variables
//!
//! - `ATP_DB` - Path of the theorem database
//! - `ATP_CONTEXTS` - Directory holding `<name>.json` model contexts
//! - `ATP_LOG_LEVEL` - Logging verbosity (quiet, normal, verbose, debug)
//! - `ATP_PROFILE` - Search profile used when none is named
//! - `ATP_SEED` - Seed forced onto every search profile
//!
//! # Example Configuration
//!
//! ```toml
//! # atp.toml
//!
//! [general]
//! log_level = "verbose"
//! contexts_dir = "./contexts"
//! profile = "basic"
//!
//! [database]
//! path = "./atp.db"
//!
//! [matching]
//! max_assignments = 32
//!
//! [hmm]
//! states = 6
//!
//! [profiles.deep]
//! description = "Deeper search with a generous budget"
//! max_steps = 50
//!
//! [profiles.deep.solver]
//! starting_depth = 4
//! max_depth = 12
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AtpError, ErrorCode};
use crate::hmm::HmmSettings;
use crate::logic::MatchSettings;
use crate::search::SearchSettings;
use crate::store::sqlite::DEFAULT_RETRIES;

// ============================================================================
// Configuration Schema
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AtpConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Theorem database settings
    pub database: DatabaseConfig,
    /// Rule matching limits
    pub matching: MatchSettings,
    /// Heuristic model shape and training
    pub hmm: HmmSettings,
    /// User-defined search profiles, by name
    pub profiles: HashMap<String, SearchSettings>,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logging level
    pub log_level: LogLevel,
    /// Where named model contexts live
    pub contexts_dir: PathBuf,
    /// Profile used when none is named
    pub profile: String,
    /// Seed forced onto every profile
    pub seed: Option<u64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Normal,
            contexts_dir: PathBuf::from("contexts"),
            profile: "default".to_string(),
            seed: None,
        }
    }
}

/// Theorem database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Retries of a busy or locked transaction
    pub retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("atp.db"),
            retries: DEFAULT_RETRIES,
        }
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Log level options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quiet" | "q" | "0" => Some(LogLevel::Quiet),
            "normal" | "n" | "1" => Some(LogLevel::Normal),
            "verbose" | "v" | "2" => Some(LogLevel::Verbose),
            "debug" | "d" | "3" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// Default `tracing` filter directive for this level
    pub fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "error",
            LogLevel::Normal => "warn",
            LogLevel::Verbose => "info",
            LogLevel::Debug => "debug",
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

impl AtpConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from default locations
    ///
    /// Searches for config files in order:
    /// 1. ./atp.toml
    /// 2. ~/.config/atp/config.toml
    /// 3. ~/.atp/config.toml
    ///
    /// Then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for path in Self::config_paths() {
            if path.exists() {
                config = Self::load_from_file(&path)?;
                break;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<string>"), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |e: AtpError| ConfigError::InvalidValue(e.message);
        self.matching.validate().map_err(invalid)?;
        if self.hmm.states == 0 {
            return Err(ConfigError::InvalidValue("hmm.states must be at least 1".to_string()));
        }
        self.hmm.training.validate().map_err(invalid)?;
        let mut names: Vec<&String> = self.profiles.keys().collect();
        names.sort();
        for name in names {
            self.profile(name)?.validate().map_err(invalid)?;
        }
        Ok(())
    }

    /// Get the list of config file search paths
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./atp.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("atp").join("config.toml"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".atp").join("config.toml"));
        }

        paths
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("ATP_DB") {
            self.database.path = PathBuf::from(val);
        }

        if let Some(val) = var("ATP_CONTEXTS") {
            self.general.contexts_dir = PathBuf::from(val);
        }

        if let Some(level) = var("ATP_LOG_LEVEL").and_then(|v| LogLevel::from_str(&v)) {
            self.general.log_level = level;
        }

        if let Some(val) = var("ATP_PROFILE") {
            self.general.profile = val;
        }

        if let Some(seed) = var("ATP_SEED").and_then(|v| v.parse::<u64>().ok()) {
            self.general.seed = Some(seed);
        }
    }

    /// Resolve a search profile: user-defined first, then built-in
    pub fn profile(&self, name: &str) -> Result<SearchSettings, ConfigError> {
        let mut profile = match self.profiles.get(name) {
            Some(custom) => SearchSettings {
                name: name.to_string(),
                ..custom.clone()
            },
            None => SearchSettings::builtin(name).ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?,
        };
        if let Some(seed) = self.general.seed {
            profile = profile.with_seed(seed);
        }
        Ok(profile)
    }

    /// The profile named by `general.profile`
    pub fn default_profile(&self) -> Result<SearchSettings, ConfigError> {
        self.profile(&self.general.profile)
    }

    /// Path of a model context: `<contexts_dir>/<name>.json`, unless `name`
    /// is itself an existing file
    pub fn context_path(&self, name: &str) -> PathBuf {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return direct;
        }
        self.general.contexts_dir.join(format!("{}.json", name))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Write configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))
    }

    /// Generate a default configuration file content
    pub fn default_config_content() -> &'static str {
        r#"# atp Configuration File

[general]
# Logging level: quiet, normal, verbose, debug
log_level = "normal"
# Directory of <name>.json model contexts
contexts_dir = "contexts"
# Search profile used when none is named
profile = "default"
# Force a seed onto every profile (optional)
# seed = 42

[database]
path = "atp.db"
# Retries of a busy or locked transaction
retries = 3

[matching]
# Assignments tried per rewrite site for variables the match leaves free
max_assignments = 64
# Let a rule side that is a bare variable match any subexpression
expand_bare_variables = true

[hmm]
states = 4
seed = 24301

[hmm.training]
epochs = 20
smoothing = 0.01
decay = 0.8
tolerance = 1e-6

# Custom profiles can be defined like this:
# [profiles.deep]
# description = "Deeper search with a generous budget"
# heuristic = "side-distance"
# step_size = 200
# max_steps = 50
# [profiles.deep.solver]
# starting_depth = 4
# max_depth = 12
# [profiles.deep.stopping]
# kind = "basic"
# base_expansions = 200000
# base_seconds = 60.0
"#
    }

    /// List all available profiles
    pub fn available_profiles(&self) -> Vec<(String, String)> {
        let mut profiles: Vec<(String, String)> = SearchSettings::builtin_profiles()
            .into_iter()
            .filter(|p| !self.profiles.contains_key(&p.name))
            .map(|p| (p.name, p.description))
            .collect();

        let mut custom: Vec<(String, String)> = self
            .profiles
            .iter()
            .map(|(name, p)| {
                let desc = if p.description.is_empty() { "Custom profile".to_string() } else { p.description.clone() };
                (name.clone(), desc)
            })
            .collect();
        custom.sort();
        profiles.extend(custom);
        profiles
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading/writing config file
    #[error("IO error reading {}: {}", .0.display(), .1)]
    IoError(PathBuf, String),
    /// Parse error in config file
    #[error("Parse error in {}: {}", .0.display(), .1)]
    ParseError(PathBuf, String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializeError(String),
    /// Unknown profile name
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
    /// A value parsed but is out of range
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for AtpError {
    fn from(err: ConfigError) -> Self {
        let code = match &err {
            ConfigError::IoError(..) => ErrorCode::ConfigNotFound,
            ConfigError::ParseError(..) => ErrorCode::InvalidConfigSyntax,
            ConfigError::SerializeError(_) => ErrorCode::ConfigError,
            ConfigError::UnknownProfile(_) => ErrorCode::UnknownProfile,
            ConfigError::InvalidValue(_) => ErrorCode::InvalidSettings,
        };
        let error = AtpError::new(code, err.to_string());
        match err {
            ConfigError::UnknownProfile(_) => error.with_hint("Built-in profiles are default, fixed, basic and hmm"),
            _ => error,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{HeuristicKind, StoppingSettings};

    #[test]
    fn test_default_config() {
        let config = AtpConfig::new();
        assert_eq!(config.general.log_level, LogLevel::Normal);
        assert_eq!(config.general.profile, "default");
        assert_eq!(config.database.path, PathBuf::from("atp.db"));
        assert_eq!(config.matching, MatchSettings::default());
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [general]
            log_level = "verbose"
            contexts_dir = "/srv/contexts"

            [database]
            path = "/tmp/proofs.db"
            retries = 5

            [matching]
            max_assignments = 16

            [hmm]
            states = 6
        "#;

        let config = AtpConfig::load_from_str(toml).unwrap();
        assert_eq!(config.general.log_level, LogLevel::Verbose);
        assert_eq!(config.general.contexts_dir, PathBuf::from("/srv/contexts"));
        assert_eq!(config.database.retries, 5);
        assert_eq!(config.matching.max_assignments, 16);
        assert!(config.matching.expand_bare_variables);
        assert_eq!(config.hmm.states, 6);
    }

    #[test]
    fn test_default_content_parses() {
        let config = AtpConfig::load_from_str(AtpConfig::default_config_content()).unwrap();
        assert_eq!(config.matching, MatchSettings::default());
        assert_eq!(config.hmm, HmmSettings::default());
        assert_eq!(config.database.retries, DEFAULT_RETRIES);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("quiet"), Some(LogLevel::Quiet));
        assert_eq!(LogLevel::from_str("V"), Some(LogLevel::Verbose));
        assert_eq!(LogLevel::from_str("3"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("loud"), None);
        assert_eq!(LogLevel::Verbose.filter_directive(), "info");
    }

    #[test]
    fn test_builtin_profiles_resolve() {
        let config = AtpConfig::new();
        for name in ["default", "fixed", "basic", "hmm"] {
            assert_eq!(config.profile(name).unwrap().name, name);
        }
        assert_eq!(config.profile("hmm").unwrap().heuristic, HeuristicKind::Hmm);
        assert!(matches!(config.profile("basic").unwrap().stopping, StoppingSettings::Basic(_)));
    }

    #[test]
    fn test_custom_profile() {
        let toml = r#"
            [profiles.deep]
            description = "Deeper search"
            heuristic = "side-distance"
            max_steps = 50

            [profiles.deep.solver]
            starting_depth = 4
            max_depth = 12

            [profiles.deep.stopping]
            kind = "basic"
            base_expansions = 1000
        "#;

        let config = AtpConfig::load_from_str(toml).unwrap();
        let deep = config.profile("deep").unwrap();
        assert_eq!(deep.name, "deep");
        assert_eq!(deep.solver.max_depth, 12);
        assert_eq!(deep.max_steps, 50);
        assert_eq!(deep.heuristic, HeuristicKind::SideDistance);
        match &deep.stopping {
            StoppingSettings::Basic(b) => assert_eq!(b.base_expansions, 1000),
            other => panic!("unexpected stopping {:?}", other),
        }
        assert!(deep.validate().is_ok());

        let names: Vec<String> = config.available_profiles().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["default", "fixed", "basic", "hmm", "deep"]);
    }

    #[test]
    fn test_custom_profile_shadows_builtin() {
        let toml = r#"
            [profiles.fixed]
            max_steps = 3
        "#;
        let config = AtpConfig::load_from_str(toml).unwrap();
        assert_eq!(config.profile("fixed").unwrap().max_steps, 3);
        let fixed: Vec<_> = config.available_profiles().into_iter().filter(|(n, _)| n == "fixed").collect();
        assert_eq!(fixed.len(), 1);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AtpConfig::new();
        let vars: HashMap<&str, &str> = [
            ("ATP_DB", "/var/atp.db"),
            ("ATP_LOG_LEVEL", "debug"),
            ("ATP_PROFILE", "basic"),
            ("ATP_SEED", "7"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/var/atp.db"));
        assert_eq!(config.general.log_level, LogLevel::Debug);
        let profile = config.default_profile().unwrap();
        assert_eq!(profile.name, "basic");
        assert_eq!(profile.seed, Some(7));
        assert!(profile.randomise);
    }

    #[test]
    fn test_context_path() {
        let config = AtpConfig::new();
        assert_eq!(config.context_path("groups"), PathBuf::from("contexts").join("groups.json"));

        let file = tempfile::NamedTempFile::new().unwrap();
        let direct = file.path().to_string_lossy().to_string();
        assert_eq!(config.context_path(&direct), file.path());
    }

    #[test]
    fn test_serialize_config() {
        let config = AtpConfig::new();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[database]"));
        assert!(toml.contains("[matching]"));
        let back = AtpConfig::load_from_str(&toml).unwrap();
        assert_eq!(back.hmm, config.hmm);
    }

    #[test]
    fn test_config_paths() {
        let paths = AtpConfig::config_paths();
        assert!(!paths.is_empty());
        assert!(paths[0].ends_with("atp.toml"));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err = AtpConfig::load_from_str("[matching]\nmax_assignments = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("max_assignments"));
        assert_eq!(AtpError::from(err).code, ErrorCode::InvalidSettings);

        let toml = r#"
            [profiles.wild]
            [profiles.wild.stopping]
            kind = "basic"
            alpha = -1.0
        "#;
        let err = AtpConfig::load_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("wild"));

        let toml = r#"
            [profiles.nan]
            [profiles.nan.stopping]
            kind = "basic"
            base_seconds = nan
        "#;
        assert!(matches!(AtpConfig::load_from_str(toml), Err(ConfigError::InvalidValue(_))));

        let toml = r#"
            [profiles.scales]
            [profiles.scales.stopping]
            kind = "basic"
            min_scale = 4.0
            max_scale = 2.0
        "#;
        assert!(matches!(AtpConfig::load_from_str(toml), Err(ConfigError::InvalidValue(_))));

        assert!(matches!(
            AtpConfig::load_from_str("[hmm.training]\ndecay = 0.0\n"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(AtpConfig::load_from_str("[hmm]\nstates = 0\n"), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_helpers_table_parses() {
        let toml = r#"
            [profiles.near]
            [profiles.near.helpers]
            kind = "edit-distance"
            load = 200
            keep = 20
        "#;
        let config = AtpConfig::load_from_str(toml).unwrap();
        match config.profile("near").unwrap().helpers {
            crate::search::HelperSelection::EditDistance(e) => {
                assert_eq!((e.load, e.keep), (200, 20));
                assert_eq!(e.weighting, 2.0);
            }
            other => panic!("unexpected helpers {:?}", other),
        }
    }

    #[test]
    fn test_unknown_profile_error() {
        let config = AtpConfig::new();
        let err = config.profile("nonexistent").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(_)));
        assert_eq!(AtpError::from(err).code, ErrorCode::UnknownProfile);
    }
}
