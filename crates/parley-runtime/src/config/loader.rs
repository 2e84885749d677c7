//! Layered configuration loading.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. built-in defaults
//! 2. values passed to [`ConfigLoader::merge`]
//! 3. `parley.<profile>.<ext>` next to the main file
//! 4. the main file, `parley.<ext>` or `config.<ext>`
//! 5. `PARLEY_*` environment variables, `__` separating nested keys
//!
//! `<ext>` is `toml` with the `toml-config` feature (on by default) and
//! `yaml`/`yml` with `yaml-config`. Search directories are tried in turn and
//! the first one holding a main file wins.
//!
//! ```text
//! PARLEY_ROUTER__WORKERS=16           → router.workers = 16
//! PARLEY_ROUTER__DRAIN__DEADLINE_MS=1 → router.drain.deadline_ms = 1
//! PARLEY_LOGGING__LEVEL=debug         → logging.level = "debug"
//! ```
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .search_path("/etc/parley")
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::ParleyConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "PARLEY_";
const PROFILE_VAR: &str = "PARLEY_PROFILE";
const FILE_STEMS: [&str; 2] = ["parley", "config"];

/// A configuration file syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    /// Formats compiled into this build, in search order.
    const ENABLED: &'static [FileFormat] = &[
        #[cfg(feature = "toml-config")]
        FileFormat::Toml,
        #[cfg(feature = "yaml-config")]
        FileFormat::Yaml,
    ];

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn for_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.extensions().contains(&ext))
            .ok_or_else(|| ConfigError::UnsupportedFormat(ext.to_string()))
    }

    fn merge_into(self, figment: Figment, path: &Path) -> Figment {
        #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
        use figment::providers::Format;

        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(figment::providers::Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(figment::providers::Yaml::file(path)),
        }
    }
}

/// Deployment profile, selecting `parley.<profile>.*` overlay files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Named(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Named(name) => name,
        }
    }

    /// Parses a profile name, case-insensitively. `dev` and `prod` are
    /// accepted as short forms.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "development" | "dev" => Self::Development,
            "production" | "prod" => Self::Production,
            _ => Self::Named(name),
        }
    }

    /// Reads `PARLEY_PROFILE`; development when unset.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for a [`ParleyConfig`] assembled from several sources.
#[derive(Debug)]
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    explicit_file: Option<PathBuf>,
    env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader with the profile from `PARLEY_PROFILE` and env overrides on.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            explicit_file: None,
            env: true,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for configuration files.
    ///
    /// Without any, the current directory and then `<config dir>/parley`
    /// are searched.
    pub fn search_path(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_paths.push(dir.as_ref().to_owned());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(dir) => self.search_path(dir),
            Err(_) => self,
        }
    }

    /// Adds `<config dir>/parley`, e.g. `~/.config/parley` on Linux.
    pub fn with_user_config_dir(self) -> Self {
        match user_config_dir() {
            Some(dir) => self.search_path(dir),
            None => self,
        }
    }

    /// Uses exactly this file and skips the search. A missing file is an
    /// error rather than a fallback to defaults.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(path.as_ref().to_owned());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Layers `config` above the defaults. Files and env still override it.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<ParleyConfig> {
        let profile = self.profile.clone();
        let config: ParleyConfig = self.figment()?.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            workers = config.router.workers,
            dispatch = ?config.router.dispatch,
            log_level = %config.logging.level,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// The merged sources before extraction. Figment metadata on the result
    /// tells which source a value came from.
    pub fn figment(self) -> ConfigResult<Figment> {
        let files = self.config_files()?;
        let mut figment =
            Figment::from(Serialized::defaults(ParleyConfig::default())).merge(self.overrides);

        for (path, format) in files {
            info!(path = %path.display(), "Reading configuration file");
            figment = format.merge_into(figment, &path);
        }

        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }
        Ok(figment)
    }

    /// Files to merge, lowest priority first.
    fn config_files(&self) -> ConfigResult<Vec<(PathBuf, FileFormat)>> {
        if let Some(path) = &self.explicit_file {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            return Ok(vec![(path.clone(), FileFormat::for_path(path)?)]);
        }

        let dirs = if self.search_paths.is_empty() {
            default_search_paths()
        } else {
            self.search_paths.clone()
        };

        if let Some(found) = dirs.iter().find_map(|dir| self.files_in(dir)) {
            return Ok(found);
        }
        warn!(searched = ?dirs, "No configuration file found, using defaults");
        Ok(Vec::new())
    }

    /// The profile overlay and main file in `dir`, if a main file exists.
    fn files_in(&self, dir: &Path) -> Option<Vec<(PathBuf, FileFormat)>> {
        for format in FileFormat::ENABLED.iter().copied() {
            for stem in FILE_STEMS {
                for ext in format.extensions() {
                    let main = dir.join(format!("{stem}.{ext}"));
                    if !main.is_file() {
                        continue;
                    }
                    let mut files = Vec::with_capacity(2);
                    let overlay = dir.join(format!("{stem}.{}.{ext}", self.profile));
                    if overlay.is_file() {
                        debug!(path = %overlay.display(), profile = %self.profile, "Found profile overlay");
                        files.push((overlay, format));
                    }
                    files.push((main, format));
                    return Some(files);
                }
            }
        }
        None
    }
}

fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley"))
}

fn default_search_paths() -> Vec<PathBuf> {
    std::env::current_dir()
        .ok()
        .into_iter()
        .chain(user_config_dir())
        .collect()
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<ParleyConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from one file plus the environment.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<ParleyConfig> {
    ConfigLoader::new().file(path).load()
}
