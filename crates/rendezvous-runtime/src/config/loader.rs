//! Layered loading of [`RendezvousConfig`].
//!
//! # Load Order
//!
//! 1. `RendezvousConfig::default()`
//! 2. Global config (`~/.rendezvous/config.toml`)
//! 3. Project config (`<project>/.rendezvous/config.toml`)
//! 4. Environment variables (`RENDEZVOUS_*`)
//!
//! Later layers win. A file overrides exactly the fields it mentions,
//! even when the value it writes is the default.

use super::{
    default_config_path, ConfigError, ConfigLayer, RendezvousConfig, PROJECT_CONFIG_DIR,
    PROJECT_CONFIG_FILE,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builds a [`RendezvousConfig`] from defaults, files and the environment.
///
/// # Example
///
/// ```no_run
/// use rendezvous_runtime::config::ConfigLoader;
///
/// let _config = ConfigLoader::new()
///     .with_project_root("/path/to/project")
///     .load()?;
/// # Ok::<(), rendezvous_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    global_config_path: Option<PathBuf>,
    project_root: Option<PathBuf>,
    skip_env: bool,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    /// Loader reading every layer from its default location.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the global layer from `path` instead of `~/.rendezvous/config.toml`.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Enables the project layer at `<path>/.rendezvous/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Ignores `RENDEZVOUS_*` variables.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Ignores the global file.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Ignores the project file.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Reads every enabled layer and applies them in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file exists but cannot be read or
    /// parsed, or an environment variable holds an invalid value. Missing
    /// files are ignored.
    pub fn load(&self) -> Result<RendezvousConfig, ConfigError> {
        self.load_with_env(|name| std::env::var(name).ok())
    }

    fn load_with_env<F>(&self, lookup: F) -> Result<RendezvousConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RendezvousConfig::default();

        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(layer) = load_file(&global_path)? {
                debug!(path = %global_path.display(), "Applied global config layer");
                config.apply(&layer);
            }
        }

        if !self.skip_project {
            if let Some(root) = &self.project_root {
                let path = root.join(PROJECT_CONFIG_DIR).join(PROJECT_CONFIG_FILE);
                if let Some(layer) = load_file(&path)? {
                    debug!(path = %path.display(), "Loaded project config");
                    config.apply(&layer);
                }
            }
        }

        if !self.skip_env {
            apply_env_vars(&mut config, lookup)?;
        }

        Ok(config)
    }
}

/// Loads a config file as a layer, returning `None` if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let layer = ConfigLayer::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

    Ok(Some(layer))
}

/// Applies `RENDEZVOUS_*` overrides read through `lookup`.
fn apply_env_vars<F>(config: &mut RendezvousConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("RENDEZVOUS_DEBUG") {
        config.debug = parse_bool(&val)
            .ok_or_else(|| ConfigError::invalid_env_var("RENDEZVOUS_DEBUG", "expected bool"))?;
    }

    let millis = [
        ("RENDEZVOUS_SEND_TIMEOUT_MS", &mut config.broker.send_timeout_ms),
        ("RENDEZVOUS_IDLE_TIMEOUT_MS", &mut config.broker.idle_timeout_ms),
        ("RENDEZVOUS_SWEEP_INTERVAL_MS", &mut config.broker.sweep_interval_ms),
    ];
    for (name, field) in millis {
        if let Some(val) = lookup(name) {
            *field = val.trim().parse().map_err(|_| {
                ConfigError::invalid_env_var(name, "expected milliseconds as an unsigned integer")
            })?;
            debug!(var = name, value = *field, "Applied env override");
        }
    }

    Ok(())
}

/// Case-insensitive `true/false`, `1/0`, `yes/no`, `on/off`.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Writes `config` to `~/.rendezvous/config.toml`.
///
/// # Errors
///
/// See [`save_config`].
pub fn save_global_config(config: &RendezvousConfig) -> Result<(), ConfigError> {
    save_config(config, &default_config_path())
}

/// Saves a config to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError`] if the directory or file cannot be written.
pub fn save_config(config: &RendezvousConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let toml = config.to_toml()?;
    std::fs::write(path, toml).map_err(|e| ConfigError::write_file(path, e))?;

    Ok(())
}
