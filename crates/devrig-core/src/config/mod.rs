pub mod schema;

use crate::{Error, ThisError};
use schema::{ConfigSchemaError, Validate};
use std::{
    fs,
    path::Path,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

pub use schema::ConfigModel;

//
// CONFIG
//
// Host tests run on many threads (the dispatcher looper, guard drops, the test
// runner itself), so the active model lives behind an RwLock and is handed out
// as an Arc. Components that need a specific model take it explicitly; the
// global slot exists for the CLI and for the log macro's level filter.
//

static CONFIG: RwLock<Option<Arc<ConfigModel>>> = RwLock::new(None);
static DEFAULT: OnceLock<Arc<ConfigModel>> = OnceLock::new();

/// Errors related to configuration lifecycle and parsing.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("config has already been initialized")]
    AlreadyInitialized,

    #[error("cannot read config file '{path}': {reason}")]
    CannotReadFile { path: String, reason: String },

    /// TOML could not be parsed into the expected structure.
    #[error("toml error: {0}")]
    CannotParseToml(String),

    /// Wrapper for data schema-level errors.
    #[error(transparent)]
    ConfigSchema(#[from] ConfigSchemaError),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

///
/// Config
///

pub struct Config {}

impl Config {
    /// Return the active model, or the validated defaults if none was installed.
    #[must_use]
    pub fn get() -> Arc<ConfigModel> {
        Self::try_get().unwrap_or_else(|| {
            DEFAULT
                .get_or_init(|| Arc::new(ConfigModel::default()))
                .clone()
        })
    }

    #[must_use]
    pub fn try_get() -> Option<Arc<ConfigModel>> {
        CONFIG
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .cloned()
    }

    /// Parse and validate a TOML document without installing it.
    pub fn parse_toml(config_str: &str) -> Result<ConfigModel, ConfigError> {
        let config: ConfigModel =
            toml::from_str(config_str).map_err(|e| ConfigError::CannotParseToml(e.to_string()))?;

        // validate
        config.validate().map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Initialize the global configuration from a TOML string.
    pub fn init_from_toml(config_str: &str) -> Result<Arc<ConfigModel>, ConfigError> {
        let config = Self::parse_toml(config_str)?;

        Self::install(config)
    }

    /// Initialize the global configuration from a TOML file on disk.
    pub fn load(path: &Path) -> Result<Arc<ConfigModel>, ConfigError> {
        let config_str = fs::read_to_string(path).map_err(|e| ConfigError::CannotReadFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::init_from_toml(&config_str)
    }

    /// Initialize the global configuration from an in-memory model.
    pub fn init_from_model(config: ConfigModel) -> Result<Arc<ConfigModel>, ConfigError> {
        config.validate().map_err(ConfigError::from)?;

        Self::install(config)
    }

    /// Return the current config as a TOML string.
    pub fn to_toml() -> Result<String, ConfigError> {
        let cfg = Self::get();

        toml::to_string_pretty(&*cfg).map_err(|e| ConfigError::CannotParseToml(e.to_string()))
    }

    /// Reset the global config so tests can reinitialize with a fresh model.
    pub fn reset_for_tests() {
        *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn install(config: ConfigModel) -> Result<Arc<ConfigModel>, ConfigError> {
        let mut slot = CONFIG.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(ConfigError::AlreadyInitialized);
        }

        let arc = Arc::new(config);
        *slot = Some(arc.clone());

        Ok(arc)
    }
}

///
/// TESTS
///
