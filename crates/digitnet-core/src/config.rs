use thiserror::Error;

/// Configuration IO error.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid format.
    #[error("Config error => Invalid format: {0}")]
    InvalidFormat(String),

    /// File not found.
    #[error("Config error => File not found: {0}")]
    FileNotFound(String),
}

/// Configuration trait.
///
/// Configurations are plain serializable structs saved and loaded as pretty-printed JSON.
pub trait Config: core::fmt::Debug + serde::Serialize + serde::de::DeserializeOwned {
    /// Saves the configuration to a file.
    ///
    /// # Arguments
    ///
    /// * `file` - File to save the configuration to.
    ///
    /// # Returns
    ///
    /// The output of the save operation.
    fn save<P: AsRef<std::path::Path>>(&self, file: P) -> std::io::Result<()> {
        let content = config_to_json(self).map_err(std::io::Error::other)?;
        std::fs::write(file, content)
    }

    /// Loads the configuration from a file.
    ///
    /// # Arguments
    ///
    /// * `file` - File to load the configuration from.
    ///
    /// # Returns
    ///
    /// The loaded configuration.
    fn load<P: AsRef<std::path::Path>>(file: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(file.as_ref())
            .map_err(|_| ConfigError::FileNotFound(file.as_ref().to_string_lossy().to_string()))?;
        config_from_str(&content)
    }

    /// Loads the configuration from a binary buffer.
    ///
    /// # Arguments
    ///
    /// * `data` - Binary buffer to load the configuration from.
    ///
    /// # Returns
    ///
    /// The loaded configuration.
    fn load_binary(data: &[u8]) -> Result<Self, ConfigError> {
        let content = core::str::from_utf8(data).map_err(|_| {
            ConfigError::InvalidFormat("Could not parse data as utf-8.".to_string())
        })?;
        config_from_str(content)
    }
}

/// Converts a configuration to a JSON string.
///
/// # Arguments
///
/// * `config` - Configuration to convert.
///
/// # Returns
///
/// The JSON string.
pub fn config_to_json<C: Config + ?Sized>(config: &C) -> Result<String, ConfigError> {
    serde_json::to_string_pretty(config).map_err(|err| ConfigError::InvalidFormat(format!("{err}")))
}

fn config_from_str<C: Config>(content: &str) -> Result<C, ConfigError> {
    serde_json::from_str(content).map_err(|err| ConfigError::InvalidFormat(format!("{err}")))
}
