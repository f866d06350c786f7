//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment
//! variables. An example configuration file can be found in the `configs/`
//! directory located in the repository root.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use silo_core::ckks::CkksConfig;

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    pub log: LoggingSettings,
    #[validate]
    pub model: ModelSettings,
    #[validate]
    pub cipher: CipherSettings,
    pub registry: RegistrySettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("silo").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Validate, Deserialize, Clone)]
#[validate(schema(function = "validate_model"))]
/// Model settings.
pub struct ModelSettings {
    /// The model name under which releases are registered.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [model]
    /// name = "demand"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILO_MODEL__NAME=demand
    /// ```
    pub name: String,

    /// The weight layout of the reference architecture: the ordered tensor
    /// shapes every submitted update must conform to.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [model]
    /// layout = [[10, 64], [64], [64, 1], [1]]
    /// ```
    pub layout: Vec<Vec<usize>>,
}

impl ModelSettings {
    /// Checks the model settings.
    fn validate_model(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::new("empty model name"));
        }
        if self.layout.is_empty() {
            return Err(ValidationError::new("empty weight layout"));
        }
        if self
            .layout
            .iter()
            .any(|shape| shape.iter().product::<usize>() == 0)
        {
            return Err(ValidationError::new("zero-sized tensor shape"));
        }
        Ok(())
    }
}

/// A wrapper for validate derive.
fn validate_model(s: &ModelSettings) -> Result<(), ValidationError> {
    s.validate_model()
}

#[derive(Debug, Validate, Deserialize, Clone)]
#[validate(schema(function = "validate_cipher"))]
/// Settings of the approximate homomorphic cipher.
pub struct CipherSettings {
    /// The degree of the polynomial modulus.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [cipher]
    /// poly_modulus_degree = 8192
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILO_CIPHER__POLY_MODULUS_DEGREE=8192
    /// ```
    pub poly_modulus_degree: usize,

    /// The bit sizes of the coefficient-modulus chain.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [cipher]
    /// coeff_modulus_bits = [60, 40, 40, 60]
    /// ```
    pub coeff_modulus_bits: Vec<u32>,

    /// The scaling exponent weights are encoded at.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [cipher]
    /// scale_bits = 40
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILO_CIPHER__SCALE_BITS=40
    /// ```
    pub scale_bits: u32,
}

impl From<CipherSettings> for CkksConfig {
    fn from(
        CipherSettings {
            poly_modulus_degree,
            coeff_modulus_bits,
            scale_bits,
        }: CipherSettings,
    ) -> CkksConfig {
        CkksConfig {
            poly_modulus_degree,
            coeff_modulus_bits,
            scale_bits,
        }
    }
}

impl CipherSettings {
    /// Checks the cipher settings.
    fn validate_cipher(&self) -> Result<(), ValidationError> {
        CkksConfig::from(self.clone())
            .validate()
            .map_err(|_| ValidationError::new("invalid cipher parameters"))
    }
}

/// A wrapper for validate derive.
fn validate_cipher(s: &CipherSettings) -> Result<(), ValidationError> {
    s.validate_cipher()
}

#[derive(Debug, Deserialize, Clone)]
/// Registry settings.
pub struct RegistrySettings {
    /// The root directory of the release store.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [registry]
    /// path = "model_registry"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILO_REGISTRY__PATH=model_registry
    /// ```
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILO_LOG__FILTER=info
    /// ```
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Default for ModelSettings {
        fn default() -> Self {
            Self {
                name: "demand".to_string(),
                layout: vec![vec![10, 64], vec![64], vec![64, 1], vec![1]],
            }
        }
    }

    impl Default for CipherSettings {
        fn default() -> Self {
            Self {
                poly_modulus_degree: 8192,
                coeff_modulus_bits: vec![60, 40, 40, 60],
                scale_bits: 40,
            }
        }
    }

    #[test]
    fn test_settings_new() {
        assert!(Settings::new("../configs/config.toml").is_ok());
        assert!(Settings::new("").is_err());
    }

    #[test]
    fn test_validate_model() {
        assert!(ModelSettings::default().validate().is_ok());

        let mut model = ModelSettings::default();
        model.name = String::new();
        assert!(model.validate().is_err());

        let mut model = ModelSettings::default();
        model.layout = vec![];
        assert!(model.validate().is_err());

        let mut model = ModelSettings::default();
        model.layout = vec![vec![10, 0]];
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_validate_cipher() {
        assert!(CipherSettings::default().validate().is_ok());

        let mut cipher = CipherSettings::default();
        cipher.poly_modulus_degree = 100;
        assert!(cipher.validate().is_err());

        let mut cipher = CipherSettings::default();
        cipher.coeff_modulus_bits = vec![];
        assert!(cipher.validate().is_err());

        let mut cipher = CipherSettings::default();
        cipher.scale_bits = 0;
        assert!(cipher.validate().is_err());
    }
}
