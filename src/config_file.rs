//! Configuration file support
//!
//! Loads encoder configuration from TOML files. Every section and field is
//! optional; anything left out falls back to [`EncoderConfig::default`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{EncoderConfig, LoggingConfig};
use crate::error::{CodecError, Result};
use crate::types::{EncodeOptions, Tag, MAX_QUALITY, MIN_QUALITY};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Encoder settings
    pub encoder: Option<EncoderSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
    /// Tags added to every encode
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Default VBR quality (-0.1 ..= 1.0)
    pub quality: Option<f32>,
    /// Chunk ceiling override in samples per channel
    pub chunk_ceiling: Option<usize>,
    /// Yield to the executor between chunks
    pub yield_between_chunks: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CodecError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CodecError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let defaults = EncoderConfig::default();
        Self {
            encoder: Some(EncoderSettings {
                quality: Some(defaults.default_quality),
                chunk_ceiling: None,
                yield_between_chunks: Some(defaults.yield_between_chunks),
            }),
            logging: Some(LoggingSettings {
                level: defaults.logging.level,
                format: Some(defaults.logging.format),
            }),
            tags: Vec::new(),
        }
    }

    /// Convert to EncoderConfig, checking values the types cannot express.
    pub fn into_encoder_config(self) -> Result<EncoderConfig> {
        let defaults = EncoderConfig::default();
        let encoder = self.encoder.unwrap_or_default();

        let default_quality = encoder.quality.unwrap_or(defaults.default_quality);
        EncodeOptions::default()
            .with_quality(default_quality)
            .validate()
            .map_err(|_| {
                CodecError::Config(format!(
                    "encoder.quality {} is outside [{}, {}]",
                    default_quality, MIN_QUALITY, MAX_QUALITY
                ))
            })?;
        if encoder.chunk_ceiling == Some(0) {
            return Err(CodecError::Config("encoder.chunk_ceiling must be > 0".into()));
        }
        for tag in &self.tags {
            crate::tags::validate(tag)?;
        }

        let logging = self
            .logging
            .map(|l| LoggingConfig {
                level: l.level,
                format: l.format.unwrap_or(defaults.logging.format.clone()),
            })
            .unwrap_or(defaults.logging);

        Ok(EncoderConfig {
            default_quality,
            chunk_ceiling: encoder.chunk_ceiling,
            yield_between_chunks: encoder
                .yield_between_chunks
                .unwrap_or(defaults.yield_between_chunks),
            default_tags: self.tags,
            logging,
        })
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    ConfigFile::default_config().to_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default_config();
        let encoder = config.encoder.unwrap();
        assert_eq!(encoder.quality, Some(0.5));
        assert_eq!(encoder.yield_between_chunks, Some(true));
        assert_eq!(config.logging.unwrap().level, "info");
    }

    #[test]
    fn test_config_file_roundtrip() {
        let mut config = ConfigFile::default_config();
        config.tags.push(Tag::new("ALBUM", "Demos"));

        let mut temp_file = NamedTempFile::new().unwrap();
        let content = toml::to_string_pretty(&config).unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let loaded = ConfigFile::from_file(temp_file.path()).unwrap();
        assert_eq!(
            loaded.encoder.unwrap().quality,
            config.encoder.unwrap().quality
        );
        assert_eq!(loaded.tags, vec![Tag::new("ALBUM", "Demos")]);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ConfigFile::from_toml("").unwrap().into_encoder_config().unwrap();
        assert_eq!(config.default_quality, 0.5);
        assert!(config.yield_between_chunks);
        assert_eq!(config.chunk_ceiling, None);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file() {
        let content = r#"
            [encoder]
            quality = 0.8
            chunk_ceiling = 256

            [logging]
            level = "debug"

            [[tags]]
            name = "ARTIST"
            value = "Someone"
        "#;
        let config = ConfigFile::from_toml(content)
            .unwrap()
            .into_encoder_config()
            .unwrap();
        assert_eq!(config.default_quality, 0.8);
        assert_eq!(config.chunk_ceiling, Some(256));
        assert!(config.yield_between_chunks);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.default_tags, vec![Tag::new("ARTIST", "Someone")]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let quality = ConfigFile::from_toml("[encoder]\nquality = 3.0").unwrap();
        assert!(matches!(
            quality.into_encoder_config(),
            Err(CodecError::Config(_))
        ));

        let ceiling = ConfigFile::from_toml("[encoder]\nchunk_ceiling = 0").unwrap();
        assert!(ceiling.into_encoder_config().is_err());

        let tag = ConfigFile::from_toml("[[tags]]\nname = \"A=B\"\nvalue = \"x\"").unwrap();
        assert!(matches!(tag.into_encoder_config(), Err(CodecError::Tag(_))));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            ConfigFile::from_toml("[encoder\nquality"),
            Err(CodecError::Config(_))
        ));
    }

    #[test]
    fn test_generate_default_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        generate_default_config(&path).unwrap();

        assert!(path.exists());
        let loaded = ConfigFile::from_file(&path).unwrap();
        assert_eq!(loaded.encoder.unwrap().quality, Some(0.5));
    }
}
