//! Encoder configuration

use serde::{Deserialize, Serialize};

use crate::types::{Tag, DEFAULT_QUALITY};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Quality used when a caller leaves it at the default
    pub default_quality: f32,

    /// Lower the engine's chunk ceiling (never raises it)
    pub chunk_ceiling: Option<usize>,

    /// Yield to the executor between chunks
    pub yield_between_chunks: bool,

    /// Tags prepended to every encode
    pub default_tags: Vec<Tag>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            default_quality: DEFAULT_QUALITY,
            chunk_ceiling: None,
            yield_between_chunks: true,
            default_tags: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EncoderConfig {
    /// Default filter directive for the tracing subscriber
    pub fn log_filter(&self) -> String {
        format!("chunked_ogg={}", self.logging.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncoderConfig::default();
        assert_eq!(config.default_quality, 0.5);
        assert_eq!(config.chunk_ceiling, None);
        assert!(config.yield_between_chunks);
        assert!(config.default_tags.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_log_filter() {
        let config = EncoderConfig {
            logging: LoggingConfig {
                level: "debug".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.log_filter(), "chunked_ogg=debug");
    }
}
