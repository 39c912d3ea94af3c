//! Conversation memory configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::memory::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::application::StageSettings;

/// Short-term session state and semantic recall settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Lifetime of per-session state
    #[serde(default = "default_short_term_ttl")]
    pub short_term_ttl_secs: u64,

    /// Memory excerpts recalled per chat request
    #[serde(default = "default_excerpt_count")]
    pub excerpt_count: usize,

    #[serde(default = "default_min_excerpt_score")]
    pub min_excerpt_score: f32,

    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Redis URL for short-term memory; in-process when unset
    pub redis_url: Option<String>,
}

impl MemoryConfig {
    pub fn short_term_ttl(&self) -> Duration {
        Duration::from_secs(self.short_term_ttl_secs)
    }

    pub fn stage_settings(&self) -> StageSettings {
        StageSettings {
            short_term_ttl: self.short_term_ttl(),
            excerpt_count: self.excerpt_count,
            min_excerpt_score: self.min_excerpt_score,
        }
    }

    /// Validate memory configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.short_term_ttl_secs == 0 {
            return Err(ValidationError::MustBePositive {
                field: "memory.short_term_ttl_secs",
            });
        }
        if self.embedding_dimensions == 0 {
            return Err(ValidationError::MustBePositive {
                field: "memory.embedding_dimensions",
            });
        }
        if let Some(url) = &self.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ValidationError::InvalidRedisUrl);
            }
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_ttl_secs: default_short_term_ttl(),
            excerpt_count: default_excerpt_count(),
            min_excerpt_score: default_min_excerpt_score(),
            embedding_dimensions: default_embedding_dimensions(),
            redis_url: None,
        }
    }
}

fn default_short_term_ttl() -> u64 {
    30 * 60
}

fn default_excerpt_count() -> usize {
    3
}

fn default_min_excerpt_score() -> f32 {
    0.25
}

fn default_embedding_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_defaults() {
        let config = MemoryConfig::default();
        let settings = config.stage_settings();
        assert_eq!(settings.short_term_ttl, Duration::from_secs(1800));
        assert_eq!(settings.excerpt_count, 3);
        assert!(config.redis_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let config = MemoryConfig {
            redis_url: Some("http://localhost:6379".to_string()),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidRedisUrl));
    }

    #[test]
    fn test_validation_valid_redis_url() {
        let config = MemoryConfig {
            redis_url: Some("rediss://cache.internal:6380".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
