use crate::error::{RankingError, Result};
use crate::fusion::{DEFAULT_RRF_K, FusionParams};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine-wide settings shared by every query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// RRF constant k (higher = less emphasis on top results)
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// Fields the lexical query is matched against
    #[serde(default = "default_search_fields")]
    pub search_fields: Vec<String>,

    /// Field holding document vectors
    #[serde(default = "default_vector_field")]
    pub vector_field: String,

    /// Semantic configuration passed to the index for semantic ranking
    #[serde(default)]
    pub semantic_configuration_name: Option<String>,

    /// Send one combined request when the service supports it
    #[serde(default = "default_true")]
    pub prefer_combined_queries: bool,

    /// Upper bound for the upstream phase of a query (embedding + search)
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,
}

fn default_rrf_k() -> f64 {
    DEFAULT_RRF_K
}

fn default_search_fields() -> Vec<String> {
    vec!["content_text".to_string()]
}

fn default_vector_field() -> String {
    "content_vector".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            search_fields: default_search_fields(),
            vector_field: default_vector_field(),
            semantic_configuration_name: None,
            prefer_combined_queries: true,
            query_timeout_ms: None,
        }
    }
}

impl RankingConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.rrf_k.is_finite() || self.rrf_k <= 0.0 {
            return Err(format!("rrf_k must be > 0, got {}", self.rrf_k));
        }

        if self.search_fields.is_empty() {
            return Err("search_fields must not be empty".to_string());
        }

        if self.search_fields.iter().any(|f| f.trim().is_empty()) {
            return Err("search_fields must not contain blank names".to_string());
        }

        if self.vector_field.trim().is_empty() {
            return Err("vector_field must not be blank".to_string());
        }

        if matches!(&self.semantic_configuration_name, Some(name) if name.trim().is_empty()) {
            return Err("semantic_configuration_name must not be blank".to_string());
        }

        if self.query_timeout_ms == Some(0) {
            return Err("query_timeout_ms must be > 0 when set".to_string());
        }

        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: RankingConfig =
            toml::from_str(raw).map_err(|e| RankingError::Config(e.to_string()))?;
        config.validate().map_err(RankingError::Config)?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RankingError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn fusion_params(&self) -> FusionParams {
        FusionParams { rrf_k: self.rrf_k }
    }

    pub fn with_semantic_configuration(mut self, name: impl Into<String>) -> Self {
        self.semantic_configuration_name = Some(name.into());
        self
    }

    pub fn with_query_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.query_timeout_ms = Some(timeout_ms);
        self
    }
}
