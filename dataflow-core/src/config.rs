//! Pipeline configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration shared by every pipeline built from one [`PipelineContext`]
///
/// [`PipelineContext`]: crate::context::PipelineContext
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of worker threads used to run captured functions
    pub worker_threads: usize,

    /// Default resource container for published datasets
    pub container: String,

    /// Seed applied to shuffles built with `seed == seed2 == 0`
    pub shuffle_seed: Option<u64>,

    /// Run captured functions on the calling thread
    pub inline_functions: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            container: "localhost".to_string(),
            shuffle_seed: None,
            inline_functions: false,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check field ranges
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be greater than zero".into()));
        }
        if self.container.is_empty() {
            return Err(Error::Config("container must not be empty".into()));
        }
        Ok(())
    }

    /// Whether captured functions should be dispatched to a worker pool
    pub fn uses_worker_pool(&self) -> bool {
        !self.inline_functions && self.worker_threads > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.worker_threads >= 1);
        assert_eq!(config.container, "localhost");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json_str(r#"{"shuffle_seed": 7, "inline_functions": true}"#).unwrap();
        assert_eq!(config.shuffle_seed, Some(7));
        assert!(!config.uses_worker_pool());
        assert_eq!(config.container, "localhost");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PipelineConfig::from_json_str(r#"{"worker_threads": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = PipelineConfig::from_json_str(r#"{"container": ""}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = PipelineConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"worker_threads": 3, "container": "jobs"}}"#).unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.container, "jobs");
        assert!(matches!(
            PipelineConfig::from_file(file.path().with_extension("missing")),
            Err(Error::Io(_))
        ));
    }
}
