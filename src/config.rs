//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! [query]
//! cache = true
//! start = "smallest-index"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{MotifError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub query: QueryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Default for `QueryOptions::cache` when the caller leaves it unset.
    pub cache: bool,
    /// How the planner picks the slot each component starts from.
    pub start: StartHeuristic,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            cache: false,
            start: StartHeuristic::SmallestIndex,
        }
    }
}

/// Starting-slot choice per disjoint component. Both give the same results;
/// they differ only in how much of the graph the search touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartHeuristic {
    /// First slot of the component, in declaration order.
    FirstSlot,
    /// Slot whose candidate index is smallest.
    #[default]
    SmallestIndex,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| MotifError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.query.cache);
        assert_eq!(config.query.start, StartHeuristic::SmallestIndex);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[query]\ncache = true\nstart = \"first-slot\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.query.cache);
        assert_eq!(config.query.start, StartHeuristic::FirstSlot);
    }

    #[test]
    fn test_invalid_heuristic() {
        let err = Config::from_toml_str("[query]\nstart = \"random\"").unwrap_err();
        assert!(matches!(err, MotifError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/motif.toml"));
        assert!(matches!(result, Err(MotifError::Io(_))));
    }
}
