use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default location of the result database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("bisectrix").join("bisectrix.db"))
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the shared result database
    pub database_path: PathBuf,
    /// Concurrent evaluation slots
    pub workers: usize,
    /// How long each page visit is given during an evaluation
    pub seconds_per_visit: u64,
    /// Repeat dirty evaluations once before narrowing on them
    pub strict_clean: bool,
    /// Base interval between claim polls while waiting on another session
    pub claim_poll_ms: u64,
    /// How long to wait on a foreign claim before giving up
    pub claim_patience_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path()
                .unwrap_or_else(|| PathBuf::from("bisectrix.db")),
            workers: 8,
            seconds_per_visit: 5,
            strict_clean: false,
            claim_poll_ms: 2_000,
            claim_patience_ms: 900_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlDatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlEvaluationConfig {
    pub seconds_per_visit: Option<u64>,
    pub strict_clean: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlClaimsConfig {
    pub poll_ms: Option<u64>,
    pub patience_ms: Option<u64>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Database configuration
    pub database: Option<TomlDatabaseConfig>,
    /// Concurrent evaluation slots
    pub workers: Option<usize>,
    /// Evaluation configuration
    pub evaluation: Option<TomlEvaluationConfig>,
    /// Claim waiting configuration
    pub claims: Option<TomlClaimsConfig>,
}

impl Config {
    /// Load configuration, merging the file at `path` over the defaults.
    ///
    /// A missing or unreadable file leaves the defaults untouched; a file
    /// that fails to parse is ignored with a warning rather than aborting.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = Config::default();
        let Some(path) = path else {
            return config;
        };

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<TomlConfig>(&contents) {
                Ok(toml_config) => config.apply(toml_config),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "ignoring unparseable config file");
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable config file");
            }
        }

        config
    }

    fn apply(&mut self, toml_config: TomlConfig) {
        if let Some(database) = toml_config.database {
            if let Some(path) = database.path {
                self.database_path = path;
            }
        }
        if let Some(workers) = toml_config.workers {
            self.workers = workers;
        }
        if let Some(evaluation) = toml_config.evaluation {
            if let Some(seconds_per_visit) = evaluation.seconds_per_visit {
                self.seconds_per_visit = seconds_per_visit;
            }
            if let Some(strict_clean) = evaluation.strict_clean {
                self.strict_clean = strict_clean;
            }
        }
        if let Some(claims) = toml_config.claims {
            if let Some(poll_ms) = claims.poll_ms {
                self.claim_poll_ms = poll_ms;
            }
            if let Some(patience_ms) = claims.patience_ms {
                self.claim_patience_ms = patience_ms;
            }
        }
    }

    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.database_path = path;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.workers, 8);
        assert_eq!(config.seconds_per_visit, 5);
        assert!(!config.strict_clean);
        assert_eq!(config.claim_poll_ms, 2_000);
        assert_eq!(config.claim_patience_ms, 900_000);
    }

    #[test]
    fn test_load_without_a_path_keeps_defaults() {
        let config = Config::load(None);
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
workers = 3

[database]
path = "/tmp/bisect-test.db"

[evaluation]
seconds_per_visit = 12
strict_clean = true

[claims]
poll_ms = 250
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path()));
        assert_eq!(config.workers, 3);
        assert_eq!(config.database_path, PathBuf::from("/tmp/bisect-test.db"));
        assert_eq!(config.seconds_per_visit, 12);
        assert!(config.strict_clean);
        assert_eq!(config.claim_poll_ms, 250);
        // Untouched sections keep their defaults.
        assert_eq!(config.claim_patience_ms, 900_000);
    }

    #[test]
    fn test_partial_sections_merge_field_by_field() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[evaluation]
strict_clean = true
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path()));
        assert!(config.strict_clean);
        assert_eq!(config.seconds_per_visit, 5);
    }

    #[test]
    fn test_unparseable_file_is_ignored() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "workers = \"many\"").unwrap();

        let config = Config::load(Some(file.path()));
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let config = Config::load(Some(Path::new("/nonexistent/bisectrix.toml")));
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_builders_override() {
        let config = Config::default()
            .with_database_path(PathBuf::from("/tmp/elsewhere.db"))
            .with_workers(2);
        assert_eq!(config.database_path, PathBuf::from("/tmp/elsewhere.db"));
        assert_eq!(config.workers, 2);
    }
}
