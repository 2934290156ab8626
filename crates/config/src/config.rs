//! Configuration files.

use serde::{Deserialize, Serialize};
use stagedsync_primitives::PruneModes;
use std::path::{Path, PathBuf};

/// Configuration for the staged sync engine.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for each stage in the pipeline.
    pub stages: StageConfig,
    /// Configuration for pruning.
    pub prune: PruneConfig,
}

impl Config {
    /// Loads the configuration from a TOML file, creating the file with the default configuration
    /// if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, confy::ConfyError> {
        confy::load_path(path)
    }

    /// Writes the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), confy::ConfyError> {
        confy::store_path(path, self)
    }
}

/// Configuration for each stage in the pipeline.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct StageConfig {
    /// Scratch storage used by stages that build sorted indices.
    pub etl: EtlConfig,
    /// Block hashes stage configuration.
    pub block_hashes: BlockHashesConfig,
    /// Sender recovery stage configuration.
    pub senders: SenderRecoveryConfig,
}

/// ETL collector configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Directory under which the collectors create their temporary files.
    ///
    /// Defaults to the system temporary directory.
    pub dir: Option<PathBuf>,
    /// The maximum size in bytes of data held in memory before being flushed to disk as a file.
    pub file_size: usize,
}

impl EtlConfig {
    /// Default size in bytes of data held in memory before being flushed to disk as a file.
    pub const fn default_file_size() -> usize {
        // 500 MiB
        500 * (1024 * 1024)
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self { dir: None, file_size: Self::default_file_size() }
    }
}

/// Block hashes stage configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct BlockHashesConfig {
    /// Percentage of the collected entries after which loading progress is logged.
    pub log_every_percent: u64,
}

impl Default for BlockHashesConfig {
    fn default() -> Self {
        Self { log_every_percent: 10 }
    }
}

/// Sender recovery stage configuration.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct SenderRecoveryConfig {
    /// The maximum number of transactions handed to one worker at a time.
    pub batch_size: usize,
    /// The maximum number of recovery workers.
    ///
    /// Defaults to the available hardware parallelism.
    pub max_workers: Option<usize>,
}

impl SenderRecoveryConfig {
    /// Returns the number of workers to use, resolving the default.
    pub fn workers(&self) -> usize {
        self.max_workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

impl Default for SenderRecoveryConfig {
    fn default() -> Self {
        Self { batch_size: 50_000, max_workers: None }
    }
}

/// Pruning configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Pruning configuration for every segment of the data that can be pruned.
    pub segments: PruneModes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagedsync_primitives::PruneMode;

    const EXTENSION: &str = "toml";

    fn with_tempdir(filename: &str, proc: fn(&std::path::Path)) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join(filename).with_extension(EXTENSION);

        proc(&config_path);

        temp_dir.close().unwrap()
    }

    #[test]
    fn test_store_config() {
        with_tempdir("config-store-test", |config_path| {
            let config = Config::default();
            config.save(config_path).unwrap();
            assert!(config_path.exists());
        })
    }

    #[test]
    fn test_load_config() {
        with_tempdir("config-load-test", |config_path| {
            let mut config = Config::default();
            config.stages.senders.max_workers = Some(3);
            config.prune.segments.senders = Some(PruneMode::Distance(64));
            config.save(config_path).unwrap();

            let loaded_config = Config::load(config_path).unwrap();
            assert_eq!(config, loaded_config);
        })
    }

    #[test]
    fn test_load_missing_config_writes_defaults() {
        with_tempdir("config-missing-test", |config_path| {
            let loaded_config = Config::load(config_path).unwrap();
            assert_eq!(loaded_config, Config::default());
            assert!(config_path.exists());
        })
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [stages.senders]
            batch_size = 10

            [prune.segments]
            senders = { before = 100 }
            "#,
        )
        .unwrap();

        assert_eq!(config.stages.senders.batch_size, 10);
        assert_eq!(config.stages.senders.max_workers, None);
        assert!(config.stages.senders.workers() >= 1);
        assert_eq!(config.stages.etl, EtlConfig::default());
        assert_eq!(config.stages.block_hashes.log_every_percent, 10);
        assert_eq!(config.prune.segments.senders, Some(PruneMode::Before(100)));
    }
}
