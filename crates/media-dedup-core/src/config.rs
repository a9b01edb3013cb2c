use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Name of the state directory kept inside the library base
pub const STATE_DIR_NAME: &str = "_DJProducerTools";

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Configuration for indexing, planning and checkpointing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the managed media library
    pub base: PathBuf,

    /// Override for the state directory (defaults to `<base>/_DJProducerTools`)
    pub state_dir: Option<PathBuf>,

    /// Read buffer used when streaming file contents into the hasher
    pub buffer_size: usize,

    /// Number of hashing workers (0 = auto)
    pub threads: usize,

    /// Capacity of the channels between walker, workers and writer
    pub queue_depth: usize,

    /// Mount points reported in checkpoint disk-usage summaries
    pub disk_usage_targets: Vec<PathBuf>,

    /// Re-hash every checkpoint copy against its source
    pub verify_checkpoints: bool,

    /// Fail on malformed store rows instead of skipping them
    pub strict_rows: bool,

    /// Draw a progress spinner while hashing
    pub show_progress: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Music");
        Self {
            disk_usage_targets: vec![base.clone()],
            base,
            state_dir: None,
            buffer_size: 1024 * 1024,
            threads: 0, // Auto
            queue_depth: 256,
            verify_checkpoints: true,
            strict_rows: false,
            show_progress: false,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Configuration(
                "Hash buffer size must be greater than zero".to_string(),
            ));
        }

        if self.queue_depth == 0 {
            return Err(Error::Configuration(
                "Queue depth must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of hashing workers after resolving `0` to the CPU count
    pub fn worker_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.threads
        }
    }

    /// The state directory holding indexes, plans and checkpoints
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.base.join(STATE_DIR_NAME))
    }

    pub fn layout(&self) -> StateLayout {
        StateLayout::new(self.state_dir())
    }
}

/// Well-known artifact locations inside a state directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Primary (library) hash index
    pub fn hash_index(&self) -> PathBuf {
        self.root.join("reports").join("hash_index.tsv")
    }

    pub fn dedup_report(&self) -> PathBuf {
        self.root
            .join("reports")
            .join("general_hash_dupes_report.txt")
    }

    pub fn dedup_plan(&self) -> PathBuf {
        self.root.join("plans").join("general_hash_dupes_plan.tsv")
    }

    pub fn consolidation_plan(&self) -> PathBuf {
        self.root.join("plans").join("consolidation_plan.tsv")
    }

    /// Hash store covering roots outside the library
    pub fn external_hashes(&self) -> PathBuf {
        self.root.join("external_hashes.tsv")
    }

    pub fn checkpoints(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    /// Artifacts copied into every checkpoint, in copy order
    pub fn checkpoint_artifacts(&self) -> Vec<PathBuf> {
        vec![
            self.hash_index(),
            self.dedup_report(),
            self.dedup_plan(),
            self.consolidation_plan(),
            self.external_hashes(),
        ]
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
