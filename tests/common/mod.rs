#![allow(dead_code)]

use tempfile::TempDir;
use ticket_ferry::config::{FerryConfig, FerryPaths, default_config_layer};
use ticket_ferry::storage::SqliteStorage;

pub mod cli;
pub mod fakes;
pub mod fixtures;

pub fn init_test_logging() {
    ticket_ferry::logging::init_test_logging();
}

pub fn test_store() -> SqliteStorage {
    init_test_logging();
    SqliteStorage::open_memory().expect("Failed to create test database")
}

/// A temp directory holding a `.ferry` working directory.
pub struct Workspace {
    pub temp: TempDir,
    pub paths: FerryPaths,
}

impl Workspace {
    pub fn new() -> Self {
        init_test_logging();
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dir = temp.path().join(".ferry");
        std::fs::create_dir_all(dir.join("logs")).expect("Failed to create .ferry");
        let paths = FerryPaths::new(&dir);
        Self { temp, paths }
    }

    pub fn log_files(&self) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(&self.paths.logs)
            .expect("read logs dir")
            .map(|entry| entry.expect("dir entry").path())
            .collect();
        files.sort();
        files
    }
}

/// Default configuration, as produced by an empty config file.
pub fn default_config() -> FerryConfig {
    FerryConfig::from_layer(&default_config_layer()).expect("default config is valid")
}
