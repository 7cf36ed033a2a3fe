//! Helpers for driving the `tferry` binary.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A scratch directory to run `tferry` in, isolated from the caller's environment.
pub struct CliWorkspace {
    pub temp: TempDir,
}

impl CliWorkspace {
    pub fn new() -> Self {
        super::init_test_logging();
        Self {
            temp: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn ferry_dir(&self) -> PathBuf {
        self.temp.path().join(".ferry")
    }

    pub fn tferry(&self) -> Command {
        let bin = assert_cmd::cargo::cargo_bin!("tferry");
        let mut cmd = Command::new(bin.as_os_str());
        cmd.current_dir(self.root())
            .env("HOME", self.root())
            .env("NO_COLOR", "1")
            .env_remove("FERRY_DIR")
            .env_remove("SUPEROPS_API_KEY")
            .env_remove("SUPEROPS_SUBDOMAIN")
            .env_remove("SYNCRO_API_KEY")
            .env_remove("SYNCRO_URL")
            .env_remove("RUST_LOG");
        cmd
    }
}
