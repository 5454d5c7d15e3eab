//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - Temporary block store roots
//! - Project-local config files
//!
//! # Usage
//!
//! ```ignore
//! use dagfs_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let store = dagfs_cas::FsStore::new(&env.store_root).unwrap();
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Isolated block store root
    pub store_root: PathBuf,
    /// Project root for the test
    pub project_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let project_root = root.join("project");
        let store_root = root.join(format!("blocks-{}", test_id));

        std::fs::create_dir_all(project_root.join(".dagfs"))?;
        std::fs::create_dir_all(&store_root)?;

        Ok(Self {
            _temp_dir: temp_dir,
            store_root,
            project_root,
            test_id,
        })
    }

    /// Path of the project-local config file
    pub fn project_config_path(&self) -> PathBuf {
        self.project_root.join(".dagfs").join("config.toml")
    }

    /// Write a project-local config file
    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Config pointing at this environment's store, with no files or env applied
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.storage.root = self.store_root.clone();
        cfg
    }
}
