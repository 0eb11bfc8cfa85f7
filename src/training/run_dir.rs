//! Run directory layout
//!
//! ```text
//! <project>/<name>[N]/
//!   args.toml
//!   history.json
//!   val_metrics.json
//!   weights/best.mpk
//!   weights/last.mpk
//!   weights/model_config.json
//!   weights/best.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct RunDir {
    root: PathBuf,
}

impl RunDir {
    /// Create `<project>/<name>`, or the first free `<name>2`, `<name>3`, ...
    ///
    /// With `exist_ok` an existing `<project>/<name>` is reused as is.
    pub fn create(project: &Path, name: &str, exist_ok: bool) -> Result<Self> {
        let root = if exist_ok {
            project.join(name)
        } else {
            next_free(project, name)
        };

        fs::create_dir_all(root.join("weights"))?;
        info!("Run directory: {:?}", root);
        Ok(Self { root })
    }

    /// Wrap an existing run directory
    pub fn open<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn weights_dir(&self) -> PathBuf {
        self.root.join("weights")
    }

    pub fn best(&self) -> PathBuf {
        self.weights_dir().join("best.mpk")
    }

    pub fn last(&self) -> PathBuf {
        self.weights_dir().join("last.mpk")
    }

    pub fn export(&self) -> PathBuf {
        self.weights_dir().join("best.json")
    }

    pub fn args(&self) -> PathBuf {
        self.root.join("args.toml")
    }

    pub fn history(&self) -> PathBuf {
        self.root.join("history.json")
    }

    pub fn val_metrics(&self) -> PathBuf {
        self.root.join("val_metrics.json")
    }
}

fn next_free(project: &Path, name: &str) -> PathBuf {
    let first = project.join(name);
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| project.join(format!("{name}{n}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_names_increment() {
        let project = TempDir::new().unwrap();

        let a = RunDir::create(project.path(), "ripeness_model", false).unwrap();
        let b = RunDir::create(project.path(), "ripeness_model", false).unwrap();
        let c = RunDir::create(project.path(), "ripeness_model", false).unwrap();

        assert_eq!(a.root(), project.path().join("ripeness_model"));
        assert_eq!(b.root(), project.path().join("ripeness_model2"));
        assert_eq!(c.root(), project.path().join("ripeness_model3"));
        assert!(c.weights_dir().is_dir());
    }

    #[test]
    fn test_exist_ok_reuses_directory() {
        let project = TempDir::new().unwrap();

        let a = RunDir::create(project.path(), "run", true).unwrap();
        std::fs::write(a.history(), "[]").unwrap();
        let b = RunDir::create(project.path(), "run", true).unwrap();

        assert_eq!(a, b);
        assert!(b.history().exists());
    }

    #[test]
    fn test_layout() {
        let run = RunDir::open("runs/x");
        assert_eq!(run.best(), PathBuf::from("runs/x/weights/best.mpk"));
        assert_eq!(run.export(), PathBuf::from("runs/x/weights/best.json"));
        assert_eq!(run.args(), PathBuf::from("runs/x/args.toml"));
    }
}
