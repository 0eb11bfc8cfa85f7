//! Dataset descriptor (`data.yaml`)
//!
//! The training driver is pointed at a small YAML file rather than at a
//! directory:
//!
//! ```yaml
//! path: datasets/leaves   # optional, relative to this file
//! train: train            # relative to `path`
//! val: valid
//! nc: 4                   # optional, checked against `names`
//! names: [unripe, turning, ripe, overripe]   # or {0: unripe, 1: turning, ...}
//! ```
//!
//! Each split directory holds one sub-directory per class. When `names` is
//! omitted the class list is the sorted sub-directories of the train split.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::utils::error::{CropDocError, Result};

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    path: Option<PathBuf>,
    train: PathBuf,
    #[serde(alias = "valid")]
    val: PathBuf,
    nc: Option<usize>,
    names: Option<RawNames>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNames {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

/// A resolved dataset descriptor with absolute-or-cwd-relative split paths
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDescriptor {
    /// The YAML file this was read from
    pub source: PathBuf,
    /// Dataset root every split is resolved against
    pub root: PathBuf,
    /// Training split directory
    pub train: PathBuf,
    /// Validation split directory
    pub val: PathBuf,
    /// Class names in label order, if the descriptor lists them
    pub names: Option<Vec<String>>,
}

impl DatasetDescriptor {
    /// Read and resolve a descriptor file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CropDocError::Descriptor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&content, base_dir, path)
    }

    /// Parse descriptor text, resolving relative paths against `base_dir`
    pub fn parse(content: &str, base_dir: &Path, source: &Path) -> Result<Self> {
        let invalid = |reason: String| CropDocError::Descriptor {
            path: source.to_path_buf(),
            reason,
        };

        let raw: RawDescriptor =
            serde_yaml::from_str(content).map_err(|e| invalid(e.to_string()))?;

        let root = match raw.path {
            Some(p) if p.is_absolute() => p,
            Some(p) => base_dir.join(p),
            None => base_dir.to_path_buf(),
        };

        let names = match raw.names {
            None => None,
            Some(RawNames::List(list)) => Some(list),
            Some(RawNames::Map(map)) => {
                // Keys must be exactly 0..n so positions stay label indices.
                if let Some((pos, (key, _))) =
                    map.iter().enumerate().find(|(pos, (key, _))| *pos != **key)
                {
                    return Err(invalid(format!(
                        "class index {} found where {} was expected",
                        key, pos
                    )));
                }
                Some(map.into_values().collect())
            }
        };

        if let (Some(nc), Some(names)) = (raw.nc, names.as_ref()) {
            if nc != names.len() {
                return Err(invalid(format!(
                    "nc is {} but {} names are listed",
                    nc,
                    names.len()
                )));
            }
        }

        let descriptor = Self {
            source: source.to_path_buf(),
            train: resolve(&root, raw.train),
            val: resolve(&root, raw.val),
            root,
            names,
        };
        debug!("Resolved dataset descriptor: {:?}", descriptor);
        Ok(descriptor)
    }

    /// Class names in label order
    ///
    /// Falls back to the sorted class directories of the train split.
    pub fn class_names(&self) -> Result<Vec<String>> {
        if let Some(names) = &self.names {
            return Ok(names.clone());
        }

        if !self.train.is_dir() {
            return Err(CropDocError::Dataset(format!(
                "train split directory does not exist: {}",
                self.train.display()
            )));
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.train)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();

        if names.is_empty() {
            return Err(CropDocError::Dataset(format!(
                "no class directories under {}",
                self.train.display()
            )));
        }
        Ok(names)
    }
}

fn resolve(root: &Path, split: PathBuf) -> PathBuf {
    if split.is_absolute() {
        split
    } else {
        root.join(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_paths_resolve_against_root() {
        let yaml = "path: leaves\ntrain: train\nval: valid\nnames: [a, b]\n";
        let d = DatasetDescriptor::parse(yaml, Path::new("/data"), Path::new("/data/data.yaml"))
            .unwrap();

        assert_eq!(d.root, PathBuf::from("/data/leaves"));
        assert_eq!(d.train, PathBuf::from("/data/leaves/train"));
        assert_eq!(d.val, PathBuf::from("/data/leaves/valid"));
        assert_eq!(d.names, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_without_path_uses_descriptor_directory() {
        let yaml = "train: /abs/train\nvalid: images/val\n";
        let d = DatasetDescriptor::parse(yaml, Path::new("/cfg"), Path::new("/cfg/data.yaml"))
            .unwrap();

        assert_eq!(d.train, PathBuf::from("/abs/train"));
        assert_eq!(d.val, PathBuf::from("/cfg/images/val"));
        assert_eq!(d.names, None);
    }

    #[test]
    fn test_map_names() {
        let yaml = "train: t\nval: v\nnc: 3\nnames:\n  0: unripe\n  1: ripe\n  2: overripe\n";
        let d = DatasetDescriptor::parse(yaml, Path::new("."), Path::new("data.yaml")).unwrap();
        assert_eq!(
            d.class_names().unwrap(),
            vec!["unripe".to_string(), "ripe".into(), "overripe".into()]
        );
    }

    #[test]
    fn test_map_names_with_gap_is_rejected() {
        let yaml = "train: t\nval: v\nnames:\n  0: a\n  2: c\n";
        let err = DatasetDescriptor::parse(yaml, Path::new("."), Path::new("data.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("class index 2"));
    }

    #[test]
    fn test_nc_mismatch_is_rejected() {
        let yaml = "train: t\nval: v\nnc: 5\nnames: [a, b]\n";
        assert!(DatasetDescriptor::parse(yaml, Path::new("."), Path::new("data.yaml")).is_err());
    }

    #[test]
    fn test_missing_val_is_rejected() {
        let yaml = "train: t\n";
        let err = DatasetDescriptor::parse(yaml, Path::new("."), Path::new("data.yaml"))
            .unwrap_err();
        assert!(matches!(err, CropDocError::Descriptor { .. }));
    }

    #[test]
    fn test_class_names_from_train_directories() {
        let dir = TempDir::new().unwrap();
        for class in ["Tomato___healthy", "Apple___Black_rot"] {
            std::fs::create_dir_all(dir.path().join("train").join(class)).unwrap();
        }
        std::fs::write(dir.path().join("train").join("README.txt"), "x").unwrap();
        let yaml_path = dir.path().join("data.yaml");
        std::fs::write(&yaml_path, "train: train\nval: val\n").unwrap();

        let d = DatasetDescriptor::from_file(&yaml_path).unwrap();
        assert_eq!(
            d.class_names().unwrap(),
            vec!["Apple___Black_rot".to_string(), "Tomato___healthy".to_string()]
        );
    }

    #[test]
    fn test_missing_file() {
        let err = DatasetDescriptor::from_file("/no/such/data.yaml").unwrap_err();
        assert!(err.to_string().contains("data.yaml"));
    }
}
