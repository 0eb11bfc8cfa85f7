//! Image-folder split loader
//!
//! Scans one split directory laid out as `<split>/<class name>/<image>` and
//! assigns labels from a fixed, ordered class list.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{CropDocError, Result};

/// Extensions treated as images
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// One scanned split
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Split directory
    pub root: PathBuf,
    /// Samples, grouped by class in label order
    pub samples: Vec<ImageSample>,
    /// Class names in label order
    pub class_names: Vec<String>,
}

impl ImageFolder {
    /// Scan `root` for the given classes
    ///
    /// Directories that are not in `class_names` are skipped with a warning;
    /// classes without a directory simply contribute no samples.
    pub fn scan<P: AsRef<Path>>(root: P, class_names: &[String]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Scanning image folder: {:?}", root);

        if !root.is_dir() {
            return Err(CropDocError::Dataset(format!(
                "split directory does not exist: {}",
                root.display()
            )));
        }

        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() && !class_names.contains(&name) {
                warn!("Skipping directory '{}': not in the class list", name);
            }
        }

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root.join(class_name);
            if !class_dir.is_dir() {
                debug!("Class '{}' has no directory under {:?}", class_name, root);
                continue;
            }

            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.path().to_path_buf())
                .filter(|p| is_image(p))
                .collect();
            // read order is filesystem dependent
            paths.sort();

            debug!("Class '{}' (label {}): {} images", class_name, label, paths.len());
            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
        }

        info!("Found {} images in {} classes", samples.len(), class_names.len());

        Ok(Self {
            root,
            samples,
            class_names: class_names.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Samples per class, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_image(path: &Path) {
        let img = image::ImageBuffer::from_fn(10, 10, |_, _| image::Rgb([255u8, 0u8, 0u8]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_scan_assigns_labels_from_class_list() {
        let dir = TempDir::new().unwrap();
        let classes = vec!["ripe".to_string(), "unripe".to_string()];
        for class in &classes {
            std::fs::create_dir_all(dir.path().join(class)).unwrap();
        }
        create_test_image(&dir.path().join("ripe").join("a.png"));
        create_test_image(&dir.path().join("unripe").join("b.jpg"));
        create_test_image(&dir.path().join("unripe").join("c.png"));
        std::fs::write(dir.path().join("unripe").join("notes.txt"), "x").unwrap();

        let folder = ImageFolder::scan(dir.path(), &classes).unwrap();

        assert_eq!(folder.len(), 3);
        assert_eq!(folder.class_counts(), vec![1, 2]);
        assert_eq!(folder.samples[0].label, 0);
        assert!(folder.samples[1..].iter().all(|s| s.label == 1));
    }

    #[test]
    fn test_unknown_directories_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("mystery")).unwrap();
        create_test_image(&dir.path().join("mystery").join("x.png"));

        let folder = ImageFolder::scan(dir.path(), &["ripe".to_string()]).unwrap();
        assert!(folder.is_empty());
        assert_eq!(folder.class_counts(), vec![0]);
    }

    #[test]
    fn test_missing_split_directory() {
        let err = ImageFolder::scan("/no/such/split", &["a".to_string()]).unwrap_err();
        assert!(matches!(err, CropDocError::Dataset(_)));
    }
}
