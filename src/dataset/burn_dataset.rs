//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` over a scanned image folder.
//! Items are already normalized by `preprocess`, so the batcher only stacks
//! them into tensors.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::loader::{ImageFolder, ImageSample};
use super::preprocess;
use crate::utils::error::Result;

/// A single preprocessed image ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeafItem {
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Image path (for logging)
    pub path: PathBuf,
}

impl LeafItem {
    /// Load and preprocess one sample
    pub fn load(sample: &ImageSample, image_size: usize) -> Result<Self> {
        Ok(Self {
            image: preprocess::load_input(&sample.path, image_size as u32)?,
            label: sample.label,
            path: sample.path.clone(),
        })
    }
}

/// Image-folder dataset, loading lazily unless cached
#[derive(Debug, Clone)]
pub struct LeafDataset {
    samples: Vec<ImageSample>,
    image_size: usize,
    cached_items: Option<Vec<LeafItem>>,
}

impl LeafDataset {
    pub fn new(samples: Vec<ImageSample>, image_size: usize) -> Self {
        Self {
            samples,
            image_size,
            cached_items: None,
        }
    }

    /// Build from a scanned split
    pub fn from_folder(folder: &ImageFolder, image_size: usize) -> Self {
        Self::new(folder.samples.clone(), image_size)
    }

    /// Decode every image up front; any unreadable file fails the whole load
    pub fn cached(samples: Vec<ImageSample>, image_size: usize) -> Result<Self> {
        info!("Pre-loading {} images into memory", samples.len());
        let items = samples
            .iter()
            .map(|sample| LeafItem::load(sample, image_size))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            samples,
            image_size,
            cached_items: Some(items),
        })
    }

    /// Like `Dataset::get` but surfaces the load error
    pub fn load(&self, index: usize) -> Result<Option<LeafItem>> {
        if let Some(cached) = &self.cached_items {
            return Ok(cached.get(index).cloned());
        }
        match self.samples.get(index) {
            Some(sample) => LeafItem::load(sample, self.image_size).map(Some),
            None => Ok(None),
        }
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn is_cached(&self) -> bool {
        self.cached_items.is_some()
    }
}

impl Dataset<LeafItem> for LeafDataset {
    fn get(&self, index: usize) -> Option<LeafItem> {
        match self.load(index) {
            Ok(item) => item,
            Err(e) => {
                warn!("Skipping unreadable sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and their labels
#[derive(Clone, Debug)]
pub struct LeafBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks `LeafItem`s into a `LeafBatch`
#[derive(Clone, Debug)]
pub struct LeafBatcher {
    image_size: usize,
}

impl LeafBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, LeafItem, LeafBatch<B>> for LeafBatcher {
    fn batch(&self, items: Vec<LeafItem>, device: &B::Device) -> LeafBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let mut images_data = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets_data = Vec::with_capacity(batch_size);
        for item in items {
            images_data.extend_from_slice(&item.image);
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        LeafBatch { images, targets }
    }
}
