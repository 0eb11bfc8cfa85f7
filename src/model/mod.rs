//! Model module
//!
//! - `cnn`: the plant classifier network and its Burn config
//! - `checkpoint`: reading and writing `.mpk` records with their sibling config

pub mod checkpoint;
pub mod cnn;

pub use checkpoint::{config_for, load_classifier, save_classifier, MODEL_CONFIG_FILE};
pub use cnn::{PlantClassifier, PlantClassifierConfig};

use crate::utils::error::{CropDocError, Result};

/// Width of the hidden layer feeding the classification head
pub const HIDDEN_UNITS: usize = 256;

/// Smallest square input that survives the four 2x2 pooling stages
pub const MIN_INPUT_SIZE: usize = 16;

/// Reject input resolutions the network cannot pool down
pub fn check_input_size(size: usize) -> Result<()> {
    if size < MIN_INPUT_SIZE {
        return Err(CropDocError::Config(format!(
            "image size must be at least {MIN_INPUT_SIZE}, got {size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_size_bounds() {
        assert!(check_input_size(MIN_INPUT_SIZE).is_ok());
        assert!(check_input_size(640).is_ok());
        assert!(matches!(check_input_size(8), Err(CropDocError::Config(_))));
        assert!(matches!(check_input_size(0), Err(CropDocError::Config(_))));
    }
}
