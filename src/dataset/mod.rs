//! Labels, dataset descriptor, split scanning and preprocessing
//!
//! The served model's output index `i` means `CLASS_NAMES[i]`.

pub mod burn_dataset;
pub mod descriptor;
pub mod loader;
pub mod preprocess;

pub use burn_dataset::{LeafBatch, LeafBatcher, LeafDataset, LeafItem};
pub use descriptor::DatasetDescriptor;
pub use loader::{ImageFolder, ImageSample};

/// Number of classes the served model predicts
pub const NUM_CLASSES: usize = 38;

/// PlantVillage class names, in model output order.
/// Format: "Plant___Disease" or "Plant___healthy"
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Apple___Apple_scab",
    "Apple___Black_rot",
    "Apple___Cedar_apple_rust",
    "Apple___healthy",
    "Blueberry___healthy",
    "Cherry_(including_sour)___Powdery_mildew",
    "Cherry_(including_sour)___healthy",
    "Corn_(maize)___Cercospora_leaf_spot Gray_leaf_spot",
    "Corn_(maize)___Common_rust_",
    "Corn_(maize)___Northern_Leaf_Blight",
    "Corn_(maize)___healthy",
    "Grape___Black_rot",
    "Grape___Esca_(Black_Measles)",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Grape___healthy",
    "Orange___Haunglongbing_(Citrus_greening)",
    "Peach___Bacterial_spot",
    "Peach___healthy",
    "Pepper,_bell___Bacterial_spot",
    "Pepper,_bell___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Raspberry___healthy",
    "Soybean___healthy",
    "Squash___Powdery_mildew",
    "Strawberry___Leaf_scorch",
    "Strawberry___healthy",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___healthy",
];

/// The label list as owned strings, for APIs that also accept custom names
pub fn default_labels() -> Vec<String> {
    CLASS_NAMES.iter().map(|s| s.to_string()).collect()
}

/// `Plant___condition` labels ending in `healthy`
pub fn is_healthy(label: &str) -> bool {
    label.ends_with("healthy")
}

/// Crop part of a `Plant___condition` label, or the whole label without a separator
pub fn plant_name(label: &str) -> &str {
    label.split_once("___").map_or(label, |(plant, _)| plant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_label_list_is_unique() {
        let unique: HashSet<_> = CLASS_NAMES.iter().collect();
        assert_eq!(unique.len(), NUM_CLASSES);
    }

    #[test]
    fn test_canonical_order() {
        assert_eq!(CLASS_NAMES[0], "Apple___Apple_scab");
        assert_eq!(CLASS_NAMES[19], "Pepper,_bell___healthy");
        assert_eq!(CLASS_NAMES[NUM_CLASSES - 1], "Tomato___healthy");
        assert_eq!(default_labels().len(), NUM_CLASSES);
    }

    #[test]
    fn test_healthy_labels() {
        let healthy = CLASS_NAMES.iter().filter(|l| is_healthy(l)).count();
        assert_eq!(healthy, 12);
        assert!(!is_healthy(CLASS_NAMES[0]));
        assert!(is_healthy(CLASS_NAMES[3]));
    }

    #[test]
    fn test_plant_name() {
        assert_eq!(plant_name(CLASS_NAMES[0]), "Apple");
        assert_eq!(plant_name(CLASS_NAMES[7]), "Corn_(maize)");
        assert_eq!(plant_name("green"), "green");
    }
}
