//! Image preprocessing shared by training and inference
//!
//! Images are converted to RGB, resized to a square without preserving the
//! aspect ratio, scaled to [0, 1] and ImageNet-normalized into CHW layout.
//! Training and serving both go through `image_to_input`, so a model always
//! sees the same pixel statistics it was fitted on.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, ImageReader, RgbImage};

use crate::utils::error::{CropDocError, Result};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode raw upload bytes, guessing the format from the content
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| CropDocError::ImageDecode(e.to_string()))
}

/// Open and decode an image file
pub fn open(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| CropDocError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| CropDocError::ImageLoad(path.to_path_buf(), e.to_string()))
}

/// Convert to RGB8 and resize to `size x size` with a triangle filter
pub fn resize_rgb(image: &DynamicImage, size: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    image::imageops::resize(&rgb, size, size, FilterType::Triangle)
}

/// Flatten an RGB image into normalized CHW floats
pub fn to_chw(rgb: &RgbImage) -> Vec<f32> {
    let (width, height) = rgb.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            data[c * plane + i] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    data
}

/// Full pipeline: RGB, square resize, normalized CHW floats of length `3 * size * size`
pub fn image_to_input(image: &DynamicImage, size: u32) -> Vec<f32> {
    to_chw(&resize_rgb(image, size))
}

/// Load a file from disk and run the full pipeline
pub fn load_input(path: &Path, size: u32) -> Result<Vec<f32>> {
    Ok(image_to_input(&open(path)?, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_input_length_matches_size() {
        let image = decode(&png_bytes(300, 200)).unwrap();
        let input = image_to_input(&image, 128);
        assert_eq!(input.len(), 3 * 128 * 128);
    }

    #[test]
    fn test_resize_ignores_aspect_ratio() {
        let image = decode(&png_bytes(40, 10)).unwrap();
        let resized = resize_rgb(&image, 16);
        assert_eq!(resized.dimensions(), (16, 16));
    }

    #[test]
    fn test_same_bytes_same_input() {
        let bytes = png_bytes(97, 61);
        let a = image_to_input(&decode(&bytes).unwrap(), 32);
        let b = image_to_input(&decode(&bytes).unwrap(), 32);
        assert_eq!(a, b);
    }

    #[test]
    fn test_grayscale_is_expanded_to_three_channels() {
        let gray = DynamicImage::new_luma8(8, 8);
        let input = image_to_input(&gray, 8);
        assert_eq!(input.len(), 3 * 8 * 8);
        // Black pixels normalize to -mean/std per channel.
        let expected_red = -IMAGENET_MEAN[0] / IMAGENET_STD[0];
        assert!((input[0] - expected_red).abs() < 1e-6);
    }

    #[test]
    fn test_channel_planes() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 0, 255]));
        let data = to_chw(&rgb);

        let white_r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let white_b = (1.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        assert!((data[0] - white_r).abs() < 1e-6);
        assert!((data[2 * 2 + 1] - white_b).abs() < 1e-6);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CropDocError::ImageDecode(_)));
    }
}
