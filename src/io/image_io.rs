//! Conversions between image files and CHW float arrays.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use ndarray::{Array3, ArrayView3};
use std::path::Path;

/// Scale factor between the crop size and the resized shorter side.
pub const RESIZE_FACTOR: f32 = 1.12;

/// Random choices for one training sample, drawn before decoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Augment {
    /// Crop origin as a fraction of the slack along (x, y), each in [0, 1)
    pub crop: (f32, f32),
    pub flip: bool,
}

impl Augment {
    /// Centre crop, no flip.
    pub fn center() -> Self {
        Self {
            crop: (0.5, 0.5),
            flip: false,
        }
    }
}

fn crop_origin(slack: u32, frac: f32) -> u32 {
    ((frac * (slack + 1) as f32) as u32).min(slack)
}

/// Resize so the shorter side is `⌊RESIZE_FACTOR · size⌋`, keeping the aspect ratio.
fn resize_shorter_side(img: &DynamicImage, size: u32) -> DynamicImage {
    let target = ((size as f32 * RESIZE_FACTOR) as u32).max(size);
    let (w, h) = (img.width().max(1), img.height().max(1));
    let (nw, nh) = if w <= h {
        (target, ((target as u64 * h as u64) / w as u64) as u32)
    } else {
        (((target as u64 * w as u64) / h as u64) as u32, target)
    };
    img.resize_exact(nw.max(size), nh.max(size), FilterType::CatmullRom)
}

/// Resize, crop to `size × size`, optionally flip, and scale to [-1, 1].
///
/// `channels` must be 1 (luma) or 3 (RGB).
pub fn prepare_image(img: &DynamicImage, size: u32, channels: usize, augment: Augment) -> Array3<f32> {
    let resized = resize_shorter_side(img, size);
    let x0 = crop_origin(resized.width() - size, augment.crop.0);
    let y0 = crop_origin(resized.height() - size, augment.crop.1);
    let mut cropped = resized.crop_imm(x0, y0, size, size);
    if augment.flip {
        cropped = cropped.fliph();
    }

    let s = size as usize;
    if channels == 1 {
        let luma = cropped.to_luma8();
        Array3::from_shape_fn((1, s, s), |(_, y, x)| {
            luma.get_pixel(x as u32, y as u32)[0] as f32 / 127.5 - 1.0
        })
    } else {
        let rgb = cropped.to_rgb8();
        Array3::from_shape_fn((3, s, s), |(c, y, x)| {
            rgb.get_pixel(x as u32, y as u32)[c] as f32 / 127.5 - 1.0
        })
    }
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

/// Convert a CHW image with values in [0, 1] to an 8-bit image.
///
/// Returns `None` for channel counts other than 1 and 3.
pub fn array_to_image(image: ArrayView3<f32>) -> Option<DynamicImage> {
    let (c, h, w) = image.dim();
    match c {
        1 => Some(DynamicImage::ImageLuma8(GrayImage::from_fn(w as u32, h as u32, |x, y| {
            image::Luma([to_u8(image[[0, y as usize, x as usize]])])
        }))),
        3 => Some(DynamicImage::ImageRgb8(RgbImage::from_fn(w as u32, h as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            image::Rgb([
                to_u8(image[[0, y, x]]),
                to_u8(image[[1, y, x]]),
                to_u8(image[[2, y, x]]),
            ])
        }))),
        _ => None,
    }
}

pub fn save_jpeg(path: &Path, image: &DynamicImage) -> Result<(), image::ImageError> {
    image.save_with_format(path, ImageFormat::Jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_keeps_aspect_and_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(40, 20, |x, _| {
            image::Rgb([if x < 20 { 0 } else { 255 }, 128, 255])
        }));
        let a = prepare_image(&img, 16, 3, Augment::center());
        assert_eq!(a.dim(), (3, 16, 16));
        assert!(a.iter().all(|v| (-1.0..=1.0).contains(v)));
        // Blue channel is saturated everywhere.
        assert!(a.index_axis(ndarray::Axis(0), 2).iter().all(|&v| v > 0.99));
    }

    #[test]
    fn test_flip_mirrors_columns() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(18, 18, |x, _| image::Luma([(x * 10) as u8])));
        let plain = prepare_image(&img, 16, 1, Augment { crop: (0.0, 0.0), flip: false });
        let flipped = prepare_image(&img, 16, 1, Augment { crop: (0.0, 0.0), flip: true });
        assert_eq!(plain[[0, 3, 0]], flipped[[0, 3, 15]]);
    }

    #[test]
    fn test_array_to_image_rounds_and_clamps() {
        let a = Array3::from_shape_vec((1, 1, 3), vec![-0.5, 0.5, 2.0]).unwrap();
        let img = array_to_image(a.view()).unwrap().to_luma8();
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 128);
        assert_eq!(img.get_pixel(2, 0)[0], 255);
        assert!(array_to_image(Array3::zeros((2, 1, 1)).view()).is_none());
    }
}
