// SPDX-License-Identifier: Apache-2.0
//
// Filter recipes — the per-filter transform table and the raster operations
// it is built from.

use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

use scanbook_core::types::FilterKind;

/// Operations a non-identity filter applies after the shared bounded resize.
///
/// Each filter name maps to one deliberate recipe; adding a filter means
/// adding a row here, not another dispatch arm with hidden behavior.
#[derive(Debug, Clone, Copy)]
pub struct FilterRecipe {
    /// Convert to single-channel luma before encoding.
    pub grayscale: bool,
    /// Threshold to pure black/white via Otsu's method (implies grayscale).
    pub binarize: bool,
    /// Contrast multiplier around the mid-point; `None` leaves contrast alone.
    pub contrast: Option<f32>,
}

/// The recipe for a filter, or `None` for the identity filter.
pub fn recipe_for(filter: FilterKind) -> Option<FilterRecipe> {
    match filter {
        FilterKind::Original => None,
        FilterKind::Color => Some(FilterRecipe {
            grayscale: false,
            binarize: false,
            contrast: None,
        }),
        FilterKind::Grayscale => Some(FilterRecipe {
            grayscale: true,
            binarize: false,
            contrast: None,
        }),
        FilterKind::Bw => Some(FilterRecipe {
            grayscale: true,
            binarize: true,
            contrast: None,
        }),
        FilterKind::Enhance => Some(FilterRecipe {
            grayscale: false,
            binarize: false,
            contrast: Some(1.4),
        }),
    }
}

/// Apply a recipe to a decoded image.
///
/// Every non-identity filter shares the width-bounded downscale; the recipe
/// then layers its own operations on top.
pub fn apply_recipe(image: DynamicImage, recipe: FilterRecipe, max_width: u32) -> DynamicImage {
    let mut working = bounded_resize(image, max_width);

    if let Some(factor) = recipe.contrast {
        working = adjust_contrast(working, factor);
    }
    if recipe.binarize {
        return binarize_otsu(&working);
    }
    if recipe.grayscale {
        return working.grayscale();
    }
    working
}

/// Downscale so the width fits within `max_width`, preserving aspect ratio.
/// Never upscales. Lanczos3 for high-quality reduction.
fn bounded_resize(image: DynamicImage, max_width: u32) -> DynamicImage {
    if image.width() <= max_width {
        return image;
    }
    let resized = image.resize(max_width, u32::MAX, image::imageops::FilterType::Lanczos3);
    debug!(
        new_w = resized.width(),
        new_h = resized.height(),
        "bounded resize applied"
    );
    resized
}

/// Adjust contrast by a factor around the channel mid-point. Values > 1.0
/// increase contrast; 1.0 is a no-op.
fn adjust_contrast(image: DynamicImage, factor: f32) -> DynamicImage {
    let rgba = image.to_rgba8();
    let adjusted = image::ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
        let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let adjust = |channel: u8| -> u8 {
            let val = factor * (channel as f32 - 128.0) + 128.0;
            val.clamp(0.0, 255.0) as u8
        };
        image::Rgba([adjust(r), adjust(g), adjust(b), a])
    });
    DynamicImage::ImageRgba8(adjusted)
}

/// Threshold the image to pure black/white using Otsu's global method.
fn binarize_otsu(image: &DynamicImage) -> DynamicImage {
    let gray = image.to_luma8();
    let threshold = otsu_threshold(&gray);
    debug!(threshold, "Otsu threshold computed");

    let (width, height) = gray.dimensions();
    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let val = gray.get_pixel(x, y).0[0];
            let binary = if val < threshold { 0u8 } else { 255u8 };
            output.put_pixel(x, y, Luma([binary]));
        }
    }
    DynamicImage::ImageLuma8(output)
}

/// Compute the Otsu threshold for a grayscale image: the value that
/// maximises the between-class variance of the black and white groups.
fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total_pixels = gray.width() as u64 * gray.height() as u64;
    if total_pixels == 0 {
        return 128;
    }

    let mut sum_total: f64 = 0.0;
    for (i, &count) in histogram.iter().enumerate() {
        sum_total += i as f64 * count as f64;
    }

    let mut sum_background: f64 = 0.0;
    let mut weight_background: u64 = 0;
    let mut max_variance: f64 = 0.0;
    let mut best_threshold: u8 = 0;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_total - sum_background) / weight_foreground as f64;

        let between_variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if between_variance > max_variance {
            max_variance = between_variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn every_non_identity_filter_has_a_recipe() {
        assert!(recipe_for(FilterKind::Original).is_none());
        for filter in [
            FilterKind::Color,
            FilterKind::Grayscale,
            FilterKind::Bw,
            FilterKind::Enhance,
        ] {
            assert!(recipe_for(filter).is_some(), "missing recipe for {filter}");
        }
    }

    #[test]
    fn bounded_resize_never_upscales() {
        let small = DynamicImage::ImageRgb8(RgbImage::new(100, 80));
        let out = bounded_resize(small, 2000);
        assert_eq!((out.width(), out.height()), (100, 80));

        let wide = DynamicImage::ImageRgb8(RgbImage::new(3000, 60));
        let out = bounded_resize(wide, 2000);
        assert_eq!(out.width(), 2000);
        assert!(out.height() < 60);
    }

    #[test]
    fn otsu_separates_two_tone_image() {
        let mut img = GrayImage::new(10, 10);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = Luma([if x < 5 { 40u8 } else { 220u8 }]);
        }
        let threshold = otsu_threshold(&img);
        assert!(threshold > 40 && threshold <= 220, "threshold {threshold}");

        let binary = binarize_otsu(&DynamicImage::ImageLuma8(img)).to_luma8();
        for pixel in binary.pixels() {
            assert!(pixel.0[0] == 0 || pixel.0[0] == 255);
        }
    }

    #[test]
    fn contrast_pushes_channels_away_from_midpoint() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            4,
            4,
            image::Rgb([200u8, 200, 200]),
        ));
        let out = adjust_contrast(img, 1.4).to_rgb8();
        // 1.4 * (200 - 128) + 128 = 228.8
        assert_eq!(out.get_pixel(0, 0).0[0], 228);
    }

    #[test]
    fn bw_recipe_produces_binary_output() {
        let mut img = GrayImage::new(8, 8);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = Luma([if x % 2 == 0 { 30u8 } else { 200u8 }]);
        }
        let recipe = recipe_for(FilterKind::Bw).expect("recipe");
        let out = apply_recipe(DynamicImage::ImageLuma8(img), recipe, 2000).to_luma8();
        for pixel in out.pixels() {
            assert!(pixel.0[0] == 0 || pixel.0[0] == 255);
        }
    }
}
