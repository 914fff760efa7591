//! Raster preparation ahead of segmentation.
//!
//! Every stage borrows its input and returns a fresh buffer, so each one can be
//! exercised on its own.

use image::{imageops, imageops::FilterType, RgbImage};
use imageproc::filter::median_filter;

use crate::config::PipelineSettings;
use crate::errors::{CutoutError, Result};
use crate::imageops_ai::{
    clahe::clahe,
    convert_color::{lightness, with_lightness, ConvertColor, FromLab, ToLab},
    enhance,
};

/// Run the fixed preprocessing chain: tone equalization, contrast, sharpness, denoise.
pub fn preprocess(image: &RgbImage, settings: &PipelineSettings) -> Result<RgbImage> {
    let image = equalize_tone(image, settings.clahe_clip_limit, settings.clahe_tile_grid)?;
    let image = adjust_contrast(&image, settings.contrast_factor);
    let image = enhance_sharpness(&image, settings.sharpness_factor);
    Ok(denoise(&image, settings.median_kernel_size))
}

/// CLAHE on the L* channel of the Lab representation; chroma is left alone.
pub fn equalize_tone(image: &RgbImage, clip_limit: f32, grid: (u32, u32)) -> Result<RgbImage> {
    let lab = ToLab(image).wrap_convert();
    let l = clahe(&lightness(&lab), clip_limit, grid)
        .map_err(|e| CutoutError::internal("tone equalization", e))?;
    Ok(FromLab(&with_lightness(&lab, &l)).wrap_convert())
}

pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    enhance::contrast(image, factor)
}

pub fn enhance_sharpness(image: &RgbImage, factor: f32) -> RgbImage {
    enhance::sharpness(image, factor)
}

/// Median smoothing over a `kernel_size` x `kernel_size` window.
pub fn denoise(image: &RgbImage, kernel_size: u32) -> RgbImage {
    let radius = kernel_size / 2;
    if radius == 0 {
        return image.clone();
    }
    median_filter(image, radius, radius)
}

/// Dimensions after bounding the longer side to `max_dimension`, keeping the aspect ratio.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }

    let scale = f64::from(max_dimension) / f64::from(longest);
    let fit = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, max_dimension);
    (fit(width), fit(height))
}

/// Downscale with Lanczos3 when the longer side exceeds `max_dimension`.
pub fn normalize_size(image: &RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let (target_width, target_height) = bounded_dimensions(width, height, max_dimension);
    if (target_width, target_height) == (width, height) {
        return image.clone();
    }

    tracing::debug!(
        from = ?(width, height),
        to = ?(target_width, target_height),
        "downscaling working raster"
    );
    imageops::resize(image, target_width, target_height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn noisy(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 31 + y * 17) % 97) as u8;
            Rgb([v, v.wrapping_mul(2), 255 - v])
        })
    }

    #[test]
    fn test_preprocess_keeps_dimensions() -> Result<()> {
        let image = noisy(33, 21);
        let output = preprocess(&image, &PipelineSettings::default())?;
        assert_eq!(output.dimensions(), (33, 21));
        Ok(())
    }

    #[test]
    fn test_denoise_removes_speckle() {
        let mut image = RgbImage::from_pixel(9, 9, Rgb([50, 50, 50]));
        image.put_pixel(4, 4, Rgb([255, 255, 255]));

        let output = denoise(&image, 5);
        assert_eq!(output.get_pixel(4, 4).0, [50, 50, 50]);
    }

    #[test]
    fn test_equalize_tone_keeps_white_white() -> Result<()> {
        let image = RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]));
        let output = equalize_tone(&image, 1.0, (4, 4))?;
        assert_eq!(output.dimensions(), (16, 16));
        for pixel in output.pixels() {
            assert!(pixel.0.iter().all(|&c| c >= 250), "{pixel:?}");
        }
        Ok(())
    }

    #[test]
    fn test_bounded_dimensions() {
        assert_eq!(bounded_dimensions(800, 600, 1024), (800, 600));
        assert_eq!(bounded_dimensions(1024, 1024, 1024), (1024, 1024));
        assert_eq!(bounded_dimensions(2048, 1024, 1024), (1024, 512));
        assert_eq!(bounded_dimensions(1000, 3000, 1024), (341, 1024));
        assert_eq!(bounded_dimensions(5000, 2, 1024), (1024, 1));
    }

    #[test]
    fn test_bounded_dimensions_never_grow_and_keep_aspect() {
        for (width, height) in [(1025, 1), (1500, 999), (4032, 3024), (1100, 1100), (3, 1999)] {
            let (w, h) = bounded_dimensions(width, height, 1024);
            assert!(w <= width && h <= height);
            assert_eq!(w.max(h), 1024);

            let scale = 1024.0 / width.max(height) as f64;
            assert!((w as f64 - width as f64 * scale).abs() <= 0.5 + 1e-9);
            assert!((h as f64 - height as f64 * scale).abs() <= 0.5 + 1e-9);
        }
    }

    #[test]
    fn test_normalize_size() {
        let small = noisy(40, 30);
        assert_eq!(normalize_size(&small, 1024), small);

        let wide = noisy(1200, 300);
        assert_eq!(normalize_size(&wide, 1024).dimensions(), (1024, 256));
    }
}
