//! Factor based enhancement: each operation blends the image with a "degenerate"
//! version of itself. A factor of 1.0 returns the original, 0.0 the degenerate image,
//! and values above 1.0 extrapolate away from it.

use image::{Luma, Pixel, Rgb, RgbImage};
use imageproc::{filter::filter3x3, map::map_colors};

/// ITU-R BT.601 luma of an 8-bit RGB pixel.
pub fn luma_bt601(Rgb([r, g, b]): Rgb<u8>) -> u8 {
    let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    luma.round().clamp(0.0, 255.0) as u8
}

/// Global contrast: blend against a flat gray at the mean luma.
pub fn contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return image.clone();
    }

    let luma_sum: u64 = image.pixels().map(|p| u64::from(luma_bt601(*p))).sum();
    let mean = (luma_sum as f32 / pixel_count as f32 + 0.5).floor();

    map_colors(image, |pixel| pixel.map(|c| blend(mean, f32::from(c), factor)))
}

/// Sharpness: blend against a 3x3 smoothed copy. The outermost ring of pixels has no
/// full neighbourhood and is taken from the original in the smoothed copy.
pub fn sharpness(image: &RgbImage, factor: f32) -> RgbImage {
    let smoothed = smooth3x3(image);
    let mut output = image.clone();
    for ((out, original), degenerate) in output
        .pixels_mut()
        .zip(image.pixels())
        .zip(smoothed.pixels())
    {
        *out = Rgb(std::array::from_fn(|c| {
            blend(f32::from(degenerate[c]), f32::from(original[c]), factor)
        }));
    }
    output
}

/// Luma plane with BT.601 weights.
pub fn luma_plane(image: &RgbImage) -> image::GrayImage {
    map_colors(image, |pixel| Luma([luma_bt601(pixel)]))
}

fn blend(degenerate: f32, original: f32, factor: f32) -> u8 {
    (degenerate + factor * (original - degenerate))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// `[[1, 1, 1], [1, 5, 1], [1, 1, 1]] / 13`, leaving the outer ring unfiltered.
fn smooth3x3(image: &RgbImage) -> RgbImage {
    const KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
    const SCALE: f32 = 13.0;

    let (width, height) = image.dimensions();
    let sums = filter3x3::<_, f32, f32>(image, &KERNEL);

    RgbImage::from_fn(width, height, |x, y| {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            *image.get_pixel(x, y)
        } else {
            let Rgb(sum) = *sums.get_pixel(x, y);
            Rgb(sum.map(|s| (s / SCALE).round().clamp(0.0, 255.0) as u8))
        }
    })
}
