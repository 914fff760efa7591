use crate::imageops_ai::get_max_value;
use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel, Primitive, Rgba};
use num_traits::AsPrimitive;

pub trait TrimTransparentBorder {
    /// Crop the transparent margin around the content, keeping `padding` pixels of it
    /// on every side.
    ///
    /// A pixel counts as content when its alpha, on a 0..=255 scale, is above
    /// `alpha_threshold`. The image is returned as is when nothing counts as content
    /// or when the padded box already covers the whole canvas.
    fn trim_transparent_border(self, padding: u32, alpha_threshold: u8) -> Self;
}

impl<S> TrimTransparentBorder for ImageBuffer<Rgba<S>, Vec<S>>
where
    Rgba<S>: Pixel<Subpixel = S>,
    S: Primitive + AsPrimitive<f32> + 'static,
{
    fn trim_transparent_border(self, padding: u32, alpha_threshold: u8) -> Self {
        let Some(bounds) = self.find_opaque_bounds(alpha_threshold) else {
            return self;
        };

        let (width, height) = self.dimensions();
        let [x1, y1, x2, y2] = pad_bounds(bounds, padding, width, height);

        if x1 == 0 && y1 == 0 && x2 == width - 1 && y2 == height - 1 {
            return self;
        }

        self.view(x1, y1, x2 - x1 + 1, y2 - y1 + 1).to_image()
    }
}

/// Trim a decoded raster of any color type.
///
/// Rasters without an alpha channel have nothing to trim and are returned unchanged.
pub fn trim_transparent_border(
    image: DynamicImage,
    padding: u32,
    alpha_threshold: u8,
) -> DynamicImage {
    match image {
        DynamicImage::ImageRgba8(buffer) => {
            DynamicImage::ImageRgba8(buffer.trim_transparent_border(padding, alpha_threshold))
        }
        DynamicImage::ImageRgba16(buffer) => {
            DynamicImage::ImageRgba16(buffer.trim_transparent_border(padding, alpha_threshold))
        }
        DynamicImage::ImageRgba32F(buffer) => {
            DynamicImage::ImageRgba32F(buffer.trim_transparent_border(padding, alpha_threshold))
        }
        // Luma + alpha is rare enough to go through an RGBA copy.
        image @ (DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_)) => {
            let rgba = image.to_rgba8();
            let (width, height) = rgba.dimensions();
            let trimmed = rgba.trim_transparent_border(padding, alpha_threshold);
            if trimmed.dimensions() == (width, height) {
                image
            } else {
                DynamicImage::ImageRgba8(trimmed)
            }
        }
        other => other,
    }
}

trait AlphaBounds {
    /// Inclusive `[x1, y1, x2, y2]` box of the pixels whose alpha is above the threshold.
    fn find_opaque_bounds(&self, alpha_threshold: u8) -> Option<[u32; 4]>;
}

impl<S> AlphaBounds for ImageBuffer<Rgba<S>, Vec<S>>
where
    Rgba<S>: Pixel<Subpixel = S>,
    S: Primitive + AsPrimitive<f32> + 'static,
{
    fn find_opaque_bounds(&self, alpha_threshold: u8) -> Option<[u32; 4]> {
        let max: f32 = get_max_value::<S>().as_();
        let threshold = f32::from(alpha_threshold);

        self.enumerate_pixels()
            .filter(|(_, _, Rgba([_, _, _, alpha]))| alpha.as_() / max * 255.0 > threshold)
            .fold(None, |bounds, (x, y, _)| {
                Some(match bounds {
                    None => [x, y, x, y],
                    Some(bounds) => update_bounds(bounds, x, y),
                })
            })
    }
}

fn update_bounds(bounds: [u32; 4], x: u32, y: u32) -> [u32; 4] {
    [
        bounds[0].min(x),
        bounds[1].min(y),
        bounds[2].max(x),
        bounds[3].max(y),
    ]
}

fn pad_bounds(bounds: [u32; 4], padding: u32, width: u32, height: u32) -> [u32; 4] {
    let [x1, y1, x2, y2] = bounds;
    [
        x1.saturating_sub(padding),
        y1.saturating_sub(padding),
        x2.saturating_add(padding).min(width - 1),
        y2.saturating_add(padding).min(height - 1),
    ]
}
