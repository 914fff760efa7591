use anyhow::{anyhow, ensure, Result};
use image::{GenericImageView, ImageBuffer, Luma, Pixel, Primitive, Rgb, Rgba};
use num_traits::AsPrimitive;

use crate::imageops_ai::get_max_value;

/// Attach `mask` to `image` as its alpha channel.
///
/// Mask values are rescaled from the mask's subpixel range to the image's. Colors
/// are left as they are (straight alpha, which is what PNG stores).
pub fn apply_alpha<I, M, SI, SM>(image: &I, mask: &M) -> Result<ImageBuffer<Rgba<SI>, Vec<SI>>>
where
    I: GenericImageView<Pixel = Rgb<SI>>,
    M: GenericImageView<Pixel = Luma<SM>>,
    Rgba<SI>: Pixel<Subpixel = SI>,
    SI: Primitive + 'static + AsPrimitive<f32>,
    SM: Primitive + 'static + AsPrimitive<f32>,
    f32: AsPrimitive<SI>,
    f32: AsPrimitive<SM>,
{
    ensure!(
        image.dimensions() == mask.dimensions(),
        "image is {:?} but mask is {:?}",
        image.dimensions(),
        mask.dimensions()
    );

    let sm_max: f32 = get_max_value::<SM>().as_();
    let si_max: f32 = get_max_value::<SI>().as_();

    let pixels = image
        .pixels()
        .zip(mask.pixels())
        .flat_map(|((_, _, Rgb([red, green, blue])), (_, _, Luma([alpha])))| {
            let alpha: SI = (alpha.as_() / sm_max * si_max).round().as_();
            [red, green, blue, alpha]
        })
        .collect::<Vec<SI>>();

    ImageBuffer::from_raw(image.width(), image.height(), pixels)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from processed pixels"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, RgbImage};

    #[test]
    fn test_apply_alpha_copies_mask() -> Result<()> {
        let image = RgbImage::from_pixel(2, 1, Rgb([1, 2, 3]));
        let mask = GrayImage::from_raw(2, 1, vec![0, 200]).unwrap();

        let rgba = apply_alpha(&image, &mask)?;
        assert_eq!(rgba.get_pixel(0, 0).0, [1, 2, 3, 0]);
        assert_eq!(rgba.get_pixel(1, 0).0, [1, 2, 3, 200]);
        Ok(())
    }

    #[test]
    fn test_apply_alpha_rescales_float_mask() -> Result<()> {
        let image = RgbImage::from_pixel(1, 1, Rgb([9, 9, 9]));
        let mask: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_pixel(1, 1, Luma([0.5]));

        let rgba = apply_alpha(&image, &mask)?;
        assert_eq!(rgba.get_pixel(0, 0).0[3], 128);
        Ok(())
    }

    #[test]
    fn test_apply_alpha_dimension_mismatch() {
        let image = RgbImage::new(3, 3);
        let mask = GrayImage::new(2, 3);
        assert!(apply_alpha(&image, &mask).is_err());
    }
}
