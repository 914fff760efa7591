//! 8-bit CIE L*a*b* conversion.
//!
//! Channels use the common 8-bit encoding: L* scaled from 0..=100 to 0..=255, a* and
//! b* offset by 128. The white point is D65 and the RGB side is sRGB.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use palette::{white_point::D65, FromColor, Lab, Srgb};

pub type LabImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

pub trait ConvertColor {
    type Output;
    fn wrap_convert(&self) -> Self::Output;
}

/// sRGB → 8-bit Lab, stored in the three channels of an `Rgb<u8>` buffer as L, a, b.
pub struct ToLab<'a>(pub &'a RgbImage);

/// 8-bit Lab → sRGB.
pub struct FromLab<'a>(pub &'a LabImage);

impl ConvertColor for ToLab<'_> {
    type Output = LabImage;

    fn wrap_convert(&self) -> Self::Output {
        let (width, height) = self.0.dimensions();
        let mut lab = ImageBuffer::new(width, height);
        for (x, y, Rgb(rgb)) in self.0.enumerate_pixels() {
            lab.put_pixel(x, y, Rgb(rgb_to_lab(*rgb)));
        }
        lab
    }
}

impl ConvertColor for FromLab<'_> {
    type Output = RgbImage;

    fn wrap_convert(&self) -> Self::Output {
        let (width, height) = self.0.dimensions();
        let mut rgb = ImageBuffer::new(width, height);
        for (x, y, Rgb(lab)) in self.0.enumerate_pixels() {
            rgb.put_pixel(x, y, Rgb(lab_to_rgb(*lab)));
        }
        rgb
    }
}

/// Lightness plane of a Lab buffer.
pub fn lightness(lab: &LabImage) -> GrayImage {
    let (width, height) = lab.dimensions();
    GrayImage::from_fn(width, height, |x, y| Luma([lab.get_pixel(x, y)[0]]))
}

/// Replace the lightness plane of `lab`.
pub fn with_lightness(lab: &LabImage, l: &GrayImage) -> LabImage {
    let (width, height) = lab.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        let Rgb([_, a, b]) = *lab.get_pixel(x, y);
        Rgb([l.get_pixel(x, y)[0], a, b])
    })
}

pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> [u8; 3] {
    let lab = Lab::<D65, f32>::from_color(Srgb::new(r, g, b).into_format::<f32>());

    [
        to_u8(lab.l * 255.0 / 100.0),
        to_u8(lab.a + 128.0),
        to_u8(lab.b + 128.0),
    ]
}

pub fn lab_to_rgb([l, a, b]: [u8; 3]) -> [u8; 3] {
    let lab = Lab::<D65, f32>::new(
        f32::from(l) * 100.0 / 255.0,
        f32::from(a) - 128.0,
        f32::from(b) - 128.0,
    );
    // Out of gamut Lab values land outside 0..=1 and are clamped per channel.
    let rgb: Srgb<f32> = Srgb::from_color(lab);

    [rgb.red, rgb.green, rgb.blue].map(|c| to_u8(c * 255.0))
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_colors() {
        assert_eq!(rgb_to_lab([255, 255, 255]), [255, 128, 128]);
        assert_eq!(rgb_to_lab([0, 0, 0]), [0, 128, 128]);

        // Pure red: L* ≈ 53.2, a* ≈ 80.1, b* ≈ 67.2
        let [l, a, b] = rgb_to_lab([255, 0, 0]);
        assert!((l as i32 - 136).abs() <= 1);
        assert!((a as i32 - 208).abs() <= 1);
        assert!((b as i32 - 195).abs() <= 1);
    }

    #[test]
    fn test_round_trip_is_close() {
        for rgb in [
            [0, 0, 0],
            [255, 255, 255],
            [200, 30, 40],
            [12, 180, 90],
            [60, 60, 200],
            [128, 128, 128],
        ] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for (original, converted) in rgb.iter().zip(back.iter()) {
                assert!(
                    (*original as i32 - *converted as i32).abs() <= 3,
                    "{rgb:?} came back as {back:?}"
                );
            }
        }
    }

    #[test]
    fn test_out_of_gamut_lab_is_clamped() {
        // Maximal a* and b* at full lightness has no sRGB counterpart.
        let [r, g, b] = lab_to_rgb([255, 255, 255]);
        assert_eq!(r, 255);
        assert!(g < 255);
        assert_eq!(b, 0);
        assert_eq!(lab_to_rgb([0, 128, 128]), [0, 0, 0]);
    }

    #[test]
    fn test_lightness_plane_round_trip() {
        let image = RgbImage::from_fn(4, 3, |x, y| Rgb([(x * 60) as u8, (y * 80) as u8, 100]));
        let lab = ToLab(&image).wrap_convert();
        let l = lightness(&lab);
        assert_eq!(with_lightness(&lab, &l), lab);
        assert_eq!(FromLab(&lab).wrap_convert().dimensions(), (4, 3));
    }
}
