//! Foreground hint synthesis.
//!
//! Dark, ink-like structure is a strong foreground cue on the light backgrounds this
//! worker is typically fed, so everything darker than a fixed cutoff is marked before
//! the segmentation engine ever runs.

use image::{GrayImage, Luma, RgbImage};
use imageproc::{distance_transform::Norm, map::map_colors, morphology::dilate};

use crate::imageops_ai::enhance::luma_plane;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Luma threshold followed by `dilate_iterations` passes of a 3x3 dilation.
pub fn synthesize(image: &RgbImage, cutoff: u8, dilate_iterations: u32) -> GrayImage {
    let mask = threshold_inverted(&luma_plane(image), cutoff);
    (0..dilate_iterations).fold(mask, |mask, _| dilate(&mask, Norm::LInf, 1))
}

/// Pixels strictly darker than `cutoff` become [`FOREGROUND`], the rest [`BACKGROUND`].
pub fn threshold_inverted(luma: &GrayImage, cutoff: u8) -> GrayImage {
    map_colors(luma, |Luma([l])| {
        Luma([if l < cutoff { FOREGROUND } else { BACKGROUND }])
    })
}
