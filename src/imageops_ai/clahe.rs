//! Contrast limited adaptive histogram equalization on 8-bit planes.
//!
//! The image is split into a grid of tiles. Each tile gets its own equalization LUT
//! built from a histogram clipped at `clip_limit * tile_area / 256` with the excess
//! spread evenly over all bins, and every output pixel is a bilinear blend of the
//! LUTs of the four nearest tile centers. When the image size is not a multiple of
//! the grid, tile histograms see the image extended by reflection (without repeating
//! the edge pixel).

use anyhow::{ensure, Result};
use image::{GrayImage, Luma};

const BINS: usize = 256;

pub fn clahe(image: &GrayImage, clip_limit: f32, grid: (u32, u32)) -> Result<GrayImage> {
    let (tiles_x, tiles_y) = grid;
    ensure!(tiles_x > 0 && tiles_y > 0, "tile grid must be at least 1x1");

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(image.clone());
    }

    let tile_width = width.div_ceil(tiles_x);
    let tile_height = height.div_ceil(tiles_y);
    let tile_area = (tile_width * tile_height) as usize;

    let clip = (clip_limit > 0.0)
        .then(|| ((clip_limit * tile_area as f32 / BINS as f32) as usize).max(1));
    let lut_scale = 255.0 / tile_area as f32;

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut histogram = [0usize; BINS];
            for y in ty * tile_height..(ty + 1) * tile_height {
                let sy = reflect_101(y, height);
                for x in tx * tile_width..(tx + 1) * tile_width {
                    let sx = reflect_101(x, width);
                    histogram[image.get_pixel(sx, sy)[0] as usize] += 1;
                }
            }
            if let Some(clip) = clip {
                clip_histogram(&mut histogram, clip);
            }
            luts.push(cumulative_lut(&histogram, lut_scale));
        }
    }

    let inv_tile_width = 1.0 / tile_width as f32;
    let inv_tile_height = 1.0 / tile_height as f32;

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let (ty1, ty2, ya) = neighbours(y, inv_tile_height, tiles_y);
        let (tx1, tx2, xa) = neighbours(x, inv_tile_width, tiles_x);
        let value = image.get_pixel(x, y)[0] as usize;

        let lut = |tx: u32, ty: u32| f32::from(luts[(ty * tiles_x + tx) as usize][value]);
        let top = lut(tx1, ty1) * (1.0 - xa) + lut(tx2, ty1) * xa;
        let bottom = lut(tx1, ty2) * (1.0 - xa) + lut(tx2, ty2) * xa;
        let blended = top * (1.0 - ya) + bottom * ya;

        Luma([blended.round().clamp(0.0, 255.0) as u8])
    }))
}

fn clip_histogram(histogram: &mut [usize; BINS], clip: usize) {
    let mut clipped = 0;
    for bin in histogram.iter_mut() {
        if *bin > clip {
            clipped += *bin - clip;
            *bin = clip;
        }
    }

    let batch = clipped / BINS;
    let mut residual = clipped - batch * BINS;
    for bin in histogram.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut i = 0;
        while i < BINS && residual > 0 {
            histogram[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

fn cumulative_lut(histogram: &[usize; BINS], scale: f32) -> [u8; BINS] {
    let mut lut = [0u8; BINS];
    let mut sum = 0;
    for (entry, count) in lut.iter_mut().zip(histogram) {
        sum += count;
        *entry = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// The two tile indices whose centers surround `position`, and the weight of the second.
fn neighbours(position: u32, inv_tile_size: f32, tiles: u32) -> (u32, u32, f32) {
    let f = position as f32 * inv_tile_size - 0.5;
    let first = f.floor();
    let weight = f - first;
    let first = first as i64;
    let last = tiles as i64 - 1;
    (
        first.clamp(0, last) as u32,
        (first + 1).clamp(0, last) as u32,
        weight,
    )
}

/// `dcb|abcd|cba` style index folding.
fn reflect_101(index: u32, len: u32) -> u32 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let folded = index % period;
    if folded < len {
        folded
    } else {
        period - folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(0, 5), 0);
        assert_eq!(reflect_101(4, 5), 4);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(7, 5), 1);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn test_clip_redistributes_excess() {
        let mut histogram = [0usize; BINS];
        histogram[10] = 1000;
        clip_histogram(&mut histogram, 4);

        assert_eq!(histogram.iter().sum::<usize>(), 1000);
        assert!(histogram.iter().all(|&count| count <= 4 + 4));
    }

    #[test]
    fn test_preserves_dimensions() -> Result<()> {
        let image = GrayImage::from_fn(37, 23, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let equalized = clahe(&image, 1.0, (4, 4))?;
        assert_eq!(equalized.dimensions(), image.dimensions());
        Ok(())
    }

    #[test]
    fn test_flat_image_stays_flat() -> Result<()> {
        let image = GrayImage::from_pixel(16, 16, Luma([90]));
        let equalized = clahe(&image, 1.0, (4, 4))?;
        let first = equalized.get_pixel(0, 0)[0];
        assert!(equalized.pixels().all(|p| p[0] == first));
        Ok(())
    }

    #[test]
    fn test_spreads_low_contrast_ramp() -> Result<()> {
        let image = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x / 8) as u8]));
        let equalized = clahe(&image, 40.0, (1, 1))?;

        let min = equalized.pixels().map(|p| p[0]).min().unwrap();
        let max = equalized.pixels().map(|p| p[0]).max().unwrap();
        assert!(max - min > 7, "range {min}..{max} was not stretched");
        Ok(())
    }

    #[test]
    fn test_rejects_empty_grid() {
        let image = GrayImage::new(4, 4);
        assert!(clahe(&image, 1.0, (0, 4)).is_err());
    }
}
