use crate::config::MattingParams;
use crate::errors::Result;
use image::{GrayImage, RgbImage, RgbaImage};

/// Abstraction over the foreground/background segmentation engine.
///
/// The pipeline depends on this seam only, so tests can swap in a deterministic
/// engine instead of running inference.
pub trait SegmentationEngine {
    /// Cut the foreground out of `image`.
    ///
    /// `hint` marks likely-foreground pixels and always has the same dimensions as
    /// `image`. The returned raster has the dimensions of `image` and a matted alpha
    /// channel.
    fn remove_background(
        &self,
        image: &RgbImage,
        hint: &GrayImage,
        params: &MattingParams,
    ) -> Result<RgbaImage>;

    /// Human readable engine name for logs.
    fn name(&self) -> &str;
}

impl<E: SegmentationEngine + ?Sized> SegmentationEngine for &E {
    fn remove_background(
        &self,
        image: &RgbImage,
        hint: &GrayImage,
        params: &MattingParams,
    ) -> Result<RgbaImage> {
        (**self).remove_background(image, hint, params)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
