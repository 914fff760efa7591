use crate::config::MattingParams;
use crate::errors::{CutoutError, Result};
use crate::imageops_ai::mask::apply_alpha;
use crate::traits::SegmentationEngine;
use image::{GrayImage, RgbImage, RgbaImage};

/// Deterministic segmentation engine for tests.
///
/// The alpha channel is the hint mask itself, so the outcome of a pipeline run is
/// fully determined by the input pixels.
#[derive(Debug, Clone, Default)]
pub struct MockSegmentationEngine;

impl MockSegmentationEngine {
    pub const fn new() -> Self {
        Self
    }
}

impl SegmentationEngine for MockSegmentationEngine {
    fn remove_background(
        &self,
        image: &RgbImage,
        hint: &GrayImage,
        _params: &MattingParams,
    ) -> Result<RgbaImage> {
        apply_alpha(image, hint).map_err(|e| CutoutError::segmentation("mock matting", e))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_mock_engine_uses_hint_as_alpha() -> Result<()> {
        let image = RgbImage::from_pixel(8, 6, Rgb([10, 20, 30]));
        let mut hint = GrayImage::new(8, 6);
        hint.put_pixel(3, 2, Luma([255]));

        let result =
            MockSegmentationEngine::new().remove_background(&image, &hint, &Default::default())?;

        assert_eq!(result.dimensions(), (8, 6));
        assert_eq!(result.get_pixel(3, 2).0, [10, 20, 30, 255]);
        assert_eq!(result.get_pixel(0, 0).0, [10, 20, 30, 0]);
        Ok(())
    }

    #[test]
    fn test_mock_engine_rejects_mismatched_hint() {
        let image = RgbImage::new(8, 6);
        let hint = GrayImage::new(4, 4);

        let err = MockSegmentationEngine::new()
            .remove_background(&image, &hint, &Default::default())
            .unwrap_err();
        assert!(matches!(err, CutoutError::Segmentation { .. }));
    }
}
