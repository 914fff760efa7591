use std::path::Path;

use crate::{
    config::MattingParams,
    errors::{CutoutError, Result},
    hint_mask::FOREGROUND,
    imageops_ai::mask::apply_alpha,
    traits::SegmentationEngine,
};
use image::{imageops, imageops::FilterType, GrayImage, Luma, RgbImage, RgbaImage};
use imageproc::{distance_transform::Norm, map::map_colors, morphology::erode};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

const DEFAULT_INPUT_SIZE: u32 = 320;
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

const TRIMAP_UNKNOWN: u8 = 128;

/// U²-Net salient object segmentation running on ONNX Runtime.
///
/// The session is created once and reused for every request.
pub struct Model {
    pub image_size: u32,
    session: Mutex<Session>,
}

impl Model {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| model_error("session builder initialization", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| model_error("execution provider setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| model_error("memory pattern setup", e))?
            .commit_from_file(model_path)
            .map_err(|e| model_error(format!("loading {}", model_path.display()), e))?;

        // Dynamic axes come back as -1
        let image_size = session.inputs[0]
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&size| size > 0)
            .map_or(DEFAULT_INPUT_SIZE, |size| size as u32);

        // initialize model
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        session
            .run(ort::inputs![TensorRef::from_array_view(&data)
                .map_err(|e| model_error("warm-up tensor creation", e))?])
            .map_err(|e| model_error("warm-up run", e))?;

        tracing::info!(
            path = %model_path.display(),
            image_size,
            device_id,
            "segmentation session ready"
        );

        Ok(Self {
            image_size,
            session: Mutex::new(session),
        })
    }

    /// Raw forward pass: `(1, 3, S, S)` in, first output out.
    pub fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs =
            binding.run(ort::inputs![TensorRef::from_array_view(&tensor.as_standard_layout())?])?;
        Ok(outputs[0]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }

    /// Soft foreground mask of `image`, at the image's own resolution.
    pub fn predict_mask(&self, image: &RgbImage) -> Result<GrayImage> {
        let tensor = preprocess(image, self.image_size);
        let prediction = self.predict(tensor.view())?;
        let (width, height) = image.dimensions();
        postprocess_mask(prediction, width, height)
    }
}

impl SegmentationEngine for Model {
    fn remove_background(
        &self,
        image: &RgbImage,
        hint: &GrayImage,
        params: &MattingParams,
    ) -> Result<RgbaImage> {
        let _span = tracing::debug_span!("u2net").entered();

        let predicted = self.predict_mask(image)?;
        let trimap = build_trimap(&predicted, hint, params);
        let alpha = refine_alpha(&predicted, &trimap);

        apply_alpha(image, &alpha).map_err(|e| CutoutError::segmentation("alpha application", e))
    }

    fn name(&self) -> &str {
        "u2net"
    }
}

fn model_error(
    operation: impl Into<String>,
    source: impl std::error::Error + Send + Sync + 'static,
) -> CutoutError {
    CutoutError::Model {
        operation: operation.into(),
        source: Box::new(source),
    }
}

/// Square Lanczos resize, scaled by the brightest subpixel, ImageNet normalized, NCHW.
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let image = imageops::resize(image, image_size, image_size, FilterType::Lanczos3);
    let max = image.as_raw().iter().copied().max().map_or(0.0, f32::from);
    let scale = max.max(1e-6);

    let mut tensor = image
        .as_ndarray3()
        .map(|&v| f32::from(v) / scale)
        .insert_axis(Axis(0));
    for (channel, (mean, std)) in MEAN.iter().zip(STD.iter()).enumerate() {
        tensor
            .slice_mut(s![0, channel, .., ..])
            .mapv_inplace(|v| (v - mean) / std);
    }
    tensor
}

/// Min-max normalize the first channel to 0..=255 and resize it to `width` x `height`.
pub fn postprocess_mask(prediction: Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
    let plane = prediction.slice(s![0, 0, .., ..]);
    let (rows, cols) = plane.dim();

    let min = plane.iter().copied().fold(f32::INFINITY, f32::min);
    let max = plane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = (max - min).max(f32::EPSILON);

    let pixels = plane
        .iter()
        .map(|&v| ((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect::<Vec<_>>();

    let mask = GrayImage::from_raw(cols as u32, rows as u32, pixels).ok_or_else(|| {
        CutoutError::segmentation(
            "mask reconstruction",
            format!("prediction of {cols}x{rows} does not fit a mask buffer"),
        )
    })?;
    Ok(imageops::resize(&mask, width, height, FilterType::Lanczos3))
}

/// Definite foreground (255), definite background (0) and unknown (128) regions.
///
/// Both definite regions are eroded with a square element of side `erode_size + 1`
/// centred on each pixel (`erode_size / 2` in every direction), so the default of 10
/// erodes with an 11x11 square rather than an even 10x10 one. Unknown pixels covered
/// by the hint are promoted to foreground.
pub fn build_trimap(predicted: &GrayImage, hint: &GrayImage, params: &MattingParams) -> GrayImage {
    let radius = u8::try_from(params.erode_size / 2).unwrap_or(u8::MAX);
    let select = |keep: &dyn Fn(u8) -> bool| {
        let region = map_colors(predicted, |Luma([v])| Luma([if keep(v) { 255 } else { 0 }]));
        if radius == 0 {
            region
        } else {
            erode(&region, Norm::LInf, radius)
        }
    };

    let foreground = select(&|v| v > params.foreground_threshold);
    let background = select(&|v| v < params.background_threshold);

    GrayImage::from_fn(predicted.width(), predicted.height(), |x, y| {
        let value = if foreground.get_pixel(x, y)[0] > 0 {
            255
        } else if background.get_pixel(x, y)[0] > 0 {
            0
        } else if hint.get_pixel(x, y)[0] == FOREGROUND {
            255
        } else {
            TRIMAP_UNKNOWN
        };
        Luma([value])
    })
}

/// Known trimap regions are taken as is; the unknown band keeps the soft prediction.
pub fn refine_alpha(predicted: &GrayImage, trimap: &GrayImage) -> GrayImage {
    GrayImage::from_fn(predicted.width(), predicted.height(), |x, y| {
        match trimap.get_pixel(x, y)[0] {
            TRIMAP_UNKNOWN => *predicted.get_pixel(x, y),
            known => Luma([known]),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let image = RgbImage::from_pixel(50, 30, Rgb([255, 255, 255]));
        let tensor = preprocess(&image, 32);

        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
        let expected = (1.0 - MEAN[0]) / STD[0];
        assert!((tensor[[0, 0, 5, 5]] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_postprocess_mask_normalizes_and_resizes() -> Result<()> {
        let mut prediction = Array4::<f32>::zeros((1, 1, 4, 4));
        prediction[[0, 0, 0, 0]] = 0.25;
        prediction[[0, 0, 3, 3]] = 0.75;

        let mask = postprocess_mask(prediction, 8, 6)?;
        assert_eq!(mask.dimensions(), (8, 6));
        assert!(mask.pixels().any(|p| p[0] > 200));
        Ok(())
    }

    #[test]
    fn test_trimap_regions() {
        let predicted = GrayImage::from_fn(30, 30, |x, _| {
            Luma([match x {
                0..=9 => 0,
                10..=19 => 128,
                _ => 255,
            }])
        });
        let hint = GrayImage::new(30, 30);
        let params = MattingParams {
            erode_size: 2,
            ..Default::default()
        };

        let trimap = build_trimap(&predicted, &hint, &params);
        assert_eq!(trimap.get_pixel(2, 15)[0], 0);
        assert_eq!(trimap.get_pixel(15, 15)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(27, 15)[0], 255);
        // Eroded away next to the unknown band.
        assert_eq!(trimap.get_pixel(9, 15)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(20, 15)[0], TRIMAP_UNKNOWN);
    }

    #[test]
    fn test_default_erosion_reaches_five_pixels() {
        let predicted = GrayImage::from_fn(40, 9, |x, _| Luma([if x < 20 { 128 } else { 255 }]));
        let hint = GrayImage::new(40, 9);

        let trimap = build_trimap(&predicted, &hint, &MattingParams::default());
        assert_eq!(trimap.get_pixel(24, 4)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(25, 4)[0], 255);
        assert_eq!(trimap.get_pixel(39, 4)[0], 255);
    }

    #[test]
    fn test_hint_promotes_unknown_pixels_only() {
        let predicted = GrayImage::from_fn(10, 1, |x, _| Luma([if x < 5 { 0 } else { 128 }]));
        let hint = GrayImage::from_pixel(10, 1, Luma([FOREGROUND]));
        let params = MattingParams {
            erode_size: 0,
            ..Default::default()
        };

        let trimap = build_trimap(&predicted, &hint, &params);
        assert_eq!(trimap.get_pixel(0, 0)[0], 0);
        assert_eq!(trimap.get_pixel(7, 0)[0], 255);
    }

    #[test]
    fn test_refine_alpha_keeps_soft_band() {
        let predicted = GrayImage::from_raw(3, 1, vec![10, 90, 240]).unwrap();
        let trimap = GrayImage::from_raw(3, 1, vec![0, TRIMAP_UNKNOWN, 255]).unwrap();
        let alpha = refine_alpha(&predicted, &trimap);
        assert_eq!(alpha.as_raw(), &vec![0, 90, 255]);
    }
}
