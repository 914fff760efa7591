pub mod codec;
pub mod config;
pub mod errors;
pub mod hint_mask;
pub mod imageops_ai;
pub mod model;
pub mod preprocess;
pub mod protocol;
pub mod traits;

pub mod mocks;

use std::time::Instant;

use image::{DynamicImage, GenericImageView};

pub use config::{Config, MattingParams, PipelineSettings};
pub use errors::{CutoutError, Result};
pub use model::Model;
pub use traits::*;

#[cfg(test)]
pub use mocks::*;

/// Progress checkpoints reported while a payload moves through the pipeline.
pub mod checkpoint {
    pub const DECODE_START: u8 = 10;
    pub const DECODED: u8 = 20;
    pub const PREPROCESSED: u8 = 40;
    pub const MASKED: u8 = 60;
    pub const SEGMENTED: u8 = 80;
    pub const TRIMMED: u8 = 95;
    pub const ENCODED: u8 = 100;
}

/// Owns the segmentation session and turns request payloads into cut-outs.
pub struct CutoutProcessor<M: SegmentationEngine> {
    engine: M,
    settings: PipelineSettings,
}

impl<M: SegmentationEngine> CutoutProcessor<M> {
    pub const fn new(engine: M, settings: PipelineSettings) -> Self {
        Self { engine, settings }
    }

    pub const fn engine(&self) -> &M {
        &self.engine
    }

    /// Decode `payload`, cut the subject out and return it as a PNG data URI.
    ///
    /// `progress` is called with non-decreasing values from [`checkpoint`].
    pub fn process_payload<P: FnMut(u8)>(&self, payload: &str, mut progress: P) -> Result<String> {
        progress(checkpoint::DECODE_START);
        let image = codec::decode(payload)?;
        let (width, height) = image.dimensions();
        tracing::debug!(width, height, color = ?image.color(), "payload decoded");
        progress(checkpoint::DECODED);

        let cutout = self.cut_out(&image, &mut progress)?;

        let encoded = codec::encode_png(&cutout)?;
        progress(checkpoint::ENCODED);
        Ok(encoded)
    }

    /// Run every raster stage between decoding and encoding.
    pub fn cut_out<P: FnMut(u8)>(
        &self,
        image: &DynamicImage,
        mut progress: P,
    ) -> Result<DynamicImage> {
        let settings = &self.settings;

        let started = Instant::now();
        let prepared = preprocess::preprocess(&image.to_rgb8(), settings)?;
        let prepared = preprocess::normalize_size(&prepared, settings.max_dimension);
        tracing::debug!(elapsed = ?started.elapsed(), "preprocessed");
        progress(checkpoint::PREPROCESSED);

        let hint = hint_mask::synthesize(
            &prepared,
            settings.mask_cutoff,
            settings.mask_dilate_iterations,
        );
        progress(checkpoint::MASKED);

        if hint.dimensions() != prepared.dimensions() {
            return Err(CutoutError::internal(
                "hint mask synthesis",
                format!(
                    "mask is {:?} but raster is {:?}",
                    hint.dimensions(),
                    prepared.dimensions()
                ),
            ));
        }

        let started = Instant::now();
        let segmented = self
            .engine
            .remove_background(&prepared, &hint, &settings.matting)
            .map_err(|e| match e {
                e @ CutoutError::Segmentation { .. } => e,
                other => CutoutError::segmentation(self.engine.name(), other),
            })?;
        tracing::debug!(engine = self.engine.name(), elapsed = ?started.elapsed(), "segmented");
        progress(checkpoint::SEGMENTED);

        let trimmed = imageops_ai::trim_transparent_border(
            DynamicImage::ImageRgba8(segmented),
            settings.trim_padding,
            settings.trim_alpha_threshold,
        );
        progress(checkpoint::TRIMMED);

        Ok(trimmed)
    }
}

impl CutoutProcessor<Model> {
    pub fn with_onnx_model(config: &Config) -> Result<Self> {
        let model = Model::new(&config.model_path, config.device_id)?;
        Ok(Self::new(model, PipelineSettings::default()))
    }
}
