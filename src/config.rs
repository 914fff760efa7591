use clap::Parser;
use std::path::PathBuf;

/// Launch configuration of the worker binary.
///
/// These flags only locate and place the segmentation session. The request/response
/// protocol has no configuration surface of its own.
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Path to the U²-Net ONNX model
    #[arg(short, long, default_value = "u2net.onnx")]
    pub model_path: PathBuf,

    /// GPU device used by the CUDA / TensorRT execution providers
    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Enable debug logging (written to stderr)
    #[arg(long)]
    pub debug: bool,
}

/// Refinement parameters handed to the segmentation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MattingParams {
    /// Predicted mask values above this are definite foreground.
    pub foreground_threshold: u8,
    /// Predicted mask values below this are definite background.
    pub background_threshold: u8,
    /// Size of the square element eroding both definite regions.
    pub erode_size: u32,
}

impl Default for MattingParams {
    fn default() -> Self {
        Self {
            foreground_threshold: 220,
            background_threshold: 20,
            erode_size: 10,
        }
    }
}

/// Every constant of the cut-out pipeline, in stage order.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub clahe_clip_limit: f32,
    /// Tile grid as (columns, rows).
    pub clahe_tile_grid: (u32, u32),
    /// Global contrast factor. 1.0 leaves the image untouched and is the only value
    /// used so far.
    pub contrast_factor: f32,
    pub sharpness_factor: f32,
    /// Side of the square median window. Must be odd.
    pub median_kernel_size: u32,
    pub max_dimension: u32,
    /// Luminance below this is marked as foreground in the hint mask.
    pub mask_cutoff: u8,
    pub mask_dilate_iterations: u32,
    pub matting: MattingParams,
    pub trim_padding: u32,
    pub trim_alpha_threshold: u8,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 1.0,
            clahe_tile_grid: (4, 4),
            contrast_factor: 1.0,
            sharpness_factor: 1.2,
            median_kernel_size: 5,
            max_dimension: 1024,
            mask_cutoff: 200,
            mask_dilate_iterations: 1,
            matting: MattingParams::default(),
            trim_padding: 4,
            trim_alpha_threshold: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_without_flags() {
        let config = Config::try_parse_from(["cutout-rs"]).unwrap();
        assert_eq!(config.model_path, PathBuf::from("u2net.onnx"));
        assert_eq!(config.device_id, 0);
        assert!(!config.debug);
    }

    #[test]
    fn test_config_flags() {
        let config =
            Config::try_parse_from(["cutout-rs", "-m", "models/isnet.onnx", "-d", "1", "--debug"])
                .unwrap();
        assert_eq!(config.model_path, PathBuf::from("models/isnet.onnx"));
        assert_eq!(config.device_id, 1);
        assert!(config.debug);
    }

    #[test]
    fn test_pipeline_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.max_dimension, 1024);
        assert_eq!(settings.contrast_factor, 1.0);
        assert_eq!(settings.matting.foreground_threshold, 220);
        assert_eq!(settings.matting.background_threshold, 20);
        assert_eq!(settings.matting.erode_size, 10);
    }
}
