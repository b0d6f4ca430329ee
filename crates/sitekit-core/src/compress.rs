//! Compression model: options, dimension math, filename and size metrics.
//!
//! The browser half of the pipeline (decode, canvas draw, re-encode) lives in
//! the `sitekit-wasm` crate; everything here is pure and runs natively.

use serde::{Deserialize, Serialize};

/// Default bounding box applied when the caller leaves dimensions unset
pub const DEFAULT_MAX_WIDTH: u32 = 1200;
pub const DEFAULT_MAX_HEIGHT: u32 = 1200;
/// Default encoder quality hint in [0, 1]
pub const DEFAULT_QUALITY: f64 = 0.8;

/// Output encoding for the compressed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// MIME type handed to the encoder and stamped on the output file
    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    /// File extension for the output filename
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Caller-supplied options; omitted fields fall back to the defaults above
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressionOptions {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub quality: Option<f64>,
    pub output_format: Option<OutputFormat>,
}

impl CompressionOptions {
    /// Merge over defaults once, so the rest of the pipeline never branches
    /// on optional fields
    pub fn resolve(&self) -> CompressionSettings {
        CompressionSettings {
            max_width: self.max_width.unwrap_or(DEFAULT_MAX_WIDTH),
            max_height: self.max_height.unwrap_or(DEFAULT_MAX_HEIGHT),
            quality: self.quality.unwrap_or(DEFAULT_QUALITY),
            output_format: self.output_format.unwrap_or_default(),
        }
    }
}

/// Fully resolved settings for one compression run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: f64,
    pub output_format: OutputFormat,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        CompressionOptions::default().resolve()
    }
}

/// Compute output dimensions preserving aspect ratio. Images already inside
/// the bounding box keep their dimensions (never upscales). Oversized images
/// scale on the longer axis: width for landscape, height otherwise.
pub fn target_dimensions(width: u32, height: u32, settings: &CompressionSettings) -> (u32, u32) {
    if width <= settings.max_width && height <= settings.max_height {
        return (width, height);
    }

    if width > height {
        let scaled = height as f64 * settings.max_width as f64 / width as f64;
        (settings.max_width, scaled.round() as u32)
    } else {
        let scaled = width as f64 * settings.max_height as f64 / height as f64;
        (scaled.round() as u32, settings.max_height)
    }
}

/// Integer percentage saved by compression. Negative when the output is
/// larger than the input (small or already-optimized images) — a valid
/// outcome, not an error.
pub fn compression_ratio(original_size: usize, compressed_size: usize) -> i32 {
    ((1.0 - compressed_size as f64 / original_size as f64) * 100.0).round() as i32
}

/// Replace the original extension with the output format's
pub fn output_filename(original: &str, format: OutputFormat) -> String {
    let stem = match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original,
    };
    format!("{}.{}", stem, format.extension())
}

/// Before/after numbers for one compression run; immutable once produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionMetrics {
    pub original_size: usize,
    pub compressed_size: usize,
    pub compression_ratio: i32,
    pub width: u32,
    pub height: u32,
}

impl CompressionMetrics {
    pub fn new(original_size: usize, compressed_size: usize, width: u32, height: u32) -> Self {
        Self {
            original_size,
            compressed_size,
            compression_ratio: compression_ratio(original_size, compressed_size),
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings(max_width: u32, max_height: u32) -> CompressionSettings {
        CompressionSettings {
            max_width,
            max_height,
            quality: DEFAULT_QUALITY,
            output_format: OutputFormat::Webp,
        }
    }

    #[test]
    fn test_small_image_keeps_dimensions() {
        let s = settings(1200, 1200);
        assert_eq!(target_dimensions(800, 600, &s), (800, 600));
        assert_eq!(target_dimensions(1200, 1200, &s), (1200, 1200));
        assert_eq!(target_dimensions(1, 1, &s), (1, 1));
    }

    #[test]
    fn test_landscape_clamps_width() {
        let s = settings(1200, 1200);
        assert_eq!(target_dimensions(2000, 1000, &s), (1200, 600));
    }

    #[test]
    fn test_portrait_clamps_height() {
        let s = settings(1200, 1200);
        assert_eq!(target_dimensions(1000, 2000, &s), (600, 1200));
    }

    #[test]
    fn test_square_oversized_uses_height_branch() {
        // width == height takes the height-constrained branch
        let s = settings(1200, 1200);
        assert_eq!(target_dimensions(2400, 2400, &s), (1200, 1200));
    }

    #[test]
    fn test_aspect_ratio_preserved_within_rounding() {
        let s = settings(1200, 1200);
        for &(w, h) in &[(3000u32, 1700u32), (1700, 3000), (2001, 1999), (5000, 1250)] {
            let (ow, oh) = target_dimensions(w, h, &s);
            let input_ratio = w as f64 / h as f64;
            let output_ratio = ow as f64 / oh as f64;
            assert!(
                (output_ratio - input_ratio).abs() < 0.01,
                "{}x{} -> {}x{} drifted: {} vs {}",
                w,
                h,
                ow,
                oh,
                output_ratio,
                input_ratio
            );
        }
    }

    #[test]
    fn test_compression_ratio_positive() {
        assert_eq!(compression_ratio(1000, 400), 60);
        assert_eq!(compression_ratio(1000, 250), 75);
    }

    #[test]
    fn test_compression_ratio_negative_is_valid() {
        // Tiny, already-optimized inputs can grow on re-encode
        assert_eq!(compression_ratio(100, 150), -50);
        assert_eq!(compression_ratio(1000, 1005), -1);
    }

    #[test]
    fn test_compression_ratio_rounds() {
        // 1 - 333/1000 = 0.667 -> 67
        assert_eq!(compression_ratio(1000, 333), 67);
        // 1 - 666/1000 = 0.334 -> 33
        assert_eq!(compression_ratio(1000, 666), 33);
    }

    #[test]
    fn test_output_filename_replaces_extension() {
        assert_eq!(output_filename("photo.png", OutputFormat::Webp), "photo.webp");
        assert_eq!(output_filename("banner.WEBP", OutputFormat::Jpeg), "banner.jpg");
        assert_eq!(output_filename("scan.jpeg", OutputFormat::Png), "scan.png");
    }

    #[test]
    fn test_output_filename_without_extension() {
        assert_eq!(output_filename("photo", OutputFormat::Webp), "photo.webp");
    }

    #[test]
    fn test_output_filename_keeps_inner_dots() {
        assert_eq!(
            output_filename("hero.2024.final.png", OutputFormat::Webp),
            "hero.2024.final.webp"
        );
    }

    #[test]
    fn test_options_resolve_defaults() {
        let resolved = CompressionOptions::default().resolve();
        assert_eq!(resolved.max_width, 1200);
        assert_eq!(resolved.max_height, 1200);
        assert_eq!(resolved.quality, 0.8);
        assert_eq!(resolved.output_format, OutputFormat::Webp);
    }

    #[test]
    fn test_options_resolve_overrides() {
        let options = CompressionOptions {
            max_width: Some(640),
            quality: Some(0.5),
            output_format: Some(OutputFormat::Jpeg),
            ..Default::default()
        };
        let resolved = options.resolve();
        assert_eq!(resolved.max_width, 640);
        assert_eq!(resolved.max_height, 1200);
        assert_eq!(resolved.quality, 0.5);
        assert_eq!(resolved.output_format, OutputFormat::Jpeg);
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: CompressionOptions =
            serde_json::from_str(r#"{"maxWidth": 800, "outputFormat": "jpeg"}"#).unwrap();
        assert_eq!(options.max_width, Some(800));
        assert_eq!(options.max_height, None);
        assert_eq!(options.output_format, Some(OutputFormat::Jpeg));
    }

    #[test]
    fn test_metrics_carry_ratio() {
        let metrics = CompressionMetrics::new(2048, 512, 1200, 600);
        assert_eq!(metrics.compression_ratio, 75);
        assert_eq!(metrics.width, 1200);
        assert_eq!(metrics.height, 600);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Output never exceeds a square bounding box
            #[test]
            fn output_fits_square_box(w in 1u32..8000, h in 1u32..8000) {
                let s = settings(1200, 1200);
                let (ow, oh) = target_dimensions(w, h, &s);
                prop_assert!(ow <= 1200);
                prop_assert!(oh <= 1200);
            }

            /// No upscaling, ever
            #[test]
            fn never_upscales(w in 1u32..8000, h in 1u32..8000) {
                let s = settings(1200, 1200);
                let (ow, oh) = target_dimensions(w, h, &s);
                prop_assert!(ow <= w);
                prop_assert!(oh <= h);
            }

            /// Ratio matches the rounded arithmetic exactly
            #[test]
            fn ratio_matches_formula(original in 1usize..10_000_000, compressed in 0usize..10_000_000) {
                let expected = ((1.0 - compressed as f64 / original as f64) * 100.0).round() as i32;
                prop_assert_eq!(compression_ratio(original, compressed), expected);
            }
        }
    }
}
