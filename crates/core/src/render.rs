//! Cropped image rendering and artifact handles.
//!
//! This module samples the mapped source region, resamples it to the
//! output canvas and encodes the result as JPEG, whatever the input
//! format was.
//!
//! Encoding ([`encode_crop`]) is pure and can run on a blocking worker.
//! Publishing ([`Renderer::publish`]) allocates the handle the rest of the
//! application refers to, and must happen back on the event thread.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::geometry::SourceCrop;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// MIME type of every rendered artifact.
pub const OUTPUT_MIME: &str = "image/jpeg";

/// Opaque handle to a rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactHandle(u64);

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:image-cropper/{}", self.0)
    }
}

/// Encoded output of a crop, not yet published.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A published crop.
#[derive(Debug, Clone)]
pub struct CroppedArtifact {
    handle: ArtifactHandle,
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl CroppedArtifact {
    pub fn handle(&self) -> ArtifactHandle {
        self.handle
    }

    /// The retrievable URL of this artifact.
    pub fn url(&self) -> String {
        self.handle.to_string()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The encoded bytes as a self-contained `data:` URL.
    pub fn data_url(&self) -> String {
        format!("data:{OUTPUT_MIME};base64,{}", BASE64.encode(&self.bytes))
    }
}

/// The current artifact exposed under a fixed filename.
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    /// Writes the file into `dir` and returns its path.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.filename);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Pixel-aligned region covering the fractional source rectangle.
fn sample_region(source_w: u32, source_h: u32, crop: &SourceCrop) -> Result<(u32, u32, u32, u32)> {
    if crop.ow == 0 || crop.oh == 0 {
        return Err(AppError::encoding("output canvas has zero area"));
    }
    if !(crop.sw > 0.0 && crop.sh > 0.0) {
        return Err(AppError::encoding("source region has zero area"));
    }

    // Ignore sub-micro overshoot on the far edge so a region ending exactly
    // on a pixel boundary does not pull in one more column or row.
    const EDGE_EPSILON: f64 = 1e-6;
    let x0 = crop.sx.max(0.0).floor() as u32;
    let y0 = crop.sy.max(0.0).floor() as u32;
    let x1 = ((crop.sx + crop.sw - EDGE_EPSILON).ceil().max(0.0) as u32).min(source_w);
    let y1 = ((crop.sy + crop.sh - EDGE_EPSILON).ceil().max(0.0) as u32).min(source_h);

    if x0 >= x1 || y0 >= y1 {
        return Err(AppError::encoding("crop region lies outside the source image"));
    }
    Ok((x0, y0, x1 - x0, y1 - y0))
}

/// Crops, resamples and encodes one artifact.
///
/// # Errors
///
/// Returns [`AppError::EncodingFailure`] for a zero-area canvas, a region
/// outside the source, or any encoder error.
pub fn encode_crop(source: &DynamicImage, crop: &SourceCrop, quality: u8) -> Result<RenderedImage> {
    let (x, y, width, height) = sample_region(source.width(), source.height(), crop)?;

    let region = source.crop_imm(x, y, width, height);
    let resampled = if (width, height) == (crop.ow, crop.oh) {
        region
    } else {
        region.resize_exact(crop.ow, crop.oh, FilterType::Lanczos3)
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(resampled.to_rgb8());

    let mut bytes: Vec<u8> = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))
        .map_err(|e| AppError::encoding(format!("Failed to encode image: {}", e)))?;
    if bytes.is_empty() {
        return Err(AppError::encoding("encoder produced no bytes"));
    }

    tracing::debug!(
        region = ?(x, y, width, height),
        output = ?(crop.ow, crop.oh),
        bytes = bytes.len(),
        "encoded crop"
    );
    Ok(RenderedImage {
        bytes,
        width: crop.ow,
        height: crop.oh,
    })
}

/// Encodes crops and tracks which artifact handles are still live.
#[derive(Debug)]
pub struct Renderer {
    quality: u8,
    next_handle: u64,
    live: HashSet<ArtifactHandle>,
}

impl Renderer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            next_handle: 1,
            live: HashSet::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.jpeg_quality)
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Renders and publishes in one step.
    pub fn render(&mut self, source: &DynamicImage, crop: &SourceCrop) -> Result<CroppedArtifact> {
        let rendered = encode_crop(source, crop, self.quality)?;
        Ok(self.publish(rendered))
    }

    /// Allocates a new handle for an encoded image.
    pub fn publish(&mut self, rendered: RenderedImage) -> CroppedArtifact {
        let handle = ArtifactHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle);
        CroppedArtifact {
            handle,
            bytes: rendered.bytes,
            width: rendered.width,
            height: rendered.height,
        }
    }

    /// Releases a handle. Returns `false` if it was not live.
    pub fn release(&mut self, handle: ArtifactHandle) -> bool {
        let released = self.live.remove(&handle);
        if released {
            tracing::debug!(%handle, "released artifact");
        }
        released
    }

    pub fn is_live(&self, handle: ArtifactHandle) -> bool {
        self.live.contains(&handle)
    }

    /// Number of handles published and not yet released.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 200])
        }))
    }

    fn crop(sx: f64, sy: f64, sw: f64, sh: f64) -> SourceCrop {
        SourceCrop {
            sx,
            sy,
            sw,
            sh,
            ow: (sw.round() as u32).max(1),
            oh: (sh.round() as u32).max(1),
        }
    }

    #[test]
    fn renders_jpeg_of_output_size() {
        let rendered = encode_crop(&gradient(200, 100), &crop(10.0, 10.0, 80.0, 64.0), 90).unwrap();
        assert_eq!((rendered.width, rendered.height), (80, 64));
        assert_eq!(&rendered.bytes[0..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&rendered.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (80, 64));
    }

    #[test]
    fn fractional_region_is_resampled() {
        // Covers 41x41 source pixels, drawn onto a 40x40 canvas.
        let rendered = encode_crop(&gradient(200, 100), &crop(0.5, 0.5, 40.2, 40.2), 90).unwrap();
        let decoded = image::load_from_memory(&rendered.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 40));
    }

    #[test]
    fn region_on_pixel_boundary_is_not_widened() {
        assert_eq!(sample_region(200, 100, &crop(10.0, 0.0, 50.0, 40.0)).unwrap(), (10, 0, 50, 40));
        assert_eq!(
            sample_region(200, 100, &crop(0.0, 0.0, 200.0000000001, 100.0)).unwrap(),
            (0, 0, 200, 100)
        );
    }

    #[test]
    fn zero_area_is_an_encoding_failure() {
        let mut zero = crop(0.0, 0.0, 10.0, 10.0);
        zero.ow = 0;
        assert!(matches!(
            encode_crop(&gradient(20, 20), &zero, 90),
            Err(AppError::EncodingFailure(_))
        ));
        assert!(matches!(
            encode_crop(&gradient(20, 20), &crop(0.0, 0.0, 0.0, 10.0), 90),
            Err(AppError::EncodingFailure(_))
        ));
    }

    #[test]
    fn region_outside_source_fails() {
        assert!(matches!(
            encode_crop(&gradient(20, 20), &crop(30.0, 30.0, 5.0, 5.0), 90),
            Err(AppError::EncodingFailure(_))
        ));
    }

    #[test]
    fn handles_are_unique_and_released_once() {
        let mut renderer = Renderer::new(90);
        let source = gradient(40, 40);
        let first = renderer.render(&source, &crop(0.0, 0.0, 20.0, 20.0)).unwrap();
        let second = renderer.render(&source, &crop(5.0, 5.0, 20.0, 20.0)).unwrap();
        assert_ne!(first.handle(), second.handle());
        assert_eq!(renderer.live_count(), 2);
        assert!(renderer.release(first.handle()));
        assert!(!renderer.release(first.handle()));
        assert!(renderer.is_live(second.handle()));
        assert_eq!(renderer.live_count(), 1);
    }

    #[test]
    fn artifact_urls() {
        let mut renderer = Renderer::new(90);
        let artifact = renderer.render(&gradient(10, 10), &crop(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert_eq!(artifact.url(), "blob:image-cropper/1");
        assert!(artifact.data_url().starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn download_writes_fixed_filename() {
        let dir = tempfile::tempdir().unwrap();
        let download = Download {
            filename: "cropped-image.jpeg".into(),
            mime: OUTPUT_MIME,
            bytes: vec![1, 2, 3],
        };
        let path = download.save_in(dir.path()).unwrap();
        assert!(path.ends_with("cropped-image.jpeg"));
        assert_eq!(fs::read(path).unwrap(), vec![1, 2, 3]);
    }
}
