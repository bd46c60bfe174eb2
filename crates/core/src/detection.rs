//! Face detection capability and face-driven crop initialization.
//!
//! The crate ships no detection model. Anything implementing
//! [`FaceDetector`] can seed the initial crop; [`SuppliedDetector`] covers
//! boxes that come from outside the process.

use crate::aspect::{AspectRatio, reconcile};
use crate::config::DEFAULT_FACE_MARGIN;
use crate::error::{AppError, Result};
use crate::geometry::{CropRect, Dimensions};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Bounding box of a detected face, in natural (source) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DetectionBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// The whole image as a region of interest.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    /// True for a box with positive finite size and finite offsets.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Pluggable face detection backend.
///
/// Implementations may be slow; the session never calls them directly, see
/// [`detect_with_timeout`].
pub trait FaceDetector: Send + Sync {
    /// Detects faces inside `region` of `image`.
    ///
    /// Returns zero or more boxes in natural pixels. Only the first one is
    /// used. Errors mean the detector itself is unusable.
    fn detect(&self, image: &DynamicImage, region: DetectionBox) -> Result<Vec<DetectionBox>>;
}

/// Detector that returns boxes supplied from outside, e.g. on the command
/// line. Boxes outside `region` are dropped.
#[derive(Debug, Clone, Default)]
pub struct SuppliedDetector {
    boxes: Vec<DetectionBox>,
}

impl SuppliedDetector {
    pub fn new(boxes: Vec<DetectionBox>) -> Self {
        Self { boxes }
    }
}

impl FaceDetector for SuppliedDetector {
    fn detect(&self, _image: &DynamicImage, region: DetectionBox) -> Result<Vec<DetectionBox>> {
        Ok(self
            .boxes
            .iter()
            .filter(|b| {
                b.is_valid()
                    && b.x < region.x + region.width
                    && b.y < region.y + region.height
                    && b.x + b.width > region.x
                    && b.y + b.height > region.y
            })
            .copied()
            .collect())
    }
}

/// Runs `detector` over the whole image on a blocking worker.
///
/// Every failure mode (detector error, panic, timeout) comes back as
/// [`AppError::DetectionUnavailable`]; callers fall back to the default
/// rectangle.
pub async fn detect_with_timeout(
    detector: Arc<dyn FaceDetector>,
    image: Arc<DynamicImage>,
    timeout: Duration,
) -> Result<Vec<DetectionBox>> {
    let region = DetectionBox::full(image.width(), image.height());
    let task = tokio::task::spawn_blocking(move || detector.detect(&image, region));

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(AppError::detection(format!(
            "timed out after {} ms",
            timeout.as_millis()
        ))),
        Ok(Err(join_error)) => Err(AppError::detection(format!(
            "detector task failed: {join_error}"
        ))),
        Ok(Ok(Err(AppError::DetectionUnavailable(msg)))) => Err(AppError::DetectionUnavailable(msg)),
        Ok(Ok(Err(other))) => Err(AppError::detection(other.to_string())),
        Ok(Ok(Ok(boxes))) => Ok(boxes),
    }
}

/// Initial crop from an optional detection, using the default margin.
pub fn init_from_detection(
    detection: Option<&DetectionBox>,
    dims: &Dimensions,
    aspect: AspectRatio,
) -> CropRect {
    init_with_margin(detection, dims, aspect, DEFAULT_FACE_MARGIN)
}

/// Initial crop from the first of any number of detections.
pub fn init_from_detections(
    detections: &[DetectionBox],
    dims: &Dimensions,
    aspect: AspectRatio,
    margin: f64,
) -> CropRect {
    init_with_margin(detections.first(), dims, aspect, margin)
}

/// Converts a natural-pixel face box into a display-percent crop.
///
/// The box is grown by `margin` on width and height around its top-left
/// corner (it grows down and to the right), clamped to the display, and
/// tagged with `aspect` without reshaping it. With no usable detection the
/// default rectangle for `aspect` is returned.
pub fn init_with_margin(
    detection: Option<&DetectionBox>,
    dims: &Dimensions,
    aspect: AspectRatio,
    margin: f64,
) -> CropRect {
    let natural_w = dims.natural_width as f64;
    let natural_h = dims.natural_height as f64;
    let usable = detection.filter(|d| d.is_valid() && natural_w > 0.0 && natural_h > 0.0);

    let Some(face) = usable else {
        return reconcile(None, aspect, dims);
    };

    // Multiply before dividing so round numbers stay exact.
    CropRect::percent(
        face.x * 100.0 / natural_w,
        face.y * 100.0 / natural_h,
        face.width * 100.0 / natural_w * margin,
        face.height * 100.0 / natural_h * margin,
    )
    .with_aspect(aspect)
    .clamped(dims)
}
