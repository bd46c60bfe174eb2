//! Crop geometry and coordinate mapping.
//!
//! The selection widget works in display space: the image as it is drawn
//! on screen, possibly scaled down (and possibly scaled non-uniformly).
//! The renderer works in source space: the natural pixels of the decoded
//! raster. This module converts between the two.
//!
//! # Coordinate Mapping
//!
//! A crop rectangle is either in display pixels or in percent of the
//! display size. Mapping to the source multiplies each axis by its own
//! scale factor (`natural / display`), then shrinks one side so the
//! result has exactly the requested aspect ratio. The top-left corner
//! stays where the user put it.

use crate::aspect::AspectRatio;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Natural (source) and displayed (on-screen) size of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub natural_width: u32,
    pub natural_height: u32,
    pub display_width: f64,
    pub display_height: f64,
}

impl Dimensions {
    pub fn new(natural_width: u32, natural_height: u32, display_width: f64, display_height: f64) -> Self {
        Self {
            natural_width,
            natural_height,
            display_width,
            display_height,
        }
    }

    /// Display size for an image shown at most `max_width` wide.
    ///
    /// Mirrors `max-width: 100%` layout: images are scaled down to fit but
    /// never scaled up.
    pub fn fit_width(natural_width: u32, natural_height: u32, max_width: f64) -> Self {
        let natural_w = natural_width as f64;
        let display_width = if max_width > 0.0 { natural_w.min(max_width) } else { natural_w };
        let display_height = if natural_w > 0.0 {
            natural_height as f64 * display_width / natural_w
        } else {
            0.0
        };
        Self::new(natural_width, natural_height, display_width, display_height)
    }

    /// Per-axis scale factors from display space to source space.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotReady`] while the display size is unknown
    /// (zero, negative or not finite).
    pub fn scale(&self) -> Result<(f64, f64)> {
        let ready = self.display_width.is_finite()
            && self.display_height.is_finite()
            && self.display_width > 0.0
            && self.display_height > 0.0
            && self.natural_width > 0
            && self.natural_height > 0;
        if !ready {
            return Err(AppError::NotReady);
        }
        Ok((
            self.natural_width as f64 / self.display_width,
            self.natural_height as f64 / self.display_height,
        ))
    }

    /// Whether [`Dimensions::scale`] would succeed.
    pub fn is_ready(&self) -> bool {
        self.scale().is_ok()
    }
}

/// Unit of a [`CropRect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropUnit {
    /// Percent of the display size (0..=100 on each axis).
    #[default]
    Percent,
    /// Display pixels.
    Pixels,
}

/// A crop rectangle in display space.
///
/// `aspect` is the ratio the rectangle is meant to have. It is attached
/// when the rectangle is created but only enforced by
/// [`crate::aspect::reconcile`] or at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub unit: CropUnit,
    pub aspect: Option<AspectRatio>,
}

impl CropRect {
    /// Creates a rectangle in display pixels.
    pub fn pixels(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            unit: CropUnit::Pixels,
            aspect: None,
        }
    }

    /// Creates a rectangle in percent of the display size.
    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            unit: CropUnit::Percent,
            aspect: None,
        }
    }

    pub fn with_aspect(mut self, aspect: AspectRatio) -> Self {
        self.aspect = Some(aspect);
        self
    }

    /// True when width or height is zero, negative or not a number.
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Extent of the display in this rectangle's unit.
    fn bounds(unit: CropUnit, dims: &Dimensions) -> (f64, f64) {
        match unit {
            CropUnit::Percent => (100.0, 100.0),
            CropUnit::Pixels => (dims.display_width, dims.display_height),
        }
    }

    /// Converts to display pixels. The display size must be known.
    pub fn to_pixels(&self, dims: &Dimensions) -> CropRect {
        match self.unit {
            CropUnit::Pixels => *self,
            CropUnit::Percent => {
                let fx = dims.display_width / 100.0;
                let fy = dims.display_height / 100.0;
                CropRect {
                    x: self.x * fx,
                    y: self.y * fy,
                    width: self.width * fx,
                    height: self.height * fy,
                    unit: CropUnit::Pixels,
                    aspect: self.aspect,
                }
            }
        }
    }

    /// Converts to percent of the display. The display size must be known.
    pub fn to_percent(&self, dims: &Dimensions) -> CropRect {
        match self.unit {
            CropUnit::Percent => *self,
            CropUnit::Pixels => {
                let fx = 100.0 / dims.display_width;
                let fy = 100.0 / dims.display_height;
                CropRect {
                    x: self.x * fx,
                    y: self.y * fy,
                    width: self.width * fx,
                    height: self.height * fy,
                    unit: CropUnit::Percent,
                    aspect: self.aspect,
                }
            }
        }
    }

    pub fn to_unit(&self, unit: CropUnit, dims: &Dimensions) -> CropRect {
        match unit {
            CropUnit::Pixels => self.to_pixels(dims),
            CropUnit::Percent => self.to_percent(dims),
        }
    }

    /// Clamps the rectangle into the display, keeping its unit.
    ///
    /// Offsets are pulled into range first, then width and height are cut
    /// to whatever space remains. The result may be empty.
    pub fn clamped(&self, dims: &Dimensions) -> CropRect {
        let (bound_w, bound_h) = Self::bounds(self.unit, dims);
        let x = finite_or_zero(self.x).clamp(0.0, bound_w.max(0.0));
        let y = finite_or_zero(self.y).clamp(0.0, bound_h.max(0.0));
        CropRect {
            x,
            y,
            width: finite_or_zero(self.width).max(0.0).min(bound_w - x),
            height: finite_or_zero(self.height).max(0.0).min(bound_h - y),
            unit: self.unit,
            aspect: self.aspect,
        }
    }

    /// Whether the rectangle lies inside the display (with a tiny
    /// tolerance for floating point error from unit conversions).
    pub fn fits(&self, dims: &Dimensions) -> bool {
        let (bound_w, bound_h) = Self::bounds(self.unit, dims);
        let slack_w = bound_w * FIT_TOLERANCE;
        let slack_h = bound_h * FIT_TOLERANCE;
        !self.is_empty()
            && self.x >= 0.0
            && self.y >= 0.0
            && self.x + self.width <= bound_w + slack_w
            && self.y + self.height <= bound_h + slack_h
    }

    /// Width over height measured in display pixels.
    pub fn pixel_ratio(&self, dims: &Dimensions) -> Option<f64> {
        let px = self.to_pixels(dims);
        (!px.is_empty()).then(|| px.width / px.height)
    }
}

/// Relative slack used by [`CropRect::fits`].
const FIT_TOLERANCE: f64 = 1e-9;

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Exact source region and output canvas size for a committed crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceCrop {
    /// Left edge in source pixels.
    pub sx: f64,
    /// Top edge in source pixels.
    pub sy: f64,
    /// Width in source pixels.
    pub sw: f64,
    /// Height in source pixels.
    pub sh: f64,
    /// Output raster width.
    pub ow: u32,
    /// Output raster height.
    pub oh: u32,
}

impl SourceCrop {
    pub fn aspect(&self) -> f64 {
        self.sw / self.sh
    }
}

/// Maps a display-space selection to exact source-pixel crop bounds.
///
/// The selection is clamped to the display, scaled per axis into source
/// space, and then one side is shrunk so that `sw / sh == target_aspect`:
/// a selection narrower than the target keeps its width, anything else
/// keeps its height. The selection never grows.
///
/// # Errors
///
/// - [`AppError::InvalidAspect`] if `target_aspect` is not positive and finite
/// - [`AppError::NotReady`] if the display size is not known yet
/// - [`AppError::IncompleteSelection`] if the selection has zero area
pub fn map_to_source_crop(dims: &Dimensions, crop: &CropRect, target_aspect: f64) -> Result<SourceCrop> {
    if !(target_aspect.is_finite() && target_aspect > 0.0) {
        return Err(AppError::InvalidAspect(target_aspect));
    }
    let (scale_x, scale_y) = dims.scale()?;

    let rect = crop.to_pixels(dims).clamped(dims);
    if rect.is_empty() {
        return Err(AppError::IncompleteSelection);
    }

    let natural_w = dims.natural_width as f64;
    let natural_h = dims.natural_height as f64;

    // A full-width selection can scale to a hair over the raster.
    let mut sw = (rect.width * scale_x).min(natural_w);
    let mut sh = (rect.height * scale_y).min(natural_h);
    if sw / sh < target_aspect {
        sh = sw / target_aspect;
    } else {
        sw = sh * target_aspect;
    }

    // Same for the offset; pull it back instead of touching the size.
    let sx = (rect.x * scale_x).min(natural_w - sw).max(0.0);
    let sy = (rect.y * scale_y).min(natural_h - sh).max(0.0);

    let mapped = SourceCrop {
        sx,
        sy,
        sw,
        sh,
        ow: (sw.round() as u32).max(1),
        oh: (sh.round() as u32).max(1),
    };
    tracing::debug!(
        scale_x,
        scale_y,
        target_aspect,
        ?mapped,
        "mapped display selection to source pixels"
    );
    Ok(mapped)
}
