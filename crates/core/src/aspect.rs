//! Aspect ratios and crop reconciliation.
//!
//! [`reconcile`] is the only place a crop rectangle is reshaped to match a
//! ratio. It is a pure function and a second call with the same ratio
//! returns its input unchanged, so a widget that reports stale geometry
//! right after a ratio change converges on the next event instead of
//! oscillating.

use crate::error::{AppError, Result};
use crate::geometry::{CropRect, Dimensions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output aspect ratios offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    /// 1:1
    Square,
    /// 4:5
    #[default]
    Portrait,
    /// 16:9
    Landscape,
}

impl AspectRatio {
    /// Every selectable ratio, in menu order.
    pub const ALL: [AspectRatio; 3] = [Self::Square, Self::Portrait, Self::Landscape];

    /// Width divided by height.
    pub fn value(self) -> f64 {
        match self {
            Self::Square => 1.0,
            Self::Portrait => 4.0 / 5.0,
            Self::Landscape => 16.0 / 9.0,
        }
    }

    /// Short `W:H` label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "4:5",
            Self::Landscape => "16:9",
        }
    }

    /// Label with the human name, as shown in a ratio picker.
    pub fn description(self) -> &'static str {
        match self {
            Self::Square => "1:1 (Square)",
            Self::Portrait => "4:5 (Portrait)",
            Self::Landscape => "16:9 (Landscape)",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AspectRatio {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1:1" | "square" => Ok(Self::Square),
            "4:5" | "portrait" => Ok(Self::Portrait),
            "16:9" | "landscape" => Ok(Self::Landscape),
            other => Err(AppError::config(format!(
                "unknown aspect ratio '{other}' (expected 1:1, 4:5 or 16:9)"
            ))),
        }
    }
}

/// Fraction of the display width used by the default rectangle.
const DEFAULT_WIDTH_FRACTION: f64 = 0.5;

/// Relative tolerance under which a rectangle counts as already matching.
const RATIO_TOLERANCE: f64 = 1e-9;

/// The rectangle used when nothing better is known: half the display
/// width, `width / ratio` tall, centered. If that is taller than the
/// display, the full display height is used and the width follows.
///
/// The display size must be known. The result is in percent units.
pub fn default_rect(aspect: AspectRatio, dims: &Dimensions) -> CropRect {
    let ratio = aspect.value();
    let mut width = dims.display_width * DEFAULT_WIDTH_FRACTION;
    let mut height = width / ratio;
    if height > dims.display_height {
        height = dims.display_height;
        width = height * ratio;
    }
    let x = (dims.display_width - width) / 2.0;
    let y = (dims.display_height - height) / 2.0;
    CropRect::pixels(x, y, width, height)
        .with_aspect(aspect)
        .to_percent(dims)
}

fn matches_ratio(rect: &CropRect, ratio: f64, dims: &Dimensions) -> bool {
    rect.pixel_ratio(dims)
        .is_some_and(|actual| (actual - ratio).abs() <= RATIO_TOLERANCE * ratio)
}

/// Reshapes `current` to `aspect`, keeping as much of the user's choice as
/// possible.
///
/// Working in display pixels:
/// 1. keep the width and derive the height, if that still fits below;
/// 2. otherwise keep the height and derive the width, if that fits;
/// 3. otherwise take the largest rectangle of that ratio anchored at the
///    same top-left corner.
///
/// With no current rectangle (or an empty one) the [`default_rect`] is
/// returned. A rectangle that already has the ratio and fits the display
/// is returned as is, which makes the function idempotent. The result
/// keeps the unit of `current`. The display size must be known.
pub fn reconcile(current: Option<&CropRect>, aspect: AspectRatio, dims: &Dimensions) -> CropRect {
    let Some(current) = current.filter(|rect| !rect.is_empty()) else {
        return default_rect(aspect, dims);
    };
    let ratio = aspect.value();

    if current.fits(dims) && matches_ratio(current, ratio, dims) {
        return current.with_aspect(aspect);
    }

    let px = current.to_pixels(dims).clamped(dims);
    if px.is_empty() {
        return default_rect(aspect, dims).to_unit(current.unit, dims);
    }
    let (display_w, display_h) = (dims.display_width, dims.display_height);

    let (width, height) = if px.y + px.width / ratio <= display_h {
        (px.width, px.width / ratio)
    } else if px.x + px.height * ratio <= display_w {
        (px.height * ratio, px.height)
    } else {
        let width = (display_w - px.x).min((display_h - px.y) * ratio);
        (width, width / ratio)
    };

    let reconciled = CropRect::pixels(px.x, px.y, width, height)
        .with_aspect(aspect)
        .to_unit(current.unit, dims);
    tracing::debug!(%aspect, ?current, ?reconciled, "reconciled crop to aspect ratio");
    reconciled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CropUnit;

    fn dims() -> Dimensions {
        Dimensions::new(2000, 1000, 500.0, 250.0)
    }

    fn assert_ratio(rect: &CropRect, aspect: AspectRatio) {
        let actual = rect.pixel_ratio(&dims()).unwrap();
        assert!(
            (actual - aspect.value()).abs() <= 1e-9,
            "ratio {actual} != {}",
            aspect.value()
        );
    }

    #[test]
    fn parses_labels_and_names() {
        assert_eq!("1:1".parse::<AspectRatio>().unwrap(), AspectRatio::Square);
        assert_eq!("Portrait".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert_eq!(" 16:9 ".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert!("3:2".parse::<AspectRatio>().is_err());
        assert_eq!(AspectRatio::Landscape.to_string(), "16:9");
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn default_is_half_width_and_centered() {
        let rect = default_rect(AspectRatio::Landscape, &dims()).to_pixels(&dims());
        assert_close(rect.width, 250.0);
        assert_close(rect.height, 140.625);
        assert_close(rect.x, 125.0);
        assert_close(rect.y, 54.6875);
        assert_eq!(rect.aspect, Some(AspectRatio::Landscape));
    }

    #[test]
    fn default_falls_back_to_full_height() {
        // Half of 500 at 4:5 would be 312.5 tall, taller than 250.
        let rect = default_rect(AspectRatio::Portrait, &dims()).to_pixels(&dims());
        assert_close(rect.height, 250.0);
        assert_close(rect.width, 200.0);
        assert_close(rect.x, 150.0);
        assert_close(rect.y, 0.0);
    }

    #[test]
    fn default_rect_is_in_percent() {
        assert_eq!(default_rect(AspectRatio::Square, &dims()).unit, CropUnit::Percent);
    }

    #[test]
    fn missing_rect_yields_default() {
        assert_eq!(
            reconcile(None, AspectRatio::Square, &dims()),
            default_rect(AspectRatio::Square, &dims())
        );
    }

    #[test]
    fn holds_width_when_height_fits() {
        let rect = CropRect::pixels(10.0, 10.0, 160.0, 40.0);
        let out = reconcile(Some(&rect), AspectRatio::Square, &dims());
        assert_eq!(out, CropRect::pixels(10.0, 10.0, 160.0, 160.0).with_aspect(AspectRatio::Square));
    }

    #[test]
    fn holds_height_when_width_would_overflow() {
        // Holding width 300 at 1:1 needs 300 rows; only 200 remain.
        let rect = CropRect::pixels(0.0, 50.0, 300.0, 100.0);
        let out = reconcile(Some(&rect), AspectRatio::Square, &dims());
        assert_eq!(out, CropRect::pixels(0.0, 50.0, 100.0, 100.0).with_aspect(AspectRatio::Square));
    }

    #[test]
    fn oversized_rect_is_clamped_before_reshaping() {
        // Clamps to 100x50 at (400, 200); holding the width would need
        // 100 rows, so the height is held instead.
        let rect = CropRect::pixels(400.0, 200.0, 300.0, 300.0);
        let out = reconcile(Some(&rect), AspectRatio::Square, &dims());
        assert_eq!(out, CropRect::pixels(400.0, 200.0, 50.0, 50.0).with_aspect(AspectRatio::Square));
        assert!(out.fits(&dims()));
    }

    #[test]
    fn keeps_percent_unit() {
        let rect = CropRect::percent(0.0, 0.0, 20.0, 20.0);
        let out = reconcile(Some(&rect), AspectRatio::Landscape, &dims());
        assert_eq!(out.unit, CropUnit::Percent);
        assert_ratio(&out, AspectRatio::Landscape);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let rects = [
            CropRect::pixels(10.0, 10.0, 160.0, 40.0),
            CropRect::pixels(400.0, 200.0, 100.0, 10.0),
            CropRect::percent(33.3, 12.1, 41.7, 9.9),
            CropRect::percent(0.0, 0.0, 100.0, 100.0),
        ];
        for rect in &rects {
            for aspect in AspectRatio::ALL {
                let once = reconcile(Some(rect), aspect, &dims());
                let twice = reconcile(Some(&once), aspect, &dims());
                assert_eq!(once, twice, "{rect:?} at {aspect}");
            }
        }
    }

    #[test]
    fn switching_back_restores_held_width() {
        let start = CropRect::pixels(20.0, 20.0, 100.0, 100.0);
        let square = reconcile(Some(&start), AspectRatio::Square, &dims());
        let wide = reconcile(Some(&square), AspectRatio::Landscape, &dims());
        let back = reconcile(Some(&wide), AspectRatio::Square, &dims());
        assert_eq!(wide.width, square.width);
        assert_eq!(back.width, square.width);
        assert!((back.height - square.height).abs() < 1e-9);
    }

    #[test]
    fn switching_back_after_height_hold_keeps_ratio() {
        let start = CropRect::pixels(0.0, 0.0, 400.0, 225.0);
        let wide = reconcile(Some(&start), AspectRatio::Landscape, &dims());
        let portrait = reconcile(Some(&wide), AspectRatio::Portrait, &dims());
        let back = reconcile(Some(&portrait), AspectRatio::Landscape, &dims());
        assert_eq!(portrait.height, wide.height);
        assert_ratio(&back, AspectRatio::Landscape);
        assert!(back.fits(&dims()));
    }

    #[test]
    fn empty_rect_is_replaced_by_default() {
        let rect = CropRect::pixels(10.0, 10.0, 0.0, 0.0);
        assert_eq!(
            reconcile(Some(&rect), AspectRatio::Square, &dims()),
            default_rect(AspectRatio::Square, &dims())
        );
    }
}
