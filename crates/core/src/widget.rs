//! Interactive crop widget capability and drag handling.
//!
//! The widget that draws the selection belongs to whatever front end hosts
//! the session. This module defines what the session expects from it and
//! turns raw pointer drags into crop rectangles.

use crate::geometry::{CropRect, Dimensions};
use crate::session::CropEvent;

/// Minimum distance (in display pixels) for a drag to count as a selection.
pub const MIN_SELECTION_DISTANCE: f64 = 10.0;

/// What an interactive rectangle widget reports.
///
/// Delivery is neither debounced nor monotonic: a widget may send stale
/// geometry, repeat itself or skip `Changed` entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WidgetEvent {
    /// The rectangle moved or resized during a drag.
    Changed(CropRect),
    /// The user released the rectangle.
    Completed(CropRect),
}

impl From<WidgetEvent> for CropEvent {
    fn from(event: WidgetEvent) -> Self {
        match event {
            WidgetEvent::Changed(rect) => CropEvent::CropChanged(rect),
            WidgetEvent::Completed(rect) => CropEvent::CropCompleted(rect),
        }
    }
}

/// An interactive rectangle widget.
pub trait CropWidget {
    /// Draws `crop` and reports any user interaction through `sink`.
    fn render(&mut self, crop: &CropRect, sink: &mut dyn FnMut(WidgetEvent));
}

/// A point in display pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Determines if a drag operation should be considered a valid selection.
///
/// A selection is valid if the start and end points are far enough apart
/// to indicate intentional selection rather than an accidental click.
pub fn is_valid_selection(start: Point, end: Point) -> bool {
    start.distance(end) > MIN_SELECTION_DISTANCE
}

/// Builds a pixel rectangle from two opposite corners, clamped to the
/// display.
///
/// Users can drag in any direction, so the corners may come in any order.
pub fn normalize_selection(start: Point, end: Point, dims: &Dimensions) -> CropRect {
    let x = start.x.min(end.x);
    let y = start.y.min(end.y);
    CropRect::pixels(x, y, (start.x - end.x).abs(), (start.y - end.y).abs()).clamped(dims)
}

/// Result of feeding one pointer sample to a [`DragTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionEvent {
    /// User started a new selection drag.
    Started,
    /// User is actively dragging.
    Dragging(CropRect),
    /// User completed a valid selection.
    Completed(CropRect),
    /// User completed a drag but it was too small.
    Cancelled,
    /// No selection event occurred.
    None,
}

impl SelectionEvent {
    /// The widget event this selection event maps to, if any.
    pub fn widget_event(self) -> Option<WidgetEvent> {
        match self {
            Self::Dragging(rect) => Some(WidgetEvent::Changed(rect)),
            Self::Completed(rect) => Some(WidgetEvent::Completed(rect)),
            Self::Started | Self::Cancelled | Self::None => None,
        }
    }
}

/// Tracks a pointer drag and produces selection rectangles.
#[derive(Debug, Clone, Default)]
pub struct DragTracker {
    start: Option<Point>,
    current: Option<Point>,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.start.is_some()
    }

    pub fn press(&mut self, pos: Point) -> SelectionEvent {
        self.start = Some(pos);
        self.current = Some(pos);
        SelectionEvent::Started
    }

    pub fn drag(&mut self, pos: Point, dims: &Dimensions) -> SelectionEvent {
        let Some(start) = self.start else {
            return SelectionEvent::None;
        };
        self.current = Some(pos);
        SelectionEvent::Dragging(normalize_selection(start, pos, dims))
    }

    pub fn release(&mut self, dims: &Dimensions) -> SelectionEvent {
        let (Some(start), Some(end)) = (self.start.take(), self.current.take()) else {
            return SelectionEvent::None;
        };
        if is_valid_selection(start, end) {
            SelectionEvent::Completed(normalize_selection(start, end, dims))
        } else {
            SelectionEvent::Cancelled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dimensions {
        Dimensions::new(1000, 500, 500.0, 250.0)
    }

    #[test]
    fn drag_in_any_direction_normalizes() {
        let rect = normalize_selection(Point::new(200.0, 150.0), Point::new(100.0, 50.0), &dims());
        assert_eq!(rect, CropRect::pixels(100.0, 50.0, 100.0, 100.0));
    }

    #[test]
    fn drag_past_edge_is_clamped() {
        let rect = normalize_selection(Point::new(400.0, 200.0), Point::new(700.0, 400.0), &dims());
        assert_eq!(rect, CropRect::pixels(400.0, 200.0, 100.0, 50.0));
    }

    #[test]
    fn full_drag_cycle() {
        let mut tracker = DragTracker::new();
        assert_eq!(tracker.press(Point::new(10.0, 10.0)), SelectionEvent::Started);
        assert!(tracker.is_dragging());
        let dragging = tracker.drag(Point::new(60.0, 40.0), &dims());
        assert_eq!(
            dragging.widget_event(),
            Some(WidgetEvent::Changed(CropRect::pixels(10.0, 10.0, 50.0, 30.0)))
        );
        let done = tracker.release(&dims());
        assert_eq!(done, SelectionEvent::Completed(CropRect::pixels(10.0, 10.0, 50.0, 30.0)));
        assert!(!tracker.is_dragging());
    }

    #[test]
    fn click_is_cancelled() {
        let mut tracker = DragTracker::new();
        tracker.press(Point::new(10.0, 10.0));
        tracker.drag(Point::new(13.0, 12.0), &dims());
        assert_eq!(tracker.release(&dims()), SelectionEvent::Cancelled);
        assert_eq!(SelectionEvent::Cancelled.widget_event(), None);
    }

    #[test]
    fn drag_without_press_is_ignored() {
        let mut tracker = DragTracker::new();
        assert_eq!(tracker.drag(Point::new(5.0, 5.0), &dims()), SelectionEvent::None);
        assert_eq!(tracker.release(&dims()), SelectionEvent::None);
    }

    #[test]
    fn widget_events_become_crop_events() {
        let rect = CropRect::pixels(1.0, 2.0, 3.0, 4.0);
        assert_eq!(CropEvent::from(WidgetEvent::Changed(rect)), CropEvent::CropChanged(rect));
        assert_eq!(CropEvent::from(WidgetEvent::Completed(rect)), CropEvent::CropCompleted(rect));
    }
}
