//! Stroke data model: point-pair segments and the strokes built from them.

use kurbo::{BezPath, Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a stored stroke.
pub type StrokeId = Uuid;

/// Tolerance used when checking segment contiguity.
const CONTIGUITY_EPSILON: f64 = 1e-9;

/// Errors raised when validating stroke data.
#[derive(Debug, Error, PartialEq)]
pub enum StrokeError {
    #[error("stroke has no segments")]
    Empty,
    #[error("segment {index} does not start where the previous segment ends")]
    NotContiguous { index: usize },
    #[error("segment {index} has non-finite coordinates or width")]
    NonFinite { index: usize },
    #[error("segment {index} changes style mid-stroke")]
    StyleChanged { index: usize },
}

/// Packed `0xRRGGBB` color, or the eraser sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokeColor(pub u32);

impl StrokeColor {
    /// Sentinel marking a subtractive (eraser) segment. Outside the 24-bit RGB range.
    pub const ERASER: StrokeColor = StrokeColor(0xFFFF_FFFF);
    pub const BLACK: StrokeColor = StrokeColor(0x000000);

    /// Create from 8-bit channels.
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self((u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b))
    }

    /// Whether this color denotes the eraser.
    pub fn is_eraser(self) -> bool {
        self == Self::ERASER
    }

    /// Convert to a paint color. The eraser maps to opaque black, which only
    /// serves as coverage for the subtractive composite.
    pub fn to_color(self) -> Color {
        if self.is_eraser() {
            return Color::from_rgba8(0, 0, 0, 255);
        }
        let [_, r, g, b] = self.0.to_be_bytes();
        Color::from_rgba8(r, g, b, 255)
    }
}

impl Default for StrokeColor {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Tool state fixed for the duration of one gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: StrokeColor,
    /// Width in world units (already divided by the zoom at capture time).
    pub width: f64,
}

impl StrokeStyle {
    pub fn new(color: StrokeColor, width: f64) -> Self {
        Self { color, width }
    }

    pub fn is_eraser(&self) -> bool {
        self.color.is_eraser()
    }

    /// Exact style equality, used for batching.
    pub fn same_as(&self, other: &StrokeStyle) -> bool {
        self.color == other.color && self.width.to_bits() == other.width.to_bits()
    }
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: StrokeColor::BLACK,
            width: 2.0,
        }
    }
}

/// A single line primitive in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub x: f64,
    pub y: f64,
    pub prev_x: f64,
    pub prev_y: f64,
    pub color: StrokeColor,
    pub width: f64,
}

impl Segment {
    /// Create a segment from `from` to `to` with the given style.
    pub fn new(from: Point, to: Point, style: StrokeStyle) -> Self {
        Self {
            x: to.x,
            y: to.y,
            prev_x: from.x,
            prev_y: from.y,
            color: style.color,
            width: style.width,
        }
    }

    pub fn start(&self) -> Point {
        Point::new(self.prev_x, self.prev_y)
    }

    pub fn end(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn style(&self) -> StrokeStyle {
        StrokeStyle::new(self.color, self.width)
    }

    pub fn is_eraser(&self) -> bool {
        self.color.is_eraser()
    }

    /// True when all coordinates and the width are finite and the width is positive.
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.prev_x, self.prev_y, self.width]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
    }

    /// Whether this segment starts exactly where `previous` ends.
    pub fn continues(&self, previous: &Segment) -> bool {
        (self.prev_x - previous.x).abs() <= CONTIGUITY_EPSILON
            && (self.prev_y - previous.y).abs() <= CONTIGUITY_EPSILON
    }
}

/// Check the stroke invariants over a segment list.
pub fn validate_segments(segments: &[Segment]) -> Result<(), StrokeError> {
    let Some(first) = segments.first() else {
        return Err(StrokeError::Empty);
    };
    for (index, segment) in segments.iter().enumerate() {
        if !segment.is_well_formed() {
            return Err(StrokeError::NonFinite { index });
        }
        if index == 0 {
            continue;
        }
        if !segment.style().same_as(&first.style()) {
            return Err(StrokeError::StyleChanged { index });
        }
        if !segment.continues(&segments[index - 1]) {
            return Err(StrokeError::NotContiguous { index });
        }
    }
    Ok(())
}

/// One pointer-down to pointer-up gesture, the unit of submission and undo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    segments: Vec<Segment>,
}

impl Stroke {
    /// Build a stroke, enforcing non-emptiness and contiguity.
    pub fn new(segments: Vec<Segment>) -> Result<Self, StrokeError> {
        validate_segments(&segments)?;
        Ok(Self {
            id: Uuid::new_v4(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn style(&self) -> StrokeStyle {
        self.segments
            .first()
            .map(Segment::style)
            .unwrap_or_default()
    }

    /// Bounding box of the stroke's centerline.
    pub fn bounds(&self) -> Rect {
        let mut iter = self.segments.iter();
        let Some(first) = iter.next() else {
            return Rect::ZERO;
        };
        let mut rect = Rect::from_points(first.start(), first.end());
        for segment in iter {
            rect = rect.union_pt(segment.end());
        }
        rect
    }

    /// Polyline path through the stroke's points.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let Some(first) = self.segments.first() else {
            return path;
        };
        path.move_to(first.start());
        for segment in &self.segments {
            path.line_to(segment.end());
        }
        path
    }
}
