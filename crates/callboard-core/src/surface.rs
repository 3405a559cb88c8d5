//! Render surface: the client-local, rebuildable projection of the history.
//!
//! Segments are grouped into batches of identical style so the number of
//! paintable primitives follows the number of style changes rather than the
//! number of segments. The surface is never the source of truth; `replay`
//! rebuilds it from strokes and is the only canonical entry point.

use kurbo::{BezPath, Cap, Join, Stroke as StrokeParams};

use crate::stroke::{Segment, Stroke, StrokeStyle};

/// A run of same-style segments painted as one primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintBatch {
    style: StrokeStyle,
    segments: Vec<Segment>,
}

impl PaintBatch {
    fn new(segment: Segment) -> Self {
        Self {
            style: segment.style(),
            segments: vec![segment],
        }
    }

    pub fn style(&self) -> StrokeStyle {
        self.style
    }

    pub fn is_eraser(&self) -> bool {
        self.style.is_eraser()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path covering `segments[from..]`. Each segment gets its own subpath
    /// because batches can mix segments from different strokes.
    pub fn path_from(&self, from: usize) -> BezPath {
        let mut path = BezPath::new();
        for segment in self.segments.iter().skip(from) {
            path.move_to(segment.start());
            path.line_to(segment.end());
        }
        path
    }

    pub fn to_path(&self) -> BezPath {
        self.path_from(0)
    }

    /// Round-capped stroke parameters for this batch.
    pub fn stroke_params(&self) -> StrokeParams {
        StrokeParams::new(self.style.width)
            .with_caps(Cap::Round)
            .with_join(Join::Round)
    }
}

/// Ordered list of paint batches.
#[derive(Debug, Clone, Default)]
pub struct RenderSurface {
    batches: Vec<PaintBatch>,
    /// Bumped on every wipe so renderers know to start over.
    revision: u64,
    segment_count: usize,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one segment, extending the last batch when the style matches.
    pub fn paint_segment(&mut self, segment: &Segment) {
        match self.batches.last_mut() {
            Some(batch) if batch.style.same_as(&segment.style()) => {
                batch.segments.push(*segment);
            }
            _ => self.batches.push(PaintBatch::new(*segment)),
        }
        self.segment_count += 1;
    }

    /// Discard every batch.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.segment_count = 0;
        self.revision += 1;
    }

    /// Wipe, then paint every segment of every stroke in order.
    pub fn replay<'a, I>(&mut self, strokes: I)
    where
        I: IntoIterator<Item = &'a Stroke>,
    {
        self.clear();
        for stroke in strokes {
            for segment in stroke.segments() {
                self.paint_segment(segment);
            }
        }
    }

    pub fn batches(&self) -> &[PaintBatch] {
        &self.batches
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Whether two surfaces hold the same picture, ignoring revision counters.
    pub fn same_picture(&self, other: &RenderSurface) -> bool {
        self.batches == other.batches
    }
}
