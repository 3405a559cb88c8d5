//! Stroke capture: turns raw pointer samples into contiguous segments.

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::stroke::{Segment, Stroke, StrokeError, StrokeStyle};

/// Minimum world-space distance between accepted samples without smoothing.
pub const DEFAULT_MIN_DISTANCE: f64 = 1.0;
/// Minimum world-space distance between accepted samples with smoothing.
pub const DEFAULT_MIN_DISTANCE_SMOOTHED: f64 = 3.0;

/// Capture tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Low-pass the path by drawing to the midpoint of consecutive samples.
    pub smoothing: bool,
    pub min_distance: f64,
    pub min_distance_smoothed: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            smoothing: true,
            min_distance: DEFAULT_MIN_DISTANCE,
            min_distance_smoothed: DEFAULT_MIN_DISTANCE_SMOOTHED,
        }
    }
}

impl CaptureConfig {
    pub fn with_smoothing(mut self, smoothing: bool) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_thresholds(mut self, raw: f64, smoothed: f64) -> Self {
        self.min_distance = raw;
        self.min_distance_smoothed = smoothed;
        self
    }

    /// Distance below which a sample is dropped.
    pub fn threshold(&self) -> f64 {
        if self.smoothing {
            self.min_distance_smoothed
        } else {
            self.min_distance
        }
    }
}

/// A finished gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedStroke {
    /// The closing segment emitted on release (already included in `segments`).
    pub terminal: Segment,
    pub segments: Vec<Segment>,
}

impl CapturedStroke {
    pub fn into_stroke(self) -> Result<Stroke, StrokeError> {
        Stroke::new(self.segments)
    }
}

#[derive(Debug, Clone)]
struct Gesture {
    style: StrokeStyle,
    last_raw: Point,
    last_rendered: Point,
    segments: Vec<Segment>,
}

impl Gesture {
    fn emit(&mut self, target: Point) -> Segment {
        let segment = Segment::new(self.last_rendered, target, self.style);
        self.last_rendered = target;
        self.segments.push(segment);
        segment
    }
}

/// Accumulates one gesture at a time.
#[derive(Debug, Clone, Default)]
pub struct StrokeCapture {
    config: CaptureConfig,
    gesture: Option<Gesture>,
}

impl StrokeCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            gesture: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CaptureConfig) {
        self.config = config;
    }

    pub fn is_active(&self) -> bool {
        self.gesture.is_some()
    }

    /// Style of the gesture in progress.
    pub fn active_style(&self) -> Option<StrokeStyle> {
        self.gesture.as_ref().map(|g| g.style)
    }

    /// Segments emitted so far by the gesture in progress.
    pub fn pending_segments(&self) -> &[Segment] {
        self.gesture
            .as_ref()
            .map(|g| g.segments.as_slice())
            .unwrap_or_default()
    }

    /// Start a gesture at a world-space point. Any unfinished gesture is dropped.
    pub fn begin(&mut self, point: Point, style: StrokeStyle) {
        if self.gesture.is_some() {
            log::debug!("discarding unfinished gesture");
        }
        self.gesture = Some(Gesture {
            style,
            last_raw: point,
            last_rendered: point,
            segments: Vec::new(),
        });
    }

    /// Feed a raw sample. Returns the emitted segment, if the sample qualified.
    pub fn extend(&mut self, point: Point) -> Option<Segment> {
        let threshold = self.config.threshold();
        let smoothing = self.config.smoothing;
        let gesture = self.gesture.as_mut()?;

        if !point.x.is_finite() || !point.y.is_finite() {
            return None;
        }
        if gesture.last_raw.distance(point) < threshold {
            return None;
        }

        let target = if smoothing {
            gesture.last_raw.midpoint(point)
        } else {
            point
        };
        gesture.last_raw = point;
        Some(gesture.emit(target))
    }

    /// End the gesture at `point`, always emitting a closing segment so the
    /// stroke reaches the release position (a lone dot when nothing moved).
    pub fn finish(&mut self, point: Point) -> Option<CapturedStroke> {
        let mut gesture = self.gesture.take()?;
        let end = if point.x.is_finite() && point.y.is_finite() {
            point
        } else {
            gesture.last_raw
        };
        let terminal = gesture.emit(end);
        Some(CapturedStroke {
            terminal,
            segments: gesture.segments,
        })
    }

    /// Abandon the current gesture without producing a stroke.
    pub fn cancel(&mut self) {
        self.gesture = None;
    }
}
