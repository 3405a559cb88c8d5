//! Renderer trait abstraction.

use callboard_core::camera::Camera;
use callboard_core::surface::{PaintBatch, RenderSurface};
use kurbo::{Affine, BezPath, Stroke};
use peniko::Color;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Initialization failed: {0}")]
    InitFailed(String),
    #[error("Render failed: {0}")]
    RenderFailed(String),
    #[error("Surface error: {0}")]
    Surface(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// How a primitive combines with what is already painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeMode {
    /// Source over.
    #[default]
    Paint,
    /// Remove coverage from earlier primitives, revealing the background.
    Erase,
}

/// A paint backend.
///
/// Primitives are persistent: once stroked they stay until `clear`. The view
/// transform applies to everything already on the target.
pub trait RenderTarget {
    /// Drop every primitive and fill with the background.
    fn clear(&mut self, background: Color) -> RenderResult<()>;

    /// Set the world-to-device transform.
    fn set_view(&mut self, transform: Affine) -> RenderResult<()>;

    /// Add a stroked path in world coordinates.
    fn stroke_path(
        &mut self,
        path: &BezPath,
        style: &Stroke,
        color: Color,
        mode: CompositeMode,
    ) -> RenderResult<()>;
}

/// Context for a single render frame.
pub struct RenderContext<'a> {
    pub surface: &'a RenderSurface,
    pub camera: &'a Camera,
    /// Device pixel ratio (for HiDPI).
    pub scale_factor: f64,
    pub background_color: Color,
}

impl<'a> RenderContext<'a> {
    /// Create a new render context.
    pub fn new(surface: &'a RenderSurface, camera: &'a Camera) -> Self {
        Self {
            surface,
            camera,
            scale_factor: 1.0,
            background_color: Color::from_rgba8(255, 255, 255, 255),
        }
    }

    /// Set the scale factor for HiDPI.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    /// World to device pixels, relative to the target's top-left corner.
    pub fn view_transform(&self) -> Affine {
        Affine::scale(self.scale_factor) * self.camera.view_transform()
    }
}

/// What one `render` call issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Whether the target was cleared and fully repainted.
    pub full_redraw: bool,
    /// Primitives issued.
    pub primitives: usize,
    /// Segments covered by those primitives.
    pub segments: usize,
}

/// Position in the surface up to which primitives have been issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    revision: u64,
    batch: usize,
    offset: usize,
}

/// Feeds a [`RenderSurface`] to a [`RenderTarget`].
///
/// Only segments added since the previous call are issued, unless the
/// surface was wiped in between, in which case the target is cleared and
/// everything is issued again.
#[derive(Debug, Default)]
pub struct SurfaceRenderer {
    cursor: Option<Cursor>,
}

impl SurfaceRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next `render` to repaint from scratch (e.g. after the
    /// backend lost its contents).
    pub fn invalidate(&mut self) {
        self.cursor = None;
    }

    pub fn render<T: RenderTarget + ?Sized>(
        &mut self,
        ctx: &RenderContext,
        target: &mut T,
    ) -> RenderResult<RenderStats> {
        let surface = ctx.surface;
        let batches = surface.batches();

        let resume = self.cursor.filter(|c| {
            c.revision == surface.revision()
                && (c.batch < batches.len() || (c.batch == batches.len() && c.offset == 0))
                && batches.get(c.batch).is_none_or(|b| c.offset <= b.len())
        });

        let mut stats = RenderStats::default();
        let (first_batch, mut offset) = match resume {
            Some(cursor) => (cursor.batch, cursor.offset),
            None => {
                target.clear(ctx.background_color)?;
                stats.full_redraw = true;
                (0, 0)
            }
        };
        target.set_view(ctx.view_transform())?;

        for batch in batches.iter().skip(first_batch) {
            if offset < batch.len() {
                issue(target, batch, offset)?;
                stats.primitives += 1;
                stats.segments += batch.len() - offset;
            }
            offset = 0;
        }

        self.cursor = Some(match batches.last() {
            Some(last) => Cursor {
                revision: surface.revision(),
                batch: batches.len() - 1,
                offset: last.len(),
            },
            None => Cursor {
                revision: surface.revision(),
                batch: 0,
                offset: 0,
            },
        });

        if stats.primitives > 0 {
            log::trace!(
                "Issued {} primitives ({} segments, full redraw: {})",
                stats.primitives,
                stats.segments,
                stats.full_redraw
            );
        }
        Ok(stats)
    }
}

fn issue<T: RenderTarget + ?Sized>(target: &mut T, batch: &PaintBatch, from: usize) -> RenderResult<()> {
    let style = batch.style();
    let mode = if style.is_eraser() {
        CompositeMode::Erase
    } else {
        CompositeMode::Paint
    };
    target.stroke_path(&batch.path_from(from), &batch.stroke_params(), style.color.to_color(), mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{DrawCommand, RecordingTarget};
    use callboard_core::stroke::{Segment, Stroke as BoardStroke, StrokeColor, StrokeStyle};
    use kurbo::{Point, Vec2};

    fn segment(i: usize, style: StrokeStyle) -> Segment {
        let x = i as f64 * 10.0;
        Segment::new(Point::new(x, 0.0), Point::new(x + 10.0, 0.0), style)
    }

    fn strokes_of(commands: &[DrawCommand]) -> Vec<(usize, CompositeMode)> {
        commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Stroke { path, mode, .. } => Some((path.elements().len() / 2, *mode)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_render_is_full() {
        let mut surface = RenderSurface::new();
        for i in 0..3 {
            surface.paint_segment(&segment(i, StrokeStyle::default()));
        }
        let camera = Camera::new();
        let mut target = RecordingTarget::new();
        let mut renderer = SurfaceRenderer::new();

        let stats = renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();
        assert!(stats.full_redraw);
        assert_eq!(stats.primitives, 1);
        assert_eq!(stats.segments, 3);
        assert!(matches!(target.commands()[0], DrawCommand::Clear { .. }));
        assert_eq!(strokes_of(target.commands()), vec![(3, CompositeMode::Paint)]);
    }

    #[test]
    fn test_incremental_render_issues_only_new_segments() {
        let mut surface = RenderSurface::new();
        let camera = Camera::new();
        let mut target = RecordingTarget::new();
        let mut renderer = SurfaceRenderer::new();

        surface.paint_segment(&segment(0, StrokeStyle::default()));
        renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();
        target.take();

        surface.paint_segment(&segment(1, StrokeStyle::default()));
        surface.paint_segment(&segment(2, StrokeStyle::new(StrokeColor::ERASER, 8.0)));
        let stats = renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();
        assert!(!stats.full_redraw);
        assert_eq!(stats.segments, 2);
        assert_eq!(
            strokes_of(target.commands()),
            vec![(1, CompositeMode::Paint), (1, CompositeMode::Erase)]
        );

        target.take();
        let stats = renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();
        assert_eq!(stats.primitives, 0);
        assert!(strokes_of(target.commands()).is_empty());
    }

    #[test]
    fn test_wipe_forces_full_redraw() {
        let mut surface = RenderSurface::new();
        let camera = Camera::new();
        let mut target = RecordingTarget::new();
        let mut renderer = SurfaceRenderer::new();

        let stroke = BoardStroke::new((0..4).map(|i| segment(i, StrokeStyle::default())).collect())
            .unwrap();
        surface.replay([&stroke]);
        renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();

        surface.replay([&stroke]);
        target.take();
        let stats = renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();
        assert!(stats.full_redraw);
        assert_eq!(stats.segments, 4);

        surface.clear();
        target.take();
        let stats = renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();
        assert!(stats.full_redraw);
        assert_eq!(stats.primitives, 0);
        assert_eq!(target.commands().len(), 2);
    }

    #[test]
    fn test_view_follows_camera_without_reissuing() {
        let mut surface = RenderSurface::new();
        surface.paint_segment(&segment(0, StrokeStyle::default()));
        let mut camera = Camera::new();
        let mut target = RecordingTarget::new();
        let mut renderer = SurfaceRenderer::new();
        renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();

        camera.pan(Vec2::new(40.0, 0.0));
        target.take();
        renderer
            .render(
                &RenderContext::new(&surface, &camera).with_scale_factor(2.0),
                &mut target,
            )
            .unwrap();
        assert_eq!(target.commands().len(), 1);
        match &target.commands()[0] {
            DrawCommand::SetView(transform) => {
                assert_eq!(*transform * Point::new(0.0, 0.0), Point::new(80.0, 0.0));
            }
            other => panic!("expected view change, got {other:?}"),
        }
    }

    #[test]
    fn test_view_ignores_surface_page_origin() {
        let mut surface = RenderSurface::new();
        surface.paint_segment(&segment(0, StrokeStyle::default()));
        let camera = Camera::with_viewport(Vec2::new(100.0, 50.0), kurbo::Size::new(400.0, 200.0));
        let mut target = RecordingTarget::new();
        let mut renderer = SurfaceRenderer::new();
        renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();

        let pointer = camera.screen_to_world(Point::new(150.0, 80.0));
        let view = target
            .commands()
            .iter()
            .find_map(|c| match c {
                DrawCommand::SetView(transform) => Some(*transform),
                _ => None,
            })
            .expect("view is set on a full redraw");
        assert_eq!(view * pointer, Point::new(50.0, 30.0));
    }

    #[test]
    fn test_invalidate_repaints() {
        let mut surface = RenderSurface::new();
        surface.paint_segment(&segment(0, StrokeStyle::default()));
        let camera = Camera::new();
        let mut target = RecordingTarget::new();
        let mut renderer = SurfaceRenderer::new();
        renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();
        renderer.invalidate();
        let stats = renderer
            .render(&RenderContext::new(&surface, &camera), &mut target)
            .unwrap();
        assert!(stats.full_redraw);
        assert_eq!(target.stroke_count(), 2);
    }
}
