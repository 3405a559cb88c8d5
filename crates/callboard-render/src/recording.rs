//! Headless render target that records every call.

use kurbo::{Affine, BezPath, Stroke};
use peniko::Color;

use crate::renderer::{CompositeMode, RenderResult, RenderTarget};

/// One recorded target call. Colors are kept as RGBA8.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    Clear {
        rgba: [u8; 4],
    },
    SetView(Affine),
    Stroke {
        path: BezPath,
        width: f64,
        rgba: [u8; 4],
        mode: CompositeMode,
    },
}

fn rgba(color: Color) -> [u8; 4] {
    let c = color.to_rgba8();
    [c.r, c.g, c.b, c.a]
}

/// Records commands instead of painting them.
#[derive(Debug, Default)]
pub struct RecordingTarget {
    commands: Vec<DrawCommand>,
    view: Affine,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Drain the recorded commands.
    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Current view transform.
    pub fn view(&self) -> Affine {
        self.view
    }

    pub fn stroke_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Stroke { .. }))
            .count()
    }
}

impl RenderTarget for RecordingTarget {
    fn clear(&mut self, background: Color) -> RenderResult<()> {
        self.commands.push(DrawCommand::Clear {
            rgba: rgba(background),
        });
        Ok(())
    }

    fn set_view(&mut self, transform: Affine) -> RenderResult<()> {
        self.view = transform;
        self.commands.push(DrawCommand::SetView(transform));
        Ok(())
    }

    fn stroke_path(
        &mut self,
        path: &BezPath,
        style: &Stroke,
        color: Color,
        mode: CompositeMode,
    ) -> RenderResult<()> {
        self.commands.push(DrawCommand::Stroke {
            path: path.clone(),
            width: style.width,
            rgba: rgba(color),
            mode,
        });
        Ok(())
    }
}
