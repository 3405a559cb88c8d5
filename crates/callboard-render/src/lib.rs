//! Callboard Render Library
//!
//! Render-target abstraction for the Callboard whiteboard. The paint backend
//! lives behind [`RenderTarget`]; [`SurfaceRenderer`] feeds it the render
//! surface incrementally.

mod recording;
mod renderer;

pub use recording::{DrawCommand, RecordingTarget};
pub use renderer::{
    CompositeMode, RenderContext, RenderResult, RenderStats, RenderTarget, RendererError,
    SurfaceRenderer,
};
