pub mod canvas;
pub mod renderer;

pub use self::canvas::{Canvas, CanvasHandle};
pub use self::renderer::{DrawTarget, MediaRenderer, RenderError};
