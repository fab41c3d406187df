//! Rendering pipeline: engine, worker pool, and theme color state.

mod engine;
mod pool;
mod theme;

pub use engine::{colorize, MathMlEngine, RenderOptions, RenderResult, TypesetEngine};
pub use pool::RenderPool;
pub use theme::{ForegroundColor, Theme, ThemeColorTracker};
