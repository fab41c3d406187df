//! The typesetting engine: LaTeX math source in, MathML payload out.

use pulldown_latex::{
    config::DisplayMode, config::RenderConfig, mathml::push_mathml, Parser, Storage,
};

use crate::error::PreviewError;
use crate::render::ForegroundColor;

/// Options for a single render request.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Positive scale factor applied to the output.
    pub scale: f64,
    /// Foreground color captured at submission time.
    pub color: ForegroundColor,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            color: ForegroundColor::Light,
        }
    }
}

/// A completed render. The image is an opaque vector payload (MathML); it has
/// no identity beyond the request that produced it.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub image: String,
}

/// A reusable typesetting instance.
///
/// Implementations are owned one-per-worker by the render pool and invoked
/// sequentially; `typeset` runs on a blocking thread and may be CPU-heavy.
pub trait TypesetEngine: Send + 'static {
    fn typeset(&mut self, source: &str, options: &RenderOptions)
        -> Result<RenderResult, PreviewError>;
}

/// Production engine driving `pulldown-latex`.
#[derive(Debug, Default)]
pub struct MathMlEngine;

impl TypesetEngine for MathMlEngine {
    fn typeset(
        &mut self,
        source: &str,
        options: &RenderOptions,
    ) -> Result<RenderResult, PreviewError> {
        let storage = Storage::new();
        let parser = Parser::new(source, &storage);
        let config = RenderConfig {
            display_mode: DisplayMode::Block,
            ..Default::default()
        };

        // Collect events first so parse errors surface as diagnostics
        // instead of leaking into the output.
        let events: Vec<_> = parser.collect();
        let errors: Vec<String> = events
            .iter()
            .filter_map(|e| e.as_ref().err().map(|err| err.to_string()))
            .collect();
        if !errors.is_empty() {
            return Err(PreviewError::Render(errors.join("; ")));
        }

        let mut mathml = String::new();
        push_mathml(&mut mathml, events.into_iter(), config)
            .map_err(|e| PreviewError::Render(e.to_string()))?;

        Ok(RenderResult {
            image: apply_scale(&mathml, options.scale),
        })
    }
}

/// Color is injected into the math source itself (`\color{...}` resolves in
/// the engine); scale is applied to the finished payload.
pub fn colorize(source: &str, color: ForegroundColor) -> String {
    format!("{{\\color{{{}}}{}}}", color.hex(), source)
}

fn apply_scale(mathml: &str, scale: f64) -> String {
    if (scale - 1.0).abs() < f64::EPSILON {
        return mathml.to_string();
    }
    format!(r#"<span style="font-size: {scale:.2}em">{mathml}</span>"#)
}
