//! Preview coordination: hover-on-math and hover-on-reference flows.
//!
//! The coordinator owns the macro scanner, the render pool, the theme color
//! state, and the projected-document cache, and composes them into the two
//! public flows. Structural misses (no region at the position, unknown
//! label, unreadable referenced file) are `Preview::Unavailable`, a
//! first-class outcome distinct from errors.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Position;

use crate::document::{Document, DocumentStore, ProjectedCache};
use crate::error::PreviewError;
use crate::math::{annotate, find_by_label, find_innermost, MacroScanner};
use crate::render::{
    colorize, ForegroundColor, MathMlEngine, RenderOptions, RenderPool, ThemeColorTracker,
    TypesetEngine,
};
use crate::settings::PreviewConfig;

/// A resolved cross-reference, supplied by the host's reference index.
#[derive(Debug, Clone)]
pub struct ReferenceTarget {
    /// File the referenced label lives in; may not be open in the host.
    pub file: PathBuf,
    /// Position of the label in that file, if the index knows it.
    pub position: Option<Position>,
    pub label: String,
    /// Plain documentation text the host falls back to without a preview.
    pub documentation: Option<String>,
    /// Equation number assigned at the last compile, if any.
    pub previous_compile_number: Option<u32>,
}

/// Outcome of a preview request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Rendered {
        /// Opaque vector payload from the typesetting engine.
        image: String,
        /// Human-readable numbering note, reference flow only.
        note: Option<String>,
    },
    /// Nothing to show; the caller falls back to plain text.
    Unavailable,
}

/// Owns the preview pipeline and exposes the two hover flows.
pub struct PreviewCoordinator {
    config: PreviewConfig,
    macros: MacroScanner,
    pool: RenderPool,
    theme: ThemeColorTracker,
    projected: ProjectedCache,
    documents: Arc<DocumentStore>,
}

impl PreviewCoordinator {
    /// Build a coordinator with the production MathML engine.
    pub fn new(config: PreviewConfig, documents: Arc<DocumentStore>) -> Self {
        Self::with_engine(config, documents, || MathMlEngine)
    }

    /// Build a coordinator with a custom engine factory (used by tests).
    pub fn with_engine<E, F>(config: PreviewConfig, documents: Arc<DocumentStore>, factory: F) -> Self
    where
        E: TypesetEngine,
        F: Fn() -> E + Send + Sync + 'static,
    {
        let pool = RenderPool::new(config.pool_size, factory);
        let macros = MacroScanner::new(config.macro_roots.clone());
        let theme = ThemeColorTracker::new(config.theme);
        Self {
            config,
            macros,
            pool,
            theme,
            projected: ProjectedCache::new(),
            documents,
        }
    }

    pub fn theme(&self) -> &ThemeColorTracker {
        &self.theme
    }

    pub fn macros(&self) -> &MacroScanner {
        &self.macros
    }

    /// Render the innermost math region containing `offset`, with a cursor
    /// marker at the hover position.
    ///
    /// `macro_override` replaces the scanned preamble when supplied.
    pub async fn hover_on_math(
        &self,
        doc: &Document,
        offset: usize,
        macro_override: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Preview, PreviewError> {
        let Some(region) = find_innermost(doc.text(), offset) else {
            return Ok(Preview::Unavailable);
        };

        // The color snapshot taken here is what this request renders with,
        // even if the theme flips before the pool gets to it.
        let color = self.theme.current_color();
        let annotated = annotate(&region, offset, color);

        let preamble = match macro_override {
            Some(text) => text.to_string(),
            None => self.macros.preamble(cancel).await?.text.clone(),
        };

        let source = compose_source(&preamble, &annotated, color);
        let result = self
            .pool
            .typeset(source, self.render_options(color), cancel)
            .await?;
        Ok(Preview::Rendered {
            image: result.image,
            note: None,
        })
    }

    /// Render the math region labeled by `target` in its owning file, which
    /// is loaded from disk if the host does not have it open.
    pub async fn hover_on_reference(
        &self,
        target: &ReferenceTarget,
        cancel: &CancellationToken,
    ) -> Result<Preview, PreviewError> {
        if !self.config.reference_previews {
            return Ok(Preview::Unavailable);
        }

        let doc = match self.documents.get_by_path(&target.file) {
            Some(doc) => doc,
            None => match self.projected.load(&target.file, cancel).await {
                Some(doc) => doc,
                None if cancel.is_cancelled() => return Err(PreviewError::Cancelled),
                None => return Ok(Preview::Unavailable),
            },
        };

        let Some(region) = find_by_label(doc.text(), &target.label) else {
            tracing::debug!(label = %target.label, file = %target.file.display(), "label not found");
            return Ok(Preview::Unavailable);
        };

        let color = self.theme.current_color();
        let preamble = self.macros.preamble(cancel).await?.text.clone();
        // No cursor concept applies to a remote reference.
        let source = compose_source(&preamble, &region.text, color);
        let result = self
            .pool
            .typeset(source, self.render_options(color), cancel)
            .await?;

        let note = target
            .previous_compile_number
            .filter(|_| self.config.numbering_notes)
            .map(|n| format!("Numbered ({n}) at last compile"));
        Ok(Preview::Rendered {
            image: result.image,
            note,
        })
    }

    fn render_options(&self, color: ForegroundColor) -> RenderOptions {
        RenderOptions {
            scale: self.config.scale,
            color,
        }
    }
}

/// Prepend the macro preamble and scope the foreground color around the body.
fn compose_source(preamble: &str, body: &str, color: ForegroundColor) -> String {
    let colored = colorize(body, color);
    if preamble.is_empty() {
        colored
    } else {
        format!("{preamble}\n{colored}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RenderResult, Theme};
    use crate::settings::PreviewConfig;

    /// Engine that returns its input, so tests can inspect the composed
    /// source actually submitted to the pool.
    struct EchoEngine;

    impl TypesetEngine for EchoEngine {
        fn typeset(
            &mut self,
            source: &str,
            _options: &RenderOptions,
        ) -> Result<RenderResult, PreviewError> {
            Ok(RenderResult {
                image: source.to_string(),
            })
        }
    }

    fn coordinator(config: PreviewConfig) -> PreviewCoordinator {
        PreviewCoordinator::with_engine(config, Arc::new(DocumentStore::new()), || EchoEngine)
    }

    fn config_with_roots(roots: Vec<PathBuf>) -> PreviewConfig {
        PreviewConfig {
            macro_roots: roots,
            ..PreviewConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hover_on_math_renders_innermost_region() {
        let coordinator = coordinator(config_with_roots(vec![]));
        let doc = Document::live("Let $x=1$ and \\[y=2\\]".to_string(), 0);
        let cancel = CancellationToken::new();

        // Cursor on the opening `x`, so the marker lands before the content.
        let preview = coordinator
            .hover_on_math(&doc, 5, Some(""), &cancel)
            .await
            .unwrap();
        let Preview::Rendered { image, note } = preview else {
            panic!("expected a rendered preview");
        };
        assert!(image.contains("x=1"));
        assert!(image.contains("\\rule"), "cursor marker missing: {image}");
        assert_eq!(note, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hover_outside_math_is_unavailable() {
        let coordinator = coordinator(config_with_roots(vec![]));
        let doc = Document::live("Let $x=1$".to_string(), 0);
        let cancel = CancellationToken::new();

        let preview = coordinator
            .hover_on_math(&doc, 1, Some(""), &cancel)
            .await
            .unwrap();
        assert_eq!(preview, Preview::Unavailable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scanned_preamble_is_prepended() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("defs.sty"), "\\newcommand{\\half}{h}").unwrap();
        let coordinator = coordinator(config_with_roots(vec![dir.path().to_path_buf()]));
        let doc = Document::live("$\\half$".to_string(), 0);
        let cancel = CancellationToken::new();

        let Preview::Rendered { image, .. } = coordinator
            .hover_on_math(&doc, 2, None, &cancel)
            .await
            .unwrap()
        else {
            panic!("expected a rendered preview");
        };
        assert!(image.starts_with("\\newcommand{\\half}{h}"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reference_preview_from_unopened_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chapter.tex");
        std::fs::write(
            &file,
            "intro\n\\begin{equation}\\label{eq:z} z=3 \\end{equation}\n",
        )
        .unwrap();

        let coordinator = coordinator(config_with_roots(vec![]));
        let target = ReferenceTarget {
            file,
            position: None,
            label: "eq:z".into(),
            documentation: None,
            previous_compile_number: Some(4),
        };
        let cancel = CancellationToken::new();

        let Preview::Rendered { image, note } = coordinator
            .hover_on_reference(&target, &cancel)
            .await
            .unwrap()
        else {
            panic!("expected a rendered preview");
        };
        assert!(image.contains("\\begin{equation}"));
        assert!(!image.contains("\\rule"), "reference previews have no cursor");
        assert_eq!(note.as_deref(), Some("Numbered (4) at last compile"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reference_prefers_live_document() {
        let store = Arc::new(DocumentStore::new());
        let path = PathBuf::from("/virtual/open.tex");
        let uri = tower_lsp::lsp_types::Url::from_file_path(&path).unwrap();
        store.open(
            uri,
            "\\begin{equation}\\label{eq:live} q \\end{equation}".to_string(),
            1,
        );

        let coordinator = PreviewCoordinator::with_engine(
            config_with_roots(vec![]),
            store,
            || EchoEngine,
        );
        let target = ReferenceTarget {
            file: path,
            position: None,
            label: "eq:live".into(),
            documentation: None,
            previous_compile_number: None,
        };
        let cancel = CancellationToken::new();

        // The file does not exist on disk; only the live buffer has it.
        let preview = coordinator
            .hover_on_reference(&target, &cancel)
            .await
            .unwrap();
        assert!(matches!(preview, Preview::Rendered { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_label_is_unavailable_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chapter.tex");
        std::fs::write(&file, "$x$ no labels here").unwrap();

        let coordinator = coordinator(config_with_roots(vec![]));
        let target = ReferenceTarget {
            file,
            position: None,
            label: "eq:absent".into(),
            documentation: Some("eq. (1)".into()),
            previous_compile_number: None,
        };
        let cancel = CancellationToken::new();

        let preview = coordinator
            .hover_on_reference(&target, &cancel)
            .await
            .unwrap();
        assert_eq!(preview, Preview::Unavailable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreadable_file_is_unavailable_not_error() {
        let coordinator = coordinator(config_with_roots(vec![]));
        let target = ReferenceTarget {
            file: PathBuf::from("/nonexistent/chapter.tex"),
            position: None,
            label: "eq:1".into(),
            documentation: None,
            previous_compile_number: None,
        };
        let cancel = CancellationToken::new();

        let preview = coordinator
            .hover_on_reference(&target, &cancel)
            .await
            .unwrap();
        assert_eq!(preview, Preview::Unavailable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disabled_reference_previews_short_circuit() {
        let config = PreviewConfig {
            reference_previews: false,
            ..config_with_roots(vec![])
        };
        let coordinator = coordinator(config);
        let target = ReferenceTarget {
            file: PathBuf::from("/anywhere.tex"),
            position: None,
            label: "eq:1".into(),
            documentation: None,
            previous_compile_number: None,
        };
        let cancel = CancellationToken::new();

        let preview = coordinator
            .hover_on_reference(&target, &cancel)
            .await
            .unwrap();
        assert_eq!(preview, Preview::Unavailable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn theme_toggle_changes_color_of_later_requests() {
        let config = PreviewConfig {
            theme: Theme::Light,
            ..config_with_roots(vec![])
        };
        let coordinator = coordinator(config);
        let doc = Document::live("$x$".to_string(), 0);
        let cancel = CancellationToken::new();

        let Preview::Rendered { image: before, .. } = coordinator
            .hover_on_math(&doc, 1, Some(""), &cancel)
            .await
            .unwrap()
        else {
            panic!("expected a rendered preview");
        };
        assert!(before.contains(ForegroundColor::Dark.hex()));

        coordinator.theme().set_theme(Theme::Dark);
        let Preview::Rendered { image: after, .. } = coordinator
            .hover_on_math(&doc, 1, Some(""), &cancel)
            .await
            .unwrap()
        else {
            panic!("expected a rendered preview");
        };
        assert!(after.contains(ForegroundColor::Light.hex()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_hover_propagates_cancellation() {
        let coordinator = coordinator(config_with_roots(vec![]));
        let doc = Document::live("$x$".to_string(), 0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator
            .hover_on_math(&doc, 1, Some(""), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
