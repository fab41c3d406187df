//! LaTeX math preview language server.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock, OnceLock};

use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};

pub mod document;
pub mod error;
pub mod math;
pub mod preview;
pub mod render;
pub mod settings;

pub use document::{Document, DocumentStore, LineIndex};
pub use error::PreviewError;
pub use preview::{Preview, PreviewCoordinator, ReferenceTarget};
pub use settings::{discover_settings, load_settings, PreviewConfig};

use render::Theme;

/// Definition commands whose presence in changed text invalidates the macro
/// preamble cache. Ordinary edits never trigger a rescan.
static MACRO_DEF_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:(?:new|renew|provide)command|DeclareMathOperator|def\\)").unwrap()
});

/// Parameters of the `texpreview/referencePreview` custom request, sent by
/// the host when the user hovers a `\ref`-like reference it has resolved.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencePreviewParams {
    pub file: PathBuf,
    pub label: String,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub previous_compile_number: Option<u32>,
}

pub struct Backend {
    client: Client,
    documents: Arc<DocumentStore>,
    preview: OnceLock<Arc<PreviewCoordinator>>,
    /// Token of the most recent hover; superseded hovers are cancelled.
    hover_cancel: std::sync::Mutex<Option<CancellationToken>>,
}

impl Backend {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            documents: Arc::new(DocumentStore::new()),
            preview: OnceLock::new(),
            hover_cancel: std::sync::Mutex::new(None),
        }
    }

    fn on_document_change(&self, uri: Url, text: String, version: i32) {
        let invalidate = MACRO_DEF_TOKENS.is_match(&text);
        self.documents.open(uri, text, version);
        if invalidate {
            if let Some(preview) = self.preview.get() {
                preview.macros().invalidate();
            }
        }
    }

    /// Replace the active hover token with a fresh one, cancelling the
    /// previous in-flight hover.
    fn begin_hover(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut slot = match self.hover_cancel.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = slot.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn hover_from_preview(&self, preview: Preview, range: Option<Range>) -> Option<Hover> {
        match preview {
            Preview::Rendered { image, note } => {
                let mut value = image;
                if let Some(note) = note {
                    value.push_str("\n\n_");
                    value.push_str(&note);
                    value.push('_');
                }
                Some(Hover {
                    contents: HoverContents::Markup(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value,
                    }),
                    range,
                })
            }
            Preview::Unavailable => None,
        }
    }

    /// Handler for `texpreview/referencePreview`.
    pub(crate) async fn reference_preview(
        &self,
        params: ReferencePreviewParams,
    ) -> Result<Option<Hover>> {
        let Some(coordinator) = self.preview.get() else {
            return Ok(None);
        };
        let target = ReferenceTarget {
            file: params.file,
            position: params.position,
            label: params.label,
            documentation: params.documentation,
            previous_compile_number: params.previous_compile_number,
        };

        let cancel = self.begin_hover();
        match coordinator.hover_on_reference(&target, &cancel).await {
            Ok(preview) => Ok(self.hover_from_preview(preview, None)),
            Err(PreviewError::Render(diag)) => {
                tracing::debug!(%diag, "reference preview failed to typeset");
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Extract workspace root from params
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        let config = match workspace_root {
            Some(root) => {
                let (settings, settings_dir) = settings::discover_settings(&root);
                settings.resolve(&settings_dir)
            }
            None => PreviewConfig::default(),
        };
        let _ = self.preview.set(Arc::new(PreviewCoordinator::new(
            config,
            Arc::clone(&self.documents),
        )));

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "TeX preview server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.on_document_change(
            params.text_document.uri,
            params.text_document.text,
            params.text_document.version,
        );
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // We use FULL sync, so there's exactly one change with the full text
        if let Some(change) = params.content_changes.into_iter().next() {
            self.on_document_change(
                params.text_document.uri,
                change.text,
                params.text_document.version,
            );
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.close(&params.text_document.uri);
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let theme = params
            .settings
            .get("texpreview")
            .and_then(|v| v.get("theme"))
            .and_then(|v| v.as_str())
            .and_then(settings::parse_theme);
        if let (Some(theme), Some(preview)) = (theme, self.preview.get()) {
            preview.theme().set_theme(theme);
            tracing::debug!(dark = (theme == Theme::Dark), "theme updated");
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(coordinator) = self.preview.get() else {
            return Ok(None);
        };
        let Some(doc) = self.documents.get(uri) else {
            return Ok(None);
        };
        let Some(offset) = doc.offset_at(position) else {
            return Ok(None);
        };

        let range = math::find_innermost(doc.text(), offset).map(|r| doc.span_to_range(&r.span));

        let cancel = self.begin_hover();
        match coordinator.hover_on_math(&doc, offset, None, &cancel).await {
            Ok(preview) => Ok(self.hover_from_preview(preview, range)),
            Err(PreviewError::Render(diag)) => Ok(Some(Hover {
                contents: HoverContents::Markup(MarkupContent {
                    kind: MarkupKind::PlainText,
                    value: format!("Math preview failed: {diag}"),
                }),
                range,
            })),
            Err(_) => Ok(None),
        }
    }
}

pub fn create_service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::build(Backend::new)
        .custom_method("texpreview/referencePreview", Backend::reference_preview)
        .finish()
}
