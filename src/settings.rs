//! Settings for the preview server.
//!
//! A `texpreview.toml` discovered by walking up from the workspace root
//! configures render scale, theme, pool size, macro scan roots, and the
//! reference-preview feature flags. Missing or malformed settings fall back
//! to defaults; nothing here is fatal.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::render::Theme;

pub const SETTINGS_FILE: &str = "texpreview.toml";

/// Root structure of `texpreview.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub preview: Option<PreviewSettings>,
}

/// The `[preview]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PreviewSettings {
    /// Render scale factor; must be positive.
    pub scale: Option<f64>,
    /// "dark" or "light".
    pub theme: Option<String>,
    /// Number of pooled typesetting instances.
    pub pool_size: Option<usize>,
    /// Directories scanned for macro definitions, relative to the workspace
    /// root unless absolute.
    pub macro_roots: Option<Vec<PathBuf>>,
    /// Enable hover previews for cross-references.
    pub reference_previews: Option<bool>,
    /// Attach numbering notes to reference previews.
    pub numbering_notes: Option<bool>,
}

/// Fully resolved configuration handed to the coordinator.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub scale: f64,
    pub theme: Theme,
    pub pool_size: usize,
    pub macro_roots: Vec<PathBuf>,
    pub reference_previews: bool,
    pub numbering_notes: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            theme: Theme::Dark,
            pool_size: 2,
            macro_roots: Vec::new(),
            reference_previews: true,
            numbering_notes: true,
        }
    }
}

pub fn parse_theme(name: &str) -> Option<Theme> {
    match name {
        "dark" => Some(Theme::Dark),
        "light" => Some(Theme::Light),
        _ => None,
    }
}

impl Settings {
    /// Resolve against defaults; invalid values are dropped with a warning.
    pub fn resolve(&self, workspace_root: &Path) -> PreviewConfig {
        let mut config = PreviewConfig {
            macro_roots: vec![workspace_root.to_path_buf()],
            ..PreviewConfig::default()
        };
        let Some(preview) = &self.preview else {
            return config;
        };

        if let Some(scale) = preview.scale {
            if scale > 0.0 && scale.is_finite() {
                config.scale = scale;
            } else {
                tracing::warn!(scale, "ignoring non-positive render scale");
            }
        }
        if let Some(theme) = &preview.theme {
            match parse_theme(theme) {
                Some(theme) => config.theme = theme,
                None => tracing::warn!(%theme, "unknown theme name, keeping default"),
            }
        }
        if let Some(size) = preview.pool_size {
            if size > 0 {
                config.pool_size = size;
            } else {
                tracing::warn!("ignoring zero pool size");
            }
        }
        if let Some(roots) = &preview.macro_roots {
            if !roots.is_empty() {
                config.macro_roots = roots
                    .iter()
                    .map(|p| {
                        if p.is_absolute() {
                            p.clone()
                        } else {
                            workspace_root.join(p)
                        }
                    })
                    .collect();
            }
        }
        if let Some(enabled) = preview.reference_previews {
            config.reference_previews = enabled;
        }
        if let Some(enabled) = preview.numbering_notes {
            config.numbering_notes = enabled;
        }
        config
    }
}

/// Load settings from a file, falling back to defaults on any failure.
pub fn load_settings(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to parse settings, using defaults");
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Discover `texpreview.toml` by walking up from `start_dir`.
///
/// Returns the settings and the directory they were found in (used for
/// resolving relative paths); defaults anchored at `start_dir` if not found.
pub fn discover_settings(start_dir: &Path) -> (Settings, PathBuf) {
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(SETTINGS_FILE);
        if candidate.is_file() {
            return (load_settings(&candidate), dir.to_path_buf());
        }
        current = dir.parent();
    }
    (Settings::default(), start_dir.to_path_buf())
}
