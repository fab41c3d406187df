//! Theme-derived foreground color for rendered math.
//!
//! The one piece of process-wide mutable state in the preview core. Written
//! only by the host's theme-change notification; every read takes a snapshot
//! of a single atomic cell, so no reader ever observes a half-updated state.

use std::sync::atomic::{AtomicBool, Ordering};

/// The host editor's color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

/// Foreground color used for typeset output and the cursor marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundColor {
    /// Light foreground, for dark themes.
    Light,
    /// Dark foreground, for light themes.
    Dark,
}

impl ForegroundColor {
    /// Hex form for `\color{...}` injection.
    pub fn hex(self) -> &'static str {
        match self {
            ForegroundColor::Light => "#ffffff",
            ForegroundColor::Dark => "#000000",
        }
    }
}

/// Tracks the current theme and derives the foreground color from it.
#[derive(Debug)]
pub struct ThemeColorTracker {
    dark: AtomicBool,
}

impl ThemeColorTracker {
    pub fn new(theme: Theme) -> Self {
        Self {
            dark: AtomicBool::new(theme == Theme::Dark),
        }
    }

    /// Invoked by the host's theme-change notification. Single writer.
    pub fn set_theme(&self, theme: Theme) {
        self.dark.store(theme == Theme::Dark, Ordering::Relaxed);
    }

    /// Snapshot of the active foreground color.
    pub fn current_color(&self) -> ForegroundColor {
        if self.dark.load(Ordering::Relaxed) {
            ForegroundColor::Light
        } else {
            ForegroundColor::Dark
        }
    }
}

impl Default for ThemeColorTracker {
    fn default() -> Self {
        Self::new(Theme::Dark)
    }
}
