//! Finding, annotating, and supplementing math source.
//!
//! This module provides:
//! - `locator`: the delimiter-stack scan that finds math regions
//! - `annotator`: cursor-marker injection into extracted math source
//! - `macros`: the cached project-wide macro preamble

mod annotator;
mod locator;
mod macros;

pub use annotator::annotate;
pub use locator::{find_by_label, find_innermost, scan_regions, MathRegion, RegionKind};
pub use macros::{MacroPreamble, MacroScanner};
