//! Project-wide macro preamble, cached.
//!
//! Custom commands (`\newcommand` and friends) defined anywhere under the
//! scan roots must resolve when a snippet of math is typeset on its own, so
//! the scanner collects their literal source text into one preamble string
//! that callers prepend to every render. The result is cached; a scan runs
//! only on first use or after an explicit invalidation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::PreviewError;

/// The concatenated macro definitions plus the version token callers can use
/// to detect staleness without forcing a rescan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroPreamble {
    pub text: String,
    pub version: u64,
}

/// Scans the configured roots for macro definitions and caches the result.
///
/// The preamble is replaced wholesale on rescan, never mutated, so concurrent
/// readers always hold a consistent snapshot.
pub struct MacroScanner {
    roots: Vec<PathBuf>,
    /// Bumped by every `invalidate`. The cache is fresh only while `scanned`
    /// equals this, so an invalidation arriving mid-scan keeps the cache
    /// stale and the next call rescans.
    invalidations: AtomicU64,
    /// The invalidation generation the cached preamble was scanned against.
    scanned: AtomicU64,
    cache: std::sync::Mutex<Option<Arc<MacroPreamble>>>,
    /// Serializes scans: at most one runs at a time, and callers arriving
    /// during a scan pick up its result instead of starting their own.
    scan_lock: tokio::sync::Mutex<()>,
}

impl MacroScanner {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            invalidations: AtomicU64::new(1),
            scanned: AtomicU64::new(0),
            cache: std::sync::Mutex::new(None),
            scan_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Mark the cached preamble stale; the next `preamble` call rescans.
    pub fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    fn is_fresh(&self) -> bool {
        self.scanned.load(Ordering::SeqCst) == self.invalidations.load(Ordering::SeqCst)
    }

    /// The cached preamble, if any, without triggering a scan.
    pub fn cached(&self) -> Option<Arc<MacroPreamble>> {
        self.cache.lock().expect("cache lock poisoned").clone()
    }

    /// Return the current preamble, rescanning only if invalidated.
    ///
    /// A cancelled scan leaves the previously cached value untouched. An
    /// invalidation that arrives while a scan is running is not lost: the
    /// scan only records the generation it started from, so the next call
    /// rescans.
    pub async fn preamble(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<MacroPreamble>, PreviewError> {
        if self.is_fresh() {
            if let Some(cached) = self.cached() {
                return Ok(cached);
            }
        }

        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(PreviewError::Cancelled),
            guard = self.scan_lock.lock() => guard,
        };

        // A scan that finished while we waited already refreshed the cache.
        if self.is_fresh() {
            if let Some(cached) = self.cached() {
                return Ok(cached);
            }
        }

        let target = self.invalidations.load(Ordering::SeqCst);
        let roots = self.roots.clone();
        let scan_cancel = cancel.clone();
        let scanned = tokio::task::spawn_blocking(move || scan_roots(&roots, &scan_cancel))
            .await
            .map_err(|_| PreviewError::Render("macro scan crashed".into()))?;

        let Some(text) = scanned else {
            return Err(PreviewError::Cancelled);
        };

        let mut cache = self.cache.lock().expect("cache lock poisoned");
        let version = cache.as_ref().map(|p| p.version).unwrap_or(0) + 1;
        let preamble = Arc::new(MacroPreamble { text, version });
        *cache = Some(Arc::clone(&preamble));
        self.scanned.store(target, Ordering::SeqCst);
        tracing::debug!(version, bytes = preamble.text.len(), "macro preamble rescanned");
        Ok(preamble)
    }
}

/// Walk the roots and build the preamble text. Returns `None` if cancelled.
fn scan_roots(roots: &[PathBuf], cancel: &CancellationToken) -> Option<String> {
    let mut files = Vec::new();
    for root in roots {
        collect_source_files(root, &mut files);
    }
    // Deterministic scan order; later files override earlier ones.
    files.sort();

    let mut order: Vec<String> = Vec::new();
    let mut defs: HashMap<String, String> = HashMap::new();

    for file in &files {
        if cancel.is_cancelled() {
            return None;
        }
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(path = %file.display(), %err, "skipping unreadable file in macro scan");
                continue;
            }
        };
        extract_definitions(&text, &mut order, &mut defs);
    }

    let mut out = String::new();
    for name in &order {
        out.push_str(&defs[name]);
        out.push('\n');
    }
    Some(out)
}

const SOURCE_EXTENSIONS: &[&str] = &["tex", "sty", "cls", "ltx"];

fn collect_source_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let file_type = entry.file_type();
        if file_type.as_ref().map(|ft| ft.is_dir()).unwrap_or(false) {
            collect_source_files(&path, files);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SOURCE_EXTENSIONS.contains(&e))
            .unwrap_or(false)
        {
            files.push(path);
        }
    }
}

/// Start of a macro definition; the body is captured separately since regex
/// cannot balance braces.
static DEF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:(?:new|renew|provide)command|DeclareMathOperator|def)\*?\s*\{?\\([a-zA-Z@]+)\}?")
        .unwrap()
});

/// Extract macro definitions from one file, deduplicating by name with last
/// definition wins. `order` preserves first-discovery order for the output.
fn extract_definitions(text: &str, order: &mut Vec<String>, defs: &mut HashMap<String, String>) {
    let comments = comment_ranges(text);

    for caps in DEF_PATTERN.captures_iter(text) {
        let mat = caps.get(0).expect("whole match");
        if comments.iter().any(|r| r.contains(&mat.start())) {
            continue;
        }
        let Some(end) = find_body_end(text, mat.end()) else {
            continue;
        };
        let name = caps[1].to_string();
        let literal = text[mat.start()..end].to_string();
        if !defs.contains_key(&name) {
            order.push(name.clone());
        }
        defs.insert(name, literal);
    }
}

/// Byte ranges of `%` line comments, honoring `\%`.
fn comment_ranges(text: &str) -> Vec<std::ops::Range<usize>> {
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'%' => {
                let start = pos;
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                ranges.push(start..pos);
            }
            _ => pos += 1,
        }
    }
    ranges
}

/// Position just past the definition's body group, starting after the macro
/// name: optional `[..]` argument specs and `#1`-style parameter text, then
/// one balanced `{...}` group.
fn find_body_end(text: &str, mut pos: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    loop {
        match bytes.get(pos)? {
            b' ' | b'\t' => pos += 1,
            b'[' => {
                while pos < bytes.len() && bytes[pos] != b']' {
                    pos += 1;
                }
                pos += 1;
            }
            b'#' => pos += 2,
            b'0'..=b'9' => pos += 1,
            b'{' => break,
            _ => return None,
        }
    }
    find_group_end(text, pos)
}

/// Position just past the `}` matching the `{` at `open`, skipping escaped
/// characters.
fn find_group_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut pos = open;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'{' => {
                depth += 1;
                pos += 1;
            }
            b'}' => {
                depth = depth.checked_sub(1)?;
                pos += 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => pos += 1,
        }
    }
    None
}
