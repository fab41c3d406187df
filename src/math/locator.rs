//! Locating math environments in LaTeX source.
//!
//! A single left-to-right scan maintains a stack of open delimiters and
//! records a region whenever a closer matches the top of the stack, so the
//! recorded regions are well-nested by construction. Malformed input (an
//! unmatched closer, or delimiters still open at end of input) degrades to
//! "no region" for the offending span; the scan itself never fails.

use std::ops::Range;

/// The flavor of a math region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionKind {
    /// `$ ... $`
    Inline,
    /// `$$ ... $$` or `\[ ... \]`
    Display,
    /// `\begin{name} ... \end{name}`
    Named(String),
}

/// A delimited span of math markup within a document.
#[derive(Debug, Clone)]
pub struct MathRegion {
    pub kind: RegionKind,
    /// The range `text` was sliced from: the content between the delimiters
    /// for inline/display math, the whole `\begin..\end` block for named
    /// environments (the engine needs the environment to typeset it).
    pub range: Range<usize>,
    /// The full delimited span including the delimiters themselves; used for
    /// containment checks.
    pub span: Range<usize>,
    /// The source text at `range`.
    pub text: String,
    /// First `\label{...}` occurring inside `span`, if any.
    pub label: Option<String>,
}

impl MathRegion {
    /// Whether `offset` falls inside this region.
    ///
    /// Closed on both ends so that hovering exactly at a delimiter still
    /// counts as inside.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.span.start && offset <= self.span.end
    }

    fn span_len(&self) -> usize {
        self.span.end - self.span.start
    }
}

/// An opener sitting on the scan stack.
#[derive(Debug)]
enum Open {
    Inline { start: usize },
    DollarDisplay { start: usize },
    BracketDisplay { start: usize },
    Named { start: usize, name: String },
}

/// Environment families: `align*` closes `align` and vice versa.
fn env_family(name: &str) -> &str {
    name.trim_end_matches('*')
}

/// Scan `text` and return every well-formed math region, in order of their
/// closing position.
pub fn scan_regions(text: &str) -> Vec<MathRegion> {
    let bytes = text.as_bytes();
    let mut regions: Vec<MathRegion> = Vec::new();
    let mut labels: Vec<(usize, String)> = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            // Unescaped comment: delimiters are not recognized to end of line.
            b'%' => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'\\' => {
                pos = scan_command(text, pos, &mut stack, &mut regions, &mut labels);
            }
            b'$' => {
                let double = bytes.get(pos + 1) == Some(&b'$');
                match stack.last() {
                    Some(Open::Inline { .. }) => {
                        // A `$` closes inline math even when a second one
                        // follows immediately.
                        let Some(Open::Inline { start }) = stack.pop() else {
                            unreachable!()
                        };
                        regions.push(MathRegion {
                            kind: RegionKind::Inline,
                            range: start + 1..pos,
                            span: start..pos + 1,
                            text: text[start + 1..pos].to_string(),
                            label: None,
                        });
                        pos += 1;
                    }
                    Some(Open::DollarDisplay { .. }) if double => {
                        let Some(Open::DollarDisplay { start }) = stack.pop() else {
                            unreachable!()
                        };
                        regions.push(MathRegion {
                            kind: RegionKind::Display,
                            range: start + 2..pos,
                            span: start..pos + 2,
                            text: text[start + 2..pos].to_string(),
                            label: None,
                        });
                        pos += 2;
                    }
                    _ => {
                        if double {
                            stack.push(Open::DollarDisplay { start: pos });
                            pos += 2;
                        } else {
                            stack.push(Open::Inline { start: pos });
                            pos += 1;
                        }
                    }
                }
            }
            _ => pos += 1,
        }
    }

    // Anything still open at end of input yields no region.
    attach_labels(&mut regions, &labels);
    regions
}

/// Handle a backslash at `pos`; returns the position after the consumed token.
fn scan_command(
    text: &str,
    pos: usize,
    stack: &mut Vec<Open>,
    regions: &mut Vec<MathRegion>,
    labels: &mut Vec<(usize, String)>,
) -> usize {
    let bytes = text.as_bytes();
    let Some(&next) = bytes.get(pos + 1) else {
        return pos + 1;
    };

    match next {
        b'[' => {
            stack.push(Open::BracketDisplay { start: pos });
            pos + 2
        }
        b']' => {
            if let Some(Open::BracketDisplay { .. }) = stack.last() {
                let Some(Open::BracketDisplay { start }) = stack.pop() else {
                    unreachable!()
                };
                regions.push(MathRegion {
                    kind: RegionKind::Display,
                    range: start + 2..pos,
                    span: start..pos + 2,
                    text: text[start + 2..pos].to_string(),
                    label: None,
                });
            }
            // Unmatched `\]` is ignored.
            pos + 2
        }
        c if c.is_ascii_alphabetic() => {
            let mut end = pos + 1;
            while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
                end += 1;
            }
            match &text[pos + 1..end] {
                "begin" => {
                    if let Some((name, after)) = read_group_name(text, end) {
                        stack.push(Open::Named { start: pos, name });
                        after
                    } else {
                        end
                    }
                }
                "end" => {
                    if let Some((name, after)) = read_group_name(text, end) {
                        let matches_top = matches!(
                            stack.last(),
                            Some(Open::Named { name: open, .. })
                                if env_family(open) == env_family(&name)
                        );
                        if matches_top {
                            let Some(Open::Named { start, name: open }) = stack.pop() else {
                                unreachable!()
                            };
                            regions.push(MathRegion {
                                kind: RegionKind::Named(open),
                                range: start..after,
                                span: start..after,
                                text: text[start..after].to_string(),
                                label: None,
                            });
                        }
                        // An `\end` that does not match the innermost opener
                        // is an unmatched closer: skipped.
                        after
                    } else {
                        end
                    }
                }
                "label" => {
                    if let Some((name, after)) = read_group_name(text, end) {
                        labels.push((pos, name));
                        after
                    } else {
                        end
                    }
                }
                _ => end,
            }
        }
        // Escaped character (`\$`, `\%`, `\{`, `\}`, `\\`, ...): consumed as
        // one non-delimiting unit. This also keeps the `[` of a `\\[2pt]`
        // row break from reading as a display opener.
        _ => pos + 1 + utf8_len(next),
    }
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

/// Read a `{name}` group starting at `pos` (whitespace before the brace is
/// tolerated). Returns the name and the position after the closing brace.
/// Environment and label names contain no braces, so a plain scan suffices;
/// nested brace groups elsewhere never reach this function.
fn read_group_name(text: &str, mut pos: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
        pos += 1;
    }
    if bytes.get(pos) != Some(&b'{') {
        return None;
    }
    let close = text[pos + 1..].find('}')? + pos + 1;
    let name = text[pos + 1..close].trim().to_string();
    if name.is_empty() {
        return None;
    }
    Some((name, close + 1))
}

/// Assign each region the first label falling inside its span.
fn attach_labels(regions: &mut [MathRegion], labels: &[(usize, String)]) {
    for region in regions.iter_mut() {
        region.label = labels
            .iter()
            .find(|(offset, _)| *offset >= region.span.start && *offset < region.span.end)
            .map(|(_, name)| name.clone());
    }
}

/// The smallest region containing `offset`, or `None`.
pub fn find_innermost(text: &str, offset: usize) -> Option<MathRegion> {
    scan_regions(text)
        .into_iter()
        .filter(|r| r.contains(offset))
        .min_by_key(MathRegion::span_len)
}

/// The smallest region whose label equals `label`, or `None`.
///
/// Searches the given text only; cross-file lookup belongs to the caller.
pub fn find_by_label(text: &str, label: &str) -> Option<MathRegion> {
    scan_regions(text)
        .into_iter()
        .filter(|r| r.label.as_deref() == Some(label))
        .min_by_key(MathRegion::span_len)
}
