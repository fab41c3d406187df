//! Cursor marker injection into extracted math source.
//!
//! The hover-on-math flow shows the user where their cursor sits inside the
//! rendered math. A thin colored rule is spliced into the region's source at
//! the cursor's local offset; the insertion point is nudged so it never
//! separates a backslash from the character it escapes and never splits a
//! control word like `\alpha`.

use crate::math::MathRegion;
use crate::render::ForegroundColor;

/// Return `region.text` with a cursor marker inserted at `cursor_offset`
/// (an absolute document offset). If the offset does not fall within the
/// region, the text is returned unmodified.
pub fn annotate(region: &MathRegion, cursor_offset: usize, color: ForegroundColor) -> String {
    if cursor_offset < region.range.start || cursor_offset > region.range.end {
        return region.text.clone();
    }
    let local = cursor_offset - region.range.start;
    let at = adjust_insertion_point(&region.text, local.min(region.text.len()));

    let mut out = String::with_capacity(region.text.len() + 48);
    out.push_str(&region.text[..at]);
    out.push_str(&cursor_marker(color));
    out.push_str(&region.text[at..]);
    out
}

/// The marker itself: a thin rule in the current foreground color, wrapped in
/// a group so the color does not leak into the rest of the formula.
fn cursor_marker(color: ForegroundColor) -> String {
    format!("{{\\color{{{}}}\\rule[-0.2em]{{0.06em}}{{1.2em}}}}", color.hex())
}

/// Move `at` to a safe insertion point: a char boundary that is not between
/// a backslash and its escaped character and not inside a control word.
fn adjust_insertion_point(text: &str, mut at: usize) -> usize {
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }

    // Walk left over any control-word letters.
    let word_start = text[..at]
        .rfind(|c: char| !c.is_ascii_alphabetic())
        .map(|i| i + text[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    if word_start > 0 && preceded_by_escape(text, word_start) && word_start < at {
        // Inside `\word`: land before the backslash.
        return word_start - 1;
    }

    // Between a backslash and the character it escapes: land before the
    // backslash run's odd trailing escape.
    if preceded_by_escape(text, at) {
        return at - 1;
    }

    at
}

/// Whether the character at `at` is escaped, i.e. preceded by an odd number
/// of backslashes.
fn preceded_by_escape(text: &str, at: usize) -> bool {
    text[..at]
        .bytes()
        .rev()
        .take_while(|&b| b == b'\\')
        .count()
        % 2
        == 1
}
