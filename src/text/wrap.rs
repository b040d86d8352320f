//! Greedy line wrapping.
//!
//! Lines break at whitespace. A word too wide to fit on a line of its own
//! is either hard-broken into hyphenated chunks or left to overflow.

use super::Measure;

const HYPHEN: char = '-';

/// Splits `text` into display lines no wider than `max_width`.
///
/// Explicit line breaks (`\n`) always start a new line, and blank
/// paragraphs are kept as empty lines. Only a single word that cannot
/// be broken may exceed `max_width`, which happens when `hyphenate` is
/// `false`.
pub fn wrap_lines(
    text: &str,
    measure: &impl Measure,
    max_width: f32,
    hyphenate: bool,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.strip_suffix('\r').unwrap_or(paragraph);
        wrap_paragraph(paragraph, measure, max_width, hyphenate, &mut lines);
    }
    log::trace!("Wrapped text into {} lines", lines.len());
    lines
}

fn wrap_paragraph(
    paragraph: &str,
    measure: &impl Measure,
    max_width: f32,
    hyphenate: bool,
    lines: &mut Vec<String>,
) {
    if paragraph.trim().is_empty() {
        lines.push(String::new());
        return;
    }

    let mut line = String::new();
    for word in paragraph.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_owned()
        } else {
            format!("{} {}", line, word)
        };

        if measure.width(&candidate) <= max_width {
            line = candidate;
            continue;
        }

        if !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }

        if measure.width(word) <= max_width {
            line = word.to_owned();
        } else if hyphenate {
            lines.extend(self::hyphenate(word, measure, max_width));
        } else {
            lines.push(word.to_owned());
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
}

/// Hard-breaks `word` into chunks that fit within `max_width`.
///
/// Every chunk but the last carries a trailing hyphen, which is included
/// when measuring. Each chunk holds at least one character, so chunks may
/// still overflow when `max_width` is narrower than a single glyph.
pub fn hyphenate(word: &str, measure: &impl Measure, max_width: f32) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = word;

    while !rest.is_empty() {
        let boundaries: Vec<usize> = rest
            .char_indices()
            .map(|(i, _)| i)
            .skip(1)
            .chain(std::iter::once(rest.len()))
            .collect();

        // `boundaries[n - 1]` is the byte length of the first `n` chars.
        let chunk_for = |n: usize| {
            let end = boundaries[n - 1];
            let mut chunk = rest[..end].to_owned();
            if end < rest.len() {
                chunk.push(HYPHEN);
            }
            chunk
        };

        let mut low = 1;
        let mut high = boundaries.len();
        while low < high {
            let mid = (low + high + 1) / 2;
            if measure.width(&chunk_for(mid)) <= max_width {
                low = mid;
            } else {
                high = mid - 1;
            }
        }

        chunks.push(chunk_for(low));
        rest = &rest[boundaries[low - 1]..];
    }

    chunks
}
