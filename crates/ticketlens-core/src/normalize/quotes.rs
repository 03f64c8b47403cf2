//! Plain-text quoted history removal

use std::sync::LazyLock;

use regex::Regex;

use super::{DEFAULT_HEADER_LOOKAHEAD_LINES, DEFAULT_MIN_REMOVED_CHARS, DEFAULT_MIN_RETAINED_CHARS};

/// "-----Original Message-----" and its relatives
static DELIMITER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^-{2,}\s*(?:original message|forwarded message|ursprüngliche nachricht|message d'origine)\s*-{2,}$",
    )
    .expect("valid delimiter regex")
});

static FORWARD_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^begin forwarded message:?$").expect("valid forward regex"));

/// "On ... wrote:", "Am ... schrieb ...:", "Le ... a écrit :"
static REPLY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:On\s.+\swrote\s?:|Am\s.+\sschrieb.*:|Le\s.+\sa\sécrit\s?:)$")
        .expect("valid reply header regex")
});

static FROM_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:From|Von|De|Da|Di)\s?:\s*\S").expect("valid from regex"));

static DATE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Date|Datum|Fecha|Data)\s?:\s*\S").expect("valid date regex")
});

/// Thresholds that keep a boundary from eating the actual message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteOptions {
    pub min_retained_chars: usize,
    pub min_removed_chars: usize,
    pub header_lookahead_lines: usize,
}

impl Default for QuoteOptions {
    fn default() -> Self {
        Self {
            min_retained_chars: DEFAULT_MIN_RETAINED_CHARS,
            min_removed_chars: DEFAULT_MIN_REMOVED_CHARS,
            header_lookahead_lines: DEFAULT_HEADER_LOOKAHEAD_LINES,
        }
    }
}

/// Text after quote removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRemoval {
    pub text: String,

    /// Characters cut, when a boundary was committed
    pub removed_chars: Option<usize>,
}

/// Notice appended in place of removed history
pub fn quoted_content_notice(removed_chars: usize) -> String {
    format!("[Quoted content removed: {} characters]", removed_chars)
}

fn is_single_line_boundary(line: &str) -> bool {
    DELIMITER_LINE.is_match(line) || FORWARD_MARKER.is_match(line) || REPLY_HEADER.is_match(line)
}

/// Byte offset of the first line that starts quoted history
fn find_boundary(text: &str, lookahead: usize) -> Option<usize> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        lines.push((offset, line.trim()));
        offset += line.len();
    }

    lines.iter().enumerate().find_map(|(i, &(start, line))| {
        if is_single_line_boundary(line) {
            return Some(start);
        }
        let header_pair = FROM_FIELD.is_match(line)
            && lines
                .iter()
                .skip(i + 1)
                .take(lookahead)
                .any(|&(_, next)| DATE_FIELD.is_match(next));
        header_pair.then_some(start)
    })
}

/// Cut quoted replies and forwarded history from plain text.
///
/// The first boundary line wins. It is only committed when enough text
/// remains before it and enough is removed after it; otherwise the text is
/// returned unchanged.
pub fn remove_quoted_text(text: &str, options: &QuoteOptions) -> QuoteRemoval {
    let unchanged = || QuoteRemoval {
        text: text.to_string(),
        removed_chars: None,
    };

    let Some(boundary) = find_boundary(text, options.header_lookahead_lines) else {
        return unchanged();
    };

    let retained = text[..boundary].trim_end();
    let removed = text[boundary..].chars().count();

    if retained.chars().count() < options.min_retained_chars || removed < options.min_removed_chars {
        return unchanged();
    }

    QuoteRemoval {
        text: format!("{}\n\n{}", retained, quoted_content_notice(removed)),
        removed_chars: Some(removed),
    }
}
