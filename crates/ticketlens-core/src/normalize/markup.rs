//! Markup to plain text

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::DEFAULT_MIN_MARKUP_QUOTE_OFFSET;

/// Containers mail clients wrap quoted history in
static QUOTE_CONTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?is)<blockquote\b"#,
        r#"|<div\b[^>]*\bclass\s*=\s*["']?[^"'>]*\b(?:gmail_quote|yahoo_quoted|moz-cite-prefix)\b"#,
        r#"|<div\b[^>]*\bid\s*=\s*["']?(?:divRplyFwdMsg|appendonsend)\b"#,
    ))
    .expect("valid quote container regex")
});

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

/// Elements whose content is never visible text
static INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<style\b[^>]*>.*?</style\s*>|<script\b[^>]*>.*?</script\s*>|<head\b[^>]*>.*?</head\s*>",
    )
    .expect("valid invisible element regex")
});

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid br regex"));

static BLOCK_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:p|div|li|tr|h[1-6])\s*>").expect("valid block close regex")
});

/// Tags only; a bare `<` in text ("a < b") is left alone
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z!?][^>]*>").expect("valid tag regex"));

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(amp|lt|gt|quot|#39|apos|nbsp);").expect("valid entity regex"));

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C\x{00A0}]+").expect("valid space regex"));

static LINE_EDGE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\n *").expect("valid line edge regex"));

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

/// Markup stripping options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripOptions {
    /// Cut at the first quote container found past `min_quote_offset`
    pub strip_quote_containers: bool,

    pub min_quote_offset: usize,

    /// Hard cap in characters
    pub max_length: Option<usize>,
}

impl Default for StripOptions {
    fn default() -> Self {
        Self {
            strip_quote_containers: true,
            min_quote_offset: DEFAULT_MIN_MARKUP_QUOTE_OFFSET,
            max_length: None,
        }
    }
}

/// Byte offset of the first quote container that starts at least
/// `min_offset` characters into `markup`.
///
/// Containers nearer the start are ignored: a body that opens with a quote
/// container is usually wrapped by the sending client, not replying.
pub fn find_quote_container(markup: &str, min_offset: usize) -> Option<usize> {
    let start = if min_offset == 0 {
        0
    } else {
        markup.char_indices().nth(min_offset).map(|(i, _)| i)?
    };
    QUOTE_CONTAINER.find_at(markup, start).map(|m| m.start())
}

fn decode_entity(caps: &Captures) -> &'static str {
    match &caps[1] {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "#39" | "apos" => "'",
        _ => " ",
    }
}

/// Convert markup to readable plain text.
///
/// Line breaks and block ends become newlines, remaining tags are dropped,
/// the common entities are decoded in a single pass, whitespace is
/// collapsed, and at most one blank line survives anywhere.
///
/// Decoding runs after tag stripping, so entity-encoded markup such as
/// `&lt;b&gt;` comes out as literal `<b>` and a second pass strips it.
pub fn strip_markup(markup: &str, options: &StripOptions) -> String {
    strip_markup_with_cut(markup, options).0
}

/// [`strip_markup`], also reporting whether a quote container was cut
pub(super) fn strip_markup_with_cut(markup: &str, options: &StripOptions) -> (String, bool) {
    if markup.is_empty() {
        return (String::new(), false);
    }

    let mut text = markup.replace("\r\n", "\n").replace('\r', "\n");

    let mut quote_cut = false;
    if options.strip_quote_containers {
        if let Some(cut) = find_quote_container(&text, options.min_quote_offset) {
            text.truncate(cut);
            quote_cut = true;
        }
    }

    let text = COMMENT.replace_all(&text, "");
    let text = INVISIBLE.replace_all(&text, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = BLOCK_CLOSE.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, decode_entity);
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = LINE_EDGE_SPACE.replace_all(&text, "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    let text = text.trim();

    let text = match options.max_length {
        Some(max) if text.chars().count() > max => {
            let cut: String = text.chars().take(max).collect();
            cut.trim_end().to_string()
        }
        _ => text.to_string(),
    };
    (text, quote_cut)
}
