//! Message body normalization
//!
//! Every message body leaves the system through a three-stage pipeline:
//!
//! 1. [`extract_inline_images`] replaces `<img>` elements with `[Image N]`
//!    placeholders and drops 1x1 tracking pixels,
//! 2. [`strip_markup`] turns the markup into plain text,
//! 3. [`remove_quoted_text`] cuts quoted replies and forwarded history.
//!
//! Each stage is a pure function that maps empty input to empty output and
//! leaves its own output unchanged when applied again, with one exception:
//! [`strip_markup`] decodes entities after removing tags, so text that
//! encodes markup (`&lt;b&gt;`) decodes into tags that a second pass strips.

mod images;
mod markup;
mod quotes;

pub use images::{extract_inline_images, ExtractedImages, InlineImage};
pub use markup::{find_quote_container, strip_markup, StripOptions};
pub use quotes::{quoted_content_notice, remove_quoted_text, QuoteOptions, QuoteRemoval};

use markup::strip_markup_with_cut;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NormalizeConfig;

/// Markup before a quote container must be at least this many characters
pub const DEFAULT_MIN_MARKUP_QUOTE_OFFSET: usize = 50;

/// Text kept before a plain-text quote boundary must be at least this long
pub const DEFAULT_MIN_RETAINED_CHARS: usize = 10;

/// Text removed after a plain-text quote boundary must be at least this long
pub const DEFAULT_MIN_REMOVED_CHARS: usize = 100;

/// Lines searched after a From-style header for its Date-style partner
pub const DEFAULT_HEADER_LOOKAHEAD_LINES: usize = 8;

/// Result of normalizing one message body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBody {
    pub text: String,

    pub images: Vec<InlineImage>,

    /// Whether quoted history was cut from the body
    #[serde(default)]
    pub quoted_content_removed: bool,
}

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerOptions {
    pub max_length: Option<usize>,
    pub strip_quoted_content: bool,
    pub min_markup_quote_offset: usize,
    pub min_retained_chars: usize,
    pub min_removed_chars: usize,
    pub header_lookahead_lines: usize,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            max_length: None,
            strip_quoted_content: true,
            min_markup_quote_offset: DEFAULT_MIN_MARKUP_QUOTE_OFFSET,
            min_retained_chars: DEFAULT_MIN_RETAINED_CHARS,
            min_removed_chars: DEFAULT_MIN_REMOVED_CHARS,
            header_lookahead_lines: DEFAULT_HEADER_LOOKAHEAD_LINES,
        }
    }
}

impl From<&NormalizeConfig> for NormalizerOptions {
    fn from(config: &NormalizeConfig) -> Self {
        Self {
            // 0 means unlimited, since TOML has no null
            max_length: config.max_body_chars.filter(|n| *n > 0),
            strip_quoted_content: config.strip_quoted_content,
            min_markup_quote_offset: config.min_markup_quote_offset,
            min_retained_chars: config.min_retained_chars,
            min_removed_chars: config.min_removed_chars,
            header_lookahead_lines: config.header_lookahead_lines,
        }
    }
}

/// Runs the three stages over message bodies. Holds no per-body state.
#[derive(Debug, Clone, Default)]
pub struct ContentNormalizer {
    options: NormalizerOptions,
}

impl ContentNormalizer {
    /// Create a normalizer with explicit options
    pub fn new(options: NormalizerOptions) -> Self {
        Self { options }
    }

    /// Create a normalizer from configuration
    pub fn from_config(config: &NormalizeConfig) -> Self {
        Self::new(NormalizerOptions::from(config))
    }

    /// Current options
    pub fn options(&self) -> &NormalizerOptions {
        &self.options
    }

    /// Normalize one raw message body.
    ///
    /// Images are extracted from the whole body, quoted history included.
    /// The quote-container offset guard is then measured on that output,
    /// where tracking pixels are already gone and images are placeholders.
    pub fn normalize(&self, raw: &str) -> NormalizedBody {
        if raw.is_empty() {
            return NormalizedBody::default();
        }

        let extracted = extract_inline_images(raw);

        let (text, mut quoted_content_removed) = strip_markup_with_cut(
            &extracted.markup,
            &StripOptions {
                strip_quote_containers: self.options.strip_quoted_content,
                min_quote_offset: self.options.min_markup_quote_offset,
                max_length: self.options.max_length,
            },
        );
        if quoted_content_removed {
            debug!("Cut quoted markup container from a {} byte body", raw.len());
        }

        let text = if self.options.strip_quoted_content {
            let removal = remove_quoted_text(
                &text,
                &QuoteOptions {
                    min_retained_chars: self.options.min_retained_chars,
                    min_removed_chars: self.options.min_removed_chars,
                    header_lookahead_lines: self.options.header_lookahead_lines,
                },
            );
            quoted_content_removed |= removal.removed_chars.is_some();
            removal.text
        } else {
            text
        };

        NormalizedBody {
            text,
            images: extracted.images,
            quoted_content_removed,
        }
    }
}
