//! Inline image extraction

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid img regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid attribute regex")
});

/// An image found in a message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    /// 1-based position among kept images
    pub index: usize,

    pub src: String,

    pub alt: String,

    pub width: Option<u32>,

    pub height: Option<u32>,

    /// Plain http(s) URL the caller can download; `cid:` and `data:` are not
    pub is_fetchable: bool,
}

/// Markup with placeholders, plus the images they stand for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedImages {
    pub markup: String,
    pub images: Vec<InlineImage>,
}

#[derive(Default)]
struct ImageAttributes {
    src: Option<String>,
    alt: Option<String>,
    width: Option<String>,
    height: Option<String>,
}

fn parse_attributes(tag: &str) -> ImageAttributes {
    let mut attrs = ImageAttributes::default();

    for caps in ATTRIBUTE.captures_iter(tag) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        // First occurrence wins
        let slot = match caps[1].to_ascii_lowercase().as_str() {
            "src" => &mut attrs.src,
            "alt" => &mut attrs.alt,
            "width" => &mut attrs.width,
            "height" => &mut attrs.height,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    attrs
}

/// Leading digits of a dimension ("600", "600px"); None when there are none
fn parse_dimension(value: Option<&str>) -> Option<u32> {
    let value = value?.trim();
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn is_fetchable(src: &str) -> bool {
    let lower = src.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Replace every `<img>` with a numbered placeholder.
///
/// Images declared exactly 1x1 are tracking pixels: they are deleted, listed
/// nowhere, and do not consume an index.
pub fn extract_inline_images(markup: &str) -> ExtractedImages {
    if markup.is_empty() {
        return ExtractedImages::default();
    }

    let mut images = Vec::new();
    let replaced = IMG_TAG.replace_all(markup, |caps: &Captures| {
        let attrs = parse_attributes(&caps[0]);
        let width = parse_dimension(attrs.width.as_deref());
        let height = parse_dimension(attrs.height.as_deref());

        if width == Some(1) && height == Some(1) {
            return String::new();
        }

        let index = images.len() + 1;
        let src = attrs.src.unwrap_or_default().trim().to_string();
        let alt = attrs.alt.unwrap_or_default().trim().to_string();

        let placeholder = if alt.is_empty() {
            format!("[Image {}]", index)
        } else {
            format!("[Image {}: {}]", index, alt)
        };

        images.push(InlineImage {
            index,
            is_fetchable: is_fetchable(&src),
            src,
            alt,
            width,
            height,
        });

        placeholder
    });

    ExtractedImages {
        markup: replaced.into_owned(),
        images,
    }
}
