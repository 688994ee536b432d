use unicode_segmentation::UnicodeSegmentation;
use url::Url;

/// Telegram rejects message texts longer than this many UTF-16 code units.
pub const MESSAGE_TEXT_LIMIT: usize = 4096;

/// One ready-to-send unit of broadcast content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    text: String,
    action_link: Option<ActionLink>,
}

/// An inline button pointing at an external page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLink {
    pub label: String,
    pub url: Url,
}

impl MessageBlock {
    pub fn new(text: String, action_link: Option<ActionLink>) -> Self {
        Self {
            text: truncate_utf16(text, MESSAGE_TEXT_LIMIT),
            action_link,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn action_link(&self) -> Option<&ActionLink> {
        self.action_link.as_ref()
    }
}

/// Keeps whole graphemes while the UTF-16 length stays within `limit`.
fn truncate_utf16(text: String, limit: usize) -> String {
    let mut units = 0;
    for (start, grapheme) in text.grapheme_indices(true) {
        units += grapheme.encode_utf16().count();
        if units > limit {
            return text[..start].to_owned();
        }
    }
    text
}
