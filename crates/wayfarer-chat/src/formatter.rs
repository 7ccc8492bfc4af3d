//! Response formatting.
//!
//! Turns free-text replies that use a paired emphasis marker into a typed
//! block sequence. The first emphasized segment is the title; every later
//! segment is either `label: body` or a plain paragraph.

use wayfarer_core::types::{Block, StructuredContent};

/// Default emphasis marker used by the generative service.
pub const DEFAULT_MARKER: &str = "**";

/// Splits raw response text into heading, subheading and paragraph blocks.
#[derive(Debug, Clone)]
pub struct ResponseFormatter {
    marker: String,
}

impl Default for ResponseFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl ResponseFormatter {
    /// Create a formatter for the given marker. An empty marker falls back
    /// to the default.
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        let marker = if marker.is_empty() {
            DEFAULT_MARKER.to_string()
        } else {
            marker
        };
        Self { marker }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Whether `raw` contains the emphasis marker at all.
    pub fn has_markup(&self, raw: &str) -> bool {
        raw.contains(self.marker.as_str())
    }

    /// Format a raw response.
    ///
    /// Text without any marker degrades to a single paragraph. Blank input
    /// produces empty content.
    pub fn format(&self, raw: &str) -> StructuredContent {
        if !self.has_markup(raw) {
            let text = raw.trim();
            if text.is_empty() {
                return StructuredContent::default();
            }
            return StructuredContent::new(vec![Block::Paragraph(text.to_string())]);
        }

        let mut segments = raw
            .split(self.marker.as_str())
            .map(|segment| self.clean(segment))
            .filter(|segment| !segment.is_empty());

        let mut blocks = Vec::new();
        if let Some(title) = segments.next() {
            blocks.push(Block::Heading(title));
        }

        for segment in segments {
            match segment.split_once(':') {
                Some((label, body)) => {
                    let label = self.clean(label);
                    let body = self.clean(body);
                    if !label.is_empty() {
                        blocks.push(Block::Subheading(label));
                    }
                    if !body.is_empty() {
                        blocks.push(Block::Paragraph(body));
                    }
                }
                None => blocks.push(Block::Paragraph(segment)),
            }
        }

        StructuredContent::new(blocks)
    }

    /// Strip whole marker tokens and surrounding whitespace. Lone marker
    /// characters are text and are kept.
    fn clean(&self, text: &str) -> String {
        text.replace(self.marker.as_str(), "").trim().to_string()
    }
}
