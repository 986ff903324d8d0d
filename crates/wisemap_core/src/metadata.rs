//! Title extraction over raw mindmap content.
//!
//! # Responsibility
//! - Derive a display title from document text without a full tree parse.
//!
//! # Invariants
//! - Extraction never fails; malformed or title-less content yields
//!   `UNTITLED`.
//! - Only the first central topic is considered.

use crate::markup::{MarkupEvent, MarkupScanner};

/// Fallback title for content without a usable central topic.
pub const UNTITLED: &str = "Untitled";
/// Element carrying topic nodes.
pub const TOPIC_ELEMENT: &str = "topic";
/// Attribute marking the root/central topic.
pub const CENTRAL_ATTRIBUTE: &str = "central";
/// Attribute holding a topic's display text.
pub const TEXT_ATTRIBUTE: &str = "text";

/// Returns the central topic's text, or `UNTITLED`.
///
/// The scan stops at the first `<topic central="true">`. Errors before that
/// point (or a central topic without text) fall back to `UNTITLED`; errors
/// after it are irrelevant.
pub fn extract_title(content: &str) -> String {
    for event in MarkupScanner::new(content) {
        let Ok(event) = event else {
            break;
        };
        let is_central = matches!(event, MarkupEvent::Start { name, .. } if name == TOPIC_ELEMENT)
            && event.attribute(CENTRAL_ATTRIBUTE) == Some("true");
        if !is_central {
            continue;
        }
        return event
            .attribute(TEXT_ATTRIBUTE)
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(UNTITLED)
            .to_string();
    }
    UNTITLED.to_string()
}
