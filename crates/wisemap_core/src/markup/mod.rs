//! Mindmap markup handling.
//!
//! # Responsibility
//! - Tokenize native document markup (`scanner`).
//! - Build and serialize the editor-facing element tree (`document`).
//!
//! # Invariants
//! - Neither submodule performs IO; both operate on in-memory text.

pub mod document;
pub mod scanner;

pub use document::{MapDocument, MapElement, MapNode, MAX_NESTING_DEPTH};
pub use scanner::{escape_attribute, escape_text, MarkupError, MarkupEvent, MarkupScanner};
