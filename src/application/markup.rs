//! Editable view over an HTML fragment.
//!
//! The fragment is kept as its original text plus an index of element start
//! tags in document order. Attribute edits are recorded against that index and
//! replayed through `lol_html` on serialization, which copies every byte it was
//! not asked to touch straight through to the output.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use lol_html::{RewriteStrSettings, element, rewrite_str};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("markup is empty")]
    Empty,
    #[error("markup could not be processed: {message}")]
    Rewrite { message: String },
    #[error("invalid attribute name `{name}`")]
    InvalidAttributeName { name: String },
    #[error("element handle {position} does not belong to this document")]
    UnknownElement { position: usize },
}

impl MarkupError {
    fn rewrite(err: impl std::fmt::Display) -> Self {
        Self::Rewrite {
            message: err.to_string(),
        }
    }
}

/// Reference to one element of a parsed [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    position: usize,
    tag_name: String,
}

impl ElementHandle {
    /// Ordinal of the element among all elements, in document order.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Lowercase tag name.
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    elements: Vec<String>,
    edits: BTreeMap<usize, Vec<(String, String)>>,
}

impl Document {
    /// Number of elements found in the fragment.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Index a fragment. Malformed markup is handled the permissive HTML way.
pub fn parse(markup: &str) -> Result<Document, MarkupError> {
    if markup.is_empty() {
        return Err(MarkupError::Empty);
    }

    let elements = Rc::new(RefCell::new(Vec::new()));

    rewrite_str(
        markup,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", {
                let elements = Rc::clone(&elements);
                move |el| {
                    elements
                        .borrow_mut()
                        .push(el.tag_name().to_ascii_lowercase());
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(MarkupError::rewrite)?;

    let elements = elements.take();

    Ok(Document {
        source: markup.to_string(),
        elements,
        edits: BTreeMap::new(),
    })
}

/// Elements with the given tag name, in document order. Matching ignores ASCII case.
pub fn find_all(doc: &Document, tag_name: &str) -> Vec<ElementHandle> {
    doc.elements
        .iter()
        .enumerate()
        .filter(|(_, name)| name.eq_ignore_ascii_case(tag_name))
        .map(|(position, name)| ElementHandle {
            position,
            tag_name: name.clone(),
        })
        .collect()
}

/// Set an attribute on an element. The value is stored raw; quoting happens on serialization.
pub fn set_attribute(
    doc: &mut Document,
    handle: &ElementHandle,
    name: &str,
    value: &str,
) -> Result<(), MarkupError> {
    if !is_valid_attribute_name(name) {
        return Err(MarkupError::InvalidAttributeName {
            name: name.to_string(),
        });
    }
    match doc.elements.get(handle.position) {
        Some(tag) if *tag == handle.tag_name => {}
        _ => {
            return Err(MarkupError::UnknownElement {
                position: handle.position,
            });
        }
    }

    let edits = doc.edits.entry(handle.position).or_default();
    match edits
        .iter_mut()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
    {
        Some(slot) => slot.1 = value.to_string(),
        None => edits.push((name.to_string(), value.to_string())),
    }
    Ok(())
}

/// Render the fragment with all recorded edits applied.
pub fn serialize(doc: &Document) -> Result<String, MarkupError> {
    if doc.edits.is_empty() {
        return Ok(doc.source.clone());
    }

    let position = Rc::new(Cell::new(0usize));

    rewrite_str(
        &doc.source,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", {
                let position = Rc::clone(&position);
                let edits = &doc.edits;
                move |el| {
                    let current = position.get();
                    position.set(current + 1);
                    if let Some(attributes) = edits.get(&current) {
                        for (name, value) in attributes {
                            el.set_attribute(name, value)?;
                        }
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(MarkupError::rewrite)
}

fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(|ch| {
            ch.is_whitespace()
                || ch.is_control()
                || matches!(ch, '"' | '\'' | '>' | '/' | '=' | '<')
        })
}
