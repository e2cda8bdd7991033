//! Tree → XML text.
//!
//! Mapping entries become elements named after their key, sequence elements
//! become `item_<index>` elements, scalars are inserted as text. Text and tag
//! names are written verbatim: no escaping, no attributes. Callers that need
//! well-formed XML for arbitrary content must sanitize beforehand.

use std::borrow::Cow;

use super::tree::Tree;

/// Root element name used when the caller does not supply one.
pub const DEFAULT_ROOT_TAG: &str = "scrape_result";

enum Step<'a> {
    Open(Cow<'a, str>, &'a Tree),
    Close(Cow<'a, str>),
}

/// Renders `tree` wrapped in a single `root` element.
///
/// Uses an explicit work stack, so nesting depth is bounded by the heap
/// rather than the call stack.
pub fn to_xml(tree: &Tree, root: &str) -> String {
    let mut out = String::new();
    let mut stack = vec![Step::Open(Cow::Borrowed(root), tree)];

    while let Some(step) = stack.pop() {
        match step {
            Step::Close(tag) => {
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
            Step::Open(tag, node) => {
                out.push('<');
                out.push_str(&tag);
                out.push('>');
                match node {
                    Tree::Scalar(scalar) => {
                        out.push_str(&scalar.to_string());
                        out.push_str("</");
                        out.push_str(&tag);
                        out.push('>');
                    }
                    Tree::Sequence(items) => {
                        stack.push(Step::Close(tag));
                        for (index, item) in items.iter().enumerate().rev() {
                            stack.push(Step::Open(Cow::Owned(format!("item_{index}")), item));
                        }
                    }
                    Tree::Mapping(entries) => {
                        stack.push(Step::Close(tag));
                        for (key, value) in entries.iter().rev() {
                            stack.push(Step::Open(Cow::Borrowed(key.as_str()), value));
                        }
                    }
                }
            }
        }
    }

    out
}
