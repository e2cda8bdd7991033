//! Result serializer.
//!
//! Tool handlers build a [`Tree`] and hand it to [`serialize`] together with
//! the output format the caller asked for. The native format passes the tree
//! through untouched; XML and Markdown flatten it into text.

mod markdown;
mod tree;
mod xml;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use markdown::{LONG_TEXT_FIELD, LONG_TEXT_THRESHOLD, to_markdown};
pub use tree::{Scalar, Tree};
pub use xml::{DEFAULT_ROOT_TAG, to_xml};

/// Output encodings understood by the serializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured passthrough. Spelled `json` on the wire.
    #[default]
    #[serde(rename = "json", alias = "native")]
    Native,
    Xml,
    Markdown,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "json",
            Self::Xml => "xml",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An output format name that is not supported.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported output format: {0}")]
pub struct FormatError(pub String);

impl FromStr for OutputFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" | "native" => Ok(Self::Native),
            "xml" => Ok(Self::Xml),
            "markdown" => Ok(Self::Markdown),
            other => Err(FormatError(other.to_string())),
        }
    }
}

/// Serializer output.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// The input tree, for structured transmission.
    Tree(Tree),
    /// Flattened text.
    Text(String),
}

impl From<Rendered> for Tree {
    fn from(rendered: Rendered) -> Self {
        match rendered {
            Rendered::Tree(tree) => tree,
            Rendered::Text(text) => Tree::text(text),
        }
    }
}

/// Renders `tree` in `format`, using [`DEFAULT_ROOT_TAG`] for XML.
pub fn serialize(tree: Tree, format: OutputFormat) -> Rendered {
    serialize_with_root(tree, format, DEFAULT_ROOT_TAG)
}

/// Renders `tree` in `format`; `root` names the XML wrapper element.
pub fn serialize_with_root(tree: Tree, format: OutputFormat, root: &str) -> Rendered {
    match format {
        OutputFormat::Native => Rendered::Tree(tree),
        OutputFormat::Xml => Rendered::Text(to_xml(&tree, root)),
        OutputFormat::Markdown => Rendered::Text(to_markdown(&tree)),
    }
}
