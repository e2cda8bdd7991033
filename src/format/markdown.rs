//! Tree → Markdown text.
//!
//! Every mapping field gets a heading whose level follows its depth, followed
//! by the rendered value:
//!
//! - nested mappings recurse one heading level deeper;
//! - sequences of scalars become a bullet list;
//! - mapping elements of a sequence become an `Item N` sub-heading followed by
//!   `**key**: value` lines;
//! - scalars render as `**key**: value`, except a long `content` field, which
//!   is fenced to keep its formatting.
//!
//! Blocks are separated by a blank line. No Markdown escaping is applied.

use super::tree::Tree;

/// Field whose long values are fenced instead of inlined.
pub const LONG_TEXT_FIELD: &str = "content";

/// Character count above which [`LONG_TEXT_FIELD`] is fenced.
pub const LONG_TEXT_THRESHOLD: usize = 200;

struct Field<'a> {
    key: &'a str,
    value: &'a Tree,
    level: usize,
}

/// Renders `tree` as Markdown.
///
/// A mapping root renders its fields at heading level 1, a sequence root
/// renders as a bare list, and a scalar root is fenced.
pub fn to_markdown(tree: &Tree) -> String {
    let mut blocks = Vec::new();
    match tree {
        Tree::Mapping(_) => render_fields(tree, 1, &mut blocks),
        Tree::Sequence(items) => render_sequence(items, 1, &mut blocks),
        Tree::Scalar(scalar) => blocks.push(fenced(&scalar.to_string())),
    }
    blocks.join("\n\n")
}

/// Walks mapping fields depth-first with an explicit stack.
fn render_fields(root: &Tree, level: usize, blocks: &mut Vec<String>) {
    let mut stack: Vec<Field<'_>> = Vec::new();
    push_fields(root, level, &mut stack);

    while let Some(Field { key, value, level }) = stack.pop() {
        blocks.push(format!("{} {key}", "#".repeat(level)));
        match value {
            Tree::Mapping(_) => push_fields(value, level + 1, &mut stack),
            Tree::Sequence(items) => render_sequence(items, level, blocks),
            Tree::Scalar(scalar) => {
                let text = scalar.to_string();
                if key == LONG_TEXT_FIELD && text.chars().count() > LONG_TEXT_THRESHOLD {
                    blocks.push(fenced(&text));
                } else {
                    blocks.push(format!("**{key}**: {text}"));
                }
            }
        }
    }
}

fn push_fields<'a>(tree: &'a Tree, level: usize, stack: &mut Vec<Field<'a>>) {
    if let Tree::Mapping(entries) = tree {
        for (key, value) in entries.iter().rev() {
            stack.push(Field { key, value, level });
        }
    }
}

fn render_sequence(items: &[Tree], level: usize, blocks: &mut Vec<String>) {
    let mut bullets: Vec<String> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match item {
            Tree::Mapping(entries) => {
                flush_bullets(&mut bullets, blocks);
                blocks.push(format!("{} Item {}", "#".repeat(level + 1), index + 1));
                let lines: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("**{k}**: {}", inline(v)))
                    .collect();
                if !lines.is_empty() {
                    blocks.push(lines.join("\n"));
                }
            }
            other => bullets.push(format!("- {}", inline(other))),
        }
    }
    flush_bullets(&mut bullets, blocks);
}

fn flush_bullets(bullets: &mut Vec<String>, blocks: &mut Vec<String>) {
    if !bullets.is_empty() {
        blocks.push(bullets.join("\n"));
        bullets.clear();
    }
}

/// Scalars as text, containers as compact JSON.
fn inline(tree: &Tree) -> String {
    match tree {
        Tree::Scalar(scalar) => scalar.to_string(),
        other => other.to_compact_json(),
    }
}

fn fenced(text: &str) -> String {
    format!("```\n{text}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heading_then_value_for_each_field() {
        let tree = Tree::from(json!({"title": "X", "items": ["a", "b"]}));
        assert_eq!(
            to_markdown(&tree),
            "# title\n\n**title**: X\n\n# items\n\n- a\n- b"
        );
    }

    #[test]
    fn nested_mapping_increases_heading_level() {
        let tree = Tree::from(json!({"metadata": {"status_code": 200, "inner": {"k": true}}}));
        assert_eq!(
            to_markdown(&tree),
            "# metadata\n\n## status_code\n\n**status_code**: 200\n\n## inner\n\n### k\n\n**k**: true"
        );
    }

    #[test]
    fn sequence_of_mappings_uses_item_subheadings() {
        let tree = Tree::from(json!({"links": [
            {"url": "https://a.example", "domain": "a.example"},
            {"url": "https://b.example", "tags": ["x"]}
        ]}));
        assert_eq!(
            to_markdown(&tree),
            "# links\n\n## Item 1\n\n**url**: https://a.example\n**domain**: a.example\
             \n\n## Item 2\n\n**url**: https://b.example\n**tags**: [\"x\"]"
        );
    }

    #[test]
    fn long_content_is_fenced_short_content_inline() {
        let long = "x".repeat(201);
        let tree = Tree::from(json!({"content": long.clone()}));
        assert_eq!(to_markdown(&tree), format!("# content\n\n```\n{long}\n```"));

        let short = "x".repeat(200);
        let tree = Tree::from(json!({"content": short.clone()}));
        assert_eq!(to_markdown(&tree), format!("# content\n\n**content**: {short}"));
    }

    #[test]
    fn long_text_in_other_fields_stays_inline() {
        let long = "y".repeat(500);
        let tree = Tree::from(json!({"summary": long.clone()}));
        assert_eq!(to_markdown(&tree), format!("# summary\n\n**summary**: {long}"));
    }

    #[test]
    fn non_mapping_roots() {
        assert_eq!(to_markdown(&Tree::text("plain")), "```\nplain\n```");
        assert_eq!(to_markdown(&Tree::from(json!([1, [2, 3]]))), "- 1\n- [2,3]");
    }
}
