//! HTML rendering of document trees.

use super::attributes::{CONTENT_KEY, SRC_KEY, STYLE_KEY};
use super::node::Node;

/// Renders `node` and its subtree to an HTML fragment.
///
/// `text` emits raw content, `image` a self-closing tag, mapped markups wrap
/// their rendered children, and unknown markups fall back to `div` unless
/// they render no children at all.
pub fn render(node: &Node) -> String {
    let attributes = node.attributes();

    match node.markup() {
        "text" => return attributes.text(CONTENT_KEY).unwrap_or_default(),
        "image" => {
            return match attributes.text(SRC_KEY).filter(|src| !src.is_empty()) {
                Some(src) => format!("\t<img src=\"{src}\" alt=\"image\" />\n"),
                None => "\t<img alt=\"image\" />\n".to_string(),
            }
        }
        _ => {}
    }

    let body: String = node.children().iter().map(render).collect();
    let style = match attributes.text(STYLE_KEY).filter(|style| !style.is_empty()) {
        Some(style) => format!(" style=\"{style}\""),
        None => String::new(),
    };

    match node.markup() {
        "document" => body,
        "paragraph" => format!("\t<p{style}>\n{body}\n</p>\n"),
        "strong" => format!("<strong{style}>{body}</strong>"),
        "list" => format!("\t<ul{style}>\n{body}</ul>\n"),
        "item" => format!("\t<li{style}>\n{body}\n</li>\n"),
        "table" => format!("\t<table{style}>\n{body}</table>\n"),
        "row" => format!("\t<tr{style}>\n{body}</tr>\n"),
        "cell" => format!("\t<td{style}>\n{body}\n</td>\n"),
        _ if body.is_empty() => String::new(),
        _ => format!("\t<div{style}>\n{body}\n</div>\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::render;
    use crate::model::node::Node;
    use serde_json::json;

    #[test]
    fn renders_paragraph_with_style_and_text() {
        let node = Node::from_value(&json!({
            "markup": "paragraph",
            "style": "color: red",
            "children": [{ "markup": "text", "content": "Hi" }]
        }))
        .unwrap();

        assert_eq!(render(&node), "\t<p style=\"color: red\">\nHi\n</p>\n");
    }

    #[test]
    fn renders_image_with_and_without_src() {
        let with_src = Node::from_value(&json!({ "markup": "image", "src": "a.png" })).unwrap();
        let bare = Node::new("image");

        assert_eq!(render(&with_src), "\t<img src=\"a.png\" alt=\"image\" />\n");
        assert_eq!(render(&bare), "\t<img alt=\"image\" />\n");
    }

    #[test]
    fn unknown_markup_wraps_children_or_renders_empty() {
        let empty = Node::new("aside");
        let filled = Node::from_value(&json!({
            "markup": "aside",
            "children": [{ "markup": "text", "content": "x" }]
        }))
        .unwrap();

        assert_eq!(render(&empty), "");
        assert_eq!(render(&filled), "\t<div>\nx\n</div>\n");
    }

    #[test]
    fn document_has_no_wrapper() {
        let doc = Node::from_value(&json!({
            "markup": "document",
            "children": [
                { "markup": "strong", "children": [{ "markup": "text", "content": "b" }] }
            ]
        }))
        .unwrap();

        assert_eq!(render(&doc), "<strong>b</strong>");
    }
}
