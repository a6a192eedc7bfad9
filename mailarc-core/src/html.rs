//! HTML clean-up for decoded bodies and digest entries.

use ego_tree::NodeRef;
use scraper::{Html, Node};

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text content is written verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

/// Attributes removed by [`strip_styling`].
const STYLING_ATTRIBUTES: &[&str] = &["style", "class"];

/// Elements whose tags (not content) are removed by [`inner_content`].
const WRAPPER_ELEMENTS: &[&str] = &["html", "head", "body"];

#[derive(Debug, Clone, Copy, Default)]
struct Rules {
    drop_styling: bool,
    unwrap_document: bool,
}

/// Remove every `<style>` element and every `style`/`class` attribute.
pub fn strip_styling(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len());
    write_node(
        document.tree.root(),
        &mut out,
        Rules {
            drop_styling: true,
            unwrap_document: false,
        },
        false,
    );
    out
}

/// Content of a document without its `html`/`head`/`body` wrappers or doctype.
pub fn inner_content(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len());
    write_node(
        document.tree.root(),
        &mut out,
        Rules {
            drop_styling: false,
            unwrap_document: true,
        },
        false,
    );
    out
}

fn write_children(node: NodeRef<'_, Node>, out: &mut String, rules: Rules, raw_text: bool) {
    for child in node.children() {
        write_node(child, out, rules, raw_text);
    }
}

fn write_node(node: NodeRef<'_, Node>, out: &mut String, rules: Rules, raw_text: bool) {
    match node.value() {
        Node::Document | Node::Fragment => write_children(node, out, rules, false),
        Node::Doctype(doctype) => {
            if !rules.unwrap_document {
                out.push_str("<!DOCTYPE ");
                out.push_str(doctype.name());
                out.push('>');
            }
        }
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::Text(text) => {
            if raw_text {
                out.push_str(text);
            } else {
                out.push_str(&html_escape::encode_text(&**text));
            }
        }
        Node::Element(element) => {
            let name = element.name();
            if rules.drop_styling && name == "style" {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&name);
            if rules.unwrap_document && WRAPPER_ELEMENTS.contains(&name) {
                write_children(node, out, rules, raw);
                return;
            }

            out.push('<');
            out.push_str(name);
            for (attr, value) in element.attrs() {
                if rules.drop_styling && STYLING_ATTRIBUTES.contains(&attr) {
                    continue;
                }
                out.push(' ');
                out.push_str(attr);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(value));
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            write_children(node, out, rules, raw);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        Node::ProcessingInstruction(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_styling_removes_style_elements_and_attributes() {
        let html = r#"<html><head><style>p { color: red }</style></head>
<body><p class="x" style="color: blue" id="keep">Hi <b style="a">there</b></p></body></html>"#;
        let cleaned = strip_styling(html);
        assert!(!cleaned.contains("<style"));
        assert!(!cleaned.contains("color"));
        assert!(!cleaned.contains("class="));
        assert!(cleaned.contains(r#"<p id="keep">Hi <b>there</b></p>"#));
    }

    #[test]
    fn test_strip_styling_keeps_escaping() {
        let cleaned = strip_styling("<p>a &lt; b &amp; c</p>");
        assert!(cleaned.contains("<p>a &lt; b &amp; c</p>"));
    }

    #[test]
    fn test_void_elements_not_closed() {
        let cleaned = strip_styling(r#"<p>line<br>next<img src="a.png"></p>"#);
        assert!(cleaned.contains(r#"<p>line<br>next<img src="a.png"></p>"#));
        assert!(!cleaned.contains("</br>"));
    }

    #[test]
    fn test_inner_content_unwraps_document() {
        let html = "<!DOCTYPE html><html><head><title>T</title></head><body><div>Body</div></body></html>";
        let inner = inner_content(html);
        assert_eq!(inner, "<title>T</title><div>Body</div>");
    }

    #[test]
    fn test_inner_content_of_fragment() {
        assert_eq!(inner_content("<p>only</p>"), "<p>only</p>");
    }

    #[test]
    fn test_script_text_is_raw() {
        let inner = inner_content("<script>if (a < b) {}</script>");
        assert!(inner.contains("<script>if (a < b) {}</script>"));
    }
}
