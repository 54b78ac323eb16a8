use html5ever::{LocalName, Namespace, QualName};
use kuchiki::{Attribute, ExpandedName, NodeRef};

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

pub fn html_name(local: &str) -> QualName {
    QualName::new(None, Namespace::from(HTML_NS), LocalName::from(local))
}

pub fn make_element(local: &str) -> NodeRef {
    NodeRef::new_element(html_name(local), Vec::<(ExpandedName, Attribute)>::new())
}

/// Lowercased local tag name, or `None` for non-element nodes.
pub fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|el| el.name.local.as_ref().to_ascii_lowercase())
}

pub fn is_whitespace_text(node: &NodeRef) -> bool {
    node.as_text()
        .map(|text| text.borrow().trim().is_empty())
        .unwrap_or(false)
}

pub fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attrs = element.attributes.borrow();
    attrs.get(name).map(|value| value.to_string())
}

/// Copies one node without its children. Element attributes are kept.
pub fn shallow_clone(node: &NodeRef) -> NodeRef {
    if let Some(element) = node.as_element() {
        let attributes = element.attributes.borrow().map.clone();
        NodeRef::new_element(element.name.clone(), attributes)
    } else if let Some(text) = node.as_text() {
        NodeRef::new_text(text.borrow().clone())
    } else if let Some(comment) = node.as_comment() {
        NodeRef::new_comment(comment.borrow().clone())
    } else {
        // Doctype/document nodes never occur inside content fragments.
        NodeRef::new_document()
    }
}

pub fn deep_clone(node: &NodeRef) -> NodeRef {
    let copy = shallow_clone(node);
    for child in node.children() {
        copy.append(deep_clone(&child));
    }
    copy
}

/// Concatenated non-whitespace text leaves, in tree order.
pub fn leaf_text(node: &NodeRef) -> String {
    let mut out = String::new();
    for descendant in node.inclusive_descendants() {
        if let Some(text) = descendant.as_text() {
            let text = text.borrow();
            if !text.trim().is_empty() {
                out.push_str(text.trim());
            }
        }
    }
    out
}

/// Previous sibling that is not whitespace-only text.
pub fn previous_content_sibling(node: &NodeRef) -> Option<NodeRef> {
    let mut cursor = node.previous_sibling();
    while let Some(sibling) = cursor {
        if !is_whitespace_text(&sibling) {
            return Some(sibling);
        }
        cursor = sibling.previous_sibling();
    }
    None
}

pub fn heading_rank(tag: &str) -> Option<u32> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn body_of(html: &str) -> NodeRef {
        let document = kuchiki::parse_html().one(html);
        document
            .select_first("body")
            .expect("body")
            .as_node()
            .clone()
    }

    #[test]
    fn deep_clone_copies_attributes_and_children() {
        let body = body_of("<div class=\"a\"><p>one</p><p>two</p></div>");
        let div = body.first_child().expect("div");
        let copy = deep_clone(&div);
        assert_eq!(attribute(&copy, "class").as_deref(), Some("a"));
        assert_eq!(copy.children().count(), 2);
        assert_eq!(leaf_text(&copy), "onetwo");
        // The copy is detached from the original tree.
        assert!(copy.parent().is_none());
        assert_eq!(div.children().count(), 2);
    }

    #[test]
    fn previous_content_sibling_skips_whitespace_text() {
        let body = body_of("<p>lead</p>\n   \n<ul><li>x</li></ul>");
        let list = body.last_child().expect("ul");
        let previous = previous_content_sibling(&list).expect("sibling");
        assert_eq!(tag_name(&previous).as_deref(), Some("p"));
    }

    #[test]
    fn leaf_text_ignores_whitespace_leaves() {
        let body = body_of("<div> <p>a</p> <p>b</p> </div>");
        assert_eq!(leaf_text(&body), "ab");
    }
}
