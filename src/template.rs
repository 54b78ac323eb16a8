use crate::dom;
use kuchiki::NodeRef;

/// Clones a header/footer template and substitutes `{{ page }}` and
/// `{{ num_pages }}` placeholders in its text nodes. The template itself is
/// never mutated; one template is instantiated once per generated page.
pub fn render(template: &NodeRef, page: u32, num_pages: u32) -> NodeRef {
    let instance = dom::deep_clone(template);
    for node in instance.inclusive_descendants() {
        if let Some(text) = node.as_text() {
            let mut text = text.borrow_mut();
            if text.contains("{{") {
                *text = substitute(&text, page, num_pages);
            }
        }
    }
    instance
}

fn substitute(input: &str, page: u32, num_pages: u32) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let token = &rest[open + 2..open + 2 + close];
        out.push_str(&rest[..open]);
        match token.trim() {
            "page" => out.push_str(&page.to_string()),
            "num_pages" => out.push_str(&num_pages.to_string()),
            // Unknown placeholders pass through verbatim.
            _ => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &rest[open + 2 + close + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn fragment(html: &str) -> NodeRef {
        let document = kuchiki::parse_html().one(html);
        document
            .select_first("body")
            .expect("body")
            .as_node()
            .first_child()
            .expect("fragment")
    }

    #[test]
    fn substitutes_both_placeholders() {
        let template = fragment("<footer>Page {{ page }} of {{ num_pages }}</footer>");
        let instance = render(&template, 3, 9);
        assert_eq!(instance.text_contents(), "Page 3 of 9");
    }

    #[test]
    fn tolerates_tight_braces_and_keeps_unknown_tokens() {
        let template = fragment("<span>{{page}}/{{num_pages}} {{ chapter }}</span>");
        let instance = render(&template, 1, 2);
        assert_eq!(instance.text_contents(), "1/2 {{ chapter }}");
    }

    #[test]
    fn template_is_reusable_across_pages() {
        let template = fragment("<footer><em>{{ page }}</em></footer>");
        let first = render(&template, 1, 2);
        let second = render(&template, 2, 2);
        assert_eq!(template.text_contents(), "{{ page }}");
        assert_eq!(first.text_contents(), "1");
        assert_eq!(second.text_contents(), "2");
    }
}
