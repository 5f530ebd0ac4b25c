use bytes::Bytes;
use pulldown_cmark::{html, Options, Parser};

use crate::html::scan_html;
use crate::Extraction;

/// Render Markdown to HTML in memory. Link discovery then reuses the HTML
/// back-end, so reference links, autolinks, and inline HTML all funnel
/// through the same tag table.
fn render_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(markdown, options);
    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, parser);
    rendered
}

/// Extract links from a Markdown document.
pub fn scan_markdown(bytes: &[u8]) -> Extraction {
    let text = String::from_utf8_lossy(bytes);
    let rendered = render_to_html(&text);
    scan_html([Bytes::from(rendered)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_inline_links_and_images() {
        let md = "see [the docs](./docs.html) and ![logo](./exists.png)";
        let links = scan_markdown(md.as_bytes()).links;
        assert_eq!(links, vec!["./docs.html", "./exists.png"]);
    }

    #[test]
    fn finds_reference_and_auto_links() {
        let md = "\
[ref][target]

[target]: http://example.com/ref

<http://example.com/auto>
";
        let links = scan_markdown(md.as_bytes()).links;
        assert!(links.contains(&"http://example.com/ref".to_string()));
        assert!(links.contains(&"http://example.com/auto".to_string()));
    }

    #[test]
    fn inline_html_goes_through_the_same_table() {
        let md = "raw html: <img src=\"inline.png\">";
        let links = scan_markdown(md.as_bytes()).links;
        assert_eq!(links, vec!["inline.png"]);
    }

    #[test]
    fn plain_text_has_no_links() {
        assert!(scan_markdown(b"nothing to see here").links.is_empty());
    }
}
