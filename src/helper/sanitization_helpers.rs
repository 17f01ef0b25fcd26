use regex::Regex;
use std::sync::LazyLock;

// A complete opening, closing or self-closing tag, or a comment opener. A
// lone `<` in running text is not markup.
static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>|<!--").expect("markup pattern is a valid regex")
});

/// Cleans rich-text HTML from the editor down to ammonia's safe tag set plus
/// `class`. Scripts, event handlers and `javascript:` links are removed.
pub fn sanitize_rich_text(html: &str) -> String {
    ammonia::Builder::default()
        .add_generic_attributes(&["class"])
        .link_rel(Some("noopener noreferrer nofollow"))
        .clean(html)
        .to_string()
}

/// Whether a plain-text field carries HTML tags.
pub fn contains_markup(input: &str) -> bool {
    MARKUP.is_match(input)
}
