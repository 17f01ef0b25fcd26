use crate::models::{Language, Post};
use regex::Regex;
use std::sync::LazyLock;

// `<h2>` or `<h2 ...>`, any case. `<h20>` and `<h2x>` are not headings.
static H2_OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h2[\s/>]").expect("h2 pattern is a valid regex"));

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Whether the reader should be offered the language toggle at all.
pub fn has_secondary_variant(post: &Post) -> bool {
    non_empty(post.secondary_content.as_deref()).is_some()
}

/// The body to render: the secondary variant only when it was asked for and
/// exists, the primary one otherwise. Missing primary content yields `""`.
pub fn select_variant(post: &Post, preference: Language) -> &str {
    if preference == Language::Secondary {
        if let Some(secondary) = non_empty(post.secondary_content.as_deref()) {
            return secondary;
        }
    }
    post.primary_content.as_deref().unwrap_or("")
}

/// The language actually rendered for `preference`.
pub fn effective_language(post: &Post, preference: Language) -> Language {
    if preference == Language::Secondary && has_secondary_variant(post) {
        Language::Secondary
    } else {
        Language::Primary
    }
}

/// Splits `html` immediately before every second-level heading so ad slots
/// can be placed between the pieces. A heading at offset 0 is not a split
/// point. The pieces concatenate back to the input.
pub fn split_into_fragments(html: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut start = 0;
    for boundary in H2_OPEN_TAG.find_iter(html).map(|m| m.start()) {
        if boundary == 0 {
            continue;
        }
        fragments.push(&html[start..boundary]);
        start = boundary;
    }
    fragments.push(&html[start..]);
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(primary: Option<&str>, secondary: Option<&str>) -> Post {
        Post {
            id: "p1".to_string(),
            slug: "p1".to_string(),
            title: "P1".to_string(),
            excerpt: None,
            primary_content: primary.map(str::to_string),
            secondary_content: secondary.map(str::to_string),
            featured_image_url: None,
            category_id: None,
            status: Default::default(),
            published_at: None,
            created_at: Utc::now(),
            meta_title: None,
            meta_description: None,
            meta_keywords: None,
            ad_markup: None,
        }
    }

    #[test]
    fn secondary_preference_falls_back_when_missing_or_blank() {
        let missing = post(Some("<p>en</p>"), None);
        let blank = post(Some("<p>en</p>"), Some("  "));
        assert_eq!(select_variant(&missing, Language::Secondary), "<p>en</p>");
        assert_eq!(select_variant(&blank, Language::Secondary), "<p>en</p>");
        assert!(!has_secondary_variant(&blank));
        assert_eq!(effective_language(&blank, Language::Secondary), Language::Primary);
    }

    #[test]
    fn secondary_is_used_only_when_asked_for() {
        let both = post(Some("<p>en</p>"), Some("<p>hi</p>"));
        assert_eq!(select_variant(&both, Language::Primary), "<p>en</p>");
        assert_eq!(select_variant(&both, Language::Secondary), "<p>hi</p>");
        assert!(has_secondary_variant(&both));
    }

    #[test]
    fn missing_primary_renders_empty() {
        assert_eq!(select_variant(&post(None, None), Language::Primary), "");
    }

    #[test]
    fn splits_before_each_h2_giving_n_plus_one_fragments() {
        let html = "<p>intro</p><h2>One</h2><p>a</p><H2 class=\"x\">Two</H2><p>b</p>";
        let fragments = split_into_fragments(html);
        assert_eq!(
            fragments,
            vec!["<p>intro</p>", "<h2>One</h2><p>a</p>", "<H2 class=\"x\">Two</H2><p>b</p>"]
        );
        assert_eq!(fragments.concat(), html);
    }

    #[test]
    fn leading_heading_and_lookalike_tags_do_not_split() {
        assert_eq!(split_into_fragments("<h2>Top</h2><p>x</p>"), vec!["<h2>Top</h2><p>x</p>"]);
        assert_eq!(split_into_fragments("<p>a</p><h20>b</h20>"), vec!["<p>a</p><h20>b</h20>"]);
        assert_eq!(split_into_fragments(""), vec![""]);
    }

    #[test]
    fn splitting_is_deterministic() {
        let html = "<p>a</p><h2>b</h2><p>c</p>";
        assert_eq!(split_into_fragments(html), split_into_fragments(html));
    }
}
