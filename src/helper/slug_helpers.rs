/// Converts text into a URL-safe slug.
///
/// Lowercases, turns every run of characters outside `[a-z0-9]` into a single
/// hyphen and strips hyphens from both ends. Returns an empty string when the
/// text has no ASCII letters or digits.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// True for non-empty strings of `[a-z0-9]` groups joined by single hyphens.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.split('-').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_title_with_punctuation() {
        assert_eq!(slugify("Bugatti Tourbillon: New Era!"), "bugatti-tourbillon-new-era");
    }

    #[test]
    fn slugify_collapses_runs_and_trims_edges() {
        assert_eq!(slugify("  --Hello,   World--  "), "hello-world");
        assert_eq!(slugify("a__b..c"), "a-b-c");
    }

    #[test]
    fn slugify_treats_non_ascii_letters_as_separators() {
        assert_eq!(slugify("Café Racer"), "caf-racer");
        assert_eq!(slugify("日本"), "");
    }

    #[test]
    fn slugify_is_idempotent_and_always_valid() {
        let titles = [
            "Bugatti Tourbillon: New Era!",
            "2025 F1 Season -- Round 3",
            "Ünïcödé & Symbols ***",
            "already-a-slug",
            "UPPER lower 123",
            "x",
        ];
        for title in titles {
            let once = slugify(title);
            assert_eq!(slugify(&once), once, "not idempotent for {:?}", title);
            assert!(is_valid_slug(&once), "invalid slug {:?} for {:?}", once, title);
            assert_eq!(once, once.to_lowercase());
        }
    }

    #[test]
    fn slugify_is_empty_only_without_alphanumerics() {
        assert_eq!(slugify("!!! ???"), "");
        assert_eq!(slugify(""), "");
        assert_ne!(slugify("!a!"), "");
    }

    #[test]
    fn validity_rules() {
        assert!(is_valid_slug("a-b-1"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("-a"));
        assert!(!is_valid_slug("a-"));
        assert!(!is_valid_slug("a--b"));
        assert!(!is_valid_slug("A-b"));
        assert!(!is_valid_slug("a_b"));
    }
}
