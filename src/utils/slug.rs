/// Placeholder prefix some import pipelines put on candidate slugs; it is
/// stripped before slug derivation.
pub const STUB_PREFIX: &str = "_stub_";

/// Derive a URL-safe slug: lowercase alphanumerics with single hyphens.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_hyphen = true;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

pub fn strip_stub_prefix(candidate: &str) -> &str {
    candidate.strip_prefix(STUB_PREFIX).unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Demo"), "demo");
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
    }

    #[test]
    fn test_slugify_collapses_runs() {
        assert_eq!(slugify("a---b"), "a-b");
        assert_eq!(slugify("trailing..."), "trailing");
    }

    #[test]
    fn test_strip_stub_prefix() {
        assert_eq!(strip_stub_prefix("_stub_my-title"), "my-title");
        assert_eq!(strip_stub_prefix("my-title"), "my-title");
    }
}
