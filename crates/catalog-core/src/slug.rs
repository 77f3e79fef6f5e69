//! Handler (slug) derivation and text cleanup for titles and bodies.

use std::sync::LazyLock;

use regex::Regex;

/// Longest generated SEO description, in characters.
pub const SEO_DESC_MAX_CHARS: usize = 320;

const SLUG_SEPARATORS: &[char] = &[
    ',', '!', '/', '?', '%', '#', '&', '=', '$', '*', '+', '[', ']', '(', ')', '{', '}', '"',
    '\'', '，',
];

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Lowercase `title` and replace separators and whitespace with `-`, one
/// for one.
///
/// ```
/// assert_eq!(catalog_core::normalize_title("Red Shoe"), "red-shoe");
/// ```
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_whitespace() || SLUG_SEPARATORS.contains(&c) {
                '-'
            } else {
                c
            }
        })
        .collect()
}

/// Base-36 (`0-9a-z`) encoding of `id`, left-padded with `0` to at least
/// five characters.
#[must_use]
pub fn base36_suffix(id: i64) -> String {
    let mut n = id.unsigned_abs();
    let mut digits = Vec::with_capacity(8);
    loop {
        // remainder is always < 36
        #[allow(clippy::cast_possible_truncation)]
        let digit = (n % 36) as u32;
        digits.push(char::from_digit(digit, 36).unwrap_or('0'));
        n /= 36;
        if n == 0 {
            break;
        }
    }
    while digits.len() < 5 {
        digits.push('0');
    }
    digits.iter().rev().collect()
}

/// `"{origin}-{count}"`, the first disambiguation attempt.
#[must_use]
pub fn handler_with_count(origin: &str, count: i64) -> String {
    format!("{origin}-{count}")
}

/// `"{origin}-{base36(id)}"`, used when the counted form is already taken.
#[must_use]
pub fn handler_with_id(origin: &str, id: i64) -> String {
    format!("{origin}-{}", base36_suffix(id))
}

#[must_use]
pub fn strip_tags(html: &str) -> String {
    HTML_TAG_RE.replace_all(html, "").into_owned()
}

/// Plain-text description derived from an HTML body: tags removed,
/// `&nbsp;` and whitespace runs collapsed to single spaces, truncated to
/// [`SEO_DESC_MAX_CHARS`] characters.
#[must_use]
pub fn default_seo_desc(body_html: &str) -> String {
    let text = strip_tags(body_html).replace("&nbsp;", " ");
    let text = WHITESPACE_RE.replace_all(text.trim(), " ");
    text.chars().take(SEO_DESC_MAX_CHARS).collect()
}
