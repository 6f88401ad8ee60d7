//! Case-insensitive tag lookup for plain-string HTML edits

/// Byte offset of the first ASCII case-insensitive match of `needle`
pub(crate) fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets valid for the original string
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Byte offset of the last ASCII case-insensitive match of `needle`
pub(crate) fn rfind_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .rfind(&needle.to_ascii_lowercase())
}

/// Offset just past the `>` of the first opening `<tag ...>`
///
/// `<body>` and `<body class="x">` match; `<bodyx>` does not.
pub(crate) fn end_of_open_tag(html: &str, tag: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{}", tag.to_ascii_lowercase());
    let mut from = 0;
    while let Some(rel) = lower[from..].find(&open) {
        let after = from + rel + open.len();
        match lower.as_bytes().get(after) {
            Some(b'>') => return Some(after + 1),
            Some(c) if c.is_ascii_whitespace() || *c == b'/' => {
                return lower[after..].find('>').map(|gt| after + gt + 1);
            }
            Some(_) => from = after,
            None => return None,
        }
    }
    None
}

/// `html` with `insert` placed at byte offset `at`
pub(crate) fn insert_at(html: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(html.len() + insert.len());
    out.push_str(&html[..at]);
    out.push_str(insert);
    out.push_str(&html[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_tags_regardless_of_case() {
        let html = "<HTML><Head></HEAD><BODY>x</Body></html>";
        assert_eq!(find_ci(html, "</head>"), Some(12));
        assert_eq!(rfind_ci(html, "</body>"), Some(26));
    }

    #[test]
    fn open_tag_with_attributes() {
        let html = "<html><bodyguard></bodyguard><body class=\"a\">hi</body></html>";
        let at = end_of_open_tag(html, "body").unwrap();
        assert_eq!(&html[at..at + 2], "hi");
        assert_eq!(end_of_open_tag("<p>no body</p>", "body"), None);
    }

    #[test]
    fn offsets_survive_multibyte_text() {
        let html = "<p>标题</p></body>";
        let at = rfind_ci(html, "</body>").unwrap();
        assert_eq!(insert_at(html, at, "<i/>"), "<p>标题</p><i/></body>");
    }
}
