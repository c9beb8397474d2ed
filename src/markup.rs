//! Tolerant head/body extraction from render input.
//!
//! Input may be a whole document or a bare fragment. Tags are located by
//! case-insensitive substring search; nothing here validates structure.

/// The pieces of an input document. All slices borrow from the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentParts<'a> {
    pub head: &'a str,
    pub body: &'a str,
    /// The raw `<html …>` start tag, if present
    pub html_tag: Option<&'a str>,
    /// The raw `<body …>` start tag, if present
    pub body_tag: Option<&'a str>,
}

pub fn split_document(input: &str) -> DocumentParts<'_> {
    let lower = input.to_ascii_lowercase();
    let html = find_start_tag(&lower, "html", 0);
    let head = find_start_tag(&lower, "head", 0);
    let body = find_start_tag(&lower, "body", head.map_or(0, |(_, end)| end));

    let html_tag = html.map(|(start, end)| &input[start..end]);
    let body_tag = body.map(|(start, end)| &input[start..end]);
    let document_end = |from: usize| {
        lower[from..]
            .rfind("</html")
            .map_or(input.len(), |i| from + i)
    };

    let head_text = match head {
        Some((_, open_end)) => {
            let close = lower[open_end..]
                .find("</head")
                .map(|i| open_end + i)
                .or_else(|| body.map(|(start, _)| start))
                .unwrap_or_else(|| document_end(open_end));
            &input[open_end..close]
        }
        None => "",
    };

    let body_text = match (body, head, html) {
        (Some((_, open_end)), _, _) => {
            let close = lower[open_end..]
                .rfind("</body")
                .map_or_else(|| document_end(open_end), |i| open_end + i);
            &input[open_end..close]
        }
        (None, Some((_, open_end)), _) => {
            let after_head = lower[open_end..]
                .find("</head")
                .and_then(|i| tag_end(&lower, open_end + i))
                .unwrap_or(input.len());
            &input[after_head..document_end(after_head)]
        }
        (None, None, Some((_, open_end))) => &input[open_end..document_end(open_end)],
        (None, None, None) => strip_doctype(input, &lower),
    };

    DocumentParts {
        head: head_text,
        body: body_text,
        html_tag,
        body_tag,
    }
}

/// Byte range of the first `<name …>` start tag at or after `from`.
fn find_start_tag(lower: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let needle = format!("<{name}");
    let mut search = from;
    while let Some(i) = lower[search..].find(&needle) {
        let start = search + i;
        let after = start + needle.len();
        match lower.as_bytes().get(after) {
            Some(b'>') | Some(b'/') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(0x0c) => {
                return tag_end(lower, start).map(|end| (start, end));
            }
            // `<header>` and friends
            _ => search = after,
        }
    }
    None
}

/// Offset just past the `>` closing the tag that starts at `start`,
/// skipping quoted attribute values.
fn tag_end(lower: &str, start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, b) in lower.bytes().enumerate().skip(start) {
        match (quote, b) {
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (Some(q), b) if b == q => quote = None,
            (None, b'>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

fn strip_doctype<'a>(input: &'a str, lower: &str) -> &'a str {
    let trimmed = lower.trim_start();
    if !trimmed.starts_with("<!doctype") {
        return input;
    }
    let offset = lower.len() - trimmed.len();
    match lower[offset..].find('>') {
        Some(i) => &input[offset + i + 1..],
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_document() {
        let parts = split_document(
            "<!DOCTYPE html><HTML lang=\"en\"><Head><title>T</title></HEAD><body class=\"x\"><p>hi</p></BODY></html>",
        );
        assert_eq!(parts.head, "<title>T</title>");
        assert_eq!(parts.body, "<p>hi</p>");
        assert_eq!(parts.html_tag, Some("<HTML lang=\"en\">"));
        assert_eq!(parts.body_tag, Some("<body class=\"x\">"));
    }

    #[test]
    fn test_bare_fragment_is_body() {
        let parts = split_document("<my-badge label=\"x\"></my-badge>");
        assert_eq!(parts.head, "");
        assert_eq!(parts.body, "<my-badge label=\"x\"></my-badge>");
        assert_eq!(parts.html_tag, None);

        let parts = split_document("  <!doctype html><p>x</p>");
        assert_eq!(parts.body, "<p>x</p>");
    }

    #[test]
    fn test_header_is_not_head() {
        let parts = split_document("<header>nav</header><main>m</main>");
        assert_eq!(parts.head, "");
        assert_eq!(parts.body, "<header>nav</header><main>m</main>");

        let parts = split_document("<body><header>h</header><tbody-like></tbody-like></body>");
        assert_eq!(parts.body, "<header>h</header><tbody-like></tbody-like>");
    }

    #[test]
    fn test_missing_close_tags() {
        let parts = split_document("<html><head><meta charset=\"utf-8\"><body><p>a");
        assert_eq!(parts.head, "<meta charset=\"utf-8\">");
        assert_eq!(parts.body, "<p>a");
    }

    #[test]
    fn test_head_without_body_tag() {
        let parts = split_document("<html><head><title>t</title></head><p>b</p></html>");
        assert_eq!(parts.head, "<title>t</title>");
        assert_eq!(parts.body, "<p>b</p>");
        assert_eq!(parts.body_tag, None);
    }

    #[test]
    fn test_html_without_head_or_body() {
        let parts = split_document("<html><p>only</p></html>");
        assert_eq!(parts.body, "<p>only</p>");
    }

    #[test]
    fn test_quoted_angle_bracket_in_start_tag() {
        let parts = split_document("<body data-x=\"a>b\"><i>x</i></body>");
        assert_eq!(parts.body_tag, Some("<body data-x=\"a>b\">"));
        assert_eq!(parts.body, "<i>x</i>");
    }
}
