//! A small CSS selector engine for `querySelector` and `matches`.
//!
//! Supported: type, universal, `#id`, `.class`, attribute selectors
//! (`[a]`, `=`, `~=`, `|=`, `^=`, `$=`, `*=`), compound selectors, the
//! descendant and child combinators, and comma-separated lists. Anything
//! else is rejected with [`DomError::InvalidSelector`].

use super::{Document, DomError, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    test: Option<(AttrOp, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

/// `parts[i]` and `parts[i + 1]` are joined by `combinators[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<Compound>,
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(Vec<Complex>);

impl SelectorList {
    pub fn parse(selector: &str) -> Result<Self, DomError> {
        let invalid = || DomError::InvalidSelector(selector.to_string());
        let mut list = Vec::new();
        for complex in split_list(selector) {
            list.push(parse_complex(complex).ok_or_else(invalid)?);
        }
        Ok(SelectorList(list))
    }

    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        doc.is_element(id) && self.0.iter().any(|c| c.matches_at(doc, c.parts.len() - 1, id))
    }
}

impl Complex {
    fn matches_at(&self, doc: &Document, index: usize, id: NodeId) -> bool {
        if !self.parts[index].matches(doc, id) {
            return false;
        }
        if index == 0 {
            return true;
        }
        let mut ancestor = doc.parent(id).filter(|&p| doc.is_element(p));
        match self.combinators[index - 1] {
            Combinator::Child => ancestor.is_some_and(|p| self.matches_at(doc, index - 1, p)),
            Combinator::Descendant => {
                while let Some(p) = ancestor {
                    if self.matches_at(doc, index - 1, p) {
                        return true;
                    }
                    ancestor = doc.parent(p).filter(|&pp| doc.is_element(pp));
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some(tag) = doc.tag_name(id) else {
            return false;
        };
        if self.tag.as_deref().is_some_and(|t| !t.eq_ignore_ascii_case(tag)) {
            return false;
        }
        if let Some(expected) = &self.id {
            if doc.get_attribute(id, "id") != Some(expected.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class = doc.get_attribute(id, "class").unwrap_or("");
            if !self.classes.iter().all(|c| class.split_ascii_whitespace().any(|have| have == c)) {
                return false;
            }
        }
        self.attrs.iter().all(|attr| {
            let Some(value) = doc.get_attribute(id, &attr.name) else {
                return false;
            };
            match &attr.test {
                None => true,
                Some((op, expected)) => match op {
                    AttrOp::Equals => value == expected,
                    AttrOp::Includes => value.split_ascii_whitespace().any(|v| v == expected),
                    AttrOp::DashMatch => {
                        value == expected
                            || value.strip_prefix(expected.as_str()).is_some_and(|rest| rest.starts_with('-'))
                    }
                    AttrOp::Prefix => !expected.is_empty() && value.starts_with(expected.as_str()),
                    AttrOp::Suffix => !expected.is_empty() && value.ends_with(expected.as_str()),
                    AttrOp::Substring => !expected.is_empty() && value.contains(expected.as_str()),
                },
            }
        })
    }
}

/// All elements under `scope` matching `selector`, in document order.
pub fn query(doc: &Document, scope: NodeId, selector: &str, first_only: bool) -> Result<Vec<NodeId>, DomError> {
    let list = SelectorList::parse(selector)?;
    let mut found = Vec::new();
    for id in doc.descendants(scope) {
        if list.matches(doc, id) {
            found.push(id);
            if first_only {
                break;
            }
        }
    }
    Ok(found)
}

pub fn matches(doc: &Document, id: NodeId, selector: &str) -> Result<bool, DomError> {
    Ok(SelectorList::parse(selector)?.matches(doc, id))
}

/// Split a selector list at commas outside brackets and quotes.
fn split_list(selector: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quote = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut chars = selector.char_indices();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(_), '\\') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                out.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&selector[start..]);
    out
}

fn parse_complex(input: &str) -> Option<Complex> {
    let mut chars = input.trim().chars().peekable();
    let mut parts = Vec::new();
    let mut combinators = Vec::new();
    let mut pending: Option<Combinator> = None;

    loop {
        let mut saw_space = false;
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
            saw_space = true;
        }
        match chars.peek() {
            None => break,
            Some('>') => {
                if parts.is_empty() || pending == Some(Combinator::Child) {
                    return None;
                }
                chars.next();
                pending = Some(Combinator::Child);
                continue;
            }
            Some(_) => {
                if !parts.is_empty() {
                    let combinator = match pending.take() {
                        Some(c) => c,
                        None if saw_space => Combinator::Descendant,
                        None => return None,
                    };
                    combinators.push(combinator);
                }
                parts.push(parse_compound(&mut chars)?);
            }
        }
    }

    if parts.is_empty() || pending.is_some() {
        return None;
    }
    Some(Complex { parts, combinators })
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn parse_compound(chars: &mut Chars<'_>) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut empty = true;
    loop {
        match chars.peek().copied() {
            Some('*') if empty => {
                chars.next();
            }
            Some('#') => {
                chars.next();
                compound.id = Some(parse_ident(chars)?);
            }
            Some('.') => {
                chars.next();
                compound.classes.push(parse_ident(chars)?);
            }
            Some('[') => {
                chars.next();
                compound.attrs.push(parse_attribute(chars)?);
            }
            Some(c) if empty && is_ident_char(c) => {
                compound.tag = Some(parse_ident(chars)?.to_ascii_lowercase());
            }
            Some(c) if c.is_whitespace() || c == '>' => break,
            None => break,
            Some(_) => return None,
        }
        empty = false;
    }
    (!empty).then_some(compound)
}

fn parse_attribute(chars: &mut Chars<'_>) -> Option<AttrSelector> {
    skip_spaces(chars);
    let name = parse_ident(chars)?.to_ascii_lowercase();
    skip_spaces(chars);
    let op = match chars.next()? {
        ']' => return Some(AttrSelector { name, test: None }),
        '=' => AttrOp::Equals,
        c => {
            let op = match c {
                '~' => AttrOp::Includes,
                '|' => AttrOp::DashMatch,
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                '*' => AttrOp::Substring,
                _ => return None,
            };
            if chars.next()? != '=' {
                return None;
            }
            op
        }
    };
    skip_spaces(chars);
    let value = match chars.peek().copied()? {
        quote @ ('"' | '\'') => {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next()? {
                    '\\' => value.push(chars.next()?),
                    c if c == quote => break,
                    c => value.push(c),
                }
            }
            value
        }
        _ => parse_ident(chars)?,
    };
    skip_spaces(chars);
    if chars.next()? != ']' {
        return None;
    }
    Some(AttrSelector {
        name,
        test: Some((op, value)),
    })
}

fn parse_ident(chars: &mut Chars<'_>) -> Option<String> {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if c == '\\' {
            chars.next();
            ident.push(chars.next()?);
        } else if is_ident_char(c) {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    (!ident.is_empty()).then_some(ident)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn skip_spaces(chars: &mut Chars<'_>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Document {
        let mut doc = Document::new();
        doc.set_inner_html(
            doc.body(),
            r#"<main id="app"><ul class="list big"><li data-k="a-1">a</li><li class="on" data-k="b">b</li></ul><p><span lang="en-GB">c</span></p></main>"#,
        )
        .unwrap();
        doc
    }

    fn tags(doc: &Document, selector: &str) -> Vec<String> {
        query(doc, doc.root(), selector, false)
            .unwrap()
            .into_iter()
            .map(|id| {
                let tag = doc.tag_name(id).unwrap_or_default();
                format!("{tag}:{}", doc.text_content(id))
            })
            .collect()
    }

    #[test]
    fn test_simple_selectors() {
        let doc = fixture();
        assert_eq!(tags(&doc, "li"), vec!["li:a", "li:b"]);
        assert_eq!(tags(&doc, "#app > ul.big > li.on"), vec!["li:b"]);
        assert_eq!(tags(&doc, "main span"), vec!["span:c"]);
        assert_eq!(tags(&doc, "main > span"), Vec::<String>::new());
        assert_eq!(tags(&doc, "LI[data-k]"), vec!["li:a", "li:b"]);
    }

    #[test]
    fn test_attribute_operators() {
        let doc = fixture();
        assert_eq!(tags(&doc, "[data-k=b]"), vec!["li:b"]);
        assert_eq!(tags(&doc, "[data-k^='a']"), vec!["li:a"]);
        assert_eq!(tags(&doc, "[data-k$=\"1\"]"), vec!["li:a"]);
        assert_eq!(tags(&doc, "[data-k*=-]"), vec!["li:a"]);
        assert_eq!(tags(&doc, "[class~=big]"), vec!["ul:ab"]);
        assert_eq!(tags(&doc, "[lang|=en]"), vec!["span:c"]);
    }

    #[test]
    fn test_lists_keep_document_order() {
        let doc = fixture();
        assert_eq!(tags(&doc, "span, li.on"), vec!["li:b", "span:c"]);
        let first = query(&doc, doc.root(), "li", true).unwrap();
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_comma_inside_attribute_value() {
        let mut doc = Document::new();
        doc.set_inner_html(doc.body(), r#"<i data-x="a,b">1</i><i data-x="a">2</i><b>3</b>"#)
            .unwrap();
        assert_eq!(tags(&doc, r#"[data-x="a,b"]"#), vec!["i:1"]);
        assert_eq!(tags(&doc, "b, [data-x='a,b']"), vec!["i:1", "b:3"]);
    }

    #[test]
    fn test_unsupported_selectors_are_errors() {
        for bad in ["li:first-child", "a + b", "", "> li", "li >", "[x", "a,,b"] {
            assert!(
                matches!(SelectorList::parse(bad), Err(DomError::InvalidSelector(_))),
                "{bad} should be rejected"
            );
        }
    }
}
