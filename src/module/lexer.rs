//! Just enough of a JavaScript tokenizer to find module syntax.
//!
//! It understands where strings, template literals, comments and regular
//! expression literals begin and end, so import/export-looking text inside
//! them is never mistaken for a statement. It does not validate anything.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("unterminated {what} starting on line {line}")]
    Unterminated { what: &'static str, line: usize },

    #[error("malformed {statement} statement on line {line}: expected {expected}")]
    Malformed {
        statement: &'static str,
        line: usize,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Punct,
    Str,
    Template,
    Regex,
    Number,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// A line terminator sits between this token and the previous one.
    pub newline_before: bool,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    /// Whether a statement may legally end right after this token.
    pub fn can_end_expression(&self, src: &str) -> bool {
        match self.kind {
            TokenKind::Punct => matches!(self.text(src), ")" | "]" | "}"),
            TokenKind::Ident => !is_operator_keyword(self.text(src)),
            _ => true,
        }
    }
}

/// Keywords after which a `/` starts a regular expression.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

pub(crate) fn is_operator_keyword(word: &str) -> bool {
    REGEX_PREFIX_KEYWORDS.contains(&word)
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, TransformError> {
    Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        newline: false,
        tokens: Vec::new(),
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    newline: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, TransformError> {
        while let Some(&b) = self.bytes.get(self.pos) {
            let start = self.pos;
            match b {
                b'\n' => {
                    self.newline = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment()?,
                b'\'' | b'"' => {
                    self.pos = skip_string(self.bytes, self.pos, self.src)?;
                    self.push(TokenKind::Str, start);
                }
                b'`' => {
                    self.pos = skip_template(self.bytes, self.pos, self.src)?;
                    self.push(TokenKind::Template, start);
                }
                b'/' if self.regex_allowed() => {
                    self.skip_regex()?;
                    self.push(TokenKind::Regex, start);
                }
                b'0'..=b'9' => {
                    self.skip_number();
                    self.push(TokenKind::Number, start);
                }
                b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.skip_number();
                    self.push(TokenKind::Number, start);
                }
                c if is_ident_byte(c) => {
                    while self.bytes.get(self.pos).copied().is_some_and(is_ident_byte) {
                        self.pos += 1;
                    }
                    self.push(TokenKind::Ident, start);
                }
                _ => {
                    self.pos += 1;
                    self.push(TokenKind::Punct, start);
                }
            }
        }
        Ok(self.tokens)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            start,
            end: self.pos,
            newline_before: std::mem::take(&mut self.newline),
        });
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(prev) => match prev.kind {
                TokenKind::Punct => !matches!(prev.text(self.src), ")" | "]" | "}"),
                TokenKind::Ident => is_operator_keyword(prev.text(self.src)),
                _ => false,
            },
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), TransformError> {
        let start = self.pos;
        let Some(len) = self.src[start + 2..].find("*/") else {
            return Err(unterminated("comment", self.src, start));
        };
        let end = start + 2 + len + 2;
        if self.src[start..end].contains('\n') {
            self.newline = true;
        }
        self.pos = end;
        Ok(())
    }

    fn skip_regex(&mut self) -> Result<(), TransformError> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') => return Err(unterminated("regular expression", self.src, start)),
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        while self.bytes.get(self.pos).copied().is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        Ok(())
    }

    fn skip_number(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .copied()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'.' || c == b'_')
        {
            self.pos += 1;
        }
    }
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}

fn unterminated(what: &'static str, src: &str, at: usize) -> TransformError {
    TransformError::Unterminated {
        what,
        line: line_of(src, at),
    }
}

pub(crate) fn line_of(src: &str, at: usize) -> usize {
    src[..at.min(src.len())].matches('\n').count() + 1
}

/// Returns the offset just past the closing quote.
fn skip_string(bytes: &[u8], start: usize, src: &str) -> Result<usize, TransformError> {
    let quote = bytes[start];
    let mut pos = start + 1;
    loop {
        match bytes.get(pos) {
            None | Some(b'\n') => return Err(unterminated("string", src, start)),
            Some(b'\\') => pos += 2,
            Some(&b) if b == quote => return Ok(pos + 1),
            Some(_) => pos += 1,
        }
    }
}

/// Returns the offset just past the closing backtick. Substitutions are
/// skipped with brace matching, including nested strings and templates.
fn skip_template(bytes: &[u8], start: usize, src: &str) -> Result<usize, TransformError> {
    let mut pos = start + 1;
    loop {
        match bytes.get(pos) {
            None => return Err(unterminated("template literal", src, start)),
            Some(b'\\') => pos += 2,
            Some(b'`') => return Ok(pos + 1),
            Some(b'$') if bytes.get(pos + 1) == Some(&b'{') => {
                pos = skip_substitution(bytes, pos + 2, src)?;
            }
            Some(_) => pos += 1,
        }
    }
}

fn skip_substitution(bytes: &[u8], mut pos: usize, src: &str) -> Result<usize, TransformError> {
    let start = pos;
    let mut depth = 1usize;
    loop {
        match bytes.get(pos) {
            None => return Err(unterminated("template substitution", src, start)),
            Some(b'\'') | Some(b'"') => pos = skip_string(bytes, pos, src)?,
            Some(b'`') => pos = skip_template(bytes, pos, src)?,
            Some(b'/') if bytes.get(pos + 1) == Some(&b'/') => {
                while bytes.get(pos).is_some_and(|&b| b != b'\n') {
                    pos += 1;
                }
            }
            Some(b'/') if bytes.get(pos + 1) == Some(&b'*') => {
                let Some(len) = src[pos + 2..].find("*/") else {
                    return Err(unterminated("comment", src, pos));
                };
                pos += 2 + len + 2;
            }
            Some(b'{') => {
                depth += 1;
                pos += 1;
            }
            Some(b'}') => {
                depth -= 1;
                pos += 1;
                if depth == 0 {
                    return Ok(pos);
                }
            }
            Some(_) => pos += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<&str> {
        tokenize(src).unwrap().iter().map(|t| t.text(src)).collect()
    }

    #[test]
    fn test_strings_and_comments_are_opaque() {
        let src = r#"const a = "import x from 'y'"; // export default 1
/* export const b = 2; */ let c = 'it\'s';"#;
        assert_eq!(
            texts(src),
            vec![
                "const",
                "a",
                "=",
                r#""import x from 'y'""#,
                ";",
                "let",
                "c",
                "=",
                r"'it\'s'",
                ";"
            ]
        );
    }

    #[test]
    fn test_template_with_nested_substitutions() {
        let src = "html`<p>${items.map(i => `<b>${i}</b>`).join('}')}</p>`; x";
        let tokens = texts(src);
        assert_eq!(tokens[0], "html");
        assert!(tokens[1].starts_with('`') && tokens[1].ends_with("</p>`"));
        assert_eq!(&tokens[2..], &[";", "x"]);
    }

    #[test]
    fn test_regex_versus_division() {
        let src = "a = b / c; re = /import\\/x[/]/g; n = (1) / 2";
        let tokens = tokenize(src).unwrap();
        let regexes: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Regex)
            .map(|t| t.text(src))
            .collect();
        assert_eq!(regexes, vec!["/import\\/x[/]/g"]);
    }

    #[test]
    fn test_newline_tracking() {
        let src = "a\n/* multi\nline */ b c";
        let tokens = tokenize(src).unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert!(!tokens[2].newline_before);
    }

    #[test]
    fn test_unterminated_string_reports_line() {
        let err = tokenize("let a = 1;\nlet b = 'oops\n").unwrap_err();
        assert_eq!(
            err,
            TransformError::Unterminated {
                what: "string",
                line: 2
            }
        );
    }
}
