//! Rewrites top-level ES module syntax into plain script code.
//!
//! Imports turn into calls to `__ssr_import(specifier)`, exports into
//! assignments on `__ssr_exports`. Exported declarations keep their
//! declaration; their names are returned so the caller can copy the final
//! values once the body has run. Every rewrite keeps the number of lines it
//! replaces, so stack traces still point at the author's source lines.

use super::lexer::{line_of, tokenize, Token, TokenKind, TransformError};

pub(crate) const IMPORT_FN: &str = "__ssr_import";
pub(crate) const EXPORTS_OBJ: &str = "__ssr_exports";
pub(crate) const REEXPORT_FN: &str = "__ssr_reexport";
pub(crate) const META_OBJ: &str = "__ssr_meta";

/// The rewritten body of a module plus what it imports and exports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSyntax {
    pub code: String,
    /// Distinct specifiers, in first-seen order
    pub imports: Vec<String>,
    /// Bindings to copy onto the exports object after execution
    pub exports: Vec<ExportBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    pub local: String,
    pub exported: String,
}

impl ExportBinding {
    fn same(name: &str) -> Self {
        Self {
            local: name.to_string(),
            exported: name.to_string(),
        }
    }
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

pub fn rewrite(src: &str) -> Result<ModuleSyntax, TransformError> {
    let tokens = tokenize(src)?;
    let mut rewriter = Rewriter {
        src,
        tokens: &tokens,
        pos: 0,
        edits: Vec::new(),
        syntax: ModuleSyntax::default(),
    };
    rewriter.run()?;

    let Rewriter {
        mut edits,
        mut syntax,
        ..
    } = rewriter;
    edits.sort_by_key(|edit| edit.start);

    let mut code = String::with_capacity(src.len() + 64);
    let mut cursor = 0;
    for edit in &edits {
        code.push_str(&src[cursor..edit.start]);
        code.push_str(&edit.text);
        let newlines = src[edit.start..edit.end].matches('\n').count();
        let emitted = edit.text.matches('\n').count();
        for _ in emitted..newlines {
            code.push('\n');
        }
        cursor = edit.end;
    }
    code.push_str(&src[cursor..]);
    syntax.code = code;
    Ok(syntax)
}

struct Rewriter<'s, 't> {
    src: &'s str,
    tokens: &'t [Token],
    pos: usize,
    edits: Vec<Edit>,
    syntax: ModuleSyntax,
}

impl<'s, 't> Rewriter<'s, 't> {
    fn run(&mut self) -> Result<(), TransformError> {
        let mut depth = 0i32;
        while self.pos < self.tokens.len() {
            let tok = self.tokens[self.pos];
            let text = tok.text(self.src);
            match (tok.kind, text) {
                (TokenKind::Punct, "{" | "(" | "[") => depth += 1,
                (TokenKind::Punct, "}" | ")" | "]") => depth -= 1,
                (TokenKind::Ident, "import") if self.is_import_meta() => {
                    let end = self.tokens[self.pos + 2].end;
                    self.replace(tok.start, end, META_OBJ.to_string());
                    self.pos += 3;
                    continue;
                }
                (TokenKind::Ident, "import") if depth == 0 && self.at_statement_start() => {
                    if !matches!(self.peek_text(1), Some("(") | Some(".")) {
                        self.import_statement()?;
                        continue;
                    }
                }
                (TokenKind::Ident, "export") if depth == 0 && self.at_statement_start() => {
                    self.export_statement()?;
                    continue;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cursor helpers
    // ------------------------------------------------------------------

    fn peek(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset)
    }

    fn peek_text(&self, offset: usize) -> Option<&'s str> {
        self.peek(offset).map(|t| t.text(self.src))
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.peek_text(0) == Some(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn line(&self) -> usize {
        let at = self
            .peek(0)
            .or_else(|| self.tokens.last())
            .map(|t| t.start)
            .unwrap_or(0);
        line_of(self.src, at)
    }

    fn malformed(&self, statement: &'static str, expected: &'static str) -> TransformError {
        TransformError::Malformed {
            statement,
            line: self.line(),
            expected,
        }
    }

    fn expect(&mut self, text: &'static str, statement: &'static str) -> Result<(), TransformError> {
        if self.eat(text) {
            Ok(())
        } else {
            Err(self.malformed(statement, text))
        }
    }

    fn ident(&mut self, statement: &'static str) -> Result<&'s str, TransformError> {
        match self.peek(0) {
            Some(tok) if tok.kind == TokenKind::Ident => {
                self.pos += 1;
                Ok(tok.text(self.src))
            }
            _ => Err(self.malformed(statement, "an identifier")),
        }
    }

    /// An identifier or string literal name, as used in import/export lists.
    fn module_export_name(&mut self, statement: &'static str) -> Result<String, TransformError> {
        match self.peek(0) {
            Some(tok) if tok.kind == TokenKind::Ident => {
                self.pos += 1;
                Ok(tok.text(self.src).to_string())
            }
            Some(tok) if tok.kind == TokenKind::Str => {
                self.pos += 1;
                Ok(unquote(tok.text(self.src)))
            }
            _ => Err(self.malformed(statement, "a binding name")),
        }
    }

    fn specifier(&mut self, statement: &'static str) -> Result<String, TransformError> {
        match self.peek(0) {
            Some(tok) if tok.kind == TokenKind::Str => {
                self.pos += 1;
                let specifier = unquote(tok.text(self.src));
                if !self.syntax.imports.contains(&specifier) {
                    self.syntax.imports.push(specifier.clone());
                }
                Ok(specifier)
            }
            _ => Err(self.malformed(statement, "a module specifier string")),
        }
    }

    /// Drops `with { ... }` / `assert { ... }` import attributes and the
    /// optional semicolon, returning the end offset of the statement.
    fn finish_module_clause(&mut self) -> usize {
        if matches!(self.peek_text(0), Some("with") | Some("assert"))
            && self.peek_text(1) == Some("{")
            && !self.peek(0).is_some_and(|t| t.newline_before)
        {
            self.pos += 1;
            self.skip_balanced();
        }
        self.eat(";");
        self.tokens[self.pos - 1].end
    }

    /// Skips a bracketed group starting at the current token.
    fn skip_balanced(&mut self) {
        let mut depth = 0i32;
        while let Some(tok) = self.peek(0) {
            self.pos += 1;
            match tok.text(self.src) {
                "{" | "(" | "[" if tok.kind == TokenKind::Punct => depth += 1,
                "}" | ")" | "]" if tok.kind == TokenKind::Punct => {
                    depth -= 1;
                    if depth <= 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn at_statement_start(&self) -> bool {
        if self.pos == 0 {
            return true;
        }
        let prev = self.tokens[self.pos - 1];
        match prev.text(self.src) {
            ";" | "}" if prev.kind == TokenKind::Punct => true,
            "." => false,
            _ => self.tokens[self.pos].newline_before,
        }
    }

    fn is_import_meta(&self) -> bool {
        let after_dot = self.pos > 0 && self.tokens[self.pos - 1].text(self.src) == ".";
        !after_dot && self.peek_text(1) == Some(".") && self.peek_text(2) == Some("meta")
    }

    fn replace(&mut self, start: usize, end: usize, text: String) {
        self.edits.push(Edit { start, end, text });
    }

    // ------------------------------------------------------------------
    // import
    // ------------------------------------------------------------------

    fn import_statement(&mut self) -> Result<(), TransformError> {
        const STMT: &str = "import";
        let start = self.tokens[self.pos].start;
        self.pos += 1;

        // import "side-effect";
        if self.peek(0).is_some_and(|t| t.kind == TokenKind::Str) {
            let specifier = self.specifier(STMT)?;
            let end = self.finish_module_clause();
            self.replace(start, end, format!("{IMPORT_FN}({});", quote(&specifier)));
            return Ok(());
        }

        let mut default = None;
        let mut namespace = None;
        let mut named: Vec<(String, String)> = Vec::new();

        if self.peek(0).is_some_and(|t| t.kind == TokenKind::Ident) && self.peek_text(0) != Some("from")
        {
            default = Some(self.ident(STMT)?);
            if !self.eat(",") {
                return self.finish_import(start, default, namespace, named);
            }
        }

        if self.eat("*") {
            if !matches!(self.ident(STMT)?, "as") {
                return Err(self.malformed(STMT, "'as' after '*'"));
            }
            namespace = Some(self.ident(STMT)?);
        } else if self.eat("{") {
            while !self.eat("}") {
                let imported = self.module_export_name(STMT)?;
                let local = if self.peek_text(0) == Some("as") {
                    self.pos += 1;
                    self.ident(STMT)?.to_string()
                } else {
                    imported.clone()
                };
                named.push((imported, local));
                if !self.eat(",") {
                    self.expect("}", STMT)?;
                    break;
                }
            }
        }

        self.finish_import(start, default, namespace, named)
    }

    fn finish_import(
        &mut self,
        start: usize,
        default: Option<&str>,
        namespace: Option<&str>,
        named: Vec<(String, String)>,
    ) -> Result<(), TransformError> {
        const STMT: &str = "import";
        if self.ident(STMT)? != "from" {
            return Err(self.malformed(STMT, "'from'"));
        }
        let specifier = self.specifier(STMT)?;
        let end = self.finish_module_clause();
        let call = format!("{IMPORT_FN}({})", quote(&specifier));

        let text = match namespace {
            Some(ns) => {
                let mut text = format!("const {ns} = {call};");
                if let Some(default) = default {
                    text.push_str(&format!(" const {default} = {ns}.default;"));
                }
                text
            }
            None if named.is_empty() => match default {
                Some(default) => format!("const {default} = {call}.default;"),
                None => format!("{call};"),
            },
            None => {
                let mut fields = Vec::with_capacity(named.len() + 1);
                if let Some(default) = default {
                    fields.push(format!("default: {default}"));
                }
                for (imported, local) in &named {
                    if is_identifier(imported) && imported == local {
                        fields.push(local.clone());
                    } else {
                        fields.push(format!("{}: {local}", property_key(imported)));
                    }
                }
                format!("const {{ {} }} = {call};", fields.join(", "))
            }
        };

        self.replace(start, end, text);
        Ok(())
    }

    // ------------------------------------------------------------------
    // export
    // ------------------------------------------------------------------

    fn export_statement(&mut self) -> Result<(), TransformError> {
        const STMT: &str = "export";
        let export_tok = self.tokens[self.pos];
        self.pos += 1;

        match self.peek_text(0) {
            Some("*") => {
                self.pos += 1;
                let alias = if self.peek_text(0) == Some("as") {
                    self.pos += 1;
                    Some(self.module_export_name(STMT)?)
                } else {
                    None
                };
                if self.ident(STMT)? != "from" {
                    return Err(self.malformed(STMT, "'from'"));
                }
                let specifier = self.specifier(STMT)?;
                let end = self.finish_module_clause();
                let call = format!("{IMPORT_FN}({})", quote(&specifier));
                let text = match alias {
                    Some(alias) => format!("{EXPORTS_OBJ}[{}] = {call};", quote(&alias)),
                    None => format!("{REEXPORT_FN}({EXPORTS_OBJ}, {call});"),
                };
                self.replace(export_tok.start, end, text);
            }
            Some("{") => {
                self.pos += 1;
                let mut list: Vec<(String, String)> = Vec::new();
                while !self.eat("}") {
                    let local = self.module_export_name(STMT)?;
                    let exported = if self.peek_text(0) == Some("as") {
                        self.pos += 1;
                        self.module_export_name(STMT)?
                    } else {
                        local.clone()
                    };
                    list.push((local, exported));
                    if !self.eat(",") {
                        self.expect("}", STMT)?;
                        break;
                    }
                }

                if self.peek_text(0) == Some("from") {
                    self.pos += 1;
                    let specifier = self.specifier(STMT)?;
                    let end = self.finish_module_clause();
                    let mut text = format!(
                        "{{ const __ssr_from = {IMPORT_FN}({});",
                        quote(&specifier)
                    );
                    for (imported, exported) in &list {
                        text.push_str(&format!(
                            " {EXPORTS_OBJ}[{}] = __ssr_from[{}];",
                            quote(exported),
                            quote(imported)
                        ));
                    }
                    text.push_str(" }");
                    self.replace(export_tok.start, end, text);
                } else {
                    let end = self.finish_module_clause();
                    self.replace(export_tok.start, end, String::new());
                    self.syntax
                        .exports
                        .extend(list.into_iter().map(|(local, exported)| ExportBinding { local, exported }));
                }
            }
            Some("default") => {
                let default_tok = self.tokens[self.pos];
                self.pos += 1;
                self.export_default(export_tok, default_tok)?;
            }
            Some("const") | Some("let") | Some("var") => {
                self.pos += 1;
                self.replace(export_tok.start, export_tok.end, String::new());
                let mut names = Vec::new();
                self.declarators(&mut names)?;
                self.syntax
                    .exports
                    .extend(names.iter().map(|name| ExportBinding::same(name)));
            }
            Some("function") | Some("async") | Some("class") => {
                self.replace(export_tok.start, export_tok.end, String::new());
                if self.eat("async") && self.peek_text(0) != Some("function") {
                    return Err(self.malformed(STMT, "'function' after 'async'"));
                }
                let keyword = self.ident(STMT)?;
                if keyword == "function" {
                    self.eat("*");
                }
                let name = self.ident(STMT)?;
                self.syntax.exports.push(ExportBinding::same(name));
            }
            _ => return Err(self.malformed(STMT, "a declaration, '*', '{' or 'default'")),
        }
        Ok(())
    }

    fn export_default(&mut self, export_tok: Token, default_tok: Token) -> Result<(), TransformError> {
        const STMT: &str = "export default";
        let is_async_fn = self.peek_text(0) == Some("async")
            && self.peek_text(1) == Some("function")
            && !self.peek(1).is_some_and(|t| t.newline_before);
        let keyword_offset = usize::from(is_async_fn);

        match self.peek_text(keyword_offset) {
            Some(keyword @ ("function" | "class")) => {
                let mut offset = keyword_offset + 1;
                if keyword == "function" && self.peek_text(offset) == Some("*") {
                    offset += 1;
                }
                let named = self
                    .peek(offset)
                    .filter(|t| t.kind == TokenKind::Ident)
                    .map(|t| t.text(self.src))
                    .filter(|name| *name != "extends");

                match named {
                    Some(name) => {
                        // Declaration: keep it, export its final value.
                        self.replace(export_tok.start, default_tok.end, String::new());
                        self.syntax.exports.push(ExportBinding {
                            local: name.to_string(),
                            exported: String::from("default"),
                        });
                        self.pos += offset + 1;
                    }
                    None => {
                        // Anonymous: becomes an assignment expression, which
                        // needs an explicit terminator after its body.
                        self.replace(
                            export_tok.start,
                            default_tok.end,
                            format!("{EXPORTS_OBJ}.default ="),
                        );
                        self.pos += offset;
                        let body_end = self.skip_to_body_end(STMT)?;
                        self.replace(body_end, body_end, String::from(";"));
                    }
                }
            }
            _ => {
                self.replace(
                    export_tok.start,
                    default_tok.end,
                    format!("{EXPORTS_OBJ}.default ="),
                );
            }
        }
        Ok(())
    }

    /// From a parameter list / heritage clause, skip to just past the body's
    /// closing brace.
    fn skip_to_body_end(&mut self, statement: &'static str) -> Result<usize, TransformError> {
        let mut depth = 0i32;
        while let Some(tok) = self.peek(0) {
            if tok.kind == TokenKind::Punct {
                match tok.text(self.src) {
                    "{" if depth == 0 => {
                        self.skip_balanced();
                        return Ok(self.tokens[self.pos - 1].end);
                    }
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth -= 1,
                    _ => {}
                }
            }
            self.pos += 1;
        }
        Err(self.malformed(statement, "a body"))
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn declarators(&mut self, names: &mut Vec<String>) -> Result<(), TransformError> {
        loop {
            self.binding(names)?;
            if self.eat("=") {
                self.skip_expression();
            }
            if !self.eat(",") {
                return Ok(());
            }
        }
    }

    fn binding(&mut self, names: &mut Vec<String>) -> Result<(), TransformError> {
        const STMT: &str = "export declaration";
        if self.eat("{") {
            while !self.eat("}") {
                if self.eat_spread() {
                    self.binding(names)?;
                } else {
                    let key = self.peek(0).copied();
                    match key.map(|t| (t.kind, t.text(self.src))) {
                        Some((TokenKind::Punct, "[")) => self.skip_balanced(),
                        Some((TokenKind::Ident | TokenKind::Str | TokenKind::Number, _)) => self.pos += 1,
                        _ => return Err(self.malformed(STMT, "a property name")),
                    }
                    if self.eat(":") {
                        self.binding(names)?;
                    } else if let Some(key) = key.filter(|t| t.kind == TokenKind::Ident) {
                        names.push(key.text(self.src).to_string());
                    }
                    if self.eat("=") {
                        self.skip_expression();
                    }
                }
                if !self.eat(",") {
                    self.expect("}", STMT)?;
                    break;
                }
            }
            Ok(())
        } else if self.eat("[") {
            while !self.eat("]") {
                if self.eat(",") {
                    continue;
                }
                if self.eat_spread() {
                    self.binding(names)?;
                } else {
                    self.binding(names)?;
                    if self.eat("=") {
                        self.skip_expression();
                    }
                }
                if !self.eat(",") {
                    self.expect("]", STMT)?;
                    break;
                }
            }
            Ok(())
        } else {
            let name = self.ident(STMT)?;
            names.push(name.to_string());
            Ok(())
        }
    }

    fn eat_spread(&mut self) -> bool {
        if self.peek_text(0) == Some(".") && self.peek_text(1) == Some(".") && self.peek_text(2) == Some(".")
        {
            self.pos += 3;
            true
        } else {
            false
        }
    }

    /// Skips an initializer: stops before a `,` or `;` at its own depth, before
    /// a closer of an enclosing group, or where automatic semicolon insertion
    /// would end the statement.
    fn skip_expression(&mut self) {
        let mut depth = 0i32;
        let mut prev: Option<Token> = None;
        while let Some(&tok) = self.peek(0) {
            let text = tok.text(self.src);
            if depth == 0 {
                if tok.kind == TokenKind::Punct && matches!(text, "," | ";") {
                    return;
                }
                let starts_statement = tok.newline_before
                    && matches!(tok.kind, TokenKind::Ident | TokenKind::Str | TokenKind::Number)
                    && !super::lexer::is_operator_keyword(text)
                    && prev.is_some_and(|p| p.can_end_expression(self.src));
                if starts_statement {
                    return;
                }
            }
            if tok.kind == TokenKind::Punct {
                match text {
                    "{" | "(" | "[" => depth += 1,
                    "}" | ")" | "]" => {
                        if depth == 0 {
                            return;
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            prev = Some(tok);
            self.pos += 1;
        }
    }
}

fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len().saturating_sub(1).max(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}
