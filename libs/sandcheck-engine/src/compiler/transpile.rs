/// Single-pass source rewriter
///
/// **Rewrites:**
/// - JSX elements and fragments become `__sc_h(type, props, ...children)` calls
/// - `import` from react (and stylesheets) is dropped; aliases become consts
/// - `export` keywords are dropped; an anonymous default export is bound to
///   `__sc_default`
/// - Every loop condition calls `__sc_tick()`; every block-bodied function
///   starts with `__sc_probe()`
/// - Expression-bodied arrows become `=> __sc_probe() ? 0 : body`; both the
///   arrow body and the conditional's last operand are one
///   AssignmentExpression, so the body's extent never has to be found
///
/// Newlines are preserved one-for-one so line numbers in the output match the
/// submitted source.
use super::lexer::{expression_allowed, is_ident_part, is_ident_start, Lexer, Token, TokenKind};
use crate::error::CompileError;

pub const RESERVED_PREFIX: &str = "__sc";
pub const DEFAULT_EXPORT_BINDING: &str = "__sc_default";

const TICK: &str = "__sc_tick()";
const TICK_STMT: &str = "__sc_tick();";
const PROBE_STMT: &str = "__sc_probe();";
// __sc_probe() returns undefined, so the conditional always takes the body
const ARROW_PROBE: &str = " __sc_probe() ? 0 :";

const CONTROL_KEYWORDS: &[&str] = &["if", "switch", "catch", "with", "while", "for"];

#[derive(Debug)]
pub struct Transpiled {
    pub code: String,
    pub top_level: Vec<String>,
    pub default_export: Option<String>,
    pub comments: Vec<(usize, usize)>,
}

pub fn transpile(src: &str) -> Result<Transpiled, CompileError> {
    let mut t = Transpiler {
        src,
        lex: Lexer::new(src),
        out: String::with_capacity(src.len() + src.len() / 4),
        prev: None,
        top_level: Vec::new(),
        default_export: None,
        pending: Pending::Nothing,
        class_head: None,
        frames: 0,
        marks: Vec::new(),
    };
    t.js_until(Stop::Eof)?;
    Ok(Transpiled {
        code: t.out,
        top_level: t.top_level,
        default_export: t.default_export,
        comments: t.lex.into_comments(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Eof,
    Closer(char),
    /// Like `Closer(')')`, recording `;` and `of` at the header's top level
    ForHeader,
}

/// What the next `{` opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Nothing,
    FunctionBody,
    LoopBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Semi(usize),
    /// Offset just past an `of` keyword
    Of(usize),
}

struct Transpiler<'a> {
    src: &'a str,
    lex: Lexer<'a>,
    out: String,
    prev: Option<(TokenKind, &'a str)>,
    top_level: Vec<String>,
    default_export: Option<String>,
    pending: Pending,
    /// (frame, depth) of a `class` whose body brace is still ahead
    class_head: Option<(usize, usize)>,
    frames: usize,
    marks: Vec<Mark>,
}

impl<'a> Transpiler<'a> {
    fn js_until(&mut self, stop: Stop) -> Result<(), CompileError> {
        self.frames += 1;
        let frame = self.frames;
        let top = stop == Stop::Eof;
        let mut depth = 0usize;
        let mut parens: Vec<bool> = Vec::new();
        self.pending = Pending::Nothing;

        loop {
            self.copy_trivia()?;
            if self.lex.at_eof() {
                return match stop {
                    Stop::Eof => Ok(()),
                    Stop::Closer(c) => Err(CompileError::syntax(
                        format!("unexpected end of input, expected `{}`", c),
                        self.lex.line(),
                    )),
                    Stop::ForHeader => Err(CompileError::syntax(
                        "unexpected end of input in `for` header",
                        self.lex.line(),
                    )),
                };
            }

            if expression_allowed(self.prev) && self.jsx_ahead() {
                self.pending = Pending::Nothing;
                self.jsx_element()?;
                self.pending = Pending::Nothing;
                self.prev = Some((TokenKind::Punct, ")"));
                continue;
            }

            let token = self.next_token()?;
            let text = token.text(self.src);
            let pending = std::mem::replace(&mut self.pending, Pending::Nothing);

            match token.kind {
                TokenKind::Punct => match text {
                    "(" | "[" | "{" => {
                        if text == "(" {
                            parens.push(self.is_control_paren());
                        }
                        self.out.push_str(text);
                        if text == "{" {
                            if self.class_head == Some((frame, depth)) {
                                self.class_head = None;
                            } else {
                                match pending {
                                    Pending::FunctionBody => self.out.push_str(PROBE_STMT),
                                    Pending::LoopBody => self.out.push_str(TICK_STMT),
                                    Pending::Nothing => {}
                                }
                            }
                        }
                        depth += 1;
                    }
                    ")" | "]" | "}" => {
                        if depth == 0 {
                            let closes = match stop {
                                Stop::Closer(c) => text.starts_with(c),
                                Stop::ForHeader => text == ")",
                                Stop::Eof => false,
                            };
                            if closes {
                                self.prev = Some((TokenKind::Punct, text));
                                return Ok(());
                            }
                            return Err(CompileError::syntax(
                                format!("unexpected `{}`", text),
                                token.line,
                            ));
                        }
                        depth -= 1;
                        self.out.push_str(text);
                        if text == ")" && parens.pop() == Some(false) {
                            self.pending = Pending::FunctionBody;
                        }
                    }
                    ";" if stop == Stop::ForHeader && depth == 0 => {
                        self.marks.push(Mark::Semi(self.out.len()));
                        self.out.push_str(text);
                    }
                    "=>" => {
                        self.out.push_str(text);
                        self.prev = Some((token.kind, text));
                        if self.next_is("{") {
                            self.pending = Pending::FunctionBody;
                        } else {
                            self.out.push_str(ARROW_PROBE);
                        }
                    }
                    _ => self.out.push_str(text),
                },
                TokenKind::Ident => {
                    self.check_reserved(text, token.line)?;
                    if !self.after_member_dot() {
                        match text {
                            "while" if self.next_is("(") => {
                                self.emit_while()?;
                                continue;
                            }
                            "for" if self.next_is("(") || self.next_is("await") => {
                                self.emit_for()?;
                                continue;
                            }
                            "import" if top && depth == 0 && !self.next_is("(") && !self.next_is(".") => {
                                self.import_statement(token)?;
                                continue;
                            }
                            "export" if top && depth == 0 => {
                                self.export_statement(token)?;
                                continue;
                            }
                            "of" if stop == Stop::ForHeader && depth == 0 => {
                                self.marks.push(Mark::Of(self.out.len() + text.len()));
                            }
                            _ => {}
                        }
                        if text == "class" {
                            self.class_head = Some((frame, depth));
                        }
                        if top && depth == 0 {
                            self.record_declaration(text);
                        }
                    }
                    self.out.push_str(text);
                }
                _ => self.out.push_str(text),
            }
            self.prev = Some((token.kind, text));
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        let regex_allowed = expression_allowed(self.prev);
        let line = self.lex.line();
        self.lex
            .next_token(regex_allowed)?
            .ok_or_else(|| CompileError::syntax("unexpected end of input", line))
    }

    fn copy_trivia(&mut self) -> Result<(), CompileError> {
        let start = self.lex.pos();
        self.lex.skip_trivia()?;
        self.out.push_str(&self.src[start..self.lex.pos()]);
        Ok(())
    }

    /// Skip trivia without copying it, keeping its newlines
    fn drop_trivia(&mut self) -> Result<(), CompileError> {
        let start = self.lex.pos();
        self.lex.skip_trivia()?;
        self.push_newlines(start, self.lex.pos());
        Ok(())
    }

    fn push_newlines(&mut self, start: usize, end: usize) {
        let count = self.src[start..end].matches('\n').count();
        for _ in 0..count {
            self.out.push('\n');
        }
    }

    /// The next `n` significant tokens, without consuming anything
    fn peek_texts(&self, n: usize) -> Vec<&'a str> {
        let mut lexer = self.lex.clone();
        let mut texts = Vec::with_capacity(n);
        let mut prev = self.prev;
        while texts.len() < n {
            if lexer.skip_trivia().is_err() {
                break;
            }
            match lexer.next_token(expression_allowed(prev)) {
                Ok(Some(token)) => {
                    let text = token.text(self.src);
                    prev = Some((token.kind, text));
                    texts.push(text);
                }
                _ => break,
            }
        }
        texts
    }

    fn next_is(&self, text: &str) -> bool {
        self.peek_texts(1).first() == Some(&text)
    }

    fn after_member_dot(&self) -> bool {
        matches!(self.prev, Some((TokenKind::Punct, "." | "?.")))
    }

    fn is_control_paren(&self) -> bool {
        matches!(self.prev, Some((TokenKind::Ident, text)) if CONTROL_KEYWORDS.contains(&text))
    }

    fn check_reserved(&self, ident: &str, line: usize) -> Result<(), CompileError> {
        if ident.starts_with(RESERVED_PREFIX) {
            return Err(CompileError::unsupported(
                format!("identifiers starting with `{}` are reserved (found `{}`)", RESERVED_PREFIX, ident),
                line,
            ));
        }
        Ok(())
    }

    fn record_declaration(&mut self, keyword: &str) {
        let name = match keyword {
            "function" => {
                let next = self.peek_texts(2);
                match next.as_slice() {
                    ["*", name, ..] => Some(*name),
                    [name, ..] => Some(*name),
                    _ => None,
                }
            }
            "const" | "let" | "var" | "class" => self.peek_texts(1).first().copied(),
            _ => None,
        };
        if let Some(name) = name {
            if name.starts_with(is_ident_start) && name != "extends" && !self.top_level.iter().any(|n| n == name) {
                self.top_level.push(name.to_string());
            }
        }
    }

    /// `while (c)` becomes `while (__sc_tick() && (c))`; covers `do ... while` too
    fn emit_while(&mut self) -> Result<(), CompileError> {
        self.out.push_str("while");
        self.copy_trivia()?;
        self.next_token()?;
        self.out.push('(');
        self.out.push_str(TICK);
        self.out.push_str(" && (");
        self.prev = Some((TokenKind::Punct, "("));
        self.js_until(Stop::Closer(')'))?;
        self.out.push_str("))");
        self.prev = Some((TokenKind::Punct, ")"));
        Ok(())
    }

    /// Classic `for` gets the tick in its test; `for...of` iterates through
    /// `__sc_iter`; `for...in` and `for await` tick at the top of a block body
    fn emit_for(&mut self) -> Result<(), CompileError> {
        self.out.push_str("for");
        self.copy_trivia()?;
        let mut is_await = false;
        if self.next_is("await") {
            self.next_token()?;
            self.out.push_str("await");
            self.copy_trivia()?;
            is_await = true;
        }
        self.next_token()?;
        self.out.push('(');

        let saved_out = std::mem::take(&mut self.out);
        let saved_marks = std::mem::take(&mut self.marks);
        self.prev = Some((TokenKind::Punct, "("));
        let result = self.js_until(Stop::ForHeader);
        let header = std::mem::replace(&mut self.out, saved_out);
        let marks = std::mem::replace(&mut self.marks, saved_marks);
        result?;

        let semis: Vec<usize> = marks
            .iter()
            .filter_map(|m| match m {
                Mark::Semi(at) => Some(*at),
                Mark::Of(_) => None,
            })
            .collect();
        let first_of = marks.iter().find_map(|m| match m {
            Mark::Of(end) => Some(*end),
            Mark::Semi(_) => None,
        });

        if let [first, second, ..] = semis.as_slice() {
            let test = &header[first + 1..*second];
            self.out.push_str(&header[..=*first]);
            if test.trim().is_empty() {
                self.out.push_str(TICK);
                self.out.push_str(test);
            } else {
                self.out.push_str(TICK);
                self.out.push_str(" && (");
                self.out.push_str(test);
                self.out.push(')');
            }
            self.out.push_str(&header[*second..]);
            self.out.push(')');
        } else if let (Some(of_end), false) = (first_of, is_await) {
            self.out.push_str(&header[..of_end]);
            self.out.push_str(" __sc_iter(");
            self.out.push_str(&header[of_end..]);
            self.out.push_str("))");
        } else {
            self.out.push_str(&header);
            self.out.push(')');
            self.pending = Pending::LoopBody;
        }
        self.prev = Some((TokenKind::Punct, ")"));
        Ok(())
    }

    /// Handle a static import; react bindings survive as aliases of the
    /// `React` global, stylesheets vanish, anything else is rejected
    fn import_statement(&mut self, import: Token) -> Result<(), CompileError> {
        let mut clause: Vec<&'a str> = Vec::new();
        let start = import.start;
        let specifier = loop {
            self.drop_trivia()?;
            if self.lex.at_eof() {
                return Err(CompileError::syntax("unterminated import statement", import.line));
            }
            let token = self.next_token()?;
            let text = token.text(self.src);
            self.prev = Some((token.kind, text));
            if token.kind == TokenKind::Str {
                break text[1..text.len() - 1].to_string();
            }
            if text != "from" {
                clause.push(text);
            }
        };
        let end = self.lex.pos();
        if self.next_is(";") {
            self.drop_trivia()?;
            self.next_token()?;
        }

        let is_react = matches!(specifier.as_str(), "react" | "react/jsx-runtime");
        let is_ignorable = matches!(specifier.as_str(), "react-dom" | "react-dom/client")
            || [".css", ".scss", ".sass", ".less"]
                .iter()
                .any(|ext| specifier.ends_with(ext));
        if !is_react && !is_ignorable {
            return Err(CompileError::unsupported(
                format!("imports from '{}' are not available", specifier),
                import.line,
            ));
        }

        if is_react {
            for (alias, member) in react_aliases(&clause) {
                match member {
                    Some(member) => self.out.push_str(&format!("const {} = React.{};", alias, member)),
                    None => self.out.push_str(&format!("const {} = React;", alias)),
                }
            }
        }
        let newline_end = end.min(self.src.len());
        self.push_newlines(start, newline_end);
        self.prev = Some((TokenKind::Punct, ";"));
        Ok(())
    }

    fn export_statement(&mut self, export: Token) -> Result<(), CompileError> {
        let next = self.peek_texts(4);
        match next.as_slice() {
            ["default", rest @ ..] => {
                self.drop_trivia()?;
                self.next_token()?;
                let named = match rest {
                    ["function", "*", name, ..] | ["function", name, ..] if *name != "(" => Some(*name),
                    ["async", "function", name, ..] if *name != "(" && *name != "*" => Some(*name),
                    ["class", name, ..] if *name != "{" && *name != "extends" => Some(*name),
                    _ => None,
                };
                match named {
                    Some(name) => self.default_export = Some(name.to_string()),
                    None => {
                        self.out.push_str("const ");
                        self.out.push_str(DEFAULT_EXPORT_BINDING);
                        self.out.push_str(" =");
                        self.default_export = Some(DEFAULT_EXPORT_BINDING.to_string());
                        self.prev = Some((TokenKind::Punct, "="));
                    }
                }
            }
            ["{", ..] => {
                let start = self.lex.pos();
                let mut names: Vec<&'a str> = Vec::new();
                loop {
                    self.lex.skip_trivia()?;
                    if self.lex.at_eof() {
                        return Err(CompileError::syntax("unterminated export list", export.line));
                    }
                    let token = self.next_token()?;
                    let text = token.text(self.src);
                    self.prev = Some((token.kind, text));
                    if text == "}" {
                        break;
                    }
                    names.push(text);
                }
                if self.next_is("from") {
                    return Err(CompileError::unsupported("re-exports are not supported", export.line));
                }
                for window in names.windows(3) {
                    if let [local, "as", "default"] = window {
                        self.default_export = Some(local.to_string());
                    }
                }
                if self.next_is(";") {
                    self.lex.skip_trivia()?;
                    self.next_token()?;
                }
                self.push_newlines(start, self.lex.pos());
                self.prev = Some((TokenKind::Punct, ";"));
            }
            ["*", ..] => {
                return Err(CompileError::unsupported("re-exports are not supported", export.line));
            }
            _ => {}
        }
        Ok(())
    }

    fn jsx_ahead(&self) -> bool {
        let mut chars = self.lex.rest().chars();
        chars.next() == Some('<')
            && matches!(chars.next(), Some(c) if c == '>' || is_ident_start(c))
    }

    fn jsx_skip_ws(&mut self) {
        while let Some(c) = self.lex.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            if c == '\n' {
                self.out.push('\n');
            }
            self.lex.advance(c.len_utf8());
        }
    }

    fn jsx_name(&mut self) -> &'a str {
        let start = self.lex.pos();
        while let Some(c) = self.lex.peek_char() {
            if !(is_ident_part(c) || c == '-' || c == '.' || c == ':') {
                break;
            }
            self.lex.advance(c.len_utf8());
        }
        &self.src[start..self.lex.pos()]
    }

    fn jsx_expect(&mut self, expected: char, context: &str) -> Result<(), CompileError> {
        self.jsx_skip_ws();
        match self.lex.peek_char() {
            Some(c) if c == expected => {
                self.lex.advance(1);
                Ok(())
            }
            Some(c) => Err(CompileError::syntax(
                format!("expected `{}` {}, found `{}`", expected, context, c),
                self.lex.line(),
            )),
            None => Err(CompileError::syntax(
                format!("expected `{}` {}, found end of input", expected, context),
                self.lex.line(),
            )),
        }
    }

    /// Transpile one JSX element starting at `<`
    fn jsx_element(&mut self) -> Result<(), CompileError> {
        let open_line = self.lex.line();
        self.lex.advance(1);
        self.jsx_skip_ws();

        if self.lex.peek_char() == Some('>') {
            self.lex.advance(1);
            self.out.push_str("__sc_h(__sc_Fragment, null");
            return self.jsx_children("", open_line);
        }

        let name = self.jsx_name();
        if name.is_empty() {
            return Err(CompileError::syntax("expected a JSX tag name", self.lex.line()));
        }
        self.check_reserved(name, open_line)?;
        self.out.push_str("__sc_h(");
        self.out.push_str(&tag_expression(name));
        self.out.push_str(", {");

        loop {
            self.jsx_skip_ws();
            match self.lex.peek_char() {
                Some('/') => {
                    self.lex.advance(1);
                    self.jsx_expect('>', "to close a self-closing tag")?;
                    self.out.push_str("})");
                    return Ok(());
                }
                Some('>') => {
                    self.lex.advance(1);
                    self.out.push('}');
                    return self.jsx_children(name, open_line);
                }
                Some('{') => {
                    self.lex.open_brace();
                    self.copy_trivia()?;
                    if !self.lex.rest().starts_with("...") {
                        return Err(CompileError::syntax(
                            "expected `...` in JSX spread attribute",
                            self.lex.line(),
                        ));
                    }
                    self.lex.advance(3);
                    self.out.push_str("...(");
                    self.prev = Some((TokenKind::Punct, "..."));
                    self.js_until(Stop::Closer('}'))?;
                    self.out.push_str("), ");
                }
                Some(c) if is_ident_start(c) => {
                    let attr = self.jsx_name();
                    self.out.push_str(&json_string(attr));
                    self.out.push_str(": ");
                    self.jsx_skip_ws();
                    if self.lex.peek_char() == Some('=') {
                        self.lex.advance(1);
                        self.jsx_skip_ws();
                        self.jsx_attribute_value()?;
                    } else {
                        self.out.push_str("true");
                    }
                    self.out.push_str(", ");
                }
                Some(c) => {
                    return Err(CompileError::syntax(
                        format!("unexpected `{}` in JSX tag <{}>", c, name),
                        self.lex.line(),
                    ))
                }
                None => {
                    return Err(CompileError::syntax(
                        format!("unterminated JSX tag <{}>", name),
                        open_line,
                    ))
                }
            }
        }
    }

    fn jsx_attribute_value(&mut self) -> Result<(), CompileError> {
        match self.lex.peek_char() {
            Some(quote @ ('"' | '\'')) => {
                let line = self.lex.line();
                let start = self.lex.pos() + 1;
                let Some(len) = self.lex.rest()[1..].find(quote) else {
                    return Err(CompileError::syntax("unterminated JSX attribute string", line));
                };
                let raw = &self.src[start..start + len];
                self.out.push_str(&json_string(&decode_entities(raw)));
                self.lex.advance(len + 2);
                self.push_newlines(start, start + len);
                Ok(())
            }
            Some('{') => {
                self.lex.open_brace();
                self.out.push('(');
                self.prev = Some((TokenKind::Punct, "("));
                self.js_until(Stop::Closer('}'))?;
                self.out.push(')');
                Ok(())
            }
            Some('<') => self.jsx_element(),
            _ => Err(CompileError::syntax("expected a JSX attribute value", self.lex.line())),
        }
    }

    fn jsx_children(&mut self, name: &str, open_line: usize) -> Result<(), CompileError> {
        loop {
            match self.lex.peek_char() {
                None => {
                    let shown = if name.is_empty() { "<>".to_string() } else { format!("<{}>", name) };
                    return Err(CompileError::syntax(
                        format!("unterminated JSX element {}", shown),
                        open_line,
                    ));
                }
                Some('{') => {
                    self.lex.open_brace();
                    self.copy_trivia()?;
                    if self.lex.peek_char() == Some('}') {
                        self.prev = Some((TokenKind::Punct, "{"));
                        self.next_token()?;
                        continue;
                    }
                    self.out.push_str(", ");
                    self.prev = Some((TokenKind::Punct, "("));
                    self.js_until(Stop::Closer('}'))?;
                }
                Some('<') if self.closing_tag_ahead() => {
                    let line = self.lex.line();
                    self.lex.advance(1);
                    self.jsx_skip_ws();
                    self.lex.advance(1);
                    self.jsx_skip_ws();
                    let closing = self.jsx_name();
                    if closing != name {
                        let expected = if name.is_empty() { "</>".to_string() } else { format!("</{}>", name) };
                        let found = if closing.is_empty() { "</>".to_string() } else { format!("</{}>", closing) };
                        return Err(CompileError::syntax(
                            format!("expected closing tag {} but found {}", expected, found),
                            line,
                        ));
                    }
                    self.jsx_expect('>', "to end the closing tag")?;
                    self.out.push(')');
                    return Ok(());
                }
                Some('<') => {
                    self.out.push_str(", ");
                    self.jsx_element()?;
                }
                Some(_) => {
                    let start = self.lex.pos();
                    let len = self
                        .lex
                        .rest()
                        .find(|c: char| c == '{' || c == '<')
                        .unwrap_or(self.lex.rest().len());
                    let raw = &self.src[start..start + len];
                    let text = clean_jsx_text(raw);
                    if !text.is_empty() {
                        self.out.push_str(", ");
                        self.out.push_str(&json_string(&decode_entities(&text)));
                    }
                    self.lex.advance(len);
                    self.push_newlines(start, start + len);
                }
            }
        }
    }

    fn closing_tag_ahead(&self) -> bool {
        self.lex.rest()[1..].trim_start().starts_with('/')
    }
}

fn tag_expression(name: &str) -> String {
    let first = name.chars().next().unwrap_or('a');
    if name.contains('.') || first.is_uppercase() || first == '_' || first == '$' {
        name.to_string()
    } else {
        json_string(name)
    }
}

fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Names bound by `import ... from 'react'`, as (alias, member) pairs;
/// `None` means the whole React object
fn react_aliases<'s>(clause: &[&'s str]) -> Vec<(&'s str, Option<&'s str>)> {
    let mut aliases = Vec::new();
    let mut i = 0;
    while i < clause.len() {
        match clause[i] {
            "," => i += 1,
            "*" => {
                if let (Some(&"as"), Some(name)) = (clause.get(i + 1), clause.get(i + 2)) {
                    if *name != "React" {
                        aliases.push((*name, None));
                    }
                }
                i += 3;
            }
            "{" => {
                i += 1;
                while i < clause.len() && clause[i] != "}" {
                    let member = clause[i];
                    if clause.get(i + 1) == Some(&"as") {
                        if let Some(alias) = clause.get(i + 2) {
                            if member == "default" {
                                aliases.push((*alias, None));
                            } else if *alias != member {
                                aliases.push((*alias, Some(member)));
                            }
                        }
                        i += 3;
                    } else {
                        i += 1;
                    }
                }
                i += 1;
            }
            "type" => i += 1,
            name => {
                if name != "React" {
                    aliases.push((name, None));
                }
                i += 1;
            }
        }
    }
    aliases
}

/// JSX text whitespace rule: lines are trimmed at their inner edges, blank
/// lines vanish and the rest are joined with single spaces
pub fn clean_jsx_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let last_non_empty = lines
        .iter()
        .rposition(|l| l.chars().any(|c| c != ' ' && c != '\t'))
        .unwrap_or(0);

    let mut cleaned = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut trimmed = line.replace('\t', " ");
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ').to_string();
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ').to_string();
        }
        if !trimmed.is_empty() {
            if i != last_non_empty {
                trimmed.push(' ');
            }
            cleaned.push_str(&trimmed);
        }
    }
    cleaned
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let entity = after
            .find(';')
            .filter(|semi| *semi <= 10)
            .and_then(|semi| decode_entity(&after[..semi]).map(|c| (c, semi)));
        match entity {
            Some((c, semi)) => {
                decoded.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                decoded.push('&');
                rest = after;
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "times" => '×',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "larr" => '←',
        "rarr" => '→',
        "middot" => '·',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    fn code(src: &str) -> String {
        transpile(src).unwrap().code
    }

    #[test]
    fn test_while_and_do_while_are_ticked() {
        assert_eq!(code("while (true) {}"), "while (__sc_tick() && (true)) {}");
        assert_eq!(
            code("do { i++ } while (i < 3);"),
            "do { i++ } while (__sc_tick() && (i < 3));"
        );
    }

    #[test]
    fn test_for_loops_are_ticked() {
        assert_eq!(
            code("for (let i = 0; i < n; i++) {}"),
            "for (let i = 0;__sc_tick() && ( i < n); i++) {}"
        );
        assert_eq!(code("for (;;) {}"), "for (;__sc_tick();) {}");
        assert_eq!(
            code("for (const x of xs) total += x;"),
            "for (const x of __sc_iter( xs)) total += x;"
        );
        assert_eq!(
            code("for (const k in obj) { n++ }"),
            "for (const k in obj) {__sc_tick(); n++ }"
        );
    }

    #[test]
    fn test_function_bodies_are_probed() {
        assert_eq!(
            code("function fib(n) { return n; }"),
            "function fib(n) {__sc_probe(); return n; }"
        );
        assert_eq!(code("const f = (a) => { return a; }"), "const f = (a) => {__sc_probe(); return a; }");
        assert_eq!(code("if (a) { b(); }"), "if (a) { b(); }");
        assert_eq!(
            code("const f = n => n <= 0 ? 0 : f(n - 1) + f(n - 1);"),
            "const f = n => __sc_probe() ? 0 : n <= 0 ? 0 : f(n - 1) + f(n - 1);"
        );
        assert_eq!(
            code("const g = (a) => ({ a }), h = x => y => x + y;"),
            "const g = (a) => __sc_probe() ? 0 : ({ a }), h = x => __sc_probe() ? 0 : y => __sc_probe() ? 0 : x + y;"
        );
        assert_eq!(
            code("class A extends B { m() { } }"),
            "class A extends B { m() {__sc_probe(); } }"
        );
    }

    #[test]
    fn test_member_named_like_keywords() {
        assert_eq!(code("q.while(1); x.for"), "q.while(1); x.for");
    }

    #[test]
    fn test_jsx_elements() {
        assert_eq!(
            code("const a = <div className=\"box\" onClick={() => go(1)}>Hi {name}!</div>;"),
            "const a = __sc_h(\"div\", {\"className\": \"box\", \"onClick\": (() => __sc_probe() ? 0 : go(1)), }, \"Hi \", name, \"!\");"
        );
        assert_eq!(
            code("const b = <Button disabled {...rest} />;"),
            "const b = __sc_h(Button, {\"disabled\": true, ...(rest), });"
        );
        assert_eq!(code("const c = <></>;"), "const c = __sc_h(__sc_Fragment, null);");
    }

    #[test]
    fn test_jsx_keeps_line_numbers() {
        let out = code("const a = (\n  <ul>\n    <li>one</li>\n  </ul>\n);\nx");
        assert_eq!(out.matches('\n').count(), 5);
        assert!(out.contains("__sc_h(\"li\", {}, \"one\")"));
    }

    #[test]
    fn test_jsx_text_and_entities() {
        assert_eq!(clean_jsx_text("\n    Hello\n    world  \n  "), "Hello world");
        assert_eq!(clean_jsx_text("  a b  "), "  a b  ");
        assert_eq!(decode_entities("a &amp; b &lt;3 &#39;x&#x27; &bogus;"), "a & b <3 'x' &bogus;");
    }

    #[test]
    fn test_jsx_comment_child_is_dropped() {
        assert_eq!(
            code("const a = <p>{/* note */}x</p>;"),
            "const a = __sc_h(\"p\", {}/* note */, \"x\");"
        );
    }

    #[test]
    fn test_mismatched_closing_tag() {
        let err = transpile("const a = <div>\n</span>;").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::SyntaxError);
        assert_eq!(err.line, Some(2));
        assert!(err.detail.contains("</div>"));
    }

    #[test]
    fn test_comparison_is_not_jsx() {
        assert_eq!(code("if (a <b) c()"), "if (a <b) c()");
    }

    #[test]
    fn test_react_imports() {
        let out = transpile("import React, { useState as useS } from 'react';\nimport './app.css';\nfunction C() {}").unwrap();
        assert_eq!(out.code, "const useS = React.useState;\n\nfunction C() {__sc_probe();}");
        assert_eq!(out.top_level, vec!["C".to_string()]);

        let err = transpile("import _ from 'lodash';").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnsupportedConstruct);
    }

    #[test]
    fn test_exports() {
        let out = transpile("export default function Toggle() {}").unwrap();
        assert_eq!(out.default_export.as_deref(), Some("Toggle"));
        assert_eq!(out.top_level, vec!["Toggle".to_string()]);

        let out = transpile("export default () => 1;").unwrap();
        assert_eq!(out.code, "const __sc_default = () => __sc_probe() ? 0 : 1;");
        assert_eq!(out.default_export.as_deref(), Some(DEFAULT_EXPORT_BINDING));

        let out = transpile("const twoSum = () => 1;\nexport { twoSum as default };").unwrap();
        assert_eq!(out.default_export.as_deref(), Some("twoSum"));
        assert_eq!(out.code, "const twoSum = () => __sc_probe() ? 0 : 1;\n");

        let out = transpile("export const a = 1;").unwrap();
        assert_eq!(out.code, " const a = 1;");
    }

    #[test]
    fn test_reserved_prefix() {
        let err = transpile("const __sc_tick = 1;").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnsupportedConstruct);
    }

    #[test]
    fn test_template_literal_with_jsx_and_braces() {
        let out = code("const s = `${items.map(i => { return i; }).join(',')}`;");
        assert_eq!(out, "const s = `${items.map(i => {__sc_probe(); return i; }).join(',')}`;");
    }
}
