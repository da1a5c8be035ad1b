// JavaScript tokenizer shared by the transpiler and the denylist scan
// Positions are byte offsets into the source; lines are 1-based

use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    /// One chunk of a template literal: `` `...` ``, `` `...${ ``, `}...${` or `` }...` ``
    Template,
    Regex,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    Block,
    Template,
}

const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==", "!=",
    "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "**", "<<", ">>",
];

/// Keywords after which an expression (and so a regex or JSX) may start
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    braces: Vec<Brace>,
    comments: Vec<(usize, usize)>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            braces: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Spans of every comment skipped so far
    pub fn comments(&self) -> &[(usize, usize)] {
        &self.comments
    }

    pub fn into_comments(self) -> Vec<(usize, usize)> {
        self.comments
    }

    /// Move forward `bytes` bytes, keeping the line count
    pub fn advance(&mut self, bytes: usize) {
        let end = (self.pos + bytes).min(self.src.len());
        self.line += self.src.as_bytes()[self.pos..end]
            .iter()
            .filter(|b| **b == b'\n')
            .count();
        self.pos = end;
    }

    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.advance(c.len_utf8());
        Some(c)
    }

    /// Consume a `{` opened outside the token stream (JSX expression containers)
    pub fn open_brace(&mut self) {
        if self.peek_char() == Some('{') {
            self.advance(1);
            self.braces.push(Brace::Block);
        }
    }

    /// Skip whitespace and comments
    pub fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            let rest = self.rest();
            if self.pos == 0 && rest.starts_with("#!") {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.comments.push((0, len));
                self.advance(len);
                continue;
            }
            match rest.chars().next() {
                Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                    self.advance(c.len_utf8());
                }
                Some('/') if rest.starts_with("//") => {
                    let len = rest.find('\n').unwrap_or(rest.len());
                    self.comments.push((self.pos, self.pos + len));
                    self.advance(len);
                }
                Some('/') if rest.starts_with("/*") => {
                    let line = self.line;
                    let Some(close) = rest[2..].find("*/") else {
                        return Err(CompileError::syntax("unterminated comment", line));
                    };
                    let len = close + 4;
                    self.comments.push((self.pos, self.pos + len));
                    self.advance(len);
                }
                _ => return Ok(()),
            }
        }
    }

    /// Lex one token at the current position, which must not be trivia
    pub fn next_token(&mut self, regex_allowed: bool) -> Result<Option<Token>, CompileError> {
        let Some(c) = self.peek_char() else {
            return Ok(None);
        };
        let start = self.pos;
        let line = self.line;

        let kind = if is_ident_start(c) || (c == '#' && self.rest()[1..].starts_with(is_ident_start)) {
            self.advance(c.len_utf8());
            self.eat_while(is_ident_part);
            TokenKind::Ident
        } else if c.is_ascii_digit() || (c == '.' && self.rest()[1..].starts_with(|d: char| d.is_ascii_digit())) {
            self.lex_number();
            TokenKind::Number
        } else if c == '"' || c == '\'' {
            self.lex_string(c)?;
            TokenKind::Str
        } else if c == '`' {
            self.advance(1);
            self.lex_template_chunk(line)?;
            TokenKind::Template
        } else if c == '}' && self.braces.last() == Some(&Brace::Template) {
            self.braces.pop();
            self.advance(1);
            self.lex_template_chunk(line)?;
            TokenKind::Template
        } else if c == '/' && regex_allowed {
            self.lex_regex()?;
            TokenKind::Regex
        } else {
            self.lex_punct(c, line)?;
            TokenKind::Punct
        };

        Ok(Some(Token {
            kind,
            start,
            end: self.pos,
            line,
        }))
    }

    fn eat_while(&mut self, pred: fn(char) -> bool) {
        while let Some(c) = self.peek_char() {
            if !pred(c) {
                break;
            }
            self.advance(c.len_utf8());
        }
    }

    fn lex_number(&mut self) {
        let rest = self.rest();
        let radix_prefix = ["0x", "0X", "0o", "0O", "0b", "0B"]
            .iter()
            .any(|p| rest.starts_with(p));
        if radix_prefix {
            self.advance(2);
            self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
            return;
        }
        self.eat_while(|c| c.is_ascii_digit() || c == '_');
        if self.peek_char() == Some('.') {
            self.advance(1);
            self.eat_while(|c| c.is_ascii_digit() || c == '_');
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let after = &self.rest()[1..];
            let signed = after.starts_with('+') || after.starts_with('-');
            let digits_at = if signed { 2 } else { 1 };
            if self.rest()[digits_at..].starts_with(|c: char| c.is_ascii_digit()) {
                self.advance(digits_at);
                self.eat_while(|c| c.is_ascii_digit() || c == '_');
            }
        }
        if self.peek_char() == Some('n') {
            self.advance(1);
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<(), CompileError> {
        let line = self.line;
        self.advance(1);
        loop {
            match self.advance_char() {
                None | Some('\n') => {
                    return Err(CompileError::syntax("unterminated string literal", line))
                }
                Some('\\') => {
                    self.advance_char();
                }
                Some(c) if c == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    /// Lex template text up to and including the closing backtick or the next `${`
    fn lex_template_chunk(&mut self, line: usize) -> Result<(), CompileError> {
        loop {
            match self.advance_char() {
                None => return Err(CompileError::syntax("unterminated template literal", line)),
                Some('\\') => {
                    self.advance_char();
                }
                Some('`') => return Ok(()),
                Some('$') if self.peek_char() == Some('{') => {
                    self.advance(1);
                    self.braces.push(Brace::Template);
                    return Ok(());
                }
                Some(_) => {}
            }
        }
    }

    fn lex_regex(&mut self) -> Result<(), CompileError> {
        let line = self.line;
        self.advance(1);
        let mut in_class = false;
        loop {
            match self.advance_char() {
                None | Some('\n') => {
                    return Err(CompileError::syntax("unterminated regular expression", line))
                }
                Some('\\') => {
                    self.advance_char();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some(_) => {}
            }
        }
        self.eat_while(is_ident_part);
        Ok(())
    }

    fn lex_punct(&mut self, c: char, line: usize) -> Result<(), CompileError> {
        let rest = self.rest();
        for p in PUNCTUATORS {
            if rest.starts_with(p) {
                // `a?.5:b` is a conditional, not optional chaining
                if *p == "?." && rest[2..].starts_with(|d: char| d.is_ascii_digit()) {
                    continue;
                }
                self.advance(p.len());
                return Ok(());
            }
        }
        match c {
            '{' => self.braces.push(Brace::Block),
            '}' => {
                self.braces.pop();
            }
            '(' | ')' | '[' | ']' | ';' | ',' | '<' | '>' | '+' | '-' | '*' | '/' | '%' | '&' | '|'
            | '^' | '!' | '~' | '?' | ':' | '=' | '.' | '@' => {}
            other => {
                return Err(CompileError::syntax(
                    format!("unexpected character `{}`", other),
                    line,
                ))
            }
        }
        self.advance(c.len_utf8());
        Ok(())
    }
}

pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$' || c == '\\'
}

pub fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\\' || c == '\u{200c}' || c == '\u{200d}'
}

/// Whether an expression may start after `prev`, the last significant token
pub fn expression_allowed(prev: Option<(TokenKind, &str)>) -> bool {
    match prev {
        None => true,
        Some((TokenKind::Punct, text)) => !matches!(text, ")" | "]" | "}" | "++" | "--"),
        Some((TokenKind::Ident, text)) => EXPRESSION_KEYWORDS.contains(&text),
        Some((TokenKind::Template, text)) => text.ends_with("${"),
        Some(_) => false,
    }
}

/// Tokenize plain JavaScript (no JSX)
pub fn tokenize(src: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer::new(src);
    let mut tokens: Vec<Token> = Vec::new();
    loop {
        lexer.skip_trivia()?;
        let prev = tokens.last().map(|t| (t.kind, t.text(src)));
        match lexer.next_token(expression_allowed(prev))? {
            Some(token) => tokens.push(token),
            None => return Ok(tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_text(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src)
            .unwrap()
            .iter()
            .map(|t| (t.kind, t.text(src).to_string()))
            .collect()
    }

    #[test]
    fn test_regex_vs_division() {
        let tokens = kinds_and_text("const r = /a\\/b[/]/g; x = a / b / c;");
        assert!(tokens.contains(&(TokenKind::Regex, "/a\\/b[/]/g".to_string())));
        let divisions = tokens
            .iter()
            .filter(|(k, t)| *k == TokenKind::Punct && t == "/")
            .count();
        assert_eq!(divisions, 2);
    }

    #[test]
    fn test_template_with_nested_expressions() {
        let src = "`a ${ {b: `c ${d}`}.b } e`";
        let tokens = kinds_and_text(src);
        assert_eq!(tokens.first(), Some(&(TokenKind::Template, "`a ${".to_string())));
        assert!(tokens.contains(&(TokenKind::Ident, "d".to_string())));
        assert_eq!(tokens.last(), Some(&(TokenKind::Template, "} e`".to_string())));
    }

    #[test]
    fn test_comments_are_recorded_and_lines_counted() {
        let src = "// one\nlet a = 1; /* two\nthree */ b";
        let mut lexer = Lexer::new(src);
        let mut last = None;
        loop {
            lexer.skip_trivia().unwrap();
            match lexer.next_token(true).unwrap() {
                Some(t) => last = Some(t),
                None => break,
            }
        }
        assert_eq!(lexer.comments().len(), 2);
        assert_eq!(last.map(|t| t.line), Some(3));
    }

    #[test]
    fn test_unterminated_string_reports_line() {
        let err = tokenize("let a = 1;\nlet b = 'oops\n").unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_optional_chaining_vs_conditional() {
        let tokens = kinds_and_text("a?.b; c?.5:1");
        assert!(tokens.contains(&(TokenKind::Punct, "?.".to_string())));
        assert!(tokens.contains(&(TokenKind::Number, ".5".to_string())));
    }
}
