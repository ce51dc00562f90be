use std::borrow::Cow;
use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
#[error("Unexpected character '{token}'")]
#[diagnostic(
    code(pylite::lex::unexpected_character),
    help("remove or correct the character: `{token}`")
)]
pub struct SingleTokenError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this character")]
    bad_bit: SourceSpan,

    pub token: char,
}

impl SingleTokenError {
    pub fn line(&self) -> usize {
        self.src.inner()[..=self.bad_bit.offset()].lines().count()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("unterminated double quote string")]
#[diagnostic(code(pylite::lex::unterminated_string))]
pub struct StringTerminationError {
    #[source_code]
    src: NamedSource<String>,

    #[label("Syntax Error: Missing trailing `\"` symbol to terminate the string literal")]
    bad_line: SourceSpan,
}

impl StringTerminationError {
    pub fn line(&self) -> usize {
        self.src.inner()[..=self.bad_line.offset()].lines().count()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("unexpected indent")]
#[diagnostic(
    code(pylite::lex::indentation),
    help("indent blocks by multiples of four spaces")
)]
pub struct IndentationError {
    #[source_code]
    src: NamedSource<String>,

    #[label("the indentation of this line is not a multiple of four spaces")]
    bad_line: SourceSpan,
}

impl IndentationError {
    pub fn line(&self) -> usize {
        self.src.inner()[..self.bad_line.offset()].lines().count() + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: Cow<'src, str>,
}

impl Token<'_> {
    /// A token with no source text of its own (NEWLINE, INDENT, DEDENT, EOF).
    pub(crate) fn structural(kind: TokenKind) -> Self {
        Token {
            kind,
            text: Cow::Borrowed(""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Boolean,
    Name,
    Print,
    If,
    Elif,
    Else,
    While,
    And,
    Or,
    Not,
    Def,
    Return,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    EqEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    Comma,
    Colon,
    LParen,
    RParen,
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenKind::Number => "NUMBER",
            TokenKind::String => "STRING",
            TokenKind::Boolean => "BOOLEAN",
            TokenKind::Name => "NAME",
            TokenKind::Print => "PRINT",
            TokenKind::If => "IF",
            TokenKind::Elif => "ELIF",
            TokenKind::Else => "ELSE",
            TokenKind::While => "WHILE",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::Def => "DEF",
            TokenKind::Return => "RETURN",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Mul => "MUL",
            TokenKind::Div => "DIV",
            TokenKind::Mod => "MOD",
            TokenKind::EqEqual => "EQEQUAL",
            TokenKind::NotEqual => "NOTEQUAL",
            TokenKind::Less => "LESS",
            TokenKind::LessEqual => "LESSEQUAL",
            TokenKind::Greater => "GREATER",
            TokenKind::GreaterEqual => "GREATEREQUAL",
            TokenKind::Equal => "EQUAL",
            TokenKind::Comma => "COMMA",
            TokenKind::Colon => "COLON",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Indent => "INDENT",
            TokenKind::Dedent => "DEDENT",
            TokenKind::Eof => "EOF",
        };
        f.write_str(name)
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Token({}, \"{}\")", self.kind, self.text)
    }
}

/// Pull-based lexer over a borrowed source string.
///
/// Indentation is tracked on a stack of levels (four spaces per level);
/// dedents deeper than one level are queued and handed out one call at a
/// time. Once the input is exhausted the lexer closes any still-open
/// blocks and then reports EOF on every subsequent call.
pub struct Lexer<'src> {
    filename: Option<&'src str>,
    whole: &'src str,
    rest: &'src str,
    byte: usize,
    indent_stack: Vec<usize>,
    pending_dedents: usize,
    just_saw_newline: bool,
    done: bool,
    last_span: SourceSpan,
    peeked: Option<Result<Token<'src>, Error>>,
}

impl<'src> Lexer<'src> {
    pub fn new(filename: Option<&'src str>, input: &'src str) -> Self {
        Lexer {
            filename,
            whole: input,
            rest: input,
            byte: 0,
            indent_stack: vec![0],
            pending_dedents: 0,
            just_saw_newline: false,
            done: false,
            last_span: SourceSpan::from(0..0),
            peeked: None,
        }
    }

    /// Consume and return the next token.
    pub fn next_token(&mut self) -> Result<Token<'src>, Error> {
        match self.peeked.take() {
            Some(token) => token,
            None => self.advance_token(),
        }
    }

    /// Look at the next token without consuming it. Calling `peek` any
    /// number of times returns the same token and leaves the next
    /// `next_token` result unchanged.
    pub fn peek(&mut self) -> &Result<Token<'src>, Error> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.advance_token(),
        };
        self.peeked.insert(token)
    }

    /// Source span of the most recently produced token, for diagnostics.
    pub fn last_span(&self) -> SourceSpan {
        self.last_span
    }

    fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string())
    }

    fn token(&mut self, kind: TokenKind, text: &'src str, start: usize) -> Token<'src> {
        self.last_span = (start..self.byte).into();
        Token {
            kind,
            text: Cow::Borrowed(text),
        }
    }

    fn marker(&mut self, kind: TokenKind) -> Token<'src> {
        self.last_span = (self.byte..self.byte).into();
        Token::structural(kind)
    }

    fn advance_token(&mut self) -> Result<Token<'src>, Error> {
        loop {
            // dedents queued by a previous line drain first
            if self.pending_dedents > 0 {
                self.pending_dedents -= 1;
                return Ok(self.marker(TokenKind::Dedent));
            }

            if self.just_saw_newline && !self.rest.is_empty() {
                self.just_saw_newline = false;
                let line_start = self.byte;
                let spaces = self.rest.len() - self.rest.trim_start_matches(' ').len();
                self.rest = &self.rest[spaces..];
                self.byte += spaces;

                // blank lines do not affect the indent stack
                if let Some(stripped) = self.rest.strip_prefix('\n') {
                    self.rest = stripped;
                    self.byte += 1;
                    self.just_saw_newline = true;
                    continue;
                }

                if spaces % 4 != 0 {
                    return Err(IndentationError {
                        src: self.named_source(),
                        bad_line: (line_start..self.byte).into(),
                    }
                    .into());
                }

                let level = spaces / 4;
                let top = self.indent_stack.last().copied().unwrap_or(0);
                if level > top {
                    self.indent_stack.push(level);
                    return Ok(self.marker(TokenKind::Indent));
                }
                if level < top {
                    while self.indent_stack.last().copied().unwrap_or(0) > level {
                        self.indent_stack.pop();
                        self.pending_dedents += 1;
                    }
                    continue;
                }
            }

            let mut chars = self.rest.chars();
            let Some(c) = chars.next() else { break };
            let c_len = c.len_utf8();
            let cur = self.rest;
            let token_start = self.byte;
            self.rest = chars.as_str();
            self.byte += c_len;
            let literal = &cur[..c_len];

            enum Start {
                Str,
                Ident,
                Number,
                IfEqualElse(TokenKind, TokenKind),
            }

            let started = match c {
                '\n' => {
                    self.just_saw_newline = true;
                    return Ok(self.token(TokenKind::Newline, "", token_start));
                }
                ' ' | '\t' | '\r' => continue,
                '+' => return Ok(self.token(TokenKind::Plus, literal, token_start)),
                '-' => return Ok(self.token(TokenKind::Minus, literal, token_start)),
                '*' => return Ok(self.token(TokenKind::Mul, literal, token_start)),
                '/' => return Ok(self.token(TokenKind::Div, literal, token_start)),
                '%' => return Ok(self.token(TokenKind::Mod, literal, token_start)),
                '(' => return Ok(self.token(TokenKind::LParen, literal, token_start)),
                ')' => return Ok(self.token(TokenKind::RParen, literal, token_start)),
                ':' => return Ok(self.token(TokenKind::Colon, literal, token_start)),
                ',' => return Ok(self.token(TokenKind::Comma, literal, token_start)),
                '=' => Start::IfEqualElse(TokenKind::EqEqual, TokenKind::Equal),
                '<' => Start::IfEqualElse(TokenKind::LessEqual, TokenKind::Less),
                '>' => Start::IfEqualElse(TokenKind::GreaterEqual, TokenKind::Greater),
                '!' => {
                    // `!` only exists as part of `!=`
                    if let Some(stripped) = self.rest.strip_prefix('=') {
                        self.rest = stripped;
                        self.byte += 1;
                        return Ok(self.token(TokenKind::NotEqual, &cur[..2], token_start));
                    }
                    return Err(SingleTokenError {
                        src: self.named_source(),
                        bad_bit: (token_start..self.byte).into(),
                        token: c,
                    }
                    .into());
                }
                '"' => Start::Str,
                'a'..='z' | 'A'..='Z' | '_' => Start::Ident,
                '0'..='9' => Start::Number,
                c => {
                    return Err(SingleTokenError {
                        src: self.named_source(),
                        bad_bit: (token_start..self.byte).into(),
                        token: c,
                    }
                    .into());
                }
            };

            match started {
                Start::Str => {
                    // no escape processing: the literal runs to the next quote
                    if let Some(end) = self.rest.find('"') {
                        let literal = &self.rest[..end];
                        self.rest = &self.rest[end + 1..];
                        self.byte += end + 1;
                        return Ok(self.token(TokenKind::String, literal, token_start));
                    }
                    return Err(StringTerminationError {
                        src: self.named_source(),
                        bad_line: (token_start..self.whole.len()).into(),
                    }
                    .into());
                }
                Start::Ident => {
                    let first_non_ident = cur
                        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                        .unwrap_or(cur.len());

                    let literal = &cur[..first_non_ident];
                    let extra_bytes = literal.len() - c_len;
                    self.rest = &self.rest[extra_bytes..];
                    self.byte += extra_bytes;

                    let kind = match literal {
                        "print" => TokenKind::Print,
                        "True" | "False" => TokenKind::Boolean,
                        "if" => TokenKind::If,
                        "elif" => TokenKind::Elif,
                        "else" => TokenKind::Else,
                        "while" => TokenKind::While,
                        "and" => TokenKind::And,
                        "or" => TokenKind::Or,
                        "not" => TokenKind::Not,
                        "def" => TokenKind::Def,
                        "return" => TokenKind::Return,
                        _ => TokenKind::Name,
                    };

                    return Ok(self.token(kind, literal, token_start));
                }
                Start::Number => {
                    let mut end = cur
                        .find(|c: char| !c.is_ascii_digit())
                        .unwrap_or(cur.len());
                    if cur[end..].starts_with('.') {
                        end += 1;
                        let tail = &cur[end..];
                        end += tail
                            .find(|c: char| !c.is_ascii_digit())
                            .unwrap_or(tail.len());
                    }

                    let literal = &cur[..end];
                    let extra_bytes = literal.len() - c_len;
                    self.rest = &self.rest[extra_bytes..];
                    self.byte += extra_bytes;
                    self.last_span = (token_start..self.byte).into();

                    // `123.` is normalized to `123.0`
                    let text = match literal.strip_suffix('.') {
                        Some(stripped) => Cow::Owned(format!("{stripped}.0")),
                        None => Cow::Borrowed(literal),
                    };

                    return Ok(Token {
                        kind: TokenKind::Number,
                        text,
                    });
                }
                Start::IfEqualElse(yes, no) => {
                    if let Some(stripped) = self.rest.strip_prefix('=') {
                        self.rest = stripped;
                        self.byte += 1;
                        return Ok(self.token(yes, &cur[..c_len + 1], token_start));
                    }
                    return Ok(self.token(no, literal, token_start));
                }
            }
        }

        // end of input: close any block still open, then report EOF forever
        if self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            return Ok(self.marker(TokenKind::Dedent));
        }
        Ok(self.marker(TokenKind::Eof))
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Result<Token<'src>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        match &token {
            Ok(token) if token.kind == TokenKind::Eof => self.done = true,
            Err(_) => self.done = true,
            _ => {}
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(None, input)
            .map(|token| token.expect("lexing should succeed").kind)
            .collect()
    }

    #[test]
    fn nested_blocks_produce_indent_and_dedent() {
        let input = indoc! {"
            def inc(n):
                if n < 3:
                    return n + 1
            inc(2)
        "};
        let actual = kinds(input);
        let expected = vec![
            TokenKind::Def,
            TokenKind::Name,
            TokenKind::LParen,
            TokenKind::Name,
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::If,
            TokenKind::Name,
            TokenKind::Less,
            TokenKind::Number,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Return,
            TokenKind::Name,
            TokenKind::Plus,
            TokenKind::Number,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Dedent,
            TokenKind::Name,
            TokenKind::LParen,
            TokenKind::Number,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Eof,
        ];
        assert_eq!(actual, expected);
    }

    #[test]
    fn indents_and_dedents_balance() {
        let input = indoc! {"
            while a:
                while b:
                    c
                d
            e
        "};
        let tokens = kinds(input);
        let indents = tokens.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(indents, dedents);
    }

    #[test]
    fn blocks_closed_by_end_of_input() {
        let tokens = kinds("if a:\n    b");
        assert_eq!(
            tokens,
            vec![
                TokenKind::If,
                TokenKind::Name,
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name,
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        let tokens = kinds("a\n\n\nb\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Name,
                TokenKind::Newline,
                TokenKind::Name,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_indentation_not_multiple_of_four() {
        let mut lexer = Lexer::new(None, "if a:\n   b\n");
        let mut result = lexer.next_token();
        while let Ok(token) = &result {
            if token.kind == TokenKind::Eof {
                panic!("expected an indentation error");
            }
            result = lexer.next_token();
        }
        let err = result.expect_err("three spaces is not a valid indent");
        assert!(err.downcast_ref::<IndentationError>().is_some());
    }

    #[test]
    fn peek_is_idempotent() {
        let mut lexer = Lexer::new(None, "x = 1\n");
        let first = lexer.peek().as_ref().expect("peek should succeed").clone();
        let second = lexer.peek().as_ref().expect("peek should succeed").clone();
        assert_eq!(first, second);
        let next = lexer.next_token().expect("next should succeed");
        assert_eq!(next, first);
        assert_eq!(next.kind, TokenKind::Name);
    }

    #[test]
    fn eof_is_terminal_and_idempotent() {
        let mut lexer = Lexer::new(None, "x");
        assert_eq!(lexer.next_token().expect("name").kind, TokenKind::Name);
        for _ in 0..3 {
            assert_eq!(lexer.next_token().expect("eof").kind, TokenKind::Eof);
        }
    }

    #[test]
    fn trailing_dot_number_is_normalized() {
        let mut lexer = Lexer::new(None, "123.");
        let token = lexer.next_token().expect("number");
        assert_eq!(token.kind, TokenKind::Number);
        assert_eq!(token.text, "123.0");
    }

    #[test]
    fn numbers_keep_fractional_digits() {
        let mut lexer = Lexer::new(None, "3.25");
        let token = lexer.next_token().expect("number");
        assert_eq!(token.text, "3.25");
    }

    #[test]
    fn keywords_are_reclassified() {
        let tokens = kinds("not True and while_x or print");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Not,
                TokenKind::Boolean,
                TokenKind::And,
                TokenKind::Name,
                TokenKind::Or,
                TokenKind::Print,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_character_operators() {
        let tokens = kinds("a <= b == c != d >= e");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Name,
                TokenKind::LessEqual,
                TokenKind::Name,
                TokenKind::EqEqual,
                TokenKind::Name,
                TokenKind::NotEqual,
                TokenKind::Name,
                TokenKind::GreaterEqual,
                TokenKind::Name,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_literal_has_no_escape_processing() {
        let mut lexer = Lexer::new(None, "\"a\\nb\"");
        let token = lexer.next_token().expect("string");
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.text, "a\\nb");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let mut lexer = Lexer::new(None, "\"oops");
        let err = lexer.next_token().expect_err("string never closes");
        assert!(err.downcast_ref::<StringTerminationError>().is_some());
    }

    #[test]
    fn unexpected_character_is_fatal() {
        let mut lexer = Lexer::new(None, "x = 1 @ 2\n");
        let mut result = lexer.next_token();
        while let Ok(token) = &result {
            assert_ne!(token.kind, TokenKind::Eof, "expected a lex error");
            result = lexer.next_token();
        }
        let err = result.expect_err("@ is not part of the language");
        let single = err
            .downcast_ref::<SingleTokenError>()
            .expect("should be a single-token error");
        assert_eq!(single.token, '@');
    }
}
