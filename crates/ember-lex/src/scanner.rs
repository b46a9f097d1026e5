//! The scanner: a restartable, lazy token producer.
//!
//! `Scanner::scan_token` advances past whitespace and `//` line comments,
//! then recognizes exactly one of: a keyword, an identifier, a number, a
//! string literal, a punctuator, an `Error` token, or (once the input is
//! exhausted) `Eof` forever after. It holds no owned state besides the
//! borrowed source buffer and three cursor fields, so creating a fresh
//! `Scanner` per REPL line or per file is free.

use ember_util::Span;

use crate::token::{Token, TokenKind};

/// Produces a `Token` stream from a borrowed byte buffer.
///
/// Only ASCII is scanned as syntax; anything above 0x7F is rejected the
/// same way any other unrecognized byte is.
pub struct Scanner<'src> {
    source: &'src [u8],
    start: usize,
    current: usize,
    line: u32,
    /// Set by `scan_token` whenever it returns an `Error` token; the
    /// compiler reads this immediately afterward via [`Scanner::error_message`].
    error_message: &'static str,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src [u8]) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
            error_message: "",
        }
    }

    /// The message attached to the most recently produced `Error` token.
    /// Meaningless if that token was not `TokenKind::Error`.
    pub fn error_message(&self) -> &'static str {
        self.error_message
    }

    pub fn scan_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        self.start = self.current;

        if self.is_at_end() {
            return self.make(TokenKind::Eof);
        }

        let c = self.advance();
        match c {
            b'(' => self.make(TokenKind::LeftParen),
            b')' => self.make(TokenKind::RightParen),
            b'{' => self.make(TokenKind::LeftBrace),
            b'}' => self.make(TokenKind::RightBrace),
            b',' => self.make(TokenKind::Comma),
            b'.' => self.make(TokenKind::Dot),
            b'-' => self.make(TokenKind::Minus),
            b'+' => self.make(TokenKind::Plus),
            b';' => self.make(TokenKind::Semicolon),
            b'*' => self.make(TokenKind::Star),
            b'/' => self.make(TokenKind::Slash),
            b'!' => {
                let kind = if self.matches(b'=') { TokenKind::BangEqual } else { TokenKind::Bang };
                self.make(kind)
            }
            b'=' => {
                let kind = if self.matches(b'=') { TokenKind::EqualEqual } else { TokenKind::Equal };
                self.make(kind)
            }
            b'<' => {
                let kind = if self.matches(b'=') { TokenKind::LessEqual } else { TokenKind::Less };
                self.make(kind)
            }
            b'>' => {
                let kind =
                    if self.matches(b'=') { TokenKind::GreaterEqual } else { TokenKind::Greater };
                self.make(kind)
            }
            b'"' => self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if is_ident_start(c) => self.identifier(),
            _ => self.error("Unexpected character."),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.source.len() {
            0
        } else {
            self.source[self.current + 1]
        }
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.line += 1;
                    self.advance();
                }
                b'/' if self.peek_next() == b'/' => {
                    while self.peek() != b'\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn string(&mut self) -> Token {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            return self.error("Unterminated string.");
        }

        self.advance(); // closing quote
        self.make(TokenKind::String)
    }

    fn number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance(); // the '.'
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        self.make(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token {
        while is_ident_continue(self.peek()) {
            self.advance();
        }
        self.make(self.identifier_kind())
    }

    /// Hand-rolled keyword trie: match the first byte, then compare the
    /// remainder of the lexeme directly. Avoids a hash lookup for the
    /// common case of scanning a short keyword-or-identifier.
    fn identifier_kind(&self) -> TokenKind {
        let text = &self.source[self.start..self.current];
        match text.first() {
            Some(b'a') => self.keyword(text, 1, "nd", TokenKind::And),
            Some(b'b') => self.keyword(text, 1, "reak", TokenKind::Break),
            Some(b'c') => self.keyword(text, 1, "lass", TokenKind::Class),
            Some(b'e') => self.keyword(text, 1, "lse", TokenKind::Else),
            Some(b'f') if text.len() > 1 => match text[1] {
                b'a' => self.keyword(text, 2, "lse", TokenKind::False),
                b'o' => self.keyword(text, 2, "r", TokenKind::For),
                b'u' => self.keyword(text, 2, "n", TokenKind::Fun),
                _ => TokenKind::Identifier,
            },
            Some(b'i') => self.keyword(text, 1, "f", TokenKind::If),
            Some(b'n') => self.keyword(text, 1, "il", TokenKind::Nil),
            Some(b'o') => self.keyword(text, 1, "r", TokenKind::Or),
            Some(b'p') => self.keyword(text, 1, "rint", TokenKind::Print),
            Some(b'r') => self.keyword(text, 1, "eturn", TokenKind::Return),
            Some(b's') => self.keyword(text, 1, "uper", TokenKind::Super),
            Some(b't') if text.len() > 1 => match text[1] {
                b'h' => self.keyword(text, 2, "is", TokenKind::This),
                b'r' => self.keyword(text, 2, "ue", TokenKind::True),
                _ => TokenKind::Identifier,
            },
            Some(b'v') => self.keyword(text, 1, "ar", TokenKind::Var),
            Some(b'w') => self.keyword(text, 1, "hile", TokenKind::While),
            _ => TokenKind::Identifier,
        }
    }

    fn keyword(&self, text: &[u8], prefix_len: usize, rest: &str, kind: TokenKind) -> TokenKind {
        if text.len() == prefix_len + rest.len() && &text[prefix_len..] == rest.as_bytes() {
            kind
        } else {
            TokenKind::Identifier
        }
    }

    fn make(&self, kind: TokenKind) -> Token {
        let span = Span::new(self.start as u32, (self.current - self.start) as u32, self.line);
        Token::new(kind, span)
    }

    fn error(&mut self, message: &'static str) -> Token {
        self.error_message = message;
        // An error token's span covers the byte(s) already consumed so far
        // for this lexeme; `start` was pinned before the offending byte.
        let span = Span::new(self.start as u32, (self.current - self.start) as u32, self.line);
        Token::new(TokenKind::Error, span)
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(src.as_bytes());
        let mut out = Vec::new();
        loop {
            let tok = scanner.scan_token();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(
            kinds("var forest = fortune;"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::Identifier,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_keyword_prefixes_from_identifiers() {
        // "for" is a keyword but "forest"/"fort" are not, despite sharing
        // the "fo" prefix exercised by the hand-rolled trie.
        assert_eq!(kinds("for")[0], TokenKind::For);
        assert_eq!(kinds("forest")[0], TokenKind::Identifier);
        assert_eq!(kinds("fun")[0], TokenKind::Fun);
        assert_eq!(kinds("function")[0], TokenKind::Identifier);
    }

    #[test]
    fn scans_two_character_operators_greedily() {
        assert_eq!(
            kinds("a <= b != c"),
            vec![
                TokenKind::Identifier,
                TokenKind::LessEqual,
                TokenKind::Identifier,
                TokenKind::BangEqual,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn counts_lines_across_string_literals_and_comments() {
        let src = "// header\nvar a = \"line\none\";\nprint a;";
        let mut scanner = Scanner::new(src.as_bytes());
        let var_tok = scanner.scan_token();
        assert_eq!(var_tok.line(), 2);
        let _name = scanner.scan_token();
        let _eq = scanner.scan_token();
        let string_tok = scanner.scan_token();
        assert_eq!(string_tok.kind, TokenKind::String);
        assert_eq!(string_tok.line(), 3);
    }

    #[test]
    fn unterminated_string_reports_error_with_message() {
        let mut scanner = Scanner::new(b"\"never closed");
        let tok = scanner.scan_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(scanner.error_message(), "Unterminated string.");
    }

    #[test]
    fn eof_is_idempotent() {
        let mut scanner = Scanner::new(b"");
        assert_eq!(scanner.scan_token().kind, TokenKind::Eof);
        assert_eq!(scanner.scan_token().kind, TokenKind::Eof);
        assert_eq!(scanner.scan_token().kind, TokenKind::Eof);
    }

    #[test]
    fn numbers_allow_one_optional_decimal_point() {
        assert_eq!(kinds("42")[0], TokenKind::Number);
        assert_eq!(kinds("3.14")[0], TokenKind::Number);
        // A trailing dot with no following digit is not part of the number.
        assert_eq!(kinds("3."), vec![TokenKind::Number, TokenKind::Dot, TokenKind::Eof]);
    }
}

#[cfg(test)]
mod lexeme_property {
    use super::*;
    use proptest::prelude::*;

    fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
        if needle.is_empty() {
            return true;
        }
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    proptest! {
        /// Every lexeme a token resolves to is a substring of the source
        /// it was scanned from, for any printable-ASCII input.
        #[test]
        fn lexeme_is_always_a_substring(src in "[ -~\n]{0,200}") {
            let bytes = src.as_bytes();
            let mut scanner = Scanner::new(bytes);
            loop {
                let tok = scanner.scan_token();
                let lexeme = tok.lexeme(bytes);
                prop_assert!(contains_subslice(bytes, lexeme));
                if tok.kind == TokenKind::Eof {
                    break;
                }
            }
        }
    }
}
