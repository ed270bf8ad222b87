// Copyright (c) 2026-present Welt Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! The tokenizer both dialects share. Commas count as whitespace, `#` starts
//! a comment to end of line, strings are double-quoted with backslash
//! escapes for quote and backslash only.

/// A token with its source position (1-based).
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Ident(String),
    /// Raw numeric text; converted per the expected field kind.
    Number(String),
    /// Decoded string literal.
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Period,
    Colon,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(id) => format!("identifier {id:?}"),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Str(_) => "string literal".to_owned(),
            TokenKind::LBrace => "'{'".to_owned(),
            TokenKind::RBrace => "'}'".to_owned(),
            TokenKind::LBracket => "'['".to_owned(),
            TokenKind::RBracket => "']'".to_owned(),
            TokenKind::Period => "'.'".to_owned(),
            TokenKind::Colon => "':'".to_owned(),
            TokenKind::Eof => "end of input".to_owned(),
        }
    }
}

/// Reported when a string literal never closes or a byte cannot start a
/// token; the parser wraps this into its positioned error kind.
#[derive(Debug)]
pub struct LexError {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

pub struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    peeked: Option<Token>,
}

fn is_id_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_id_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

fn is_number_start(bytes: &[u8]) -> bool {
    match bytes.first() {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'+') | Some(b'-') => bytes
            .get(1)
            .is_some_and(|b| b.is_ascii_digit() || *b == b'.'),
        Some(b'.') => bytes.get(1).is_some_and(u8::is_ascii_digit),
        _ => false,
    }
}

impl<'a> Lexer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            line: 1,
            col: 1,
            peeked: None,
        }
    }

    /// Consumes the rest of the current line; used for the header magic.
    pub fn skip_line(&mut self) {
        while let Some(byte) = self.bytes.get(self.pos) {
            let byte = *byte;
            self.advance(byte);
            if byte == b'\n' {
                break;
            }
        }
    }

    fn advance(&mut self, byte: u8) {
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
    }

    fn skip_blank(&mut self) {
        while let Some(byte) = self.bytes.get(self.pos).copied() {
            if byte.is_ascii_whitespace() || byte == b',' {
                self.advance(byte);
            } else if byte == b'#' {
                while let Some(byte) = self.bytes.get(self.pos).copied() {
                    self.advance(byte);
                    if byte == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    pub fn peek(&mut self) -> Result<Token, LexError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex()?);
        }
        Ok(self.peeked.clone().expect("just set"))
    }

    pub fn next(&mut self) -> Result<Token, LexError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lex(),
        }
    }

    fn lex(&mut self) -> Result<Token, LexError> {
        self.skip_blank();
        let line = self.line;
        let col = self.col;

        let Some(byte) = self.bytes.get(self.pos).copied() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
                col,
            });
        };

        let kind = match byte {
            b'{' => {
                self.advance(byte);
                TokenKind::LBrace
            }
            b'}' => {
                self.advance(byte);
                TokenKind::RBrace
            }
            b'[' => {
                self.advance(byte);
                TokenKind::LBracket
            }
            b']' => {
                self.advance(byte);
                TokenKind::RBracket
            }
            b':' => {
                self.advance(byte);
                TokenKind::Colon
            }
            b'"' => {
                self.advance(byte);
                let mut value = String::new();
                loop {
                    let Some(byte) = self.bytes.get(self.pos).copied() else {
                        return Err(LexError {
                            line,
                            col,
                            message: "unterminated string literal".to_owned(),
                        });
                    };
                    self.advance(byte);
                    match byte {
                        b'"' => break,
                        b'\\' => {
                            let Some(escaped) = self.bytes.get(self.pos).copied() else {
                                return Err(LexError {
                                    line,
                                    col,
                                    message: "unterminated string literal".to_owned(),
                                });
                            };
                            self.advance(escaped);
                            match escaped {
                                b'"' | b'\\' => value.push(escaped as char),
                                other => {
                                    // Only quote and backslash are escapes;
                                    // anything else keeps its backslash.
                                    value.push('\\');
                                    value.push(other as char);
                                }
                            }
                        }
                        other => {
                            value.push(other as char);
                        }
                    }
                }
                TokenKind::Str(value)
            }
            b'.' if !is_number_start(&self.bytes[self.pos..]) => {
                self.advance(byte);
                TokenKind::Period
            }
            _ if is_number_start(&self.bytes[self.pos..]) => {
                let mut text = String::new();
                while let Some(byte) = self.bytes.get(self.pos).copied() {
                    let numeric = byte.is_ascii_digit()
                        || matches!(byte, b'+' | b'-' | b'.' | b'e' | b'E' | b'x' | b'X')
                        || (b'a'..=b'f').contains(&byte.to_ascii_lowercase());
                    if !numeric {
                        break;
                    }
                    // '+'/'-' only continue a number right after an exponent.
                    if matches!(byte, b'+' | b'-')
                        && !text.is_empty()
                        && !text.ends_with(['e', 'E'])
                    {
                        break;
                    }
                    text.push(byte as char);
                    self.advance(byte);
                }
                TokenKind::Number(text)
            }
            _ if is_id_start(byte) => {
                let mut text = String::new();
                while let Some(byte) = self.bytes.get(self.pos).copied() {
                    if !is_id_continue(byte) {
                        break;
                    }
                    text.push(byte as char);
                    self.advance(byte);
                }
                TokenKind::Ident(text)
            }
            other => {
                return Err(LexError {
                    line,
                    col,
                    message: format!("unexpected byte 0x{other:02X}"),
                });
            }
        };

        Ok(Token { kind, line, col })
    }

    pub fn location(&mut self) -> (u32, u32) {
        match &self.peeked {
            Some(token) => (token.line, token.col),
            None => (self.line, self.col),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Lexer, TokenKind};

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source.as_bytes());
        let mut result = Vec::new();
        loop {
            let token = lexer.next().unwrap();
            let done = token.kind == TokenKind::Eof;
            result.push(token.kind);
            if done {
                return result;
            }
        }
    }

    #[test]
    fn commas_are_whitespace() {
        assert_eq!(
            kinds("[0, 0.5, 1]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Number("0".into()),
                TokenKind::Number("0.5".into()),
                TokenKind::Number("1".into()),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            kinds("Group # a box\n{"),
            vec![
                TokenKind::Ident("Group".into()),
                TokenKind::LBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn route_dots_split_identifiers() {
        assert_eq!(
            kinds("TS.fraction_changed"),
            vec![
                TokenKind::Ident("TS".into()),
                TokenKind::Period,
                TokenKind::Ident("fraction_changed".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c""#),
            vec![TokenKind::Str("a\"b\\c".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn negative_and_exponent_numbers() {
        assert_eq!(
            kinds("-1 6.02e23 0xFF"),
            vec![
                TokenKind::Number("-1".into()),
                TokenKind::Number("6.02e23".into()),
                TokenKind::Number("0xFF".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_are_one_based() {
        let mut lexer = Lexer::new(b"A\n  B");
        let a = lexer.next().unwrap();
        assert_eq!((a.line, a.col), (1, 1));
        let b = lexer.next().unwrap();
        assert_eq!((b.line, b.col), (2, 3));
    }
}
