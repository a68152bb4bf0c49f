//! Byte-stream lexer with preprocessor line-directive support.
//!
//! The lexer consumes already-preprocessed C, so the only directive it has to
//! understand is the line marker left behind by the preprocessor: `#line N`,
//! `#line N "file"`, `# N` or `# N "file" flags...`. Everything else that
//! starts with `#` fails the directive scan, the scanner state is rewound,
//! and the `#` byte comes out as an [`TokenKind::Illegal`] token.
//!
//! Comments are whitespace. An unterminated block comment consumes the rest
//! of the input silently.

use crate::pos::Pos;
use crate::token::{lookup_ident, Token, TokenKind};

/// Saved scanner state for the line-directive rewind.
#[derive(Clone, Copy)]
struct Checkpoint {
    pos: usize,
    read_pos: usize,
    ch: u8,
    line: u32,
    col: u32,
}

/// On-demand tokenizer over a byte buffer.
pub struct Lexer {
    input: Vec<u8>,
    /// Index of the current character.
    pos: usize,
    /// Index one past the current character.
    read_pos: usize,
    /// Current character; 0 at end of input.
    ch: u8,
    line: u32,
    col: u32,
    filename: String,
}

impl Lexer {
    pub fn new(input: &str, filename: &str) -> Self {
        let mut lx = Lexer {
            input: input.as_bytes().to_vec(),
            pos: 0,
            read_pos: 0,
            ch: 0,
            line: 1,
            col: 0,
            filename: filename.to_string(),
        };
        lx.read_char();
        lx
    }

    /// The filename currently in effect (updated by `#line` directives).
    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn read_char(&mut self) {
        let prev = self.ch;
        self.ch = *self.input.get(self.read_pos).unwrap_or(&0);
        self.pos = self.read_pos;
        self.read_pos += 1;
        if prev == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
    }

    fn peek_char(&self) -> u8 {
        *self.input.get(self.read_pos).unwrap_or(&0)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            read_pos: self.read_pos,
            ch: self.ch,
            line: self.line,
            col: self.col,
        }
    }

    fn restore(&mut self, cp: Checkpoint) {
        self.pos = cp.pos;
        self.read_pos = cp.read_pos;
        self.ch = cp.ch;
        self.line = cp.line;
        self.col = cp.col;
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace_and_comments();
            if self.ch == b'#' && self.col == 1 {
                if self.skip_line_directive() {
                    continue;
                }
            }
            break;
        }

        let pos = Pos::new(self.line, self.col);

        let tok = match self.ch {
            0 => Token::new(TokenKind::Eof, "", pos),
            b'=' => self.two_char(b'=', TokenKind::Eq, TokenKind::Assign, pos),
            b'!' => self.two_char(b'=', TokenKind::NotEq, TokenKind::Bang, pos),
            b'+' => match self.peek_char() {
                b'+' => self.consume2("++", TokenKind::Inc, pos),
                b'=' => self.consume2("+=", TokenKind::PlusAssign, pos),
                _ => Token::new(TokenKind::Plus, "+", pos),
            },
            b'-' => match self.peek_char() {
                b'-' => self.consume2("--", TokenKind::Dec, pos),
                b'=' => self.consume2("-=", TokenKind::MinusAssign, pos),
                b'>' => self.consume2("->", TokenKind::Arrow, pos),
                _ => Token::new(TokenKind::Minus, "-", pos),
            },
            b'*' => self.two_char(b'=', TokenKind::StarAssign, TokenKind::Star, pos),
            b'/' => self.two_char(b'=', TokenKind::SlashAssign, TokenKind::Slash, pos),
            b'%' => self.two_char(b'=', TokenKind::PercentAssign, TokenKind::Percent, pos),
            b'^' => self.two_char(b'=', TokenKind::CaretAssign, TokenKind::Caret, pos),
            b'~' => Token::new(TokenKind::Tilde, "~", pos),
            b'&' => match self.peek_char() {
                b'&' => self.consume2("&&", TokenKind::AndAnd, pos),
                b'=' => self.consume2("&=", TokenKind::AmpAssign, pos),
                _ => Token::new(TokenKind::Amp, "&", pos),
            },
            b'|' => match self.peek_char() {
                b'|' => self.consume2("||", TokenKind::OrOr, pos),
                b'=' => self.consume2("|=", TokenKind::PipeAssign, pos),
                _ => Token::new(TokenKind::Pipe, "|", pos),
            },
            b'<' => match self.peek_char() {
                b'<' => {
                    self.read_char();
                    if self.peek_char() == b'=' {
                        self.read_char();
                        Token::new(TokenKind::ShlAssign, "<<=", pos)
                    } else {
                        Token::new(TokenKind::Shl, "<<", pos)
                    }
                }
                b'=' => self.consume2("<=", TokenKind::Le, pos),
                _ => Token::new(TokenKind::Lt, "<", pos),
            },
            b'>' => match self.peek_char() {
                b'>' => {
                    self.read_char();
                    if self.peek_char() == b'=' {
                        self.read_char();
                        Token::new(TokenKind::ShrAssign, ">>=", pos)
                    } else {
                        Token::new(TokenKind::Shr, ">>", pos)
                    }
                }
                b'=' => self.consume2(">=", TokenKind::Ge, pos),
                _ => Token::new(TokenKind::Gt, ">", pos),
            },
            b'?' => Token::new(TokenKind::Question, "?", pos),
            b':' => Token::new(TokenKind::Colon, ":", pos),
            b';' => Token::new(TokenKind::Semicolon, ";", pos),
            b',' => Token::new(TokenKind::Comma, ",", pos),
            b'.' => {
                if self.peek_char() == b'.' && self.input.get(self.read_pos + 1) == Some(&b'.') {
                    self.read_char();
                    self.read_char();
                    Token::new(TokenKind::Ellipsis, "...", pos)
                } else {
                    Token::new(TokenKind::Dot, ".", pos)
                }
            }
            b'(' => Token::new(TokenKind::LParen, "(", pos),
            b')' => Token::new(TokenKind::RParen, ")", pos),
            b'{' => Token::new(TokenKind::LBrace, "{", pos),
            b'}' => Token::new(TokenKind::RBrace, "}", pos),
            b'[' => Token::new(TokenKind::LBracket, "[", pos),
            b']' => Token::new(TokenKind::RBracket, "]", pos),
            b'"' => {
                let s = self.read_string();
                return Token::new(TokenKind::StringLit, s, pos);
            }
            b'\'' => {
                let s = self.read_char_literal();
                return Token::new(TokenKind::CharLit, s, pos);
            }
            c if c.is_ascii_digit() => {
                let s = self.read_number();
                return Token::new(TokenKind::IntLit, s, pos);
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let s = self.read_identifier();
                let kind = lookup_ident(&s);
                return Token::new(kind, s, pos);
            }
            c => Token::new(TokenKind::Illegal, (c as char).to_string(), pos),
        };
        self.read_char();
        tok
    }

    fn two_char(&mut self, second: u8, both: TokenKind, single: TokenKind, pos: Pos) -> Token {
        if self.peek_char() == second {
            let lit = format!("{}{}", self.ch as char, second as char);
            self.read_char();
            Token::new(both, lit, pos)
        } else {
            Token::new(single, (self.ch as char).to_string(), pos)
        }
    }

    fn consume2(&mut self, lit: &str, kind: TokenKind, pos: Pos) -> Token {
        self.read_char();
        Token::new(kind, lit, pos)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.ch {
                b' ' | b'\t' | b'\r' | b'\n' => self.read_char(),
                b'/' if self.peek_char() == b'/' => {
                    while self.ch != b'\n' && self.ch != 0 {
                        self.read_char();
                    }
                }
                b'/' if self.peek_char() == b'*' => {
                    self.read_char();
                    self.read_char();
                    // Unterminated comments run to end of input silently.
                    loop {
                        if self.ch == 0 {
                            break;
                        }
                        if self.ch == b'*' && self.peek_char() == b'/' {
                            self.read_char();
                            self.read_char();
                            break;
                        }
                        self.read_char();
                    }
                }
                _ => break,
            }
        }
    }

    /// Try to consume a `#line`-style directive; on success the scanner sits
    /// at the first byte of the following line with the line counter (and
    /// possibly filename) overridden. On failure the scanner state is exactly
    /// as it was at entry.
    fn skip_line_directive(&mut self) -> bool {
        let cp = self.checkpoint();
        self.read_char(); // past '#'
        self.skip_inline_spaces();

        // Optional "line" keyword.
        if self.ch.is_ascii_alphabetic() {
            let word = self.read_identifier();
            if word != "line" {
                self.restore(cp);
                return false;
            }
            self.skip_inline_spaces();
        }

        if !self.ch.is_ascii_digit() {
            self.restore(cp);
            return false;
        }
        let digits = self.read_number();
        let n: u32 = match digits.parse() {
            Ok(n) => n,
            Err(_) => {
                self.restore(cp);
                return false;
            }
        };

        self.skip_inline_spaces();
        let mut file = None;
        if self.ch == b'"' {
            file = Some(self.read_string());
        }

        // Any trailing flags are discarded along with the rest of the line.
        while self.ch != b'\n' && self.ch != 0 {
            self.read_char();
        }
        if self.ch == b'\n' {
            self.read_char();
        }

        self.line = n;
        if let Some(f) = file {
            self.filename = f;
        }
        true
    }

    fn skip_inline_spaces(&mut self) {
        while self.ch == b' ' || self.ch == b'\t' {
            self.read_char();
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.pos;
        while self.ch.is_ascii_alphanumeric() || self.ch == b'_' {
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_number(&mut self) -> String {
        let start = self.pos;
        if self.ch == b'0' && (self.peek_char() == b'x' || self.peek_char() == b'X') {
            self.read_char();
            self.read_char();
            while self.ch.is_ascii_hexdigit() {
                self.read_char();
            }
        } else {
            while self.ch.is_ascii_digit() {
                self.read_char();
            }
        }
        // Integer suffixes (u/U/l/L in any combination) belong to the literal.
        while matches!(self.ch, b'u' | b'U' | b'l' | b'L') {
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    /// Read a string literal body. Escape sequences are kept verbatim:
    /// a backslash records itself and the next character, undecoded.
    fn read_string(&mut self) -> String {
        let mut out = String::new();
        self.read_char(); // past opening quote
        loop {
            match self.ch {
                0 | b'"' => break,
                b'\\' => {
                    out.push('\\');
                    self.read_char();
                    if self.ch != 0 {
                        out.push(self.ch as char);
                        self.read_char();
                    }
                }
                c => {
                    out.push(c as char);
                    self.read_char();
                }
            }
        }
        if self.ch == b'"' {
            self.read_char();
        }
        out
    }

    fn read_char_literal(&mut self) -> String {
        let mut out = String::new();
        self.read_char(); // past opening quote
        loop {
            match self.ch {
                0 | b'\'' => break,
                b'\\' => {
                    out.push('\\');
                    self.read_char();
                    if self.ch != 0 {
                        out.push(self.ch as char);
                        self.read_char();
                    }
                }
                c => {
                    out.push(c as char);
                    self.read_char();
                }
            }
        }
        if self.ch == b'\'' {
            self.read_char();
        }
        out
    }
}
