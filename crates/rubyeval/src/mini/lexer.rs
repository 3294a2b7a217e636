use strum::{EnumString, IntoStaticStr};

use crate::parse::ParseError;

/// Reserved words recognised by the MiniRuby parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Keyword {
    Nil,
    True,
    False,
    #[strum(serialize = "self")]
    SelfKw,
    If,
    Unless,
    Elsif,
    Else,
    Then,
    End,
    While,
    Until,
    Do,
    Def,
    Return,
    And,
    Or,
    Not,
    Begin,
    Rescue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semi,
    Assign,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    Bang,
    AndAnd,
    OrOr,
    Pipe,
    Question,
    Colon,
    Shovel,
    FatArrow,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    OrAssign,
}

/// Piece of a double-quoted string literal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StrSegment {
    Lit(String),
    /// `#{...}` body, with the byte offset of its first character in the document.
    Code { source: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(Vec<StrSegment>),
    Symbol(String),
    Ident(String),
    Const(String),
    Global(String),
    Keyword(Keyword),
    Punct(Punct),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// Whitespace separates this token from the previous one.
    pub space_before: bool,
}

/// Splits `source` into tokens. Offsets are shifted by `base` so fragments (string
/// interpolations) report positions in the enclosing document.
pub(crate) fn tokenize(source: &str, base: usize) -> Result<Vec<Token>, ParseError> {
    Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        base,
        tokens: Vec::new(),
    }
    .run()
}

struct Lexer<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
    base: usize,
    tokens: Vec<Token>,
}

impl Lexer<'_> {
    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        loop {
            let space_before = self.skip_blanks();
            let start = self.pos;
            let Some(&byte) = self.bytes.get(self.pos).filter(|_| !self.at_end_marker()) else {
                self.push(TokenKind::Eof, start, space_before);
                return Ok(self.tokens);
            };

            let kind = match byte {
                b'\n' => {
                    self.pos += 1;
                    TokenKind::Newline
                }
                b'0'..=b'9' => self.number()?,
                b'"' => self.double_quoted()?,
                b'\'' => self.single_quoted()?,
                b'$' => {
                    self.pos += 1;
                    let name = self.word().to_owned();
                    if name.is_empty() {
                        return Err(self.error("'$' without identifiers is not allowed as a global variable name", start));
                    }
                    TokenKind::Global(name)
                }
                b':' if self.peek(1).is_some_and(is_ident_start) => {
                    self.pos += 1;
                    let name = self.method_name();
                    TokenKind::Symbol(name)
                }
                b if is_ident_start(b) => {
                    let name = self.method_name();
                    if b.is_ascii_uppercase() {
                        TokenKind::Const(name)
                    } else if let Ok(keyword) = name.parse::<Keyword>() {
                        TokenKind::Keyword(keyword)
                    } else {
                        TokenKind::Ident(name)
                    }
                }
                _ => TokenKind::Punct(self.punct(start)?),
            };
            self.push(kind, start, space_before);
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, space_before: bool) {
        self.tokens.push(Token {
            kind,
            start: self.base + start,
            end: self.base + self.pos,
            space_before,
        });
    }

    /// Skips spaces, comments and escaped newlines. Returns whether anything was skipped.
    fn skip_blanks(&mut self) -> bool {
        let start = self.pos;
        while let Some(&byte) = self.bytes.get(self.pos) {
            match byte {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\\' if self.peek(1) == Some(b'\n') => self.pos += 2,
                b'#' => {
                    while self.bytes.get(self.pos).is_some_and(|&b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        self.pos > start
    }

    /// `__END__` alone on a line of the document ends the program text.
    fn at_end_marker(&self) -> bool {
        let line_start = self.pos == 0 || self.bytes[self.pos - 1] == b'\n';
        if self.base != 0 || !line_start {
            return false;
        }
        let rest = &self.bytes[self.pos..];
        rest.strip_prefix(b"__END__")
            .is_some_and(|after| matches!(after, [] | [b'\n', ..] | [b'\r', b'\n', ..]))
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn word(&mut self) -> &str {
        let start = self.pos;
        while self.bytes.get(self.pos).copied().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        &self.source[start..self.pos]
    }

    /// An identifier, including a trailing `?` or `!` unless it starts `!=` / `?=`.
    fn method_name(&mut self) -> String {
        let mut name = self.word().to_owned();
        if let Some(suffix @ (b'?' | b'!')) = self.peek(0)
            && self.peek(1) != Some(b'=')
        {
            name.push(char::from(suffix));
            self.pos += 1;
        }
        name
    }

    fn number(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        let mut is_float = false;
        while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_digit() || *b == b'_') {
            self.pos += 1;
        }
        if self.peek(0) == Some(b'.') && self.peek(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_digit() || *b == b'_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some(b'e' | b'E'))
            && (self.peek(1).is_some_and(|b| b.is_ascii_digit())
                || (matches!(self.peek(1), Some(b'+' | b'-')) && self.peek(2).is_some_and(|b| b.is_ascii_digit())))
        {
            is_float = true;
            self.pos += 2;
            while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
                self.pos += 1;
            }
        }

        let text: String = self.source[start..self.pos].chars().filter(|c| *c != '_').collect();
        if is_float {
            text.parse()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal {text}"), start))
        } else {
            text.parse()
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("integer literal {text} is too large"), start))
        }
    }

    fn double_quoted(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut segments = Vec::new();
        let mut literal = String::new();
        loop {
            let Some(ch) = self.source[self.pos..].chars().next() else {
                return Err(self.unterminated(start));
            };
            match ch {
                '"' => {
                    self.pos += 1;
                    break;
                }
                '\\' => {
                    self.pos += 1;
                    let Some(escaped) = self.source[self.pos..].chars().next() else {
                        return Err(self.unterminated(start));
                    };
                    self.pos += escaped.len_utf8();
                    match escaped {
                        'n' => literal.push('\n'),
                        't' => literal.push('\t'),
                        'r' => literal.push('\r'),
                        's' => literal.push(' '),
                        'e' => literal.push('\u{1b}'),
                        '0' => literal.push('\0'),
                        '\n' => {}
                        other => literal.push(other),
                    }
                }
                '#' if self.peek(1) == Some(b'{') => {
                    if !literal.is_empty() {
                        segments.push(StrSegment::Lit(std::mem::take(&mut literal)));
                    }
                    self.pos += 2;
                    let code_start = self.pos;
                    let code_end = self.interpolation_end(start)?;
                    segments.push(StrSegment::Code {
                        source: self.source[code_start..code_end].to_owned(),
                        offset: self.base + code_start,
                    });
                    self.pos = code_end + 1;
                }
                other => {
                    literal.push(other);
                    self.pos += other.len_utf8();
                }
            }
        }
        if !literal.is_empty() || segments.is_empty() {
            segments.push(StrSegment::Lit(literal));
        }
        Ok(TokenKind::Str(segments))
    }

    /// Finds the `}` closing an interpolation that starts at the cursor.
    fn interpolation_end(&self, string_start: usize) -> Result<usize, ParseError> {
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        let mut index = self.pos;
        while let Some(&byte) = self.bytes.get(index) {
            match (quote, byte) {
                (Some(_), b'\\') => index += 1,
                (Some(q), b) if b == q => quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => quote = Some(byte),
                (None, b'{') => depth += 1,
                (None, b'}') if depth == 0 => return Ok(index),
                (None, b'}') => depth -= 1,
                (None, _) => {}
            }
            index += 1;
        }
        Err(self.unterminated(string_start))
    }

    fn single_quoted(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut literal = String::new();
        loop {
            let Some(ch) = self.source[self.pos..].chars().next() else {
                return Err(self.unterminated(start));
            };
            self.pos += ch.len_utf8();
            match ch {
                '\'' => break,
                '\\' if matches!(self.peek(0), Some(b'\\' | b'\'')) => {
                    literal.push(char::from(self.bytes[self.pos]));
                    self.pos += 1;
                }
                other => literal.push(other),
            }
        }
        Ok(TokenKind::Str(vec![StrSegment::Lit(literal)]))
    }

    fn punct(&mut self, start: usize) -> Result<Punct, ParseError> {
        const MULTI: &[(&str, Punct)] = &[
            ("||=", Punct::OrAssign),
            ("==", Punct::Eq),
            ("!=", Punct::NotEq),
            ("<=", Punct::Le),
            (">=", Punct::Ge),
            ("**", Punct::Pow),
            ("&&", Punct::AndAnd),
            ("||", Punct::OrOr),
            ("<<", Punct::Shovel),
            ("=>", Punct::FatArrow),
            ("+=", Punct::PlusAssign),
            ("-=", Punct::MinusAssign),
            ("*=", Punct::StarAssign),
            ("/=", Punct::SlashAssign),
        ];
        let rest = &self.source[self.pos..];
        if let Some((text, punct)) = MULTI.iter().find(|(text, _)| rest.starts_with(text)) {
            self.pos += text.len();
            return Ok(*punct);
        }

        let punct = match self.bytes[self.pos] {
            b'(' => Punct::LParen,
            b')' => Punct::RParen,
            b'[' => Punct::LBracket,
            b']' => Punct::RBracket,
            b'{' => Punct::LBrace,
            b'}' => Punct::RBrace,
            b',' => Punct::Comma,
            b'.' => Punct::Dot,
            b';' => Punct::Semi,
            b'=' => Punct::Assign,
            b'<' => Punct::Lt,
            b'>' => Punct::Gt,
            b'+' => Punct::Plus,
            b'-' => Punct::Minus,
            b'*' => Punct::Star,
            b'/' => Punct::Slash,
            b'%' => Punct::Percent,
            b'!' => Punct::Bang,
            b'|' => Punct::Pipe,
            b'?' => Punct::Question,
            b':' => Punct::Colon,
            _ => {
                let ch = rest.chars().next().unwrap_or_default();
                return Err(self.error(format!("unexpected character {ch:?}"), start));
            }
        };
        self.pos += 1;
        Ok(punct)
    }

    fn error(&self, message: impl Into<String>, at: usize) -> ParseError {
        ParseError::new(message, Some(self.base + at))
    }

    fn unterminated(&self, at: usize) -> ParseError {
        self.error("unterminated string meets end of file", at).at_end_of_input()
    }
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_ident_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
