use crate::span::Span;

/// Number of spaces making up one level of indentation.
pub const INDENT_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Structural
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Colon,
    Period,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    NotEq,
    Gt,
    GtE,
    Lt,
    LtE,
    Assign,
    Not,

    // Literals
    Int,
    Float,
    String,
    True,
    False,
    Null,

    Name,

    // Keywords
    If,
    Else,
    While,
    For,
    In,
    Continue,
    Break,
    Return,
    FunctionDef,
    ClassDef,
    VariableDeclaration,
    Mutable,
    Assert,
    Pass,
    This,

    // Layout
    NL,
    Indent,
    Dedent,
    Whitespace,
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Int(i64),
    Float(f64),
    String(String),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        self.kind
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::NL => write!(f, "NL"),
            TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof => write!(f, "{}", self.kind),
            _ => write!(f, "{}('{}')", self.kind, self.lexeme),
        }
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum TokenizeError {
    #[error("line {line}: unexpected character '{character}'")]
    UnexpectedCharacter { character: char, line: usize },
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
    #[error("line {line}: indentation of {spaces} spaces is not a multiple of {INDENT_WIDTH}")]
    MisalignedIndentation { spaces: usize, line: usize },
    #[error("line {line}: indentation may only increase by one level at a time")]
    IndentTooDeep { line: usize },
    #[error("line {line}: tabs are not allowed in indentation")]
    TabIndentation { line: usize },
    #[error("line {line}: integer literal {lexeme} is out of range")]
    IntegerOutOfRange { lexeme: String, line: usize },
    #[error("line {line}: unmatched '{character}'")]
    UnmatchedBracket { character: char, line: usize },
}

pub fn tokens(source: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokenizer = Tokenizer::new(source);
    tokenizer.run()?;
    tracing::debug!(count = tokenizer.tokens.len(), "tokenized source");
    Ok(tokenizer.tokens)
}

struct Tokenizer<'a> {
    source: &'a str,
    rest: &'a str,
    line: usize,
    line_start: usize,
    level: usize,
    brackets: Vec<char>,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            rest: source,
            line: 1,
            line_start: 0,
            level: 0,
            brackets: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), TokenizeError> {
        let mut at_line_start = true;

        while let Some(c) = self.rest.chars().next() {
            if at_line_start && self.brackets.is_empty() {
                self.indentation()?;
                at_line_start = false;
                continue;
            }
            at_line_start = false;

            match c {
                '\n' => {
                    let kind = if self.brackets.is_empty() {
                        TokenKind::NL
                    } else {
                        TokenKind::Whitespace
                    };
                    self.push(kind, TokenValue::None, 1);
                    self.newline();
                    at_line_start = true;
                }
                ' ' | '\t' | '\r' => {
                    let len = self
                        .rest
                        .chars()
                        .take_while(|c| matches!(c, ' ' | '\t' | '\r'))
                        .map(char::len_utf8)
                        .sum();
                    self.push(TokenKind::Whitespace, TokenValue::None, len);
                }
                '#' => {
                    let len = comment_len(self.rest);
                    self.advance(len);
                }
                '"' | '\'' => self.string(c)?,
                _ => self.token(c)?,
            }
        }

        let end = self.tokens.len();
        self.push(TokenKind::NL, TokenValue::None, 0);
        for _ in 0..self.level {
            self.push(TokenKind::Dedent, TokenValue::None, 0);
        }
        self.level = 0;
        self.push(TokenKind::Eof, TokenValue::None, 0);
        tracing::trace!(synthesized = self.tokens.len() - end, "closed token stream");
        Ok(())
    }

    fn indentation(&mut self) -> Result<(), TokenizeError> {
        let spaces = self.rest.bytes().take_while(|b| *b == b' ').count();
        let after = &self.rest[spaces..];

        match after.chars().next() {
            None | Some('\n') | Some('\r') | Some('#') => {
                // Blank lines never change the indentation level.
                if spaces > 0 {
                    self.push(TokenKind::Whitespace, TokenValue::None, spaces);
                }
                return Ok(());
            }
            Some('\t') => return Err(TokenizeError::TabIndentation { line: self.line }),
            _ => {}
        }

        if spaces % INDENT_WIDTH != 0 {
            return Err(TokenizeError::MisalignedIndentation {
                spaces,
                line: self.line,
            });
        }

        let level = spaces / INDENT_WIDTH;
        if level > self.level + 1 {
            return Err(TokenizeError::IndentTooDeep { line: self.line });
        }
        if level == self.level + 1 {
            self.push(TokenKind::Indent, TokenValue::None, 0);
        }
        for _ in level..self.level {
            self.push(TokenKind::Dedent, TokenValue::None, 0);
        }
        self.level = level;

        if spaces > 0 {
            self.push(TokenKind::Whitespace, TokenValue::None, spaces);
        }
        Ok(())
    }

    fn string(&mut self, delimiter: char) -> Result<(), TokenizeError> {
        let start_line = self.line;
        let start = self.source.len() - self.rest.len();
        let span = self.span();
        let body = &self.rest[1..];
        let Some(end) = body.find(delimiter) else {
            return Err(TokenizeError::UnterminatedString { line: start_line });
        };

        let text = &body[..end];
        let len = end + 2;
        self.tokens.push(Token {
            kind: TokenKind::String,
            value: TokenValue::String(text.to_string()),
            lexeme: self.rest[..len].to_string(),
            span,
        });

        if let Some(last) = text.rfind('\n') {
            self.line += text.matches('\n').count();
            self.line_start = start + 1 + last + 1;
        }
        self.advance(len);
        Ok(())
    }

    fn token(&mut self, first: char) -> Result<(), TokenizeError> {
        let Some((kind, rest)) = maximal(
            &[
                open_paren,
                close_paren,
                open_bracket,
                close_bracket,
                open_brace,
                close_brace,
                comma,
                colon,
                period,
                plus,
                minus,
                star,
                slash,
                eq,
                not_eq,
                gt,
                gt_e,
                lt,
                lt_e,
                assign,
                bang,
                identifier,
                number,
            ],
            self.rest,
        ) else {
            return Err(TokenizeError::UnexpectedCharacter {
                character: first,
                line: self.line,
            });
        };

        let len = self.rest.len() - rest.len();
        let lexeme = &self.rest[..len];
        let value = match kind {
            TokenKind::Name => TokenValue::Name(lexeme.to_string()),
            TokenKind::Int => TokenValue::Int(lexeme.parse().map_err(|_| {
                TokenizeError::IntegerOutOfRange {
                    lexeme: lexeme.to_string(),
                    line: self.line,
                }
            })?),
            // The float scanner only accepts digits '.' digits, which always parses.
            TokenKind::Float => TokenValue::Float(lexeme.parse().unwrap_or(f64::NAN)),
            _ => TokenValue::None,
        };

        match kind {
            TokenKind::OpenParen | TokenKind::OpenBracket | TokenKind::OpenBrace => {
                self.brackets.push(first)
            }
            TokenKind::CloseParen | TokenKind::CloseBracket | TokenKind::CloseBrace => {
                let opener = match first {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if self.brackets.pop() != Some(opener) {
                    return Err(TokenizeError::UnmatchedBracket {
                        character: first,
                        line: self.line,
                    });
                }
            }
            _ => {}
        }

        self.push(kind, value, len);
        Ok(())
    }

    fn span(&self) -> Span {
        let offset = self.source.len() - self.rest.len();
        Span::new(self.line, offset - self.line_start + 1)
    }

    fn push(&mut self, kind: TokenKind, value: TokenValue, len: usize) {
        let span = self.span();
        self.tokens.push(Token {
            kind,
            value,
            lexeme: self.rest[..len].to_string(),
            span,
        });
        self.advance(len);
    }

    fn advance(&mut self, len: usize) {
        self.rest = &self.rest[len..];
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.source.len() - self.rest.len();
    }
}

fn comment_len(source: &str) -> usize {
    source
        .chars()
        .take_while(|c| *c != '\n')
        .map(char::len_utf8)
        .sum()
}

fn maximal<'a, T: std::fmt::Debug>(
    scanners: &[fn(&str) -> Option<(T, &str)>],
    source: &'a str,
) -> Option<(T, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching = scanners.iter().filter_map(|scanner| scanner(source));
    for (m, rest) in matching {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $kind:expr) => {
        fn $name(source: &str) -> Option<(TokenKind, &str)> {
            source
                .strip_prefix($word)
                .map(|rest| ($kind, rest))
        }
    };
}

match_literal! { open_paren, "(", TokenKind::OpenParen }
match_literal! { close_paren, ")", TokenKind::CloseParen }
match_literal! { open_bracket, "[", TokenKind::OpenBracket }
match_literal! { close_bracket, "]", TokenKind::CloseBracket }
match_literal! { open_brace, "{", TokenKind::OpenBrace }
match_literal! { close_brace, "}", TokenKind::CloseBrace }
match_literal! { comma, ",", TokenKind::Comma }
match_literal! { colon, ":", TokenKind::Colon }
match_literal! { period, ".", TokenKind::Period }
match_literal! { plus, "+", TokenKind::Plus }
match_literal! { minus, "-", TokenKind::Minus }
match_literal! { star, "*", TokenKind::Star }
match_literal! { slash, "/", TokenKind::Slash }
match_literal! { eq, "==", TokenKind::Eq }
match_literal! { not_eq, "!=", TokenKind::NotEq }
match_literal! { gt, ">", TokenKind::Gt }
match_literal! { gt_e, ">=", TokenKind::GtE }
match_literal! { lt, "<", TokenKind::Lt }
match_literal! { lt_e, "<=", TokenKind::LtE }
match_literal! { assign, "=", TokenKind::Assign }
match_literal! { bang, "!", TokenKind::Not }

fn keyword(name: &str) -> Option<TokenKind> {
    let kind = match name {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "continue" => TokenKind::Continue,
        "break" => TokenKind::Break,
        "return" => TokenKind::Return,
        "fun" => TokenKind::FunctionDef,
        "class" => TokenKind::ClassDef,
        "var" => TokenKind::VariableDeclaration,
        "mut" => TokenKind::Mutable,
        "assert" => TokenKind::Assert,
        "pass" => TokenKind::Pass,
        "this" => TokenKind::This,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "not" => TokenKind::Not,
        _ => return None,
    };
    Some(kind)
}

fn identifier(source: &str) -> Option<(TokenKind, &str)> {
    let first = source.chars().next()?;
    if !first.is_alphabetic() && first != '_' {
        return None;
    }

    let len = source
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .map(char::len_utf8)
        .sum::<usize>();

    let kind = keyword(&source[..len]).unwrap_or(TokenKind::Name);
    Some((kind, &source[len..]))
}

fn digits(source: &str) -> usize {
    source.bytes().take_while(u8::is_ascii_digit).count()
}

fn number(source: &str) -> Option<(TokenKind, &str)> {
    let whole = digits(source);
    if whole == 0 {
        return None;
    }

    // digits '.' digits is tried before a plain integer.
    if let Some(after_point) = source[whole..].strip_prefix('.') {
        let fraction = digits(after_point);
        if fraction > 0 {
            return Some((TokenKind::Float, &after_point[fraction..]));
        }
    }

    Some((TokenKind::Int, &source[whole..]))
}
