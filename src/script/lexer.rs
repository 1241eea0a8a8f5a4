//! Tokenizer for scenario scripts.
//!
//! Whitespace and `//` comments are skipped outside string literals and all
//! names are lowercased, so scripts are case-insensitive everywhere except
//! inside quotes.

use super::module::BinOp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    Ident(String),
    Var(String),
    Param(u8),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    Assign,
    Tilde,
    Bang,
    Op(BinOp),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: &'static str,
    pub span: Span,
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span { offset: self.pos, line: self.line, column: self.column }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    let mut cur = Cursor { src, pos: 0, line: 1, column: 1 };
    let mut out = Vec::new();
    loop {
        // skip blanks and comments
        loop {
            match cur.peek() {
                Some(c) if c.is_whitespace() => {
                    cur.bump();
                }
                Some('/') if cur.peek_second() == Some('/') => {
                    while let Some(c) = cur.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        let span = cur.span();
        let Some(c) = cur.peek() else {
            out.push(Token { tok: Tok::Eof, span });
            return Ok(out);
        };
        let err = |message| LexError { message, span };
        let tok = match c {
            '"' => {
                cur.bump();
                Tok::Str(read_string(&mut cur).ok_or(err("unterminated string"))?)
            }
            '$' => {
                cur.bump();
                let name = cur.take_while(is_name_char).to_ascii_lowercase();
                if name.is_empty() {
                    return Err(err("syntax error"));
                }
                Tok::Var(name)
            }
            '@' => {
                cur.bump();
                let digits = cur.take_while(|c| c.is_ascii_digit());
                let index = digits.parse::<u8>().map_err(|_| err("syntax error"))?;
                Tok::Param(index)
            }
            '0'..='9' => {
                let digits = cur.take_while(|c| c.is_ascii_digit());
                if digits.len() > 1 && digits.starts_with('0') {
                    return Err(err("bad numeric constant"));
                }
                Tok::Int(digits.parse::<i64>().map_err(|_| err("bad numeric constant"))?)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                Tok::Ident(cur.take_while(is_name_char).to_ascii_lowercase())
            }
            _ => {
                cur.bump();
                let next = cur.peek();
                let mut two = |tok: Tok| {
                    cur.bump();
                    tok
                };
                match (c, next) {
                    ('<', Some('=')) => two(Tok::Op(BinOp::Le)),
                    ('>', Some('=')) => two(Tok::Op(BinOp::Ge)),
                    ('=', Some('=')) => two(Tok::Op(BinOp::Eq)),
                    ('!', Some('=')) => two(Tok::Op(BinOp::Ne)),
                    ('&', Some('&')) => two(Tok::Op(BinOp::And)),
                    ('|', Some('|')) => two(Tok::Op(BinOp::Or)),
                    ('(', _) => Tok::LParen,
                    (')', _) => Tok::RParen,
                    ('{', _) => Tok::LBrace,
                    ('}', _) => Tok::RBrace,
                    (',', _) => Tok::Comma,
                    (';', _) => Tok::Semi,
                    (':', _) => Tok::Colon,
                    ('=', _) => Tok::Assign,
                    ('~', _) => Tok::Tilde,
                    ('!', _) => Tok::Bang,
                    ('+', _) => Tok::Op(BinOp::Add),
                    ('-', _) => Tok::Op(BinOp::Sub),
                    ('*', _) => Tok::Op(BinOp::Mul),
                    ('/', _) => Tok::Op(BinOp::Div),
                    ('%', _) => Tok::Op(BinOp::Rem),
                    ('&', _) => Tok::Op(BinOp::BitAnd),
                    ('|', _) => Tok::Op(BinOp::BitOr),
                    ('^', _) => Tok::Op(BinOp::Xor),
                    ('<', _) => Tok::Op(BinOp::Lt),
                    ('>', _) => Tok::Op(BinOp::Gt),
                    _ => return Err(err("syntax error")),
                }
            }
        };
        out.push(Token { tok, span });
    }
}

fn read_string(cur: &mut Cursor<'_>) -> Option<String> {
    let mut out = String::new();
    loop {
        match cur.bump()? {
            '"' => return Some(out),
            '\\' => match cur.bump()? {
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'n' => out.push('\n'),
                other => out.push(other),
            },
            c => out.push(c),
        }
    }
}
