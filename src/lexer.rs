// Single-pass scanner: source string -> token stream.
//
// Follows the algorithm in the spec precisely: two-character operators are
// tried before one-character ones, comments (`//` and non-nesting `/* */`)
// are skipped before anything else, and an illegal byte is reported but
// does not stop scanning -- the lexer resumes at the next byte so later
// errors still surface. Keyword/operator tables are `lazy_static!` maps,
// the same idiom the teacher uses for its own static lookup tables
// (`bytecode.rs`'s regexes), applied here to a hand-rolled scanner instead
// (compare the original Python `glexer.py`'s `KEYWORDS`/`ONE_CHAR`/
// `TWO_CHAR` dicts).

use std::collections::HashMap;

use crate::diagnostics::Diagnostics;
use crate::token::{Token, TokenKind};
use crate::types::Type;

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, TokenKind> = {
        let mut m = HashMap::new();
        m.insert("const", TokenKind::Const);
        m.insert("var", TokenKind::Var);
        m.insert("func", TokenKind::Func);
        m.insert("if", TokenKind::If);
        m.insert("else", TokenKind::Else);
        m.insert("while", TokenKind::While);
        m.insert("break", TokenKind::Break);
        m.insert("continue", TokenKind::Continue);
        m.insert("return", TokenKind::Return);
        m.insert("print", TokenKind::Print);
        m.insert("import", TokenKind::Import);
        m.insert("int", TokenKind::TypeName(Type::Int));
        m.insert("float", TokenKind::TypeName(Type::Float));
        m.insert("char", TokenKind::TypeName(Type::Char));
        m.insert("bool", TokenKind::TypeName(Type::Bool));
        m.insert("true", TokenKind::BoolLit(true));
        m.insert("false", TokenKind::BoolLit(false));
        m
    };

    static ref TWO_CHAR: HashMap<&'static str, TokenKind> = {
        let mut m = HashMap::new();
        m.insert("<=", TokenKind::Le);
        m.insert(">=", TokenKind::Ge);
        m.insert("==", TokenKind::EqEq);
        m.insert("!=", TokenKind::Ne);
        m.insert("&&", TokenKind::AndAnd);
        m.insert("||", TokenKind::OrOr);
        m
    };
}

fn one_char(c: u8) -> Option<TokenKind> {
    match c {
        b'+' => Some(TokenKind::Plus),
        b'-' => Some(TokenKind::Minus),
        b'*' => Some(TokenKind::Star),
        b'/' => Some(TokenKind::Slash),
        b'<' => Some(TokenKind::Lt),
        b'>' => Some(TokenKind::Gt),
        b'=' => Some(TokenKind::Assign),
        b';' => Some(TokenKind::Semi),
        b'(' => Some(TokenKind::LParen),
        b')' => Some(TokenKind::RParen),
        b'{' => Some(TokenKind::LBrace),
        b'}' => Some(TokenKind::RBrace),
        b',' => Some(TokenKind::Comma),
        b'`' => Some(TokenKind::Backtick),
        b'^' => Some(TokenKind::Caret),
        b'!' => Some(TokenKind::Not),
        _ => None,
    }
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Lexer<'a> {
        Lexer { src: src.as_bytes(), pos: 0, line: 1 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skip whitespace and comments. Reports an unterminated block comment
    /// as fatal and leaves `pos` at the end of input.
    fn skip_trivia(&mut self, diags: &mut Diagnostics) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start_line = self.line;
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while let Some(c) = self.peek() {
                        if c == b'*' && self.peek_at(1) == Some(b'/') {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        diags.report("unterminated block comment", Some(start_line));
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_number(&mut self, diags: &mut Diagnostics) -> TokenKind {
        let line = self.line;
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') {
            // Require at least one digit on some side of the dot: since we
            // already consumed a leading digit run (possibly empty), a
            // bare trailing dot with no following digit is still a valid
            // float per the spec ("5."); a dot with no digits on either
            // side never reaches this branch because `.5` is caught by the
            // leading-dot case in `next_token`.
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        if is_float {
            match text.parse() {
                Ok(x) => TokenKind::FloatLit(x),
                Err(_) => {
                    diags.report(format!("invalid float literal '{}'", text), Some(line));
                    TokenKind::FloatLit(0.0)
                }
            }
        } else {
            match text.parse() {
                Ok(n) => TokenKind::IntLit(n),
                Err(_) => {
                    diags.report(format!("integer literal '{}' out of range", text), Some(line));
                    TokenKind::IntLit(0)
                }
            }
        }
    }

    fn lex_leading_dot_float(&mut self, diags: &mut Diagnostics) -> TokenKind {
        let line = self.line;
        let start = self.pos;
        self.advance(); // the dot
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        match text.parse() {
            Ok(x) => TokenKind::FloatLit(x),
            Err(_) => {
                diags.report(format!("invalid float literal '{}'", text), Some(line));
                TokenKind::FloatLit(0.0)
            }
        }
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        KEYWORDS.get(text).cloned().unwrap_or_else(|| TokenKind::Ident(text.to_string()))
    }

    /// Lexes a char literal; `self.pos` is positioned at the opening `'`.
    /// Returns `None` (and reports) on a malformed literal.
    fn lex_char(&mut self, diags: &mut Diagnostics) -> Option<TokenKind> {
        let line = self.line;
        self.advance(); // opening quote
        let value = match self.advance() {
            Some(b'\\') => match self.advance() {
                Some(b'n') => '\n',
                Some(b'r') => '\r',
                Some(b't') => '\t',
                Some(b'0') => '\0',
                Some(b'\\') => '\\',
                Some(b'\'') => '\'',
                Some(b'"') => '"',
                Some(c) => {
                    diags.report(format!("invalid escape '\\{}'", c as char), Some(line));
                    return None;
                }
                None => {
                    diags.report("unterminated char literal", Some(line));
                    return None;
                }
            },
            Some(c) => c as char,
            None => {
                diags.report("unterminated char literal", Some(line));
                return None;
            }
        };
        if self.peek() != Some(b'\'') {
            diags.report("unterminated char literal", Some(line));
            return None;
        }
        self.advance(); // closing quote
        Some(TokenKind::CharLit(value))
    }

    pub fn next_token(&mut self, diags: &mut Diagnostics) -> Token {
        self.skip_trivia(diags);
        let line = self.line;

        let c = match self.peek() {
            None => return Token::new(TokenKind::Eof, "", line),
            Some(c) => c,
        };

        // Two-character operators before one-character ones.
        if let Some(c1) = self.peek_at(1) {
            let two = [c, c1];
            if let Ok(s) = std::str::from_utf8(&two) {
                if let Some(kind) = TWO_CHAR.get(s) {
                    let lexeme = s.to_string();
                    self.advance();
                    self.advance();
                    return Token::new(kind.clone(), lexeme, line);
                }
            }
        }

        if c == b'\'' {
            return match self.lex_char(diags) {
                Some(kind) => Token::new(kind, "'...'", line),
                None => Token::new(TokenKind::Eof, "", line),
            };
        }

        if c.is_ascii_digit() {
            let kind = self.lex_number(diags);
            return Token::new(kind.clone(), format!("{:?}", kind), line);
        }

        if c == b'.' && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) {
            let kind = self.lex_leading_dot_float(diags);
            return Token::new(kind.clone(), format!("{:?}", kind), line);
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let kind = self.lex_ident();
            return Token::new(kind.clone(), format!("{:?}", kind), line);
        }

        if let Some(kind) = one_char(c) {
            self.advance();
            return Token::new(kind, (c as char).to_string(), line);
        }

        diags.report(format!("illegal character '{}'", c as char), Some(line));
        self.advance();
        // Resume scanning; callers loop until Eof, so recurse for the next
        // real token instead of returning a sentinel the parser would choke
        // on.
        self.next_token(diags)
    }

    /// Lexes the whole source into a token stream terminated by `Eof`.
    pub fn tokenize(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(diags);
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        tokens
    }
}
