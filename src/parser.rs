// Recursive-descent parser: token stream -> AST.
//
// Fixed precedence, lowest to highest: logical-or, logical-and, equality,
// relational, additive, multiplicative, unary, primary. Every level is
// left-associative. This is the *single* surface grammar chosen per
// REDESIGN FLAGS item 3 in spec.md -- no `%` operator, `^` is prefix-only
// (memory grow), matching the teacher's own single hand-written recursive
// descent shape (`lalrpop`/generated grammars are dropped entirely; see
// DESIGN.md).
//
// A syntax error abandons the current statement: `resync` skips to the
// next `;` (consuming it) or to the enclosing `}` / end of input, so one
// bad statement doesn't suppress diagnostics for the rest of the file.

use crate::ast::*;
use crate::diagnostics::Diagnostics;
use crate::token::{Token, TokenKind};
use crate::types::{BinOp, UnOp};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    diags: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, diags: &'a mut Diagnostics) -> Parser<'a> {
        Parser { tokens, pos: 0, diags }
    }

    pub fn parse(mut self) -> Program {
        let mut stmts = Vec::new();
        while !self.at_eof() {
            match self.parse_stmt() {
                Some(s) => stmts.push(s),
                None => self.resync(),
            }
        }
        Program { stmts }
    }

    // ---- token-stream primitives ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<()> {
        if self.peek().kind == kind {
            self.advance();
            Some(())
        } else {
            self.error_here(&format!("expected {}", what));
            None
        }
    }

    fn expect_ident(&mut self) -> Option<String> {
        if let TokenKind::Ident(name) = self.peek().kind.clone() {
            self.advance();
            Some(name)
        } else {
            self.error_here("expected an identifier");
            None
        }
    }

    fn expect_type(&mut self) -> Option<crate::types::Type> {
        if let TokenKind::TypeName(ty) = self.peek().kind {
            self.advance();
            Some(ty)
        } else {
            self.error_here("expected a type name");
            None
        }
    }

    fn error_here(&mut self, msg: &str) {
        let tok = self.peek().clone();
        self.diags.report(format!("{} but found '{}'", msg, tok.lexeme), Some(tok.line));
    }

    /// Skip to the next statement boundary after a syntax error.
    fn resync(&mut self) {
        loop {
            match self.peek().kind {
                TokenKind::Semi => {
                    self.advance();
                    break;
                }
                TokenKind::RBrace | TokenKind::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ---- statements ----

    fn parse_block_stmts(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            match self.parse_stmt() {
                Some(s) => stmts.push(s),
                None => self.resync(),
            }
        }
        stmts
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        match self.peek().kind {
            TokenKind::Var | TokenKind::Const => self.parse_var_decl(),
            TokenKind::Func => self.parse_func_def(),
            TokenKind::Import => self.parse_func_import(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Break => {
                let line = self.advance().line;
                self.expect(TokenKind::Semi, "';'")?;
                Some(Stmt::Break { line })
            }
            TokenKind::Continue => {
                let line = self.advance().line;
                self.expect(TokenKind::Semi, "';'")?;
                Some(Stmt::Continue { line })
            }
            TokenKind::Return => {
                let line = self.advance().line;
                let expr = if self.check(&TokenKind::Semi) { None } else { Some(self.parse_expr()?) };
                self.expect(TokenKind::Semi, "';'")?;
                Some(Stmt::Return { expr, line })
            }
            TokenKind::Print => {
                let line = self.advance().line;
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi, "';'")?;
                Some(Stmt::Print { expr, line })
            }
            TokenKind::Ident(_) => self.parse_ident_stmt(),
            TokenKind::Backtick => self.parse_mem_assign_stmt(),
            _ => {
                self.error_here("expected a statement");
                None
            }
        }
    }

    fn parse_var_decl(&mut self) -> Option<Stmt> {
        let tok = self.advance();
        let line = tok.line;
        let is_constant = tok.kind == TokenKind::Const;

        let name = self.expect_ident()?;
        let declared_type = if let TokenKind::TypeName(ty) = self.peek().kind {
            self.advance();
            Some(ty)
        } else {
            None
        };

        if is_constant && declared_type.is_none() {
            self.diags.report("'const' requires an explicit type", Some(line));
            return None;
        }

        let initializer = if self.check(&TokenKind::Assign) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        self.expect(TokenKind::Semi, "';'")?;
        Some(Stmt::VarDecl(VarDecl { name, declared_type, initializer, is_constant, line }))
    }

    fn parse_params(&mut self) -> Option<Vec<Parameter>> {
        let mut params = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Some(params);
        }
        loop {
            let line = self.peek().line;
            let name = self.expect_ident()?;
            let ty = self.expect_type()?;
            params.push(Parameter { name, ty, line });
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Some(params)
    }

    fn parse_func_def(&mut self) -> Option<Stmt> {
        let line = self.advance().line; // 'func'
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen, "'('")?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen, "')'")?;
        let return_type = if let TokenKind::TypeName(ty) = self.peek().kind {
            self.advance();
            Some(ty)
        } else {
            None
        };
        self.expect(TokenKind::LBrace, "'{'")?;
        let body = self.parse_block_stmts();
        self.expect(TokenKind::RBrace, "'}'")?;
        Some(Stmt::FuncDef(FuncDef { name, params, return_type, body, line }))
    }

    fn parse_func_import(&mut self) -> Option<Stmt> {
        let line = self.advance().line; // 'import'
        self.expect(TokenKind::Func, "'func'")?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen, "'('")?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen, "')'")?;
        let return_type = if let TokenKind::TypeName(ty) = self.peek().kind {
            self.advance();
            Some(ty)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "';'")?;
        Some(Stmt::FuncImport(FuncImport { name, params, return_type, line }))
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let line = self.advance().line; // 'if'
        let cond = self.parse_expr()?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let then_body = self.parse_block_stmts();
        self.expect(TokenKind::RBrace, "'}'")?;
        let else_body = if self.check(&TokenKind::Else) {
            self.advance();
            self.expect(TokenKind::LBrace, "'{'")?;
            let b = self.parse_block_stmts();
            self.expect(TokenKind::RBrace, "'}'")?;
            Some(b)
        } else {
            None
        };
        Some(Stmt::If { cond, then_body, else_body, line })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let line = self.advance().line; // 'while'
        let cond = self.parse_expr()?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let body = self.parse_block_stmts();
        self.expect(TokenKind::RBrace, "'}'")?;
        Some(Stmt::While { cond, body, line })
    }

    fn parse_ident_stmt(&mut self) -> Option<Stmt> {
        let tok = self.advance();
        let line = tok.line;
        let name = match tok.kind {
            TokenKind::Ident(name) => name,
            _ => unreachable!("parse_ident_stmt called off an Ident token"),
        };

        if self.check(&TokenKind::LParen) {
            self.advance();
            let args = self.parse_args()?;
            self.expect(TokenKind::RParen, "')'")?;
            self.expect(TokenKind::Semi, "';'")?;
            let call = Expr::new(ExprKind::FuncCall { name, args }, line);
            Some(Stmt::ExprStmt { call, line })
        } else {
            self.expect(TokenKind::Assign, "'='")?;
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Semi, "';'")?;
            Some(Stmt::Assign { location: Location::Named { name }, expr, line })
        }
    }

    fn parse_mem_assign_stmt(&mut self) -> Option<Stmt> {
        let line = self.advance().line; // backtick
        let addr = self.parse_mem_addr()?;
        self.expect(TokenKind::Assign, "'='")?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::Semi, "';'")?;
        Some(Stmt::Assign { location: Location::Mem { addr: Box::new(addr) }, expr, line })
    }

    /// The address expression following a backtick: either a bare
    /// identifier or a fully parenthesized expression.
    fn parse_mem_addr(&mut self) -> Option<Expr> {
        let line = self.peek().line;
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Some(Expr::new(ExprKind::NamedRead { name }, line))
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(e)
            }
            _ => {
                self.error_here("expected an identifier or '(' after '`'");
                None
            }
        }
    }

    fn parse_args(&mut self) -> Option<Vec<Expr>> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Some(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Some(args)
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Self::binop(BinOp::Or, left, right);
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(&TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_equality()?;
            left = Self::binop(BinOp::And, left, right);
        }
        Some(left)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Self::binop(op, left, right);
        }
        Some(left)
    }

    fn parse_relational(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Self::binop(op, left, right);
        }
        Some(left)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Self::binop(op, left, right);
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binop(op, left, right);
        }
        Some(left)
    }

    fn binop(op: BinOp, left: Expr, right: Expr) -> Expr {
        let line = left.line;
        Expr::new(ExprKind::BinaryOp { op, left: Box::new(left), right: Box::new(right) }, line)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let line = self.peek().line;
        let op = match self.peek().kind {
            TokenKind::Plus => Some(UnOp::Pos),
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::Caret => Some(UnOp::Grow),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            Some(Expr::new(ExprKind::UnaryOp { op, operand: Box::new(operand) }, line))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let line = self.peek().line;
        match self.peek().kind.clone() {
            TokenKind::IntLit(v) => {
                self.advance();
                Some(Expr::new(ExprKind::Literal(LiteralValue::Int(v)), line))
            }
            TokenKind::FloatLit(v) => {
                self.advance();
                Some(Expr::new(ExprKind::Literal(LiteralValue::Float(v)), line))
            }
            TokenKind::CharLit(v) => {
                self.advance();
                Some(Expr::new(ExprKind::Literal(LiteralValue::Char(v)), line))
            }
            TokenKind::BoolLit(v) => {
                self.advance();
                Some(Expr::new(ExprKind::Literal(LiteralValue::Bool(v)), line))
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(e)
            }
            TokenKind::TypeName(ty) => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(Expr::new(ExprKind::TypeCast { target: ty, expr: Box::new(e) }, line))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_args()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    Some(Expr::new(ExprKind::FuncCall { name, args }, line))
                } else {
                    Some(Expr::new(ExprKind::NamedRead { name }, line))
                }
            }
            TokenKind::Backtick => {
                self.advance();
                let addr = self.parse_mem_addr()?;
                Some(Expr::new(ExprKind::MemRead { addr: Box::new(addr) }, line))
            }
            _ => {
                self.error_here("expected an expression");
                None
            }
        }
    }
}
