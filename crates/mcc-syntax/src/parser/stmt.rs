//! Statement parsing, with block-level error recovery.

use crate::cabs::{ForInit, Stmt, SwitchCase};
use crate::token::TokenKind;

use super::{Abort, PResult, Parser};

impl Parser {
    /// `{ ... }` with per-statement recovery: a failed statement syncs to the
    /// next `;`, `{` or `}` and parsing continues.
    pub(crate) fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while self.cur_kind() != TokenKind::RBrace && self.cur_kind() != TokenKind::Eof {
            match self.parse_stmt() {
                Ok(s) => stmts.push(s),
                Err(Abort) => self.sync_to_stmt_end(),
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    pub(crate) fn parse_stmt(&mut self) -> PResult<Stmt> {
        // Labels win over everything: `name: stmt`.
        if self.cur_kind() == TokenKind::Ident && self.peek_kind() == TokenKind::Colon {
            let name = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let stmt = self.parse_stmt()?;
            return Ok(Stmt::Label(name, Box::new(stmt)));
        }

        match self.cur_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.bump();
                Ok(Stmt::Block(Vec::new()))
            }
            TokenKind::Return => {
                self.bump();
                let e = if self.cur_kind() == TokenKind::Semicolon {
                    None
                } else {
                    Some(self.parse_full_expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Return(e))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break => {
                self.bump();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.bump();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Continue)
            }
            TokenKind::Goto => {
                self.bump();
                let label = self.expect_ident()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Goto(label))
            }
            _ if self.at_declaration_start() => {
                let decls = self.parse_local_decls()?;
                Ok(Stmt::Decl(decls))
            }
            _ => {
                let e = self.parse_full_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Computation(e))
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_full_expr()?;
        self.expect(TokenKind::RParen)?;
        let then = Box::new(self.parse_stmt()?);
        let els = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If { cond, then, els })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_full_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_stmt()?);
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_full_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        let init = if self.eat(TokenKind::Semicolon) {
            ForInit::None
        } else if self.at_declaration_start() {
            ForInit::Decls(self.parse_local_decls()?)
        } else {
            let e = self.parse_full_expr()?;
            self.expect(TokenKind::Semicolon)?;
            ForInit::Expr(e)
        };

        let cond = if self.cur_kind() == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_full_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;

        let step = if self.cur_kind() == TokenKind::RParen {
            None
        } else {
            Some(self.parse_full_expr()?)
        };
        self.expect(TokenKind::RParen)?;

        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::Switch)?;
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_full_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;

        let mut cases = Vec::new();
        loop {
            let value = match self.cur_kind() {
                TokenKind::Case => {
                    self.bump();
                    let v = self.parse_constant_expr()?;
                    Some(v)
                }
                TokenKind::Default => {
                    self.bump();
                    None
                }
                TokenKind::RBrace | TokenKind::Eof => break,
                other => {
                    self.error_here(format!("expected 'case' or 'default', found '{}'", other));
                    return Err(Abort);
                }
            };
            self.expect(TokenKind::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.cur_kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                match self.parse_stmt() {
                    Ok(s) => body.push(s),
                    Err(Abort) => self.sync_to_stmt_end(),
                }
            }
            cases.push(SwitchCase { value, body });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Stmt::Switch { expr, cases })
    }
}
