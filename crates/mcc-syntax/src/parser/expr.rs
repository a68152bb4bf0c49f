//! Pratt expression parser.
//!
//! Binding powers follow the C precedence ladder, comma lowest. Left
//! associativity recurses at `prec + 1`; the right-associative levels
//! (assignment, ternary) recurse at the same level.

use crate::cabs::{BinaryOp, Expr, UnaryOp};
use crate::token::TokenKind;

use super::{Abort, PResult, Parser};

const PREC_COMMA: u8 = 1;
const PREC_ASSIGN: u8 = 2;
const PREC_TERNARY: u8 = 3;
const PREC_LOR: u8 = 4;
const PREC_LAND: u8 = 5;
const PREC_BOR: u8 = 6;
const PREC_BXOR: u8 = 7;
const PREC_BAND: u8 = 8;
const PREC_EQUALITY: u8 = 9;
const PREC_RELATIONAL: u8 = 10;
const PREC_SHIFT: u8 = 11;
const PREC_ADDITIVE: u8 = 12;
const PREC_MULT: u8 = 13;

fn infix_precedence(kind: TokenKind) -> Option<u8> {
    let p = match kind {
        TokenKind::Comma => PREC_COMMA,
        TokenKind::Assign
        | TokenKind::PlusAssign
        | TokenKind::MinusAssign
        | TokenKind::StarAssign
        | TokenKind::SlashAssign
        | TokenKind::PercentAssign
        | TokenKind::AmpAssign
        | TokenKind::PipeAssign
        | TokenKind::CaretAssign
        | TokenKind::ShlAssign
        | TokenKind::ShrAssign => PREC_ASSIGN,
        TokenKind::Question => PREC_TERNARY,
        TokenKind::OrOr => PREC_LOR,
        TokenKind::AndAnd => PREC_LAND,
        TokenKind::Pipe => PREC_BOR,
        TokenKind::Caret => PREC_BXOR,
        TokenKind::Amp => PREC_BAND,
        TokenKind::Eq | TokenKind::NotEq => PREC_EQUALITY,
        TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => PREC_RELATIONAL,
        TokenKind::Shl | TokenKind::Shr => PREC_SHIFT,
        TokenKind::Plus | TokenKind::Minus => PREC_ADDITIVE,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => PREC_MULT,
        _ => return None,
    };
    Some(p)
}

fn binop_for(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Comma => BinaryOp::Comma,
        TokenKind::Assign => BinaryOp::Assign,
        TokenKind::PlusAssign => BinaryOp::AddAssign,
        TokenKind::MinusAssign => BinaryOp::SubAssign,
        TokenKind::StarAssign => BinaryOp::MulAssign,
        TokenKind::SlashAssign => BinaryOp::DivAssign,
        TokenKind::PercentAssign => BinaryOp::RemAssign,
        TokenKind::AmpAssign => BinaryOp::AndAssign,
        TokenKind::PipeAssign => BinaryOp::OrAssign,
        TokenKind::CaretAssign => BinaryOp::XorAssign,
        TokenKind::ShlAssign => BinaryOp::ShlAssign,
        TokenKind::ShrAssign => BinaryOp::ShrAssign,
        TokenKind::OrOr => BinaryOp::LogOr,
        TokenKind::AndAnd => BinaryOp::LogAnd,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::Amp => BinaryOp::BitAnd,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::Shl => BinaryOp::Shl,
        TokenKind::Shr => BinaryOp::Shr,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        _ => return None,
    };
    Some(op)
}

impl Parser {
    /// Full expression, comma operator included.
    pub(crate) fn parse_full_expr(&mut self) -> PResult<Expr> {
        self.parse_expr_prec(PREC_COMMA)
    }

    /// Assignment-expression: what appears in initializers and call arguments.
    pub(crate) fn parse_assignment_expr(&mut self) -> PResult<Expr> {
        self.parse_expr_prec(PREC_ASSIGN)
    }

    /// Conditional-expression: the grammar's constant-expression position.
    pub(crate) fn parse_constant_expr(&mut self) -> PResult<Expr> {
        self.parse_expr_prec(PREC_TERNARY)
    }

    fn parse_expr_prec(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary_expr()?;
        loop {
            let Some(prec) = infix_precedence(self.cur_kind()) else {
                break;
            };
            if prec < min_prec {
                break;
            }

            if self.cur_kind() == TokenKind::Question {
                self.bump();
                let then = self.parse_full_expr()?;
                self.expect(TokenKind::Colon)?;
                let els = self.parse_expr_prec(PREC_TERNARY)?;
                lhs = Expr::Conditional {
                    cond: Box::new(lhs),
                    then: Box::new(then),
                    els: Box::new(els),
                };
                continue;
            }

            let op = binop_for(self.cur_kind()).expect("infix token has a binop");
            self.bump();
            let rhs = if op.is_assignment() {
                self.parse_expr_prec(prec)?
            } else {
                self.parse_expr_prec(prec + 1)?
            };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary_expr(&mut self) -> PResult<Expr> {
        let prefix = match self.cur_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::LogNot),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Inc => Some(UnaryOp::PreInc),
            TokenKind::Dec => Some(UnaryOp::PreDec),
            TokenKind::Amp => Some(UnaryOp::Addr),
            TokenKind::Star => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = prefix {
            self.bump();
            let expr = self.parse_unary_expr()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        match self.cur_kind() {
            TokenKind::Plus => {
                // Unary plus is the identity.
                self.bump();
                self.parse_unary_expr()
            }
            TokenKind::Sizeof => {
                self.bump();
                if self.cur_kind() == TokenKind::LParen && self.starts_type_name(&self.peek) {
                    self.bump();
                    let ty = self.parse_type_name()?;
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::SizeofType(ty))
                } else {
                    let e = self.parse_unary_expr()?;
                    Ok(Expr::SizeofExpr(Box::new(e)))
                }
            }
            TokenKind::LParen if self.starts_type_name(&self.peek) => {
                self.bump();
                let ty = self.parse_type_name()?;
                self.expect(TokenKind::RParen)?;
                let e = self.parse_unary_expr()?;
                Ok(Expr::Cast {
                    type_spec: ty,
                    expr: Box::new(e),
                })
            }
            _ => {
                let primary = self.parse_primary_expr()?;
                self.parse_postfix_ops(primary)
            }
        }
    }

    fn parse_primary_expr(&mut self) -> PResult<Expr> {
        match self.cur_kind() {
            TokenKind::IntLit => {
                let text = self.cur_token().literal.clone();
                let value = self.parse_int_literal(&text);
                self.bump();
                Ok(Expr::Constant(value))
            }
            TokenKind::StringLit => {
                let s = self.cur_token().literal.clone();
                self.bump();
                Ok(Expr::StringLiteral(s))
            }
            TokenKind::CharLit => {
                let s = self.cur_token().literal.clone();
                self.bump();
                Ok(Expr::CharLiteral(s))
            }
            TokenKind::Ident => {
                let name = self.cur_token().literal.clone();
                self.bump();
                Ok(Expr::Variable(name))
            }
            TokenKind::LParen => {
                self.bump();
                let e = self.parse_full_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(e)))
            }
            other => {
                self.error_here(format!("expected expression, found '{}'", other));
                Err(Abort)
            }
        }
    }

    fn parse_postfix_ops(&mut self, mut e: Expr) -> PResult<Expr> {
        loop {
            match self.cur_kind() {
                TokenKind::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    if self.cur_kind() != TokenKind::RParen {
                        loop {
                            args.push(self.parse_assignment_expr()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    e = Expr::Call {
                        func: Box::new(e),
                        args,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_full_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    e = Expr::Index {
                        base: Box::new(e),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.bump();
                    let member = self.expect_ident()?;
                    e = Expr::Member {
                        base: Box::new(e),
                        member,
                        arrow: false,
                    };
                }
                TokenKind::Arrow => {
                    self.bump();
                    let member = self.expect_ident()?;
                    e = Expr::Member {
                        base: Box::new(e),
                        member,
                        arrow: true,
                    };
                }
                TokenKind::Inc => {
                    self.bump();
                    e = Expr::Unary {
                        op: UnaryOp::PostInc,
                        expr: Box::new(e),
                    };
                }
                TokenKind::Dec => {
                    self.bump();
                    e = Expr::Unary {
                        op: UnaryOp::PostDec,
                        expr: Box::new(e),
                    };
                }
                _ => break,
            }
        }
        Ok(e)
    }

    /// Decode an integer literal's value. Suffixes are ignored; the base is
    /// decimal, hex (`0x`) or octal (leading `0`).
    fn parse_int_literal(&mut self, text: &str) -> i64 {
        let trimmed = text.trim_end_matches(|c| matches!(c, 'u' | 'U' | 'l' | 'L'));
        let parsed = if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
        } else if trimmed.len() > 1 && trimmed.starts_with('0') {
            u64::from_str_radix(&trimmed[1..], 8)
        } else {
            trimmed.parse::<u64>()
        };
        match parsed {
            Ok(v) => v as i64,
            Err(_) => {
                self.error_here(format!("invalid integer literal '{}'", text));
                0
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use crate::cabs::*;
    use crate::parser::parse_translation_unit;

    /// Parse `src` as the body of `int f() { return <src>; }` and return the
    /// returned expression.
    fn expr(src: &str) -> Expr {
        let program = parse_translation_unit(&format!("int f() {{ return {}; }}", src), "t.c")
            .expect("parse failed");
        match &program.defs[0] {
            Definition::FunDef { body, .. } => match &body.as_ref().unwrap()[0] {
                Stmt::Return(Some(e)) => e.clone(),
                other => panic!("expected return, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn precedence_mul_over_add() {
        match expr("1 + 2 * 3") {
            Expr::Binary { op, rhs, .. } => {
                assert_eq!(op, BinaryOp::Add);
                assert!(matches!(
                    *rhs,
                    Expr::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parens_are_preserved() {
        match expr("(1 + 2) * 3") {
            Expr::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::Mul);
                assert!(matches!(*lhs, Expr::Paren(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        // a = b = 1 parses as a = (b = 1)
        match expr("a = b = 1") {
            Expr::Binary { op, rhs, .. } => {
                assert_eq!(op, BinaryOp::Assign);
                assert!(matches!(
                    *rhs,
                    Expr::Binary {
                        op: BinaryOp::Assign,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn relational_binds_tighter_than_logical() {
        match expr("a < b && c > d") {
            Expr::Binary { op, lhs, rhs } => {
                assert_eq!(op, BinaryOp::LogAnd);
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Lt, .. }));
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Gt, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ternary_is_right_associative() {
        match expr("a ? 1 : b ? 2 : 3") {
            Expr::Conditional { els, .. } => {
                assert!(matches!(*els, Expr::Conditional { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn postfix_chain() {
        match expr("p->next->value") {
            Expr::Member { base, member, arrow } => {
                assert_eq!(member, "value");
                assert!(arrow);
                assert!(matches!(*base, Expr::Member { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn call_with_arguments() {
        match expr("f(1, x + 2)") {
            Expr::Call { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sizeof_type_and_expr() {
        assert!(matches!(expr("sizeof(int)"), Expr::SizeofType(t) if t == "int"));
        assert!(matches!(expr("sizeof x"), Expr::SizeofExpr(_)));
        assert!(matches!(expr("sizeof(x)"), Expr::SizeofExpr(_)));
    }

    #[test]
    fn cast_of_unary() {
        match expr("(long)x + 1") {
            Expr::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::Add);
                assert!(matches!(*lhs, Expr::Cast { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn literal_bases() {
        assert!(matches!(expr("0x10"), Expr::Constant(16)));
        assert!(matches!(expr("010"), Expr::Constant(8)));
        assert!(matches!(expr("42"), Expr::Constant(42)));
        assert!(matches!(expr("100L"), Expr::Constant(100)));
    }

    #[test]
    fn pre_and_post_increment() {
        assert!(matches!(
            expr("++x"),
            Expr::Unary {
                op: UnaryOp::PreInc,
                ..
            }
        ));
        assert!(matches!(
            expr("x++"),
            Expr::Unary {
                op: UnaryOp::PostInc,
                ..
            }
        ));
    }

    #[test]
    fn comma_operator_in_parens() {
        match expr("(a, b)") {
            Expr::Paren(inner) => {
                assert!(matches!(
                    *inner,
                    Expr::Binary {
                        op: BinaryOp::Comma,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
