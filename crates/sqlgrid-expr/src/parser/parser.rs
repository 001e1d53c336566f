//! Script parser implementation.

use super::error::ParseError;
use super::pratt::{infix_binding_power, token_to_binary_op, token_to_unary_op, PREFIX_BINDING_POWER};
use crate::ast::{Expr, Literal, Program, Stmt};
use crate::lexer::{Keyword, Lexer, Span, Token, TokenKind};

/// Script parser. Collects every syntax error instead of stopping at the
/// first one, resynchronizing at statement boundaries.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    errors: Vec<ParseError>,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given input.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            previous: Token::new(TokenKind::Eof, Span::default()),
            errors: Vec::new(),
            depth: 0,
        }
    }

    /// Parses the whole script. The program holds every statement that
    /// parsed cleanly; the error list is empty on success.
    #[must_use]
    pub fn parse_program(mut self) -> (Program, Vec<ParseError>) {
        let mut statements = Vec::new();
        while !self.current.is_eof() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        (Program { statements }, self.errors)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match &self.current.kind {
            TokenKind::Keyword(Keyword::Let) => self.parse_let(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::LeftBrace => {
                let start = self.current.span;
                let body = self.parse_block()?;
                Ok(Stmt::Block {
                    body,
                    span: start.merge(self.previous.span),
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Assign, "=")?;
        let value = self.parse_expression(0)?;
        self.expect_terminator()?;
        Ok(Stmt::Let {
            name,
            value,
            span: start.merge(self.previous.span),
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();
        let condition = self.parse_expression(0)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.check_keyword(Keyword::Else) {
            self.advance();
            if self.check_keyword(Keyword::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: start.merge(self.previous.span),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.expect_terminator()?;
        Ok(Stmt::Return {
            value,
            span: start.merge(self.previous.span),
        })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        let expr = self.parse_expression(0)?;

        if self.check(&TokenKind::Assign) {
            let target_span = expr.span();
            self.advance();
            let value = self.parse_expression(0)?;
            self.expect_terminator()?;
            let span = start.merge(self.previous.span);
            return match expr {
                Expr::Variable { name, .. } => Ok(Stmt::Assign { name, value, span }),
                Expr::Field { caption, .. } => Ok(Stmt::FieldAssign {
                    caption,
                    value,
                    span,
                }),
                _ => Err(ParseError::new("Invalid assignment target", target_span)),
            };
        }

        self.expect_terminator()?;
        Ok(Stmt::Expr {
            expr,
            span: start.merge(self.previous.span),
        })
    }

    /// Parses `{ statements }`.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::LeftBrace, "{")?;
        self.depth += 1;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.current.is_eof() {
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        self.depth -= 1;
        self.expect(&TokenKind::RightBrace, "}")?;
        Ok(body)
    }

    /// Parses an expression using Pratt parsing.
    fn parse_expression(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;

        while let Some((l_bp, r_bp)) = infix_binding_power(&self.current.kind) {
            if l_bp < min_bp {
                break;
            }
            let Some(op) = token_to_binary_op(&self.current.kind) else {
                break;
            };
            self.advance();
            let rhs = self.parse_expression(r_bp)?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                left: Box::new(lhs),
                op,
                right: Box::new(rhs),
                span,
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        if let Some(op) = token_to_unary_op(&self.current.kind) {
            let start = self.current.span;
            self.advance();
            let operand = self.parse_expression(PREFIX_BINDING_POWER)?;
            let span = start.merge(operand.span());
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }

        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    /// Parses trailing `.method(args)` calls.
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        while self.check(&TokenKind::Dot) {
            self.advance();
            let method = self.expect_identifier()?;
            self.expect(&TokenKind::LeftParen, "(")?;
            let args = self.parse_arguments()?;
            let span = expr.span().merge(self.previous.span);
            expr = Expr::Method {
                receiver: Box::new(expr),
                method,
                args,
                span,
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current.clone();
        let span = token.span;

        let literal = match token.kind {
            TokenKind::Integer(n) => Literal::Integer(n),
            TokenKind::Float(f) => Literal::Float(f),
            TokenKind::String(s) => Literal::String(s),
            TokenKind::Keyword(Keyword::True) => Literal::Boolean(true),
            TokenKind::Keyword(Keyword::False) => Literal::Boolean(false),
            TokenKind::Keyword(Keyword::Null) => Literal::Null,
            TokenKind::Field(caption) => {
                self.advance();
                return Ok(Expr::Field { caption, span });
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    self.advance();
                    let args = self.parse_arguments()?;
                    return Ok(Expr::Call {
                        name,
                        args,
                        span: span.merge(self.previous.span),
                    });
                }
                return Ok(Expr::Variable { name, span });
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                self.expect(&TokenKind::RightParen, ")")?;
                return Ok(inner);
            }
            other => return Err(ParseError::unexpected("expression", &other, span)),
        };

        self.advance();
        Ok(Expr::literal(literal, span))
    }

    /// Parses call arguments; the opening parenthesis is already consumed.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RightParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression(0)?);
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RightParen, ")")?;
        Ok(args)
    }

    /// Skips tokens until a likely statement boundary.
    fn synchronize(&mut self) {
        if self.check(&TokenKind::RightBrace) && self.depth > 0 {
            return;
        }
        while !self.current.is_eof() {
            let kind = self.current.kind.clone();
            self.advance();
            if kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::RightBrace if self.depth > 0 => return,
                TokenKind::Keyword(Keyword::Let | Keyword::If | Keyword::Return) => return,
                _ => {}
            }
        }
    }

    // --- Helper methods ---

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.current.kind, TokenKind::Keyword(kw) if *kw == keyword)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        )
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::unexpected(
                expected,
                &self.current.kind,
                self.current.span,
            ))
        }
    }

    /// A `;` ends a statement. It may be omitted before `}` or end of input.
    fn expect_terminator(&mut self) -> Result<(), ParseError> {
        match self.current.kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenKind::RightBrace | TokenKind::Eof => Ok(()),
            _ => Err(ParseError::unexpected(
                ";",
                &self.current.kind,
                self.current.span,
            )),
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::unexpected(
                "identifier",
                other,
                self.current.span,
            )),
        }
    }
}
